//! Binance 선물 커넥터 HTTP 통합 테스트 (mockito 목 서버).

use std::sync::Arc;
use std::time::Duration;

use mockito::{Matcher, Server};
use rust_decimal_macros::dec;
use trader_core::{OrderRequest, OrderType, Side, Timeframe};
use trader_exchange::{
    BinanceFuturesClient, BinanceFuturesConfig, ExchangeError, ExchangeGateway, FuturesExchange,
    RetryConfig,
};

fn client(url: &str) -> BinanceFuturesClient {
    let config = BinanceFuturesConfig::new("test-api-key-123456", "test-secret")
        .with_testnet(true)
        .with_base_url(url);
    BinanceFuturesClient::new(config).unwrap()
}

#[tokio::test]
async fn test_current_price() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/fapi/v1/ticker/price")
        .match_query(Matcher::UrlEncoded("symbol".into(), "BTCUSDT".into()))
        .with_status(200)
        .with_body(r#"{"symbol":"BTCUSDT","price":"60123.40","time":1700000000000}"#)
        .create_async()
        .await;

    let price = client(&server.url()).current_price("BTCUSDT").await.unwrap();

    assert_eq!(price, dec!(60123.40));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_symbol_filters_from_exchange_info() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/fapi/v1/exchangeInfo")
        .with_status(200)
        .with_body(
            r#"{"symbols":[
                {"symbol":"ETHUSDT","status":"TRADING","filters":[]},
                {"symbol":"LDOUSDT","status":"TRADING","filters":[
                    {"filterType":"PRICE_FILTER","tickSize":"0.000100","minPrice":"0.0001","maxPrice":"200"},
                    {"filterType":"LOT_SIZE","stepSize":"1","minQty":"1","maxQty":"1000000"},
                    {"filterType":"MIN_NOTIONAL","notional":"5"}
                ]},
                {"symbol":"OLDUSDT","status":"SETTLING","filters":[]}
            ]}"#,
        )
        .create_async()
        .await;

    let client = client(&server.url());
    let filters = client.symbol_filters("LDOUSDT").await.unwrap();

    assert_eq!(filters.tick_size, dec!(0.0001));
    assert_eq!(filters.step_size, dec!(1));
    assert_eq!(filters.min_qty, dec!(1));
    assert_eq!(filters.min_notional, dec!(5));
    assert!(filters.tradable);

    assert!(!client.symbol_filters("OLDUSDT").await.unwrap().tradable);
    assert!(matches!(
        client.symbol_filters("NOPEUSDT").await,
        Err(ExchangeError::SymbolNotFound(_))
    ));
}

#[tokio::test]
async fn test_signed_balance_request() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/fapi/v2/balance")
        .match_header("X-MBX-APIKEY", "test-api-key-123456")
        .match_query(Matcher::AllOf(vec![
            Matcher::Regex("timestamp=\\d+".into()),
            Matcher::Regex("recvWindow=5000".into()),
            Matcher::Regex("signature=[0-9a-f]{64}".into()),
        ]))
        .with_status(200)
        .with_body(
            r#"[{"asset":"BNB","balance":"0","availableBalance":"0"},
                {"asset":"USDT","balance":"10000.50","availableBalance":"7500.25"}]"#,
        )
        .create_async()
        .await;

    let balance = client(&server.url()).balance("USDT").await.unwrap();

    assert_eq!(balance.total, dec!(10000.50));
    assert_eq!(balance.available, dec!(7500.25));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_place_stop_limit_order() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/fapi/v1/order")
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex("type=STOP&".into()),
            Matcher::Regex("stopPrice=1.142".into()),
            Matcher::Regex("price=1.145".into()),
            Matcher::Regex("timeInForce=GTC".into()),
        ]))
        .with_status(200)
        .with_body(
            r#"{"orderId":8389765,"symbol":"LDOUSDT","status":"NEW","clientOrderId":"tbx",
                "price":"1.145","origQty":"10","stopPrice":"1.142","reduceOnly":false,
                "side":"BUY","type":"STOP"}"#,
        )
        .create_async()
        .await;

    let req = OrderRequest::stop_limit("LDOUSDT", Side::Buy, dec!(10), dec!(1.142), dec!(1.145));
    let order = client(&server.url()).place_order(&req).await.unwrap();

    assert_eq!(order.order_id, "8389765");
    assert_eq!(order.order_type, OrderType::StopLimit);
    assert_eq!(order.price, Some(dec!(1.145)));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_error_codes_are_classified() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/fapi/v1/order")
        .with_status(400)
        .with_body(r#"{"code":-2021,"msg":"Order would immediately trigger."}"#)
        .create_async()
        .await;
    server
        .mock("DELETE", "/fapi/v1/order")
        .match_query(Matcher::Any)
        .with_status(400)
        .with_body(r#"{"code":-2011,"msg":"Unknown order sent."}"#)
        .create_async()
        .await;

    let client = client(&server.url());

    let req = OrderRequest::stop_market("BTCUSDT", Side::Buy, dec!(0.01), dec!(60000));
    let err = client.place_order(&req).await.unwrap_err();
    assert!(matches!(err, ExchangeError::OrderRejected(_)));

    let err = client.cancel_order("BTCUSDT", "1").await.unwrap_err();
    assert!(err.is_order_not_found());
}

#[tokio::test]
async fn test_http_status_fallbacks() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/fapi/v1/ping")
        .with_status(429)
        .with_body("Too many requests")
        .create_async()
        .await;
    server
        .mock("GET", "/fapi/v1/premiumIndex")
        .match_query(Matcher::Any)
        .with_status(503)
        .with_body("Service Unavailable")
        .create_async()
        .await;

    let client = client(&server.url());

    assert!(matches!(client.ping().await, Err(ExchangeError::RateLimited)));
    let err = client.funding_info("BTCUSDT").await.unwrap_err();
    assert!(matches!(err, ExchangeError::ServerError { status: 503, .. }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_gateway_retries_server_errors() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/fapi/v1/ticker/price")
        .match_query(Matcher::Any)
        .with_status(502)
        .with_body("Bad Gateway")
        .expect(3)
        .create_async()
        .await;

    let retry = RetryConfig {
        max_attempts: 3,
        initial_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(10),
        multiplier: 2.0,
    };
    let gateway = ExchangeGateway::new(Arc::new(client(&server.url()))).with_retry(retry);

    let err = gateway.current_price("BTCUSDT").await.unwrap_err();

    assert!(matches!(err, ExchangeError::ServerError { status: 502, .. }));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_market_data_parsing() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/fapi/v1/klines")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("interval".into(), "15m".into()),
            Matcher::UrlEncoded("limit".into(), "2".into()),
        ]))
        .with_status(200)
        .with_body(
            r#"[
                [1700000000000,"100.0","105.0","99.0","104.0","1200.5",1700000899999,"0",10,"0","0","0"],
                [1700000900000,"104.0","106.0","103.0","105.5","900.0",1700001799999,"0",8,"0","0","0"]
            ]"#,
        )
        .create_async()
        .await;
    server
        .mock("GET", "/fapi/v1/openInterest")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"{"openInterest":"12345.678","symbol":"BTCUSDT","time":1700000000000}"#)
        .create_async()
        .await;
    server
        .mock("GET", "/fapi/v2/positionRisk")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(
            r#"[{"symbol":"BTCUSDT","positionAmt":"-0.010","entryPrice":"60000.0","markPrice":"59000.0",
                 "unRealizedProfit":"10.00","leverage":"5","marginType":"cross"},
                {"symbol":"ETHUSDT","positionAmt":"0.000","entryPrice":"0.0","markPrice":"3000.0",
                 "unRealizedProfit":"0.00","leverage":"20","marginType":"cross"}]"#,
        )
        .create_async()
        .await;

    let client = client(&server.url());

    let klines = client.klines("BTCUSDT", Timeframe::M15, 2).await.unwrap();
    assert_eq!(klines.len(), 2);
    assert_eq!(klines[1].close, dec!(105.5));

    let oi = client.open_interest("BTCUSDT").await.unwrap();
    assert_eq!(oi.open_interest, dec!(12345.678));

    let positions = client.positions().await.unwrap();
    assert_eq!(positions.len(), 2);
    assert!(positions[0].is_short());
    assert_eq!(positions[0].leverage, 5);
    assert!(positions[1].is_flat());
}
