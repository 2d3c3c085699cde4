//! Binance USDⓈ-M 선물 커넥터.
//!
//! 선물 계정용 REST API 구현. 메인넷과 테스트넷 모두 지원.

use crate::traits::FuturesExchange;
use crate::{ExchangeError, ExchangeResult};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::Sha256;
use std::fmt;
use tracing::{debug, error, info, warn};
use trader_core::{
    AccountBalance, ExchangePosition, FundingInfo, Kline, OpenInterest, OpenOrder, OrderRequest,
    OrderStatus, OrderType, Price, Side, SymbolFilters, Timeframe,
};

type HmacSha256 = Hmac<Sha256>;

const MAINNET_URL: &str = "https://fapi.binance.com";
const TESTNET_URL: &str = "https://testnet.binancefuture.com";

// ============================================================================
// 설정
// ============================================================================

/// Binance 선물 클라이언트 설정.
///
/// # 보안
/// - `Debug` 구현은 민감 정보(`api_key`, `api_secret`)를 마스킹합니다.
#[derive(Clone)]
pub struct BinanceFuturesConfig {
    /// API 키
    pub api_key: String,
    /// API 시크릿
    pub api_secret: SecretString,
    /// 테스트넷 사용
    pub testnet: bool,
    /// 요청 타임아웃 (초)
    pub timeout_secs: u64,
    /// 수신 윈도우 (밀리초)
    pub recv_window: u64,
    /// 기본 URL 재정의 (목 서버 등)
    pub base_url: Option<String>,
}

impl fmt::Debug for BinanceFuturesConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let masked_key = if self.api_key.len() > 8 {
            format!(
                "{}...{}",
                &self.api_key[..4],
                &self.api_key[self.api_key.len() - 4..]
            )
        } else {
            "***REDACTED***".to_string()
        };

        f.debug_struct("BinanceFuturesConfig")
            .field("api_key", &masked_key)
            .field("api_secret", &"***REDACTED***")
            .field("testnet", &self.testnet)
            .field("timeout_secs", &self.timeout_secs)
            .field("recv_window", &self.recv_window)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl BinanceFuturesConfig {
    /// 새 설정 생성.
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: SecretString::from(api_secret.into()),
            testnet: false,
            timeout_secs: 10,
            recv_window: 5000,
            base_url: None,
        }
    }

    /// 공개 시장 데이터 전용 설정 (서명 요청은 인증 에러로 실패).
    pub fn public_only(testnet: bool) -> Self {
        Self::new(String::new(), String::new()).with_testnet(testnet)
    }

    /// 테스트넷 사용.
    pub fn with_testnet(mut self, testnet: bool) -> Self {
        self.testnet = testnet;
        self
    }

    /// 타임아웃과 수신 윈도우 설정.
    pub fn with_timeouts(mut self, timeout_secs: u64, recv_window: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self.recv_window = recv_window;
        self
    }

    /// 기본 URL 재정의.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// 환경 변수에서 생성.
    ///
    /// `testnet`이 `None`이면 `BINANCE_TESTNET`을 따릅니다.
    pub fn from_env(testnet: Option<bool>) -> Option<Self> {
        let testnet = testnet.unwrap_or_else(|| {
            std::env::var("BINANCE_TESTNET")
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(false)
        });

        let (api_key, api_secret) = if testnet {
            (
                std::env::var("BINANCE_TESTNET_API_KEY").ok()?,
                std::env::var("BINANCE_TESTNET_API_SECRET").ok()?,
            )
        } else {
            (
                std::env::var("BINANCE_API_KEY").ok()?,
                std::env::var("BINANCE_API_SECRET").ok()?,
            )
        };

        Some(Self::new(api_key, api_secret).with_testnet(testnet))
    }

    /// REST API 기본 URL 반환.
    pub fn rest_base_url(&self) -> &str {
        match &self.base_url {
            Some(url) => url,
            None if self.testnet => TESTNET_URL,
            None => MAINNET_URL,
        }
    }
}

// ============================================================================
// API 응답 타입
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FuturesBalance {
    asset: String,
    balance: String,
    available_balance: String,
}

#[derive(Debug, Deserialize)]
struct ExchangeInfo {
    symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
struct SymbolInfo {
    symbol: String,
    status: String,
    #[serde(default)]
    filters: Vec<SymbolFilter>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolFilter {
    filter_type: String,
    tick_size: Option<String>,
    step_size: Option<String>,
    min_qty: Option<String>,
    notional: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TickerPrice {
    price: String,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct BinanceKline(
    i64,    // 0: Open time
    String, // 1: Open
    String, // 2: High
    String, // 3: Low
    String, // 4: Close
    String, // 5: Volume
    i64,    // 6: Close time
    String, // 7: Quote asset volume
    i64,    // 8: Number of trades
    String, // 9: Taker buy base asset volume
    String, // 10: Taker buy quote asset volume
    String, // 11: Ignore
);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PremiumIndex {
    symbol: String,
    mark_price: String,
    last_funding_rate: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenInterestResponse {
    symbol: String,
    open_interest: String,
    time: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FuturesOrder {
    symbol: String,
    order_id: i64,
    #[serde(default)]
    client_order_id: Option<String>,
    status: String,
    #[serde(rename = "type")]
    order_type: String,
    side: String,
    orig_qty: String,
    #[serde(default)]
    price: Option<String>,
    #[serde(default)]
    stop_price: Option<String>,
    #[serde(default)]
    reduce_only: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PositionRisk {
    symbol: String,
    position_amt: String,
    entry_price: String,
    mark_price: String,
    un_realized_profit: String,
    leverage: String,
}

#[derive(Debug, Deserialize)]
struct BinanceError {
    code: i32,
    msg: String,
}

// ============================================================================
// Binance 선물 클라이언트
// ============================================================================

/// Binance USDⓈ-M 선물 클라이언트.
pub struct BinanceFuturesClient {
    config: BinanceFuturesConfig,
    client: Client,
}

impl BinanceFuturesClient {
    /// 새 클라이언트 생성.
    ///
    /// # Errors
    /// HTTP 클라이언트 생성에 실패하면 `ExchangeError::NetworkError`를 반환합니다.
    pub fn new(config: BinanceFuturesConfig) -> ExchangeResult<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ExchangeError::NetworkError(format!("failed to build HTTP client: {}", e)))?;

        info!(
            testnet = config.testnet,
            base_url = config.rest_base_url(),
            "Binance futures client created"
        );

        Ok(Self { config, client })
    }

    /// 설정 반환.
    pub fn config(&self) -> &BinanceFuturesConfig {
        &self.config
    }

    /// 현재 타임스탬프(밀리초) 반환.
    fn timestamp_ms() -> i64 {
        Utc::now().timestamp_millis()
    }

    /// HMAC-SHA256으로 쿼리 문자열 서명.
    fn sign(&self, query: &str) -> ExchangeResult<String> {
        let mut mac = HmacSha256::new_from_slice(self.config.api_secret.expose_secret().as_bytes())
            .map_err(|e| ExchangeError::Unauthorized(format!("invalid API secret: {}", e)))?;
        mac.update(query.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// 파라미터에서 쿼리 문자열 생성.
    fn build_query(params: &[(&str, String)]) -> String {
        params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// 타임스탬프와 서명을 붙인 쿼리 문자열.
    fn signed_query(&self, params: &[(&str, String)]) -> ExchangeResult<String> {
        if self.config.api_key.is_empty() {
            return Err(ExchangeError::Unauthorized(
                "API key is not configured".to_string(),
            ));
        }

        let mut all_params = params.to_vec();
        all_params.push(("recvWindow", self.config.recv_window.to_string()));
        all_params.push(("timestamp", Self::timestamp_ms().to_string()));

        let query = Self::build_query(&all_params);
        let signature = self.sign(&query)?;
        Ok(format!("{}&signature={}", query, signature))
    }

    /// 공개 API 요청 (인증 불필요).
    async fn public_get<T: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> ExchangeResult<T> {
        let url = format!("{}{}", self.config.rest_base_url(), endpoint);
        let query = Self::build_query(params);

        let full_url = if query.is_empty() {
            url
        } else {
            format!("{}?{}", url, query)
        };

        debug!("GET {}", full_url);

        let response = self.client.get(&full_url).send().await?;
        self.handle_response(response).await
    }

    /// 서명된 GET 요청.
    async fn signed_get<T: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> ExchangeResult<T> {
        let query = self.signed_query(params)?;
        let full_url = format!("{}{}?{}", self.config.rest_base_url(), endpoint, query);

        debug!("GET (signed) {}", endpoint);

        let response = self
            .client
            .get(&full_url)
            .header("X-MBX-APIKEY", &self.config.api_key)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// 서명된 POST 요청.
    async fn signed_post<T: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> ExchangeResult<T> {
        let url = format!("{}{}", self.config.rest_base_url(), endpoint);
        let body = self.signed_query(params)?;

        debug!("POST (signed) {}", endpoint);

        let response = self
            .client
            .post(&url)
            .header("X-MBX-APIKEY", &self.config.api_key)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// 서명된 DELETE 요청.
    async fn signed_delete<T: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> ExchangeResult<T> {
        let query = self.signed_query(params)?;
        let full_url = format!("{}{}?{}", self.config.rest_base_url(), endpoint, query);

        debug!("DELETE (signed) {}", endpoint);

        let response = self
            .client
            .delete(&full_url)
            .header("X-MBX-APIKEY", &self.config.api_key)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// API 응답 처리.
    async fn handle_response<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> ExchangeResult<T> {
        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            return serde_json::from_str(&body).map_err(|e| {
                error!("Failed to parse response: {} - Body: {}", e, body);
                ExchangeError::ParseError(e.to_string())
            });
        }

        if let Ok(error) = serde_json::from_str::<BinanceError>(&body) {
            return Err(Self::map_error_code(error.code, &error.msg));
        }

        Err(match status.as_u16() {
            429 | 418 => ExchangeError::RateLimited,
            401 | 403 => ExchangeError::Unauthorized(body),
            s if s >= 500 => ExchangeError::ServerError { status: s, message: body },
            s => ExchangeError::ApiError {
                code: s as i32,
                message: body,
            },
        })
    }

    /// Binance 에러 코드를 ExchangeError로 매핑.
    fn map_error_code(code: i32, msg: &str) -> ExchangeError {
        let msg = msg.to_string();
        match code {
            -1000 => ExchangeError::Unknown(msg),
            -1001 => ExchangeError::Disconnected(msg),
            -1002 | -2014 | -2015 => ExchangeError::Unauthorized(msg),
            -1003 => ExchangeError::RateLimited,
            -1007 => ExchangeError::Timeout(msg),
            -1013 | -1111 | -4003 => ExchangeError::InvalidQuantity(msg),
            -1021 => ExchangeError::TimestampError(msg),
            -1121 => ExchangeError::SymbolNotFound(msg),
            -2010 | -2019 => ExchangeError::InsufficientBalance(msg),
            -2011 | -2013 => ExchangeError::OrderNotFound(msg),
            -2021 | -4164 => ExchangeError::OrderRejected(msg),
            _ => ExchangeError::ApiError { code, message: msg },
        }
    }

    /// 문자열에서 Decimal 파싱.
    fn parse_decimal(field: &str, s: &str) -> ExchangeResult<Decimal> {
        s.parse()
            .map_err(|_| ExchangeError::ParseError(format!("invalid {}: {:?}", field, s)))
    }

    /// 0은 "없음"으로 취급하는 선택적 가격 파싱.
    fn parse_optional_price(s: Option<&str>) -> Option<Price> {
        s.and_then(|v| v.parse::<Decimal>().ok())
            .filter(|p| !p.is_zero())
    }

    /// 거래소 주문 유형 문자열 변환.
    fn parse_order_type(s: &str) -> Option<OrderType> {
        match s {
            "MARKET" => Some(OrderType::Market),
            "LIMIT" => Some(OrderType::Limit),
            "STOP_MARKET" => Some(OrderType::StopMarket),
            "STOP" => Some(OrderType::StopLimit),
            _ => None,
        }
    }

    fn convert_order(order: FuturesOrder) -> ExchangeResult<OpenOrder> {
        let order_type = Self::parse_order_type(&order.order_type).ok_or_else(|| {
            ExchangeError::ParseError(format!("unsupported order type {}", order.order_type))
        })?;
        let side: Side = order
            .side
            .parse()
            .map_err(|e: String| ExchangeError::ParseError(e))?;

        Ok(OpenOrder {
            order_id: order.order_id.to_string(),
            client_order_id: order.client_order_id,
            symbol: order.symbol,
            side,
            order_type,
            status: OrderStatus::from_exchange(&order.status),
            quantity: Self::parse_decimal("origQty", &order.orig_qty)?,
            price: Self::parse_optional_price(order.price.as_deref()),
            stop_price: Self::parse_optional_price(order.stop_price.as_deref()),
            reduce_only: order.reduce_only,
        })
    }

    /// 주문 요청을 API 파라미터로 변환.
    fn order_params(request: &OrderRequest) -> Vec<(&'static str, String)> {
        let wire_type = match request.order_type {
            OrderType::Market => "MARKET",
            OrderType::Limit => "LIMIT",
            OrderType::StopMarket => "STOP_MARKET",
            OrderType::StopLimit => "STOP",
        };

        let mut params = vec![
            ("symbol", request.symbol.clone()),
            ("side", request.side.to_string()),
            ("type", wire_type.to_string()),
            ("quantity", request.quantity.normalize().to_string()),
        ];

        if let Some(price) = request.price {
            params.push(("price", price.normalize().to_string()));
            params.push(("timeInForce", "GTC".to_string()));
        }
        if let Some(stop) = request.stop_price {
            params.push(("stopPrice", stop.normalize().to_string()));
        }
        if request.reduce_only {
            params.push(("reduceOnly", "true".to_string()));
        }
        if let Some(id) = &request.client_order_id {
            params.push(("newClientOrderId", id.clone()));
        }

        params
    }
}

#[async_trait]
impl FuturesExchange for BinanceFuturesClient {
    fn name(&self) -> &str {
        if self.config.testnet {
            "binance-futures-testnet"
        } else {
            "binance-futures"
        }
    }

    async fn ping(&self) -> ExchangeResult<()> {
        let _: serde_json::Value = self.public_get("/fapi/v1/ping", &[]).await?;
        Ok(())
    }

    async fn balance(&self, asset: &str) -> ExchangeResult<AccountBalance> {
        let balances: Vec<FuturesBalance> = self.signed_get("/fapi/v2/balance", &[]).await?;

        let entry = balances
            .into_iter()
            .find(|b| b.asset == asset)
            .ok_or_else(|| ExchangeError::AssetNotFound(asset.to_string()))?;

        Ok(AccountBalance {
            asset: entry.asset,
            total: Self::parse_decimal("balance", &entry.balance)?,
            available: Self::parse_decimal("availableBalance", &entry.available_balance)?,
        })
    }

    async fn symbol_filters(&self, symbol: &str) -> ExchangeResult<SymbolFilters> {
        let info: ExchangeInfo = self.public_get("/fapi/v1/exchangeInfo", &[]).await?;

        let entry = info
            .symbols
            .into_iter()
            .find(|s| s.symbol == symbol)
            .ok_or_else(|| ExchangeError::SymbolNotFound(symbol.to_string()))?;

        let mut filters = SymbolFilters {
            symbol: entry.symbol,
            tick_size: Decimal::ZERO,
            step_size: Decimal::ZERO,
            min_qty: Decimal::ZERO,
            min_notional: Decimal::ZERO,
            tradable: entry.status == "TRADING",
        };

        for f in entry.filters {
            match f.filter_type.as_str() {
                "PRICE_FILTER" => {
                    if let Some(v) = f.tick_size {
                        filters.tick_size = Self::parse_decimal("tickSize", &v)?.normalize();
                    }
                }
                "LOT_SIZE" => {
                    if let Some(v) = f.step_size {
                        filters.step_size = Self::parse_decimal("stepSize", &v)?.normalize();
                    }
                    if let Some(v) = f.min_qty {
                        filters.min_qty = Self::parse_decimal("minQty", &v)?.normalize();
                    }
                }
                "MIN_NOTIONAL" => {
                    if let Some(v) = f.notional {
                        filters.min_notional = Self::parse_decimal("notional", &v)?;
                    }
                }
                _ => {}
            }
        }

        Ok(filters)
    }

    async fn current_price(&self, symbol: &str) -> ExchangeResult<Price> {
        let ticker: TickerPrice = self
            .public_get("/fapi/v1/ticker/price", &[("symbol", symbol.to_string())])
            .await?;
        Self::parse_decimal("price", &ticker.price)
    }

    async fn klines(&self, symbol: &str, timeframe: Timeframe, limit: u32) -> ExchangeResult<Vec<Kline>> {
        let params = [
            ("symbol", symbol.to_string()),
            ("interval", timeframe.to_binance_interval().to_string()),
            ("limit", limit.to_string()),
        ];
        let raw: Vec<BinanceKline> = self.public_get("/fapi/v1/klines", &params).await?;

        raw.into_iter()
            .map(|k| {
                let open_time = Utc
                    .timestamp_millis_opt(k.0)
                    .single()
                    .ok_or_else(|| ExchangeError::ParseError(format!("invalid kline time {}", k.0)))?;
                Ok(Kline {
                    open_time,
                    open: Self::parse_decimal("open", &k.1)?,
                    high: Self::parse_decimal("high", &k.2)?,
                    low: Self::parse_decimal("low", &k.3)?,
                    close: Self::parse_decimal("close", &k.4)?,
                    volume: Self::parse_decimal("volume", &k.5)?,
                })
            })
            .collect()
    }

    async fn funding_info(&self, symbol: &str) -> ExchangeResult<FundingInfo> {
        let index: PremiumIndex = self
            .public_get("/fapi/v1/premiumIndex", &[("symbol", symbol.to_string())])
            .await?;

        Ok(FundingInfo {
            symbol: index.symbol,
            mark_price: Self::parse_decimal("markPrice", &index.mark_price)?,
            last_funding_rate: Self::parse_decimal("lastFundingRate", &index.last_funding_rate)?,
        })
    }

    async fn open_interest(&self, symbol: &str) -> ExchangeResult<OpenInterest> {
        let oi: OpenInterestResponse = self
            .public_get("/fapi/v1/openInterest", &[("symbol", symbol.to_string())])
            .await?;

        Ok(OpenInterest {
            symbol: oi.symbol,
            open_interest: Self::parse_decimal("openInterest", &oi.open_interest)?,
            time: Utc.timestamp_millis_opt(oi.time).single().unwrap_or_else(Utc::now),
        })
    }

    async fn open_orders(&self, symbol: &str) -> ExchangeResult<Vec<OpenOrder>> {
        let orders: Vec<FuturesOrder> = self
            .signed_get("/fapi/v1/openOrders", &[("symbol", symbol.to_string())])
            .await?;

        let mut result = Vec::with_capacity(orders.len());
        for order in orders {
            let id = order.order_id;
            match Self::convert_order(order) {
                Ok(o) => result.push(o),
                Err(e) => warn!(symbol, order_id = id, error = %e, "Skipping unsupported open order"),
            }
        }
        Ok(result)
    }

    async fn place_order(&self, request: &OrderRequest) -> ExchangeResult<OpenOrder> {
        let params = Self::order_params(request);
        let order: FuturesOrder = self.signed_post("/fapi/v1/order", &params).await?;
        let placed = Self::convert_order(order)?;

        info!(
            symbol = %placed.symbol,
            order_id = %placed.order_id,
            side = %placed.side,
            order_type = %placed.order_type,
            quantity = %placed.quantity,
            "Order accepted"
        );
        Ok(placed)
    }

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> ExchangeResult<()> {
        let params = [("symbol", symbol.to_string()), ("orderId", order_id.to_string())];
        let _: serde_json::Value = self.signed_delete("/fapi/v1/order", &params).await?;
        Ok(())
    }

    async fn positions(&self) -> ExchangeResult<Vec<ExchangePosition>> {
        let risks: Vec<PositionRisk> = self.signed_get("/fapi/v2/positionRisk", &[]).await?;

        risks
            .into_iter()
            .map(|p| {
                Ok(ExchangePosition {
                    amount: Self::parse_decimal("positionAmt", &p.position_amt)?,
                    entry_price: Self::parse_decimal("entryPrice", &p.entry_price)?,
                    mark_price: Self::parse_decimal("markPrice", &p.mark_price)?,
                    unrealized_pnl: Self::parse_decimal("unRealizedProfit", &p.un_realized_profit)?,
                    leverage: p.leverage.parse().unwrap_or(1),
                    symbol: p.symbol,
                })
            })
            .collect()
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> ExchangeResult<()> {
        let params = [("symbol", symbol.to_string()), ("leverage", leverage.to_string())];
        let _: serde_json::Value = self.signed_post("/fapi/v1/leverage", &params).await?;
        debug!(symbol, leverage, "Leverage set");
        Ok(())
    }
}
