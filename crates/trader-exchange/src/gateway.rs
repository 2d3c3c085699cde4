//! 재시도와 필터 보정을 담당하는 거래소 게이트웨이.
//!
//! 엔진과 리스크 관리자는 원시 커넥터 대신 이 게이트웨이만 사용합니다.
//! 모든 네트워크 호출은 [`RetryConfig`] 정책으로 감싸지며, 주문은 전송 전에
//! 심볼 필터에 맞게 정규화됩니다.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use trader_core::{
    AccountBalance, ExchangeConfig, ExchangePosition, FundingInfo, Kline, OpenInterest, OpenOrder,
    OrderRequest, OrderType, Price, Quantity, SymbolFilters, Timeframe,
};
use uuid::Uuid;

use crate::quantize::{normalize_order, round_price, round_quantity, validate_stop_order, NormalizationPolicy};
use crate::retry::{with_retry, RetryConfig};
use crate::traits::FuturesExchange;
use crate::ExchangeResult;

/// 스톱 교체 결과.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplaceOutcome {
    /// 기존 주문을 취소하고 새 주문을 제출함
    Replaced(OpenOrder),
    /// 기존 주문이 이미 사라짐 (체결 또는 취소). 새 주문은 제출하지 않음
    OriginalGone,
    /// 새 주문이 거부되어 기존 주문을 같은 조건으로 다시 제출함
    Restored {
        order: OpenOrder,
        error: String,
    },
    /// 새 주문과 복구 주문이 모두 실패함. 기존 주문은 이미 취소된 상태
    Unprotected { error: String },
}

/// 거래소 게이트웨이.
pub struct ExchangeGateway {
    exchange: Arc<dyn FuturesExchange>,
    retry: RetryConfig,
    policy: NormalizationPolicy,
    filters_cache: RwLock<HashMap<String, SymbolFilters>>,
}

impl ExchangeGateway {
    /// 기본 정책으로 게이트웨이를 생성합니다.
    pub fn new(exchange: Arc<dyn FuturesExchange>) -> Self {
        Self {
            exchange,
            retry: RetryConfig::default(),
            policy: NormalizationPolicy::default(),
            filters_cache: RwLock::new(HashMap::new()),
        }
    }

    /// 설정 섹션에서 정책을 읽어 생성합니다.
    pub fn from_config(exchange: Arc<dyn FuturesExchange>, config: &ExchangeConfig) -> Self {
        Self::new(exchange)
            .with_retry(RetryConfig::from(&config.retry))
            .with_policy(NormalizationPolicy::from(&config.normalization))
    }

    /// 재시도 정책 설정.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// 정규화 정책 설정.
    pub fn with_policy(mut self, policy: NormalizationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// 하위 거래소 이름.
    pub fn exchange_name(&self) -> &str {
        self.exchange.name()
    }

    /// 재시도 정책.
    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    pub async fn ping(&self) -> ExchangeResult<()> {
        with_retry(&self.retry, "ping", || self.exchange.ping()).await
    }

    pub async fn balance(&self, asset: &str) -> ExchangeResult<AccountBalance> {
        with_retry(&self.retry, "balance", || self.exchange.balance(asset)).await
    }

    /// 심볼 필터 조회 (캐시 사용).
    pub async fn symbol_filters(&self, symbol: &str) -> ExchangeResult<SymbolFilters> {
        if let Some(filters) = self.filters_cache.read().await.get(symbol) {
            return Ok(filters.clone());
        }
        self.refresh_filters(symbol).await
    }

    async fn refresh_filters(&self, symbol: &str) -> ExchangeResult<SymbolFilters> {
        let filters = with_retry(&self.retry, "symbol_filters", || {
            self.exchange.symbol_filters(symbol)
        })
        .await?;

        self.filters_cache
            .write()
            .await
            .insert(symbol.to_string(), filters.clone());
        Ok(filters)
    }

    /// 심볼이 현재 거래 가능한지 확인합니다. 거래 상태는 매번 새로 조회합니다.
    pub async fn is_tradable(&self, symbol: &str) -> ExchangeResult<bool> {
        Ok(self.refresh_filters(symbol).await?.tradable)
    }

    pub async fn current_price(&self, symbol: &str) -> ExchangeResult<Price> {
        with_retry(&self.retry, "current_price", || self.exchange.current_price(symbol)).await
    }

    pub async fn klines(&self, symbol: &str, timeframe: Timeframe, limit: u32) -> ExchangeResult<Vec<Kline>> {
        with_retry(&self.retry, "klines", || {
            self.exchange.klines(symbol, timeframe, limit)
        })
        .await
    }

    pub async fn funding_info(&self, symbol: &str) -> ExchangeResult<FundingInfo> {
        with_retry(&self.retry, "funding_info", || self.exchange.funding_info(symbol)).await
    }

    pub async fn open_interest(&self, symbol: &str) -> ExchangeResult<OpenInterest> {
        with_retry(&self.retry, "open_interest", || self.exchange.open_interest(symbol)).await
    }

    pub async fn open_orders(&self, symbol: &str) -> ExchangeResult<Vec<OpenOrder>> {
        with_retry(&self.retry, "open_orders", || self.exchange.open_orders(symbol)).await
    }

    /// 수량이 0이 아닌 포지션만 반환합니다.
    pub async fn positions(&self) -> ExchangeResult<Vec<ExchangePosition>> {
        let all = with_retry(&self.retry, "positions", || self.exchange.positions()).await?;
        Ok(all.into_iter().filter(|p| !p.is_flat()).collect())
    }

    /// 심볼의 열린 포지션.
    pub async fn position(&self, symbol: &str) -> ExchangeResult<Option<ExchangePosition>> {
        Ok(self
            .positions()
            .await?
            .into_iter()
            .find(|p| p.symbol == symbol))
    }

    pub async fn set_leverage(&self, symbol: &str, leverage: u32) -> ExchangeResult<()> {
        with_retry(&self.retry, "set_leverage", || {
            self.exchange.set_leverage(symbol, leverage)
        })
        .await
    }

    /// 가격을 심볼의 호가 단위로 내림합니다.
    pub async fn normalize_price(&self, symbol: &str, price: Price) -> ExchangeResult<Price> {
        let filters = self.symbol_filters(symbol).await?;
        Ok(round_price(&filters, price))
    }

    /// 수량을 심볼의 수량 단위로 내림합니다.
    pub async fn normalize_quantity(&self, symbol: &str, quantity: Quantity) -> ExchangeResult<Quantity> {
        let filters = self.symbol_filters(symbol).await?;
        Ok(round_quantity(&filters, quantity))
    }

    /// 주문을 검증, 정규화한 뒤 제출합니다.
    ///
    /// 스톱 지정가의 가격 관계 위반은 네트워크 호출 전에 거부됩니다.
    /// 클라이언트 주문 ID는 재시도 전에 한 번만 생성되므로 재시도 시에도 동일합니다.
    pub async fn place_order(&self, request: &OrderRequest) -> ExchangeResult<OpenOrder> {
        validate_stop_order(request)?;

        let filters = self.symbol_filters(&request.symbol).await?;
        let reference = match (request.order_type, request.reference_price()) {
            (OrderType::Market, _) | (_, None) => self.current_price(&request.symbol).await?,
            (_, Some(price)) => price,
        };

        let mut normalized = normalize_order(request, &filters, reference, &self.policy)?;
        if normalized.client_order_id.is_none() {
            normalized.client_order_id = Some(format!("tb{}", Uuid::new_v4().simple()));
        }

        debug!(
            symbol = %normalized.symbol,
            side = %normalized.side,
            order_type = %normalized.order_type,
            quantity = %normalized.quantity,
            stop_price = ?normalized.stop_price,
            price = ?normalized.price,
            reduce_only = normalized.reduce_only,
            "Submitting order"
        );

        with_retry(&self.retry, "place_order", || self.exchange.place_order(&normalized)).await
    }

    /// 주문을 취소합니다.
    ///
    /// 이미 사라진 주문은 에러가 아니라 `Ok(false)`로 보고됩니다.
    pub async fn cancel_order(&self, symbol: &str, order_id: &str) -> ExchangeResult<bool> {
        match with_retry(&self.retry, "cancel_order", || {
            self.exchange.cancel_order(symbol, order_id)
        })
        .await
        {
            Ok(()) => Ok(true),
            Err(e) if e.is_order_not_found() => {
                debug!(symbol, order_id, "Order already gone, cancel is a no-op");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// 조건을 만족하는 미체결 주문을 모두 취소하고 취소된 개수를 반환합니다.
    ///
    /// 개별 취소 실패는 기록만 하고 나머지 주문을 계속 처리합니다.
    pub async fn cancel_orders_where<P>(&self, symbol: &str, predicate: P) -> ExchangeResult<usize>
    where
        P: Fn(&OpenOrder) -> bool,
    {
        let orders = self.open_orders(symbol).await?;
        let mut cancelled = 0;

        for order in orders.iter().filter(|o| predicate(o)) {
            match self.cancel_order(symbol, &order.order_id).await {
                Ok(true) => cancelled += 1,
                Ok(false) => {}
                Err(e) => warn!(symbol, order_id = %order.order_id, error = %e, "Failed to cancel order"),
            }
        }

        if cancelled > 0 {
            info!(symbol, cancelled, "Cancelled open orders");
        }
        Ok(cancelled)
    }

    /// 심볼의 모든 미체결 주문을 취소합니다.
    pub async fn cancel_all_open_orders(&self, symbol: &str) -> ExchangeResult<usize> {
        self.cancel_orders_where(symbol, |_| true).await
    }

    /// 기존 주문을 취소하고 새 주문으로 교체합니다.
    ///
    /// 기존 주문이 미체결 목록에 없거나 취소 시점에 이미 사라졌으면
    /// [`ReplaceOutcome::OriginalGone`]을 반환하고 새 주문은 제출하지 않습니다.
    /// 취소 후 새 주문이 거부되면 기존 주문을 같은 조건으로 다시 제출해
    /// 포지션이 보호 주문 없이 남지 않게 합니다. 취소 전 단계의 실패는 `Err`이며
    /// 이때 기존 주문은 그대로 살아 있습니다.
    pub async fn cancel_and_replace(
        &self,
        symbol: &str,
        old_order_id: &str,
        replacement: &OrderRequest,
    ) -> ExchangeResult<ReplaceOutcome> {
        validate_stop_order(replacement)?;

        let open = self.open_orders(symbol).await?;
        let Some(original) = open.into_iter().find(|o| o.order_id == old_order_id) else {
            return Ok(ReplaceOutcome::OriginalGone);
        };

        if !self.cancel_order(symbol, old_order_id).await? {
            return Ok(ReplaceOutcome::OriginalGone);
        }

        let rejected = match self.place_order(replacement).await {
            Ok(placed) => return Ok(ReplaceOutcome::Replaced(placed)),
            Err(e) => e,
        };

        warn!(symbol, order_id = old_order_id, error = %rejected, "Replacement rejected, restoring original order");
        match self.place_order(&original.to_request()).await {
            Ok(order) => Ok(ReplaceOutcome::Restored {
                order,
                error: rejected.to_string(),
            }),
            Err(restore_error) => {
                error!(symbol, order_id = old_order_id, error = %restore_error, "Failed to restore original order");
                Ok(ReplaceOutcome::Unprotected {
                    error: format!("{}; restore failed: {}", rejected, restore_error),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulated::{SimOp, SimulatedExchange};
    use crate::ExchangeError;
    use rust_decimal_macros::dec;
    use trader_core::Side;

    async fn setup() -> (Arc<SimulatedExchange>, ExchangeGateway) {
        let sim = Arc::new(SimulatedExchange::with_balance(dec!(10000)));
        sim.add_symbol(SymbolFilters {
            symbol: "BTCUSDT".to_string(),
            tick_size: dec!(0.1),
            step_size: dec!(0.001),
            min_qty: dec!(0.001),
            min_notional: dec!(100),
            tradable: true,
        })
        .await;
        sim.set_price("BTCUSDT", dec!(60000)).await;

        let gateway = ExchangeGateway::new(sim.clone()).with_retry(RetryConfig::default());
        (sim, gateway)
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_stop_limit_rejected_before_network() {
        let (sim, gateway) = setup().await;
        let req = OrderRequest::stop_limit("BTCUSDT", Side::Buy, dec!(0.01), dec!(61000), dec!(60900));

        let err = gateway.place_order(&req).await.unwrap_err();

        assert!(matches!(err, ExchangeError::InvalidOrder(_)));
        assert_eq!(sim.call_count(SimOp::PlaceOrder).await, 0);
        assert_eq!(sim.call_count(SimOp::SymbolFilters).await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_place_order_normalizes_and_assigns_client_id() {
        let (sim, gateway) = setup().await;
        let req = OrderRequest::stop_market("BTCUSDT", Side::Buy, dec!(0.01234), dec!(61000.07));

        let placed = gateway.place_order(&req).await.unwrap();

        assert_eq!(placed.stop_price, Some(dec!(61000)));
        assert_eq!(placed.quantity, dec!(0.012));
        let sent = sim.placed_orders().await;
        assert!(sent[0].client_order_id.as_deref().unwrap().starts_with("tb"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_is_retried() {
        let (sim, gateway) = setup().await;
        sim.fail_next(SimOp::Balance, ExchangeError::Timeout("slow".into()), 2).await;

        let balance = gateway.balance("USDT").await.unwrap();

        assert_eq!(balance.total, dec!(10000));
        assert_eq!(sim.call_count(SimOp::Balance).await, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_insufficient_balance_not_retried() {
        let (sim, gateway) = setup().await;
        sim.fail_next(
            SimOp::PlaceOrder,
            ExchangeError::InsufficientBalance("margin".into()),
            1,
        )
        .await;

        let req = OrderRequest::stop_market("BTCUSDT", Side::Buy, dec!(0.01), dec!(61000));
        let err = gateway.place_order(&req).await.unwrap_err();

        assert!(matches!(err, ExchangeError::InsufficientBalance(_)));
        assert_eq!(sim.call_count(SimOp::PlaceOrder).await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_missing_order_is_noop() {
        let (_sim, gateway) = setup().await;
        assert!(!gateway.cancel_order("BTCUSDT", "999").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_filters_are_cached_but_tradable_is_fresh() {
        let (sim, gateway) = setup().await;

        gateway.symbol_filters("BTCUSDT").await.unwrap();
        gateway.symbol_filters("BTCUSDT").await.unwrap();
        assert_eq!(sim.call_count(SimOp::SymbolFilters).await, 1);

        sim.set_tradable("BTCUSDT", false).await;
        assert!(!gateway.is_tradable("BTCUSDT").await.unwrap());
        assert_eq!(sim.call_count(SimOp::SymbolFilters).await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_and_replace() {
        let (sim, gateway) = setup().await;
        let stop = OrderRequest::stop_market("BTCUSDT", Side::Sell, dec!(0.01), dec!(59000));
        let original = gateway.place_order(&stop).await.unwrap();

        let tighter = OrderRequest::stop_market("BTCUSDT", Side::Sell, dec!(0.01), dec!(59500));
        let outcome = gateway
            .cancel_and_replace("BTCUSDT", &original.order_id, &tighter)
            .await
            .unwrap();

        let ReplaceOutcome::Replaced(new_order) = outcome else {
            panic!("expected replacement");
        };
        assert_eq!(new_order.stop_price, Some(dec!(59500)));
        assert_eq!(sim.cancelled_orders().await, vec![original.order_id.clone()]);

        // 이미 사라진 주문은 교체하지 않음
        let outcome = gateway
            .cancel_and_replace("BTCUSDT", &original.order_id, &tighter)
            .await
            .unwrap();
        assert_eq!(outcome, ReplaceOutcome::OriginalGone);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_replacement_restores_original() {
        let (sim, gateway) = setup().await;
        let gateway = gateway.with_retry(RetryConfig::no_retry());
        let stop = OrderRequest::stop_market("BTCUSDT", Side::Sell, dec!(0.01), dec!(59000)).reduce_only();
        let original = gateway.place_order(&stop).await.unwrap();

        sim.fail_next(SimOp::PlaceOrder, ExchangeError::OrderRejected("would trigger".into()), 1)
            .await;
        let tighter = OrderRequest::stop_market("BTCUSDT", Side::Sell, dec!(0.01), dec!(59500)).reduce_only();
        let outcome = gateway
            .cancel_and_replace("BTCUSDT", &original.order_id, &tighter)
            .await
            .unwrap();

        let ReplaceOutcome::Restored { order, error } = outcome else {
            panic!("expected restored order, got {:?}", outcome);
        };
        assert!(error.contains("would trigger"));
        assert_ne!(order.order_id, original.order_id);

        let open = gateway.open_orders("BTCUSDT").await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].order_id, order.order_id);
        assert_eq!(open[0].stop_price, Some(dec!(59000)));
        assert_eq!(open[0].quantity, dec!(0.01));
        assert!(open[0].reduce_only);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replace_reports_unprotected_when_restore_fails() {
        let (sim, gateway) = setup().await;
        let gateway = gateway.with_retry(RetryConfig::no_retry());
        let stop = OrderRequest::stop_market("BTCUSDT", Side::Sell, dec!(0.01), dec!(59000)).reduce_only();
        let original = gateway.place_order(&stop).await.unwrap();

        sim.fail_next(SimOp::PlaceOrder, ExchangeError::OrderRejected("rejected".into()), 2)
            .await;
        let tighter = OrderRequest::stop_market("BTCUSDT", Side::Sell, dec!(0.01), dec!(59500)).reduce_only();
        let outcome = gateway
            .cancel_and_replace("BTCUSDT", &original.order_id, &tighter)
            .await
            .unwrap();

        assert!(matches!(outcome, ReplaceOutcome::Unprotected { .. }));
        assert!(gateway.open_orders("BTCUSDT").await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_orders_where_keeps_reduce_only() {
        let (_sim, gateway) = setup().await;
        gateway
            .place_order(&OrderRequest::stop_market("BTCUSDT", Side::Buy, dec!(0.01), dec!(61000)))
            .await
            .unwrap();
        gateway
            .place_order(&OrderRequest::stop_market("BTCUSDT", Side::Sell, dec!(0.01), dec!(59000)).reduce_only())
            .await
            .unwrap();

        let cancelled = gateway
            .cancel_orders_where("BTCUSDT", |o| !o.reduce_only)
            .await
            .unwrap();

        assert_eq!(cancelled, 1);
        let remaining = gateway.open_orders("BTCUSDT").await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert!(remaining[0].reduce_only);
    }
}
