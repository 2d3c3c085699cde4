//! 리스크 매니저 구현.
//!
//! 게이트웨이 위에서 동작하는 리스크 작업의 통합 인터페이스:
//! - 주문 직전 잔고를 다시 읽어 포지션 크기 계산
//! - 긴급 청산 (전체, 롱만, 단일 포지션, 부분 축소)
//! - 헤지 진입/청산
//! - 리스크 액션 실행
//!
//! 청산 작업은 최선 노력(best-effort) 방식입니다. 한 심볼의 실패가 나머지
//! 심볼의 청산을 막지 않으며, 실제로 청산된 포지션만 결과로 반환됩니다.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};
use trader_core::{
    AccountBalance, ActiveAsset, ExchangePosition, HedgeSpec, OpenOrder, OrderGroup,
    OrderRequest, Price, Quantity, Side, Timeframe, TradeRecord, TradingPlan,
};
use trader_exchange::{ExchangeError, ExchangeGateway, ExchangeResult};

use crate::actions::{RiskAction, UnsupportedAction};
use crate::atr::atr;
use crate::config::RiskConfig;
use crate::position_sizing::{calculate_position_size, PositionSize, SizingRejection, SizingRequest};

/// 청산된 포지션 정보 (저널 기록용).
#[derive(Debug, Clone, PartialEq)]
pub struct ClosedPosition {
    pub symbol: String,
    /// 포지션 방향 (롱 = Buy)
    pub side: Side,
    pub quantity: Quantity,
    pub entry_price: Price,
    /// 청산 시점의 마크 가격
    pub exit_price: Price,
    /// 청산 수량에 해당하는 미실현 손익
    pub pnl: Decimal,
    pub order_id: Option<String>,
}

impl ClosedPosition {
    /// 거래소 포지션의 `quantity`만큼을 청산한 기록을 생성합니다.
    pub fn from_position(position: &ExchangePosition, quantity: Quantity, order_id: Option<String>) -> Self {
        let size = position.size();
        let pnl = if size.is_zero() {
            Decimal::ZERO
        } else {
            position.unrealized_pnl * quantity / size
        };

        Self {
            symbol: position.symbol.clone(),
            side: position.side().unwrap_or(Side::Buy),
            quantity,
            entry_price: position.entry_price,
            exit_price: position.mark_price,
            pnl,
            order_id,
        }
    }

    /// 저널 기록으로 변환합니다.
    pub fn to_trade_record(&self, reason: &str, at: DateTime<Utc>) -> TradeRecord {
        TradeRecord {
            timestamp: at,
            symbol: self.symbol.clone(),
            side: self.side,
            entry_price: self.entry_price,
            exit_price: self.exit_price,
            quantity: self.quantity,
            pnl: self.pnl,
            reason: reason.to_string(),
        }
    }
}

/// 포지션 크기 계산 실패.
#[derive(Debug, thiserror::Error)]
pub enum SizingError {
    /// 리스크 한도로 주문하지 않음
    #[error("order skipped: {0}")]
    Rejected(#[from] SizingRejection),

    /// 잔고/필터 조회 실패
    #[error("sizing inputs unavailable: {0}")]
    Exchange(#[from] ExchangeError),
}

/// 리스크 액션 실행 결과.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionOutcome {
    /// 청산(또는 축소)된 포지션
    pub closed: Vec<ClosedPosition>,
    /// 취소된 주문 수
    pub cancelled_orders: usize,
    /// 실행하지 못한 사유 (대상 포지션 없음 등)
    pub skipped: Option<String>,
}

impl ActionOutcome {
    fn skipped(reason: impl Into<String>) -> Self {
        Self {
            skipped: Some(reason.into()),
            ..Default::default()
        }
    }
}

/// 게이트웨이 기반 리스크 매니저.
pub struct RiskManager {
    gateway: Arc<ExchangeGateway>,
    plan: Arc<TradingPlan>,
    config: RiskConfig,
    quote_asset: String,
}

impl RiskManager {
    /// 새 리스크 매니저 생성.
    pub fn new(
        gateway: Arc<ExchangeGateway>,
        plan: Arc<TradingPlan>,
        config: RiskConfig,
        quote_asset: impl Into<String>,
    ) -> Self {
        Self {
            gateway,
            plan,
            config,
            quote_asset: quote_asset.into(),
        }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    pub fn plan(&self) -> &TradingPlan {
        &self.plan
    }

    /// 공유 플랜 핸들.
    pub fn shared_plan(&self) -> Arc<TradingPlan> {
        Arc::clone(&self.plan)
    }

    pub fn gateway(&self) -> &Arc<ExchangeGateway> {
        &self.gateway
    }

    pub fn quote_asset(&self) -> &str {
        &self.quote_asset
    }

    /// 증거금 자산 잔고를 조회합니다. 캐시하지 않습니다.
    pub async fn balance(&self) -> ExchangeResult<AccountBalance> {
        self.gateway.balance(&self.quote_asset).await
    }

    /// 주문 그룹의 포지션 크기를 계산합니다.
    ///
    /// 잔고와 심볼 필터를 계산 직전에 다시 조회합니다.
    pub async fn size_order(
        &self,
        asset: &ActiveAsset,
        group: &OrderGroup,
        in_oco_pair: bool,
    ) -> Result<PositionSize, SizingError> {
        let balance = self.balance().await?;
        let filters = self.gateway.symbol_filters(&asset.symbol).await?;

        let request = SizingRequest::for_group(
            &self.plan,
            asset,
            group,
            &balance,
            self.config.margin_multiplier(in_oco_pair),
        );
        let size = calculate_position_size(&request, &filters)?;

        debug!(
            symbol = %asset.symbol,
            equity = %balance.total,
            by_risk = %size.by_risk,
            by_notional = %size.by_notional,
            by_margin = %size.by_margin,
            quantity = %size.quantity,
            "Position sized"
        );
        Ok(size)
    }

    /// 심볼의 최근 ATR. 캔들이 부족하면 `None`.
    pub async fn atr(&self, symbol: &str, window_min: Option<u32>) -> ExchangeResult<Option<Decimal>> {
        let minutes = window_min.unwrap_or(self.config.default_atr_window_min);
        let timeframe = Timeframe::from_minutes(u64::from(minutes)).ok_or_else(|| {
            ExchangeError::InvalidOrder(format!("unsupported ATR window {}m", minutes))
        })?;

        let klines = self
            .gateway
            .klines(symbol, timeframe, self.config.kline_limit)
            .await?;
        Ok(atr(&klines, self.config.atr_period))
    }

    // === 청산 ===

    /// 포지션 하나를 정확한 수량의 감소 전용 시장가 주문으로 청산합니다.
    pub async fn close_position(
        &self,
        position: &ExchangePosition,
        reason: &str,
    ) -> ExchangeResult<ClosedPosition> {
        let request =
            OrderRequest::close_market(&position.symbol, position.closing_side(), position.size());
        let order = self.gateway.place_order(&request).await?;

        info!(
            symbol = %position.symbol,
            amount = %position.amount,
            reason,
            order_id = %order.order_id,
            "Position closed"
        );
        Ok(ClosedPosition::from_position(position, position.size(), Some(order.order_id)))
    }

    /// 심볼의 현재 포지션을 청산합니다. 포지션이 없으면 `None`.
    pub async fn close_symbol(&self, symbol: &str, reason: &str) -> ExchangeResult<Option<ClosedPosition>> {
        match self.gateway.position(symbol).await? {
            Some(position) => self.close_position(&position, reason).await.map(Some),
            None => Ok(None),
        }
    }

    /// 조건에 맞는 열린 포지션을 모두 청산합니다.
    async fn close_where<P>(&self, reason: &str, keep_hedge: bool, predicate: P) -> Vec<ClosedPosition>
    where
        P: Fn(&ExchangePosition) -> bool,
    {
        let positions = match self.gateway.positions().await {
            Ok(positions) => positions,
            Err(e) => {
                warn!(reason, error = %e, "Cannot list positions for close");
                return Vec::new();
            }
        };

        let mut closed = Vec::new();
        for position in positions.iter().filter(|p| predicate(p)) {
            if keep_hedge && self.plan.is_hedge_symbol(&position.symbol) {
                debug!(symbol = %position.symbol, "Keeping hedge position");
                continue;
            }
            match self.close_position(position, reason).await {
                Ok(record) => closed.push(record),
                Err(e) => warn!(symbol = %position.symbol, reason, error = %e, "Failed to close position"),
            }
        }
        closed
    }

    /// 모든 열린 포지션을 청산합니다.
    pub async fn close_all(&self, reason: &str, keep_hedge: bool) -> Vec<ClosedPosition> {
        let closed = self.close_where(reason, keep_hedge, |_| true).await;
        info!(reason, keep_hedge, closed = closed.len(), "Close-all finished");
        closed
    }

    /// 롱 포지션만 청산합니다.
    pub async fn close_longs(&self, reason: &str, keep_hedge: bool) -> Vec<ClosedPosition> {
        let closed = self.close_where(reason, keep_hedge, ExchangePosition::is_long).await;
        info!(reason, keep_hedge, closed = closed.len(), "Close-longs finished");
        closed
    }

    /// 포지션을 비율만큼 축소합니다. 수량 단위로 내림한 결과가 0이면 `None`.
    pub async fn reduce(
        &self,
        position: &ExchangePosition,
        ratio: Decimal,
        reason: &str,
    ) -> ExchangeResult<Option<ClosedPosition>> {
        if ratio <= Decimal::ZERO {
            return Ok(None);
        }
        let raw = position.size() * ratio.min(Decimal::ONE);
        let quantity = self.gateway.normalize_quantity(&position.symbol, raw).await?;
        if quantity <= Decimal::ZERO {
            warn!(symbol = %position.symbol, %ratio, "Reduce quantity rounds to zero, skipping");
            return Ok(None);
        }

        let request = OrderRequest::close_market(&position.symbol, position.closing_side(), quantity);
        let order = self.gateway.place_order(&request).await?;

        info!(symbol = %position.symbol, %quantity, %ratio, reason, "Position reduced");
        Ok(Some(ClosedPosition::from_position(position, quantity, Some(order.order_id))))
    }

    // === 헤지 ===

    /// 주 포지션 반대 방향으로 헤지를 엽니다.
    ///
    /// 헤지 심볼에 이미 포지션이 있으면 아무것도 하지 않습니다.
    pub async fn open_hedge(
        &self,
        main: &ExchangePosition,
        spec: &HedgeSpec,
    ) -> ExchangeResult<Option<OpenOrder>> {
        if main.is_flat() {
            return Ok(None);
        }
        if self.gateway.position(&spec.symbol).await?.is_some() {
            debug!(hedge = %spec.symbol, "Hedge already open");
            return Ok(None);
        }

        let main_price = if main.mark_price > Decimal::ZERO {
            main.mark_price
        } else {
            main.entry_price
        };
        let hedge_notional = main.size() * main_price * spec.size_pct;
        let hedge_price = self.gateway.current_price(&spec.symbol).await?;
        if hedge_price <= Decimal::ZERO {
            return Err(ExchangeError::InvalidOrder(format!(
                "non-positive price for hedge {}",
                spec.symbol
            )));
        }

        let quantity = self
            .gateway
            .normalize_quantity(&spec.symbol, hedge_notional / hedge_price)
            .await?;
        if quantity <= Decimal::ZERO {
            warn!(hedge = %spec.symbol, %hedge_notional, "Hedge quantity rounds to zero, skipping");
            return Ok(None);
        }

        let side = main.closing_side();
        let order = self
            .gateway
            .place_order(&OrderRequest::market(&spec.symbol, side, quantity))
            .await?;

        info!(
            main = %main.symbol,
            hedge = %spec.symbol,
            %side,
            %quantity,
            "Hedge opened"
        );
        Ok(Some(order))
    }

    /// 헤지 포지션을 청산합니다. 포지션이 없으면 `None`.
    pub async fn close_hedge(&self, symbol: &str, reason: &str) -> ExchangeResult<Option<ClosedPosition>> {
        self.close_symbol(symbol, reason).await
    }

    // === 주문 취소 ===

    /// 플랜 자산과 헤지 심볼의 모든 미체결 주문을 취소합니다.
    pub async fn cancel_all_orders(&self) -> usize {
        let mut cancelled = 0;
        for symbol in plan_symbols(&self.plan) {
            match self.gateway.cancel_all_open_orders(&symbol).await {
                Ok(n) => cancelled += n,
                Err(e) => warn!(symbol = %symbol, error = %e, "Failed to cancel orders"),
            }
        }
        cancelled
    }

    // === 리스크 액션 ===

    /// 리스크 액션을 실행합니다.
    ///
    /// `position`은 모니터링 규칙처럼 특정 포지션에 걸린 액션에서만 주어집니다.
    /// 알림 전송은 호출자 책임입니다.
    pub async fn execute_risk_action(
        &self,
        action: &RiskAction,
        reason: &str,
        position: Option<&ExchangePosition>,
    ) -> ActionOutcome {
        info!(%action, reason, symbol = position.map(|p| p.symbol.as_str()), "Executing risk action");

        match action {
            RiskAction::CloseAll => ActionOutcome {
                closed: self.close_all(reason, false).await,
                ..Default::default()
            },
            RiskAction::CloseLongsKeepHedge => ActionOutcome {
                closed: self.close_longs(reason, true).await,
                ..Default::default()
            },
            RiskAction::CloseLongs => ActionOutcome {
                closed: self.close_longs(reason, false).await,
                ..Default::default()
            },
            RiskAction::CancelAllOrders => ActionOutcome {
                cancelled_orders: self.cancel_all_orders().await,
                ..Default::default()
            },
            RiskAction::ClosePosition => {
                let Some(position) = position else {
                    return ActionOutcome::skipped("close_position requires a target position");
                };
                match self.close_position(position, reason).await {
                    Ok(record) => ActionOutcome {
                        closed: vec![record],
                        ..Default::default()
                    },
                    Err(e) => {
                        warn!(symbol = %position.symbol, error = %e, "Risk action close failed");
                        ActionOutcome::skipped(e.to_string())
                    }
                }
            }
            RiskAction::ReducePosition(ratio) => {
                let Some(position) = position else {
                    return ActionOutcome::skipped("reduce_position requires a target position");
                };
                match self.reduce(position, *ratio, reason).await {
                    Ok(Some(record)) => ActionOutcome {
                        closed: vec![record],
                        ..Default::default()
                    },
                    Ok(None) => ActionOutcome::skipped("reduce quantity rounds to zero"),
                    Err(e) => {
                        warn!(symbol = %position.symbol, error = %e, "Risk action reduce failed");
                        ActionOutcome::skipped(e.to_string())
                    }
                }
            }
            RiskAction::Notify => ActionOutcome::default(),
        }
    }

    /// 모니터링 규칙의 액션 문자열을 해석해 포지션에 대해 실행합니다.
    pub async fn handle_monitoring_action(
        &self,
        action_name: &str,
        rule_name: &str,
        position: &ExchangePosition,
    ) -> Result<ActionOutcome, UnsupportedAction> {
        let action: RiskAction = action_name.parse()?;
        let reason = format!("Monitoring rule {}", rule_name);
        Ok(self.execute_risk_action(&action, &reason, Some(position)).await)
    }
}

/// 플랜 자산과 헤지 심볼 목록 (중복 제거, 선언 순서 유지).
pub fn plan_symbols(plan: &TradingPlan) -> Vec<String> {
    let mut symbols: Vec<String> = Vec::new();
    for asset in &plan.active_assets {
        let hedge = asset.hedge.as_ref().map(|h| h.symbol.as_str());
        for symbol in std::iter::once(asset.symbol.as_str()).chain(hedge) {
            if !symbols.iter().any(|s| s == symbol) {
                symbols.push(symbol.to_string());
            }
        }
    }
    symbols
}
