//! 시뮬레이션 선물 거래소 구현.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use trader_core::{
    AccountBalance, ExchangePosition, FundingInfo, Kline, OpenInterest, OpenOrder, OrderRequest,
    OrderStatus, OrderType, Price, Quantity, Side, SymbolFilters, Timeframe,
};

use crate::traits::FuturesExchange;
use crate::{ExchangeError, ExchangeResult};

/// 시뮬레이션 거래소 설정.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedConfig {
    /// 증거금 자산
    pub quote_asset: String,
    /// 초기 지갑 잔고
    pub initial_balance: Decimal,
    /// 레버리지 미설정 심볼의 기본 레버리지
    pub default_leverage: u32,
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self {
            quote_asset: "USDT".to_string(),
            initial_balance: dec!(10000),
            default_leverage: 1,
        }
    }
}

impl SimulatedConfig {
    /// 초기 잔고를 설정합니다.
    pub fn with_initial_balance(mut self, amount: Decimal) -> Self {
        self.initial_balance = amount;
        self
    }

    /// 증거금 자산을 설정합니다.
    pub fn with_quote_asset(mut self, asset: impl Into<String>) -> Self {
        self.quote_asset = asset.into();
        self
    }
}

/// 호출 계측과 장애 주입 대상 작업.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimOp {
    Ping,
    Balance,
    SymbolFilters,
    CurrentPrice,
    Klines,
    FundingInfo,
    OpenInterest,
    OpenOrders,
    PlaceOrder,
    CancelOrder,
    Positions,
    SetLeverage,
}

#[derive(Debug, Clone)]
struct SimPosition {
    amount: Decimal,
    entry_price: Price,
}

#[derive(Debug, Default)]
struct SimState {
    wallet: Decimal,
    available_override: Option<Decimal>,
    realized_pnl: Decimal,
    filters: HashMap<String, SymbolFilters>,
    prices: HashMap<String, Price>,
    klines: HashMap<String, Vec<Kline>>,
    funding: HashMap<String, Decimal>,
    open_interest: HashMap<String, Decimal>,
    leverage: HashMap<String, u32>,
    positions: HashMap<String, SimPosition>,
    orders: Vec<OpenOrder>,
    placed: Vec<OrderRequest>,
    cancelled: Vec<String>,
    next_order_id: u64,
    failures: HashMap<SimOp, VecDeque<ExchangeError>>,
    calls: HashMap<SimOp, u32>,
}

impl SimState {
    fn leverage_of(&self, symbol: &str, default: u32) -> u32 {
        self.leverage.get(symbol).copied().unwrap_or(default).max(1)
    }

    fn margin_used(&self, default_leverage: u32) -> Decimal {
        self.positions
            .iter()
            .map(|(symbol, p)| {
                p.amount.abs() * p.entry_price / Decimal::from(self.leverage_of(symbol, default_leverage))
            })
            .sum()
    }

    /// 체결을 포지션에 반영하고 실현 손익을 지갑에 더합니다.
    fn apply_fill(&mut self, symbol: &str, side: Side, quantity: Quantity, price: Price) {
        let signed = match side {
            Side::Buy => quantity,
            Side::Sell => -quantity,
        };

        let mut position = self.positions.remove(symbol).unwrap_or(SimPosition {
            amount: Decimal::ZERO,
            entry_price: price,
        });

        let same_direction = position.amount.is_zero()
            || position.amount.is_sign_positive() == signed.is_sign_positive();

        if same_direction {
            let new_amount = position.amount + signed;
            position.entry_price = (position.amount.abs() * position.entry_price + quantity * price)
                / new_amount.abs();
            position.amount = new_amount;
        } else {
            let closed = quantity.min(position.amount.abs());
            let direction = if position.amount.is_sign_positive() { Decimal::ONE } else { -Decimal::ONE };
            let pnl = closed * (price - position.entry_price) * direction;
            self.wallet += pnl;
            self.realized_pnl += pnl;

            position.amount += signed;
            if !position.amount.is_zero() && position.amount.is_sign_positive() != direction.is_sign_positive() {
                // 반대 방향으로 뒤집힘
                position.entry_price = price;
            }
        }

        if !position.amount.is_zero() {
            self.positions.insert(symbol.to_string(), position);
        }
    }

    /// 포지션 감소 주문의 실제 체결 가능 수량. 감소할 포지션이 없으면 `None`.
    fn reducible(&self, symbol: &str, side: Side, quantity: Quantity) -> Option<Quantity> {
        let position = self.positions.get(symbol)?;
        let reduces = match side {
            Side::Buy => position.amount.is_sign_negative(),
            Side::Sell => position.amount.is_sign_positive(),
        };
        reduces.then(|| quantity.min(position.amount.abs()))
    }

    fn fill_open_order(&mut self, order: OpenOrder, price: Price) {
        let quantity = if order.reduce_only {
            match self.reducible(&order.symbol, order.side, order.quantity) {
                Some(q) => q,
                None => {
                    debug!(order_id = %order.order_id, "Reduce-only order expired without position");
                    return;
                }
            }
        } else {
            order.quantity
        };

        info!(
            symbol = %order.symbol,
            order_id = %order.order_id,
            side = %order.side,
            quantity = %quantity,
            price = %price,
            "Simulated fill"
        );
        self.apply_fill(&order.symbol, order.side, quantity, price);
    }

    /// 가격 변화로 트리거된 스톱 주문을 체결합니다.
    fn trigger_stops(&mut self, symbol: &str, price: Price) {
        let (triggered, remaining): (Vec<_>, Vec<_>) = std::mem::take(&mut self.orders)
            .into_iter()
            .partition(|o| o.symbol == symbol && stop_triggered(o, price));
        self.orders = remaining;

        for order in triggered {
            let fill_price = match order.order_type {
                OrderType::StopLimit => order.price.unwrap_or(price),
                _ => price,
            };
            self.fill_open_order(order, fill_price);
        }
    }
}

fn stop_triggered(order: &OpenOrder, price: Price) -> bool {
    if !order.order_type.is_stop() {
        return false;
    }
    match (order.side, order.stop_price) {
        (Side::Buy, Some(stop)) => price >= stop,
        (Side::Sell, Some(stop)) => price <= stop,
        _ => false,
    }
}

/// 모의투자와 테스트를 위한 인메모리 선물 거래소.
///
/// 시장가 주문은 현재가로 즉시 체결되고, 스톱 주문은 [`set_price`](Self::set_price)로
/// 가격이 트리거를 통과할 때 체결됩니다. 시장 데이터 소스를 연결하면 가격, 캔들,
/// 필터 등 공개 데이터는 소스에서 가져오고 주문과 포지션만 시뮬레이션합니다.
pub struct SimulatedExchange {
    config: SimulatedConfig,
    state: RwLock<SimState>,
    market: Option<Arc<dyn FuturesExchange>>,
}

impl SimulatedExchange {
    /// 새로운 시뮬레이션 거래소를 생성합니다.
    pub fn new(config: SimulatedConfig) -> Self {
        let state = SimState {
            wallet: config.initial_balance,
            next_order_id: 1,
            ..Default::default()
        };

        Self {
            config,
            state: RwLock::new(state),
            market: None,
        }
    }

    /// 초기 잔고만 지정해 생성합니다.
    pub fn with_balance(balance: Decimal) -> Self {
        Self::new(SimulatedConfig::default().with_initial_balance(balance))
    }

    /// 공개 시장 데이터 소스를 연결합니다.
    pub fn with_market_source(mut self, market: Arc<dyn FuturesExchange>) -> Self {
        self.market = Some(market);
        self
    }

    async fn enter(&self, op: SimOp) -> ExchangeResult<()> {
        let mut state = self.state.write().await;
        *state.calls.entry(op).or_insert(0) += 1;
        match state.failures.get_mut(&op).and_then(|q| q.pop_front()) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    // === 시나리오 구성 ===

    /// 심볼 필터를 등록합니다.
    pub async fn add_symbol(&self, filters: SymbolFilters) {
        let mut state = self.state.write().await;
        state.filters.insert(filters.symbol.clone(), filters);
    }

    /// 심볼 거래 상태를 변경합니다.
    pub async fn set_tradable(&self, symbol: &str, tradable: bool) {
        if let Some(f) = self.state.write().await.filters.get_mut(symbol) {
            f.tradable = tradable;
        }
    }

    /// 가격을 갱신하고 트리거된 스톱 주문을 체결합니다.
    pub async fn set_price(&self, symbol: &str, price: Price) {
        let mut state = self.state.write().await;
        state.prices.insert(symbol.to_string(), price);
        state.trigger_stops(symbol, price);
    }

    pub async fn set_klines(&self, symbol: &str, klines: Vec<Kline>) {
        self.state.write().await.klines.insert(symbol.to_string(), klines);
    }

    pub async fn set_funding_rate(&self, symbol: &str, rate: Decimal) {
        self.state.write().await.funding.insert(symbol.to_string(), rate);
    }

    pub async fn set_open_interest(&self, symbol: &str, open_interest: Decimal) {
        self.state
            .write()
            .await
            .open_interest
            .insert(symbol.to_string(), open_interest);
    }

    /// 가용 잔고를 고정합니다. `None`이면 증거금 계산값을 사용합니다.
    pub async fn set_available(&self, available: Option<Decimal>) {
        self.state.write().await.available_override = available;
    }

    /// 포지션을 직접 설정합니다 (수량 부호가 방향).
    pub async fn set_position(&self, symbol: &str, amount: Decimal, entry_price: Price) {
        let mut state = self.state.write().await;
        if amount.is_zero() {
            state.positions.remove(symbol);
        } else {
            state
                .positions
                .insert(symbol.to_string(), SimPosition { amount, entry_price });
        }
    }

    /// 다음 `times`번의 `op` 호출이 `error`로 실패하도록 합니다.
    pub async fn fail_next(&self, op: SimOp, error: ExchangeError, times: usize) {
        let mut state = self.state.write().await;
        let queue = state.failures.entry(op).or_default();
        queue.extend(std::iter::repeat(error).take(times));
    }

    // === 주문 조작 ===

    /// 미체결 주문을 트리거/지정가로 체결시킵니다. 주문이 없으면 `false`.
    pub async fn fill_order(&self, order_id: &str) -> bool {
        let mut state = self.state.write().await;
        let Some(idx) = state.orders.iter().position(|o| o.order_id == order_id) else {
            return false;
        };
        let order = state.orders.remove(idx);
        let price = order
            .price
            .or(order.stop_price)
            .or_else(|| state.prices.get(&order.symbol).copied())
            .unwrap_or_default();
        state.fill_open_order(order, price);
        true
    }

    /// 미체결 주문을 체결 없이 제거합니다 (거래소 측 만료/취소).
    pub async fn expire_order(&self, order_id: &str) -> bool {
        let mut state = self.state.write().await;
        let before = state.orders.len();
        state.orders.retain(|o| o.order_id != order_id);
        state.orders.len() != before
    }

    // === 관측 ===

    pub async fn call_count(&self, op: SimOp) -> u32 {
        self.state.read().await.calls.get(&op).copied().unwrap_or(0)
    }

    /// 제출된 모든 주문 요청 (거부된 주문 제외).
    pub async fn placed_orders(&self) -> Vec<OrderRequest> {
        self.state.read().await.placed.clone()
    }

    /// 취소된 주문 ID 목록.
    pub async fn cancelled_orders(&self) -> Vec<String> {
        self.state.read().await.cancelled.clone()
    }

    /// 모든 심볼의 미체결 주문.
    pub async fn all_open_orders(&self) -> Vec<OpenOrder> {
        self.state.read().await.orders.clone()
    }

    pub async fn wallet_balance(&self) -> Decimal {
        self.state.read().await.wallet
    }

    pub async fn realized_pnl(&self) -> Decimal {
        self.state.read().await.realized_pnl
    }

    pub async fn leverage_of(&self, symbol: &str) -> Option<u32> {
        self.state.read().await.leverage.get(symbol).copied()
    }

    async fn local_price(&self, symbol: &str) -> Option<Price> {
        self.state.read().await.prices.get(symbol).copied()
    }
}

#[async_trait]
impl FuturesExchange for SimulatedExchange {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn ping(&self) -> ExchangeResult<()> {
        self.enter(SimOp::Ping).await?;
        match &self.market {
            Some(market) => market.ping().await,
            None => Ok(()),
        }
    }

    async fn balance(&self, asset: &str) -> ExchangeResult<AccountBalance> {
        self.enter(SimOp::Balance).await?;
        if asset != self.config.quote_asset {
            return Err(ExchangeError::AssetNotFound(asset.to_string()));
        }

        let state = self.state.read().await;
        let available = state
            .available_override
            .unwrap_or_else(|| state.wallet - state.margin_used(self.config.default_leverage));

        Ok(AccountBalance {
            asset: asset.to_string(),
            total: state.wallet,
            available,
        })
    }

    async fn symbol_filters(&self, symbol: &str) -> ExchangeResult<SymbolFilters> {
        self.enter(SimOp::SymbolFilters).await?;
        if let Some(filters) = self.state.read().await.filters.get(symbol) {
            return Ok(filters.clone());
        }
        match &self.market {
            Some(market) => market.symbol_filters(symbol).await,
            None => Err(ExchangeError::SymbolNotFound(symbol.to_string())),
        }
    }

    async fn current_price(&self, symbol: &str) -> ExchangeResult<Price> {
        self.enter(SimOp::CurrentPrice).await?;
        if let Some(market) = &self.market {
            let price = market.current_price(symbol).await?;
            self.set_price(symbol, price).await;
            return Ok(price);
        }
        self.local_price(symbol)
            .await
            .ok_or_else(|| ExchangeError::SymbolNotFound(symbol.to_string()))
    }

    async fn klines(&self, symbol: &str, timeframe: Timeframe, limit: u32) -> ExchangeResult<Vec<Kline>> {
        self.enter(SimOp::Klines).await?;
        if let Some(klines) = self.state.read().await.klines.get(symbol) {
            let skip = klines.len().saturating_sub(limit as usize);
            return Ok(klines[skip..].to_vec());
        }
        match &self.market {
            Some(market) => market.klines(symbol, timeframe, limit).await,
            None => Ok(Vec::new()),
        }
    }

    async fn funding_info(&self, symbol: &str) -> ExchangeResult<FundingInfo> {
        self.enter(SimOp::FundingInfo).await?;
        let local = {
            let state = self.state.read().await;
            state.funding.get(symbol).map(|rate| FundingInfo {
                symbol: symbol.to_string(),
                mark_price: state.prices.get(symbol).copied().unwrap_or_default(),
                last_funding_rate: *rate,
            })
        };
        match (local, &self.market) {
            (Some(info), _) => Ok(info),
            (None, Some(market)) => market.funding_info(symbol).await,
            (None, None) => Err(ExchangeError::SymbolNotFound(symbol.to_string())),
        }
    }

    async fn open_interest(&self, symbol: &str) -> ExchangeResult<OpenInterest> {
        self.enter(SimOp::OpenInterest).await?;
        let local = self.state.read().await.open_interest.get(symbol).copied();
        match (local, &self.market) {
            (Some(oi), _) => Ok(OpenInterest {
                symbol: symbol.to_string(),
                open_interest: oi,
                time: Utc::now(),
            }),
            (None, Some(market)) => market.open_interest(symbol).await,
            (None, None) => Err(ExchangeError::SymbolNotFound(symbol.to_string())),
        }
    }

    async fn open_orders(&self, symbol: &str) -> ExchangeResult<Vec<OpenOrder>> {
        self.enter(SimOp::OpenOrders).await?;
        Ok(self
            .state
            .read()
            .await
            .orders
            .iter()
            .filter(|o| o.symbol == symbol)
            .cloned()
            .collect())
    }

    async fn place_order(&self, request: &OrderRequest) -> ExchangeResult<OpenOrder> {
        self.enter(SimOp::PlaceOrder).await?;
        let mut state = self.state.write().await;
        let price = state.prices.get(&request.symbol).copied();

        if request.order_type.is_stop() {
            if let (Some(price), Some(stop)) = (price, request.stop_price) {
                let immediate = match request.side {
                    Side::Buy => price >= stop,
                    Side::Sell => price <= stop,
                };
                if immediate {
                    return Err(ExchangeError::OrderRejected(
                        "Order would immediately trigger.".to_string(),
                    ));
                }
            }
        }

        let order_id = state.next_order_id.to_string();
        state.next_order_id += 1;
        state.placed.push(request.clone());

        let mut order = OpenOrder {
            order_id,
            client_order_id: request.client_order_id.clone(),
            symbol: request.symbol.clone(),
            side: request.side,
            order_type: request.order_type,
            status: OrderStatus::New,
            quantity: request.quantity,
            price: request.price,
            stop_price: request.stop_price,
            reduce_only: request.reduce_only,
        };

        if request.order_type == OrderType::Market {
            let price = price.ok_or_else(|| {
                ExchangeError::InvalidOrder(format!("no market price for {}", request.symbol))
            })?;
            if request.reduce_only
                && state
                    .reducible(&request.symbol, request.side, request.quantity)
                    .is_none()
            {
                state.placed.pop();
                return Err(ExchangeError::OrderRejected(
                    "ReduceOnly Order is rejected.".to_string(),
                ));
            }
            state.fill_open_order(order.clone(), price);
            order.status = OrderStatus::Filled;
        } else {
            state.orders.push(order.clone());
        }

        Ok(order)
    }

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> ExchangeResult<()> {
        self.enter(SimOp::CancelOrder).await?;
        let mut state = self.state.write().await;
        let idx = state
            .orders
            .iter()
            .position(|o| o.symbol == symbol && o.order_id == order_id)
            .ok_or_else(|| ExchangeError::OrderNotFound(format!("Unknown order sent: {}", order_id)))?;

        state.orders.remove(idx);
        state.cancelled.push(order_id.to_string());
        Ok(())
    }

    async fn positions(&self) -> ExchangeResult<Vec<ExchangePosition>> {
        self.enter(SimOp::Positions).await?;
        let state = self.state.read().await;

        Ok(state
            .positions
            .iter()
            .map(|(symbol, p)| {
                let mark = state.prices.get(symbol).copied().unwrap_or(p.entry_price);
                ExchangePosition {
                    symbol: symbol.clone(),
                    amount: p.amount,
                    entry_price: p.entry_price,
                    mark_price: mark,
                    unrealized_pnl: (mark - p.entry_price) * p.amount,
                    leverage: state.leverage_of(symbol, self.config.default_leverage),
                }
            })
            .collect())
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> ExchangeResult<()> {
        self.enter(SimOp::SetLeverage).await?;
        if leverage == 0 {
            return Err(ExchangeError::ApiError {
                code: -4028,
                message: "Leverage 0 is not valid".to_string(),
            });
        }
        self.state
            .write()
            .await
            .leverage
            .insert(symbol.to_string(), leverage);
        Ok(())
    }
}
