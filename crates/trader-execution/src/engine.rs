//! 플랜 실행 엔진.
//!
//! 한 틱의 처리 순서는 고정되어 있습니다:
//!
//! 1. 단계 실행 (허용 오차 안의 미실행 단계, 최대 한 번)
//! 2. OCO 정리
//! 3. 포지션 관리 (신규/종료 감지, 모니터링 규칙, 트레일링 스톱)
//! 4. 전역 리스크 평가 (킬스위치 → 강제 청산 시각 → 변동성 차단기 → 급락 트리거)
//!
//! 각 단계의 거래소 실패는 로그로 남기고 다음 단계로 넘어갑니다. 루프는 런타임
//! 에러로 종료되지 않으며, 시작 점검 실패만 호출자에게 전파됩니다.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn, Instrument};
use trader_core::{
    trading_span, ActiveAsset, EngineConfig, ExchangePosition, Journal, OpenOrder, OrderGroup,
    Side, TradeRecord, TradingPlan,
};
use trader_exchange::{ExchangeGateway, ReplaceOutcome};
use trader_notification::NotificationManager;
use trader_risk::{
    ClosedPosition, FlashDropDetector, RiskAction, RiskManager, TrailingDecision,
    TrailingStopRule, VolatilityCheck, VolatilityMonitor,
};

use crate::error::ExecutionResult;
use crate::guards::{EntryWindow, KillSwitch, TimeStop};
use crate::oco::{OcoBook, OcoPair, OcoResolution};
use crate::phases::{ActionRegistry, PhaseAction, PhaseSchedule, ScheduledPhase};
use crate::placement::{
    build_entry_request, build_stop_loss_request, trigger_already_crossed, SkipReason,
};
use crate::positions::{
    funding_rule_fires, ManagedPosition, FUNDING_RATE_RULE, OPEN_INTEREST_RULE,
};
use crate::startup::{run_startup_checks, StartupReport};

/// 외부에서 사라진 포지션의 저널 사유.
const POSITION_CLOSED_REASON: &str = "Position closed (stop/target)";

fn side_label(side: Side) -> &'static str {
    match side {
        Side::Buy => "LONG",
        Side::Sell => "SHORT",
    }
}

/// 플랜 실행 엔진.
///
/// 루프 상태(관리 포지션, OCO 쌍, 실행된 단계, 가격 기록)를 모두 소유합니다.
/// 인스턴스당 하나의 구동자만 가정합니다.
pub struct Engine {
    plan: Arc<TradingPlan>,
    config: EngineConfig,
    tz: Tz,
    tolerance: Duration,
    entry_window: EntryWindow,
    time_stop: TimeStop,

    gateway: Arc<ExchangeGateway>,
    risk: Arc<RiskManager>,
    notifier: NotificationManager,
    journal: Arc<dyn Journal>,

    registry: ActionRegistry,
    schedule: PhaseSchedule,
    executed_phases: HashSet<String>,
    oco: OcoBook,
    positions: HashMap<String, ManagedPosition>,

    kill_switch: KillSwitch,
    volatility: VolatilityMonitor,
    flash_drops: FlashDropDetector,
}

impl Engine {
    /// 새 엔진을 생성합니다.
    ///
    /// 시간대, 진입 시간대, 강제 청산 시각, 단계 스케줄을 여기서 한 번만 해석합니다.
    pub fn new(
        config: EngineConfig,
        risk: Arc<RiskManager>,
        notifier: NotificationManager,
        journal: Arc<dyn Journal>,
    ) -> ExecutionResult<Self> {
        let plan = risk.shared_plan();
        let tz = config.tz()?;
        let (entry_start, entry_end) = config.entry_window()?;
        let time_stop = TimeStop::new(config.time_stop_at()?);
        let schedule = PhaseSchedule::from_plan(&plan, tz)?;
        let volatility = VolatilityMonitor::new(risk.config().volatility.clone());

        debug!(
            plan_date = %plan.plan_date,
            timezone = %tz,
            phases = schedule.phases().len(),
            "Engine created"
        );

        Ok(Self {
            tolerance: Duration::seconds(config.phase_tolerance_secs.max(0)),
            entry_window: EntryWindow::new(entry_start, entry_end),
            gateway: Arc::clone(risk.gateway()),
            plan,
            config,
            tz,
            time_stop,
            risk,
            notifier,
            journal,
            registry: ActionRegistry::new(),
            schedule,
            executed_phases: HashSet::new(),
            oco: OcoBook::new(),
            positions: HashMap::new(),
            kill_switch: KillSwitch::new(),
            volatility,
            flash_drops: FlashDropDetector::new(),
        })
    }

    // === 조회 ===

    pub fn plan(&self) -> &TradingPlan {
        &self.plan
    }

    pub fn risk(&self) -> &Arc<RiskManager> {
        &self.risk
    }

    pub fn schedule(&self) -> &PhaseSchedule {
        &self.schedule
    }

    pub fn executed_phases(&self) -> &HashSet<String> {
        &self.executed_phases
    }

    pub fn oco_pair(&self, symbol: &str) -> Option<&OcoPair> {
        self.oco.get(symbol)
    }

    pub fn managed_position(&self, symbol: &str) -> Option<&ManagedPosition> {
        self.positions.get(symbol)
    }

    /// 킬스위치로 오늘 신규 진입이 중단되었는지 확인합니다.
    pub fn is_paused(&self, now: DateTime<Utc>) -> bool {
        self.kill_switch.is_paused(self.tz, now)
    }

    // === 수명 주기 ===

    /// 시작 점검을 실행하고 결과를 알립니다.
    pub async fn startup_checks(&self) -> ExecutionResult<StartupReport> {
        let report = run_startup_checks(&self.risk, &self.registry).await?;
        self.notifier
            .info(format!(
                "Engine ready for plan {}: equity {} {}, required margin {} of {} limit, {} phases",
                self.plan.plan_date,
                report.equity.round_dp(2),
                self.config.quote_asset,
                report.required_margin.round_dp(2),
                report.margin_limit.round_dp(2),
                self.schedule.phases().len(),
            ))
            .await;
        Ok(report)
    }

    /// 종료 신호가 올 때까지 고정 간격으로 틱을 실행합니다.
    pub async fn run<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let period = std::time::Duration::from_secs(self.config.tick_interval_secs.max(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(tick_secs = period.as_secs(), "Engine loop started");
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break;
                }
                _ = ticker.tick() => self.tick_at(Utc::now()).await,
            }
        }

        self.shutdown().await;
    }

    /// 종료 처리. 설정에 따라 모든 포지션을 청산합니다.
    pub async fn shutdown(&mut self) {
        if self.config.close_positions_on_shutdown {
            let closed = self.risk.close_all("Shutdown", false).await;
            self.record_closed(closed, "Shutdown", false, Utc::now()).await;
        }
        info!(managed = self.positions.len(), "Engine stopped");
        self.notifier
            .warning(format!(
                "Engine stopped ({} managed positions, {} OCO pairs)",
                self.positions.len(),
                self.oco.len()
            ))
            .await;
    }

    /// 주어진 시각으로 한 틱을 실행합니다.
    pub async fn tick_at(&mut self, now: DateTime<Utc>) {
        self.dispatch_phases(now).await;
        self.reconcile_oco().await;
        self.manage_positions(now).await;
        self.evaluate_global_risk(now).await;
    }

    // === 1. 단계 실행 ===

    /// 실행 시점이 된 단계를 실행합니다.
    ///
    /// 단계는 핸들러 실행 전에 실행됨으로 기록되므로, 실패하더라도 같은 실행
    /// 중에 다시 실행되지 않습니다.
    pub async fn dispatch_phases(&mut self, now: DateTime<Utc>) {
        let due: Vec<ScheduledPhase> = self
            .schedule
            .due(now, self.tolerance, &self.executed_phases)
            .cloned()
            .collect();

        for phase in due {
            self.executed_phases.insert(phase.name.clone());

            let Some(action_name) = phase.action.as_deref() else {
                error!(phase = %phase.name, "Phase has no action");
                self.notifier
                    .critical(format!("Phase '{}' has no action configured", phase.name))
                    .await;
                continue;
            };

            match self.registry.resolve(action_name) {
                Ok(action) => {
                    info!(phase = %phase.name, %action, "Executing phase");
                    self.run_phase_action(action, now).await;
                }
                Err(e) => {
                    error!(phase = %phase.name, error = %e, "Phase action not registered");
                    self.notifier
                        .critical(format!("Phase '{}': {}", phase.name, e))
                        .await;
                }
            }
        }
    }

    /// 단계 액션 핸들러.
    pub async fn run_phase_action(&mut self, action: PhaseAction, now: DateTime<Utc>) {
        match action {
            PhaseAction::PlaceAllOrders => self.place_all_orders(now).await,
            PhaseAction::CancelAllUntriggered => self.cancel_all_untriggered().await,
            PhaseAction::EndOfDayChecklist => self.end_of_day_checklist(now).await,
            PhaseAction::CloseAllPositions => self.close_all_positions(now).await,
        }
    }

    async fn place_all_orders(&mut self, now: DateTime<Utc>) {
        if self.kill_switch.is_paused(self.tz, now) {
            warn!(reason = %SkipReason::Paused, "Order placement skipped");
            self.notifier
                .warning("Order placement skipped: trading paused by kill-switch")
                .await;
            return;
        }
        if !self.entry_window.contains_at(self.tz, now) {
            warn!(reason = %SkipReason::OutsideEntryWindow, "Order placement skipped");
            self.notifier
                .warning("Order placement skipped: outside entry window")
                .await;
            return;
        }

        let plan = Arc::clone(&self.plan);
        for asset in &plan.active_assets {
            if !asset.is_oco_breakout() {
                info!(symbol = %asset.symbol, strategy = %asset.strategy, "Strategy not handled, skipping");
                continue;
            }

            let span = trading_span!("place_orders", asset.symbol);
            match self.place_asset_orders(asset, now).instrument(span).await {
                Ok(placed) => self.announce_placement(asset, &placed).await,
                Err(reason) => info!(symbol = %asset.symbol, %reason, "Asset skipped"),
            }
        }
    }

    /// 한 자산의 진입 주문을 배치합니다.
    ///
    /// 두 레그가 모두 유효하면 둘 다 수량이 나와야 배치하고, 두 번째 레그가
    /// 실패하면 이미 접수된 첫 레그를 취소합니다.
    async fn place_asset_orders(
        &mut self,
        asset: &ActiveAsset,
        now: DateTime<Utc>,
    ) -> Result<Vec<OpenOrder>, SkipReason> {
        let symbol = asset.symbol.as_str();
        if self.oco.contains(symbol) {
            return Err(SkipReason::PairExists);
        }

        let mut legs: Vec<(Side, &OrderGroup)> = Vec::new();
        for (side, group) in [(Side::Buy, asset.bullish()), (Side::Sell, asset.bearish())] {
            let Some(group) = group else { continue };
            if group.is_valid_at(now) {
                legs.push((side, group));
            } else {
                info!(symbol, %side, reason = %SkipReason::OutsideValidity, "Leg skipped");
            }
        }
        if legs.is_empty() {
            return Err(SkipReason::OutsideValidity);
        }

        let exchange = |e: trader_exchange::ExchangeError| SkipReason::Exchange(e.to_string());

        if !self.gateway.is_tradable(symbol).await.map_err(exchange)? {
            return Err(SkipReason::NotTradable);
        }

        let balance = self.risk.balance().await.map_err(exchange)?;
        let ratio = balance.free_margin_ratio();
        let floor = self.risk.config().min_free_margin_ratio;
        if ratio < floor {
            return Err(SkipReason::LowFreeMargin { ratio, floor });
        }

        self.gateway
            .set_leverage(symbol, asset.leverage)
            .await
            .map_err(exchange)?;

        let price = self.gateway.current_price(symbol).await.map_err(exchange)?;
        legs.retain(|(side, group)| {
            let crossed = trigger_already_crossed(*side, price, group.trigger_price);
            if crossed {
                let reason = SkipReason::TriggerCrossed {
                    price,
                    trigger: group.trigger_price,
                };
                warn!(symbol, %side, %reason, "Leg skipped");
            }
            !crossed
        });
        if legs.is_empty() {
            return Err(SkipReason::NoEligibleLeg);
        }

        let in_oco_pair = legs.len() == 2;
        let mut requests = Vec::with_capacity(legs.len());
        for (side, group) in &legs {
            let size = self
                .risk
                .size_order(asset, group, in_oco_pair)
                .await
                .map_err(|e| SkipReason::Sizing(e.to_string()))?;
            requests.push(build_entry_request(symbol, *side, group, size.quantity));
        }

        let mut placed: Vec<OpenOrder> = Vec::with_capacity(requests.len());
        for request in &requests {
            match self.gateway.place_order(request).await {
                Ok(order) => {
                    info!(
                        symbol,
                        side = %order.side,
                        order_id = %order.order_id,
                        quantity = %order.quantity,
                        stop_price = ?order.stop_price,
                        "Entry order placed"
                    );
                    placed.push(order);
                }
                Err(e) => {
                    for order in &placed {
                        match self.gateway.cancel_order(symbol, &order.order_id).await {
                            Ok(_) => warn!(symbol, order_id = %order.order_id, "Rolled back accepted leg"),
                            Err(ce) => error!(symbol, order_id = %order.order_id, error = %ce, "Failed to roll back leg"),
                        }
                    }
                    return Err(SkipReason::Exchange(e.to_string()));
                }
            }
        }

        if let [buy, sell] = placed.as_slice() {
            self.oco
                .insert(OcoPair::new(symbol, &buy.order_id, &sell.order_id));
        }
        Ok(placed)
    }

    async fn announce_placement(&self, asset: &ActiveAsset, placed: &[OpenOrder]) {
        let legs: Vec<String> = placed
            .iter()
            .map(|o| {
                let stop = o.stop_price.map(|p| p.to_string()).unwrap_or_default();
                format!("{} {} @ {}", o.side, o.quantity, stop)
            })
            .collect();
        let kind = if placed.len() == 2 { "OCO" } else { "Stop" };
        self.notifier
            .trade(format!("{} {} placed: {}", asset.symbol, kind, legs.join(" / ")))
            .await;
    }

    async fn cancel_all_untriggered(&mut self) {
        let cancelled = self.cancel_entry_orders().await;
        let pairs = self.oco.len();
        self.oco.clear();

        info!(cancelled, pairs, "Untriggered entry orders cancelled");
        self.notifier
            .info(format!("Cancelled {} untriggered entry orders", cancelled))
            .await;
    }

    /// 플랜 자산의 감소 전용이 아닌 미체결 주문을 취소합니다.
    async fn cancel_entry_orders(&self) -> usize {
        let mut cancelled = 0;
        for symbol in self.plan.symbols() {
            match self
                .gateway
                .cancel_orders_where(&symbol, |o| !o.reduce_only)
                .await
            {
                Ok(n) => cancelled += n,
                Err(e) => warn!(symbol = %symbol, error = %e, "Failed to cancel entry orders"),
            }
        }
        cancelled
    }

    async fn end_of_day_checklist(&self, now: DateTime<Utc>) {
        let date = now.with_timezone(&self.tz).date_naive();
        let mut message = match self.journal.daily_summary(date, self.tz).await {
            Ok(summary) => format!(
                "End of day {}: PnL {} {}, {} trades ({} won / {} lost), win rate {}%",
                date,
                summary.total_pnl.round_dp(2),
                self.config.quote_asset,
                summary.total_trades,
                summary.winning_trades,
                summary.losing_trades,
                summary.win_rate.round_dp(1),
            ),
            Err(e) => {
                warn!(error = %e, "Journal summary unavailable");
                format!("End of day {}: journal unavailable ({})", date, e)
            }
        };

        message.push_str(&format!("\nOpen managed positions: {}", self.positions.len()));
        for item in &self.plan.end_of_day_checklist {
            message.push_str(&format!("\n- {}", item));
        }
        self.notifier.info(message).await;
    }

    async fn close_all_positions(&mut self, now: DateTime<Utc>) {
        let closed = self.risk.close_all("Scheduled close", false).await;
        self.record_closed(closed, "Scheduled close", false, now).await;
    }

    // === 2. OCO 정리 ===

    /// 각 OCO 쌍의 레그 상태를 확인하고 해소합니다.
    pub async fn reconcile_oco(&mut self) {
        for symbol in self.oco.symbols() {
            let Some(pair) = self.oco.get(&symbol).cloned() else {
                continue;
            };

            let open_ids: HashSet<String> = match self.gateway.open_orders(&symbol).await {
                Ok(orders) => orders.into_iter().map(|o| o.order_id).collect(),
                Err(e) => {
                    debug!(symbol = %symbol, error = %e, "Open orders unavailable, OCO check deferred");
                    continue;
                }
            };

            match pair.resolve(&open_ids) {
                OcoResolution::Pending => {}
                OcoResolution::CancelRemaining(order_id) => {
                    match self.gateway.cancel_order(&symbol, &order_id).await {
                        Ok(cancelled) => {
                            self.oco.resolve(&symbol);
                            info!(symbol = %symbol, order_id = %order_id, cancelled, "OCO resolved");
                            self.notifier
                                .info(format!(
                                    "OCO {} resolved: remaining order {} cancelled",
                                    symbol, order_id
                                ))
                                .await;
                        }
                        Err(e) => {
                            warn!(symbol = %symbol, order_id = %order_id, error = %e, "OCO cancel failed, retrying next tick");
                        }
                    }
                }
                OcoResolution::BothGone => {
                    self.oco.resolve(&symbol);
                    info!(symbol = %symbol, "OCO resolved, both legs gone");
                    self.notifier
                        .info(format!("OCO {} resolved: both orders gone", symbol))
                        .await;
                }
            }
        }
    }

    // === 3. 포지션 관리 ===

    /// 거래소 포지션과 관리 포지션을 맞추고 규칙과 트레일링 스톱을 적용합니다.
    pub async fn manage_positions(&mut self, now: DateTime<Utc>) {
        let positions = match self.gateway.positions().await {
            Ok(positions) => positions,
            Err(e) => {
                warn!(error = %e, "Positions unavailable, skipping management");
                return;
            }
        };

        let live: BTreeMap<String, ExchangePosition> = positions
            .into_iter()
            .filter(|p| self.plan.asset(&p.symbol).is_some() && !self.plan.is_hedge_symbol(&p.symbol))
            .map(|p| (p.symbol.clone(), p))
            .collect();

        let gone: Vec<String> = self
            .positions
            .keys()
            .filter(|symbol| !live.contains_key(*symbol))
            .cloned()
            .collect();
        for symbol in gone {
            if let Some(managed) = self.positions.remove(&symbol) {
                self.on_position_closed(managed, now).await;
            }
        }

        for position in live.values() {
            if let Some(managed) = self.positions.get_mut(&position.symbol) {
                managed.observe(position);
            } else {
                self.on_position_opened(position, now).await;
            }
            self.apply_monitoring_rules(position, now).await;
            self.update_trailing_stop(position).await;
        }
    }

    async fn on_position_opened(&mut self, position: &ExchangePosition, now: DateTime<Utc>) {
        let plan = Arc::clone(&self.plan);
        let Some(asset) = plan.asset(&position.symbol) else {
            return;
        };
        let hedge_symbol = asset.hedge.as_ref().map(|h| h.symbol.clone());
        let Some(mut managed) = ManagedPosition::open(position, hedge_symbol, now) else {
            return;
        };
        let symbol = position.symbol.as_str();

        info!(
            symbol,
            side = side_label(managed.side),
            amount = %managed.amount,
            entry_price = %managed.entry_price,
            "New position detected"
        );
        self.notifier
            .trade(format!(
                "Opened {} {} {} @ {}",
                side_label(managed.side),
                managed.size(),
                symbol,
                managed.entry_price
            ))
            .await;

        match asset.group_for(managed.side) {
            Some(group) => {
                let request =
                    build_stop_loss_request(symbol, managed.side, managed.size(), group.stop_loss);
                match self.gateway.place_order(&request).await {
                    Ok(order) => {
                        info!(symbol, stop_loss = %group.stop_loss, order_id = %order.order_id, "Stop-loss placed");
                        managed.trailing_stop_order_id = Some(order.order_id);
                    }
                    Err(e) => {
                        error!(symbol, error = %e, "Failed to place stop-loss");
                        self.notifier
                            .critical(format!("Failed to place stop-loss for {}: {}", symbol, e))
                            .await;
                    }
                }
            }
            None => warn!(symbol, side = side_label(managed.side), "No order group for position side, stop-loss not placed"),
        }

        if let Some(spec) = &asset.hedge {
            match self.risk.open_hedge(position, spec).await {
                Ok(Some(order)) => {
                    self.notifier
                        .trade(format!(
                            "Hedge opened for {}: {} {} {}",
                            symbol, order.side, order.quantity, spec.symbol
                        ))
                        .await;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(symbol, hedge = %spec.symbol, error = %e, "Failed to open hedge");
                    self.notifier
                        .warning(format!("Failed to open hedge {} for {}: {}", spec.symbol, symbol, e))
                        .await;
                }
            }
        }

        self.positions.insert(symbol.to_string(), managed);
    }

    /// 외부에서(스톱/목표가) 종료된 포지션을 정리합니다.
    async fn on_position_closed(&mut self, managed: ManagedPosition, now: DateTime<Utc>) {
        info!(symbol = %managed.symbol, "Position closed on exchange");
        self.retire(&managed, POSITION_CLOSED_REASON, false, now).await;

        let record = managed.to_trade_record(POSITION_CLOSED_REASON, now);
        self.notifier
            .trade(format!(
                "Closed {} {} {} @ ~{} | PnL {} ({})",
                side_label(record.side),
                record.quantity,
                record.symbol,
                record.exit_price,
                record.pnl.round_dp(2),
                POSITION_CLOSED_REASON
            ))
            .await;
        self.journal_trade(record).await;
    }

    /// 관리 포지션의 보조 주문과 헤지를 정리합니다.
    async fn retire(&self, managed: &ManagedPosition, reason: &str, keep_hedge: bool, now: DateTime<Utc>) {
        if let Some(stop_id) = &managed.trailing_stop_order_id {
            if let Err(e) = self.gateway.cancel_order(&managed.symbol, stop_id).await {
                warn!(symbol = %managed.symbol, order_id = %stop_id, error = %e, "Failed to cancel stop-loss");
            }
        }

        if keep_hedge {
            return;
        }
        let Some(hedge) = &managed.hedge_symbol else {
            return;
        };
        match self.risk.close_hedge(hedge, reason).await {
            Ok(Some(closed)) => {
                let reason = format!("Hedge for {} ({})", managed.symbol, reason);
                self.notifier
                    .trade(format!("Hedge {} closed | PnL {}", hedge, closed.pnl.round_dp(2)))
                    .await;
                self.journal_trade(closed.to_trade_record(&reason, now)).await;
            }
            Ok(None) => {}
            Err(e) => {
                warn!(hedge = %hedge, error = %e, "Failed to close hedge");
                self.notifier
                    .warning(format!("Failed to close hedge {}: {}", hedge, e))
                    .await;
            }
        }
    }

    fn rule_fired(&self, symbol: &str, rule: &str) -> bool {
        self.positions
            .get(symbol)
            .map_or(true, |m| m.has_fired(rule))
    }

    /// 펀딩 비율과 미결제약정 규칙을 확인합니다. 규칙은 포지션당 한 번만 발동합니다.
    async fn apply_monitoring_rules(&mut self, position: &ExchangePosition, now: DateTime<Utc>) {
        let plan = Arc::clone(&self.plan);
        let Some(asset) = plan.asset(&position.symbol) else {
            return;
        };
        let symbol = position.symbol.as_str();
        let mut fired = Vec::new();

        if let Some(rule) = asset.monitoring_rule(FUNDING_RATE_RULE) {
            if !self.rule_fired(symbol, FUNDING_RATE_RULE) {
                match self.gateway.funding_info(symbol).await {
                    Ok(info) if funding_rule_fires(info.last_funding_rate, rule.effective_threshold()) => {
                        let pct = (info.last_funding_rate * Decimal::ONE_HUNDRED).round_dp(4);
                        fired.push((FUNDING_RATE_RULE, rule, format!("funding rate {}%", pct)));
                    }
                    Ok(_) => {}
                    Err(e) => debug!(symbol, error = %e, "Funding info unavailable"),
                }
            }
        }

        if let Some(rule) = asset.monitoring_rule(OPEN_INTEREST_RULE) {
            if !self.rule_fired(symbol, OPEN_INTEREST_RULE) {
                match self.gateway.open_interest(symbol).await {
                    Ok(oi) => {
                        let change = self
                            .positions
                            .get_mut(symbol)
                            .and_then(|m| m.record_open_interest(oi.open_interest));
                        if let Some(change) = change.filter(|c| *c >= rule.effective_threshold()) {
                            fired.push((OPEN_INTEREST_RULE, rule, format!("open interest change {}%", change.round_dp(2))));
                        }
                    }
                    Err(e) => debug!(symbol, error = %e, "Open interest unavailable"),
                }
            }
        }

        for (name, rule, detail) in fired {
            let Some(managed) = self.positions.get_mut(symbol) else {
                break;
            };
            if !managed.mark_fired(name) {
                continue;
            }

            warn!(symbol, rule = name, %detail, action = %rule.action, "Monitoring rule fired");
            self.notifier
                .warning(format!("{} {}: {} -> {}", symbol, name, detail, rule.action))
                .await;

            match self.risk.handle_monitoring_action(&rule.action, name, position).await {
                Ok(outcome) => {
                    if let Some(skipped) = &outcome.skipped {
                        warn!(symbol, rule = name, reason = %skipped, "Monitoring action skipped");
                    }
                    let reason = format!("Monitoring rule {}", name);
                    self.record_closed(outcome.closed, &reason, false, now).await;
                }
                Err(e) => {
                    error!(symbol, rule = name, error = %e, "Monitoring action unsupported");
                    self.notifier
                        .critical(format!("{} {}: {}", symbol, name, e))
                        .await;
                }
            }
        }
    }

    /// ATR 트레일링 스톱을 갱신합니다.
    async fn update_trailing_stop(&mut self, position: &ExchangePosition) {
        let plan = Arc::clone(&self.plan);
        let Some(dm) = plan
            .asset(&position.symbol)
            .and_then(|a| a.dynamic_management.as_ref())
        else {
            return;
        };
        let Some(rule) = TrailingStopRule::from_plan(dm, self.risk.config().trailing_price_dp) else {
            return;
        };
        let Some(managed) = self.positions.get(&position.symbol) else {
            return;
        };
        let Some(stop_id) = managed.trailing_stop_order_id.clone() else {
            return;
        };
        let (side, entry_price, size) = (managed.side, managed.entry_price, managed.size());
        let current_price = position.mark_price;
        if !rule.is_active(side, entry_price, current_price) {
            return;
        }

        let symbol = position.symbol.as_str();
        let open = match self.gateway.open_orders(symbol).await {
            Ok(orders) => orders,
            Err(e) => {
                debug!(symbol, error = %e, "Open orders unavailable, trailing deferred");
                return;
            }
        };
        let Some(current_stop) = open
            .iter()
            .find(|o| o.order_id == stop_id)
            .and_then(|o| o.stop_price)
        else {
            info!(symbol, order_id = %stop_id, "Tracked stop no longer open, dropping");
            self.set_stop_id(symbol, None);
            return;
        };

        let atr = match self.risk.atr(symbol, dm.atr_window_min).await {
            Ok(Some(atr)) => atr,
            Ok(None) => {
                debug!(symbol, "Not enough candles for ATR");
                return;
            }
            Err(e) => {
                debug!(symbol, error = %e, "Klines unavailable, trailing deferred");
                return;
            }
        };

        match rule.evaluate(side, entry_price, current_price, atr, current_stop) {
            TrailingDecision::Move { new_stop } => {
                let request = build_stop_loss_request(symbol, side, size, new_stop);
                match self.gateway.cancel_and_replace(symbol, &stop_id, &request).await {
                    Ok(ReplaceOutcome::Replaced(order)) => {
                        info!(symbol, old_stop = %current_stop, %new_stop, order_id = %order.order_id, "Trailing stop moved");
                        self.set_stop_id(symbol, Some(order.order_id));
                        self.notifier
                            .info(format!("{} trailing stop {} -> {}", symbol, current_stop, new_stop))
                            .await;
                    }
                    Ok(ReplaceOutcome::OriginalGone) => {
                        info!(symbol, order_id = %stop_id, "Stop gone during replace, dropping");
                        self.set_stop_id(symbol, None);
                    }
                    Ok(ReplaceOutcome::Restored { order, error: reason }) => {
                        warn!(symbol, %new_stop, order_id = %order.order_id, error = %reason, "Trailing stop rejected, original restored");
                        self.set_stop_id(symbol, Some(order.order_id));
                        self.notifier
                            .warning(format!(
                                "{} trailing stop {} rejected ({}), kept stop at {}",
                                symbol, new_stop, reason, current_stop
                            ))
                            .await;
                    }
                    Ok(ReplaceOutcome::Unprotected { error: reason }) => {
                        error!(symbol, error = %reason, "Position left without stop-loss");
                        self.set_stop_id(symbol, None);
                        self.notifier
                            .critical(format!("{} has NO stop-loss: trailing replace failed: {}", symbol, reason))
                            .await;
                    }
                    Err(e) => {
                        error!(symbol, error = %e, "Trailing stop replace failed");
                        self.notifier
                            .critical(format!("{} trailing stop replace failed: {}", symbol, e))
                            .await;
                    }
                }
            }
            decision => debug!(symbol, ?decision, "Trailing stop unchanged"),
        }
    }

    fn set_stop_id(&mut self, symbol: &str, order_id: Option<String>) {
        if let Some(managed) = self.positions.get_mut(symbol) {
            managed.trailing_stop_order_id = order_id;
        }
    }

    // === 4. 전역 리스크 ===

    /// 킬스위치, 강제 청산 시각, 변동성 차단기, 급락 트리거 순으로 평가합니다.
    pub async fn evaluate_global_risk(&mut self, now: DateTime<Utc>) {
        self.check_kill_switch(now).await;
        self.check_time_stop(now).await;
        self.check_volatility(now).await;
        self.check_flash_drops(now).await;
    }

    async fn check_kill_switch(&mut self, now: DateTime<Utc>) {
        let ratio = self.plan.global_settings.emergency_stop_ratio();
        if ratio >= Decimal::ZERO || self.kill_switch.is_paused(self.tz, now) {
            return;
        }

        let today = now.with_timezone(&self.tz).date_naive();
        let daily_pnl = match self.journal.daily_pnl(today, self.tz).await {
            Ok(pnl) => pnl,
            Err(e) => {
                warn!(error = %e, "Daily PnL unavailable, kill-switch check skipped");
                return;
            }
        };
        let balance = match self.risk.balance().await {
            Ok(balance) => balance,
            Err(e) => {
                warn!(error = %e, "Balance unavailable, kill-switch check skipped");
                return;
            }
        };
        if !KillSwitch::breached(daily_pnl, balance.total, ratio) || !self.kill_switch.fire(self.tz, now) {
            return;
        }

        let limit = balance.total * ratio;
        error!(%daily_pnl, %limit, "Kill-switch activated");
        self.notifier
            .critical(format!(
                "Kill-switch activated: daily PnL {} <= {} {}. Closing all positions, trading paused for today",
                daily_pnl.round_dp(2),
                limit.round_dp(2),
                self.config.quote_asset
            ))
            .await;

        let closed = self.risk.close_all("Kill-switch", false).await;
        self.record_closed(closed, "Kill-switch", false, now).await;

        let cancelled = self.cancel_entry_orders().await;
        self.oco.clear();
        info!(cancelled, "Entry orders cancelled by kill-switch");
    }

    async fn check_time_stop(&mut self, now: DateTime<Utc>) {
        if !self.time_stop.check(self.tz, now) {
            return;
        }

        let cutoff = self.time_stop.cutoff();
        warn!(%cutoff, "Time-stop reached");
        let closed = self.risk.close_all("Time-stop", false).await;
        let count = closed.len();
        self.record_closed(closed, "Time-stop", false, now).await;
        self.notifier
            .warning(format!("Time-stop {}: closed {} positions", cutoff.format("%H:%M"), count))
            .await;
    }

    async fn check_volatility(&mut self, now: DateTime<Utc>) {
        let benchmark = self.config.benchmark_symbol.clone();
        let price = match self.gateway.current_price(&benchmark).await {
            Ok(price) => price,
            Err(e) => {
                debug!(symbol = %benchmark, error = %e, "Benchmark price unavailable");
                return;
            }
        };

        match self.volatility.check(now, price) {
            VolatilityCheck::Triggered { volatility_pct } => {
                let threshold = self.risk.config().volatility.threshold_pct;
                warn!(symbol = %benchmark, volatility_pct, threshold, "Volatility breaker triggered");

                let cancelled = self.risk.cancel_all_orders().await;
                self.oco.clear();
                self.notifier
                    .warning(format!(
                        "Volatility breaker: {} volatility {:.2}% > {:.2}%, cancelled {} open orders",
                        benchmark, volatility_pct, threshold, cancelled
                    ))
                    .await;
            }
            check => debug!(symbol = %benchmark, ?check, "Volatility check"),
        }
    }

    async fn check_flash_drops(&mut self, now: DateTime<Utc>) {
        let plan = Arc::clone(&self.plan);

        for (name, trigger) in plan.price_drop_triggers() {
            let (Some(threshold), Some(assets)) = (trigger.threshold_pct, trigger.assets.as_ref()) else {
                continue;
            };

            // 한 심볼이 발동해도 나머지 심볼의 샘플은 계속 기록합니다
            let mut fired: Option<(&str, Decimal)> = None;
            for symbol in assets {
                let price = match self.gateway.current_price(symbol).await {
                    Ok(price) => price,
                    Err(e) => {
                        debug!(symbol = %symbol, error = %e, "Price unavailable for flash-drop check");
                        continue;
                    }
                };
                let key = format!("{}:{}", name, symbol);
                if let Some(drop_pct) = self.flash_drops.check(&key, price, threshold) {
                    fired.get_or_insert((symbol.as_str(), drop_pct));
                }
            }

            let Some((symbol, drop_pct)) = fired else {
                continue;
            };
            warn!(trigger = %name, symbol, drop_pct = %drop_pct.round_dp(2), action = %trigger.action, "Flash-drop trigger fired");

            let action: RiskAction = match trigger.action.parse() {
                Ok(action) => action,
                Err(e) => {
                    error!(trigger = %name, error = %e, "Risk trigger action unsupported");
                    self.notifier
                        .critical(format!("Risk trigger {}: {}", name, e))
                        .await;
                    continue;
                }
            };
            self.notifier
                .warning(format!(
                    "Flash drop {}: {} fell {}% (>= {}%) -> {}",
                    name,
                    symbol,
                    drop_pct.round_dp(2),
                    threshold,
                    action
                ))
                .await;

            let reason = format!("Flash drop {}", name);
            let outcome = self.risk.execute_risk_action(&action, &reason, None).await;
            if let Some(skipped) = &outcome.skipped {
                warn!(trigger = %name, reason = %skipped, "Risk action skipped");
            }
            if matches!(action, RiskAction::CancelAllOrders) {
                self.oco.clear();
            }
            let keep_hedge = matches!(action, RiskAction::CloseLongsKeepHedge);
            self.record_closed(outcome.closed, &reason, keep_hedge, now).await;
        }
    }

    // === 공통 ===

    /// 청산 결과를 저널에 기록하고 알리며, 완전히 청산된 관리 포지션을 정리합니다.
    async fn record_closed(
        &mut self,
        closed: Vec<ClosedPosition>,
        reason: &str,
        keep_hedge: bool,
        now: DateTime<Utc>,
    ) {
        for position in closed {
            self.notifier
                .trade(format!(
                    "Closed {} {} {} @ {} | PnL {} ({})",
                    side_label(position.side),
                    position.quantity,
                    position.symbol,
                    position.exit_price,
                    position.pnl.round_dp(2),
                    reason
                ))
                .await;
            self.journal_trade(position.to_trade_record(reason, now)).await;

            let fully_closed = self
                .positions
                .get(&position.symbol)
                .is_some_and(|m| position.quantity >= m.size());
            if fully_closed {
                if let Some(managed) = self.positions.remove(&position.symbol) {
                    self.retire(&managed, reason, keep_hedge, now).await;
                }
            }
        }
    }

    async fn journal_trade(&self, record: TradeRecord) {
        if let Err(e) = self.journal.append_trade(record).await {
            error!(error = %e, "Failed to journal trade");
        }
    }
}
