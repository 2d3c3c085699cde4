//! 엔진 통합 테스트
//!
//! 시뮬레이션 거래소, 메모리 저널, 메모리 알림 전송기로 틱 단위 동작을 검증합니다.
//! 플랜 날짜는 2025-08-04 (Europe/Kyiv, UTC+3)입니다.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use trader_core::{
    EngineConfig, Journal, Kline, MemoryJournal, OrderRequest, OrderType, Side, SymbolFilters,
    TradeRecord, TradingPlan,
};
use trader_exchange::{ExchangeError, ExchangeGateway, RetryConfig, SimOp, SimulatedExchange};
use trader_execution::{Engine, ExecutionError, PhaseAction};
use trader_notification::{MemorySender, NotificationManager, NotifyLevel};
use trader_risk::{RiskConfig, RiskManager};

const PLAN: &str = r#"{
  "plan_date": "2025-08-04",
  "plan_version": "1.0",
  "plan_type": "breakout_test",
  "risk_budget": 0.02,
  "global_settings": {
    "max_portfolio_risk": 0.02,
    "emergency_stop_loss": -0.03,
    "daily_profit_target": 0.05,
    "max_concurrent_positions": 1,
    "max_notional_per_trade": 1000,
    "margin_limit_pct": 0.4
  },
  "active_assets": [
    {
      "symbol": "ETHUSDT",
      "asset_type": "futures",
      "leverage": 5,
      "strategy": "oco_breakout",
      "position_size_pct": 0.5,
      "order_groups": {
        "bullish": {
          "order_type": "BUY_STOP",
          "trigger_price": 3050,
          "stop_loss": 2990,
          "take_profit": [3150],
          "time_valid_from": "2025-08-04T08:00:00+03:00",
          "time_valid_to": "2025-08-04T21:00:00+03:00"
        },
        "bearish": {
          "order_type": "SELL_STOP",
          "trigger_price": 2950,
          "stop_loss": 3010,
          "take_profit": [2850],
          "time_valid_from": "2025-08-04T08:00:00+03:00",
          "time_valid_to": "2025-08-04T21:00:00+03:00"
        }
      },
      "dynamic_management": {
        "trailing_sl_atr_multiple": 1.0,
        "atr_window_min": 15,
        "activate_after_profit": 20
      },
      "hedge": { "symbol": "BTCUSDT", "direction": "short", "size_pct": 0.5, "delta": -0.5 },
      "monitoring_rules": {
        "funding_rate_pct": { "threshold": 0.05, "action": "notify" }
      }
    }
  ],
  "trade_phases": {
    "setup_orders": { "time": "13:00", "action": "place_all_orders" },
    "cancel_untriggered": { "time": "20:00", "action": "cancel_all_untriggered" },
    "eod": { "time": "22:30", "action": "end_of_day_checklist" }
  },
  "risk_triggers": {
    "btc_flash_drop": { "threshold_pct": 5.0, "assets": ["BTCUSDT"], "action": "close_longs_keep_hedge" },
    "regulation_news": { "keyword": ["SEC"], "action": "notify" }
  },
  "end_of_day_checklist": ["review journal"]
}"#;

struct Harness {
    sim: Arc<SimulatedExchange>,
    journal: Arc<MemoryJournal>,
    notes: Arc<MemorySender>,
    engine: Engine,
}

impl Harness {
    fn messages(&self, level: NotifyLevel, needle: &str) -> usize {
        self.notes
            .messages_at(level)
            .iter()
            .filter(|m| m.contains(needle))
            .count()
    }

    fn records_with_reason(&self, reason: &str) -> Vec<TradeRecord> {
        self.journal
            .records()
            .into_iter()
            .filter(|r| r.reason == reason)
            .collect()
    }
}

fn filters(symbol: &str, tick: Decimal) -> SymbolFilters {
    SymbolFilters {
        symbol: symbol.to_string(),
        tick_size: tick,
        step_size: dec!(0.001),
        min_qty: dec!(0.001),
        min_notional: dec!(5),
        tradable: true,
    }
}

async fn harness_with(plan_json: &str, balance: Decimal) -> Harness {
    let sim = Arc::new(SimulatedExchange::with_balance(balance));
    sim.add_symbol(filters("ETHUSDT", dec!(0.01))).await;
    sim.add_symbol(filters("BTCUSDT", dec!(0.1))).await;
    sim.set_price("ETHUSDT", dec!(3000)).await;
    sim.set_price("BTCUSDT", dec!(60000)).await;

    let gateway = Arc::new(ExchangeGateway::new(sim.clone()).with_retry(RetryConfig::no_retry()));
    let plan = Arc::new(TradingPlan::from_json_str(plan_json).unwrap());
    let risk = Arc::new(RiskManager::new(gateway, plan, RiskConfig::default(), "USDT"));

    let journal = Arc::new(MemoryJournal::new());
    let notes = Arc::new(MemorySender::new());
    let mut notifier = NotificationManager::new();
    notifier.add_shared_sender(notes.clone());

    let engine = Engine::new(EngineConfig::default(), risk, notifier, journal.clone()).unwrap();
    Harness {
        sim,
        journal,
        notes,
        engine,
    }
}

async fn harness() -> Harness {
    harness_with(PLAN, dec!(10000)).await
}

/// 고가-저가 폭 10의 15분봉 (ATR = 10)
fn flat_klines() -> Vec<Kline> {
    (0..20)
        .map(|i| Kline {
            open_time: at(8, 0, 0) + Duration::minutes(15 * i),
            open: dec!(3000),
            high: dec!(3005),
            low: dec!(2995),
            close: dec!(3000),
            volume: dec!(100),
        })
        .collect()
}

fn tracked_stop(h: &Harness, symbol: &str) -> Option<String> {
    h.engine
        .managed_position(symbol)
        .and_then(|m| m.trailing_stop_order_id.clone())
}

fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 8, 4, h, m, s).unwrap()
}

/// 13:00 Kyiv
fn setup_time() -> DateTime<Utc> {
    at(10, 0, 0)
}

#[tokio::test]
async fn test_startup_checks_report_margin_budget() {
    let h = harness().await;
    let report = h.engine.startup_checks().await.unwrap();

    assert_eq!(report.equity, dec!(10000));
    assert_eq!(report.free_margin_ratio, Decimal::ONE);
    // 1000 × 2 ÷ 5
    assert_eq!(report.required_margin, dec!(400));
    assert_eq!(report.margin_limit, dec!(4000));
    assert_eq!(h.messages(NotifyLevel::Info, "Engine ready"), 1);
}

#[tokio::test]
async fn test_startup_rejects_margin_budget_overrun() {
    let h = harness_with(PLAN, dec!(500)).await;
    let err = h.engine.startup_checks().await.unwrap_err();
    assert!(matches!(err, ExecutionError::MarginBudgetExceeded { .. }));
}

#[tokio::test]
async fn test_startup_rejects_unknown_phase_action() {
    let plan = PLAN.replace(r#""action": "cancel_all_untriggered""#, r#""action": "teleport""#);
    let h = harness_with(&plan, dec!(10000)).await;

    let err = h.engine.startup_checks().await.unwrap_err();
    assert!(matches!(err, ExecutionError::UnknownAction { ref action, .. } if action == "teleport"));
}

#[tokio::test]
async fn test_unknown_action_at_dispatch_is_critical_and_executed() {
    let plan = PLAN.replace(r#""action": "cancel_all_untriggered""#, r#""action": "teleport""#);
    let mut h = harness_with(&plan, dec!(10000)).await;

    // 20:00 Kyiv
    h.engine.tick_at(at(17, 0, 0)).await;
    h.engine.tick_at(at(17, 0, 15)).await;

    assert!(h.engine.executed_phases().contains("cancel_untriggered"));
    assert_eq!(h.messages(NotifyLevel::Critical, "unknown action 'teleport'"), 1);
}

#[tokio::test]
async fn test_phase_runs_at_most_once() {
    let mut h = harness().await;

    h.engine.tick_at(setup_time() - Duration::seconds(20)).await;
    h.engine.tick_at(setup_time()).await;
    h.engine.tick_at(setup_time() + Duration::seconds(15)).await;

    assert!(h.engine.executed_phases().contains("setup_orders"));
    assert_eq!(h.sim.placed_orders().await.len(), 2);
    assert_eq!(h.sim.leverage_of("ETHUSDT").await, Some(5));
}

#[tokio::test]
async fn test_oco_pair_sizes_both_legs() {
    let mut h = harness().await;
    h.engine.tick_at(setup_time()).await;

    let placed = h.sim.placed_orders().await;
    assert_eq!(placed.len(), 2);

    // 1000 ÷ 3050 = 0.3278… → 0.327 (명목가 상한)
    assert_eq!(placed[0].side, Side::Buy);
    assert_eq!(placed[0].order_type, OrderType::StopMarket);
    assert_eq!(placed[0].stop_price, Some(dec!(3050)));
    assert_eq!(placed[0].quantity, dec!(0.327));

    // 1000 ÷ 2950 = 0.3389… → 0.338
    assert_eq!(placed[1].side, Side::Sell);
    assert_eq!(placed[1].stop_price, Some(dec!(2950)));
    assert_eq!(placed[1].quantity, dec!(0.338));

    let pair = h.engine.oco_pair("ETHUSDT").unwrap();
    assert_eq!(pair.buy_order_id, "1");
    assert_eq!(pair.sell_order_id, "2");
    assert_eq!(h.messages(NotifyLevel::Trade, "ETHUSDT OCO placed"), 1);
}

#[tokio::test]
async fn test_oco_cancels_remaining_leg() {
    let mut h = harness().await;
    h.engine.tick_at(setup_time()).await;

    // 매도 레그가 사라지고 매수 레그(id=1)만 남음
    assert!(h.sim.expire_order("2").await);
    h.engine.tick_at(setup_time() + Duration::seconds(15)).await;

    assert!(h.sim.cancelled_orders().await.contains(&"1".to_string()));
    assert!(h.engine.oco_pair("ETHUSDT").is_none());
    assert!(h.sim.all_open_orders().await.is_empty());
    assert_eq!(h.messages(NotifyLevel::Info, "OCO ETHUSDT resolved"), 1);
}

#[tokio::test]
async fn test_crossed_trigger_skips_only_that_leg() {
    let mut h = harness().await;
    h.sim.set_price("ETHUSDT", dec!(3060)).await;

    h.engine.tick_at(setup_time()).await;

    let placed = h.sim.placed_orders().await;
    assert_eq!(placed.len(), 1);
    assert_eq!(placed[0].side, Side::Sell);
    assert_eq!(placed[0].stop_price, Some(dec!(2950)));
    assert_eq!(placed[0].quantity, dec!(0.338));
    assert!(h.engine.oco_pair("ETHUSDT").is_none());
}

#[tokio::test]
async fn test_placement_outside_entry_window_is_skipped() {
    let mut h = harness().await;

    // 06:00 Kyiv, 진입 허용 시간대(08:00~23:00) 밖
    h.engine
        .run_phase_action(PhaseAction::PlaceAllOrders, at(3, 0, 0))
        .await;

    assert!(h.sim.placed_orders().await.is_empty());
    assert_eq!(h.messages(NotifyLevel::Warning, "outside entry window"), 1);
}

#[tokio::test]
async fn test_position_lifecycle_with_stop_and_hedge() {
    let mut h = harness().await;
    h.engine.tick_at(setup_time()).await;

    // 매수 스톱 체결 → 롱 0.327 @ 3060
    h.sim.set_price("ETHUSDT", dec!(3060)).await;
    h.engine.tick_at(setup_time() + Duration::seconds(15)).await;

    assert!(h.sim.cancelled_orders().await.contains(&"2".to_string()));
    assert!(h.engine.oco_pair("ETHUSDT").is_none());

    let managed = h.engine.managed_position("ETHUSDT").unwrap();
    assert_eq!(managed.side, Side::Buy);
    assert_eq!(managed.amount, dec!(0.327));
    assert_eq!(managed.hedge_symbol.as_deref(), Some("BTCUSDT"));
    let stop_id = managed.trailing_stop_order_id.clone().unwrap();

    let open = h.sim.all_open_orders().await;
    let stop = open.iter().find(|o| o.order_id == stop_id).unwrap();
    assert!(stop.reduce_only);
    assert_eq!(stop.side, Side::Sell);
    assert_eq!(stop.stop_price, Some(dec!(2990)));
    assert_eq!(stop.quantity, dec!(0.327));

    // 0.327 × 3060 × 0.5 ÷ 60000 = 0.00833… → 0.008 숏
    let gateway = h.engine.risk().gateway().clone();
    let hedge = gateway.position("BTCUSDT").await.unwrap().unwrap();
    assert_eq!(hedge.amount, dec!(-0.008));
    assert_eq!(h.messages(NotifyLevel::Trade, "Opened LONG"), 1);

    // 손절 체결 → 다음 틱에서 헤지 청산과 저널 기록
    h.sim.set_price("ETHUSDT", dec!(2985)).await;
    h.engine.tick_at(setup_time() + Duration::seconds(30)).await;

    assert!(h.engine.managed_position("ETHUSDT").is_none());
    assert!(gateway.position("ETHUSDT").await.unwrap().is_none());
    assert!(gateway.position("BTCUSDT").await.unwrap().is_none());

    let closed = h.records_with_reason("Position closed (stop/target)");
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].symbol, "ETHUSDT");
    assert_eq!(closed[0].quantity, dec!(0.327));

    let hedges: Vec<_> = h
        .journal
        .records()
        .into_iter()
        .filter(|r| r.symbol == "BTCUSDT")
        .collect();
    assert_eq!(hedges.len(), 1);
    assert!(hedges[0].reason.starts_with("Hedge for ETHUSDT"));
}

#[tokio::test]
async fn test_kill_switch_fires_once_per_day() {
    let mut h = harness().await;
    h.journal
        .append_trade(TradeRecord {
            timestamp: setup_time() - Duration::hours(1),
            symbol: "ETHUSDT".to_string(),
            side: Side::Buy,
            entry_price: dec!(3100),
            exit_price: dec!(3000),
            quantity: dec!(4),
            pnl: dec!(-400),
            reason: "Position closed (stop/target)".to_string(),
        })
        .await
        .unwrap();
    h.sim.set_position("ETHUSDT", dec!(0.3), dec!(3000)).await;

    // -400 ≤ 10000 × -0.03
    h.engine.evaluate_global_risk(setup_time()).await;

    assert_eq!(h.records_with_reason("Kill-switch").len(), 1);
    assert!(h.engine.is_paused(setup_time()));
    assert_eq!(h.messages(NotifyLevel::Critical, "Kill-switch activated"), 1);
    let gateway = h.engine.risk().gateway().clone();
    assert!(gateway.position("ETHUSDT").await.unwrap().is_none());

    // 같은 날 다시 평가해도 재발동하지 않음
    h.sim.set_position("ETHUSDT", dec!(0.3), dec!(3000)).await;
    h.engine.evaluate_global_risk(setup_time() + Duration::minutes(1)).await;

    assert_eq!(h.records_with_reason("Kill-switch").len(), 1);
    assert!(gateway.position("ETHUSDT").await.unwrap().is_some());

    // 신규 진입도 멈춤
    let placed_before = h.sim.placed_orders().await.len();
    h.engine
        .run_phase_action(PhaseAction::PlaceAllOrders, setup_time() + Duration::minutes(2))
        .await;
    assert_eq!(h.sim.placed_orders().await.len(), placed_before);
    assert_eq!(h.messages(NotifyLevel::Warning, "paused by kill-switch"), 1);
}

#[tokio::test]
async fn test_kill_switch_uses_local_trading_day() {
    let mut h = harness().await;
    // 22:00 Kyiv (8/4)
    h.journal
        .append_trade(TradeRecord {
            timestamp: at(19, 0, 0),
            symbol: "ETHUSDT".to_string(),
            side: Side::Buy,
            entry_price: dec!(3100),
            exit_price: dec!(3000),
            quantity: dec!(4),
            pnl: dec!(-400),
            reason: "Position closed (stop/target)".to_string(),
        })
        .await
        .unwrap();
    h.sim.set_position("ETHUSDT", dec!(0.3), dec!(3000)).await;

    // 22:10 Kyiv
    h.engine.evaluate_global_risk(at(19, 10, 0)).await;
    assert_eq!(h.records_with_reason("Kill-switch").len(), 1);

    // 01:00 Kyiv (8/5): UTC로는 아직 8/4지만 새 거래일의 손실은 0
    let after_midnight = at(22, 0, 0);
    h.sim.set_position("ETHUSDT", dec!(0.3), dec!(3000)).await;
    h.engine.evaluate_global_risk(after_midnight).await;

    assert_eq!(h.records_with_reason("Kill-switch").len(), 1);
    assert!(!h.engine.is_paused(after_midnight));
    let gateway = h.engine.risk().gateway().clone();
    assert!(gateway.position("ETHUSDT").await.unwrap().is_some());
}

#[tokio::test]
async fn test_time_stop_closes_once_per_date() {
    let mut h = harness().await;
    h.sim.set_position("ETHUSDT", dec!(0.3), dec!(3000)).await;
    let gateway = h.engine.risk().gateway().clone();

    // 22:59 Kyiv: 아직 유지
    h.engine.tick_at(at(19, 59, 0)).await;
    assert!(h.engine.managed_position("ETHUSDT").is_some());

    // 23:00 Kyiv 통과
    h.engine.tick_at(at(20, 0, 15)).await;
    assert!(gateway.position("ETHUSDT").await.unwrap().is_none());
    assert!(h.engine.managed_position("ETHUSDT").is_none());

    // 같은 날 다시 열린 포지션은 건드리지 않음
    h.sim.set_position("ETHUSDT", dec!(0.3), dec!(3000)).await;
    h.engine.tick_at(at(20, 30, 0)).await;
    assert!(gateway.position("ETHUSDT").await.unwrap().is_some());

    let time_stops = |h: &Harness| {
        h.records_with_reason("Time-stop")
            .into_iter()
            .filter(|r| r.symbol == "ETHUSDT")
            .count()
    };
    assert_eq!(time_stops(&h), 1);
    assert_eq!(h.messages(NotifyLevel::Warning, "Time-stop 23:00"), 1);

    // 다음 날 23:00 Kyiv에는 다시 발동
    h.engine
        .tick_at(Utc.with_ymd_and_hms(2025, 8, 5, 20, 0, 15).unwrap())
        .await;
    assert_eq!(time_stops(&h), 2);
    assert!(gateway.position("ETHUSDT").await.unwrap().is_none());
}

#[tokio::test]
async fn test_volatility_breaker_cancels_once() {
    let mut h = harness().await;
    let gateway = h.engine.risk().gateway().clone();
    gateway
        .place_order(&OrderRequest::stop_market("ETHUSDT", Side::Buy, dec!(0.1), dec!(3100)))
        .await
        .unwrap();

    let start = at(11, 0, 0);
    for (i, price) in [100, 101, 98, 102, 90, 89].into_iter().enumerate() {
        h.sim.set_price("BTCUSDT", Decimal::from(price)).await;
        h.engine
            .evaluate_global_risk(start + Duration::minutes(i as i64))
            .await;
    }

    assert!(h.sim.all_open_orders().await.is_empty());
    assert_eq!(h.messages(NotifyLevel::Warning, "Volatility breaker"), 1);

    // 주문이 없을 때 전체 취소는 아무 일도 하지 않음
    assert_eq!(h.engine.risk().cancel_all_orders().await, 0);
}

#[tokio::test]
async fn test_funding_rule_fires_once_per_position() {
    let mut h = harness().await;
    h.sim.set_funding_rate("ETHUSDT", dec!(0.001)).await;
    h.sim.set_position("ETHUSDT", dec!(0.3), dec!(3000)).await;

    let t = at(11, 0, 0);
    h.engine.tick_at(t).await;
    h.engine.tick_at(t + Duration::seconds(15)).await;

    assert_eq!(h.messages(NotifyLevel::Warning, "funding_rate_pct"), 1);
    let managed = h.engine.managed_position("ETHUSDT").unwrap();
    assert!(managed.has_fired("funding_rate_pct"));
}

#[tokio::test]
async fn test_flash_drop_closes_longs_and_keeps_hedge() {
    let mut h = harness().await;
    h.sim.set_position("ETHUSDT", dec!(0.3), dec!(3000)).await;

    let t = at(11, 0, 0);
    h.engine.tick_at(t).await;
    let gateway = h.engine.risk().gateway().clone();
    assert!(gateway.position("BTCUSDT").await.unwrap().is_some());

    // 60000 → 56000: 6.67% 하락
    h.sim.set_price("BTCUSDT", dec!(56000)).await;
    h.engine.tick_at(t + Duration::minutes(1)).await;

    assert!(gateway.position("ETHUSDT").await.unwrap().is_none());
    assert!(gateway.position("BTCUSDT").await.unwrap().is_some());
    assert!(h.engine.managed_position("ETHUSDT").is_none());
    assert_eq!(h.records_with_reason("Flash drop btc_flash_drop").len(), 1);
    assert_eq!(h.messages(NotifyLevel::Warning, "Flash drop btc_flash_drop"), 1);
}

#[tokio::test]
async fn test_trailing_stop_moves_and_never_loosens() {
    let mut h = harness().await;
    h.sim.set_klines("ETHUSDT", flat_klines()).await;
    h.sim.set_position("ETHUSDT", dec!(0.3), dec!(3000)).await;

    let t = at(11, 0, 0);
    h.engine.tick_at(t).await;
    let first_stop = h
        .engine
        .managed_position("ETHUSDT")
        .and_then(|m| m.trailing_stop_order_id.clone())
        .unwrap();

    // 수익 50 ≥ 20, 후보 = 3050 - 10 × 1 = 3040 > 2990
    h.sim.set_price("ETHUSDT", dec!(3050)).await;
    h.engine.tick_at(t + Duration::seconds(15)).await;

    let moved = h
        .engine
        .managed_position("ETHUSDT")
        .and_then(|m| m.trailing_stop_order_id.clone())
        .unwrap();
    assert_ne!(moved, first_stop);
    assert!(h.sim.cancelled_orders().await.contains(&first_stop));

    let stop_price = |orders: Vec<trader_core::OpenOrder>, id: &str| {
        orders.into_iter().find(|o| o.order_id == id).and_then(|o| o.stop_price)
    };
    assert_eq!(stop_price(h.sim.all_open_orders().await, &moved), Some(dec!(3040)));

    // 후보 3035 < 3040 → 유지
    h.sim.set_price("ETHUSDT", dec!(3045)).await;
    h.engine.tick_at(t + Duration::seconds(30)).await;

    let held = h
        .engine
        .managed_position("ETHUSDT")
        .and_then(|m| m.trailing_stop_order_id.clone())
        .unwrap();
    assert_eq!(held, moved);
    assert_eq!(stop_price(h.sim.all_open_orders().await, &held), Some(dec!(3040)));
}

#[tokio::test]
async fn test_rejected_trailing_move_keeps_position_protected() {
    let mut h = harness().await;
    h.sim.set_klines("ETHUSDT", flat_klines()).await;
    h.sim.set_position("ETHUSDT", dec!(0.3), dec!(3000)).await;

    let t = at(11, 0, 0);
    h.engine.tick_at(t).await;
    let first_stop = tracked_stop(&h, "ETHUSDT").unwrap();

    // 취소는 성공하고 새 스톱(3040)만 거부됨
    h.sim.set_price("ETHUSDT", dec!(3050)).await;
    h.sim
        .fail_next(SimOp::PlaceOrder, ExchangeError::OrderRejected("stop would trigger".into()), 1)
        .await;
    h.engine.tick_at(t + Duration::seconds(15)).await;

    let gateway = h.engine.risk().gateway().clone();
    assert!(gateway.position("ETHUSDT").await.unwrap().is_some());
    assert!(h.sim.cancelled_orders().await.contains(&first_stop));

    let restored = tracked_stop(&h, "ETHUSDT").unwrap();
    assert_ne!(restored, first_stop);
    let open = h.sim.all_open_orders().await;
    let stop = open.iter().find(|o| o.order_id == restored).unwrap();
    assert_eq!(stop.stop_price, Some(dec!(2990)));
    assert_eq!(stop.quantity, dec!(0.3));
    assert_eq!(stop.side, Side::Sell);
    assert!(stop.reduce_only);
    assert_eq!(h.messages(NotifyLevel::Warning, "rejected"), 1);
    assert_eq!(h.messages(NotifyLevel::Critical, "NO stop-loss"), 0);

    // 다음 틱에서는 복구된 스톱을 기준으로 정상 이동
    h.engine.tick_at(t + Duration::seconds(30)).await;

    let moved = tracked_stop(&h, "ETHUSDT").unwrap();
    assert_ne!(moved, restored);
    let open = h.sim.all_open_orders().await;
    let stop = open.iter().find(|o| o.order_id == moved).unwrap();
    assert_eq!(stop.stop_price, Some(dec!(3040)));
}

#[tokio::test]
async fn test_end_of_day_checklist_reports_summary() {
    let mut h = harness().await;
    h.journal
        .append_trade(TradeRecord {
            timestamp: at(12, 0, 0),
            symbol: "ETHUSDT".to_string(),
            side: Side::Buy,
            entry_price: dec!(3000),
            exit_price: dec!(3050),
            quantity: dec!(0.3),
            pnl: dec!(15),
            reason: "Position closed (stop/target)".to_string(),
        })
        .await
        .unwrap();

    // 22:30 Kyiv
    h.engine.tick_at(at(19, 30, 0)).await;

    let messages = h.notes.messages_at(NotifyLevel::Info);
    let summary = messages.iter().find(|m| m.starts_with("End of day")).unwrap();
    assert!(summary.contains("PnL 15"));
    assert!(summary.contains("1 trades"));
    assert!(summary.contains("- review journal"));
}
