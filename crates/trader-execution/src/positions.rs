//! 관리 중인 포지션과 모니터링 규칙.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use trader_core::{ExchangePosition, Price, Quantity, Side, TradeRecord};

/// 펀딩 비율 규칙 이름.
pub const FUNDING_RATE_RULE: &str = "funding_rate_pct";
/// 미결제약정 변화 규칙 이름.
pub const OPEN_INTEREST_RULE: &str = "open_interest_pct";

/// 엔진이 관리하는 포지션 (심볼당 최대 하나).
#[derive(Debug, Clone, PartialEq)]
pub struct ManagedPosition {
    pub symbol: String,
    /// 포지션 방향 (롱 = Buy)
    pub side: Side,
    pub amount: Quantity,
    pub entry_price: Price,
    pub opened_at: DateTime<Utc>,
    /// 추적 중인 손절(트레일링) 주문 ID
    pub trailing_stop_order_id: Option<String>,
    /// 이미 발동한 모니터링 규칙
    pub fired_triggers: HashSet<String>,
    /// 마지막으로 관측한 미결제약정
    pub last_open_interest: Option<Decimal>,
    /// 연결된 헤지 심볼
    pub hedge_symbol: Option<String>,
    /// 마지막 관측 마크 가격
    pub last_mark_price: Price,
    /// 마지막 관측 미실현 손익
    pub last_unrealized_pnl: Decimal,
}

impl ManagedPosition {
    /// 거래소 포지션에서 생성합니다. 포지션이 없으면 `None`.
    pub fn open(position: &ExchangePosition, hedge_symbol: Option<String>, now: DateTime<Utc>) -> Option<Self> {
        let side = position.side()?;
        Some(Self {
            symbol: position.symbol.clone(),
            side,
            amount: position.amount,
            entry_price: position.entry_price,
            opened_at: now,
            trailing_stop_order_id: None,
            fired_triggers: HashSet::new(),
            last_open_interest: None,
            hedge_symbol,
            last_mark_price: position.mark_price,
            last_unrealized_pnl: position.unrealized_pnl,
        })
    }

    /// 최신 거래소 상태를 반영합니다.
    pub fn observe(&mut self, position: &ExchangePosition) {
        self.amount = position.amount;
        self.entry_price = position.entry_price;
        self.last_mark_price = position.mark_price;
        self.last_unrealized_pnl = position.unrealized_pnl;
    }

    pub fn size(&self) -> Quantity {
        self.amount.abs()
    }

    /// 규칙이 아직 발동하지 않았으면 발동으로 표시하고 `true`.
    pub fn mark_fired(&mut self, rule: &str) -> bool {
        self.fired_triggers.insert(rule.to_string())
    }

    pub fn has_fired(&self, rule: &str) -> bool {
        self.fired_triggers.contains(rule)
    }

    /// 새 미결제약정을 기록하고 직전 관측 대비 변화율(%)을 반환합니다.
    pub fn record_open_interest(&mut self, open_interest: Decimal) -> Option<Decimal> {
        let previous = self.last_open_interest.replace(open_interest)?;
        open_interest_change_pct(previous, open_interest)
    }

    /// 사라진 포지션의 저널 기록 (마지막 관측값 기준).
    pub fn to_trade_record(&self, reason: &str, at: DateTime<Utc>) -> TradeRecord {
        TradeRecord {
            timestamp: at,
            symbol: self.symbol.clone(),
            side: self.side,
            entry_price: self.entry_price,
            exit_price: self.last_mark_price,
            quantity: self.size(),
            pnl: self.last_unrealized_pnl,
            reason: reason.to_string(),
        }
    }
}

/// 펀딩 비율(소수)이 퍼센트 임계값 이상인지 확인합니다.
pub fn funding_rule_fires(last_funding_rate: Decimal, threshold_pct: Decimal) -> bool {
    (last_funding_rate * Decimal::ONE_HUNDRED).abs() >= threshold_pct
}

/// 미결제약정 변화율의 절대값(%). 직전 값이 0이면 `None`.
pub fn open_interest_change_pct(previous: Decimal, current: Decimal) -> Option<Decimal> {
    if previous.is_zero() {
        return None;
    }
    Some(((current - previous) / previous * Decimal::ONE_HUNDRED).abs())
}
