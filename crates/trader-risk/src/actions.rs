//! 리스크 액션 어휘.
//!
//! 플랜의 리스크 트리거와 모니터링 규칙은 액션을 문자열로 지정합니다.
//! 문자열은 엔진 시작 시 [`RiskAction`]으로 해석되며, 알 수 없는 이름은
//! [`UnsupportedAction`]으로 보고됩니다.

use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;

/// 리스크 트리거/모니터링 규칙이 실행하는 액션.
#[derive(Debug, Clone, PartialEq)]
pub enum RiskAction {
    /// 모든 포지션 청산 (헤지 포함)
    CloseAll,
    /// 롱 포지션만 청산하고 헤지는 유지
    CloseLongsKeepHedge,
    /// 롱 포지션 청산
    CloseLongs,
    /// 플랜 자산의 모든 미체결 주문 취소
    CancelAllOrders,
    /// 규칙이 걸린 포지션 청산
    ClosePosition,
    /// 규칙이 걸린 포지션을 비율만큼 축소 (0.5 = 50%)
    ReducePosition(Decimal),
    /// 알림만 전송
    Notify,
}

/// 지원하지 않는 액션 이름.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported risk action '{0}'")]
pub struct UnsupportedAction(pub String);

impl RiskAction {
    /// 특정 포지션을 대상으로 하는 액션인지 확인합니다.
    pub fn targets_position(&self) -> bool {
        matches!(self, RiskAction::ClosePosition | RiskAction::ReducePosition(_))
    }
}

impl FromStr for RiskAction {
    type Err = UnsupportedAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        let action = match name {
            "close_all_positions" | "close_all" => RiskAction::CloseAll,
            "close_longs_keep_hedge" => RiskAction::CloseLongsKeepHedge,
            "close_longs" => RiskAction::CloseLongs,
            "cancel_all_orders" => RiskAction::CancelAllOrders,
            "close_position" => RiskAction::ClosePosition,
            "notify" => RiskAction::Notify,
            other => {
                let pct = other
                    .strip_prefix("reduce_position_")
                    .and_then(|p| p.parse::<Decimal>().ok())
                    .filter(|p| *p > Decimal::ZERO && *p <= Decimal::ONE_HUNDRED)
                    .ok_or_else(|| UnsupportedAction(name.to_string()))?;
                RiskAction::ReducePosition(pct / Decimal::ONE_HUNDRED)
            }
        };
        Ok(action)
    }
}

impl fmt::Display for RiskAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskAction::CloseAll => write!(f, "close_all_positions"),
            RiskAction::CloseLongsKeepHedge => write!(f, "close_longs_keep_hedge"),
            RiskAction::CloseLongs => write!(f, "close_longs"),
            RiskAction::CancelAllOrders => write!(f, "cancel_all_orders"),
            RiskAction::ClosePosition => write!(f, "close_position"),
            RiskAction::ReducePosition(ratio) => {
                write!(f, "reduce_position_{}", (ratio * Decimal::ONE_HUNDRED).normalize())
            }
            RiskAction::Notify => write!(f, "notify"),
        }
    }
}
