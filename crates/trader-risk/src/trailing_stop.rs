//! ATR 기반 트레일링 스톱 규칙.
//!
//! 포지션 수익이 활성화 기준을 넘으면 `현재가 ∓ ATR × 배수`를 후보 스톱으로
//! 계산하고, 기존 스톱보다 유리할 때만 이동합니다. 스톱은 절대 느슨해지지 않습니다.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use trader_core::{DynamicManagement, Price, Side};

/// 트레일링 스톱 규칙.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrailingStopRule {
    /// ATR 배수
    pub atr_multiple: Decimal,
    /// 활성화에 필요한 단위당 가격 수익. 수익이 이 값과 같을 때부터 활성화됩니다 (`>=`).
    pub activate_after_profit: Decimal,
    /// 새 스톱 가격 소수점 자릿수
    pub price_dp: u32,
}

/// 트레일링 판단 결과.
#[derive(Debug, Clone, PartialEq)]
pub enum TrailingDecision {
    /// 수익이 활성화 기준 미만
    NotActivated { profit: Decimal },
    /// 후보 스톱이 기존 스톱보다 유리하지 않음
    Hold { candidate: Price },
    /// 스톱을 `new_stop`으로 이동
    Move { new_stop: Price },
}

impl TrailingStopRule {
    /// 플랜의 동적 관리 설정에서 규칙을 생성합니다. ATR 배수가 없으면 `None`.
    pub fn from_plan(dm: &DynamicManagement, price_dp: u32) -> Option<Self> {
        let atr_multiple = dm.trailing_sl_atr_multiple.filter(|m| *m > Decimal::ZERO)?;
        Some(Self {
            atr_multiple,
            activate_after_profit: dm.activate_after_profit.unwrap_or(Decimal::ZERO),
            price_dp,
        })
    }

    /// 방향을 고려한 단위당 수익.
    pub fn profit(side: Side, entry_price: Price, current_price: Price) -> Decimal {
        match side {
            Side::Buy => current_price - entry_price,
            Side::Sell => entry_price - current_price,
        }
    }

    /// 수익이 활성화 기준에 도달했는지 확인합니다 (ATR 조회 전 단계).
    ///
    /// 기준과 정확히 같은 수익도 활성화로 봅니다.
    pub fn is_active(&self, side: Side, entry_price: Price, current_price: Price) -> bool {
        Self::profit(side, entry_price, current_price) >= self.activate_after_profit
    }

    /// 후보 스톱 가격.
    pub fn candidate_stop(&self, side: Side, current_price: Price, atr: Decimal) -> Price {
        let offset = atr * self.atr_multiple;
        let raw = match side {
            Side::Buy => current_price - offset,
            Side::Sell => current_price + offset,
        };
        raw.round_dp_with_strategy(self.price_dp, RoundingStrategy::MidpointAwayFromZero)
    }

    /// 스톱 이동 여부를 판단합니다.
    ///
    /// `side`는 포지션 방향(롱 = Buy)입니다.
    pub fn evaluate(
        &self,
        side: Side,
        entry_price: Price,
        current_price: Price,
        atr: Decimal,
        current_stop: Price,
    ) -> TrailingDecision {
        let profit = Self::profit(side, entry_price, current_price);
        if profit < self.activate_after_profit {
            return TrailingDecision::NotActivated { profit };
        }

        let candidate = self.candidate_stop(side, current_price, atr);
        let improves = match side {
            Side::Buy => candidate > current_stop,
            Side::Sell => candidate < current_stop,
        };

        if improves && candidate > Decimal::ZERO {
            TrailingDecision::Move { new_stop: candidate }
        } else {
            TrailingDecision::Hold { candidate }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn rule() -> TrailingStopRule {
        TrailingStopRule {
            atr_multiple: dec!(1.5),
            activate_after_profit: dec!(0.02),
            price_dp: 4,
        }
    }

    #[test]
    fn test_not_activated_below_profit() {
        let decision = rule().evaluate(Side::Buy, dec!(1.00), dec!(1.01), dec!(0.01), dec!(0.95));
        assert_eq!(decision, TrailingDecision::NotActivated { profit: dec!(0.01) });
    }

    #[test]
    fn test_activates_at_exact_threshold() {
        // 수익 0.02 == 기준 0.02
        assert!(rule().is_active(Side::Buy, dec!(1.00), dec!(1.02)));
        assert!(!rule().is_active(Side::Buy, dec!(1.00), dec!(1.0199)));

        // 1.02 - 0.01 * 1.5 = 1.005 > 0.95
        let decision = rule().evaluate(Side::Buy, dec!(1.00), dec!(1.02), dec!(0.01), dec!(0.95));
        assert_eq!(decision, TrailingDecision::Move { new_stop: dec!(1.005) });
    }

    #[test]
    fn test_long_moves_up_only() {
        // 1.10 - 0.02 * 1.5 = 1.07 > 0.95
        let decision = rule().evaluate(Side::Buy, dec!(1.00), dec!(1.10), dec!(0.02), dec!(0.95));
        assert_eq!(decision, TrailingDecision::Move { new_stop: dec!(1.07) });

        // 기존 스톱이 더 높으면 유지
        let decision = rule().evaluate(Side::Buy, dec!(1.00), dec!(1.10), dec!(0.02), dec!(1.08));
        assert_eq!(decision, TrailingDecision::Hold { candidate: dec!(1.07) });
    }

    #[test]
    fn test_short_moves_down_only() {
        // 0.90 + 0.02 * 1.5 = 0.93 < 1.05
        let decision = rule().evaluate(Side::Sell, dec!(1.00), dec!(0.90), dec!(0.02), dec!(1.05));
        assert_eq!(decision, TrailingDecision::Move { new_stop: dec!(0.93) });

        let decision = rule().evaluate(Side::Sell, dec!(1.00), dec!(0.90), dec!(0.02), dec!(0.92));
        assert!(matches!(decision, TrailingDecision::Hold { .. }));
    }

    #[test]
    fn test_candidate_rounded() {
        let stop = rule().candidate_stop(Side::Buy, dec!(1.123456), dec!(0.001));
        assert_eq!(stop, dec!(1.122));
    }

    #[test]
    fn test_from_plan() {
        let dm = DynamicManagement {
            trailing_sl_atr_multiple: Some(dec!(2)),
            atr_window_min: Some(5),
            activate_after_profit: None,
        };
        let rule = TrailingStopRule::from_plan(&dm, 4).unwrap();
        assert_eq!(rule.activate_after_profit, Decimal::ZERO);

        let none = DynamicManagement {
            trailing_sl_atr_multiple: None,
            atr_window_min: None,
            activate_after_profit: None,
        };
        assert!(TrailingStopRule::from_plan(&none, 4).is_none());
    }
}
