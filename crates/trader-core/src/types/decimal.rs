//! 정밀한 금융 계산을 위한 Decimal 유틸리티.

use rust_decimal::Decimal;

/// 금융 정밀도를 위한 가격 타입.
pub type Price = Decimal;

/// 주문 수량을 위한 타입.
pub type Quantity = Decimal;

/// Decimal 연산을 위한 확장 트레이트.
pub trait DecimalExt {
    /// 증분(`step`)의 배수로 내림합니다. `step`이 0 이하이면 그대로 반환합니다.
    fn floor_to_step(&self, step: Decimal) -> Decimal;

    /// 증분의 배수로 올림합니다.
    fn ceil_to_step(&self, step: Decimal) -> Decimal;

    /// `from` 대비 변화율(%)을 계산합니다. `from`이 0이면 `None`.
    fn pct_change_from(&self, from: Decimal) -> Option<Decimal>;
}

impl DecimalExt for Decimal {
    fn floor_to_step(&self, step: Decimal) -> Decimal {
        if step <= Decimal::ZERO {
            return *self;
        }
        (*self / step).floor() * step
    }

    fn ceil_to_step(&self, step: Decimal) -> Decimal {
        if step <= Decimal::ZERO {
            return *self;
        }
        (*self / step).ceil() * step
    }

    fn pct_change_from(&self, from: Decimal) -> Option<Decimal> {
        if from.is_zero() {
            return None;
        }
        Some((*self - from) / from * Decimal::ONE_HUNDRED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_step_rounding() {
        assert_eq!(dec!(1.23456).floor_to_step(dec!(0.001)), dec!(1.234));
        assert_eq!(dec!(1.23456).ceil_to_step(dec!(0.001)), dec!(1.235));
        assert_eq!(dec!(1.2).floor_to_step(dec!(0.1)), dec!(1.2));
        assert_eq!(dec!(7).floor_to_step(Decimal::ZERO), dec!(7));
    }

    #[test]
    fn test_pct_change() {
        assert_eq!(dec!(90).pct_change_from(dec!(100)), Some(dec!(-10)));
        assert_eq!(dec!(1).pct_change_from(Decimal::ZERO), None);
    }
}
