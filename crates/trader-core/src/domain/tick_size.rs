//! 호가 단위(Tick Size)와 수량 단위(Step Size) 처리.
//!
//! 선물 거래소는 심볼별로 고정된 가격/수량 증분을 사용합니다.
//! 증분에 맞지 않는 주문은 필터 위반으로 거부되므로, 제출 전에 라운딩합니다.

use rust_decimal::Decimal;

use crate::domain::SymbolFilters;

/// 호가 단위 라운딩 방법
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundMethod {
    /// 일반 반올림
    Round,
    /// 내림 (기본, 노출을 늘리지 않음)
    Floor,
    /// 올림
    Ceil,
}

fn round_to(value: Decimal, increment: Decimal, method: RoundMethod) -> Decimal {
    if increment <= Decimal::ZERO {
        return value;
    }

    let units = value / increment;
    let rounded = match method {
        RoundMethod::Round => units.round(),
        RoundMethod::Floor => units.floor(),
        RoundMethod::Ceil => units.ceil(),
    };

    (rounded * increment).normalize()
}

/// 호가 단위 제공자 trait
pub trait TickSizeProvider: Send + Sync {
    /// 주어진 가격에 대한 호가 단위를 반환합니다.
    fn tick_size(&self, price: Decimal) -> Decimal;

    /// 가격을 호가 단위로 라운딩합니다.
    fn round_to_tick(&self, price: Decimal, method: RoundMethod) -> Decimal {
        round_to(price, self.tick_size(price), method)
    }

    /// 가격이 호가 단위에 맞는지 검증합니다.
    fn is_valid_price(&self, price: Decimal) -> bool {
        let tick = self.tick_size(price);
        if tick.is_zero() {
            return true;
        }
        (price % tick).is_zero()
    }
}

impl TickSizeProvider for SymbolFilters {
    fn tick_size(&self, _price: Decimal) -> Decimal {
        self.tick_size
    }
}

impl SymbolFilters {
    /// 수량을 수량 단위로 라운딩합니다.
    pub fn round_to_step(&self, quantity: Decimal, method: RoundMethod) -> Decimal {
        round_to(quantity, self.step_size, method)
    }

    /// 수량이 수량 단위에 맞는지 검증합니다.
    pub fn is_valid_quantity(&self, quantity: Decimal) -> bool {
        if self.step_size.is_zero() {
            return true;
        }
        (quantity % self.step_size).is_zero()
    }
}
