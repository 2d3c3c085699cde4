//! 거래소가 보고하는 선물 포지션.

use crate::domain::Side;
use crate::types::{Price, Quantity};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 단방향(one-way) 모드의 심볼별 포지션.
///
/// `amount`는 부호가 있는 수량입니다 (양수 = 롱, 음수 = 숏, 0 = 포지션 없음).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangePosition {
    /// 심볼
    pub symbol: String,
    /// 부호 있는 포지션 수량
    pub amount: Quantity,
    /// 평균 진입가
    pub entry_price: Price,
    /// 마크 가격
    pub mark_price: Price,
    /// 미실현 손익 (증거금 자산 기준)
    pub unrealized_pnl: Decimal,
    /// 레버리지
    pub leverage: u32,
}

impl ExchangePosition {
    /// 포지션이 없는지 확인합니다.
    pub fn is_flat(&self) -> bool {
        self.amount.is_zero()
    }

    /// 롱 포지션인지 확인합니다.
    pub fn is_long(&self) -> bool {
        self.amount > Decimal::ZERO
    }

    /// 숏 포지션인지 확인합니다.
    pub fn is_short(&self) -> bool {
        self.amount < Decimal::ZERO
    }

    /// 포지션 수량의 절대값.
    pub fn size(&self) -> Quantity {
        self.amount.abs()
    }

    /// 포지션을 연 방향. 포지션이 없으면 `None`.
    pub fn side(&self) -> Option<Side> {
        if self.is_long() {
            Some(Side::Buy)
        } else if self.is_short() {
            Some(Side::Sell)
        } else {
            None
        }
    }

    /// 포지션을 닫는 주문 방향.
    pub fn closing_side(&self) -> Side {
        if self.is_long() {
            Side::Sell
        } else {
            Side::Buy
        }
    }

    /// 마크 가격 기준 명목가 (절대값).
    pub fn notional(&self) -> Decimal {
        self.size() * self.mark_price
    }

    /// 진입가 대비 단위당 수익 (가격 단위, 방향 반영).
    pub fn profit_per_unit(&self, current_price: Price) -> Price {
        if self.is_short() {
            self.entry_price - current_price
        } else {
            current_price - self.entry_price
        }
    }
}
