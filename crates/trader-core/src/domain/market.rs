//! 시장 데이터와 거래 규칙.

use crate::types::{Price, Quantity};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 심볼별 거래소 필터 (호가 단위, 수량 단위, 최소 주문).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolFilters {
    /// 심볼
    pub symbol: String,
    /// 가격 증분
    pub tick_size: Price,
    /// 수량 증분
    pub step_size: Quantity,
    /// 최소 주문 수량
    pub min_qty: Quantity,
    /// 최소 명목가 (수량 × 가격)
    pub min_notional: Decimal,
    /// 거래 가능 상태 (`status == "TRADING"`)
    pub tradable: bool,
}

/// OHLCV 캔들.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kline {
    /// 시작 시각
    pub open_time: DateTime<Utc>,
    /// 시가
    pub open: Price,
    /// 고가
    pub high: Price,
    /// 저가
    pub low: Price,
    /// 종가
    pub close: Price,
    /// 거래량
    pub volume: Decimal,
}

/// 증거금 자산 잔고.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountBalance {
    /// 자산 (예: "USDT")
    pub asset: String,
    /// 총 잔고 (지갑 잔고)
    pub total: Decimal,
    /// 주문 가능 잔고
    pub available: Decimal,
}

impl AccountBalance {
    /// 사용 중인 증거금 (총 잔고 - 가용 잔고, 음수는 0).
    pub fn margin_in_use(&self) -> Decimal {
        (self.total - self.available).max(Decimal::ZERO)
    }

    /// 가용 증거금 비율. 총 잔고가 0 이하이면 0.
    pub fn free_margin_ratio(&self) -> Decimal {
        if self.total <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        self.available / self.total
    }
}

/// 펀딩 정보 (프리미엄 인덱스).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundingInfo {
    /// 심볼
    pub symbol: String,
    /// 마크 가격
    pub mark_price: Price,
    /// 최근 펀딩 비율 (0.0001 = 0.01%)
    pub last_funding_rate: Decimal,
}

/// 미결제약정.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenInterest {
    /// 심볼
    pub symbol: String,
    /// 미결제약정 (계약 수량)
    pub open_interest: Decimal,
    /// 조회 시각
    pub time: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_margin_in_use() {
        let balance = AccountBalance {
            asset: "USDT".to_string(),
            total: dec!(10000),
            available: dec!(7500),
        };

        assert_eq!(balance.margin_in_use(), dec!(2500));
        assert_eq!(balance.free_margin_ratio(), dec!(0.75));
    }

    #[test]
    fn test_empty_account_ratio() {
        let balance = AccountBalance {
            asset: "USDT".to_string(),
            total: Decimal::ZERO,
            available: Decimal::ZERO,
        };
        assert_eq!(balance.free_margin_ratio(), Decimal::ZERO);
    }
}
