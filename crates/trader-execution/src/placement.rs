//! 진입 주문 구성.

use std::fmt;

use rust_decimal::Decimal;
use trader_core::{OrderGroup, OrderRequest, Price, Quantity, Side};

/// 진입 레그를 배치하지 않은 이유.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// 킬스위치로 오늘 진입 중단
    Paused,
    /// 진입 허용 시간대 밖
    OutsideEntryWindow,
    /// 이미 활성 OCO 쌍이 있음
    PairExists,
    /// 그룹 유효 시간 밖
    OutsideValidity,
    /// 현재가가 이미 트리거를 넘음
    TriggerCrossed { price: Price, trigger: Price },
    /// 거래 불가 심볼
    NotTradable,
    /// 가용 증거금 부족
    LowFreeMargin { ratio: Decimal, floor: Decimal },
    /// 트리거를 넘지 않은 레그가 없음
    NoEligibleLeg,
    /// 사이징 거부
    Sizing(String),
    /// 거래소 호출 실패
    Exchange(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Paused => write!(f, "trading paused by kill-switch"),
            SkipReason::OutsideEntryWindow => write!(f, "outside entry window"),
            SkipReason::PairExists => write!(f, "OCO pair already active"),
            SkipReason::OutsideValidity => write!(f, "outside group validity window"),
            SkipReason::TriggerCrossed { price, trigger } => {
                write!(f, "price {} already beyond trigger {}", price, trigger)
            }
            SkipReason::NotTradable => write!(f, "symbol not tradable"),
            SkipReason::LowFreeMargin { ratio, floor } => {
                write!(f, "free margin ratio {} below {}", ratio, floor)
            }
            SkipReason::NoEligibleLeg => write!(f, "no leg left after trigger check"),
            SkipReason::Sizing(reason) => write!(f, "sizing rejected: {}", reason),
            SkipReason::Exchange(reason) => write!(f, "exchange error: {}", reason),
        }
    }
}

/// 현재가가 이미 트리거를 넘었는지 확인합니다.
///
/// 매수 스톱은 현재가 ≥ 트리거, 매도 스톱은 현재가 ≤ 트리거이면 즉시 체결되므로
/// 배치하지 않습니다.
pub fn trigger_already_crossed(side: Side, current_price: Price, trigger: Price) -> bool {
    match side {
        Side::Buy => current_price >= trigger,
        Side::Sell => current_price <= trigger,
    }
}

/// 진입 스톱 주문 요청을 만듭니다.
///
/// 그룹이 스톱 지정가면 `STOP_LIMIT`, 아니면 `STOP_MARKET`입니다.
pub fn build_entry_request(symbol: &str, side: Side, group: &OrderGroup, quantity: Quantity) -> OrderRequest {
    match (group.is_stop_limit(), group.limit_price) {
        (true, Some(limit)) => {
            OrderRequest::stop_limit(symbol, side, quantity, group.trigger_price, limit)
        }
        _ => OrderRequest::stop_market(symbol, side, quantity, group.trigger_price),
    }
}

/// 포지션 보호용 감소 전용 손절 주문 요청.
///
/// `position_side`는 포지션 방향입니다 (롱 = Buy).
pub fn build_stop_loss_request(
    symbol: &str,
    position_side: Side,
    quantity: Quantity,
    stop_price: Price,
) -> OrderRequest {
    OrderRequest::stop_market(symbol, position_side.opposite(), quantity, stop_price).reduce_only()
}
