//! 주문 타입.
//!
//! 이 모듈은 선물 계정에 제출되는 주문 관련 타입을 정의합니다:
//! - `Side` - 주문 방향 (매수/매도)
//! - `OrderType` - 주문 유형
//! - `OrderStatus` - 거래소가 보고하는 주문 상태
//! - `OrderRequest` - 주문 요청
//! - `OpenOrder` - 거래소에 존재하는 주문

use crate::types::{Price, Quantity};
use serde::{Deserialize, Serialize};

/// 주문 방향 (매수 또는 매도).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    /// 매수
    Buy,
    /// 매도
    Sell,
}

impl Side {
    /// 반대 방향을 반환합니다.
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

impl std::str::FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BUY" | "LONG" => Ok(Side::Buy),
            "SELL" | "SHORT" => Ok(Side::Sell),
            _ => Err(format!("Unknown side: {}", s)),
        }
    }
}

/// 주문 유형.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    /// 시장가 주문
    Market,
    /// 지정가 주문 (엔진은 제출하지 않지만 계정에 존재할 수 있음)
    Limit,
    /// 스톱 시장가 - 트리거 도달 시 시장가 체결
    StopMarket,
    /// 스톱 지정가 - 트리거 도달 시 지정가 주문 생성
    StopLimit,
}

impl OrderType {
    /// 조건부(스톱) 주문인지 확인합니다.
    pub fn is_stop(&self) -> bool {
        matches!(self, OrderType::StopMarket | OrderType::StopLimit)
    }
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderType::Market => write!(f, "MARKET"),
            OrderType::Limit => write!(f, "LIMIT"),
            OrderType::StopMarket => write!(f, "STOP_MARKET"),
            OrderType::StopLimit => write!(f, "STOP_LIMIT"),
        }
    }
}

/// 거래소 주문 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// 접수됨 (스톱 주문은 트리거 대기)
    New,
    /// 부분 체결됨
    PartiallyFilled,
    /// 전량 체결됨
    Filled,
    /// 취소됨
    Canceled,
    /// 거부됨
    Rejected,
    /// 만료됨
    Expired,
}

impl OrderStatus {
    /// 주문이 최종 상태인지 확인합니다.
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Canceled | OrderStatus::Rejected | OrderStatus::Expired
        )
    }

    /// 거래소 상태 문자열을 파싱합니다. 알 수 없는 값은 `New`로 취급합니다.
    pub fn from_exchange(s: &str) -> Self {
        match s {
            "PARTIALLY_FILLED" => OrderStatus::PartiallyFilled,
            "FILLED" => OrderStatus::Filled,
            "CANCELED" => OrderStatus::Canceled,
            "REJECTED" => OrderStatus::Rejected,
            "EXPIRED" => OrderStatus::Expired,
            _ => OrderStatus::New,
        }
    }
}

/// 새 주문 생성을 위한 주문 요청.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    /// 거래 심볼 (예: "BTCUSDT")
    pub symbol: String,
    /// 주문 방향
    pub side: Side,
    /// 주문 유형
    pub order_type: OrderType,
    /// 거래 수량
    pub quantity: Quantity,
    /// 지정가 (스톱 지정가 주문에 필수)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<Price>,
    /// 트리거 가격 (스톱 주문용)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_price: Option<Price>,
    /// 포지션 감소 전용
    #[serde(default)]
    pub reduce_only: bool,
    /// 클라이언트 주문 ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_order_id: Option<String>,
}

impl OrderRequest {
    /// 시장가 주문을 생성합니다.
    pub fn market(symbol: impl Into<String>, side: Side, quantity: Quantity) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            order_type: OrderType::Market,
            quantity,
            price: None,
            stop_price: None,
            reduce_only: false,
            client_order_id: None,
        }
    }

    /// 포지션 감소 전용 시장가 주문을 생성합니다.
    pub fn close_market(symbol: impl Into<String>, side: Side, quantity: Quantity) -> Self {
        Self::market(symbol, side, quantity).reduce_only()
    }

    /// 스톱 시장가 주문을 생성합니다.
    pub fn stop_market(
        symbol: impl Into<String>,
        side: Side,
        quantity: Quantity,
        stop_price: Price,
    ) -> Self {
        Self {
            order_type: OrderType::StopMarket,
            stop_price: Some(stop_price),
            ..Self::market(symbol, side, quantity)
        }
    }

    /// 스톱 지정가 주문을 생성합니다.
    pub fn stop_limit(
        symbol: impl Into<String>,
        side: Side,
        quantity: Quantity,
        stop_price: Price,
        limit_price: Price,
    ) -> Self {
        Self {
            order_type: OrderType::StopLimit,
            stop_price: Some(stop_price),
            price: Some(limit_price),
            ..Self::market(symbol, side, quantity)
        }
    }

    /// 포지션 감소 전용으로 설정합니다.
    pub fn reduce_only(mut self) -> Self {
        self.reduce_only = true;
        self
    }

    /// 클라이언트 주문 ID를 설정합니다.
    pub fn with_client_order_id(mut self, id: impl Into<String>) -> Self {
        self.client_order_id = Some(id.into());
        self
    }

    /// 명목가 산정에 사용할 가격 (지정가 우선, 없으면 트리거 가격).
    pub fn reference_price(&self) -> Option<Price> {
        self.price.or(self.stop_price)
    }
}

/// 거래소에 존재하는(또는 방금 접수된) 주문.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenOrder {
    /// 거래소 주문 ID
    pub order_id: String,
    /// 클라이언트 주문 ID
    pub client_order_id: Option<String>,
    /// 심볼
    pub symbol: String,
    /// 방향
    pub side: Side,
    /// 유형
    pub order_type: OrderType,
    /// 상태
    pub status: OrderStatus,
    /// 주문 수량
    pub quantity: Quantity,
    /// 지정가
    pub price: Option<Price>,
    /// 트리거 가격
    pub stop_price: Option<Price>,
    /// 포지션 감소 전용 여부
    pub reduce_only: bool,
}

impl OpenOrder {
    /// 같은 조건으로 다시 제출할 수 있는 주문 요청.
    ///
    /// 클라이언트 주문 ID는 비워 두어 새로 발급받습니다.
    pub fn to_request(&self) -> OrderRequest {
        OrderRequest {
            symbol: self.symbol.clone(),
            side: self.side,
            order_type: self.order_type,
            quantity: self.quantity,
            price: self.price,
            stop_price: self.stop_price,
            reduce_only: self.reduce_only,
            client_order_id: None,
        }
    }
}
