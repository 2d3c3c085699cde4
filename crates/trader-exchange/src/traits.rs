//! 거래소 trait 정의.

use async_trait::async_trait;
use trader_core::{
    AccountBalance, ExchangePosition, FundingInfo, Kline, OpenInterest, OpenOrder, OrderRequest,
    Price, SymbolFilters, Timeframe,
};

use crate::ExchangeResult;

/// USDⓈ-M 선물 계정을 위한 원시 거래소 인터페이스.
///
/// 구현체는 재시도나 필터 보정을 하지 않습니다. 그 역할은
/// [`ExchangeGateway`](crate::ExchangeGateway)가 담당합니다.
#[async_trait]
pub trait FuturesExchange: Send + Sync {
    /// 거래소 이름 반환.
    fn name(&self) -> &str;

    /// 연결 및 인증 확인.
    async fn ping(&self) -> ExchangeResult<()>;

    // === 계좌 ===

    /// 증거금 자산 잔고 조회.
    async fn balance(&self, asset: &str) -> ExchangeResult<AccountBalance>;

    // === 거래 규칙 / 시장 데이터 ===

    /// 심볼 필터 조회 (호가/수량 단위, 최소 주문, 거래 상태).
    async fn symbol_filters(&self, symbol: &str) -> ExchangeResult<SymbolFilters>;

    /// 현재 가격 조회.
    async fn current_price(&self, symbol: &str) -> ExchangeResult<Price>;

    /// 과거 캔들 조회.
    async fn klines(&self, symbol: &str, timeframe: Timeframe, limit: u32) -> ExchangeResult<Vec<Kline>>;

    /// 마크 가격과 최근 펀딩 비율 조회.
    async fn funding_info(&self, symbol: &str) -> ExchangeResult<FundingInfo>;

    /// 미결제약정 조회.
    async fn open_interest(&self, symbol: &str) -> ExchangeResult<OpenInterest>;

    // === 주문 ===

    /// 심볼의 미체결 주문 조회.
    async fn open_orders(&self, symbol: &str) -> ExchangeResult<Vec<OpenOrder>>;

    /// 주문 제출.
    async fn place_order(&self, request: &OrderRequest) -> ExchangeResult<OpenOrder>;

    /// 주문 취소.
    async fn cancel_order(&self, symbol: &str, order_id: &str) -> ExchangeResult<()>;

    // === 포지션 ===

    /// 모든 포지션 조회 (수량 0 포함 가능).
    async fn positions(&self) -> ExchangeResult<Vec<ExchangePosition>>;

    /// 심볼 레버리지 설정.
    async fn set_leverage(&self, symbol: &str, leverage: u32) -> ExchangeResult<()>;
}
