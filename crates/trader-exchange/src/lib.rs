//! 선물 거래소 연결과 주문 전송 안정성 계층.
//!
//! 이 크레이트는 다음을 제공합니다:
//! - `FuturesExchange` trait: 원시 거래소 인터페이스
//! - Binance USDⓈ-M 선물 REST 커넥터
//! - 시뮬레이션 거래소 (모의투자 및 테스트용)
//! - 지수 백오프 재시도 정책
//! - 호가/수량 단위 및 최소 명목가 정규화
//! - `ExchangeGateway`: 재시도와 정규화를 적용한 단일 진입점

pub mod connector;
pub mod error;
pub mod gateway;
pub mod quantize;
pub mod retry;
pub mod simulated;
pub mod traits;

pub use connector::{BinanceFuturesClient, BinanceFuturesConfig};
pub use error::*;
pub use gateway::{ExchangeGateway, ReplaceOutcome};
pub use quantize::{normalize_order, validate_stop_order, NormalizationPolicy};
pub use retry::{with_retry, with_retry_if, RetryConfig};
pub use simulated::{SimOp, SimulatedConfig, SimulatedExchange};
pub use traits::*;
