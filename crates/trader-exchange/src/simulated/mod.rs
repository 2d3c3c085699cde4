//! 모의투자와 테스트를 위한 시뮬레이션 거래소.
//!
//! 실제 거래소와 같은 [`FuturesExchange`](crate::FuturesExchange) trait을 구현하며
//! 다음을 제공합니다:
//! - 지갑 잔고와 증거금 계산
//! - 가격 갱신에 따른 스톱 주문 트리거
//! - 포지션 감소 전용 주문과 실현 손익
//! - 장애 주입과 호출 횟수 계측
//!
//! # 예제
//!
//! ```ignore
//! use trader_exchange::simulated::{SimulatedExchange, SimulatedConfig};
//!
//! let exchange = SimulatedExchange::new(
//!     SimulatedConfig::default().with_initial_balance(dec!(10000)),
//! );
//! exchange.add_symbol(filters).await;
//! exchange.set_price("BTCUSDT", dec!(60000)).await;
//! ```

mod exchange;

pub use exchange::{SimOp, SimulatedConfig, SimulatedExchange};
