//! 리스크 관리 시스템.
//!
//! 이 crate는 다음 기능을 제공합니다:
//! - 리스크/명목가/증거금 상한을 동시에 만족하는 포지션 사이징
//! - ATR 기반 트레일링 스톱 규칙
//! - 벤치마크 변동성 차단기와 급락 감지
//! - 긴급 청산, 부분 축소, 헤지 진입/청산
//! - 플랜 리스크 액션 어휘
//!
//! # 예제
//!
//! ```rust,ignore
//! use trader_risk::{RiskConfig, RiskManager};
//!
//! let manager = RiskManager::new(gateway, plan, RiskConfig::default(), "USDT");
//!
//! // 주문 직전 잔고를 다시 읽어 수량 계산
//! match manager.size_order(&asset, &group, true).await {
//!     Ok(size) => { /* size.quantity로 주문 */ }
//!     Err(reason) => { /* 주문하지 않음 */ }
//! }
//! ```

pub mod actions;
pub mod atr;
pub mod config;
pub mod manager;
pub mod position_sizing;
pub mod trailing_stop;
pub mod volatility;

// 주요 타입 재내보내기
pub use actions::{RiskAction, UnsupportedAction};
pub use atr::{atr, true_ranges};
pub use config::{ConfigValidationError, RiskConfig, VolatilityConfig};
pub use manager::{plan_symbols, ActionOutcome, ClosedPosition, RiskManager, SizingError};
pub use position_sizing::{calculate_position_size, PositionSize, SizingRejection, SizingRequest};
pub use trailing_stop::{TrailingDecision, TrailingStopRule};
pub use volatility::{population_std_dev, FlashDropDetector, VolatilityCheck, VolatilityMonitor};
