//! # Trader Core
//!
//! 플랜 실행 봇의 핵심 도메인 모델 및 공통 인프라를 제공합니다:
//! - 트레이딩 플랜 모델과 의미 검증
//! - 주문, 포지션, 시장 데이터 타입
//! - 호가/수량 단위 라운딩
//! - 에러 타입
//! - 설정 관리
//! - 로깅 인프라
//! - 거래 저널

pub mod config;
pub mod domain;
pub mod error;
pub mod journal;
pub mod logging;
pub mod types;

pub use self::config::*;
pub use domain::*;
pub use error::*;
pub use journal::*;
pub use logging::*;
pub use types::*;
