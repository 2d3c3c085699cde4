//! CLI 도구 모음.
//!
//! 이 crate는 다음 기능을 제공합니다:
//! - 트레이딩 플랜 실행 (실거래/모의투자)
//! - 플랜 사전 점검
//! - 유효 설정 출력

pub mod commands;

pub use commands::*;
