//! # Trader Notification
//!
//! 엔진 알림 서비스.
//!
//! 레벨(info/success/warning/critical/trade)이 붙은 메시지를 등록된 모든
//! 전송기로 보냅니다. 지원 채널:
//! - Telegram (Bot API `sendMessage`)
//! - tracing 로그

pub mod log_sender;
pub mod manager;
pub mod telegram;
pub mod types;

pub use log_sender::*;
pub use manager::*;
pub use telegram::*;
pub use types::*;
