//! 트레이딩 플랜 실행 엔진.
//!
//! 이 crate는 다음을 제공합니다:
//! - 고정 간격 틱 루프를 구동하는 [`Engine`]
//! - 현지 시각 기반 단계 스케줄러와 액션 레지스트리
//! - 폴링 기반 합성 OCO 주문 쌍
//! - 관리 포지션 (손절, 헤지, 모니터링 규칙, 트레일링 스톱)
//! - 킬스위치, 강제 청산 시각, 진입 허용 시간대
//! - 시작 전 증거금 점검
//!
//! # 예제
//!
//! ```rust,ignore
//! use trader_execution::Engine;
//!
//! let mut engine = Engine::new(config.engine, risk, notifier, journal)?;
//! engine.startup_checks().await?;
//! engine.run(async { tokio::signal::ctrl_c().await.ok(); }).await;
//! ```

pub mod engine;
pub mod error;
pub mod guards;
pub mod oco;
pub mod phases;
pub mod placement;
pub mod positions;
pub mod startup;

// 주요 타입 재내보내기
pub use engine::Engine;
pub use error::{ExecutionError, ExecutionResult};
pub use guards::{EntryWindow, KillSwitch, TimeStop};
pub use oco::{OcoBook, OcoPair, OcoResolution, OcoState};
pub use phases::{ActionRegistry, PhaseAction, PhaseSchedule, ScheduledPhase, UnknownAction};
pub use placement::{build_entry_request, build_stop_loss_request, trigger_already_crossed, SkipReason};
pub use positions::{ManagedPosition, FUNDING_RATE_RULE, OPEN_INTEREST_RULE};
pub use startup::{required_margin, run_startup_checks, StartupReport};
