//! 실행 엔진 에러 타입.
//!
//! 시작 단계의 에러만 호출자에게 전파됩니다. 틱 루프 안의 실패는 로그와
//! 알림으로 처리되고 다음 단계로 넘어갑니다.

use rust_decimal::Decimal;
use thiserror::Error;
use trader_core::{PlanError, TraderError};
use trader_exchange::ExchangeError;

/// 실행 오류 유형.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Exchange unreachable: {0}")]
    ExchangeUnreachable(#[source] ExchangeError),

    #[error("Exchange error: {0}")]
    Exchange(#[from] ExchangeError),

    #[error("Plan invalid: {0}")]
    Plan(#[from] PlanError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Phase '{phase}' uses unknown action '{action}'")]
    UnknownAction { phase: String, action: String },

    #[error("Free margin ratio {ratio} below floor {floor}")]
    InsufficientFreeMargin { ratio: Decimal, floor: Decimal },

    #[error("Required margin {required} exceeds margin limit {limit}")]
    MarginBudgetExceeded { required: Decimal, limit: Decimal },
}

/// 실행 작업을 위한 Result 타입.
pub type ExecutionResult<T> = Result<T, ExecutionError>;

impl From<TraderError> for ExecutionError {
    fn from(err: TraderError) -> Self {
        match err {
            TraderError::Plan(e) => ExecutionError::Plan(e),
            other => ExecutionError::Config(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trader_error_conversion() {
        let err: ExecutionError = TraderError::Config("bad tz".into()).into();
        assert!(matches!(err, ExecutionError::Config(msg) if msg.contains("bad tz")));

        let err: ExecutionError =
            TraderError::Plan(PlanError::InvalidDate("x".into())).into();
        assert!(matches!(err, ExecutionError::Plan(_)));
    }
}
