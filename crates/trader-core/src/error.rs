//! 트레이딩 시스템의 에러 타입.
//!
//! 이 모듈은 실행 엔진 전반에서 공유되는 에러 타입을 정의합니다.
//! 거래소/리스크 계층은 각 크레이트에서 더 구체적인 에러를 정의하고,
//! 필요한 경우 `TraderError`로 변환합니다.

use thiserror::Error;

/// 핵심 트레이딩 에러.
#[derive(Debug, Error)]
pub enum TraderError {
    /// 설정 에러
    #[error("설정 에러: {0}")]
    Config(String),

    /// 트레이딩 플랜 에러
    #[error("플랜 에러: {0}")]
    Plan(#[from] PlanError),

    /// 거래소 에러
    #[error("거래소 에러: {0}")]
    Exchange(String),

    /// 주문 에러
    #[error("주문 에러: {0}")]
    Order(String),

    /// 리스크 관리 에러
    #[error("리스크 에러: {0}")]
    Risk(String),

    /// 거래 저널 에러
    #[error("저널 에러: {0}")]
    Journal(String),

    /// 네트워크 에러
    #[error("네트워크 에러: {0}")]
    Network(String),

    /// 요청 한도 초과
    #[error("요청 한도 초과: {0}")]
    RateLimit(String),

    /// 직렬화 에러
    #[error("직렬화 에러: {0}")]
    Serialization(String),

    /// 파일 입출력 에러
    #[error("입출력 에러: {0}")]
    Io(#[from] std::io::Error),

    /// 잔고 부족
    #[error("잔고 부족: {0}")]
    InsufficientFunds(String),

    /// 잘못된 입력
    #[error("잘못된 입력: {0}")]
    InvalidInput(String),
}

/// 트레이딩 작업을 위한 Result 타입.
pub type TraderResult<T> = Result<T, TraderError>;

impl TraderError {
    /// 재시도 가능한 에러인지 확인합니다.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TraderError::Network(_) | TraderError::RateLimit(_))
    }

    /// 치명적인 에러인지 확인합니다.
    ///
    /// 설정/플랜 에러는 시작 단계에서만 치명적으로 취급됩니다.
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            TraderError::Config(_) | TraderError::Plan(_) | TraderError::InsufficientFunds(_)
        )
    }
}

impl From<serde_json::Error> for TraderError {
    fn from(err: serde_json::Error) -> Self {
        TraderError::Serialization(err.to_string())
    }
}

impl From<config::ConfigError> for TraderError {
    fn from(err: config::ConfigError) -> Self {
        TraderError::Config(err.to_string())
    }
}

/// 트레이딩 플랜 의미 검증 에러.
///
/// 스키마(JSON 구조) 에러는 `Parse`로, 값의 의미 오류는 나머지 변형으로 보고됩니다.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlanError {
    /// 플랜 파일을 읽을 수 없음
    #[error("plan file unreadable: {0}")]
    Unreadable(String),

    /// JSON 파싱/스키마 에러
    #[error("plan parse error: {0}")]
    Parse(String),

    /// 잘못된 날짜 형식 (YYYY-MM-DD)
    #[error("invalid plan_date '{0}'")]
    InvalidDate(String),

    /// 잘못된 시각 형식 (HH:MM)
    #[error("phase '{phase}' has invalid time '{value}'")]
    InvalidPhaseTime { phase: String, value: String },

    /// 범위를 벗어난 값
    #[error("{field} out of range: {reason}")]
    OutOfRange { field: String, reason: String },

    /// 주문 그룹 정의 오류
    #[error("order group {symbol}/{group}: {reason}")]
    InvalidOrderGroup {
        symbol: String,
        group: String,
        reason: String,
    },
}

impl PlanError {
    /// 범위 에러를 생성합니다.
    pub fn out_of_range(field: impl Into<String>, reason: impl Into<String>) -> Self {
        PlanError::OutOfRange {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
