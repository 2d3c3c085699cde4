//! 거래소 에러 타입.

use thiserror::Error;

/// 거래소 관련 에러.
#[derive(Debug, Clone, Error)]
pub enum ExchangeError {
    /// 네트워크/연결 에러
    #[error("Network error: {0}")]
    NetworkError(String),

    /// 거래소 연결 끊김
    #[error("Disconnected: {0}")]
    Disconnected(String),

    /// 인증/권한 에러
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// 요청 한도 초과
    #[error("Rate limit exceeded")]
    RateLimited,

    /// 거래소 서버 에러 (HTTP 5xx)
    #[error("Server error {status}: {message}")]
    ServerError { status: u16, message: String },

    /// API 에러 코드
    #[error("API error {code}: {message}")]
    ApiError { code: i32, message: String },

    /// 파싱/역직렬화 에러
    #[error("Parse error: {0}")]
    ParseError(String),

    /// 유효하지 않은 수량/가격 정밀도
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    /// 전송 전 검증에서 거부된 주문
    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    /// 타임스탬프 동기화 에러
    #[error("Timestamp error: {0}")]
    TimestampError(String),

    /// 잔고/증거금 부족
    #[error("Insufficient balance: {0}")]
    InsufficientBalance(String),

    /// 주문을 찾을 수 없음
    #[error("Order not found: {0}")]
    OrderNotFound(String),

    /// 자산을 찾을 수 없음
    #[error("Asset not found: {0}")]
    AssetNotFound(String),

    /// 심볼을 찾을 수 없음
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    /// 거래소에서 주문 거부 (예: 즉시 트리거되는 스톱)
    #[error("Order rejected: {0}")]
    OrderRejected(String),

    /// 타임아웃
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// 알 수 없는 에러
    #[error("Unknown error: {0}")]
    Unknown(String),
}

/// 거래소 작업을 위한 Result 타입.
pub type ExchangeResult<T> = Result<T, ExchangeError>;

impl ExchangeError {
    /// 재시도 가능한 일시적 에러인지 확인.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExchangeError::NetworkError(_)
                | ExchangeError::Disconnected(_)
                | ExchangeError::RateLimited
                | ExchangeError::ServerError { .. }
                | ExchangeError::Timeout(_)
                | ExchangeError::TimestampError(_)
        )
    }

    /// 인증 에러인지 확인.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, ExchangeError::Unauthorized(_))
    }

    /// 재시도하면 안 되는 치명적 에러인지 확인.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ExchangeError::Unauthorized(_)
                | ExchangeError::InsufficientBalance(_)
                | ExchangeError::InvalidQuantity(_)
                | ExchangeError::InvalidOrder(_)
                | ExchangeError::OrderRejected(_)
        )
    }

    /// 주문이 이미 사라졌음(체결/취소)을 의미하는지 확인.
    pub fn is_order_not_found(&self) -> bool {
        matches!(self, ExchangeError::OrderNotFound(_))
    }
}

impl From<reqwest::Error> for ExchangeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ExchangeError::Timeout(err.to_string())
        } else if err.is_connect() || err.is_request() {
            ExchangeError::NetworkError(err.to_string())
        } else {
            ExchangeError::Unknown(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ExchangeError {
    fn from(err: serde_json::Error) -> Self {
        ExchangeError::ParseError(err.to_string())
    }
}

impl From<ExchangeError> for trader_core::TraderError {
    fn from(err: ExchangeError) -> Self {
        match err {
            ExchangeError::RateLimited => trader_core::TraderError::RateLimit(err.to_string()),
            ExchangeError::InsufficientBalance(msg) => trader_core::TraderError::InsufficientFunds(msg),
            e if e.is_retryable() => trader_core::TraderError::Network(e.to_string()),
            e => trader_core::TraderError::Exchange(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classes() {
        assert!(ExchangeError::Timeout("t".into()).is_retryable());
        assert!(ExchangeError::RateLimited.is_retryable());
        assert!(ExchangeError::ServerError { status: 503, message: "busy".into() }.is_retryable());
        assert!(ExchangeError::TimestampError("drift".into()).is_retryable());

        assert!(!ExchangeError::InsufficientBalance("margin".into()).is_retryable());
        assert!(!ExchangeError::InvalidOrder("limit".into()).is_retryable());
        assert!(!ExchangeError::OrderNotFound("1".into()).is_retryable());
    }

    #[test]
    fn test_fatal_classes() {
        assert!(ExchangeError::Unauthorized("key".into()).is_fatal());
        assert!(ExchangeError::InvalidQuantity("step".into()).is_fatal());
        assert!(!ExchangeError::NetworkError("reset".into()).is_fatal());
    }

    #[test]
    fn test_into_trader_error() {
        let err: trader_core::TraderError = ExchangeError::NetworkError("reset".into()).into();
        assert!(err.is_retryable());

        let err: trader_core::TraderError = ExchangeError::InsufficientBalance("x".into()).into();
        assert!(matches!(err, trader_core::TraderError::InsufficientFunds(_)));
    }
}
