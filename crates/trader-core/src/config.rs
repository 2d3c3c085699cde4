//! 설정 관리.
//!
//! 설정은 세 계층으로 로드됩니다:
//! 1. 코드에 정의된 기본값
//! 2. TOML 설정 파일 (선택)
//! 3. `TRADER__<SECTION>__<KEY>` 환경 변수
//!
//! API 키와 봇 토큰은 설정 파일이 아닌 환경 변수에서만 읽습니다.

use chrono::NaiveTime;
use chrono_tz::Tz;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::domain::parse_hhmm;
use crate::error::{TraderError, TraderResult};

/// 환경 변수 오버라이드 접두사.
pub const ENV_PREFIX: &str = "TRADER";

/// 애플리케이션 설정.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// 로깅 설정
    #[serde(default)]
    pub logging: LoggingConfig,
    /// 실행 엔진 설정
    #[serde(default)]
    pub engine: EngineConfig,
    /// 거래소 설정
    #[serde(default)]
    pub exchange: ExchangeConfig,
    /// 거래 저널 설정
    #[serde(default)]
    pub journal: JournalConfig,
    /// 알림 설정
    #[serde(default)]
    pub notifications: NotificationConfig,
}

/// 로깅 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// 로그 레벨
    pub level: String,
    /// 로그 형식 (pretty, json, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// 실행 엔진 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// 틱 간격 (초)
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
    /// 플랜 시각을 해석할 IANA 시간대
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// 단계 발동 허용 오차 (초, ±)
    #[serde(default = "default_phase_tolerance")]
    pub phase_tolerance_secs: i64,
    /// 신규 주문 허용 시작 시각 (현지, HH:MM)
    #[serde(default = "default_entry_start")]
    pub entry_window_start: String,
    /// 신규 주문 허용 종료 시각 (현지, HH:MM)
    #[serde(default = "default_entry_end")]
    pub entry_window_end: String,
    /// 강제 청산 시각 (현지, HH:MM)
    #[serde(default = "default_time_stop")]
    pub time_stop: String,
    /// 변동성 서킷브레이커 기준 심볼
    #[serde(default = "default_benchmark")]
    pub benchmark_symbol: String,
    /// 증거금 자산
    #[serde(default = "default_quote_asset")]
    pub quote_asset: String,
    /// 종료 시 모든 포지션 청산 여부
    #[serde(default)]
    pub close_positions_on_shutdown: bool,
}

fn default_tick_interval() -> u64 {
    15
}
fn default_timezone() -> String {
    "Europe/Kyiv".to_string()
}
fn default_phase_tolerance() -> i64 {
    30
}
fn default_entry_start() -> String {
    "08:00".to_string()
}
fn default_entry_end() -> String {
    "23:00".to_string()
}
fn default_time_stop() -> String {
    "23:00".to_string()
}
fn default_benchmark() -> String {
    "BTCUSDT".to_string()
}
fn default_quote_asset() -> String {
    "USDT".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval(),
            timezone: default_timezone(),
            phase_tolerance_secs: default_phase_tolerance(),
            entry_window_start: default_entry_start(),
            entry_window_end: default_entry_end(),
            time_stop: default_time_stop(),
            benchmark_symbol: default_benchmark(),
            quote_asset: default_quote_asset(),
            close_positions_on_shutdown: false,
        }
    }
}

impl EngineConfig {
    /// 설정된 시간대를 파싱합니다.
    pub fn tz(&self) -> TraderResult<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| TraderError::Config(format!("timezone '{}': {}", self.timezone, e)))
    }

    /// 신규 주문 허용 시간대 (시작, 종료).
    pub fn entry_window(&self) -> TraderResult<(NaiveTime, NaiveTime)> {
        Ok((
            hhmm("engine.entry_window_start", &self.entry_window_start)?,
            hhmm("engine.entry_window_end", &self.entry_window_end)?,
        ))
    }

    /// 강제 청산 시각.
    pub fn time_stop_at(&self) -> TraderResult<NaiveTime> {
        hhmm("engine.time_stop", &self.time_stop)
    }
}

fn hhmm(field: &str, value: &str) -> TraderResult<NaiveTime> {
    parse_hhmm(value).ok_or_else(|| TraderError::Config(format!("{} '{}' is not HH:MM", field, value)))
}

/// 거래소 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExchangeConfig {
    /// 테스트넷 사용 (환경 변수 `BINANCE_TESTNET`이 우선)
    #[serde(default)]
    pub testnet: bool,
    /// 서명 요청 수신 윈도우 (밀리초)
    #[serde(default = "default_recv_window")]
    pub recv_window_ms: u64,
    /// 요청별 타임아웃 (초)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// 재시도 정책
    #[serde(default)]
    pub retry: RetrySettings,
    /// 가격/수량 정규화 정책
    #[serde(default)]
    pub normalization: NormalizationSettings,
}

fn default_recv_window() -> u64 {
    5000
}
fn default_timeout() -> u64 {
    10
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            testnet: false,
            recv_window_ms: default_recv_window(),
            timeout_secs: default_timeout(),
            retry: RetrySettings::default(),
            normalization: NormalizationSettings::default(),
        }
    }
}

/// 재시도 정책 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrySettings {
    /// 최대 시도 횟수 (첫 시도 포함)
    pub max_attempts: u32,
    /// 첫 재시도 대기 (밀리초)
    pub initial_delay_ms: u64,
    /// 최대 대기 (밀리초)
    pub max_delay_ms: u64,
    /// 지수 배수
    pub multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 2_000,
            max_delay_ms: 10_000,
            multiplier: 2.0,
        }
    }
}

/// 가격/수량 정규화 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NormalizationSettings {
    /// 최소 명목가 상향 시 안전 여유 (0.01 = 1%)
    pub notional_safety_margin: Decimal,
    /// 원래 수량 대비 허용 최대 배수
    pub max_quantity_multiplier: Decimal,
}

impl Default for NormalizationSettings {
    fn default() -> Self {
        Self {
            notional_safety_margin: dec!(0.01),
            max_quantity_multiplier: dec!(5),
        }
    }
}

/// 거래 저널 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JournalConfig {
    /// JSON Lines 저널 파일 경로
    pub path: String,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            path: "logs/trading_journal.jsonl".to_string(),
        }
    }
}

/// 알림 설정.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NotificationConfig {
    /// 텔레그램 설정
    #[serde(default)]
    pub telegram: TelegramSettings,
}

/// 텔레그램 알림 설정 (토큰/채팅 ID는 환경 변수).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelegramSettings {
    /// 활성화 여부
    pub enabled: bool,
}

impl Default for TelegramSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// 기본값 + 파일 + 환경 변수 계층을 구성합니다.
fn layered(path: Option<&Path>) -> Result<config::Config, config::ConfigError> {
    let mut builder = config::Config::builder()
        .set_default("logging.level", "info")?
        .set_default("logging.format", "pretty")?;

    if let Some(path) = path {
        builder = builder.add_source(config::File::from(path).required(true));
    }

    builder
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()
}

impl AppConfig {
    /// 파일과 환경 변수에서 설정을 로드합니다.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        layered(Some(path.as_ref()))?.try_deserialize()
    }

    /// 파일 없이 기본값과 환경 변수만으로 설정을 로드합니다.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        layered(None)?.try_deserialize()
    }
}

/// 같은 계층에서 단일 섹션을 읽습니다.
///
/// 다른 크레이트가 소유한 설정 타입(예: 리스크 설정)을 로드할 때 사용합니다.
/// 섹션이 없으면 `T::default()`를 반환합니다.
pub fn load_section<T>(path: Option<&Path>, key: &str) -> Result<T, config::ConfigError>
where
    T: DeserializeOwned + Default,
{
    match layered(path)?.get::<T>(key) {
        Ok(value) => Ok(value),
        Err(config::ConfigError::NotFound(_)) => Ok(T::default()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_engine_defaults() {
        let engine = EngineConfig::default();

        assert_eq!(engine.tick_interval_secs, 15);
        assert_eq!(engine.phase_tolerance_secs, 30);
        assert_eq!(engine.tz().unwrap(), chrono_tz::Europe::Kyiv);

        let (start, end) = engine.entry_window().unwrap();
        assert_eq!(start, NaiveTime::from_hms_opt(8, 0, 0).unwrap());
        assert_eq!(end, NaiveTime::from_hms_opt(23, 0, 0).unwrap());
    }

    #[test]
    fn test_invalid_timezone_is_config_error() {
        let engine = EngineConfig {
            timezone: "Mars/Olympus".to_string(),
            ..Default::default()
        };
        assert!(matches!(engine.tz(), Err(TraderError::Config(_))));
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = std::env::temp_dir().join(format!("trader-cfg-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("bot.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "[engine]\ntick_interval_secs = 5\ntime_stop = \"22:30\"\n\n[exchange.retry]\nmax_attempts = 3\ninitial_delay_ms = 100\nmax_delay_ms = 400\nmultiplier = 2.0"
        )
        .unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.engine.tick_interval_secs, 5);
        assert_eq!(
            config.engine.time_stop_at().unwrap(),
            NaiveTime::from_hms_opt(22, 30, 0).unwrap()
        );
        assert_eq!(config.exchange.retry.max_attempts, 3);
        assert_eq!(config.journal.path, "logs/trading_journal.jsonl");

        std::fs::remove_dir_all(&dir).ok();
    }
}
