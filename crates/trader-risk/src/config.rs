//! 리스크 관리 설정.
//!
//! 포지션 사이징, 증거금 하한, 트레일링 스톱 지표, 변동성 차단기를 위한
//! 설정 구조체를 정의합니다. 설정 파일의 `[risk]` 섹션에서 로드됩니다.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// 전역 리스크 관리 설정.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskConfig {
    /// OCO 양쪽 주문의 증거금 이중 예약 배수 (기본값: 2)
    ///
    /// 거래소 규칙이 아닌 보수적 정책 상수입니다.
    #[serde(default = "default_oco_margin_multiplier")]
    pub oco_margin_multiplier: Decimal,

    /// 신규 주문 허용 최소 가용 증거금 비율 (기본값: 0.20)
    #[serde(default = "default_min_free_margin_ratio")]
    pub min_free_margin_ratio: Decimal,

    /// ATR 기간 (기본값: 14)
    #[serde(default = "default_atr_period")]
    pub atr_period: usize,

    /// ATR 계산을 위해 조회하는 캔들 수 (기본값: 100)
    #[serde(default = "default_kline_limit")]
    pub kline_limit: u32,

    /// 플랜에 ATR 캔들 간격이 없을 때 사용할 기본 간격(분) (기본값: 15)
    #[serde(default = "default_atr_window_min")]
    pub default_atr_window_min: u32,

    /// 트레일링 스톱 가격 소수점 자릿수 (기본값: 4)
    #[serde(default = "default_trailing_price_dp")]
    pub trailing_price_dp: u32,

    /// 변동성 차단기 설정
    #[serde(default)]
    pub volatility: VolatilityConfig,
}

/// 벤치마크 변동성 차단기 설정.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolatilityConfig {
    /// 보관할 최대 가격 샘플 수 (기본값: 10)
    #[serde(default = "default_max_samples")]
    pub max_samples: usize,

    /// 변동성 계산에 필요한 최소 샘플 수 (기본값: 5)
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,

    /// 샘플 간 최소 간격(초) (기본값: 60)
    #[serde(default = "default_min_sample_interval_secs")]
    pub min_sample_interval_secs: i64,

    /// 수익률 표준편차 임계값(%) (기본값: 3.0)
    #[serde(default = "default_volatility_threshold_pct")]
    pub threshold_pct: f64,
}

// 기본값 함수들
fn default_oco_margin_multiplier() -> Decimal {
    dec!(2)
}

fn default_min_free_margin_ratio() -> Decimal {
    dec!(0.20)
}

fn default_atr_period() -> usize {
    14
}

fn default_kline_limit() -> u32 {
    100
}

fn default_atr_window_min() -> u32 {
    15
}

fn default_trailing_price_dp() -> u32 {
    4
}

fn default_max_samples() -> usize {
    10
}

fn default_min_samples() -> usize {
    5
}

fn default_min_sample_interval_secs() -> i64 {
    60
}

fn default_volatility_threshold_pct() -> f64 {
    3.0
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            oco_margin_multiplier: default_oco_margin_multiplier(),
            min_free_margin_ratio: default_min_free_margin_ratio(),
            atr_period: default_atr_period(),
            kline_limit: default_kline_limit(),
            default_atr_window_min: default_atr_window_min(),
            trailing_price_dp: default_trailing_price_dp(),
            volatility: VolatilityConfig::default(),
        }
    }
}

impl Default for VolatilityConfig {
    fn default() -> Self {
        Self {
            max_samples: default_max_samples(),
            min_samples: default_min_samples(),
            min_sample_interval_secs: default_min_sample_interval_secs(),
            threshold_pct: default_volatility_threshold_pct(),
        }
    }
}

impl RiskConfig {
    /// 기본값으로 새 RiskConfig를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// OCO 배수를 설정합니다.
    pub fn with_oco_margin_multiplier(mut self, multiplier: Decimal) -> Self {
        self.oco_margin_multiplier = multiplier;
        self
    }

    /// 주문이 OCO 쌍의 일부인지에 따른 증거금 배수.
    pub fn margin_multiplier(&self, in_oco_pair: bool) -> Decimal {
        if in_oco_pair {
            self.oco_margin_multiplier
        } else {
            Decimal::ONE
        }
    }

    /// 설정 값을 검증합니다.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.oco_margin_multiplier < Decimal::ONE {
            return Err(ConfigValidationError::InvalidValue(
                "oco_margin_multiplier must be at least 1".into(),
            ));
        }

        if self.min_free_margin_ratio < Decimal::ZERO || self.min_free_margin_ratio >= Decimal::ONE {
            return Err(ConfigValidationError::InvalidValue(
                "min_free_margin_ratio must be in [0, 1)".into(),
            ));
        }

        if self.atr_period == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "atr_period must be greater than 0".into(),
            ));
        }

        if (self.kline_limit as usize) <= self.atr_period {
            return Err(ConfigValidationError::InvalidValue(
                "kline_limit must exceed atr_period".into(),
            ));
        }

        let vol = &self.volatility;
        if vol.min_samples < 2 || vol.min_samples > vol.max_samples {
            return Err(ConfigValidationError::InvalidValue(
                "volatility.min_samples must be in [2, max_samples]".into(),
            ));
        }

        if vol.threshold_pct <= 0.0 || !vol.threshold_pct.is_finite() {
            return Err(ConfigValidationError::InvalidValue(
                "volatility.threshold_pct must be greater than 0".into(),
            ));
        }

        if vol.min_sample_interval_secs < 0 {
            return Err(ConfigValidationError::InvalidValue(
                "volatility.min_sample_interval_secs must not be negative".into(),
            ));
        }

        Ok(())
    }
}

/// 설정 검증 오류.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}
