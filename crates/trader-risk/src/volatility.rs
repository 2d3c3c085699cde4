//! 변동성 차단기와 급락 감지.
//!
//! - [`VolatilityMonitor`]: 벤치마크 가격의 최근 샘플로 수익률 표준편차를 계산하고,
//!   임계값을 넘으면 한 번 발동한 뒤 다시 임계값 아래로 내려올 때까지 잠깁니다.
//! - [`FlashDropDetector`]: 심볼별 직전 샘플 대비 하락률을 계산합니다.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use tracing::debug;
use trader_core::{DecimalExt, Price};

use crate::config::VolatilityConfig;

/// 변동성 점검 결과.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VolatilityCheck {
    /// 샘플 부족
    Insufficient { samples: usize },
    /// 임계값 이하
    Calm { volatility_pct: f64 },
    /// 임계값 초과, 이번에 발동
    Triggered { volatility_pct: f64 },
    /// 임계값 초과, 이미 발동한 상태
    Latched { volatility_pct: f64 },
}

/// 벤치마크 변동성 차단기.
#[derive(Debug, Clone)]
pub struct VolatilityMonitor {
    config: VolatilityConfig,
    samples: VecDeque<(DateTime<Utc>, Price)>,
    latched: bool,
}

impl VolatilityMonitor {
    pub fn new(config: VolatilityConfig) -> Self {
        Self {
            samples: VecDeque::with_capacity(config.max_samples),
            config,
            latched: false,
        }
    }

    /// 샘플을 기록합니다. 직전 샘플과의 간격이 최소 간격보다 짧으면 무시합니다.
    pub fn record(&mut self, at: DateTime<Utc>, price: Price) -> bool {
        if let Some((last_at, _)) = self.samples.back() {
            if at - *last_at < Duration::seconds(self.config.min_sample_interval_secs) {
                return false;
            }
        }

        self.samples.push_back((at, price));
        while self.samples.len() > self.config.max_samples {
            self.samples.pop_front();
        }
        true
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn is_latched(&self) -> bool {
        self.latched
    }

    /// 연속 수익률(%)의 모표준편차. 샘플이 최소 개수 미만이면 `None`.
    pub fn volatility_pct(&self) -> Option<f64> {
        if self.samples.len() < self.config.min_samples {
            return None;
        }

        let prices: Vec<Price> = self.samples.iter().map(|(_, p)| *p).collect();
        let returns: Vec<f64> = prices
            .windows(2)
            .filter_map(|w| w[1].pct_change_from(w[0]))
            .filter_map(|r| r.to_f64())
            .collect();

        population_std_dev(&returns)
    }

    /// 샘플을 기록하고 차단기 상태를 갱신합니다.
    pub fn check(&mut self, at: DateTime<Utc>, price: Price) -> VolatilityCheck {
        self.record(at, price);

        let Some(volatility_pct) = self.volatility_pct() else {
            return VolatilityCheck::Insufficient {
                samples: self.samples.len(),
            };
        };

        if volatility_pct > self.config.threshold_pct {
            if self.latched {
                VolatilityCheck::Latched { volatility_pct }
            } else {
                self.latched = true;
                VolatilityCheck::Triggered { volatility_pct }
            }
        } else {
            if self.latched {
                debug!(volatility_pct, "Volatility back under threshold, breaker re-armed");
            }
            self.latched = false;
            VolatilityCheck::Calm { volatility_pct }
        }
    }
}

/// 모표준편차. 값이 없으면 `None`.
pub fn population_std_dev(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some(variance.sqrt())
}

/// 심볼별 급락 감지기.
#[derive(Debug, Clone, Default)]
pub struct FlashDropDetector {
    last_prices: HashMap<String, Price>,
}

impl FlashDropDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// 새 가격을 기록하고 직전 샘플 대비 하락률(%)을 반환합니다.
    ///
    /// 첫 샘플이면 `None`. 상승은 음수 하락률로 반환됩니다.
    pub fn observe(&mut self, symbol: &str, price: Price) -> Option<Decimal> {
        let last = self.last_prices.insert(symbol.to_string(), price)?;
        if last.is_zero() {
            return None;
        }
        Some((last - price) / last * Decimal::ONE_HUNDRED)
    }

    /// 가격을 기록하고 하락률이 임계값(%) 이상이면 하락률을 반환합니다.
    pub fn check(&mut self, symbol: &str, price: Price, threshold_pct: Decimal) -> Option<Decimal> {
        self.observe(symbol, price)
            .filter(|drop_pct| *drop_pct >= threshold_pct)
    }
}
