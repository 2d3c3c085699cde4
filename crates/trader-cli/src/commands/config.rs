//! 유효 설정 출력 명령.
//!
//! 기본값, 설정 파일, `TRADER__*` 환경 변수를 합친 최종 설정을 TOML로 보여줍니다.
//! 비밀 값(API 키, 봇 토큰)은 설정 구조체에 없으므로 출력되지 않습니다.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use trader_core::{
    AppConfig, EngineConfig, ExchangeConfig, JournalConfig, LoggingConfig, NotificationConfig,
};
use trader_risk::RiskConfig;

use super::run::{load_app_config, load_risk_config};

/// 설정 파일과 같은 섹션 구조.
#[derive(Debug, Serialize)]
struct EffectiveConfig<'a> {
    logging: &'a LoggingConfig,
    engine: &'a EngineConfig,
    exchange: &'a ExchangeConfig,
    journal: &'a JournalConfig,
    notifications: &'a NotificationConfig,
    risk: &'a RiskConfig,
}

/// 설정을 TOML 문자열로 만듭니다.
pub fn render_config(app: &AppConfig, risk: &RiskConfig) -> Result<String> {
    let effective = EffectiveConfig {
        logging: &app.logging,
        engine: &app.engine,
        exchange: &app.exchange,
        journal: &app.journal,
        notifications: &app.notifications,
        risk,
    };
    toml::to_string_pretty(&effective).context("Failed to serialize config")
}

/// 설정을 로드해 TOML로 반환합니다.
pub fn show_config(path: Option<&Path>) -> Result<String> {
    let app = load_app_config(path)?;
    let risk = load_risk_config(path)?;
    app.engine.tz()?;
    risk.validate()?;
    render_config(&app, &risk)
}
