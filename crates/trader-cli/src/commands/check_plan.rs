//! 플랜 사전 점검 명령.
//!
//! 거래소에 연결하지 않고 플랜 파싱, 단계 시각, 액션 등록 여부, 필요 증거금을
//! 확인합니다.

use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use trader_core::{EngineConfig, TradingPlan};
use trader_execution::{required_margin, ActionRegistry, PhaseSchedule};
use trader_risk::RiskConfig;

/// 자산 요약.
#[derive(Debug, Clone, Serialize)]
pub struct AssetSummary {
    pub symbol: String,
    pub strategy: String,
    pub leverage: u32,
    /// "BUY_STOP @ 1.142" 형식의 진입 레그
    pub legs: Vec<String>,
    pub hedge: Option<String>,
}

/// 단계 요약.
#[derive(Debug, Clone, Serialize)]
pub struct PhaseSummary {
    pub name: String,
    pub at: DateTime<Utc>,
    pub action: Option<String>,
}

/// 플랜 점검 결과.
#[derive(Debug, Clone, Serialize)]
pub struct PlanReport {
    pub plan_date: String,
    pub plan_version: String,
    pub timezone: String,
    pub assets: Vec<AssetSummary>,
    pub phases: Vec<PhaseSummary>,
    pub required_margin: Decimal,
    pub margin_limit_pct: Decimal,
}

/// 이미 로드된 플랜을 점검합니다.
pub fn inspect_plan(plan: &TradingPlan, engine: &EngineConfig, risk: &RiskConfig) -> Result<PlanReport> {
    let tz = engine.tz()?;
    let schedule = PhaseSchedule::from_plan(plan, tz)?;
    ActionRegistry::new().verify_plan(plan)?;

    let assets = plan
        .active_assets
        .iter()
        .map(|asset| AssetSummary {
            symbol: asset.symbol.clone(),
            strategy: asset.strategy.clone(),
            leverage: asset.leverage,
            legs: asset
                .order_groups
                .values()
                .map(|g| format!("{} @ {}", g.order_type, g.trigger_price))
                .collect(),
            hedge: asset.hedge.as_ref().map(|h| h.symbol.clone()),
        })
        .collect();

    let phases = schedule
        .phases()
        .iter()
        .map(|p| PhaseSummary {
            name: p.name.clone(),
            at: p.at,
            action: p.action.clone(),
        })
        .collect();

    Ok(PlanReport {
        plan_date: plan.plan_date.clone(),
        plan_version: plan.plan_version.clone(),
        timezone: engine.timezone.clone(),
        assets,
        phases,
        required_margin: required_margin(plan, risk.oco_margin_multiplier),
        margin_limit_pct: plan.global_settings.margin_limit_pct,
    })
}

/// 파일에서 플랜을 로드해 점검합니다.
pub fn check_plan(plan_path: &Path, engine: &EngineConfig, risk: &RiskConfig) -> Result<PlanReport> {
    let plan = TradingPlan::load(plan_path)
        .with_context(|| format!("Failed to load plan {}", plan_path.display()))?;
    inspect_plan(&plan, engine, risk)
}

impl PlanReport {
    /// 터미널 출력용 텍스트.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Plan {} (v{}), timezone {}", self.plan_date, self.plan_version, self.timezone);

        let _ = writeln!(out, "\nAssets:");
        for asset in &self.assets {
            let _ = writeln!(
                out,
                "  {} [{} x{}] {}",
                asset.symbol,
                asset.strategy,
                asset.leverage,
                asset.legs.join(" / ")
            );
            if let Some(hedge) = &asset.hedge {
                let _ = writeln!(out, "    hedge: {}", hedge);
            }
        }

        let _ = writeln!(out, "\nPhases (UTC):");
        for phase in &self.phases {
            let _ = writeln!(
                out,
                "  {} {} -> {}",
                phase.at.format("%Y-%m-%d %H:%M"),
                phase.name,
                phase.action.as_deref().unwrap_or("(no action)")
            );
        }

        let _ = writeln!(
            out,
            "\nRequired margin: {} (must stay within {}% of equity)",
            self.required_margin.round_dp(2),
            (self.margin_limit_pct * Decimal::ONE_HUNDRED).normalize()
        );
        out
    }

    /// 다른 도구에서 읽을 수 있는 JSON 출력.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize plan report")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const SAMPLE: &str = include_str!("../../../../plans/sample_plan.json");

    #[test]
    fn test_sample_plan_inspects_cleanly() {
        let plan = TradingPlan::from_json_str(SAMPLE).unwrap();
        let report = inspect_plan(&plan, &EngineConfig::default(), &RiskConfig::default()).unwrap();

        assert_eq!(report.assets.len(), 1);
        assert_eq!(report.assets[0].symbol, "LDOUSDT");
        assert_eq!(report.assets[0].legs.len(), 2);
        assert_eq!(report.assets[0].hedge.as_deref(), Some("BTCUSDT"));

        // 25 × 2 ÷ 10
        assert_eq!(report.required_margin, dec!(5));

        let setup = report.phases.iter().find(|p| p.name == "setup_orders").unwrap();
        // 13:00 Kyiv (UTC+3)
        assert_eq!(setup.at.format("%H:%M").to_string(), "10:00");

        let text = report.render();
        assert!(text.contains("LDOUSDT [oco_breakout x10]"));
        assert!(text.contains("setup_orders -> place_all_orders"));
    }

    #[test]
    fn test_report_as_json() {
        let plan = TradingPlan::from_json_str(SAMPLE).unwrap();
        let report = inspect_plan(&plan, &EngineConfig::default(), &RiskConfig::default()).unwrap();

        let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(value["assets"][0]["symbol"], "LDOUSDT");
        assert_eq!(value["timezone"], "Europe/Kyiv");
        assert_eq!(value["phases"].as_array().unwrap().len(), report.phases.len());
        let margin: Decimal = serde_json::from_value(value["required_margin"].clone()).unwrap();
        assert_eq!(margin, dec!(5));
    }

    #[test]
    fn test_unknown_action_rejected() {
        let json = SAMPLE.replace("\"cancel_all_untriggered\"", "\"teleport\"");
        let plan = TradingPlan::from_json_str(&json).unwrap();
        let err = inspect_plan(&plan, &EngineConfig::default(), &RiskConfig::default()).unwrap_err();
        assert!(err.to_string().contains("teleport"));
    }
}
