//! 시작 전 점검.
//!
//! 점검 순서: 거래소 연결 → 플랜 검증 → 액션 레지스트리 → 리스크 설정 →
//! 가용 증거금 비율 → 전체 증거금 예산. 하나라도 실패하면 엔진은 시작하지
//! 않습니다.

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;
use trader_core::TradingPlan;
use trader_risk::RiskManager;

use crate::error::{ExecutionError, ExecutionResult};
use crate::phases::ActionRegistry;

/// 시작 점검 결과.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StartupReport {
    /// 총 자본
    pub equity: Decimal,
    /// 가용 증거금 비율
    pub free_margin_ratio: Decimal,
    /// 플랜 전체가 요구하는 증거금
    pub required_margin: Decimal,
    /// 자본 × 증거금 한도
    pub margin_limit: Decimal,
}

/// 플랜이 요구하는 증거금 합계.
///
/// 자산마다 `거래당 최대 명목가 × 배수 ÷ 레버리지`를 더합니다. OCO 돌파 자산은
/// 양쪽 레그를 모두 예약하므로 OCO 배수를 적용합니다.
pub fn required_margin(plan: &TradingPlan, oco_multiplier: Decimal) -> Decimal {
    let max_notional = plan.global_settings.max_notional_per_trade;
    plan.active_assets
        .iter()
        .map(|asset| {
            let multiplier = if asset.is_oco_breakout() {
                oco_multiplier
            } else {
                Decimal::ONE
            };
            max_notional * multiplier / Decimal::from(asset.leverage.max(1))
        })
        .sum()
}

/// 시작 점검을 실행합니다.
pub async fn run_startup_checks(
    risk: &RiskManager,
    registry: &ActionRegistry,
) -> ExecutionResult<StartupReport> {
    risk.gateway()
        .ping()
        .await
        .map_err(ExecutionError::ExchangeUnreachable)?;

    let plan = risk.plan();
    plan.validate()?;
    registry.verify_plan(plan)?;
    risk.config()
        .validate()
        .map_err(|e| ExecutionError::Config(e.to_string()))?;

    let balance = risk.balance().await?;
    let free_margin_ratio = balance.free_margin_ratio();
    let floor = risk.config().min_free_margin_ratio;
    if free_margin_ratio < floor {
        return Err(ExecutionError::InsufficientFreeMargin {
            ratio: free_margin_ratio,
            floor,
        });
    }

    let required = required_margin(plan, risk.config().oco_margin_multiplier);
    let margin_limit = balance.total * plan.global_settings.margin_limit_pct;
    if required > margin_limit {
        return Err(ExecutionError::MarginBudgetExceeded {
            required,
            limit: margin_limit,
        });
    }

    let report = StartupReport {
        equity: balance.total,
        free_margin_ratio,
        required_margin: required,
        margin_limit,
    };
    info!(
        equity = %report.equity,
        free_margin_ratio = %report.free_margin_ratio,
        required_margin = %report.required_margin,
        margin_limit = %report.margin_limit,
        "Startup checks passed"
    );
    Ok(report)
}
