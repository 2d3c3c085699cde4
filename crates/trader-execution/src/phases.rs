//! 단계 스케줄러와 액션 레지스트리.
//!
//! 각 단계의 현지 시각은 플랜 날짜와 설정된 시간대로 한 번만 UTC 시각으로
//! 변환됩니다. 현재 시각이 허용 오차(±tolerance) 안에 들어오고 아직 실행하지
//! 않은 단계만 실행 대상이 됩니다.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use trader_core::{PlanError, TradingPlan};

use crate::error::{ExecutionError, ExecutionResult};

/// 등록된 단계 액션.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhaseAction {
    /// OCO 돌파 자산의 조건부 주문 배치
    PlaceAllOrders,
    /// 체결되지 않은 진입 주문 취소
    CancelAllUntriggered,
    /// 장 마감 요약과 체크리스트 보고
    EndOfDayChecklist,
    /// 모든 포지션 청산
    CloseAllPositions,
}

impl fmt::Display for PhaseAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PhaseAction::PlaceAllOrders => "place_all_orders",
            PhaseAction::CancelAllUntriggered => "cancel_all_untriggered",
            PhaseAction::EndOfDayChecklist => "end_of_day_checklist",
            PhaseAction::CloseAllPositions => "close_all_positions",
        };
        write!(f, "{}", name)
    }
}

/// 등록되지 않은 액션 이름.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown action '{0}'")]
pub struct UnknownAction(pub String);

/// 액션 이름 → 핸들러 매핑. 생성 시점에 고정됩니다.
#[derive(Debug, Clone)]
pub struct ActionRegistry {
    actions: BTreeMap<String, PhaseAction>,
}

impl Default for ActionRegistry {
    fn default() -> Self {
        let actions = [
            ("place_all_orders", PhaseAction::PlaceAllOrders),
            ("place_conditional_orders", PhaseAction::PlaceAllOrders),
            ("cancel_all_untriggered", PhaseAction::CancelAllUntriggered),
            ("end_of_day_checklist", PhaseAction::EndOfDayChecklist),
            ("close_all_positions", PhaseAction::CloseAllPositions),
        ]
        .into_iter()
        .map(|(name, action)| (name.to_string(), action))
        .collect();

        Self { actions }
    }
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(&self, name: &str) -> Result<PhaseAction, UnknownAction> {
        self.actions
            .get(name.trim())
            .copied()
            .ok_or_else(|| UnknownAction(name.to_string()))
    }

    /// 플랜의 모든 단계 액션이 등록되어 있는지 확인합니다.
    ///
    /// 액션이 없는 단계는 여기서 거부하지 않습니다 (실행 시 보고).
    pub fn verify_plan(&self, plan: &TradingPlan) -> ExecutionResult<()> {
        for (phase, spec) in &plan.trade_phases {
            if let Some(action) = &spec.action {
                self.resolve(action).map_err(|_| ExecutionError::UnknownAction {
                    phase: phase.clone(),
                    action: action.clone(),
                })?;
            }
        }
        Ok(())
    }

    pub fn names(&self) -> Vec<&str> {
        self.actions.keys().map(String::as_str).collect()
    }
}

/// UTC 시각이 확정된 단계.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledPhase {
    pub name: String,
    pub at: DateTime<Utc>,
    pub action: Option<String>,
}

/// 플랜 단계 스케줄.
#[derive(Debug, Clone, Default)]
pub struct PhaseSchedule {
    phases: Vec<ScheduledPhase>,
}

impl PhaseSchedule {
    /// 플랜 날짜의 현지 시각을 UTC로 변환해 스케줄을 만듭니다.
    ///
    /// 시각이 없는 단계는 스케줄에 포함되지 않습니다.
    pub fn from_plan(plan: &TradingPlan, tz: Tz) -> ExecutionResult<Self> {
        let date = plan.date()?;
        let mut phases = Vec::new();

        for (name, phase) in &plan.trade_phases {
            let Some(time) = phase.local_time(name)? else {
                continue;
            };
            let at = local_to_utc(tz, date, time).ok_or_else(|| {
                ExecutionError::Plan(PlanError::InvalidPhaseTime {
                    phase: name.clone(),
                    value: format!("{} does not exist in {}", time, tz),
                })
            })?;
            phases.push(ScheduledPhase {
                name: name.clone(),
                at,
                action: phase.action.clone(),
            });
        }

        phases.sort_by_key(|p| p.at);
        Ok(Self { phases })
    }

    pub fn phases(&self) -> &[ScheduledPhase] {
        &self.phases
    }

    /// 실행 시점이 된 미실행 단계.
    pub fn due<'a>(
        &'a self,
        now: DateTime<Utc>,
        tolerance: Duration,
        executed: &'a HashSet<String>,
    ) -> impl Iterator<Item = &'a ScheduledPhase> + 'a {
        self.phases.iter().filter(move |p| {
            !executed.contains(&p.name)
                && (now - p.at).num_milliseconds().abs() <= tolerance.num_milliseconds()
        })
    }
}

/// 현지 날짜/시각을 UTC로 변환합니다. 서머타임 중복 시각은 이른 쪽을 사용합니다.
pub fn local_to_utc(tz: Tz, date: NaiveDate, time: chrono::NaiveTime) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(&date.and_time(time))
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}
