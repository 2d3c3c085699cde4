//! 트레이딩 플랜 모델.
//!
//! 플랜은 외부에서 미리 계산된 JSON 문서로 공급되며, 실행 중에는 변경되지 않습니다.
//! 진입/청산 가격은 플랜에 확정된 값으로 들어오고, 엔진은 이를 그대로 집행합니다.
//!
//! 로드 흐름: JSON 파싱(스키마) → [`TradingPlan::validate`](의미 검증).

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::domain::Side;
use crate::error::PlanError;

/// OCO 돌파 전략 태그.
pub const OCO_BREAKOUT: &str = "oco_breakout";

/// `HH:MM` 형식의 시각을 파싱합니다.
pub fn parse_hhmm(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").ok()
}

/// 전체 트레이딩 플랜.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingPlan {
    /// 플랜 날짜 (YYYY-MM-DD)
    pub plan_date: String,
    /// 플랜 버전
    pub plan_version: String,
    /// 플랜 유형
    pub plan_type: String,
    /// 전체 리스크 예산 (자본 대비 비율)
    pub risk_budget: Decimal,
    /// 포트폴리오 전역 설정
    pub global_settings: GlobalSettings,
    /// 거래 대상 자산
    pub active_assets: Vec<ActiveAsset>,
    /// 시간대별 단계 (이름 → 단계)
    pub trade_phases: BTreeMap<String, TradePhase>,
    /// 전역 리스크 트리거 (이름 → 트리거)
    #[serde(default)]
    pub risk_triggers: BTreeMap<String, RiskTrigger>,
    /// 장 마감 체크리스트
    #[serde(default)]
    pub end_of_day_checklist: Vec<String>,
}

/// 포트폴리오 전역 리스크 설정.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalSettings {
    /// 최대 포트폴리오 리스크
    pub max_portfolio_risk: Decimal,
    /// 일일 긴급 손절 비율 (-0.03 = -3%)
    pub emergency_stop_loss: Decimal,
    /// 일일 수익 목표
    pub daily_profit_target: Decimal,
    /// 동시 보유 가능한 최대 포지션 수
    pub max_concurrent_positions: u32,
    /// 거래당 최대 명목가 (증거금 자산 기준)
    #[serde(default = "default_max_notional")]
    pub max_notional_per_trade: Decimal,
    /// 자본 대비 증거금 사용 한도
    #[serde(default = "default_margin_limit")]
    pub margin_limit_pct: Decimal,
}

fn default_max_notional() -> Decimal {
    dec!(25)
}

fn default_margin_limit() -> Decimal {
    dec!(0.40)
}

impl GlobalSettings {
    /// 긴급 손절 비율을 정규화합니다.
    ///
    /// 절대값이 1을 넘는 값은 퍼센트로 간주합니다 (-8.0 → -0.08).
    pub fn emergency_stop_ratio(&self) -> Decimal {
        if self.emergency_stop_loss.abs() > Decimal::ONE {
            self.emergency_stop_loss / Decimal::ONE_HUNDRED
        } else {
            self.emergency_stop_loss
        }
    }
}

/// 거래 대상 자산과 전략.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveAsset {
    /// 심볼
    pub symbol: String,
    /// 자산 유형 (예: "futures")
    pub asset_type: String,
    /// 레버리지
    pub leverage: u32,
    /// 전략 태그 (예: "oco_breakout")
    pub strategy: String,
    /// 포지션 비중
    pub position_size_pct: Decimal,
    /// 주문 그룹 ("bullish" / "bearish")
    pub order_groups: BTreeMap<String, OrderGroup>,
    /// 동적 관리 (트레일링 스톱)
    #[serde(default)]
    pub dynamic_management: Option<DynamicManagement>,
    /// 헤지 설정
    #[serde(default)]
    pub hedge: Option<HedgeSpec>,
    /// 모니터링 규칙 (이름 → 규칙)
    #[serde(default)]
    pub monitoring_rules: Option<BTreeMap<String, MonitoringRule>>,
}

impl ActiveAsset {
    /// 상승 돌파 그룹.
    pub fn bullish(&self) -> Option<&OrderGroup> {
        self.order_groups.get("bullish")
    }

    /// 하락 돌파 그룹.
    pub fn bearish(&self) -> Option<&OrderGroup> {
        self.order_groups.get("bearish")
    }

    /// 포지션 방향에 해당하는 그룹 (매수 → bullish, 매도 → bearish).
    pub fn group_for(&self, side: Side) -> Option<&OrderGroup> {
        match side {
            Side::Buy => self.bullish(),
            Side::Sell => self.bearish(),
        }
    }

    /// OCO 돌파 전략인지 확인합니다.
    pub fn is_oco_breakout(&self) -> bool {
        self.strategy == OCO_BREAKOUT
    }

    /// 이름으로 모니터링 규칙을 조회합니다.
    pub fn monitoring_rule(&self, name: &str) -> Option<&MonitoringRule> {
        self.monitoring_rules.as_ref().and_then(|rules| rules.get(name))
    }
}

/// 조건부 주문 그룹.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderGroup {
    /// 주문 유형 문자열 (`LIMIT` 포함 시 스톱 지정가)
    pub order_type: String,
    /// 트리거 가격
    pub trigger_price: Decimal,
    /// 지정가 (스톱 지정가 전용)
    #[serde(default)]
    pub limit_price: Option<Decimal>,
    /// 손절 가격
    pub stop_loss: Decimal,
    /// 익절 가격 목록
    #[serde(default)]
    pub take_profit: Vec<Decimal>,
    /// 유효 시작 시각
    pub time_valid_from: DateTime<FixedOffset>,
    /// 유효 종료 시각
    pub time_valid_to: DateTime<FixedOffset>,
}

impl OrderGroup {
    /// 스톱 지정가 그룹인지 확인합니다.
    pub fn is_stop_limit(&self) -> bool {
        self.order_type.to_ascii_uppercase().contains("LIMIT")
    }

    /// 진입 가격: 스톱 지정가면 지정가, 아니면 트리거 가격.
    pub fn entry_price(&self) -> Decimal {
        match (self.is_stop_limit(), self.limit_price) {
            (true, Some(limit)) => limit,
            _ => self.trigger_price,
        }
    }

    /// 손절까지의 거리.
    pub fn stop_distance(&self) -> Decimal {
        (self.entry_price() - self.stop_loss).abs()
    }

    /// 주어진 시각이 유효 구간 [from, to] 안에 있는지 확인합니다.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        let now = now.fixed_offset();
        self.time_valid_from <= now && now <= self.time_valid_to
    }
}

/// 트레일링 스톱 설정.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicManagement {
    /// ATR 배수
    #[serde(default)]
    pub trailing_sl_atr_multiple: Option<Decimal>,
    /// ATR 캔들 간격 (분)
    #[serde(default)]
    pub atr_window_min: Option<u32>,
    /// 활성화 수익 기준 (가격 단위)
    #[serde(default)]
    pub activate_after_profit: Option<Decimal>,
}

/// 헤지 설정.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HedgeSpec {
    /// 헤지 심볼
    pub symbol: String,
    /// 방향 메모 (실제 방향은 주 포지션의 반대)
    #[serde(default)]
    pub direction: String,
    /// 주 포지션 명목가 대비 비율
    pub size_pct: Decimal,
    /// 목표 델타
    #[serde(default)]
    pub delta: Decimal,
}

/// 시장 데이터 모니터링 규칙.
///
/// 알 수 없는 키는 무시됩니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringRule {
    #[serde(default)]
    pub threshold: Option<Decimal>,
    #[serde(default)]
    pub threshold_pct: Option<Decimal>,
    #[serde(default)]
    pub threshold_points: Option<Decimal>,
    pub action: String,
    #[serde(default)]
    pub window_min: Option<u32>,
    #[serde(default)]
    pub source: Option<String>,
}

impl MonitoringRule {
    /// 적용할 임계값 (`threshold` 우선, 없으면 `threshold_pct`, 둘 다 없으면 0).
    pub fn effective_threshold(&self) -> Decimal {
        self.threshold
            .or(self.threshold_pct)
            .unwrap_or(Decimal::ZERO)
    }
}

/// 시간대별 단계.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradePhase {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub description: String,
}

impl TradePhase {
    /// 발동 시각 문자열 (`time`, 없으면 `start_time`).
    pub fn scheduled(&self) -> Option<&str> {
        self.time.as_deref().or(self.start_time.as_deref())
    }

    /// 발동 시각 (현지). 시각이 없으면 `Ok(None)`.
    pub fn local_time(&self, phase: &str) -> Result<Option<NaiveTime>, PlanError> {
        match self.scheduled() {
            None => Ok(None),
            Some(value) => parse_hhmm(value)
                .map(Some)
                .ok_or_else(|| PlanError::InvalidPhaseTime {
                    phase: phase.to_string(),
                    value: value.to_string(),
                }),
        }
    }
}

/// 전역 리스크 트리거.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskTrigger {
    /// 급락 임계값 (퍼센트)
    #[serde(default)]
    pub threshold_pct: Option<Decimal>,
    /// 발동 시 실행할 리스크 액션
    pub action: String,
    /// 감시 심볼
    #[serde(default)]
    pub assets: Option<Vec<String>>,
    /// 뉴스 키워드 (엔진 범위 밖)
    #[serde(default)]
    pub keyword: Option<Vec<String>>,
}

impl RiskTrigger {
    /// 가격 급락 트리거인지 확인합니다 (임계값과 감시 심볼이 모두 있음).
    pub fn is_price_drop(&self) -> bool {
        self.threshold_pct.is_some() && self.assets.as_ref().is_some_and(|a| !a.is_empty())
    }
}

impl TradingPlan {
    /// 파일에서 플랜을 읽고 검증합니다.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, PlanError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| PlanError::Unreadable(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&content)
    }

    /// JSON 문자열에서 플랜을 파싱하고 검증합니다.
    pub fn from_json_str(json: &str) -> Result<Self, PlanError> {
        let plan: TradingPlan =
            serde_json::from_str(json).map_err(|e| PlanError::Parse(e.to_string()))?;
        plan.validate()?;
        Ok(plan)
    }

    /// 플랜 날짜.
    pub fn date(&self) -> Result<NaiveDate, PlanError> {
        NaiveDate::parse_from_str(&self.plan_date, "%Y-%m-%d")
            .map_err(|_| PlanError::InvalidDate(self.plan_date.clone()))
    }

    /// 심볼로 자산을 조회합니다.
    pub fn asset(&self, symbol: &str) -> Option<&ActiveAsset> {
        self.active_assets.iter().find(|a| a.symbol == symbol)
    }

    /// 어떤 자산의 헤지 심볼인지 확인합니다.
    pub fn is_hedge_symbol(&self, symbol: &str) -> bool {
        self.active_assets
            .iter()
            .filter_map(|a| a.hedge.as_ref())
            .any(|h| h.symbol == symbol)
    }

    /// 주 자산 심볼 목록.
    pub fn symbols(&self) -> Vec<String> {
        self.active_assets.iter().map(|a| a.symbol.clone()).collect()
    }

    /// 가격 급락 트리거만 반환합니다.
    pub fn price_drop_triggers(&self) -> impl Iterator<Item = (&String, &RiskTrigger)> {
        self.risk_triggers.iter().filter(|(_, t)| t.is_price_drop())
    }

    /// 의미 검증.
    pub fn validate(&self) -> Result<(), PlanError> {
        self.date()?;

        if self.risk_budget <= Decimal::ZERO || self.risk_budget > Decimal::ONE {
            return Err(PlanError::out_of_range("risk_budget", "must be in (0, 1]"));
        }

        let gs = &self.global_settings;
        if gs.margin_limit_pct <= Decimal::ZERO || gs.margin_limit_pct > Decimal::ONE {
            return Err(PlanError::out_of_range(
                "global_settings.margin_limit_pct",
                "must be in (0, 1]",
            ));
        }
        if gs.max_concurrent_positions == 0 {
            return Err(PlanError::out_of_range(
                "global_settings.max_concurrent_positions",
                "must be at least 1",
            ));
        }
        if gs.max_notional_per_trade <= Decimal::ZERO {
            return Err(PlanError::out_of_range(
                "global_settings.max_notional_per_trade",
                "must be positive",
            ));
        }

        for asset in &self.active_assets {
            if asset.leverage == 0 {
                return Err(PlanError::out_of_range(
                    format!("{}.leverage", asset.symbol),
                    "must be at least 1",
                ));
            }
            for (name, group) in &asset.order_groups {
                validate_group(&asset.symbol, name, group)?;
            }
            if let Some(hedge) = &asset.hedge {
                if hedge.size_pct <= Decimal::ZERO {
                    return Err(PlanError::out_of_range(
                        format!("{}.hedge.size_pct", asset.symbol),
                        "must be positive",
                    ));
                }
            }
        }

        for (name, phase) in &self.trade_phases {
            phase.local_time(name)?;
        }

        Ok(())
    }
}

fn validate_group(symbol: &str, name: &str, group: &OrderGroup) -> Result<(), PlanError> {
    let invalid = |reason: &str| PlanError::InvalidOrderGroup {
        symbol: symbol.to_string(),
        group: name.to_string(),
        reason: reason.to_string(),
    };

    if group.trigger_price <= Decimal::ZERO {
        return Err(invalid("trigger_price must be positive"));
    }
    if group.stop_loss <= Decimal::ZERO {
        return Err(invalid("stop_loss must be positive"));
    }
    if group.is_stop_limit() {
        match group.limit_price {
            Some(limit) if limit > Decimal::ZERO => {}
            Some(_) => return Err(invalid("limit_price must be positive")),
            None => return Err(invalid("stop-limit group requires limit_price")),
        }
    }
    if group.time_valid_from >= group.time_valid_to {
        return Err(invalid("time_valid_from must be before time_valid_to"));
    }
    Ok(())
}
