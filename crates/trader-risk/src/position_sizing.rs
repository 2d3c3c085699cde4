//! 포지션 크기 계산.
//!
//! 주문 수량은 세 가지 독립적인 상한의 최솟값입니다:
//! - 리스크: 자본 × (리스크 예산 ÷ 최대 동시 포지션) ÷ 손절 거리
//! - 명목가: 거래당 최대 명목가 ÷ 진입가
//! - 증거금: (자본 × 증거금 한도 − 사용 중 증거금) ÷ 배수 × 레버리지 ÷ 진입가
//!
//! 결과는 수량 단위로 내림되며, 최소 주문 수량 미만이면 주문하지 않습니다.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use trader_core::{
    AccountBalance, ActiveAsset, OrderGroup, Price, Quantity, RoundMethod, SymbolFilters,
    TradingPlan,
};

/// 사이징 입력값.
#[derive(Debug, Clone, PartialEq)]
pub struct SizingRequest {
    /// 진입가 (스톱 지정가는 지정가, 그 외 트리거 가격)
    pub entry_price: Price,
    /// 손절가
    pub stop_loss: Price,
    /// 자본 (주문 직전에 조회한 총 잔고)
    pub equity: Decimal,
    /// 이미 사용 중인 증거금
    pub margin_used: Decimal,
    /// 플랜 리스크 예산 (0.02 = 자본의 2%)
    pub risk_budget: Decimal,
    /// 최대 동시 포지션 수
    pub max_concurrent_positions: u32,
    /// 거래당 최대 명목가
    pub max_notional_per_trade: Decimal,
    /// 자본 대비 증거금 한도 비율
    pub margin_limit_pct: Decimal,
    /// 레버리지
    pub leverage: u32,
    /// 증거금 배수 (OCO 쌍이면 2, 아니면 1)
    pub margin_multiplier: Decimal,
}

impl SizingRequest {
    /// 플랜, 자산, 주문 그룹, 현재 잔고로부터 입력값을 구성합니다.
    pub fn for_group(
        plan: &TradingPlan,
        asset: &ActiveAsset,
        group: &OrderGroup,
        balance: &AccountBalance,
        margin_multiplier: Decimal,
    ) -> Self {
        let settings = &plan.global_settings;
        Self {
            entry_price: group.entry_price(),
            stop_loss: group.stop_loss,
            equity: balance.total,
            margin_used: balance.margin_in_use(),
            risk_budget: plan.risk_budget,
            max_concurrent_positions: settings.max_concurrent_positions,
            max_notional_per_trade: settings.max_notional_per_trade,
            margin_limit_pct: settings.margin_limit_pct,
            leverage: asset.leverage,
            margin_multiplier,
        }
    }
}

/// 계산된 포지션 크기와 각 상한.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSize {
    /// 리스크 기준 수량
    pub by_risk: Quantity,
    /// 명목가 기준 수량
    pub by_notional: Quantity,
    /// 증거금 기준 수량
    pub by_margin: Quantity,
    /// 최종 수량 (최솟값, 수량 단위 내림)
    pub quantity: Quantity,
}

/// 주문하지 않는 이유.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SizingRejection {
    #[error("entry price {0} is not positive")]
    InvalidEntryPrice(Price),

    #[error("stop loss {0} is not positive")]
    InvalidStopLoss(Price),

    #[error("stop distance is zero")]
    ZeroStopDistance,

    #[error("invalid sizing input: {0}")]
    InvalidInput(String),

    #[error("no margin available (remaining {remaining})")]
    NoMarginAvailable { remaining: Decimal },

    #[error("quantity {quantity} below minimum {min_qty}")]
    BelowMinimum { quantity: Quantity, min_qty: Quantity },
}

/// 포지션 크기를 계산합니다.
pub fn calculate_position_size(
    request: &SizingRequest,
    filters: &SymbolFilters,
) -> Result<PositionSize, SizingRejection> {
    let entry = request.entry_price;
    if entry <= Decimal::ZERO {
        return Err(SizingRejection::InvalidEntryPrice(entry));
    }
    if request.stop_loss <= Decimal::ZERO {
        return Err(SizingRejection::InvalidStopLoss(request.stop_loss));
    }
    let stop_distance = (entry - request.stop_loss).abs();
    if stop_distance.is_zero() {
        return Err(SizingRejection::ZeroStopDistance);
    }
    if request.max_concurrent_positions == 0 {
        return Err(SizingRejection::InvalidInput(
            "max_concurrent_positions is zero".to_string(),
        ));
    }
    if request.margin_multiplier <= Decimal::ZERO {
        return Err(SizingRejection::InvalidInput(
            "margin multiplier must be positive".to_string(),
        ));
    }

    let remaining_margin = request.equity * request.margin_limit_pct - request.margin_used;
    if remaining_margin <= Decimal::ZERO {
        return Err(SizingRejection::NoMarginAvailable {
            remaining: remaining_margin,
        });
    }

    let risk_scale = request.risk_budget / Decimal::from(request.max_concurrent_positions);
    let by_risk = request.equity * risk_scale / stop_distance;
    let by_notional = request.max_notional_per_trade / entry;
    let by_margin =
        remaining_margin / request.margin_multiplier * Decimal::from(request.leverage) / entry;

    let raw = by_risk.min(by_notional).min(by_margin);
    let quantity = filters.round_to_step(raw, RoundMethod::Floor);

    if quantity <= Decimal::ZERO || quantity < filters.min_qty {
        return Err(SizingRejection::BelowMinimum {
            quantity,
            min_qty: filters.min_qty,
        });
    }

    Ok(PositionSize {
        by_risk,
        by_notional,
        by_margin,
        quantity,
    })
}
