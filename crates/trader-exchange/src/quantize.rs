//! 주문 가격/수량 정규화.
//!
//! 거래소 필터(호가 단위, 수량 단위, 최소 명목가)에 맞게 주문을 보정합니다.
//! 가격과 수량은 항상 내림하며, 최소 명목가 미달 시에만 제한된 범위에서 수량을 늘립니다.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::warn;
use trader_core::{
    DecimalExt, NormalizationSettings, OrderRequest, OrderType, Price, Quantity, RoundMethod,
    Side, SymbolFilters, TickSizeProvider,
};

use crate::{ExchangeError, ExchangeResult};

/// 최소 명목가 보정 정책.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizationPolicy {
    /// 최소 명목가 대비 안전 여유 (0.01 = 1%)
    pub safety_margin: Decimal,
    /// 원래 수량 대비 허용 최대 배수
    pub max_quantity_multiplier: Decimal,
}

impl Default for NormalizationPolicy {
    fn default() -> Self {
        Self {
            safety_margin: dec!(0.01),
            max_quantity_multiplier: dec!(5),
        }
    }
}

impl From<&NormalizationSettings> for NormalizationPolicy {
    fn from(settings: &NormalizationSettings) -> Self {
        Self {
            safety_margin: settings.notional_safety_margin,
            max_quantity_multiplier: settings.max_quantity_multiplier,
        }
    }
}

/// 가격을 호가 단위로 내림합니다.
pub fn round_price(filters: &SymbolFilters, price: Price) -> Price {
    filters.round_to_tick(price, RoundMethod::Floor)
}

/// 수량을 수량 단위로 내림합니다.
pub fn round_quantity(filters: &SymbolFilters, quantity: Quantity) -> Quantity {
    filters.round_to_step(quantity, RoundMethod::Floor)
}

/// 스톱 지정가 주문의 가격 관계를 검증합니다.
///
/// 매수는 지정가 > 트리거, 매도는 지정가 < 트리거여야 합니다.
pub fn validate_stop_order(request: &OrderRequest) -> ExchangeResult<()> {
    if request.order_type.is_stop() && request.stop_price.is_none() {
        return Err(ExchangeError::InvalidOrder(format!(
            "{} {} requires a stop price",
            request.side, request.order_type
        )));
    }

    if request.order_type != OrderType::StopLimit {
        return Ok(());
    }

    let (Some(stop), Some(limit)) = (request.stop_price, request.price) else {
        return Err(ExchangeError::InvalidOrder(format!(
            "{} STOP-LIMIT requires both stop and limit price",
            request.side
        )));
    };

    match request.side {
        Side::Buy if limit <= stop => Err(ExchangeError::InvalidOrder(format!(
            "BUY STOP-LIMIT: price ({}) must be > stopPrice ({})",
            limit, stop
        ))),
        Side::Sell if limit >= stop => Err(ExchangeError::InvalidOrder(format!(
            "SELL STOP-LIMIT: price ({}) must be < stopPrice ({})",
            limit, stop
        ))),
        _ => Ok(()),
    }
}

/// 주문을 필터에 맞게 정규화합니다.
///
/// `reference_price`는 명목가 계산에 사용할 가격입니다 (시장가 주문은 현재가).
/// 최소 명목가 보정은 포지션 감소 전용 주문에는 적용하지 않습니다.
pub fn normalize_order(
    request: &OrderRequest,
    filters: &SymbolFilters,
    reference_price: Price,
    policy: &NormalizationPolicy,
) -> ExchangeResult<OrderRequest> {
    let mut normalized = request.clone();
    normalized.price = request.price.map(|p| round_price(filters, p));
    normalized.stop_price = request.stop_price.map(|p| round_price(filters, p));

    let mut quantity = round_quantity(filters, request.quantity);
    if quantity <= Decimal::ZERO {
        return Err(ExchangeError::InvalidQuantity(format!(
            "{}: quantity {} rounds to zero (step {})",
            request.symbol, request.quantity, filters.step_size
        )));
    }

    if !request.reduce_only {
        if quantity < filters.min_qty {
            return Err(ExchangeError::InvalidQuantity(format!(
                "{}: quantity {} below minimum {}",
                request.symbol, quantity, filters.min_qty
            )));
        }

        let price = round_price(filters, reference_price);
        if price <= Decimal::ZERO {
            return Err(ExchangeError::InvalidOrder(format!(
                "{}: reference price {} is not positive",
                request.symbol, reference_price
            )));
        }

        if quantity * price < filters.min_notional {
            let target = filters.min_notional * (Decimal::ONE + policy.safety_margin) / price;
            let bumped = target.ceil_to_step(filters.step_size).max(filters.min_qty);
            let cap = request.quantity * policy.max_quantity_multiplier;

            if bumped > cap {
                return Err(ExchangeError::InvalidQuantity(format!(
                    "{}: notional {} below minimum {}; required quantity {} exceeds {}x cap {}",
                    request.symbol,
                    quantity * price,
                    filters.min_notional,
                    bumped,
                    policy.max_quantity_multiplier,
                    cap
                )));
            }

            warn!(
                symbol = %request.symbol,
                from = %quantity,
                to = %bumped,
                min_notional = %filters.min_notional,
                "Quantity raised to meet minimum notional"
            );
            quantity = bumped;
        }
    }

    normalized.quantity = quantity.normalize();
    validate_stop_order(&normalized)?;
    Ok(normalized)
}
