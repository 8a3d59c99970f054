//! Conversions between catalog amounts and ledger/chain units.
//!
//! Catalog prices are exact decimals. The points ledger works in whole points
//! (fractional costs are floored) and the chain works in the token's smallest
//! unit (`worth * 10^decimals`, rounded half away from zero).

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// Errors converting a catalog amount.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    /// The amount is zero or negative.
    #[error("amount must be positive: {0}")]
    NonPositive(Decimal),

    /// The amount rounds down to nothing in the target unit.
    #[error("amount is below one unit: {0}")]
    BelowOneUnit(Decimal),

    /// The amount does not fit the target integer type.
    #[error("amount out of range: {0}")]
    Overflow(Decimal),
}

/// Floor a point cost to whole points.
///
/// # Errors
///
/// Returns an error if the cost is non-positive, floors to zero, or exceeds `i64`.
pub fn floor_points(cost: Decimal) -> Result<i64, AmountError> {
    if cost <= Decimal::ZERO {
        return Err(AmountError::NonPositive(cost));
    }
    let points = cost.floor().to_i64().ok_or(AmountError::Overflow(cost))?;
    if points == 0 {
        return Err(AmountError::BelowOneUnit(cost));
    }
    Ok(points)
}

/// Convert a settlement amount to the token's smallest unit.
///
/// # Errors
///
/// Returns an error if the amount is non-positive, rounds to zero, or overflows `u64`.
pub fn to_smallest_units(amount: Decimal, decimals: u8) -> Result<u64, AmountError> {
    if amount <= Decimal::ZERO {
        return Err(AmountError::NonPositive(amount));
    }
    let scale = 10u64
        .checked_pow(u32::from(decimals))
        .ok_or(AmountError::Overflow(amount))?;
    let units = amount
        .checked_mul(Decimal::from(scale))
        .ok_or(AmountError::Overflow(amount))?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_u64()
        .ok_or(AmountError::Overflow(amount))?;
    if units == 0 {
        return Err(AmountError::BelowOneUnit(amount));
    }
    Ok(units)
}
