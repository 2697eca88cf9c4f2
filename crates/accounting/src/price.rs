// accounting/src/price.rs

use crate::{AccountingError, AccountingResult};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use staking_core::{Amount, Shares};
use std::str::FromStr;

/// Pooled value per share, fixed-point with `Amount::price_denominator()` as one
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SharePrice(Amount);

impl SharePrice {
    /// Price of an empty pool: one unit of value per share
    pub fn initial() -> Self {
        Self(Amount::price_denominator())
    }

    /// `total_pooled * DENOMINATOR / supply`, or the initial price without supply
    pub fn compute(total_pooled: &Amount, supply: &Shares) -> Self {
        match total_pooled.mul_div(&Amount::price_denominator(), supply) {
            Some(price) => Self(price),
            None => Self::initial(),
        }
    }

    pub fn as_amount(&self) -> &Amount {
        &self.0
    }

    /// Human-readable price; `None` if it exceeds decimal range
    pub fn to_decimal(&self) -> Option<Decimal> {
        Decimal::from_str(&self.0.format_tokens()).ok()
    }
}

impl std::fmt::Display for SharePrice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format_tokens())
    }
}

/// Shares worth `value` at the price implied by `total_pooled / supply`, rounding down
///
/// The first deposit into a pool without shares mints one share per unit.
pub fn shares_for_value(value: &Amount, supply: &Shares, total_pooled: &Amount) -> AccountingResult<Shares> {
    if supply.is_zero() {
        return Ok(value.clone());
    }
    value.mul_div(supply, total_pooled)
        .ok_or_else(|| AccountingError::ZeroSharePrice { supply: supply.clone() })
}

/// Value redeemable for `shares`, rounding down
pub fn value_of_shares(shares: &Shares, supply: &Shares, total_pooled: &Amount) -> Amount {
    shares.mul_div(total_pooled, supply).unwrap_or_else(Amount::zero)
}
