// staking-core/src/types.rs

use crate::{CoreError, CoreResult};
use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};
use serde::{Deserialize, Serialize};
use std::ops::{Add, Sub};

/// Unix timestamp in seconds
pub type Timestamp = u64;

/// Accounting round counter
pub type Nonce = u64;

/// Remote-network epoch number
pub type Epoch = u64;

/// Basis points (1/100th of a percent)
pub type BasisPoints = u16;

/// Denominator for basis-point arithmetic
pub const MAX_BPS: BasisPoints = 10_000;

/// Base units per whole token (10^18, as on the remote network's execution layer)
pub const UNITS_PER_TOKEN: u64 = 1_000_000_000_000_000_000;

/// Base units per gwei
pub const UNITS_PER_GWEI: u64 = 1_000_000_000;

/// Whole tokens committed per validator
pub const DEPOSIT_SIZE_TOKENS: u64 = 32;

/// Amount in base units (using BigUint for arbitrary precision)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Amount(BigUint);

impl Amount {
    pub fn new(value: BigUint) -> Self {
        Self(value)
    }

    pub fn zero() -> Self {
        Self(BigUint::zero())
    }

    pub fn from_u64(value: u64) -> Self {
        Self(BigUint::from(value))
    }

    pub fn from_u128(value: u128) -> Self {
        Self(BigUint::from(value))
    }

    pub fn from_tokens(tokens: u64) -> Self {
        Self(BigUint::from(tokens) * BigUint::from(UNITS_PER_TOKEN))
    }

    pub fn from_gwei(gwei: u64) -> Self {
        Self(BigUint::from(gwei) * BigUint::from(UNITS_PER_GWEI))
    }

    /// Fixed-point denominator used for share prices (one token)
    pub fn price_denominator() -> Self {
        Self::from_u64(UNITS_PER_TOKEN)
    }

    /// Size of a single validator commitment
    pub fn deposit_size() -> Self {
        Self::from_tokens(DEPOSIT_SIZE_TOKENS)
    }

    pub fn inner(&self) -> &BigUint {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn to_u128(&self) -> Option<u128> {
        self.0.to_u128()
    }

    pub fn checked_add(&self, other: &Amount) -> Option<Amount> {
        Some(Amount(&self.0 + &other.0))
    }

    pub fn checked_sub(&self, other: &Amount) -> Option<Amount> {
        if self.0 < other.0 {
            None
        } else {
            Some(Amount(&self.0 - &other.0))
        }
    }

    pub fn saturating_sub(&self, other: &Amount) -> Amount {
        self.checked_sub(other).unwrap_or_else(Amount::zero)
    }

    /// `self * numerator / denominator`, rounding down; `None` on a zero denominator
    pub fn mul_div(&self, numerator: &Amount, denominator: &Amount) -> Option<Amount> {
        if denominator.is_zero() {
            return None;
        }
        Some(Amount((&self.0 * &numerator.0) / &denominator.0))
    }

    /// Portion of this amount expressed in basis points, rounding down
    pub fn bps(&self, bps: BasisPoints) -> Amount {
        Amount((&self.0 * BigUint::from(bps)) / BigUint::from(MAX_BPS))
    }

    /// Parse a decimal token quantity such as `"32"` or `"0.5"` into base units
    pub fn parse_tokens(s: &str) -> CoreResult<Self> {
        let s = s.trim();
        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(CoreError::InvalidAmount(s.to_string()));
        }
        if frac.len() > 18 || !frac.chars().all(|c| c.is_ascii_digit()) {
            return Err(CoreError::InvalidAmount(s.to_string()));
        }
        let whole = if whole.is_empty() {
            BigUint::zero()
        } else {
            BigUint::parse_bytes(whole.as_bytes(), 10)
                .ok_or_else(|| CoreError::InvalidAmount(s.to_string()))?
        };
        let mut padded = frac.to_string();
        while padded.len() < 18 {
            padded.push('0');
        }
        let frac = BigUint::parse_bytes(padded.as_bytes(), 10)
            .ok_or_else(|| CoreError::InvalidAmount(s.to_string()))?;
        Ok(Self(whole * BigUint::from(UNITS_PER_TOKEN) + frac))
    }

    /// Render as a decimal token quantity, trimming trailing zeros
    pub fn format_tokens(&self) -> String {
        let unit = BigUint::from(UNITS_PER_TOKEN);
        let whole = &self.0 / &unit;
        let frac = &self.0 % &unit;
        if frac.is_zero() {
            return whole.to_string();
        }
        let frac = format!("{:0>18}", frac.to_string());
        format!("{}.{}", whole, frac.trim_end_matches('0'))
    }
}

impl std::str::FromStr for Amount {
    type Err = CoreError;

    /// Parse a raw base-unit integer
    fn from_str(s: &str) -> CoreResult<Self> {
        BigUint::parse_bytes(s.trim().as_bytes(), 10)
            .map(Amount)
            .ok_or_else(|| CoreError::InvalidAmount(s.to_string()))
    }
}

impl Add for Amount {
    type Output = Amount;

    fn add(self, other: Amount) -> Amount {
        Amount(&self.0 + &other.0)
    }
}

impl Sub for Amount {
    type Output = Amount;

    fn sub(self, other: Amount) -> Amount {
        Amount(&self.0 - &other.0)
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Claim-token shares are counted in the same base units
pub type Shares = Amount;
