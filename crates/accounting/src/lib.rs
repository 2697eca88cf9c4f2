// accounting/src/lib.rs

//! Pool accounting for the liquid-staking protocol
//!
//! This crate implements:
//! - Share price derivation (pooled value per claim-token share)
//! - Commission configuration for the treasury and the operator pool
//! - Report settlement: reward epochs mint commission, loss epochs are
//!   socialized across all holders

pub mod commission;
pub mod pool;
pub mod price;

pub use commission::{CommissionConfig, CommissionMint};
pub use pool::{BalanceDelta, BootstrapState, PoolAccounting, Settlement};
pub use price::{shares_for_value, value_of_shares, SharePrice};

use staking_core::{Amount, BasisPoints, ErrorCategory};

/// Result type for accounting operations
pub type AccountingResult<T> = Result<T, AccountingError>;

/// Errors that can occur in accounting operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccountingError {
    #[error("Invalid commission: treasury {treasury_bps} bps, operators {operator_bps} bps")]
    InvalidCommission {
        treasury_bps: BasisPoints,
        operator_bps: BasisPoints,
    },

    #[error("Invalid commission recipient: {0}")]
    InvalidRecipient(String),

    #[error("Share price is zero: {supply} shares outstanding against an empty pool")]
    ZeroSharePrice { supply: Amount },

    #[error("Accounting invariant violated: {0}")]
    InvariantViolation(String),
}

impl AccountingError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            AccountingError::InvalidCommission { .. } | AccountingError::InvalidRecipient(_) => {
                ErrorCategory::Configuration
            }
            AccountingError::ZeroSharePrice { .. } | AccountingError::InvariantViolation(_) => {
                ErrorCategory::State
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        let err = AccountingError::InvalidCommission { treasury_bps: 9000, operator_bps: 2000 };
        assert_eq!(err.category(), ErrorCategory::Configuration);
        let err = AccountingError::ZeroSharePrice { supply: Amount::from_u64(1) };
        assert_eq!(err.category(), ErrorCategory::State);
    }
}
