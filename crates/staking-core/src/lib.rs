// staking-core/src/lib.rs

//! Core types shared by the liquid-staking protocol
//!
//! This crate provides:
//! - Base-unit amounts and protocol constants
//! - Capabilities and the permission oracle seam
//! - The claim-token ledger seam (mint / burn / supply)
//! - The deposit contract seam (commit a validator stake)

pub mod access;
pub mod deposit;
pub mod ledger;
pub mod types;

pub use access::{Capability, PermissionOracle, RoleRegistry};
pub use deposit::{DepositContract, DepositData, RecordingDepositContract};
pub use ledger::{MemoryLedger, ShareLedger};
pub use types::*;

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;

/// Broad failure classes surfaced to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorCategory {
    /// Caller lacks the required capability
    Authorization,
    /// Wrong nonce, duplicate vote or cooldown
    Replay,
    /// Observation outside the expected window
    Plausibility,
    /// Insufficient funds or capacity
    Resource,
    /// Out-of-range parameters
    Configuration,
    /// Operation invalid for the current lifecycle state
    State,
    /// An external collaborator failed; the call was reverted
    External,
}

/// Errors raised by the shared types and the in-memory collaborators
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Insufficient shares: required {required}, available {available}")]
    InsufficientShares { required: Amount, available: Amount },

    #[error("Ledger error: {0}")]
    LedgerError(String),

    #[error("Deposit contract error: {0}")]
    DepositError(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Crypto error: {0}")]
    CryptoError(#[from] staking_crypto::CryptoError),
}

impl CoreError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            CoreError::InsufficientShares { .. }
            | CoreError::LedgerError(_)
            | CoreError::DepositError(_) => ErrorCategory::External,
            CoreError::InvalidAmount(_) | CoreError::CryptoError(_) => {
                ErrorCategory::Configuration
            }
        }
    }
}
