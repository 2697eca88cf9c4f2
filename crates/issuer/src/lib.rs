// issuer/src/lib.rs

//! Stake intake and validator commitment
//!
//! This crate implements the deposit queue:
//! - Staking mints claim-token shares at the current share price; large
//!   stakes wait while too many validators are pending
//! - Undeployed funds are committed in fixed chunks to ACTIVE validators
//! - The pending-validator limit caps commitments not yet seen by a report

pub mod limits;
pub mod queue;

pub use limits::PendingLimit;
pub use queue::{CommitReceipt, DepositQueue, StakeReceipt, DEFAULT_MIN_ACTIVATING_DEPOSIT_TOKENS};

use accounting::AccountingError;
use consensus::ConsensusError;
use staking_core::{Amount, BasisPoints, ErrorCategory};

/// Result type for issuer operations
pub type IssuerResult<T> = Result<T, IssuerError>;

/// Errors that can occur in issuer operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IssuerError {
    #[error("Cannot stake zero")]
    ZeroStake,

    #[error("Insufficient pooled funds: required {required}, available {available}")]
    InsufficientPooled { required: Amount, available: Amount },

    #[error("Validator not active: {pubkey} is {state}")]
    ValidatorNotActive { pubkey: String, state: String },

    #[error("Validator already deposited: {0}")]
    ValidatorAlreadyDeposited(String),

    #[error("Pending validator limit exceeded: {committed} committed, {activated} reported, limit {limit_bps} bps")]
    PendingLimitExceeded {
        committed: u64,
        activated: u64,
        limit_bps: BasisPoints,
    },

    #[error("Invalid limit: {0}")]
    InvalidLimit(String),

    #[error("Accounting error: {0}")]
    Accounting(#[from] AccountingError),

    #[error("Consensus error: {0}")]
    Consensus(#[from] ConsensusError),
}

impl IssuerError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            IssuerError::ZeroStake | IssuerError::InvalidLimit(_) => ErrorCategory::Configuration,
            IssuerError::InsufficientPooled { .. }
            | IssuerError::PendingLimitExceeded { .. } => ErrorCategory::Resource,
            IssuerError::ValidatorNotActive { .. }
            | IssuerError::ValidatorAlreadyDeposited(_) => ErrorCategory::State,
            IssuerError::Accounting(err) => err.category(),
            IssuerError::Consensus(err) => err.category(),
        }
    }
}
