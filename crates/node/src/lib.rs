// node/src/lib.rs

//! Composition root for the liquid-staking protocol
//!
//! `Protocol` owns every component's state and runs each call as one
//! atomic transaction. External collaborators (claim-token ledger,
//! permission oracle, deposit contract) are only called after the
//! local state for that call has been committed.

pub mod config;
pub mod runtime;
pub mod store;

pub use config::NodeConfig;
pub use runtime::{Protocol, ProtocolState, ProtocolStatus, ReportReceipt};
pub use store::{Snapshot, SnapshotStore};

use accounting::AccountingError;
use consensus::ConsensusError;
use issuer::IssuerError;
use staking_core::{Capability, CoreError, ErrorCategory};
use staking_crypto::Address;

/// Result type for protocol calls
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Failure reason of a reverted protocol call
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("{principal} lacks the {capability} capability")]
    Unauthorized {
        principal: Address,
        capability: Capability,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Consensus(#[from] ConsensusError),

    #[error(transparent)]
    Accounting(#[from] AccountingError),

    #[error(transparent)]
    Issuer(#[from] IssuerError),

    #[error("External call failed: {0}")]
    External(#[from] CoreError),
}

impl ProtocolError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ProtocolError::Unauthorized { .. } => ErrorCategory::Authorization,
            ProtocolError::InvalidConfig(_) => ErrorCategory::Configuration,
            ProtocolError::Consensus(err) => err.category(),
            ProtocolError::Accounting(err) => err.category(),
            ProtocolError::Issuer(err) => err.category(),
            ProtocolError::External(_) => ErrorCategory::External,
        }
    }
}

impl From<staking_crypto::CryptoError> for ProtocolError {
    fn from(err: staking_crypto::CryptoError) -> Self {
        ProtocolError::InvalidConfig(err.to_string())
    }
}
