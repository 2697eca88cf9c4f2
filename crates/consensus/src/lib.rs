// consensus/src/lib.rs

//! Oracle committee consensus for the staking protocol
//!
//! This crate implements the two quorum protocols run by oracle members:
//! - Report consensus: members agree on the observed remote balance and
//!   validator count for the live accounting nonce
//! - Activation consensus: members promote validator records through
//!   REGISTERED -> ACTIVATING -> ACTIVE
//!
//! Votes are kept as fixed-size bitmaps indexed by the member's slot.

pub mod activation;
pub mod beacon;
pub mod members;
pub mod registry;
pub mod report;
pub mod votes;

pub use activation::{ActivationConsensus, ActivationOutcome, DEFAULT_ACTIVATION_COOLDOWN_SECS};
pub use beacon::BeaconSchedule;
pub use members::{MemberSlot, OracleMembers, MAX_ORACLE_MEMBERS};
pub use registry::{ValidatorRecord, ValidatorRegistry, ValidatorState};
pub use report::{FinalizedReport, PlausibilityWindow, ReportConsensus, ReportOutcome, ReportTuple};
pub use votes::VoteBitmap;

use staking_core::{ErrorCategory, Nonce};
use staking_crypto::Address;

/// Result type for consensus operations
pub type ConsensusResult<T> = Result<T, ConsensusError>;

/// Errors that can occur during consensus operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConsensusError {
    #[error("Not an oracle member: {0}")]
    NotOracleMember(Address),

    #[error("Stale or future nonce: expected {expected}, provided {provided}")]
    StaleOrFutureNonce { expected: Nonce, provided: Nonce },

    #[error("Duplicate vote by {member} for {subject}")]
    DuplicateVote { member: Address, subject: String },

    #[error("Cooldown active for {member}: {remaining_secs}s remaining")]
    CooldownActive { member: Address, remaining_secs: u64 },

    #[error("Implausible observation: {0}")]
    ImplausibleObservation(String),

    #[error("Invalid quorum: {0}")]
    InvalidQuorum(u32),

    #[error("Invalid beacon schedule: {0}")]
    InvalidBeaconSchedule(String),

    #[error("Oracle member set is full ({0} slots)")]
    MemberSetFull(usize),

    #[error("Already an oracle member: {0}")]
    AlreadyOracleMember(Address),

    #[error("Unknown oracle member: {0}")]
    UnknownOracleMember(Address),

    #[error("Validator not found: {0}")]
    UnknownValidator(String),

    #[error("Validator already exists: {0}")]
    ValidatorAlreadyExists(String),

    #[error("Withdrawal credentials mismatch for {0}")]
    WithdrawalCredentialsMismatch(String),

    #[error("Invalid validator state: {0}")]
    InvalidValidatorState(String),
}

impl ConsensusError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ConsensusError::NotOracleMember(_) => ErrorCategory::Authorization,
            ConsensusError::StaleOrFutureNonce { .. }
            | ConsensusError::DuplicateVote { .. }
            | ConsensusError::CooldownActive { .. } => ErrorCategory::Replay,
            ConsensusError::ImplausibleObservation(_) => ErrorCategory::Plausibility,
            ConsensusError::InvalidQuorum(_)
            | ConsensusError::InvalidBeaconSchedule(_)
            | ConsensusError::MemberSetFull(_)
            | ConsensusError::AlreadyOracleMember(_)
            | ConsensusError::UnknownOracleMember(_)
            | ConsensusError::WithdrawalCredentialsMismatch(_) => ErrorCategory::Configuration,
            ConsensusError::UnknownValidator(_)
            | ConsensusError::ValidatorAlreadyExists(_)
            | ConsensusError::InvalidValidatorState(_) => ErrorCategory::State,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        let member = Address::zero();
        assert_eq!(
            ConsensusError::NotOracleMember(member).category(),
            ErrorCategory::Authorization
        );
        assert_eq!(
            ConsensusError::StaleOrFutureNonce { expected: 2, provided: 1 }.category(),
            ErrorCategory::Replay
        );
        assert_eq!(
            ConsensusError::ImplausibleObservation("too many".into()).category(),
            ErrorCategory::Plausibility
        );
        assert_eq!(ConsensusError::InvalidQuorum(0).category(), ErrorCategory::Configuration);
    }
}
