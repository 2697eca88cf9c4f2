// consensus/src/registry.rs

use crate::{members::MemberSlot, votes::VoteBitmap, ConsensusError, ConsensusResult};
use serde::{Deserialize, Serialize};
use staking_core::Timestamp;
use staking_crypto::{Address, BlsPublicKey, BlsSignature, WithdrawalCredentials};
use std::collections::HashMap;

/// Validator lifecycle, ordered: transitions only move forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ValidatorState {
    /// Key submitted by a node operator
    Registered,
    /// First activation quorum reached
    Activating,
    /// Second activation quorum reached; eligible for a deposit
    Active,
    /// Active and committed with a full deposit
    Deposited,
}

impl ValidatorState {
    /// State reached by an activation quorum from this one
    pub fn vote_target(self) -> Option<ValidatorState> {
        match self {
            ValidatorState::Registered => Some(ValidatorState::Activating),
            ValidatorState::Activating => Some(ValidatorState::Active),
            ValidatorState::Active | ValidatorState::Deposited => None,
        }
    }
}

impl std::fmt::Display for ValidatorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ValidatorState::Registered => "REGISTERED",
            ValidatorState::Activating => "ACTIVATING",
            ValidatorState::Active => "ACTIVE",
            ValidatorState::Deposited => "DEPOSITED",
        };
        write!(f, "{}", name)
    }
}

/// Complete validator record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorRecord {
    pub pubkey: BlsPublicKey,
    pub signature: BlsSignature,
    pub withdrawal_credentials: WithdrawalCredentials,
    pub state: ValidatorState,
    /// Votes toward the next state; cleared on each transition
    pub votes: VoteBitmap,
    /// Insertion order in the registry
    pub registry_index: u64,
    /// Position in the sequence of committed deposits
    pub deposit_index: Option<u64>,
    /// Node operator that submitted the key
    pub operator: Address,
    pub registered_at: Timestamp,
    pub last_transition_at: Timestamp,
}

/// Append-only registry of validator keys
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidatorRegistry {
    records: Vec<ValidatorRecord>,
    index: HashMap<BlsPublicKey, usize>,
    /// Credentials every registered key must commit to
    withdrawal_credentials: WithdrawalCredentials,
}

impl ValidatorRegistry {
    pub fn new(withdrawal_credentials: WithdrawalCredentials) -> Self {
        Self {
            records: Vec::new(),
            index: HashMap::new(),
            withdrawal_credentials,
        }
    }

    pub fn withdrawal_credentials(&self) -> &WithdrawalCredentials {
        &self.withdrawal_credentials
    }

    /// Applies to keys registered afterwards; existing records keep theirs
    pub fn set_withdrawal_credentials(&mut self, credentials: WithdrawalCredentials) {
        self.withdrawal_credentials = credentials;
    }

    /// Register a new validator key in REGISTERED state
    pub fn register(
        &mut self,
        pubkey: BlsPublicKey,
        signature: BlsSignature,
        withdrawal_credentials: WithdrawalCredentials,
        operator: Address,
        now: Timestamp,
    ) -> ConsensusResult<u64> {
        if self.index.contains_key(&pubkey) {
            return Err(ConsensusError::ValidatorAlreadyExists(pubkey.to_hex()));
        }
        if withdrawal_credentials != self.withdrawal_credentials {
            return Err(ConsensusError::WithdrawalCredentialsMismatch(pubkey.to_hex()));
        }

        let registry_index = self.records.len() as u64;
        self.index.insert(pubkey.clone(), self.records.len());
        self.records.push(ValidatorRecord {
            pubkey,
            signature,
            withdrawal_credentials,
            state: ValidatorState::Registered,
            votes: VoteBitmap::new(),
            registry_index,
            deposit_index: None,
            operator,
            registered_at: now,
            last_transition_at: now,
        });

        Ok(registry_index)
    }

    /// Record registered under `pubkey`
    pub fn get(&self, pubkey: &BlsPublicKey) -> Option<&ValidatorRecord> {
        self.index.get(pubkey).map(|&i| &self.records[i])
    }

    pub fn require(&self, pubkey: &BlsPublicKey) -> ConsensusResult<&ValidatorRecord> {
        self.get(pubkey)
            .ok_or_else(|| ConsensusError::UnknownValidator(pubkey.to_hex()))
    }

    fn require_mut(&mut self, pubkey: &BlsPublicKey) -> ConsensusResult<&mut ValidatorRecord> {
        let i = *self.index.get(pubkey)
            .ok_or_else(|| ConsensusError::UnknownValidator(pubkey.to_hex()))?;
        Ok(&mut self.records[i])
    }

    /// Add a vote toward the record's next state; returns the vote count
    pub fn record_vote(&mut self, pubkey: &BlsPublicKey, slot: MemberSlot) -> ConsensusResult<u32> {
        let record = self.require_mut(pubkey)?;
        if record.state.vote_target().is_none() {
            return Err(ConsensusError::InvalidValidatorState(format!(
                "{} is {} and takes no activation votes",
                pubkey, record.state
            )));
        }
        record.votes.insert(slot);
        Ok(record.votes.count())
    }

    /// Move a record to its next voted state and reset its votes
    pub fn advance(&mut self, pubkey: &BlsPublicKey, now: Timestamp) -> ConsensusResult<ValidatorState> {
        let record = self.require_mut(pubkey)?;
        let next = record.state.vote_target().ok_or_else(|| {
            ConsensusError::InvalidValidatorState(format!(
                "{} cannot advance from {}",
                pubkey, record.state
            ))
        })?;
        record.state = next;
        record.votes.clear();
        record.last_transition_at = now;
        Ok(next)
    }

    /// Mark an ACTIVE record as committed with the given deposit ordinal
    pub fn mark_deposited(
        &mut self,
        pubkey: &BlsPublicKey,
        deposit_index: u64,
        now: Timestamp,
    ) -> ConsensusResult<()> {
        let record = self.require_mut(pubkey)?;
        if record.state != ValidatorState::Active {
            return Err(ConsensusError::InvalidValidatorState(format!(
                "{} is {}, expected ACTIVE",
                pubkey, record.state
            )));
        }
        record.state = ValidatorState::Deposited;
        record.deposit_index = Some(deposit_index);
        record.last_transition_at = now;
        Ok(())
    }

    /// Erase a departed member's votes from every record
    pub fn clear_member_votes(&mut self, slot: MemberSlot) {
        for record in &mut self.records {
            record.votes.remove(slot);
        }
    }

    /// All records in registration order
    pub fn records(&self) -> &[ValidatorRecord] {
        &self.records
    }

    pub fn count(&self) -> usize {
        self.records.len()
    }

    pub fn count_in_state(&self, state: ValidatorState) -> usize {
        self.records.iter().filter(|r| r.state == state).count()
    }
}
