// consensus/src/activation.rs

use crate::{
    members::{MemberSlot, OracleMembers},
    registry::{ValidatorRegistry, ValidatorState},
    report::validate_quorum,
    ConsensusError, ConsensusResult,
};
use serde::{Deserialize, Serialize};
use staking_core::Timestamp;
use staking_crypto::{Address, BlsPublicKey};
use std::collections::{HashMap, HashSet};

/// One epoch at 32 slots of 12 seconds
pub const DEFAULT_ACTIVATION_COOLDOWN_SECS: u64 = 384;

/// Result of one batched activation call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationOutcome {
    /// Keys that received the caller's vote
    pub voted: Vec<BlsPublicKey>,
    /// Keys whose vote completed a quorum, with their new state
    pub advanced: Vec<(BlsPublicKey, ValidatorState)>,
    /// Keys already past activation; no vote recorded
    pub skipped: Vec<BlsPublicKey>,
}

/// Quorum and rate limiting for validator promotion votes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivationConsensus {
    quorum: u32,
    cooldown_secs: u64,
    /// Time of each member's last call that recorded at least one vote
    last_vote_at: HashMap<Address, Timestamp>,
}

impl ActivationConsensus {
    pub fn new(quorum: u32, cooldown_secs: u64) -> ConsensusResult<Self> {
        validate_quorum(quorum)?;
        Ok(Self {
            quorum,
            cooldown_secs,
            last_vote_at: HashMap::new(),
        })
    }

    pub fn quorum(&self) -> u32 {
        self.quorum
    }

    pub fn cooldown_secs(&self) -> u64 {
        self.cooldown_secs
    }

    pub fn last_vote_at(&self, member: &Address) -> Option<Timestamp> {
        self.last_vote_at.get(member).copied()
    }

    pub fn update_quorum(&mut self, quorum: u32, member_count: usize) -> ConsensusResult<()> {
        validate_quorum(quorum)?;
        if quorum as usize > member_count {
            tracing::warn!(
                "Validator quorum {} exceeds current member count {}; no validator can advance",
                quorum,
                member_count
            );
        }
        self.quorum = quorum;
        Ok(())
    }

    pub fn set_cooldown(&mut self, cooldown_secs: u64) {
        self.cooldown_secs = cooldown_secs;
    }

    /// Vote to promote each key one lifecycle step
    ///
    /// Membership, cooldown, unknown keys and duplicate votes are checked for
    /// the whole batch before any vote is recorded. Keys already ACTIVE or
    /// DEPOSITED are skipped.
    pub fn activate(
        &mut self,
        members: &OracleMembers,
        registry: &mut ValidatorRegistry,
        caller: &Address,
        pubkeys: &[BlsPublicKey],
        now: Timestamp,
    ) -> ConsensusResult<ActivationOutcome> {
        let slot = members.require(caller)?;
        self.check_cooldown(caller, now)?;

        let mut outcome = ActivationOutcome::default();
        let mut seen = HashSet::with_capacity(pubkeys.len());
        let mut targets = Vec::with_capacity(pubkeys.len());

        for pubkey in pubkeys {
            if !seen.insert(pubkey) {
                return Err(duplicate(caller, pubkey));
            }
            let record = registry.require(pubkey)?;
            if record.state.vote_target().is_none() {
                outcome.skipped.push(pubkey.clone());
                continue;
            }
            if record.votes.contains(slot) {
                return Err(duplicate(caller, pubkey));
            }
            targets.push(pubkey);
        }

        for pubkey in targets {
            self.vote(registry, slot, pubkey, now, &mut outcome)?;
        }

        if !outcome.voted.is_empty() {
            self.last_vote_at.insert(*caller, now);
        }

        tracing::debug!(
            "Activation votes from {}: {} voted, {} advanced, {} skipped",
            caller,
            outcome.voted.len(),
            outcome.advanced.len(),
            outcome.skipped.len()
        );

        Ok(outcome)
    }

    /// Drop a departed member's cooldown entry
    pub fn forget_member(&mut self, member: &Address) {
        self.last_vote_at.remove(member);
    }

    fn check_cooldown(&self, caller: &Address, now: Timestamp) -> ConsensusResult<()> {
        if let Some(last) = self.last_vote_at.get(caller) {
            let ready_at = last.saturating_add(self.cooldown_secs);
            if now < ready_at {
                return Err(ConsensusError::CooldownActive {
                    member: *caller,
                    remaining_secs: ready_at - now,
                });
            }
        }
        Ok(())
    }

    fn vote(
        &self,
        registry: &mut ValidatorRegistry,
        slot: MemberSlot,
        pubkey: &BlsPublicKey,
        now: Timestamp,
        outcome: &mut ActivationOutcome,
    ) -> ConsensusResult<()> {
        let votes = registry.record_vote(pubkey, slot)?;
        outcome.voted.push(pubkey.clone());

        if votes >= self.quorum {
            let state = registry.advance(pubkey, now)?;
            tracing::info!("Validator {} advanced to {}", pubkey, state);
            outcome.advanced.push((pubkey.clone(), state));
        }
        Ok(())
    }
}

fn duplicate(caller: &Address, pubkey: &BlsPublicKey) -> ConsensusError {
    ConsensusError::DuplicateVote {
        member: *caller,
        subject: format!("validator {}", pubkey),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use staking_crypto::{BlsSignature, WithdrawalCredentials, BLS_PUBKEY_SIZE, BLS_SIGNATURE_SIZE};

    struct Fixture {
        members: OracleMembers,
        registry: ValidatorRegistry,
        activation: ActivationConsensus,
        oracles: Vec<Address>,
    }

    fn pubkey(i: u8) -> BlsPublicKey {
        BlsPublicKey::from_bytes(&[i; BLS_PUBKEY_SIZE]).unwrap()
    }

    fn fixture(quorum: u32, keys: u8) -> Fixture {
        let mut members = OracleMembers::new();
        let oracles: Vec<Address> = (1..=3).map(|i| Address::new([i; 20])).collect();
        for oracle in &oracles {
            members.add(*oracle).unwrap();
        }

        let creds = WithdrawalCredentials::for_address(&Address::derive(b"vault"));
        let mut registry = ValidatorRegistry::new(creds);
        for i in 1..=keys {
            let signature = BlsSignature::from_bytes(&[0u8; BLS_SIGNATURE_SIZE]).unwrap();
            registry.register(pubkey(i), signature, creds, Address::zero(), 0).unwrap();
        }

        Fixture {
            members,
            registry,
            activation: ActivationConsensus::new(quorum, 100).unwrap(),
            oracles,
        }
    }

    impl Fixture {
        fn activate(&mut self, oracle: usize, keys: &[u8], now: Timestamp) -> ConsensusResult<ActivationOutcome> {
            let keys: Vec<BlsPublicKey> = keys.iter().map(|&i| pubkey(i)).collect();
            let caller = self.oracles[oracle];
            self.activation.activate(&self.members, &mut self.registry, &caller, &keys, now)
        }

        fn state(&self, key: u8) -> ValidatorState {
            self.registry.get(&pubkey(key)).unwrap().state
        }
    }

    #[test]
    fn test_two_quorums_to_active() {
        let mut f = fixture(2, 1);

        f.activate(0, &[1], 1000).unwrap();
        assert_eq!(f.state(1), ValidatorState::Registered);

        let outcome = f.activate(1, &[1], 1000).unwrap();
        assert_eq!(outcome.advanced, vec![(pubkey(1), ValidatorState::Activating)]);

        // Votes for REGISTERED do not carry into ACTIVATING
        f.activate(0, &[1], 1200).unwrap();
        assert_eq!(f.state(1), ValidatorState::Activating);
        f.activate(2, &[1], 1200).unwrap();
        assert_eq!(f.state(1), ValidatorState::Active);
    }

    #[test]
    fn test_non_member_rejected() {
        let mut f = fixture(1, 1);
        let outsider = Address::new([42; 20]);
        let result = f.activation.activate(&f.members, &mut f.registry, &outsider, &[pubkey(1)], 0);
        assert_eq!(result, Err(ConsensusError::NotOracleMember(outsider)));
    }

    #[test]
    fn test_cooldown_then_quorum() {
        let mut f = fixture(2, 2);
        f.activate(0, &[1], 1000).unwrap();
        f.activate(1, &[2], 1000).unwrap();

        // Same member inside the window, different key: rate limit is global
        let result = f.activate(0, &[2], 1050);
        assert_eq!(
            result,
            Err(ConsensusError::CooldownActive { member: f.oracles[0], remaining_secs: 50 })
        );
        assert_eq!(f.state(2), ValidatorState::Registered);

        let outcome = f.activate(0, &[2], 1100).unwrap();
        assert_eq!(outcome.advanced, vec![(pubkey(2), ValidatorState::Activating)]);
    }

    #[test]
    fn test_duplicate_vote_same_state() {
        let mut f = fixture(3, 1);
        f.activate(0, &[1], 1000).unwrap();

        let result = f.activate(0, &[1], 2000);
        assert!(matches!(result, Err(ConsensusError::DuplicateVote { .. })));
        // Failed call leaves the cooldown untouched
        assert_eq!(f.activation.last_vote_at(&f.oracles[0]), Some(1000));
    }

    #[test]
    fn test_repeated_key_in_batch_rejected() {
        let mut f = fixture(2, 1);
        let result = f.activate(0, &[1, 1], 1000);
        assert!(matches!(result, Err(ConsensusError::DuplicateVote { .. })));
        assert!(f.registry.get(&pubkey(1)).unwrap().votes.is_empty());
    }

    #[test]
    fn test_unknown_key_fails_whole_batch() {
        let mut f = fixture(1, 1);
        let result = f.activate(0, &[1, 9], 1000);
        assert!(matches!(result, Err(ConsensusError::UnknownValidator(_))));
        assert_eq!(f.state(1), ValidatorState::Registered);
        assert_eq!(f.activation.last_vote_at(&f.oracles[0]), None);
    }

    #[test]
    fn test_active_keys_skipped() {
        let mut f = fixture(1, 2);
        f.activate(0, &[1], 0).unwrap();
        f.activate(0, &[1], 100).unwrap();
        assert_eq!(f.state(1), ValidatorState::Active);

        let outcome = f.activate(0, &[1, 2], 200).unwrap();
        assert_eq!(outcome.skipped, vec![pubkey(1)]);
        assert_eq!(outcome.voted, vec![pubkey(2)]);
        assert_eq!(f.state(2), ValidatorState::Activating);
    }

    #[test]
    fn test_all_skipped_keeps_cooldown_clear() {
        let mut f = fixture(1, 1);
        f.activate(0, &[1], 0).unwrap();
        f.activate(1, &[1], 0).unwrap();

        let outcome = f.activate(2, &[1], 0).unwrap();
        assert!(outcome.voted.is_empty());
        assert_eq!(f.activation.last_vote_at(&f.oracles[2]), None);
    }

    #[test]
    fn test_invalid_quorum() {
        assert_eq!(
            ActivationConsensus::new(0, 0).unwrap_err(),
            ConsensusError::InvalidQuorum(0)
        );
        let mut activation = ActivationConsensus::new(1, 0).unwrap();
        assert!(activation.update_quorum(129, 3).is_err());
        assert!(activation.update_quorum(5, 3).is_ok());
        assert_eq!(activation.quorum(), 5);
    }
}
