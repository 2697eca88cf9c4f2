use accounting::BalanceDelta;
use consensus::{BeaconSchedule, ConsensusError, ReportOutcome, ValidatorState};
use issuer::IssuerError;
use node::{NodeConfig, Protocol, ProtocolError};
use proptest::prelude::*;
use staking_core::{
    Amount, Capability, ErrorCategory, MemoryLedger, RecordingDepositContract, RoleRegistry,
    ShareLedger, Timestamp,
};
use staking_crypto::{Address, BlsPublicKey, BlsSignature, BLS_PUBKEY_SIZE, BLS_SIGNATURE_SIZE};

type TestProtocol = Protocol<MemoryLedger, RoleRegistry, RecordingDepositContract>;

const GENESIS: Timestamp = 1_000;

struct Harness {
    protocol: TestProtocol,
    config: NodeConfig,
}

impl Harness {
    fn new(configure: impl FnOnce(&mut NodeConfig)) -> Self {
        let mut config = NodeConfig::default();
        config.protocol.report_quorum = 3;
        config.protocol.validator_quorum = 2;
        config.protocol.treasury_commission_bps = 0;
        config.protocol.operator_commission_bps = 0;
        config.protocol.activation_cooldown_secs = 0;
        config.protocol.pending_validators_limit_bps = 5_000;
        config.beacon = BeaconSchedule::new(1, 32, 12, GENESIS).unwrap();
        config.roles.oracle_members.push(Address::derive(b"oracle-4").to_hex());
        configure(&mut config);

        let roles = &config.roles;
        let mut registry = RoleRegistry::with_governor(roles.governor().unwrap());
        registry.grant(roles.key_admin().unwrap(), Capability::KeyAdmin);
        for operator in roles.node_operators().unwrap() {
            registry.grant(operator, Capability::NodeOperator);
        }

        let protocol = Protocol::from_config(
            &config,
            MemoryLedger::new(),
            registry,
            RecordingDepositContract::new(),
        )
        .unwrap();
        Self { protocol, config }
    }

    fn governor(&self) -> Address {
        self.config.roles.governor().unwrap()
    }

    fn oracle(&self, i: usize) -> Address {
        self.config.roles.oracle_members().unwrap()[i]
    }

    fn operator(&self) -> Address {
        self.config.roles.node_operators().unwrap()[0]
    }

    /// A time inside reporting frame `frame`
    fn frame(&self, frame: u64) -> Timestamp {
        self.protocol.beacon_schedule().frame_start_time(frame) + 5
    }

    fn register(&mut self, i: u8) -> BlsPublicKey {
        let pubkey = BlsPublicKey::from_bytes(&[i; BLS_PUBKEY_SIZE]).unwrap();
        let signature = BlsSignature::from_bytes(&[i; BLS_SIGNATURE_SIZE]).unwrap();
        let credentials = *self.protocol.withdrawal_credentials();
        let operator = self.operator();
        self.protocol
            .add_validator(&operator, pubkey.clone(), signature, credentials, 0)
            .unwrap();
        pubkey
    }

    /// Register a key and vote it to ACTIVE with two members per step
    fn activate(&mut self, i: u8) -> BlsPublicKey {
        let pubkey = self.register(i);
        for _ in 0..2 {
            for member in 0..2 {
                let oracle = self.oracle(member);
                self.protocol.activate_validators(&oracle, &[pubkey.clone()], 0).unwrap();
            }
        }
        assert_eq!(self.protocol.validator(&pubkey).unwrap().state, ValidatorState::Active);
        pubkey
    }

    /// Have the first `quorum` members agree on a report
    fn finalize(&mut self, value: Amount, validators: u64, now: Timestamp) -> ReportOutcome {
        let nonce = self.protocol.current_nonce();
        let quorum = self.protocol.report_quorum() as usize;
        let mut last = None;
        for member in 0..quorum {
            let oracle = self.oracle(member);
            let receipt = self.protocol
                .submit_report(&oracle, value.clone(), nonce, validators, now)
                .unwrap();
            last = Some(receipt.outcome);
        }
        last.unwrap()
    }
}

fn staker(name: &str) -> Address {
    Address::derive(name.as_bytes())
}

#[test]
fn test_report_quorum_advances_nonce_exactly_once() {
    let mut h = Harness::new(|config| {
        config.bootstrap.deposited_validators = 2;
    });
    let now = h.frame(1);
    let value = Amount::from_u64(64_000_000_000);
    let nonce = h.protocol.current_nonce();

    for member in 0..2 {
        let oracle = h.oracle(member);
        let receipt = h.protocol.submit_report(&oracle, value.clone(), nonce, 2, now).unwrap();
        assert!(receipt.settlement.is_none());
        assert_eq!(h.protocol.current_nonce(), nonce);
    }

    let oracle = h.oracle(2);
    let receipt = h.protocol.submit_report(&oracle, value.clone(), nonce, 2, now).unwrap();
    assert!(matches!(receipt.outcome, ReportOutcome::QuorumReached(_)));
    assert!(receipt.settlement.is_some());
    assert_eq!(h.protocol.current_nonce(), nonce + 1);

    let late = h.oracle(3);
    let err = h.protocol.submit_report(&late, value, nonce, 2, now).unwrap_err();
    assert!(matches!(
        err,
        ProtocolError::Consensus(ConsensusError::StaleOrFutureNonce { expected, provided })
            if expected == nonce + 1 && provided == nonce
    ));
    assert_eq!(err.category(), ErrorCategory::Replay);
    assert_eq!(h.protocol.current_nonce(), nonce + 1);
}

#[test]
fn test_divergent_reports_never_combine() {
    let mut h = Harness::new(|config| {
        config.bootstrap.deposited_validators = 2;
    });
    let now = h.frame(1);
    let a = Amount::from_tokens(64);
    let b = Amount::from_tokens(63);

    h.protocol.submit_report(&h.oracle(0), a.clone(), 0, 2, now).unwrap();
    h.protocol.submit_report(&h.oracle(1), a.clone(), 0, 2, now).unwrap();
    h.protocol.submit_report(&h.oracle(2), b.clone(), 0, 2, now).unwrap();
    h.protocol.submit_report(&h.oracle(3), b, 0, 2, now).unwrap();
    assert_eq!(h.protocol.current_nonce(), 0);

    // Second vote from a member is rejected regardless of value
    let err = h.protocol.submit_report(&h.oracle(0), a, 0, 2, now).unwrap_err();
    assert!(matches!(err, ProtocolError::Consensus(ConsensusError::DuplicateVote { .. })));
    assert_eq!(h.protocol.current_nonce(), 0);
}

#[test]
fn test_lowered_quorum_finalizes_split_round() {
    let mut h = Harness::new(|config| {
        config.bootstrap.deposited_validators = 2;
    });
    let now = h.frame(1);
    let a = Amount::from_tokens(64);
    let b = Amount::from_tokens(63);

    h.protocol.submit_report(&h.oracle(0), a.clone(), 0, 2, now).unwrap();
    h.protocol.submit_report(&h.oracle(1), a.clone(), 0, 2, now).unwrap();
    h.protocol.submit_report(&h.oracle(2), b, 0, 2, now).unwrap();
    assert_eq!(h.protocol.current_nonce(), 0);

    let governor = h.governor();
    let receipt = h.protocol.update_report_quorum(&governor, 2, now).unwrap().unwrap();
    match receipt.outcome {
        ReportOutcome::QuorumReached(report) => {
            assert_eq!(report.nonce, 0);
            assert_eq!(report.tuple.total_reported_value, a);
        }
        other => panic!("expected quorum, got {:?}", other),
    }
    assert!(receipt.settlement.is_some());
    assert_eq!(h.protocol.current_nonce(), 1);
    assert_eq!(h.protocol.report_quorum(), 2);

    // The straggler's vote lands on a closed nonce
    let err = h.protocol.submit_report(&h.oracle(3), a, 0, 2, now).unwrap_err();
    assert!(matches!(err, ProtocolError::Consensus(ConsensusError::StaleOrFutureNonce { .. })));
}

#[test]
fn test_raising_quorum_leaves_round_open() {
    let mut h = Harness::new(|config| {
        config.bootstrap.deposited_validators = 2;
    });
    let now = h.frame(1);
    h.protocol.submit_report(&h.oracle(0), Amount::from_tokens(64), 0, 2, now).unwrap();

    let governor = h.governor();
    assert!(h.protocol.update_report_quorum(&governor, 4, now).unwrap().is_none());
    assert_eq!(h.protocol.current_nonce(), 0);
}

#[test]
fn test_non_member_report_rejected() {
    let mut h = Harness::new(|_| {});
    let err = h.protocol
        .submit_report(&staker("mallory"), Amount::zero(), 0, 0, h.frame(1))
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Authorization);
}

#[test]
fn test_implausible_validator_count_rejected() {
    let mut h = Harness::new(|config| {
        config.bootstrap.deposited_validators = 1;
    });
    let err = h.protocol
        .submit_report(&h.oracle(0), Amount::from_tokens(64), 0, 2, h.frame(1))
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Plausibility);
}

#[test]
fn test_stake_pricing_before_and_after_reward() {
    let mut h = Harness::new(|config| {
        config.protocol.report_quorum = 1;
    });

    let first = h.protocol.stake(staker("alice"), Amount::from_tokens(1)).unwrap();
    assert_eq!(first.shares, Amount::from_tokens(1));
    h.protocol.stake(staker("bob"), Amount::from_tokens(31)).unwrap();

    let key = h.activate(1);
    h.protocol.deposit_to_eth2(&key, 10).unwrap();

    // 32 -> 35.2 raises the price to 1.1
    let reported = Amount::parse_tokens("35.2").unwrap();
    h.finalize(reported, 1, h.frame(1));
    assert_eq!(h.protocol.share_price().to_string(), "1.1");

    let second = h.protocol.stake(staker("carol"), Amount::from_tokens(1)).unwrap();
    assert_eq!(second.shares, Amount::from_u128(909_090_909_090_909_090));
    assert!(h.protocol.is_balanced());
}

#[test]
fn test_reward_commission_priced_before_update() {
    let mut h = Harness::new(|config| {
        config.protocol.report_quorum = 1;
        config.protocol.treasury_commission_bps = 500;
        config.protocol.operator_commission_bps = 500;
    });
    h.protocol.stake(staker("alice"), Amount::from_tokens(64)).unwrap();
    let key = h.activate(1);
    h.protocol.deposit_to_eth2(&key, 10).unwrap();

    let price_before = h.protocol.share_price();
    let nonce = h.protocol.current_nonce();
    let receipt = h.protocol
        .submit_report(&h.oracle(0), Amount::from_tokens(36), nonce, 1, h.frame(1))
        .unwrap();
    let settlement = receipt.settlement.unwrap();

    assert_eq!(settlement.delta, BalanceDelta::Reward(Amount::from_tokens(4)));
    let treasury = h.config.roles.treasury().unwrap();
    let pool = h.config.roles.operator_pool().unwrap();
    // 10% of 4 tokens split evenly, valued at price 1.0
    assert_eq!(h.protocol.ledger().balance_of(&treasury), Amount::parse_tokens("0.2").unwrap());
    assert_eq!(h.protocol.ledger().balance_of(&pool), Amount::parse_tokens("0.2").unwrap());
    assert!(settlement.commission_value() <= Amount::from_tokens(4));
    assert!(h.protocol.share_price() >= price_before);
    assert_eq!(h.protocol.total_pooled_value(), &Amount::from_tokens(68));
}

#[test]
fn test_loss_lowers_price_without_commission() {
    let mut h = Harness::new(|config| {
        config.protocol.report_quorum = 1;
        config.protocol.treasury_commission_bps = 500;
    });
    h.protocol.stake(staker("alice"), Amount::from_tokens(32)).unwrap();
    let key = h.activate(1);
    h.protocol.deposit_to_eth2(&key, 10).unwrap();

    let price_before = h.protocol.share_price();
    let receipt = h.protocol
        .submit_report(&h.oracle(0), Amount::from_tokens(31), 0, 1, h.frame(1))
        .unwrap();
    let settlement = receipt.settlement.unwrap();

    assert_eq!(settlement.delta, BalanceDelta::Loss(Amount::from_tokens(1)));
    assert!(settlement.commissions.is_empty());
    assert!(h.protocol.share_price() < price_before);
    assert_eq!(h.protocol.ledger().total_supply(), Amount::from_tokens(32));
    assert!(h.protocol.is_balanced());
}

#[test]
fn test_activation_cooldown_then_quorum() {
    let mut h = Harness::new(|config| {
        config.protocol.activation_cooldown_secs = 384;
    });
    let first = h.register(1);
    let second = h.register(2);
    let (a, b) = (h.oracle(0), h.oracle(1));

    h.protocol.activate_validators(&a, &[first.clone()], 1_000).unwrap();
    h.protocol.activate_validators(&b, &[second.clone()], 1_000).unwrap();

    let err = h.protocol.activate_validators(&a, &[second.clone()], 1_010).unwrap_err();
    assert!(matches!(
        err,
        ProtocolError::Consensus(ConsensusError::CooldownActive { remaining_secs: 374, .. })
    ));
    assert_eq!(h.protocol.validator(&second).unwrap().state, ValidatorState::Registered);

    let outcome = h.protocol.activate_validators(&a, &[second.clone()], 1_384).unwrap();
    assert_eq!(outcome.advanced, vec![(second.clone(), ValidatorState::Activating)]);
    assert_eq!(h.protocol.validator(&first).unwrap().state, ValidatorState::Registered);
}

#[test]
fn test_lifecycle_needs_fresh_votes_per_step() {
    let mut h = Harness::new(|_| {});
    let key = h.register(1);
    let (a, b, c) = (h.oracle(0), h.oracle(1), h.oracle(2));

    h.protocol.activate_validators(&a, &[key.clone()], 0).unwrap();
    h.protocol.activate_validators(&b, &[key.clone()], 0).unwrap();
    assert_eq!(h.protocol.validator(&key).unwrap().state, ValidatorState::Activating);

    // Votes from the first step do not count toward the second
    h.protocol.activate_validators(&c, &[key.clone()], 0).unwrap();
    assert_eq!(h.protocol.validator(&key).unwrap().state, ValidatorState::Activating);
    h.protocol.activate_validators(&a, &[key.clone()], 0).unwrap();
    assert_eq!(h.protocol.validator(&key).unwrap().state, ValidatorState::Active);

    // Further votes are skipped, never moving the key backward
    let outcome = h.protocol.activate_validators(&b, &[key.clone()], 0).unwrap();
    assert_eq!(outcome.skipped, vec![key.clone()]);
    assert_eq!(h.protocol.validator(&key).unwrap().state, ValidatorState::Active);
}

#[test]
fn test_deposit_guards() {
    let mut h = Harness::new(|config| {
        config.protocol.pending_validators_limit_bps = 0;
    });
    let pending = h.register(9);

    h.protocol.stake(staker("alice"), Amount::from_tokens(40)).unwrap();
    let err = h.protocol.deposit_to_eth2(&pending, 0).unwrap_err();
    assert!(matches!(err, ProtocolError::Issuer(IssuerError::ValidatorNotActive { .. })));
    assert_eq!(err.category(), ErrorCategory::State);

    let first = h.activate(1);
    let second = h.activate(2);
    h.protocol.deposit_to_eth2(&first, 0).unwrap();
    assert_eq!(h.protocol.deposits().deposits().len(), 1);

    let err = h.protocol.deposit_to_eth2(&second, 0).unwrap_err();
    assert!(matches!(err, ProtocolError::Issuer(IssuerError::InsufficientPooled { .. })));
    assert_eq!(err.category(), ErrorCategory::Resource);

    h.protocol.stake(staker("bob"), Amount::from_tokens(32)).unwrap();
    let err = h.protocol.deposit_to_eth2(&second, 0).unwrap_err();
    assert!(matches!(err, ProtocolError::Issuer(IssuerError::PendingLimitExceeded { .. })));

    // A report confirming the first validator frees the next slot
    let nonce = h.protocol.current_nonce();
    for member in 0..3 {
        let oracle = h.oracle(member);
        h.protocol.submit_report(&oracle, Amount::from_tokens(32), nonce, 1, h.frame(1)).unwrap();
    }
    h.protocol.deposit_to_eth2(&second, 0).unwrap();
    assert_eq!(h.protocol.validator(&second).unwrap().deposit_index, Some(1));
    assert_eq!(h.protocol.deposits().total_deposited(), Amount::from_tokens(64));
    assert!(h.protocol.is_balanced());
}

#[test]
fn test_activating_deposit_threshold_only_gates_large_stakes() {
    let mut h = Harness::new(|config| {
        config.protocol.pending_validators_limit_bps = 0;
    });
    let governor = h.governor();
    let huge: Amount = "100000000000000000000000000000000".parse().unwrap();
    h.protocol.set_min_activating_deposit(&governor, huge).unwrap();

    // Far below the threshold, a single token still mints
    let receipt = h.protocol.stake(staker("alice"), Amount::from_tokens(1)).unwrap();
    assert!(!receipt.shares.is_zero());
    assert_eq!(h.protocol.undeployed_balance(), &Amount::from_tokens(1));

    // With a validator pending, stakes at the threshold hit the limit
    let key = h.activate(1);
    h.protocol.stake(staker("bob"), Amount::from_tokens(31)).unwrap();
    h.protocol.deposit_to_eth2(&key, 0).unwrap();
    h.protocol.set_min_activating_deposit(&governor, Amount::from_tokens(10)).unwrap();

    h.protocol.stake(staker("carol"), Amount::from_tokens(9)).unwrap();
    let err = h.protocol.stake(staker("dave"), Amount::from_tokens(10)).unwrap_err();
    assert!(matches!(err, ProtocolError::Issuer(IssuerError::PendingLimitExceeded { .. })));
    assert_eq!(h.protocol.undeployed_balance(), &Amount::from_tokens(9));
}

#[test]
fn test_overflowing_beacon_schedule_rejected() {
    let mut h = Harness::new(|_| {});
    let governor = h.governor();
    let before = *h.protocol.beacon_schedule();

    let overflowing = BeaconSchedule {
        epochs_per_frame: 1 << 40,
        slots_per_epoch: 1 << 40,
        seconds_per_slot: 12,
        genesis_time: GENESIS,
    };
    let err = h.protocol.update_beacon_schedule(&governor, overflowing).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Configuration);
    assert_eq!(h.protocol.beacon_schedule(), &before);
}

#[test]
fn test_governor_configuration_bounds() {
    let mut h = Harness::new(|_| {});
    let governor = h.governor();

    let err = h.protocol.update_commissions(&governor, 6_000, 5_000).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Configuration);
    let err = h.protocol.set_pending_validators_limit(&governor, 10_000).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Configuration);
    let err = h.protocol.update_report_quorum(&governor, 0, 0).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Configuration);
    let err = h.protocol
        .update_beacon_schedule(&governor, BeaconSchedule { epochs_per_frame: 0, ..BeaconSchedule::default() })
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Configuration);

    let err = h.protocol.update_commissions(&staker("mallory"), 0, 0).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Authorization);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_pool_stays_balanced(
        stakes in prop::collection::vec(1u64..80, 1..6),
        deltas in prop::collection::vec(-2_000i64..4_000, 1..4),
    ) {
        let mut h = Harness::new(|config| {
            config.protocol.report_quorum = 1;
            config.protocol.treasury_commission_bps = 300;
            config.protocol.operator_commission_bps = 200;
        });

        for (i, tokens) in stakes.iter().enumerate() {
            h.protocol.stake(staker(&format!("staker-{}", i)), Amount::from_tokens(*tokens)).unwrap();
        }
        let key = h.activate(1);
        let deposited = h.protocol.deposit_to_eth2(&key, 0).is_ok();
        let validators = u64::from(deposited);

        let mut beacon: i128 = if deposited { 32_000_000_000 } else { 0 };
        for (frame, delta) in deltas.iter().enumerate() {
            let price_before = h.protocol.share_price();
            let nonce = h.protocol.current_nonce();
            beacon = (beacon + *delta as i128 * 1_000_000).max(0);
            let value = Amount::from_gwei(beacon as u64);

            let receipt = h.protocol
                .submit_report(&h.oracle(0), value, nonce, validators, h.frame(frame as u64 + 1))
                .unwrap();
            let settlement = receipt.settlement.unwrap();

            prop_assert_eq!(h.protocol.current_nonce(), nonce + 1);
            prop_assert!(h.protocol.is_balanced());
            match &settlement.delta {
                BalanceDelta::Reward(reward) => {
                    prop_assert!(h.protocol.share_price() >= price_before);
                    prop_assert!(&settlement.commission_value() <= reward);
                }
                BalanceDelta::Loss(_) => prop_assert!(h.protocol.share_price() <= price_before),
                BalanceDelta::Flat => prop_assert_eq!(h.protocol.share_price(), price_before),
            }
        }
    }
}
