// node/src/runtime.rs
use crate::{NodeConfig, ProtocolError, ProtocolResult};
use accounting::{CommissionConfig, PoolAccounting, Settlement, SharePrice};
use consensus::{
    ActivationConsensus, ActivationOutcome, BeaconSchedule, FinalizedReport, MemberSlot,
    OracleMembers, PlausibilityWindow, ReportConsensus, ReportOutcome, ReportTuple,
    ValidatorRecord, ValidatorRegistry, ValidatorState,
};
use issuer::{CommitReceipt, DepositQueue, StakeReceipt};
use serde::{Deserialize, Serialize};
use staking_core::{
    Amount, BasisPoints, Capability, DepositContract, Nonce, PermissionOracle, ShareLedger,
    Shares, Timestamp,
};
use staking_crypto::{Address, BlsPublicKey, BlsSignature, WithdrawalCredentials};
use std::collections::BTreeMap;

/// All protocol-owned state; cloned as the checkpoint of each transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolState {
    members: OracleMembers,
    registry: ValidatorRegistry,
    reports: ReportConsensus,
    activation: ActivationConsensus,
    schedule: BeaconSchedule,
    pool: PoolAccounting,
    queue: DepositQueue,
}

impl ProtocolState {
    pub fn from_config(config: &NodeConfig) -> ProtocolResult<Self> {
        let protocol = &config.protocol;
        let roles = &config.roles;

        config.beacon.validate()?;

        let mut members = OracleMembers::new();
        for member in roles.oracle_members()? {
            members.add(member)?;
        }

        let credentials = WithdrawalCredentials::for_address(&roles.withdrawal_address()?);
        let registry = ValidatorRegistry::new(credentials);

        let bootstrap = config.bootstrap.to_state();
        let mut reports = ReportConsensus::new(protocol.report_quorum)?
            .with_last_finalized_epoch(bootstrap.last_report_epoch);
        reports.update_quorum(protocol.report_quorum, members.len())?;
        let mut activation = ActivationConsensus::new(
            protocol.validator_quorum,
            protocol.activation_cooldown_secs,
        )?;
        activation.update_quorum(protocol.validator_quorum, members.len())?;

        let mut pool = PoolAccounting::new(CommissionConfig::default())?;
        pool.set_commission_recipients(roles.treasury()?, roles.operator_pool()?)?;
        pool.update_commissions(protocol.treasury_commission_bps, protocol.operator_commission_bps)?;
        pool.bootstrap(&bootstrap, &Amount::zero())?;

        let queue = DepositQueue::new(
            protocol.pending_validators_limit_bps,
            protocol.min_activating_deposit(),
        )?;

        Ok(Self {
            members,
            registry,
            reports,
            activation,
            schedule: config.beacon,
            pool,
            queue,
        })
    }
}

/// Result of a report submission
#[derive(Debug, Clone)]
pub struct ReportReceipt {
    pub outcome: ReportOutcome,
    /// Present when the submission completed a quorum
    pub settlement: Option<Settlement>,
}

/// Read-only summary for operators
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolStatus {
    pub nonce: Nonce,
    pub report_quorum: u32,
    pub validator_quorum: u32,
    pub oracle_members: Vec<String>,
    pub share_price: String,
    pub total_pooled_value: String,
    pub undeployed_balance: String,
    pub beacon_value: String,
    pub committed_since_report: String,
    pub total_supply: String,
    pub deposited_validators: u64,
    pub reported_validators: u64,
    pub validators: BTreeMap<String, usize>,
    pub treasury_commission_bps: BasisPoints,
    pub operator_commission_bps: BasisPoints,
    pub pending_validators_limit_bps: BasisPoints,
    pub last_report_epoch: Option<u64>,
    pub last_report_at: Option<String>,
}

/// The protocol: owned state plus its external collaborators
pub struct Protocol<L, P, D> {
    state: ProtocolState,
    ledger: L,
    permissions: P,
    deposits: D,
}

impl<L, P, D> Protocol<L, P, D>
where
    L: ShareLedger,
    P: PermissionOracle,
    D: DepositContract,
{
    pub fn new(state: ProtocolState, ledger: L, permissions: P, deposits: D) -> Self {
        Self {
            state,
            ledger,
            permissions,
            deposits,
        }
    }

    pub fn from_config(config: &NodeConfig, ledger: L, permissions: P, deposits: D) -> ProtocolResult<Self> {
        let state = ProtocolState::from_config(config)?;
        tracing::info!(
            "Protocol initialized: {} oracle members, report quorum {}, validator quorum {}",
            state.members.len(),
            state.reports.quorum(),
            state.activation.quorum()
        );
        Ok(Self::new(state, ledger, permissions, deposits))
    }

    pub fn into_parts(self) -> (ProtocolState, L, P, D) {
        (self.state, self.ledger, self.permissions, self.deposits)
    }

    pub fn state(&self) -> &ProtocolState {
        &self.state
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn permissions(&self) -> &P {
        &self.permissions
    }

    pub fn deposits(&self) -> &D {
        &self.deposits
    }

    // Governor operations

    pub fn add_oracle_member(&mut self, caller: &Address, member: Address) -> ProtocolResult<MemberSlot> {
        self.require(caller, Capability::Governor)?;
        let slot = self.state.members.add(member)?;
        tracing::info!("Oracle member {} added in slot {}", member, slot.index());
        Ok(slot)
    }

    /// Remove a member and erase every vote it has open
    pub fn remove_oracle_member(&mut self, caller: &Address, member: &Address) -> ProtocolResult<()> {
        self.require(caller, Capability::Governor)?;
        let state = &mut self.state;
        let slot = state.members.remove(member)?;
        state.reports.forget_member(member, slot);
        state.registry.clear_member_votes(slot);
        state.activation.forget_member(member);

        let remaining = state.members.len();
        if state.reports.quorum() as usize > remaining || state.activation.quorum() as usize > remaining {
            tracing::warn!("Quorum now exceeds the {} remaining oracle members", remaining);
        }
        tracing::info!("Oracle member {} removed from slot {}", member, slot.index());
        Ok(())
    }

    /// Change the report quorum, finalizing the live nonce if an open
    /// tally already meets the new threshold
    pub fn update_report_quorum(
        &mut self,
        caller: &Address,
        quorum: u32,
        now: Timestamp,
    ) -> ProtocolResult<Option<ReportReceipt>> {
        self.require(caller, Capability::Governor)?;
        self.atomically(|p| {
            let members = p.state.members.len();
            p.state.reports.update_quorum(quorum, members)?;
            tracing::info!("Report quorum set to {}", quorum);

            let Some(report) = p.state.reports.finalize_pending(now) else {
                return Ok(None);
            };
            let settlement = p.settle(&report)?;
            Ok(Some(ReportReceipt {
                outcome: ReportOutcome::QuorumReached(report),
                settlement: Some(settlement),
            }))
        })
    }

    pub fn update_validator_quorum(&mut self, caller: &Address, quorum: u32) -> ProtocolResult<()> {
        self.require(caller, Capability::Governor)?;
        let members = self.state.members.len();
        self.state.activation.update_quorum(quorum, members)?;
        tracing::info!("Validator quorum set to {}", quorum);
        Ok(())
    }

    pub fn update_commissions(
        &mut self,
        caller: &Address,
        treasury_bps: BasisPoints,
        operator_bps: BasisPoints,
    ) -> ProtocolResult<()> {
        self.require(caller, Capability::Governor)?;
        self.state.pool.update_commissions(treasury_bps, operator_bps)?;
        tracing::info!("Commissions set to treasury {} bps, operators {} bps", treasury_bps, operator_bps);
        Ok(())
    }

    pub fn set_commission_recipients(
        &mut self,
        caller: &Address,
        treasury: Address,
        operator_pool: Address,
    ) -> ProtocolResult<()> {
        self.require(caller, Capability::Governor)?;
        self.state.pool.set_commission_recipients(treasury, operator_pool)?;
        Ok(())
    }

    pub fn update_beacon_schedule(&mut self, caller: &Address, schedule: BeaconSchedule) -> ProtocolResult<()> {
        self.require(caller, Capability::Governor)?;
        schedule.validate()?;
        self.state.schedule = schedule;
        tracing::info!(
            "Beacon schedule set: {} epochs/frame, {} slots/epoch, {}s/slot, genesis {}",
            schedule.epochs_per_frame,
            schedule.slots_per_epoch,
            schedule.seconds_per_slot,
            schedule.genesis_time
        );
        Ok(())
    }

    pub fn set_pending_validators_limit(&mut self, caller: &Address, bps: BasisPoints) -> ProtocolResult<()> {
        self.require(caller, Capability::Governor)?;
        self.state.queue.set_pending_validators_limit(bps)?;
        Ok(())
    }

    pub fn set_min_activating_deposit(&mut self, caller: &Address, amount: Amount) -> ProtocolResult<()> {
        self.require(caller, Capability::Governor)?;
        self.state.queue.set_min_activating_deposit(amount)?;
        Ok(())
    }

    pub fn set_activation_cooldown(&mut self, caller: &Address, cooldown_secs: u64) -> ProtocolResult<()> {
        self.require(caller, Capability::Governor)?;
        self.state.activation.set_cooldown(cooldown_secs);
        Ok(())
    }

    // Key admin and node operator operations

    pub fn set_withdrawal_credentials(
        &mut self,
        caller: &Address,
        credentials: WithdrawalCredentials,
    ) -> ProtocolResult<()> {
        self.require(caller, Capability::KeyAdmin)?;
        self.state.registry.set_withdrawal_credentials(credentials);
        tracing::info!("Withdrawal credentials set to {}", credentials.to_hex());
        Ok(())
    }

    /// Register a validator key; returns its registry index
    pub fn add_validator(
        &mut self,
        caller: &Address,
        pubkey: BlsPublicKey,
        signature: BlsSignature,
        withdrawal_credentials: WithdrawalCredentials,
        now: Timestamp,
    ) -> ProtocolResult<u64> {
        self.require(caller, Capability::NodeOperator)?;
        let index = self.state.registry.register(
            pubkey.clone(),
            signature,
            withdrawal_credentials,
            *caller,
            now,
        )?;
        tracing::info!("Validator {} registered at index {} by {}", pubkey, index, caller);
        Ok(index)
    }

    // Oracle member operations

    pub fn submit_report(
        &mut self,
        caller: &Address,
        total_reported_value: Amount,
        epoch_nonce: Nonce,
        observed_validator_count: u64,
        now: Timestamp,
    ) -> ProtocolResult<ReportReceipt> {
        self.atomically(|p| {
            let state = &mut p.state;
            let window = PlausibilityWindow {
                deposited_validators: state.pool.deposited_validators(),
                reported_validators: state.pool.reported_validators(),
            };
            let tuple = ReportTuple::new(total_reported_value, observed_validator_count);
            let outcome = state.reports.submit(
                &state.members,
                caller,
                epoch_nonce,
                tuple,
                now,
                &state.schedule,
                &window,
            )?;

            let finalized = match &outcome {
                ReportOutcome::QuorumReached(report) => Some(report.clone()),
                ReportOutcome::Recorded { .. } => None,
            };
            let Some(report) = finalized else {
                return Ok(ReportReceipt { outcome, settlement: None });
            };

            let settlement = p.settle(&report)?;
            Ok(ReportReceipt { outcome, settlement: Some(settlement) })
        })
    }

    pub fn activate_validators(
        &mut self,
        caller: &Address,
        pubkeys: &[BlsPublicKey],
        now: Timestamp,
    ) -> ProtocolResult<ActivationOutcome> {
        self.atomically(|p| {
            let state = &mut p.state;
            let outcome = state.activation.activate(
                &state.members,
                &mut state.registry,
                caller,
                pubkeys,
                now,
            )?;
            Ok(outcome)
        })
    }

    // User operations

    pub fn stake(&mut self, staker: Address, amount: Amount) -> ProtocolResult<StakeReceipt> {
        self.atomically(|p| {
            let supply = p.ledger.total_supply();
            let receipt = p.state.queue.stake(&mut p.state.pool, staker, amount, &supply)?;
            p.ledger.mint(&receipt.staker, &receipt.shares)?;
            Ok(receipt)
        })
    }

    /// Commit one chunk to an ACTIVE validator; permissionless
    pub fn deposit_to_eth2(&mut self, pubkey: &BlsPublicKey, now: Timestamp) -> ProtocolResult<CommitReceipt> {
        self.atomically(|p| {
            let state = &mut p.state;
            let receipt = state.queue.deposit_to_eth2(&mut state.pool, &mut state.registry, pubkey, now)?;
            p.deposits.deposit(&receipt.deposit)?;
            Ok(receipt)
        })
    }

    // Read-only accessors

    /// Nonce the next report must carry
    pub fn current_nonce(&self) -> Nonce {
        self.state.reports.current_nonce()
    }

    pub fn report_quorum(&self) -> u32 {
        self.state.reports.quorum()
    }

    pub fn validator_quorum(&self) -> u32 {
        self.state.activation.quorum()
    }

    /// Seconds a member waits between activation votes
    pub fn activation_cooldown(&self) -> u64 {
        self.state.activation.cooldown_secs()
    }

    pub fn oracle_members(&self) -> Vec<Address> {
        self.state.members.members()
    }

    /// Oracle-member capability is answered by the member set itself
    pub fn is_oracle_member(&self, principal: &Address) -> bool {
        self.state.members.contains(principal)
    }

    /// Price of one share at the current supply
    pub fn share_price(&self) -> SharePrice {
        self.state.pool.share_price(&self.ledger.total_supply())
    }

    pub fn total_pooled_value(&self) -> &Amount {
        self.state.pool.total_pooled_value()
    }

    /// Staked value not yet committed to a validator
    pub fn undeployed_balance(&self) -> &Amount {
        self.state.queue.undeployed_balance()
    }

    pub fn pool(&self) -> &PoolAccounting {
        &self.state.pool
    }

    pub fn queue(&self) -> &DepositQueue {
        &self.state.queue
    }

    pub fn validator(&self, pubkey: &BlsPublicKey) -> Option<&ValidatorRecord> {
        self.state.registry.get(pubkey)
    }

    /// Registered validators in registration order
    pub fn validators(&self) -> &[ValidatorRecord] {
        self.state.registry.records()
    }

    pub fn withdrawal_credentials(&self) -> &WithdrawalCredentials {
        self.state.registry.withdrawal_credentials()
    }

    pub fn beacon_schedule(&self) -> &BeaconSchedule {
        &self.state.schedule
    }

    /// Most recently finalized report, if any
    pub fn last_report(&self) -> Option<&FinalizedReport> {
        self.state.reports.last_finalized()
    }

    /// Value currently redeemable for an account's shares
    pub fn value_of(&self, account: &Address) -> Amount {
        let shares = self.ledger.balance_of(account);
        self.state.pool.value_of(&shares, &self.ledger.total_supply())
    }

    /// Whether pooled value equals undeployed + reported + in-flight principal
    pub fn is_balanced(&self) -> bool {
        self.state.pool.is_balanced(self.state.queue.undeployed_balance())
    }

    pub fn status(&self) -> ProtocolStatus {
        let pool = &self.state.pool;
        let commission = pool.commission();
        let price = self.share_price();

        let validators = [
            ValidatorState::Registered,
            ValidatorState::Activating,
            ValidatorState::Active,
            ValidatorState::Deposited,
        ]
        .into_iter()
        .map(|s| (s.to_string(), self.state.registry.count_in_state(s)))
        .collect();

        let last = self.state.reports.last_finalized();

        ProtocolStatus {
            nonce: self.current_nonce(),
            report_quorum: self.report_quorum(),
            validator_quorum: self.validator_quorum(),
            oracle_members: self.oracle_members().iter().map(Address::to_hex).collect(),
            share_price: price.to_decimal()
                .map(|d| d.round_dp(9).normalize().to_string())
                .unwrap_or_else(|| price.to_string()),
            total_pooled_value: pool.total_pooled_value().format_tokens(),
            undeployed_balance: self.undeployed_balance().format_tokens(),
            beacon_value: pool.beacon_value().format_tokens(),
            committed_since_report: pool.committed_since_report().format_tokens(),
            total_supply: self.ledger.total_supply().format_tokens(),
            deposited_validators: pool.deposited_validators(),
            reported_validators: pool.reported_validators(),
            validators,
            treasury_commission_bps: commission.treasury_bps,
            operator_commission_bps: commission.operator_bps,
            pending_validators_limit_bps: self.state.queue.pending_limit().bps(),
            last_report_epoch: self.state.reports.last_finalized_epoch(),
            last_report_at: last
                .and_then(|r| chrono::DateTime::from_timestamp(r.finalized_at as i64, 0))
                .map(|t| t.to_rfc3339()),
        }
    }

    fn require(&self, caller: &Address, capability: Capability) -> ProtocolResult<()> {
        if self.permissions.has_capability(caller, capability) {
            Ok(())
        } else {
            Err(ProtocolError::Unauthorized {
                principal: *caller,
                capability,
            })
        }
    }

    /// Run `op` as one transaction: on error the local state is restored
    fn atomically<T>(&mut self, op: impl FnOnce(&mut Self) -> ProtocolResult<T>) -> ProtocolResult<T> {
        let checkpoint = self.state.clone();
        let result = op(self);
        if let Err(err) = &result {
            self.state = checkpoint;
            tracing::debug!("Call reverted ({:?}): {}", err.category(), err);
        }
        result
    }

    /// Apply a finalized report to the pool and mint its commission
    fn settle(&mut self, report: &FinalizedReport) -> ProtocolResult<Settlement> {
        let supply = self.ledger.total_supply();
        let settlement = self.state.pool.finalize(
            &report.tuple.total_reported_value,
            report.tuple.observed_validator_count,
            report.epochs_elapsed,
            &supply,
        )?;

        let mints: Vec<(Address, Shares)> = settlement.commissions.iter()
            .map(|mint| (mint.recipient, mint.shares.clone()))
            .collect();
        self.mint_all(&mints)?;
        Ok(settlement)
    }

    /// Mint every entry or none; earlier mints are burned back on failure
    fn mint_all(&mut self, mints: &[(Address, Shares)]) -> ProtocolResult<()> {
        for (done, (to, shares)) in mints.iter().enumerate() {
            if let Err(err) = self.ledger.mint(to, shares) {
                for (to, shares) in &mints[..done] {
                    if let Err(undo) = self.ledger.burn(to, shares) {
                        tracing::error!("Failed to undo mint of {} to {}: {}", shares, to, undo);
                    }
                }
                return Err(err.into());
            }
        }
        Ok(())
    }
}
