// accounting/src/pool.rs

use crate::{
    commission::{CommissionConfig, CommissionMint},
    price::{shares_for_value, value_of_shares, SharePrice},
    AccountingError, AccountingResult,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use staking_core::{Amount, BasisPoints, Epoch, Shares};
use staking_crypto::Address;

const SECONDS_PER_YEAR: u64 = 365 * 24 * 60 * 60;

/// Accounting values carried over from an earlier deployment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapState {
    /// Remote balance at the last report before this deployment
    pub beacon_value: Amount,
    pub deposited_validators: u64,
    pub reported_validators: u64,
    pub last_report_epoch: Option<Epoch>,
}

/// Reported balance relative to what the pool expected without loss
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BalanceDelta {
    Reward(Amount),
    Loss(Amount),
    Flat,
}

impl BalanceDelta {
    /// True for a non-negative delta
    pub fn is_reward(&self) -> bool {
        matches!(self, BalanceDelta::Reward(_))
    }
}

impl std::fmt::Display for BalanceDelta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BalanceDelta::Reward(value) => write!(f, "+{}", value.format_tokens()),
            BalanceDelta::Loss(value) => write!(f, "-{}", value.format_tokens()),
            BalanceDelta::Flat => write!(f, "0"),
        }
    }
}

/// Effects of one finalized report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub delta: BalanceDelta,
    /// Commission owed per recipient; minted by the caller after commit
    pub commissions: Vec<CommissionMint>,
    pub price_before: SharePrice,
    pub price_after: SharePrice,
    pub total_pooled_value: Amount,
    pub observed_validators: u64,
    pub epochs_elapsed: u64,
}

impl Settlement {
    /// Shares minted across all commission recipients
    pub fn commission_shares(&self) -> Shares {
        self.commissions.iter()
            .fold(Amount::zero(), |acc, mint| acc + mint.shares.clone())
    }

    pub fn commission_value(&self) -> Amount {
        self.commissions.iter()
            .fold(Amount::zero(), |acc, mint| acc + mint.value.clone())
    }

    /// Price change extrapolated to a year, e.g. `0.05` for 5%
    pub fn annualized_rate(&self, seconds_per_epoch: u64) -> Option<Decimal> {
        let before = self.price_before.to_decimal()?;
        let after = self.price_after.to_decimal()?;
        let elapsed = self.epochs_elapsed.checked_mul(seconds_per_epoch)?;
        if before.is_zero() || elapsed == 0 {
            return None;
        }
        let change = after.checked_sub(before)?.checked_div(before)?;
        change.checked_mul(Decimal::from(SECONDS_PER_YEAR))?
            .checked_div(Decimal::from(elapsed))
    }
}

/// Value backing the claim token
///
/// `total_pooled_value` always equals the undeployed balance plus
/// `beacon_value` plus `committed_since_report`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolAccounting {
    total_pooled_value: Amount,
    /// Remote balance from the last finalized report
    beacon_value: Amount,
    /// Principal committed to validators since the last finalized report
    committed_since_report: Amount,
    deposited_validators: u64,
    reported_validators: u64,
    commission: CommissionConfig,
}

impl PoolAccounting {
    pub fn new(commission: CommissionConfig) -> AccountingResult<Self> {
        CommissionConfig::validate_rates(commission.treasury_bps, commission.operator_bps)?;
        Ok(Self {
            commission,
            ..Self::default()
        })
    }

    /// Seed from carried-over values; the undeployed balance is counted in the pool
    pub fn bootstrap(&mut self, state: &BootstrapState, undeployed: &Amount) -> AccountingResult<()> {
        if state.reported_validators > state.deposited_validators {
            return Err(AccountingError::InvariantViolation(format!(
                "{} reported validators exceed {} deposited",
                state.reported_validators, state.deposited_validators
            )));
        }
        self.beacon_value = state.beacon_value.clone();
        self.committed_since_report = Amount::zero();
        self.deposited_validators = state.deposited_validators;
        self.reported_validators = state.reported_validators;
        self.total_pooled_value = undeployed.clone() + state.beacon_value.clone();
        Ok(())
    }

    /// Undeployed, in-flight and remote value combined
    pub fn total_pooled_value(&self) -> &Amount {
        &self.total_pooled_value
    }

    /// Remote balance carried by the last finalized report
    pub fn beacon_value(&self) -> &Amount {
        &self.beacon_value
    }

    /// Principal committed since the last finalized report
    pub fn committed_since_report(&self) -> &Amount {
        &self.committed_since_report
    }

    /// Validators the pool has ever committed a deposit for
    pub fn deposited_validators(&self) -> u64 {
        self.deposited_validators
    }

    /// Validator count from the last finalized report
    pub fn reported_validators(&self) -> u64 {
        self.reported_validators
    }

    /// Current commission rates and recipients
    pub fn commission(&self) -> &CommissionConfig {
        &self.commission
    }

    /// Value of one share against `supply`
    pub fn share_price(&self, supply: &Shares) -> SharePrice {
        SharePrice::compute(&self.total_pooled_value, supply)
    }

    /// Shares minted for a deposit of `amount` at the current price
    pub fn shares_for_deposit(&self, amount: &Amount, supply: &Shares) -> AccountingResult<Shares> {
        shares_for_value(amount, supply, &self.total_pooled_value)
    }

    /// Pool value redeemable for `shares`
    pub fn value_of(&self, shares: &Shares, supply: &Shares) -> Amount {
        value_of_shares(shares, supply, &self.total_pooled_value)
    }

    /// Count newly staked funds in the pool
    pub fn record_stake(&mut self, amount: &Amount) {
        self.total_pooled_value = self.total_pooled_value.clone() + amount.clone();
    }

    /// Move one validator's principal from undeployed to in-flight; returns its deposit ordinal
    pub fn record_commit(&mut self, amount: &Amount) -> u64 {
        let ordinal = self.deposited_validators;
        self.committed_since_report = self.committed_since_report.clone() + amount.clone();
        self.deposited_validators += 1;
        ordinal
    }

    pub fn update_commissions(&mut self, treasury_bps: BasisPoints, operator_bps: BasisPoints) -> AccountingResult<()> {
        self.commission.set_rates(treasury_bps, operator_bps)
    }

    pub fn set_commission_recipients(&mut self, treasury: Address, operator_pool: Address) -> AccountingResult<()> {
        self.commission.set_recipients(treasury, operator_pool)
    }

    /// Whether the pooled value matches its components
    pub fn is_balanced(&self, undeployed: &Amount) -> bool {
        let components = undeployed.clone()
            + self.beacon_value.clone()
            + self.committed_since_report.clone();
        components == self.total_pooled_value
    }

    /// Apply a finalized report
    ///
    /// Commission is valued against the price before this report, so minting
    /// it never dilutes the reward it is paid from. Loss epochs mint nothing.
    pub fn finalize(
        &mut self,
        reported_value: &Amount,
        observed_validators: u64,
        epochs_elapsed: u64,
        supply: &Shares,
    ) -> AccountingResult<Settlement> {
        let expected = self.beacon_value.clone() + self.committed_since_report.clone();
        let price_before = self.share_price(supply);
        let pooled_before = self.total_pooled_value.clone();

        let (delta, commissions) = if *reported_value > expected {
            let reward = reported_value.clone() - expected;
            let commissions = self.commission_for(&reward, supply, &pooled_before);
            self.total_pooled_value = pooled_before.clone() + reward.clone();
            (BalanceDelta::Reward(reward), commissions)
        } else if *reported_value < expected {
            let loss = expected - reported_value.clone();
            self.total_pooled_value = pooled_before.checked_sub(&loss).ok_or_else(|| {
                AccountingError::InvariantViolation(format!(
                    "loss {} exceeds pooled value {}",
                    loss, pooled_before
                ))
            })?;
            tracing::warn!(
                "Loss epoch: remote balance fell {} below expected",
                loss.format_tokens()
            );
            (BalanceDelta::Loss(loss), Vec::new())
        } else {
            (BalanceDelta::Flat, Vec::new())
        };

        self.beacon_value = reported_value.clone();
        self.committed_since_report = Amount::zero();
        self.reported_validators = observed_validators;

        let minted = commissions.iter()
            .fold(Amount::zero(), |acc, mint| acc + mint.shares.clone());
        let price_after = SharePrice::compute(&self.total_pooled_value, &(supply.clone() + minted));

        tracing::info!(
            "Report settled: delta {} over {} epochs, price {} -> {}",
            delta,
            epochs_elapsed,
            price_before,
            price_after
        );

        Ok(Settlement {
            delta,
            commissions,
            price_before,
            price_after,
            total_pooled_value: self.total_pooled_value.clone(),
            observed_validators,
            epochs_elapsed,
        })
    }

    fn commission_for(&self, reward: &Amount, supply: &Shares, pooled_before: &Amount) -> Vec<CommissionMint> {
        if supply.is_zero() || pooled_before.is_zero() {
            return Vec::new();
        }

        let mut mints = Vec::new();
        for (recipient, bps) in self.commission.entitlements() {
            if recipient.is_zero() {
                tracing::warn!("Commission of {} bps has no recipient; left in the pool", bps);
                continue;
            }
            let value = reward.bps(bps);
            let shares = match value.mul_div(supply, pooled_before) {
                Some(shares) if !shares.is_zero() => shares,
                _ => continue,
            };
            mints.push(CommissionMint { recipient, bps, value, shares });
        }
        mints
    }
}
