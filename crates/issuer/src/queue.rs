// issuer/src/queue.rs

use crate::{limits::PendingLimit, IssuerError, IssuerResult};
use accounting::{PoolAccounting, SharePrice};
use consensus::{ValidatorRegistry, ValidatorState};
use serde::{Deserialize, Serialize};
use staking_core::{Amount, BasisPoints, DepositData, Shares, Timestamp, UNITS_PER_GWEI};
use staking_crypto::{Address, BlsPublicKey};

/// Stakes of at least this many tokens (10^32 base units) go through the
/// pending-validator gate; the default leaves every stake ungated
pub const DEFAULT_MIN_ACTIVATING_DEPOSIT_TOKENS: u64 = 100_000_000_000_000;

/// Shares owed to a staker; minted by the caller after commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StakeReceipt {
    pub staker: Address,
    pub amount: Amount,
    pub shares: Shares,
    /// Price the shares were issued at
    pub price: SharePrice,
}

/// A validator committed from the queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReceipt {
    /// Payload for the deposit contract
    pub deposit: DepositData,
    /// Ordinal among all committed validators
    pub deposit_index: u64,
    pub registry_index: u64,
}

/// Undeployed funds waiting for an ACTIVE validator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositQueue {
    undeployed_balance: Amount,
    pending_limit: PendingLimit,
    min_activating_deposit: Amount,
}

impl Default for DepositQueue {
    fn default() -> Self {
        Self {
            undeployed_balance: Amount::zero(),
            pending_limit: PendingLimit::default(),
            min_activating_deposit: Amount::from_tokens(DEFAULT_MIN_ACTIVATING_DEPOSIT_TOKENS),
        }
    }
}

impl DepositQueue {
    pub fn new(pending_limit_bps: BasisPoints, min_activating_deposit: Amount) -> IssuerResult<Self> {
        let mut queue = Self {
            pending_limit: PendingLimit::new(pending_limit_bps)?,
            ..Self::default()
        };
        queue.set_min_activating_deposit(min_activating_deposit)?;
        Ok(queue)
    }

    /// Resume with funds already held (deployment bootstrap)
    pub fn with_undeployed(mut self, undeployed: Amount) -> Self {
        self.undeployed_balance = undeployed;
        self
    }

    /// Staked funds not yet committed to a validator
    pub fn undeployed_balance(&self) -> &Amount {
        &self.undeployed_balance
    }

    pub fn pending_limit(&self) -> PendingLimit {
        self.pending_limit
    }

    /// Stake size from which the pending-validator limit applies
    pub fn min_activating_deposit(&self) -> &Amount {
        &self.min_activating_deposit
    }

    pub fn set_pending_validators_limit(&mut self, bps: BasisPoints) -> IssuerResult<()> {
        self.pending_limit = PendingLimit::new(bps)?;
        tracing::info!("Pending validator limit set to {} bps", bps);
        Ok(())
    }

    pub fn set_min_activating_deposit(&mut self, amount: Amount) -> IssuerResult<()> {
        let floor = Amount::from_u64(UNITS_PER_GWEI);
        if amount < floor {
            return Err(IssuerError::InvalidLimit(format!(
                "minimum deposit {} is below one gwei",
                amount
            )));
        }
        tracing::info!("Minimum activating deposit set to {}", amount.format_tokens());
        self.min_activating_deposit = amount;
        Ok(())
    }

    /// Accept `amount` into the pool and price the shares it buys
    ///
    /// Stakes of at least `min_activating_deposit` are refused while the
    /// pending-validator limit is exhausted; smaller stakes always mint.
    pub fn stake(
        &mut self,
        pool: &mut PoolAccounting,
        staker: Address,
        amount: Amount,
        supply: &Shares,
    ) -> IssuerResult<StakeReceipt> {
        if amount.is_zero() {
            return Err(IssuerError::ZeroStake);
        }
        if amount >= self.min_activating_deposit {
            self.pending_limit.check(pool.deposited_validators(), pool.reported_validators())?;
        }

        let price = pool.share_price(supply);
        let shares = pool.shares_for_deposit(&amount, supply)?;

        pool.record_stake(&amount);
        self.undeployed_balance = self.undeployed_balance.clone() + amount.clone();

        tracing::debug!(
            "Stake of {} from {} buys {} shares at {}",
            amount.format_tokens(),
            staker,
            shares.format_tokens(),
            price
        );

        Ok(StakeReceipt { staker, amount, shares, price })
    }

    /// Commit one chunk of undeployed funds to an ACTIVE validator
    pub fn deposit_to_eth2(
        &mut self,
        pool: &mut PoolAccounting,
        registry: &mut ValidatorRegistry,
        pubkey: &BlsPublicKey,
        now: Timestamp,
    ) -> IssuerResult<CommitReceipt> {
        let record = registry.require(pubkey)?;
        let chunk = Amount::deposit_size();

        if self.undeployed_balance < chunk {
            return Err(IssuerError::InsufficientPooled {
                required: chunk,
                available: self.undeployed_balance.clone(),
            });
        }
        match record.state {
            ValidatorState::Active => {}
            ValidatorState::Deposited => {
                return Err(IssuerError::ValidatorAlreadyDeposited(pubkey.to_hex()));
            }
            state => {
                return Err(IssuerError::ValidatorNotActive {
                    pubkey: pubkey.to_hex(),
                    state: state.to_string(),
                });
            }
        }
        self.pending_limit.check(pool.deposited_validators(), pool.reported_validators())?;

        let deposit = DepositData {
            pubkey: record.pubkey.clone(),
            withdrawal_credentials: record.withdrawal_credentials,
            signature: record.signature.clone(),
            amount: chunk.clone(),
        };
        let registry_index = record.registry_index;

        self.undeployed_balance = self.undeployed_balance.clone() - chunk.clone();
        let deposit_index = pool.record_commit(&chunk);
        registry.mark_deposited(pubkey, deposit_index, now)?;

        tracing::info!(
            "Committed validator {} as deposit #{} ({} undeployed)",
            pubkey,
            deposit_index,
            self.undeployed_balance.format_tokens()
        );

        Ok(CommitReceipt { deposit, deposit_index, registry_index })
    }
}
