// accounting/src/commission.rs

use crate::{AccountingError, AccountingResult};
use serde::{Deserialize, Serialize};
use staking_core::{Amount, BasisPoints, Shares, MAX_BPS};
use staking_crypto::Address;

/// Share of each reward diverted to the two commission recipients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionConfig {
    pub treasury_bps: BasisPoints,
    pub operator_bps: BasisPoints,
    /// Protocol treasury
    pub treasury: Address,
    /// Node-operator reward pool
    pub operator_pool: Address,
}

impl Default for CommissionConfig {
    fn default() -> Self {
        Self {
            treasury_bps: 0,
            operator_bps: 0,
            treasury: Address::zero(),
            operator_pool: Address::zero(),
        }
    }
}

impl CommissionConfig {
    pub fn validate_rates(treasury_bps: BasisPoints, operator_bps: BasisPoints) -> AccountingResult<()> {
        let total = treasury_bps as u32 + operator_bps as u32;
        if treasury_bps > MAX_BPS || operator_bps > MAX_BPS || total > MAX_BPS as u32 {
            return Err(AccountingError::InvalidCommission { treasury_bps, operator_bps });
        }
        Ok(())
    }

    pub fn set_rates(&mut self, treasury_bps: BasisPoints, operator_bps: BasisPoints) -> AccountingResult<()> {
        Self::validate_rates(treasury_bps, operator_bps)?;
        self.treasury_bps = treasury_bps;
        self.operator_bps = operator_bps;
        Ok(())
    }

    pub fn set_recipients(&mut self, treasury: Address, operator_pool: Address) -> AccountingResult<()> {
        if treasury.is_zero() {
            return Err(AccountingError::InvalidRecipient("treasury is the zero address".into()));
        }
        if operator_pool.is_zero() {
            return Err(AccountingError::InvalidRecipient("operator pool is the zero address".into()));
        }
        self.treasury = treasury;
        self.operator_pool = operator_pool;
        Ok(())
    }

    pub fn total_bps(&self) -> u32 {
        self.treasury_bps as u32 + self.operator_bps as u32
    }

    /// Recipients paired with their rates, skipping zero rates
    pub(crate) fn entitlements(&self) -> impl Iterator<Item = (Address, BasisPoints)> + '_ {
        [(self.treasury, self.treasury_bps), (self.operator_pool, self.operator_bps)]
            .into_iter()
            .filter(|(_, bps)| *bps > 0)
    }
}

/// Commission shares owed to one recipient for a reward epoch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionMint {
    pub recipient: Address,
    pub bps: BasisPoints,
    /// Portion of the reward the recipient is entitled to
    pub value: Amount,
    /// Shares minted for `value` at the pre-update price
    pub shares: Shares,
}
