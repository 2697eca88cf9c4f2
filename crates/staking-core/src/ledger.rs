// staking-core/src/ledger.rs

use crate::{types::Shares, CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use staking_crypto::Address;
use std::collections::HashMap;

/// Fungible claim-token ledger consumed by the protocol
pub trait ShareLedger {
    fn mint(&mut self, to: &Address, shares: &Shares) -> CoreResult<()>;
    fn burn(&mut self, from: &Address, shares: &Shares) -> CoreResult<()>;
    fn total_supply(&self) -> Shares;
    fn balance_of(&self, account: &Address) -> Shares;
}

/// In-memory claim-token balances
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryLedger {
    balances: HashMap<Address, Shares>,
    total_supply: Shares,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of accounts holding a non-zero balance
    pub fn holder_count(&self) -> usize {
        self.balances.values().filter(|b| !b.is_zero()).count()
    }
}

impl ShareLedger for MemoryLedger {
    fn mint(&mut self, to: &Address, shares: &Shares) -> CoreResult<()> {
        let balance = self.balances.entry(*to).or_insert_with(Shares::zero);
        *balance = balance.checked_add(shares)
            .ok_or_else(|| CoreError::LedgerError("Balance overflow".into()))?;
        self.total_supply = self.total_supply.checked_add(shares)
            .ok_or_else(|| CoreError::LedgerError("Supply overflow".into()))?;
        Ok(())
    }

    fn burn(&mut self, from: &Address, shares: &Shares) -> CoreResult<()> {
        let available = self.balance_of(from);
        let remaining = available.checked_sub(shares)
            .ok_or_else(|| CoreError::InsufficientShares {
                required: shares.clone(),
                available: available.clone(),
            })?;
        self.total_supply = self.total_supply.checked_sub(shares)
            .ok_or_else(|| CoreError::LedgerError("Supply underflow".into()))?;
        self.balances.insert(*from, remaining);
        Ok(())
    }

    fn total_supply(&self) -> Shares {
        self.total_supply.clone()
    }

    fn balance_of(&self, account: &Address) -> Shares {
        self.balances.get(account).cloned().unwrap_or_else(Shares::zero)
    }
}
