// staking-core/src/deposit.rs

use crate::{types::Amount, CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use staking_crypto::{BlsPublicKey, BlsSignature, WithdrawalCredentials};

/// Payload committed to the remote network's deposit contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositData {
    pub pubkey: BlsPublicKey,
    pub withdrawal_credentials: WithdrawalCredentials,
    pub signature: BlsSignature,
    pub amount: Amount,
}

/// Opaque "commit validator" call on the remote network
pub trait DepositContract {
    fn deposit(&mut self, data: &DepositData) -> CoreResult<()>;
}

/// Deposit contract stand-in that records every accepted deposit
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordingDepositContract {
    deposits: Vec<DepositData>,
}

impl RecordingDepositContract {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deposits(&self) -> &[DepositData] {
        &self.deposits
    }

    pub fn total_deposited(&self) -> Amount {
        self.deposits
            .iter()
            .fold(Amount::zero(), |acc, d| acc + d.amount.clone())
    }
}

impl DepositContract for RecordingDepositContract {
    fn deposit(&mut self, data: &DepositData) -> CoreResult<()> {
        if data.amount != Amount::deposit_size() {
            return Err(CoreError::DepositError(format!(
                "deposit amount {} does not match validator size",
                data.amount
            )));
        }
        tracing::info!("Deposit submitted for validator {}", data.pubkey);
        self.deposits.push(data.clone());
        Ok(())
    }
}
