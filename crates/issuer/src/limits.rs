// issuer/src/limits.rs

use crate::{IssuerError, IssuerResult};
use serde::{Deserialize, Serialize};
use staking_core::{BasisPoints, MAX_BPS};

/// Cap on validators committed beyond those confirmed by the last report
///
/// With `committed` deposits and `activated` reported validators, a new
/// commitment is refused once some are pending and
/// `(committed + 1) * 10000 > activated * (10000 + bps)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingLimit {
    bps: BasisPoints,
}

impl Default for PendingLimit {
    fn default() -> Self {
        Self { bps: 500 }
    }
}

impl PendingLimit {
    pub fn new(bps: BasisPoints) -> IssuerResult<Self> {
        if bps >= MAX_BPS {
            return Err(IssuerError::InvalidLimit(format!(
                "pending validator limit {} bps must be below {}",
                bps, MAX_BPS
            )));
        }
        Ok(Self { bps })
    }

    pub fn bps(&self) -> BasisPoints {
        self.bps
    }

    /// Whether one more commitment fits
    pub fn allows(&self, committed: u64, activated: u64) -> bool {
        let pending = committed.saturating_sub(activated);
        if pending == 0 {
            return true;
        }
        let next = (committed as u128 + 1) * MAX_BPS as u128;
        let ceiling = activated as u128 * (MAX_BPS as u128 + self.bps as u128);
        next <= ceiling
    }

    pub fn check(&self, committed: u64, activated: u64) -> IssuerResult<()> {
        if self.allows(committed, activated) {
            Ok(())
        } else {
            Err(IssuerError::PendingLimitExceeded {
                committed,
                activated,
                limit_bps: self.bps,
            })
        }
    }
}
