// consensus/src/beacon.rs

use crate::{ConsensusError, ConsensusResult};
use serde::{Deserialize, Serialize};
use staking_core::{Epoch, Timestamp};

/// Remote-network time reference used to place reports in frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeaconSchedule {
    /// Epochs in one reporting frame
    pub epochs_per_frame: u64,
    pub slots_per_epoch: u64,
    pub seconds_per_slot: u64,
    /// Unix time of slot 0
    pub genesis_time: Timestamp,
}

impl Default for BeaconSchedule {
    fn default() -> Self {
        Self {
            epochs_per_frame: 200,
            slots_per_epoch: 32,
            seconds_per_slot: 12,
            genesis_time: 1_616_508_000,
        }
    }
}

impl BeaconSchedule {
    pub fn new(
        epochs_per_frame: u64,
        slots_per_epoch: u64,
        seconds_per_slot: u64,
        genesis_time: Timestamp,
    ) -> ConsensusResult<Self> {
        let schedule = Self {
            epochs_per_frame,
            slots_per_epoch,
            seconds_per_slot,
            genesis_time,
        };
        schedule.validate()?;
        Ok(schedule)
    }

    pub fn validate(&self) -> ConsensusResult<()> {
        if self.epochs_per_frame == 0 {
            return Err(ConsensusError::InvalidBeaconSchedule("epochs_per_frame is zero".into()));
        }
        if self.slots_per_epoch == 0 {
            return Err(ConsensusError::InvalidBeaconSchedule("slots_per_epoch is zero".into()));
        }
        if self.seconds_per_slot == 0 {
            return Err(ConsensusError::InvalidBeaconSchedule("seconds_per_slot is zero".into()));
        }
        let frame_secs = self.slots_per_epoch
            .checked_mul(self.seconds_per_slot)
            .and_then(|epoch_secs| epoch_secs.checked_mul(self.epochs_per_frame));
        if frame_secs.is_none() {
            return Err(ConsensusError::InvalidBeaconSchedule(format!(
                "frame length of {} epochs x {} slots x {}s overflows",
                self.epochs_per_frame, self.slots_per_epoch, self.seconds_per_slot
            )));
        }
        Ok(())
    }

    /// Length of one epoch in seconds
    pub fn seconds_per_epoch(&self) -> u64 {
        self.slots_per_epoch.saturating_mul(self.seconds_per_slot)
    }

    /// Length of one reporting frame in seconds
    pub fn seconds_per_frame(&self) -> u64 {
        self.seconds_per_epoch().saturating_mul(self.epochs_per_frame)
    }

    /// Epoch containing `now`, or `None` before genesis
    pub fn epoch_at(&self, now: Timestamp) -> Option<Epoch> {
        now.checked_sub(self.genesis_time)
            .map(|elapsed| elapsed / self.seconds_per_epoch())
    }

    /// Reporting frame containing `epoch`
    pub fn frame_of(&self, epoch: Epoch) -> u64 {
        epoch / self.epochs_per_frame
    }

    /// First second of the given frame
    pub fn frame_start_time(&self, frame: u64) -> Timestamp {
        frame
            .saturating_mul(self.seconds_per_frame())
            .saturating_add(self.genesis_time)
    }
}
