// consensus/src/report.rs

use crate::{
    beacon::BeaconSchedule,
    members::{OracleMembers, MAX_ORACLE_MEMBERS},
    votes::VoteBitmap,
    ConsensusError, ConsensusResult,
};
use serde::{Deserialize, Serialize};
use staking_core::{Amount, Epoch, Nonce, Timestamp};
use staking_crypto::Address;
use std::collections::HashMap;

/// Observation submitted by an oracle member; votes only combine on exact equality
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReportTuple {
    /// Aggregate balance of the protocol's validators on the remote network
    pub total_reported_value: Amount,
    /// Number of the protocol's validators seen on the remote network
    pub observed_validator_count: u64,
}

impl ReportTuple {
    pub fn new(total_reported_value: Amount, observed_validator_count: u64) -> Self {
        Self {
            total_reported_value,
            observed_validator_count,
        }
    }
}

/// Bounds an observed validator count must fall within
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlausibilityWindow {
    /// Validators the protocol has committed deposits for
    pub deposited_validators: u64,
    /// Count carried by the last finalized report
    pub reported_validators: u64,
}

/// A tuple that reached quorum for its nonce
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizedReport {
    pub nonce: Nonce,
    pub tuple: ReportTuple,
    /// Remote epoch at finalization
    pub epoch: Epoch,
    /// Epochs since the previous finalized report (or genesis)
    pub epochs_elapsed: u64,
    pub finalized_at: Timestamp,
}

/// Result of a successful submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportOutcome {
    /// Vote counted; quorum not yet reached
    Recorded { nonce: Nonce, votes: u32, quorum: u32 },
    /// Vote completed a quorum; the nonce advanced
    QuorumReached(FinalizedReport),
}

/// Per-nonce vote accumulation for accounting reports
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConsensus {
    current_nonce: Nonce,
    quorum: u32,
    /// Votes per distinct tuple for the live nonce
    tallies: HashMap<ReportTuple, VoteBitmap>,
    /// Members that voted for the live nonce, whatever the tuple
    voted: VoteBitmap,
    last_submission_at: HashMap<Address, Timestamp>,
    /// Epoch of the latest accepted vote for the live nonce
    #[serde(default)]
    round_epoch: Option<Epoch>,
    last_finalized_epoch: Option<Epoch>,
    last_finalized: Option<FinalizedReport>,
}

impl ReportConsensus {
    pub fn new(quorum: u32) -> ConsensusResult<Self> {
        validate_quorum(quorum)?;
        Ok(Self {
            current_nonce: 0,
            quorum,
            tallies: HashMap::new(),
            voted: VoteBitmap::new(),
            last_submission_at: HashMap::new(),
            round_epoch: None,
            last_finalized_epoch: None,
            last_finalized: None,
        })
    }

    /// Resume from a known last finalized epoch (deployment bootstrap)
    pub fn with_last_finalized_epoch(mut self, epoch: Option<Epoch>) -> Self {
        self.last_finalized_epoch = epoch;
        self
    }

    /// Nonce accepting votes
    pub fn current_nonce(&self) -> Nonce {
        self.current_nonce
    }

    /// Identical votes needed to finalize
    pub fn quorum(&self) -> u32 {
        self.quorum
    }

    /// Most recent finalized report
    pub fn last_finalized(&self) -> Option<&FinalizedReport> {
        self.last_finalized.as_ref()
    }

    /// Epoch of the most recent finalized report
    pub fn last_finalized_epoch(&self) -> Option<Epoch> {
        self.last_finalized_epoch
    }

    /// When `member` last had a report vote accepted
    pub fn last_submission_at(&self, member: &Address) -> Option<Timestamp> {
        self.last_submission_at.get(member).copied()
    }

    /// Votes currently held by a tuple for the live nonce
    pub fn votes_for(&self, tuple: &ReportTuple) -> u32 {
        self.tallies.get(tuple).map(VoteBitmap::count).unwrap_or(0)
    }

    /// Whether `member` already voted for the live nonce
    pub fn has_voted(&self, members: &OracleMembers, member: &Address) -> bool {
        members.slot_of(member)
            .map(|slot| self.voted.contains(slot))
            .unwrap_or(false)
    }

    /// Number of distinct tuples pending for the live nonce
    pub fn pending_tuples(&self) -> usize {
        self.tallies.len()
    }

    /// Change the quorum; open tallies are re-checked by `finalize_pending`
    pub fn update_quorum(&mut self, quorum: u32, member_count: usize) -> ConsensusResult<()> {
        validate_quorum(quorum)?;
        if quorum as usize > member_count {
            tracing::warn!(
                "Report quorum {} exceeds current member count {}; no report can finalize",
                quorum,
                member_count
            );
        }
        self.quorum = quorum;
        Ok(())
    }

    /// Record a member's observation for `nonce`
    #[allow(clippy::too_many_arguments)]
    pub fn submit(
        &mut self,
        members: &OracleMembers,
        caller: &Address,
        nonce: Nonce,
        tuple: ReportTuple,
        now: Timestamp,
        schedule: &BeaconSchedule,
        window: &PlausibilityWindow,
    ) -> ConsensusResult<ReportOutcome> {
        let slot = members.require(caller)?;

        if nonce != self.current_nonce {
            return Err(ConsensusError::StaleOrFutureNonce {
                expected: self.current_nonce,
                provided: nonce,
            });
        }

        if self.voted.contains(slot) {
            return Err(ConsensusError::DuplicateVote {
                member: *caller,
                subject: format!("nonce {}", nonce),
            });
        }

        let epoch = self.check_plausibility(&tuple, now, schedule, window)?;

        self.voted.insert(slot);
        self.round_epoch = Some(epoch);
        self.last_submission_at.insert(*caller, now);
        let tally = self.tallies.entry(tuple.clone()).or_default();
        tally.insert(slot);
        let votes = tally.count();

        tracing::debug!(
            "Report vote from {} for nonce {}: value={} validators={} ({}/{})",
            caller,
            nonce,
            tuple.total_reported_value,
            tuple.observed_validator_count,
            votes,
            self.quorum
        );

        if votes < self.quorum {
            return Ok(ReportOutcome::Recorded {
                nonce,
                votes,
                quorum: self.quorum,
            });
        }

        Ok(ReportOutcome::QuorumReached(self.finalize_round(tuple, epoch, now)))
    }

    /// Finalize the live nonce if an open tally already meets the quorum
    ///
    /// Needed after the quorum is lowered below the votes a tuple holds.
    /// A tie between tuples at the top count finalizes nothing.
    pub fn finalize_pending(&mut self, now: Timestamp) -> Option<FinalizedReport> {
        let epoch = self.round_epoch?;
        let mut ranked: Vec<(&ReportTuple, u32)> = self.tallies
            .iter()
            .map(|(tuple, votes)| (tuple, votes.count()))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));

        let (leader, votes) = ranked.first().map(|(tuple, votes)| ((*tuple).clone(), *votes))?;
        if votes < self.quorum {
            return None;
        }
        if ranked.get(1).is_some_and(|(_, runner_up)| *runner_up == votes) {
            tracing::warn!(
                "Nonce {} has tied tuples at {} votes; nothing finalized",
                self.current_nonce,
                votes
            );
            return None;
        }
        Some(self.finalize_round(leader, epoch, now))
    }

    /// Erase a departed member's votes for the live nonce
    pub fn forget_member(&mut self, member: &Address, slot: crate::MemberSlot) {
        self.voted.remove(slot);
        for tally in self.tallies.values_mut() {
            tally.remove(slot);
        }
        self.tallies.retain(|_, tally| !tally.is_empty());
        self.last_submission_at.remove(member);
    }

    fn check_plausibility(
        &self,
        tuple: &ReportTuple,
        now: Timestamp,
        schedule: &BeaconSchedule,
        window: &PlausibilityWindow,
    ) -> ConsensusResult<Epoch> {
        let epoch = schedule.epoch_at(now).ok_or_else(|| {
            ConsensusError::ImplausibleObservation(format!(
                "remote chain starts at {}, now is {}",
                schedule.genesis_time, now
            ))
        })?;

        if let Some(last) = self.last_finalized_epoch {
            if schedule.frame_of(epoch) <= schedule.frame_of(last) {
                return Err(ConsensusError::ImplausibleObservation(format!(
                    "frame {} already reported",
                    schedule.frame_of(epoch)
                )));
            }
        }

        let observed = tuple.observed_validator_count;
        if observed > window.deposited_validators {
            return Err(ConsensusError::ImplausibleObservation(format!(
                "{} validators observed but only {} deposited",
                observed, window.deposited_validators
            )));
        }
        if observed < window.reported_validators {
            return Err(ConsensusError::ImplausibleObservation(format!(
                "{} validators observed but {} previously reported",
                observed, window.reported_validators
            )));
        }

        Ok(epoch)
    }

    fn finalize_round(&mut self, tuple: ReportTuple, epoch: Epoch, now: Timestamp) -> FinalizedReport {
        let epochs_elapsed = match self.last_finalized_epoch {
            Some(last) => epoch.saturating_sub(last),
            None => epoch,
        };
        let report = FinalizedReport {
            nonce: self.current_nonce,
            tuple,
            epoch,
            epochs_elapsed,
            finalized_at: now,
        };

        self.current_nonce += 1;
        self.tallies.clear();
        self.voted.clear();
        self.round_epoch = None;
        self.last_finalized_epoch = Some(report.epoch);
        self.last_finalized = Some(report.clone());

        tracing::info!(
            "Report quorum reached for nonce {} at epoch {} ({} epochs elapsed)",
            report.nonce,
            report.epoch,
            report.epochs_elapsed
        );
        report
    }
}

pub(crate) fn validate_quorum(quorum: u32) -> ConsensusResult<()> {
    if quorum == 0 || quorum as usize > MAX_ORACLE_MEMBERS {
        return Err(ConsensusError::InvalidQuorum(quorum));
    }
    Ok(())
}
