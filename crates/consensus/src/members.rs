// consensus/src/members.rs

use crate::{ConsensusError, ConsensusResult};
use serde::{Deserialize, Serialize};
use staking_crypto::Address;
use std::collections::HashMap;

/// Upper bound on committee size (one bit per member in a vote bitmap)
pub const MAX_ORACLE_MEMBERS: usize = 128;

/// Position of a member in every vote bitmap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MemberSlot(u8);

impl MemberSlot {
    pub(crate) fn new(index: u8) -> Self {
        debug_assert!((index as usize) < MAX_ORACLE_MEMBERS);
        Self(index)
    }

    /// Bit position of this slot in a vote set
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Oracle committee: unique addresses bound to reusable slots
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OracleMembers {
    slots: Vec<Option<Address>>,
    index: HashMap<Address, MemberSlot>,
}

impl OracleMembers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a member in the lowest free slot
    pub fn add(&mut self, member: Address) -> ConsensusResult<MemberSlot> {
        if self.index.contains_key(&member) {
            return Err(ConsensusError::AlreadyOracleMember(member));
        }

        let position = match self.slots.iter().position(Option::is_none) {
            Some(free) => free,
            None if self.slots.len() < MAX_ORACLE_MEMBERS => {
                self.slots.push(None);
                self.slots.len() - 1
            }
            None => return Err(ConsensusError::MemberSetFull(MAX_ORACLE_MEMBERS)),
        };

        let slot = MemberSlot::new(position as u8);
        self.slots[position] = Some(member);
        self.index.insert(member, slot);
        Ok(slot)
    }

    /// Remove a member, freeing its slot
    pub fn remove(&mut self, member: &Address) -> ConsensusResult<MemberSlot> {
        let slot = self.index.remove(member)
            .ok_or(ConsensusError::UnknownOracleMember(*member))?;
        self.slots[slot.index()] = None;
        Ok(slot)
    }

    /// Slot held by `member`, if any
    pub fn slot_of(&self, member: &Address) -> Option<MemberSlot> {
        self.index.get(member).copied()
    }

    /// Resolve a caller to its slot or fail with `NotOracleMember`
    pub fn require(&self, member: &Address) -> ConsensusResult<MemberSlot> {
        self.slot_of(member).ok_or(ConsensusError::NotOracleMember(*member))
    }

    /// Whether `member` currently holds a slot
    pub fn contains(&self, member: &Address) -> bool {
        self.index.contains_key(member)
    }

    /// Number of current members
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// True when no member holds a slot
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Members in slot order
    pub fn members(&self) -> Vec<Address> {
        self.slots.iter().flatten().copied().collect()
    }
}
