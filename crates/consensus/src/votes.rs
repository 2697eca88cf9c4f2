// consensus/src/votes.rs

use crate::members::{MemberSlot, MAX_ORACLE_MEMBERS};
use serde::{Deserialize, Serialize};

/// One bit per oracle-member slot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteBitmap(u128);

const _: () = assert!(MAX_ORACLE_MEMBERS <= u128::BITS as usize);

impl VoteBitmap {
    pub fn new() -> Self {
        Self(0)
    }

    /// Record a vote; returns false if the slot had already voted
    pub fn insert(&mut self, slot: MemberSlot) -> bool {
        let mask = Self::mask(slot);
        let fresh = self.0 & mask == 0;
        self.0 |= mask;
        fresh
    }

    pub fn contains(&self, slot: MemberSlot) -> bool {
        self.0 & Self::mask(slot) != 0
    }

    /// Erase one slot's vote
    pub fn remove(&mut self, slot: MemberSlot) -> bool {
        let present = self.contains(slot);
        self.0 &= !Self::mask(slot);
        present
    }

    pub fn count(&self) -> u32 {
        self.0.count_ones()
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn clear(&mut self) {
        self.0 = 0;
    }

    /// Slots that have voted, lowest first
    pub fn slots(&self) -> impl Iterator<Item = MemberSlot> + '_ {
        (0..MAX_ORACLE_MEMBERS)
            .filter(move |i| self.0 & (1u128 << i) != 0)
            .map(|i| MemberSlot::new(i as u8))
    }

    fn mask(slot: MemberSlot) -> u128 {
        1u128 << slot.index()
    }
}
