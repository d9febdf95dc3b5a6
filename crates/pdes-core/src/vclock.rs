//! Vector clocks for causal ordering of cross-shard events.
//!
//! One slot per process rank.  The transport layer ticks its own slot on
//! every local scheduling event and merges the sender's clock on every
//! receive, so `a.precedes(b)` answers "did the system state stamped `a`
//! happen-before the state stamped `b`?".  The day-rollover protocol uses
//! this to refuse acknowledgements that raced ahead of information the
//! committing shard has not yet absorbed.

use crate::{Day, ShardId};

/// A fixed-length vector of per-rank event counters.
#[derive(Clone, PartialEq, Eq, Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct VectorClock {
    slots: Vec<u64>,
}

impl VectorClock {
    /// A zeroed clock for a world of `ranks` processes.
    pub fn new(ranks: usize) -> Self {
        Self { slots: vec![0; ranks] }
    }

    /// Number of ranks this clock covers.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Counter value for `rank`.
    #[inline]
    pub fn get(&self, rank: usize) -> u64 {
        self.slots[rank]
    }

    /// Record one local scheduling event at `rank`.
    #[inline]
    pub fn tick(&mut self, rank: usize) {
        self.slots[rank] += 1;
    }

    /// Component-wise maximum with `other` (absorb remote knowledge).
    pub fn merge(&mut self, other: &VectorClock) {
        debug_assert_eq!(self.slots.len(), other.slots.len());
        for (mine, theirs) in self.slots.iter_mut().zip(&other.slots) {
            *mine = (*mine).max(*theirs);
        }
    }

    /// Happened-before: every slot ≤ the other's, and at least one strictly <.
    ///
    /// Returns `false` for equal or concurrent (incomparable) clocks.
    pub fn precedes(&self, other: &VectorClock) -> bool {
        debug_assert_eq!(self.slots.len(), other.slots.len());
        let mut strictly_less = false;
        for (mine, theirs) in self.slots.iter().zip(&other.slots) {
            if mine > theirs {
                return false;
            }
            if mine < theirs {
                strictly_less = true;
            }
        }
        strictly_less
    }
}

// ── RolloverAck ───────────────────────────────────────────────────────────────

/// The tally record a day-change message deposits when it arrives back home.
///
/// `stamp` is the vector clock snapshotted by the *origin* shard when the
/// round was initiated; the commit check requires it to causally precede the
/// origin's clock at commit time.
#[derive(Clone, Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct RolloverAck {
    /// Shard whose queue acknowledged the proposal.
    pub peer: ShardId,
    /// The day the origin proposed to complete.
    pub proposed: Day,
    /// Origin's vector clock at the moment the round was sent out.
    pub stamp: VectorClock,
}
