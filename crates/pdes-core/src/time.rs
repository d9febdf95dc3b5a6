//! Virtual-time model.
//!
//! # Design
//!
//! Simulated time is a monotonically increasing `Day` counter.  There is no
//! global clock: every shard carries its own `Day` inside its sequencer, and
//! the shards are kept from drifting apart only by the day-rollover protocol
//! and by the rule that migrating agents never regress the receiver's clock.
//!
//! Using an integer day as the canonical unit means all schedule arithmetic
//! is exact (no floating-point drift) and comparisons are O(1).

use std::fmt;

/// An absolute simulated-day counter.
///
/// Stored as `u64` to avoid overflow: even at one day per microsecond of
/// wall time a u64 outlasts any conceivable run.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct Day(pub u64);

impl Day {
    pub const ZERO: Day = Day(0);

    /// Return the day `n` steps after `self`.
    #[inline]
    pub fn offset(self, n: u64) -> Day {
        Day(self.0 + n)
    }

    /// Days elapsed from `earlier` to `self`.
    ///
    /// # Panics
    /// Panics in debug mode if `earlier > self`.
    #[inline]
    pub fn since(self, earlier: Day) -> u64 {
        self.0 - earlier.0
    }

    /// The next day.
    #[inline]
    pub fn next(self) -> Day {
        Day(self.0 + 1)
    }
}

impl std::ops::Add<u64> for Day {
    type Output = Day;
    #[inline]
    fn add(self, rhs: u64) -> Day {
        Day(self.0 + rhs)
    }
}

impl std::ops::Sub for Day {
    type Output = u64;
    #[inline]
    fn sub(self, rhs: Day) -> u64 {
        self.0 - rhs.0
    }
}

impl fmt::Display for Day {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "day {}", self.0)
    }
}
