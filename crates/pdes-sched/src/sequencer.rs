//! `Sequencer` — sparse per-day ready queue.
//!
//! # Why this exists
//!
//! Most agents are suspended most of the time (holding a bed for a week,
//! parked in a wait queue).  Scanning all N agents every day to ask "should
//! you run?" would cost O(N) per day regardless of activity.  The sequencer
//! inverts the problem: an agent appears under exactly the day it must run,
//! and each day the shard drains only that day's list — O(active) work.
//!
//! # Invariants
//!
//! - No entry exists for a day earlier than `time_now`; attempting to create
//!   one is a temporal violation.
//! - Within a day, agents run in enqueue order.  There is no priority scheme.
//! - `time_now` advances by exactly one day at a time, either when today's
//!   list empties during iteration, or through [`bump_time`] — the forced
//!   advance used by the distributed day-rollover protocol, which carries
//!   today's (by then all-timeless) leftovers into the new day.
//!
//! # Performance note
//!
//! `BTreeMap` gives O(log W) access where W = number of distinct future days
//! with entries.  Sleeps are short in practice, so W stays tiny.

use std::collections::{BTreeMap, VecDeque};

use pdes_core::{Day, LocalId};

use crate::{SchedError, SchedResult};

/// One scheduled wake-up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Entry {
    pub agent: LocalId,
    /// Recorded at enqueue time; timeless entries do not count toward
    /// "is there real work left today".
    pub timeless: bool,
}

#[derive(Default)]
struct DayQueue {
    entries: VecDeque<Entry>,
    /// Cached count of non-timeless entries for O(1) quiescence checks.
    nontimeless: usize,
}

/// A mapping from day → ordered agents pending that day, plus the local clock.
pub struct Sequencer {
    days: BTreeMap<Day, DayQueue>,
    time_now: Day,
    /// Total entries across all days, for O(1) `len()`.
    total: usize,
}

impl Sequencer {
    pub fn new(start: Day) -> Self {
        Self {
            days: BTreeMap::new(),
            time_now: start,
            total: 0,
        }
    }

    /// The shard's current virtual day.
    #[inline]
    pub fn time_now(&self) -> Day {
        self.time_now
    }

    /// Schedule `agent` to run at `day` (which must be ≥ `time_now`).
    pub fn enqueue(&mut self, agent: LocalId, timeless: bool, day: Day) -> SchedResult<()> {
        if day < self.time_now {
            return Err(SchedError::IntoPast {
                agent,
                day,
                now: self.time_now,
            });
        }
        let q = self.days.entry(day).or_default();
        q.entries.push_back(Entry { agent, timeless });
        if !timeless {
            q.nontimeless += 1;
        }
        self.total += 1;
        Ok(())
    }

    /// Produce the next `(agent, time_now)` pair.
    ///
    /// When today's list is exhausted its map entry is deleted and the clock
    /// advances one day at a time toward the next populated day.  Returns
    /// `None` when nothing remains at any day ≥ `time_now`.
    pub fn next(&mut self) -> Option<(LocalId, Day)> {
        loop {
            if let Some(q) = self.days.get_mut(&self.time_now) {
                if let Some(entry) = q.entries.pop_front() {
                    if !entry.timeless {
                        q.nontimeless -= 1;
                    }
                    self.total -= 1;
                    return Some((entry.agent, self.time_now));
                }
                self.days.remove(&self.time_now);
            }
            // Advance by exactly one day, never skipping.
            match self.days.keys().next() {
                Some(_) => self.time_now = self.time_now.next(),
                None => return None,
            }
        }
    }

    /// Force the clock forward one day, carrying today's leftover entries
    /// into the new day behind anything already scheduled there.
    ///
    /// The rollover protocol only calls this once the shard is quiescent, so
    /// the carried entries are all timeless infrastructure.  Returns the new
    /// `time_now`.
    pub fn bump_time(&mut self) -> Day {
        let carried = self.days.remove(&self.time_now).unwrap_or_default();
        self.time_now = self.time_now.next();
        if !carried.entries.is_empty() {
            let q = self.days.entry(self.time_now).or_default();
            q.nontimeless += carried.nontimeless;
            q.entries.extend(carried.entries);
        }
        self.time_now
    }

    /// Number of non-timeless entries still pending today.
    pub fn nontimeless_today(&self) -> usize {
        self.days.get(&self.time_now).map_or(0, |q| q.nontimeless)
    }

    /// The local half of the day-completion check: every entry still pending
    /// today is timeless.
    pub fn quiescent_today(&self) -> bool {
        self.nontimeless_today() == 0
    }

    /// Total pending entries across all days.
    pub fn len(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}
