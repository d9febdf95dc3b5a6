//! Observer hooks for progress reporting and data collection.

use pdes_core::{Day, ShardId};

/// Per-shard counters accumulated over a run.
///
/// The migration and exit counters track *simulated* agents only —
/// timeless infrastructure (rollover messages) moves through the same
/// gates but is not population.
#[derive(Clone, Debug, Default)]
pub struct PatchStats {
    /// Agent resumptions driven by the sequencer, infrastructure included.
    pub events: u64,
    /// Simulated agents that reached their terminal state here.
    pub exited: u64,
    /// Simulated agents re-homed here through a gate exit.
    pub migrated_in: u64,
    /// Simulated agents shipped out through a gate entrance.
    pub migrated_out: u64,
    /// Day rollovers committed.
    pub days_completed: u64,
}

/// Final per-shard accounting returned by a completed run.
#[derive(Clone, Debug, Default)]
pub struct RunSummary {
    pub per_shard: Vec<(ShardId, PatchStats)>,
}

/// Callbacks invoked at key points of the driving loop.
///
/// All methods have default no-op implementations so implementors only need
/// to override what they care about.
pub trait SimObserver {
    /// Called before each agent resumption, with the agent's name.
    fn on_event(&mut self, _shard: ShardId, _day: Day, _agent: &str) {}

    /// Called at every cycle boundary (once per clock-agent pass).
    fn on_cycle(&mut self, _shard: ShardId, _day: Day) {}

    /// Called when a shard commits a day rollover, with the new day.
    fn on_day(&mut self, _shard: ShardId, _day: Day) {}

    /// Called once when the whole run terminates.
    fn on_run_end(&mut self, _summary: &RunSummary) {}
}

/// A [`SimObserver`] that does nothing.
pub struct NoopObserver;

impl SimObserver for NoopObserver {}
