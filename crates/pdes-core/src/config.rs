//! Top-level run configuration.

use crate::Day;

/// Configuration shared by every shard of a run.
///
/// Constructed by the application and passed to the patch-group builder.
/// The same config must be used by every process of a distributed run.
#[derive(Clone, Debug)]
pub struct RunConfig {
    /// Master RNG seed.  The same seed always produces identical results.
    pub seed: u64,

    /// First day that is *not* simulated (exclusive upper bound).  A shard
    /// that reaches this day requests shutdown instead of rolling over.
    pub end_day: Day,

    /// Maximum number of agents per gate batch.  Queues larger than this are
    /// split into several batches so transport payload limits are respected.
    pub gate_batch_limit: usize,
}

impl RunConfig {
    /// A config simulating `days` days with the given seed and the default
    /// batch limit.
    pub fn days(days: u64, seed: u64) -> Self {
        Self {
            seed,
            end_day: Day(days),
            gate_batch_limit: 64,
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig::days(30, 0)
    }
}
