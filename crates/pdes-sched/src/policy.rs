//! `TickPolicy` — constructor-injected per-cycle yield strategy.
//!
//! A shard's driving loop reaches a well-defined boundary once per cycle
//! (after its clock duties run).  What happens there depends on who owns the
//! shard: a standalone run keeps going, while a multi-shard orchestrator
//! wants control back so it can interleave the other shards and the network.
//! The strategy is injected at construction — the owner never mutates the
//! loop's behavior after the fact.

use pdes_core::{Day, ShardId};

/// Decision returned at each cycle boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleControl {
    /// Keep draining this shard's sequencer.
    Continue,
    /// Return control to the orchestrator.
    Yield,
}

/// Per-cycle yield strategy for one shard's driving loop.
pub trait TickPolicy: Send {
    fn end_of_cycle(&mut self, shard: ShardId, now: Day) -> CycleControl;
}

/// Never yields — for standalone single-shard runs.
pub struct RunToCompletion;

impl TickPolicy for RunToCompletion {
    fn end_of_cycle(&mut self, _shard: ShardId, _now: Day) -> CycleControl {
        CycleControl::Continue
    }
}

/// Yields at every cycle boundary — used under a patch-group orchestrator.
pub struct YieldEachCycle;

impl TickPolicy for YieldEachCycle {
    fn end_of_cycle(&mut self, _shard: ShardId, _now: Day) -> CycleControl {
        CycleControl::Yield
    }
}
