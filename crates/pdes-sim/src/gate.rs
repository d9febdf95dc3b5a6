//! Gates — the transport boundary between two shards.
//!
//! A `GateEntrance` is the local proxy through which agents bound for a
//! remote shard travel: locking it joins a queue-discipline interactant
//! like any other lock.  Once per cycle the entrance drains its whole
//! queue into batches bounded by the configured payload limit
//! (`cycle_start`); after the orchestrator has dispatched a batch, the
//! shipped agents are removed from the local arena (`cycle_finish`) — they
//! now exist only in flight or at the destination.
//!
//! A `GateExit` is the receiving side's registration of interest in one
//! source shard.  Arrival scheduling is the core cross-shard time
//! invariant: timeless agents land at the *receiver's* current day
//! (infrastructure has no history to preserve), while a non-timeless agent
//! keeps the sender's send day — and a send day already in the receiver's
//! past is a fatal consistency violation.

use pdes_core::{Day, LocalId, ShardId};

/// Outbound half of a gate pair, one per remote shard.
#[derive(Debug)]
pub struct GateEntrance {
    /// Destination shard this entrance feeds.
    pub dest: ShardId,
    /// Resource id of the entrance's queue interactant.
    pub queue: LocalId,
    /// Batches handed to the transport so far.
    pub batches_sent: u64,
    /// Agents shipped so far.
    pub agents_sent: u64,
}

impl GateEntrance {
    pub fn new(dest: ShardId, queue: LocalId) -> Self {
        Self {
            dest,
            queue,
            batches_sent: 0,
            agents_sent: 0,
        }
    }
}

/// Inbound half of a gate pair, one per source shard.
#[derive(Debug)]
pub struct GateExit {
    pub source: ShardId,
    /// Agents re-homed through this exit so far.
    pub agents_received: u64,
}

impl GateExit {
    pub fn new(source: ShardId) -> Self {
        Self {
            source,
            agents_received: 0,
        }
    }
}

/// One drained gate batch awaiting dispatch by the orchestrator.
///
/// `agents` are still resident in the sending shard's arena; dispatch
/// extracts them (boxed for a same-process destination, serialized for a
/// remote one), which completes the entrance's cycle.
#[derive(Debug)]
pub struct OutboundBatch {
    pub dest: ShardId,
    pub send_day: Day,
    pub agents: Vec<LocalId>,
}
