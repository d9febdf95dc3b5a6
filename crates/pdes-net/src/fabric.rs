//! The `Fabric` trait — the narrow contract the kernel asks of its
//! collective-communication substrate.
//!
//! The kernel needs exactly: point-to-point asynchronous delivery of opaque,
//! length-bounded payloads tagged by a message kind; a barrier; one
//! all-gather at start-up (the directory exchange); a per-process vector
//! clock; an "everyone wants to stop" handshake; and a locality query.  An
//! MPI binding, a socket mesh, or the in-process loopback in this crate can
//! all sit behind it.
//!
//! # Ordering requirement
//!
//! For any (sender, receiver) pair, payloads must be delivered in send
//! order.  The rollover protocol relies on this: an acknowledgement must
//! never overtake the agent batch that causally preceded it.

use pdes_core::{KernelResult, ShardId, VectorClock};

/// Upper bound on one envelope's payload.  Gate batching keeps real batches
/// far below this; the bound exists so a transport binding can size buffers.
pub const MAX_PAYLOAD: usize = 1 << 20;

/// Closed enumeration of wire message shapes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[derive(serde::Serialize, serde::Deserialize)]
pub enum MsgKind {
    /// A gate batch of serialized agents (`MigrationBatch` payload).
    AgentBatch,
}

/// One addressed, stamped payload in flight between shards.
#[derive(Clone, Debug)]
pub struct Envelope {
    pub kind: MsgKind,
    pub from: ShardId,
    pub to: ShardId,
    /// Sender's vector clock at send time; merged by the receiving fabric.
    pub clock: VectorClock,
    pub payload: Vec<u8>,
}

/// Per-process communication substrate.
pub trait Fabric: Send {
    /// This process's rank in the world.
    fn rank(&self) -> usize;

    /// Number of processes in the world.
    fn world_size(&self) -> usize;

    /// Queue `payload` for asynchronous delivery to `to`'s owning process.
    /// Never blocks.  The fabric stamps the envelope's clock itself.
    fn send(&mut self, kind: MsgKind, from: ShardId, to: ShardId, payload: Vec<u8>)
    -> KernelResult<()>;

    /// Take one delivered envelope, if any.  Never blocks.  Receiving merges
    /// the sender's clock into this process's clock.
    fn try_recv(&mut self) -> KernelResult<Option<Envelope>>;

    /// Block until every process has arrived.  Start-up only.
    fn barrier(&mut self) -> KernelResult<()>;

    /// Contribute `bytes` and receive every process's contribution, indexed
    /// by rank.  Used exactly once, to build the global directory.
    fn all_gather(&mut self, bytes: Vec<u8>) -> KernelResult<Vec<Vec<u8>>>;

    /// This process's vector clock.
    fn clock(&self) -> &VectorClock;

    /// Record one local scheduling event (advances this process's slot).
    fn tick_clock(&mut self);

    /// Register this process's wish to stop.  Sticky.
    fn request_shutdown(&mut self) -> KernelResult<()>;

    /// `true` once every process has requested shutdown.
    fn shutdown_agreed(&self) -> bool;

    /// `true` if `shard` is owned by this process.
    fn is_local(&self, shard: ShardId) -> bool;

    /// The rank owning `shard`, if the shard exists at all.
    fn rank_of(&self, shard: ShardId) -> Option<usize>;
}
