//! Kernel error taxonomy.
//!
//! Every variant here marks a *logic defect*, not a transient condition:
//! releasing a resource you don't hold, scheduling into the past, a batch
//! arriving from the sender's future.  The kernel never retries — violations
//! propagate out of the owning shard's run with full context (agent name,
//! resource name, the violated invariant) and abort the simulation.
//!
//! Resource saturation is deliberately absent: a full ward parks the caller
//! in a FIFO queue, and "denied" is a domain outcome for the facility layer,
//! never a kernel error.

use thiserror::Error;

use crate::{Day, GlobalAddress, ShardId};

/// The fatal error type shared by every kernel crate.
#[derive(Debug, Error)]
pub enum KernelError {
    // ── Protocol violations ───────────────────────────────────────────────
    #[error("agent `{agent}` released `{resource}` without holding it")]
    UnlockWithoutHold { agent: String, resource: String },

    #[error("awaken target {target} is not waiting in `{resource}`")]
    AwakenTargetMissing { target: String, resource: String },

    #[error("rendezvous key already consumed or never issued in `{resource}`")]
    StaleRendezvousKey { resource: String },

    #[error("unexpected protocol state: {0}")]
    Protocol(String),

    // ── Temporal violations ───────────────────────────────────────────────
    #[error("cannot schedule `{agent}` at {day} (shard clock already at {now})")]
    ScheduleIntoPast { agent: String, day: Day, now: Day },

    #[error("batch from shard {from} sent at {sent} reached a receiver already at {now}")]
    BatchFromPast { from: ShardId, sent: Day, now: Day },

    #[error("rollover ack from shard {peer} is not causally safe at commit")]
    CausalityBreach { peer: ShardId },

    // ── Routing ───────────────────────────────────────────────────────────
    #[error("no path from shard {shard} to {addr}")]
    Unroutable { shard: ShardId, addr: GlobalAddress },

    // ── Migration / codec ─────────────────────────────────────────────────
    #[error("agent `{agent}` cannot cross a process boundary: {reason}")]
    NotPortable { agent: String, reason: String },

    #[error("agent state codec: {0}")]
    Codec(String),

    #[error("no factory registered for agent kind `{0}`")]
    UnknownAgentKind(String),

    // ── Construction / transport ──────────────────────────────────────────
    #[error("configuration error: {0}")]
    Config(String),

    #[error("transport failure: {0}")]
    Transport(String),
}

/// Shorthand result type for all kernel crates.
pub type KernelResult<T> = Result<T, KernelError>;
