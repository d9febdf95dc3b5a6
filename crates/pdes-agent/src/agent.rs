//! The `Agent` trait — the unit of cooperative execution.
//!
//! # Execution model
//!
//! An agent is an explicit state machine driven by a trampoline: the shard's
//! driving loop calls [`Agent::step`] with a [`Wake`] describing *why* the
//! agent is running, and the agent returns a [`Step`] describing the next
//! thing it needs from the kernel.  Non-suspending requests (a lock that is
//! granted immediately, an unlock with no waiters) are fed straight back as
//! the next `Wake` without the agent ever leaving the driving loop;
//! suspending requests park the agent until a later cycle.
//!
//! There is no native stack to capture, which is what makes an agent
//! trivially serializable at any suspension point — the entire continuation
//! is the struct's own fields.
//!
//! # Suspension points
//!
//! Exactly three: `Step::Lock` on an unavailable resource, `Step::Sleep`
//! (always, even for zero days — the voluntary-yield primitive), and the
//! transient suspension inside `Step::Unlock` when the release hands the
//! resource to a waiter.

use pdes_core::{
    Day, GlobalAddress, KernelError, KernelResult, RendezvousKey, RolloverAck, ShardId,
};

use crate::snapshot::AgentSnapshot;

// ── Wake / Step ───────────────────────────────────────────────────────────────

/// Why an agent is being resumed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Wake {
    /// Freshly launched, a sleep elapsed, or re-materialized after migration.
    Scheduled,
    /// A lock the agent requested has been granted (immediately or after a
    /// handoff).  Carries the address the agent asked for.
    Granted(GlobalAddress),
    /// Removed from a wait queue *without* the lock, by a third party's
    /// awaken.  Carries the rendezvous key it parked under, if any.
    Roused { key: Option<RendezvousKey> },
    /// The agent's unlock completed.  Either no waiter existed (fed back
    /// immediately) or the handoff happened and the agent's turn came back.
    Released(GlobalAddress),
}

/// What an agent asks the kernel to do next.
///
/// `Lock` takes a destination anywhere in the world: the kernel routes it
/// hop by hop, parking the agent in an outbound gate whenever the target
/// lives on another shard.  After each migration the agent is stepped again
/// with [`Wake::Scheduled`] and simply re-issues the same `Lock`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    Lock(GlobalAddress),
    Unlock(GlobalAddress),
    /// Suspend for `n` whole days; `0` yields the rest of today's turn.
    Sleep(u64),
    /// Terminal: the agent is dropped.
    Exit,
}

/// How to name the waiter an `awaken` should release.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AwakenTarget {
    Agent(GlobalAddress),
    Key(RendezvousKey),
}

// ── ShardView ─────────────────────────────────────────────────────────────────

/// The capability surface a running agent sees of its current shard.
///
/// Everything here is synchronous and non-suspending; operations that can
/// suspend go through [`Step`] instead.  The view is handed to every
/// [`Agent::step`] call and borrows the shard's internals for exactly that
/// call.
pub trait ShardView {
    /// The shard's current virtual day.
    fn now(&self) -> Day;

    /// The shard hosting the agent right now.
    fn here(&self) -> ShardId;

    /// The running agent's own address on this shard.
    fn self_addr(&self) -> GlobalAddress;

    /// Resolve one routing hop toward `addr`: a local resource (final) or
    /// the outbound gate toward its shard (not final).
    fn path_to(&self, addr: GlobalAddress) -> KernelResult<(GlobalAddress, bool)>;

    /// The global directory of resources registered under `kind`, identical
    /// on every shard, sorted by name.  Empty slice for unknown kinds.
    fn service_lookup(&self, kind: &str) -> &[(String, GlobalAddress)];

    /// Issue a rendezvous key on a local hold queue; the key binds to this
    /// agent when it next parks there.
    fn reserve_key(&mut self, queue: GlobalAddress) -> KernelResult<RendezvousKey>;

    /// Release a specific waiter of a local resource without granting it
    /// the lock; the waiter is rescheduled at the current day.  Returns the
    /// address of the agent that was roused.
    fn awaken(&mut self, resource: GlobalAddress, target: AwakenTarget)
    -> KernelResult<GlobalAddress>;

    /// `true` if `agent` holds or waits for the local resource.
    fn is_locked(&self, resource: GlobalAddress, agent: GlobalAddress) -> KernelResult<bool>;

    /// Inject a freshly created agent into this shard at `at` (≥ now).
    fn launch(&mut self, agent: Box<dyn Agent>, at: Day) -> KernelResult<GlobalAddress>;

    /// The local half of the day-completion check: nothing non-timeless is
    /// pending today, in the sequencer or in any wait queue.
    fn quiescent_today(&self) -> bool;

    /// Deposit a day-rollover acknowledgement with this shard's tally.
    /// Meaningful only on the shard that initiated the round.
    fn record_rollover_ack(&mut self, ack: RolloverAck);
}

// ── Agent ─────────────────────────────────────────────────────────────────────

/// One resumable unit of simulated behavior.
pub trait Agent: Send {
    /// Stable display name, used in diagnostics and directory lookups.
    fn name(&self) -> &str;

    /// Timeless agents are infrastructure: they never count toward "is
    /// there real work left today".
    fn timeless(&self) -> bool {
        false
    }

    /// Verbose-tracing flag carried with the agent across migrations.
    fn debug(&self) -> bool {
        false
    }

    /// Run until the next suspension point.  See the module docs for the
    /// trampoline contract.
    fn step(&mut self, wake: Wake, ctx: &mut dyn ShardView) -> KernelResult<Step>;

    /// Capture the agent's complete state for migration.
    ///
    /// The default refuses: an agent that never crosses a process boundary
    /// does not need a serialization contract.  Kinds that migrate override
    /// this (see [`Portable`][crate::Portable]) and register a factory in
    /// the [`AgentRegistry`][crate::AgentRegistry].
    fn export(&self) -> KernelResult<AgentSnapshot> {
        Err(KernelError::NotPortable {
            agent: self.name().to_string(),
            reason: "agent kind has no serialization contract".to_string(),
        })
    }
}

impl std::fmt::Debug for dyn Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent").field("name", &self.name()).finish()
    }
}
