//! `pdes-agent` — the resumable-agent contract.
//!
//! Agents are explicit state machines with no native stack: the driving
//! loop trampolines [`Agent::step`], feeding each non-suspending outcome
//! straight back in as the next [`Wake`].  Because the whole continuation
//! lives in the agent's own fields, a suspended agent can be captured as an
//! [`AgentSnapshot`], shipped to another shard, and resumed there by the
//! [`AgentRegistry`].
//!
//! The [`ShardView`] trait is the narrow, synchronous capability surface an
//! agent sees of its current shard — routing, directory lookups, keyed
//! rendezvous, and the day-completion signals the rollover protocol rides.

pub mod agent;
pub mod snapshot;


// ── Re-exports ────────────────────────────────────────────────────────────────

pub use agent::{Agent, AwakenTarget, ShardView, Step, Wake};
pub use snapshot::{AgentRegistry, AgentSnapshot, MigrationBatch, Portable};
