//! `pdes-sim` — shard scheduling and distributed orchestration.
//!
//! # The step loop
//!
//! ```text
//! PatchGroup::run:
//!   ① Drain    — inbound envelopes are re-homed through their gate exits.
//!   ② Turns    — every local Patch gets one scheduling turn: pop from the
//!                Sequencer, trampoline the agent until it parks, sleeps,
//!                or exits; the cycle ends at the clock duty.
//!   ③ Dispatch — drained gate batches are handed over: boxed directly to
//!                sibling patches, serialized envelopes across processes.
//!   ④ Stop     — once every local shard reaches its end day, join the
//!                distributed shutdown handshake; terminate when the whole
//!                world agrees.
//! ```
//!
//! Day rollovers ride the same machinery: a shard that has finished its day
//! broadcasts timeless [`DateChangeMsg`] agents through the gates and only
//! advances once every message has returned home with a causally safe
//! acknowledgement.

pub mod builder;
pub mod gate;
pub mod group;
pub mod mainloop;
pub mod observer;
pub mod patch;
pub mod rollover;

#[cfg(test)]
mod tests;

// ── Re-exports ────────────────────────────────────────────────────────────────

pub use builder::{PatchGroupBuilder, PatchSetup};
pub use gate::{GateEntrance, GateExit, OutboundBatch};
pub use group::PatchGroup;
pub use mainloop::{MainLoop, TurnReport};
pub use observer::{NoopObserver, PatchStats, RunSummary, SimObserver};
pub use patch::{DATE_CHANGE_KIND, Directory, Patch};
pub use rollover::{DateChangeMsg, RolloverState};
