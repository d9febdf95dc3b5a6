//! `pdes-net` — the transport seam of the kernel.
//!
//! [`Fabric`] is the whole contract the distributed layer consumes:
//! asynchronous point-to-point envelopes, one start-up all-gather, a
//! barrier, a per-process vector clock, a shutdown handshake, and shard
//! locality.  [`LoopbackFabric`] implements it for threads in one process;
//! an MPI or socket binding would slot in behind the same trait.

pub mod fabric;
pub mod loopback;

#[cfg(test)]
mod tests;

// ── Re-exports ────────────────────────────────────────────────────────────────

pub use fabric::{Envelope, Fabric, MAX_PAYLOAD, MsgKind};
pub use loopback::LoopbackFabric;
