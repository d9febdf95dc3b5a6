//! `pdes-core` — foundational types for the pdes simulation kernel.
//!
//! This crate is a dependency of every other `pdes-*` crate.  It intentionally
//! has no `pdes-*` dependencies and minimal external ones (only `rand`,
//! `serde`, and `thiserror`).
//!
//! # What lives here
//!
//! | Module      | Contents                                               |
//! |-------------|--------------------------------------------------------|
//! | [`ids`]     | `ShardId`, `LocalId`, `RendezvousKey`, `GlobalAddress` |
//! | [`time`]    | `Day` — the virtual-time unit                          |
//! | [`vclock`]  | `VectorClock`, `RolloverAck`                           |
//! | [`rng`]     | `AgentRng` (per-agent), `SimRng` (per-shard)           |
//! | [`config`]  | `RunConfig`                                            |
//! | [`error`]   | `KernelError`, `KernelResult`                          |

pub mod config;
pub mod error;
pub mod ids;
pub mod rng;
pub mod time;
pub mod vclock;

#[cfg(test)]
mod tests;

// ── Re-exports ────────────────────────────────────────────────────────────────

pub use config::RunConfig;
pub use error::{KernelError, KernelResult};
pub use ids::{GlobalAddress, LocalId, RendezvousKey, ShardId};
pub use rng::{AgentRng, SimRng};
pub use time::Day;
pub use vclock::{RolloverAck, VectorClock};
