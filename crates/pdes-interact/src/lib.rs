//! `pdes-interact` — lockable resources with FIFO fairness.
//!
//! The only shared mutable state between agents inside one shard is a set of
//! these resources.  All mutation happens synchronously inside
//! `lock`/`unlock`/`awaken`; the cooperative scheduler guarantees each call
//! is atomic.  None of the types here know about the scheduler — they
//! return outcome values ([`LockOutcome`], [`UnlockOutcome`], [`Waiter`])
//! that the shard's driving loop turns into suspensions and wake-ups.
//!
//! | Type                 | Discipline                                  |
//! |----------------------|---------------------------------------------|
//! | [`Interactant`]      | one exclusive holder, or pure FIFO queue    |
//! | [`MultiInteractant`] | up to `capacity` concurrent holders         |
//! | [`HoldQueue`]        | FIFO queue with keyed rendezvous            |
//! | [`Resource`]         | closed enum over the three, match dispatch  |

pub mod error;
pub mod hold;
pub mod interactant;
pub mod multi;
pub mod resource;


// ── Re-exports ────────────────────────────────────────────────────────────────

pub use error::{InteractError, InteractResult};
pub use hold::HoldQueue;
pub use interactant::{Interactant, LockOutcome, UnlockOutcome, WaitTarget, Waiter};
pub use multi::MultiInteractant;
pub use resource::Resource;
