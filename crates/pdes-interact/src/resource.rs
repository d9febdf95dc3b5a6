//! `Resource` — closed enum over the interactant variants.
//!
//! The kernel only ever deals with a small, fixed set of resource shapes, so
//! dispatch is a `match` over a tagged enum rather than trait objects.  The
//! shard's resource table stores these by `LocalId`.

use pdes_core::{LocalId, RendezvousKey};

use crate::hold::HoldQueue;
use crate::interactant::{Interactant, LockOutcome, UnlockOutcome, WaitTarget, Waiter};
use crate::multi::MultiInteractant;
use crate::{InteractError, InteractResult};

/// Any lockable resource a shard can own.
#[derive(Debug)]
pub enum Resource {
    /// Exclusive holder or pure FIFO queue.
    Mutex(Interactant),
    /// N concurrent holders.
    Pool(MultiInteractant),
    /// FIFO queue with keyed rendezvous.
    Rendezvous(HoldQueue),
}

impl Resource {
    pub fn mutex(name: impl Into<String>) -> Self {
        Resource::Mutex(Interactant::new(name))
    }

    /// A queue-discipline resource (lock always parks).
    pub fn queue(name: impl Into<String>) -> Self {
        Resource::Mutex(Interactant::queue(name))
    }

    pub fn pool(name: impl Into<String>, capacity: usize) -> Self {
        Resource::Pool(MultiInteractant::new(name, capacity))
    }

    pub fn rendezvous(name: impl Into<String>) -> Self {
        Resource::Rendezvous(HoldQueue::new(name))
    }

    pub fn name(&self) -> &str {
        match self {
            Resource::Mutex(r) => r.name(),
            Resource::Pool(r) => r.name(),
            Resource::Rendezvous(r) => r.name(),
        }
    }

    /// Acquire or park.  See the variants for their grant disciplines.
    pub fn lock(&mut self, agent: LocalId, timeless: bool) -> LockOutcome {
        match self {
            Resource::Mutex(r) => r.lock(agent, timeless, None),
            Resource::Pool(r) => r.lock(agent, timeless),
            Resource::Rendezvous(r) => r.lock(agent, timeless),
        }
    }

    /// Release.  Queue and rendezvous resources have no holders, so every
    /// unlock on them is a `NotHolder` violation.
    pub fn unlock(&mut self, agent: LocalId) -> InteractResult<UnlockOutcome> {
        match self {
            Resource::Mutex(r) => r.unlock(agent),
            Resource::Pool(r) => r.unlock(agent),
            Resource::Rendezvous(r) => Err(InteractError::NotHolder {
                resource: r.name().to_string(),
                agent,
            }),
        }
    }

    /// Remove a specific waiter without granting.
    pub fn awaken(&mut self, target: WaitTarget) -> InteractResult<Waiter> {
        match (self, target) {
            (Resource::Mutex(r), t) => r.awaken(t),
            (Resource::Pool(r), t) => r.awaken(t),
            (Resource::Rendezvous(r), WaitTarget::Key(k)) => r.awaken_key(k),
            (Resource::Rendezvous(r), WaitTarget::Agent(a)) => r.awaken_agent(a),
        }
    }

    /// Issue a rendezvous key.  Only rendezvous resources can.
    pub fn reserve(&mut self, agent: LocalId) -> InteractResult<RendezvousKey> {
        match self {
            Resource::Rendezvous(r) => Ok(r.reserve(agent)),
            other => Err(InteractError::NotARendezvous {
                resource: other.name().to_string(),
            }),
        }
    }

    /// `true` if `agent` currently holds or waits for this resource.
    pub fn is_locked(&self, agent: LocalId) -> bool {
        match self {
            Resource::Mutex(r) => r.is_locked(agent),
            Resource::Pool(r) => r.is_locked(agent),
            Resource::Rendezvous(r) => r.is_locked(agent),
        }
    }

    /// Non-timeless waiters (the quiescence contribution of this resource).
    pub fn enqueued(&self) -> usize {
        match self {
            Resource::Mutex(r) => r.enqueued(),
            Resource::Pool(r) => r.enqueued(),
            Resource::Rendezvous(r) => r.enqueued(),
        }
    }

    /// Total queued waiters, timeless included.
    pub fn waiting(&self) -> usize {
        match self {
            Resource::Mutex(r) => r.waiting(),
            Resource::Pool(r) => r.waiting(),
            Resource::Rendezvous(r) => r.waiting(),
        }
    }

    /// Drain every waiter in FIFO order (gate flush).  Pools do not support
    /// draining — their waiters leave only via unlock or awaken.
    pub fn drain(&mut self) -> Vec<Waiter> {
        match self {
            Resource::Mutex(r) => r.drain(),
            Resource::Rendezvous(r) => r.drain(),
            Resource::Pool(_) => Vec::new(),
        }
    }

    /// Downcast view for capacity inspection.
    pub fn as_pool(&self) -> Option<&MultiInteractant> {
        match self {
            Resource::Pool(r) => Some(r),
            _ => None,
        }
    }
}
