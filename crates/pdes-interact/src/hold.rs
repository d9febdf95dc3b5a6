//! `HoldQueue` — keyed rendezvous on top of a queue interactant.
//!
//! # The pattern
//!
//! An agent that is about to park reserves a key first and embeds it in
//! whatever request it hands off (a transfer ticket, a bed request).  The
//! component that eventually resolves the request knows only the key, not
//! the agent, and calls `awaken(key)`.  Each key is bound to exactly one
//! parked agent and is deleted the moment it is used; a second awaken with
//! the same key is a protocol violation.

use rustc_hash::FxHashMap;

use pdes_core::{LocalId, RendezvousKey};

use crate::interactant::{Interactant, LockOutcome, WaitTarget, Waiter};
use crate::{InteractError, InteractResult};

/// A queue interactant whose waiters can be released by key.
#[derive(Debug)]
pub struct HoldQueue {
    inner: Interactant,
    /// Next key value.  Keys are unique per hold queue for the whole run.
    next_key: u64,
    /// Keys reserved but not yet bound to a parked waiter.
    reserved: FxHashMap<LocalId, RendezvousKey>,
}

impl HoldQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Interactant::queue(name),
            next_key: 0,
            reserved: FxHashMap::default(),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn enqueued(&self) -> usize {
        self.inner.enqueued()
    }

    pub fn waiting(&self) -> usize {
        self.inner.waiting()
    }

    pub fn is_locked(&self, agent: LocalId) -> bool {
        self.inner.is_locked(agent)
    }

    /// Issue a fresh key for `agent`.  The key binds when the agent parks.
    ///
    /// A second reservation before parking replaces the first — only the key
    /// the agent actually parks under can awaken it.
    pub fn reserve(&mut self, agent: LocalId) -> RendezvousKey {
        let key = RendezvousKey(self.next_key);
        self.next_key += 1;
        self.reserved.insert(agent, key);
        key
    }

    /// Join the queue, binding any key previously reserved by `agent`.
    /// Always parks: a hold queue never grants.
    pub fn lock(&mut self, agent: LocalId, timeless: bool) -> LockOutcome {
        let key = self.reserved.remove(&agent);
        self.inner.lock(agent, timeless, key)
    }

    /// Release the waiter bound to `key`, consuming the key.
    pub fn awaken_key(&mut self, key: RendezvousKey) -> InteractResult<Waiter> {
        self.inner
            .awaken(WaitTarget::Key(key))
            .map_err(|_| InteractError::StaleKey {
                resource: self.inner.name().to_string(),
            })
    }

    /// Release a waiter named directly.
    pub fn awaken_agent(&mut self, agent: LocalId) -> InteractResult<Waiter> {
        self.inner.awaken(WaitTarget::Agent(agent))
    }

    /// Remove and return every waiter in FIFO order (gate-style flush).
    pub fn drain(&mut self) -> Vec<Waiter> {
        self.inner.drain()
    }
}
