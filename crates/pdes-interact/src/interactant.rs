//! `Interactant` — an exclusively lockable resource with a FIFO wait queue.
//!
//! # Two disciplines
//!
//! A *mutex* interactant grants the lock to the first caller and parks every
//! later one; releasing hands the lock to the head waiter, strictly in
//! arrival order.  A *queue* interactant never grants at all — locking it is
//! simply joining a FIFO.  Gates and protocol mailboxes are queue
//! interactants: whoever drains or awakens the queue decides when each
//! waiter runs again.
//!
//! The interactant itself never touches the scheduler.  Each operation
//! returns an outcome value describing who must be rescheduled; the shard's
//! driving loop applies it.  That keeps this crate a pure, synchronously
//! testable data structure.

use std::collections::VecDeque;

use pdes_core::{LocalId, RendezvousKey};

use crate::{InteractError, InteractResult};

// ── Outcome types ─────────────────────────────────────────────────────────────

/// One parked agent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Waiter {
    pub agent: LocalId,
    /// Timeless waiters do not count toward "is there real work left today".
    pub timeless: bool,
    /// Rendezvous key bound when the agent parked, if the resource issues them.
    pub key: Option<RendezvousKey>,
}

/// What happened to a `lock` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockOutcome {
    /// The caller holds the resource and keeps running.
    Granted,
    /// The caller joined the wait queue and must suspend.
    Parked,
}

/// What happened to an `unlock` call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UnlockOutcome {
    /// No waiter; the caller keeps running.
    Released,
    /// The head waiter was granted the resource.  Both it and the releasing
    /// caller must be scheduled to resume at the current day.
    Handoff(Waiter),
}

/// How to name a waiter for `awaken`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitTarget {
    Agent(LocalId),
    Key(RendezvousKey),
}

impl std::fmt::Display for WaitTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WaitTarget::Agent(a) => write!(f, "agent {a}"),
            WaitTarget::Key(k) => write!(f, "key {k}"),
        }
    }
}

// ── Interactant ───────────────────────────────────────────────────────────────

/// An exclusive-holder resource (or pure FIFO queue) with FIFO fairness.
#[derive(Debug)]
pub struct Interactant {
    name: String,
    /// At most one holder.  Always `None` in queue mode.
    holder: Option<LocalId>,
    queue: VecDeque<Waiter>,
    /// Count of non-timeless waiters, maintained incrementally for the
    /// shard-level quiescence check.
    enqueued: usize,
    /// Queue mode: `lock` never grants.
    queue_mode: bool,
}

impl Interactant {
    /// A mutex-discipline interactant.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            holder: None,
            queue: VecDeque::new(),
            enqueued: 0,
            queue_mode: false,
        }
    }

    /// A queue-discipline interactant: every `lock` parks the caller.
    pub fn queue(name: impl Into<String>) -> Self {
        let mut it = Self::new(name);
        it.queue_mode = true;
        it
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current exclusive holder, if any.
    pub fn holder(&self) -> Option<LocalId> {
        self.holder
    }

    /// Number of non-timeless waiters.
    pub fn enqueued(&self) -> usize {
        self.enqueued
    }

    /// Total queued waiters, timeless included.
    pub fn waiting(&self) -> usize {
        self.queue.len()
    }

    /// `true` if `agent` holds or is waiting for this resource.
    pub fn is_locked(&self, agent: LocalId) -> bool {
        self.holder == Some(agent) || self.queue.iter().any(|w| w.agent == agent)
    }

    /// Acquire or join the queue.  Re-entrant: a current holder is granted
    /// again without suspending.
    pub fn lock(&mut self, agent: LocalId, timeless: bool, key: Option<RendezvousKey>) -> LockOutcome {
        if !self.queue_mode {
            if self.holder == Some(agent) {
                return LockOutcome::Granted;
            }
            if self.holder.is_none() {
                self.holder = Some(agent);
                return LockOutcome::Granted;
            }
        }
        self.park(Waiter { agent, timeless, key });
        LockOutcome::Parked
    }

    fn park(&mut self, waiter: Waiter) {
        if !waiter.timeless {
            self.enqueued += 1;
        }
        self.queue.push_back(waiter);
    }

    /// Release the resource.  Hands it to the head waiter if one exists.
    pub fn unlock(&mut self, agent: LocalId) -> InteractResult<UnlockOutcome> {
        if self.holder != Some(agent) {
            return Err(InteractError::NotHolder {
                resource: self.name.clone(),
                agent,
            });
        }
        self.holder = None;
        match self.queue.pop_front() {
            Some(next) => {
                if !next.timeless {
                    self.enqueued -= 1;
                }
                self.holder = Some(next.agent);
                Ok(UnlockOutcome::Handoff(next))
            }
            None => Ok(UnlockOutcome::Released),
        }
    }

    /// Remove a specific waiter *without* granting the lock.
    ///
    /// The caller does not need to hold the resource; this is how one agent
    /// releases another it has no direct reference to.
    pub fn awaken(&mut self, target: WaitTarget) -> InteractResult<Waiter> {
        let pos = self.queue.iter().position(|w| match target {
            WaitTarget::Agent(a) => w.agent == a,
            WaitTarget::Key(k) => w.key == Some(k),
        });
        match pos {
            Some(i) => {
                // VecDeque::remove preserves the relative order of the rest.
                let waiter = self.queue.remove(i).expect("position was just found");
                if !waiter.timeless {
                    self.enqueued -= 1;
                }
                Ok(waiter)
            }
            None => Err(InteractError::NotWaiting {
                resource: self.name.clone(),
                target: target.to_string(),
            }),
        }
    }

    /// Remove and return every waiter in FIFO order, resetting the counts.
    /// Used by gates when flushing a cycle's departures.
    pub fn drain(&mut self) -> Vec<Waiter> {
        self.enqueued = 0;
        self.queue.drain(..).collect()
    }
}
