//! `MultiInteractant` — a resource with a fixed number of concurrent holders.
//!
//! Models bounded-capacity facilities such as the beds of a ward: the first
//! `capacity` lockers become holders at once; the `capacity + 1`-th joins
//! the same FIFO wait queue an [`Interactant`][crate::Interactant] uses, and
//! each `unlock` promotes exactly the head waiter.

use std::collections::VecDeque;

use pdes_core::LocalId;

use crate::interactant::{LockOutcome, UnlockOutcome, WaitTarget, Waiter};
use crate::{InteractError, InteractResult};

/// An N-concurrent-holder resource with FIFO overflow.
#[derive(Debug)]
pub struct MultiInteractant {
    name: String,
    capacity: usize,
    /// Current holders, at most `capacity`.  Small; linear scans are fine.
    holders: Vec<LocalId>,
    queue: VecDeque<Waiter>,
    enqueued: usize,
}

impl MultiInteractant {
    /// # Panics
    /// Panics if `capacity` is zero — a zero-capacity pool can never grant
    /// and should be a queue interactant instead.
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be at least 1");
        Self {
            name: name.into(),
            capacity,
            holders: Vec::with_capacity(capacity),
            queue: VecDeque::new(),
            enqueued: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Free holder slots: `capacity − |holders|`.
    pub fn n_free(&self) -> usize {
        self.capacity - self.holders.len()
    }

    pub fn holders(&self) -> &[LocalId] {
        &self.holders
    }

    pub fn enqueued(&self) -> usize {
        self.enqueued
    }

    pub fn waiting(&self) -> usize {
        self.queue.len()
    }

    pub fn is_locked(&self, agent: LocalId) -> bool {
        self.holders.contains(&agent) || self.queue.iter().any(|w| w.agent == agent)
    }

    /// Acquire a slot or join the queue.  Re-entrant for current holders.
    pub fn lock(&mut self, agent: LocalId, timeless: bool) -> LockOutcome {
        if self.holders.contains(&agent) {
            return LockOutcome::Granted;
        }
        if self.holders.len() < self.capacity {
            self.holders.push(agent);
            return LockOutcome::Granted;
        }
        if !timeless {
            self.enqueued += 1;
        }
        self.queue.push_back(Waiter { agent, timeless, key: None });
        LockOutcome::Parked
    }

    /// Release one slot, promoting the head waiter if any.
    pub fn unlock(&mut self, agent: LocalId) -> InteractResult<UnlockOutcome> {
        let pos = self.holders.iter().position(|&h| h == agent).ok_or_else(|| {
            InteractError::NotHolder {
                resource: self.name.clone(),
                agent,
            }
        })?;
        self.holders.remove(pos);
        match self.queue.pop_front() {
            Some(next) => {
                if !next.timeless {
                    self.enqueued -= 1;
                }
                self.holders.push(next.agent);
                Ok(UnlockOutcome::Handoff(next))
            }
            None => Ok(UnlockOutcome::Released),
        }
    }

    /// Remove a specific waiter without granting a slot.
    pub fn awaken(&mut self, target: WaitTarget) -> InteractResult<Waiter> {
        let pos = self.queue.iter().position(|w| match target {
            WaitTarget::Agent(a) => w.agent == a,
            WaitTarget::Key(_) => false,
        });
        match pos {
            Some(i) => {
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
}
