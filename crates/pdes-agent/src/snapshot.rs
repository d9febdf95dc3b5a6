//! Agent serialization: the wire form, the restore trait, and the registry.
//!
//! # The contract
//!
//! A serialized agent is a field-name → value mapping plus enough metadata
//! to reconstruct the concrete type: its `kind` tag, `name`, and the
//! `timeless`/`debug` flags.  Restoring a snapshot must yield an agent that,
//! when resumed, takes the identical next step the original would have —
//! same lock/sleep/exit with the same arguments.
//!
//! Migration happens only at suspension points, so the mapping is always a
//! complete continuation: the state-machine label plus any pending
//! destination addresses the agent still has to visit.

use rustc_hash::FxHashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;

use pdes_core::{Day, KernelError, KernelResult};

use crate::agent::Agent;

// ── AgentSnapshot ─────────────────────────────────────────────────────────────

/// The wire form of one suspended agent.
#[derive(Clone, Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct AgentSnapshot {
    /// Registry tag selecting the concrete type on restore.
    pub kind: String,
    pub name: String,
    pub timeless: bool,
    pub debug: bool,
    /// The agent's own fields as a field-name → value mapping.
    pub state: serde_json::Value,
}

impl AgentSnapshot {
    /// Capture `state` under the given metadata.
    pub fn encode<T: Serialize>(
        kind: &str,
        name: &str,
        timeless: bool,
        debug: bool,
        state: &T,
    ) -> KernelResult<Self> {
        Ok(Self {
            kind: kind.to_string(),
            name: name.to_string(),
            timeless,
            debug,
            state: serde_json::to_value(state).map_err(|e| KernelError::Codec(e.to_string()))?,
        })
    }

    /// Decode the state mapping back into the concrete field struct.
    pub fn decode<T: DeserializeOwned>(&self) -> KernelResult<T> {
        serde_json::from_value(self.state.clone()).map_err(|e| KernelError::Codec(e.to_string()))
    }
}

// ── MigrationBatch ────────────────────────────────────────────────────────────

/// One gate batch as it crosses a process boundary: the sender's virtual
/// time plus the serialized agents, in their original queue order.
#[derive(Clone, Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct MigrationBatch {
    pub sender_day: Day,
    pub agents: Vec<AgentSnapshot>,
}

// ── Portable / AgentRegistry ──────────────────────────────────────────────────

/// An agent kind that can be shipped across process boundaries.
///
/// Implementors provide the restore half of the serialization pair; the
/// export half is the overridden [`Agent::export`].  Register each portable
/// kind once in the run's [`AgentRegistry`].
pub trait Portable: Agent + Sized {
    /// Registry tag.  Must be unique across the run and stable across
    /// processes.
    const KIND: &'static str;

    /// Rebuild the agent from its wire form.
    fn restore(snapshot: &AgentSnapshot) -> KernelResult<Self>;
}

type RestoreFn = fn(&AgentSnapshot) -> KernelResult<Box<dyn Agent>>;

/// Factory table mapping `kind` tags to restore functions.
///
/// Built once by the application before the run starts and shared read-only
/// by every gate exit; the directory of kinds is static for the lifetime of
/// a run.
#[derive(Default)]
pub struct AgentRegistry {
    factories: FxHashMap<&'static str, RestoreFn>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a portable kind.  Registering the same kind twice replaces
    /// the factory (harmless for identical types).
    pub fn register<T: Portable + 'static>(&mut self) {
        self.factories
            .insert(T::KIND, |snap| Ok(Box::new(T::restore(snap)?) as Box<dyn Agent>));
    }

    /// Re-materialize a snapshot into a live agent.
    pub fn restore(&self, snapshot: &AgentSnapshot) -> KernelResult<Box<dyn Agent>> {
        match self.factories.get(snapshot.kind.as_str()) {
            Some(make) => make(snapshot),
            None => Err(KernelError::UnknownAgentKind(snapshot.kind.clone())),
        }
    }

    /// `true` if `kind` has a registered factory.
    pub fn knows(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }
}
