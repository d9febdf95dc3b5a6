//! `Patch` — one partition of the simulated world.
//!
//! A patch owns a driving loop ([`MainLoop`]), an arena of resident agents,
//! a table of lockable resources, gate pairs toward every other shard, and
//! the date-change duty state.  Everything an agent can observe of the
//! world while it runs goes through the patch; across patches the only
//! coupling is gate batches and the read-only global directory.

use std::collections::BTreeMap;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::trace;

use pdes_agent::{Agent, AgentRegistry, AgentSnapshot, MigrationBatch};
use pdes_core::{Day, GlobalAddress, KernelError, KernelResult, LocalId, RunConfig, ShardId};
use pdes_interact::Resource;
use pdes_sched::{SchedError, TickPolicy};

use crate::gate::{GateEntrance, GateExit};
use crate::mainloop::MainLoop;
use crate::observer::PatchStats;
use crate::rollover::RolloverState;

// ── Arena ─────────────────────────────────────────────────────────────────────

/// Owner of every suspended agent resident on one shard.
///
/// Exactly one of these holds a non-running agent at any time; the driving
/// loop takes the agent out for the duration of a resumption and puts it
/// back at the next suspension point.  Ids are never reused, so a shipped
/// agent's id cannot be mistaken for a newcomer's.
pub(crate) struct Arena {
    slots: FxHashMap<LocalId, Box<dyn Agent>>,
    next: u32,
}

impl Arena {
    fn new() -> Self {
        Self {
            slots: FxHashMap::default(),
            next: 0,
        }
    }

    /// Allocate an id without storing an agent — used for built-in duties
    /// that live outside the arena (the clock) and for resources, which
    /// share the same address space.
    pub(crate) fn alloc_id(&mut self) -> LocalId {
        let id = LocalId(self.next);
        self.next += 1;
        id
    }

    pub(crate) fn admit(&mut self, agent: Box<dyn Agent>) -> LocalId {
        let id = self.alloc_id();
        self.slots.insert(id, agent);
        id
    }

    pub(crate) fn take(&mut self, id: LocalId) -> Option<Box<dyn Agent>> {
        self.slots.remove(&id)
    }

    pub(crate) fn put(&mut self, id: LocalId, agent: Box<dyn Agent>) {
        self.slots.insert(id, agent);
    }

    pub(crate) fn get(&self, id: LocalId) -> Option<&dyn Agent> {
        self.slots.get(&id).map(|a| a.as_ref())
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }
}

/// Diagnostic label for an agent id: its name if resident, the raw id if not.
pub(crate) fn agent_label(arena: &Arena, id: LocalId) -> String {
    arena
        .get(id)
        .map(|a| a.name().to_string())
        .unwrap_or_else(|| id.to_string())
}

// ── Directory ─────────────────────────────────────────────────────────────────

/// The global, read-only directory of named resources, built once at
/// start-up from every shard's registrations and identical everywhere.
#[derive(Debug, Default)]
pub struct Directory {
    by_kind: FxHashMap<String, Vec<(String, GlobalAddress)>>,
}

impl Directory {
    pub fn insert(&mut self, kind: &str, name: &str, addr: GlobalAddress) {
        self.by_kind
            .entry(kind.to_string())
            .or_default()
            .push((name.to_string(), addr));
    }

    /// Sort every kind's entries by name so lookups are identical on every
    /// process regardless of gather order.
    pub fn finalize(&mut self) {
        for entries in self.by_kind.values_mut() {
            entries.sort();
        }
    }

    pub fn lookup(&self, kind: &str) -> &[(String, GlobalAddress)] {
        self.by_kind.get(kind).map_or(&[], |v| v.as_slice())
    }
}

/// Reserved directory kind under which every shard lists its date-change
/// queue; also how the builder learns the full shard roster.
pub const DATE_CHANGE_KIND: &str = "date-change";

// ── Routing ───────────────────────────────────────────────────────────────────

/// The sole routing primitive: a local resource is final; anything else
/// resolves to the outbound gate toward its shard.
pub(crate) fn route(
    shard: ShardId,
    resources: &FxHashMap<LocalId, Resource>,
    gates_out: &BTreeMap<ShardId, GateEntrance>,
    dest: GlobalAddress,
) -> KernelResult<(GlobalAddress, bool)> {
    if dest.is_on(shard) {
        if resources.contains_key(&dest.local) {
            return Ok((dest, true));
        }
        return Err(KernelError::Unroutable { shard, addr: dest });
    }
    match gates_out.get(&dest.shard) {
        Some(gate) => Ok((GlobalAddress::new(shard, gate.queue), false)),
        None => Err(KernelError::Unroutable { shard, addr: dest }),
    }
}

// ── Patch ─────────────────────────────────────────────────────────────────────

/// One shard: local clock, agents, resources, gates, and duties.
pub struct Patch {
    pub(crate) shard: ShardId,
    pub(crate) config: RunConfig,
    pub(crate) main: MainLoop,
    pub(crate) arena: Arena,
    pub(crate) resources: FxHashMap<LocalId, Resource>,
    pub(crate) directory: Arc<Directory>,
    pub(crate) gates_out: BTreeMap<ShardId, GateEntrance>,
    pub(crate) gates_in: BTreeMap<ShardId, GateExit>,
    pub(crate) rollover: RolloverState,
    pub(crate) stats: PatchStats,
    /// Service registrations staged for the directory exchange.
    staged_services: Vec<(String, String, GlobalAddress)>,
}

impl Patch {
    /// Create an empty shard.  The date-change queue is registered
    /// immediately so the directory exchange always carries one entry per
    /// shard.
    pub fn new(shard: ShardId, config: RunConfig, policy: Box<dyn TickPolicy>) -> Self {
        let mut arena = Arena::new();
        let clock_id = arena.alloc_id();
        let rollover_queue = arena.alloc_id();

        let mut resources = FxHashMap::default();
        resources.insert(
            rollover_queue,
            Resource::queue(format!("date-change-{}", shard.0)),
        );

        let mut patch = Self {
            shard,
            main: MainLoop::new(clock_id, policy),
            arena,
            resources,
            directory: Arc::new(Directory::default()),
            gates_out: BTreeMap::new(),
            gates_in: BTreeMap::new(),
            rollover: RolloverState::new(rollover_queue),
            stats: PatchStats::default(),
            staged_services: vec![(
                DATE_CHANGE_KIND.to_string(),
                format!("shard-{}", shard.0),
                GlobalAddress::new(shard, rollover_queue),
            )],
            config,
        };
        // The clock duty is pending from day zero.
        patch
            .main
            .seq
            .enqueue(clock_id, true, Day::ZERO)
            .expect("day zero is never in the past");
        patch
    }

    pub fn shard(&self) -> ShardId {
        self.shard
    }

    /// The shard's current virtual day.
    pub fn time_now(&self) -> Day {
        self.main.seq.time_now()
    }

    /// `true` once the shard has reached the configured end day.
    pub fn wants_stop(&self) -> bool {
        self.main.stopping
    }

    pub fn stats(&self) -> &PatchStats {
        &self.stats
    }

    // ── Setup (pre-run) ───────────────────────────────────────────────────

    /// Register a resource, returning its address.
    pub fn add_resource(&mut self, resource: Resource) -> GlobalAddress {
        let id = self.arena.alloc_id();
        self.resources.insert(id, resource);
        GlobalAddress::new(self.shard, id)
    }

    /// Register a resource and list it in the global directory under `kind`.
    pub fn add_service(&mut self, kind: &str, resource: Resource) -> GlobalAddress {
        let name = resource.name().to_string();
        let addr = self.add_resource(resource);
        self.staged_services.push((kind.to_string(), name, addr));
        addr
    }

    /// Drain the registrations staged for the directory exchange.
    pub fn take_staged_services(&mut self) -> Vec<(String, String, GlobalAddress)> {
        std::mem::take(&mut self.staged_services)
    }

    pub fn set_directory(&mut self, directory: Arc<Directory>) {
        self.directory = directory;
    }

    /// Create the outbound gate toward `dest` (a queue-discipline resource
    /// plus the entrance bookkeeping).
    pub fn connect_gate(&mut self, dest: ShardId) {
        let queue = self.arena.alloc_id();
        self.resources.insert(
            queue,
            Resource::queue(format!("gate-{}-to-{}", self.shard.0, dest.0)),
        );
        self.gates_out.insert(dest, GateEntrance::new(dest, queue));
    }

    /// Register interest in inbound batches from `source`.
    pub fn expect_gate_from(&mut self, source: ShardId) {
        self.gates_in.insert(source, GateExit::new(source));
    }

    /// Install the peer roster for the rollover duty (every other shard's
    /// date-change queue).
    pub fn set_rollover_peers(&mut self, peers: Vec<(ShardId, GlobalAddress)>) {
        self.rollover.peers = peers;
    }

    /// Suppress or re-allow date advancement (used during distributed
    /// setup, before every process is ready).
    pub fn freeze_dates(&mut self, frozen: bool) {
        self.main.dates_frozen = frozen;
    }

    // ── Agent admission ───────────────────────────────────────────────────

    /// Inject a freshly created agent at `at` (≥ the current day).
    pub fn launch(&mut self, agent: Box<dyn Agent>, at: Day) -> KernelResult<GlobalAddress> {
        let now = self.main.seq.time_now();
        if at < now {
            return Err(KernelError::ScheduleIntoPast {
                agent: agent.name().to_string(),
                day: at,
                now,
            });
        }
        let timeless = agent.timeless();
        trace!(shard = self.shard.0, agent = agent.name(), %at, "launch");
        let id = self.arena.admit(agent);
        self.main
            .seq
            .enqueue(id, timeless, at)
            .map_err(|e| self.temporal(e))?;
        Ok(GlobalAddress::new(self.shard, id))
    }

    /// Inject a set of agents at the current day.
    pub fn add_agents(&mut self, agents: Vec<Box<dyn Agent>>) -> KernelResult<Vec<GlobalAddress>> {
        let now = self.main.seq.time_now();
        agents.into_iter().map(|a| self.launch(a, now)).collect()
    }

    // ── Queries ───────────────────────────────────────────────────────────

    /// Resolve one routing hop toward `dest`.
    pub fn path_to(&self, dest: GlobalAddress) -> KernelResult<(GlobalAddress, bool)> {
        route(self.shard, &self.resources, &self.gates_out, dest)
    }

    /// The global directory entries registered under `kind`.
    pub fn service_lookup(&self, kind: &str) -> &[(String, GlobalAddress)] {
        self.directory.lookup(kind)
    }

    /// Read-only view of a resource (tests and reporting).
    pub fn resource(&self, addr: GlobalAddress) -> Option<&Resource> {
        if !addr.is_on(self.shard) {
            return None;
        }
        self.resources.get(&addr.local)
    }

    /// The local half of the day-completion check: every sequencer entry
    /// still pending today is timeless, and no resource holds a
    /// non-timeless waiter.
    pub fn quiescent(&self) -> bool {
        self.main.seq.quiescent_today()
            && self.resources.values().all(|r| r.enqueued() == 0)
    }

    /// Number of resident agents (suspended or pending).
    pub fn population(&self) -> usize {
        self.arena.len()
    }

    // ── Gate arrival / departure plumbing ─────────────────────────────────

    /// Re-home a batch of live agents arriving from `from`.
    ///
    /// Timeless agents are scheduled at the receiver's current day;
    /// non-timeless agents keep the sender's day, which must not lie in the
    /// receiver's past.
    pub fn absorb_boxed(
        &mut self,
        from: ShardId,
        sender_day: Day,
        agents: Vec<Box<dyn Agent>>,
    ) -> KernelResult<()> {
        if !self.gates_in.contains_key(&from) {
            return Err(KernelError::Protocol(format!(
                "shard {} received a batch from unregistered source {from}",
                self.shard
            )));
        }
        let now = self.main.seq.time_now();
        let total = agents.len() as u64;
        let mut simulated = 0u64;
        for agent in agents {
            let timeless = agent.timeless();
            if !timeless {
                simulated += 1;
            }
            let day = if timeless {
                now
            } else {
                if sender_day < now {
                    return Err(KernelError::BatchFromPast {
                        from,
                        sent: sender_day,
                        now,
                    });
                }
                sender_day
            };
            trace!(shard = self.shard.0, agent = agent.name(), %day, "absorb");
            let id = self.arena.admit(agent);
            self.main
                .seq
                .enqueue(id, timeless, day)
                .map_err(|e| self.temporal(e))?;
        }
        if let Some(exit) = self.gates_in.get_mut(&from) {
            exit.agents_received += total;
        }
        // Infrastructure traffic (rollover messages) is not population.
        self.stats.migrated_in += simulated;
        Ok(())
    }

    /// Re-materialize and re-home a serialized batch from `from`.
    pub fn absorb_wire(
        &mut self,
        from: ShardId,
        batch: MigrationBatch,
        registry: &AgentRegistry,
    ) -> KernelResult<()> {
        let agents = batch
            .agents
            .iter()
            .map(|snap| registry.restore(snap))
            .collect::<KernelResult<Vec<_>>>()?;
        self.absorb_boxed(from, batch.sender_day, agents)
    }

    /// Remove shipped agents for a same-process handoff (the entrance's
    /// cycle-finish: they live on only at the destination).
    pub fn extract_for_handoff(&mut self, ids: &[LocalId]) -> KernelResult<Vec<Box<dyn Agent>>> {
        let mut out = Vec::with_capacity(ids.len());
        for &id in ids {
            let agent = self.arena.take(id).ok_or_else(|| {
                KernelError::Protocol(format!("gate batch names non-resident agent {id}"))
            })?;
            if !agent.timeless() {
                self.stats.migrated_out += 1;
            }
            out.push(agent);
        }
        Ok(out)
    }

    /// Serialize and permanently remove shipped agents for a cross-process
    /// send.
    pub fn export_and_remove(&mut self, ids: &[LocalId]) -> KernelResult<Vec<AgentSnapshot>> {
        let mut out = Vec::with_capacity(ids.len());
        for &id in ids {
            let agent = self.arena.take(id).ok_or_else(|| {
                KernelError::Protocol(format!("gate batch names non-resident agent {id}"))
            })?;
            if !agent.timeless() {
                self.stats.migrated_out += 1;
            }
            out.push(agent.export()?);
        }
        Ok(out)
    }

    // ── Error labeling ────────────────────────────────────────────────────

    pub(crate) fn temporal(&self, e: SchedError) -> KernelError {
        let SchedError::IntoPast { agent, day, now } = e;
        KernelError::ScheduleIntoPast {
            agent: agent_label(&self.arena, agent),
            day,
            now,
        }
    }
}
