//! Fluent builder for constructing a [`PatchGroup`].
//!
//! # Start-up sequence
//!
//! 1. Validate the shard layout against the fabric's locality map.
//! 2. Construct every local patch with dates frozen, register resources,
//!    and launch the seed agents.
//! 3. Exchange service registrations with every process (the one permitted
//!    all-gather) and freeze the result into the global directory.  The
//!    directory is immutable for the rest of the run — cross-shard-visible
//!    queues cannot be created dynamically.
//! 4. Fully connect every pair of distinct shards with a gate pair and
//!    install each shard's rollover peer roster.
//! 5. Unfreeze dates, hit the start-up barrier, and hand over the group.

use std::sync::Arc;

use pdes_agent::{Agent, AgentRegistry};
use pdes_core::{Day, GlobalAddress, KernelError, KernelResult, RunConfig, ShardId};
use pdes_interact::Resource;
use pdes_net::Fabric;
use pdes_sched::YieldEachCycle;

use crate::group::PatchGroup;
use crate::patch::{DATE_CHANGE_KIND, Directory, Patch};
use crate::rollover::DateChangeMsg;

// ── PatchSetup ────────────────────────────────────────────────────────────────

/// Declarative description of one shard, accumulated before `build`.
pub struct PatchSetup {
    shard: ShardId,
    services: Vec<(String, Resource)>,
    resources: Vec<Resource>,
    seeds: Vec<(Box<dyn Agent>, Day)>,
}

impl PatchSetup {
    fn new(shard: ShardId) -> Self {
        Self {
            shard,
            services: Vec::new(),
            resources: Vec::new(),
            seeds: Vec::new(),
        }
    }

    /// Register a resource and list it in the global directory under `kind`
    /// (its name comes from the resource itself).
    pub fn service(&mut self, kind: &str, resource: Resource) -> &mut Self {
        self.services.push((kind.to_string(), resource));
        self
    }

    /// Register a resource without a directory listing (reachable only by
    /// agents that are handed its address).
    pub fn resource(&mut self, resource: Resource) -> &mut Self {
        self.resources.push(resource);
        self
    }

    /// Launch `agent` at `at` when the run starts.
    pub fn seed(&mut self, agent: Box<dyn Agent>, at: Day) -> &mut Self {
        self.seeds.push((agent, at));
        self
    }
}

// ── PatchGroupBuilder ─────────────────────────────────────────────────────────

/// Builder for the per-process orchestrator.
///
/// # Example
///
/// ```rust,ignore
/// let fabric = LoopbackFabric::single(&[ShardId(0), ShardId(1)])?;
/// let mut b = PatchGroupBuilder::new(Box::new(fabric), RunConfig::days(30, 42));
/// b.registry_mut().register::<PatientAgent>();
/// b.add_patch(ShardId(0)).service("ward", Resource::pool("icu", 2));
/// b.add_patch(ShardId(1)).service("ward", Resource::pool("west", 1));
/// let mut group = b.build()?;
/// group.run(&mut NoopObserver)?;
/// ```
pub struct PatchGroupBuilder {
    fabric: Box<dyn Fabric>,
    config: RunConfig,
    registry: AgentRegistry,
    setups: Vec<PatchSetup>,
}

impl PatchGroupBuilder {
    pub fn new(fabric: Box<dyn Fabric>, config: RunConfig) -> Self {
        let mut registry = AgentRegistry::new();
        // The rollover protocol's messages migrate like any other agent.
        registry.register::<DateChangeMsg>();
        Self {
            fabric,
            config,
            registry,
            setups: Vec::new(),
        }
    }

    /// Register the application's portable agent kinds.
    pub fn registry_mut(&mut self) -> &mut AgentRegistry {
        &mut self.registry
    }

    /// Declare a shard hosted by this process.
    pub fn add_patch(&mut self, shard: ShardId) -> &mut PatchSetup {
        self.setups.push(PatchSetup::new(shard));
        self.setups.last_mut().expect("just pushed")
    }

    /// Validate, exchange the directory, wire the gate mesh, and return the
    /// ready-to-run group.
    pub fn build(mut self) -> KernelResult<PatchGroup> {
        if self.setups.is_empty() {
            return Err(KernelError::Config(
                "a patch group needs at least one patch".into(),
            ));
        }
        for (i, setup) in self.setups.iter().enumerate() {
            if !self.fabric.is_local(setup.shard) {
                return Err(KernelError::Config(format!(
                    "shard {} is not assigned to rank {} by the fabric",
                    setup.shard,
                    self.fabric.rank()
                )));
            }
            if self.setups[..i].iter().any(|s| s.shard == setup.shard) {
                return Err(KernelError::Config(format!(
                    "shard {} declared twice",
                    setup.shard
                )));
            }
        }

        // ── Construct local patches, dates frozen until the world is up ───
        let mut patches = Vec::with_capacity(self.setups.len());
        for setup in self.setups {
            let mut patch = Patch::new(
                setup.shard,
                self.config.clone(),
                Box::new(YieldEachCycle),
            );
            patch.freeze_dates(true);
            for (kind, resource) in setup.services {
                patch.add_service(&kind, resource);
            }
            for resource in setup.resources {
                patch.add_resource(resource);
            }
            for (agent, at) in setup.seeds {
                patch.launch(agent, at)?;
            }
            patches.push(patch);
        }

        // ── Directory exchange (the one all-gather) ───────────────────────
        let mut mine: Vec<(String, String, GlobalAddress)> = Vec::new();
        for patch in &mut patches {
            mine.extend(patch.take_staged_services());
        }
        let payload = serde_json::to_vec(&mine).map_err(|e| KernelError::Codec(e.to_string()))?;
        let gathered = self.fabric.all_gather(payload)?;

        let mut directory = Directory::default();
        for bytes in gathered {
            let entries: Vec<(String, String, GlobalAddress)> =
                serde_json::from_slice(&bytes).map_err(|e| KernelError::Codec(e.to_string()))?;
            for (kind, name, addr) in entries {
                directory.insert(&kind, &name, addr);
            }
        }
        directory.finalize();

        // Every shard registers exactly one date-change queue, so that kind
        // doubles as the world's shard roster.
        let roster: Vec<(ShardId, GlobalAddress)> = directory
            .lookup(DATE_CHANGE_KIND)
            .iter()
            .map(|(_, addr)| (addr.shard, *addr))
            .collect();
        for (i, (shard, _)) in roster.iter().enumerate() {
            if roster[..i].iter().any(|(s, _)| s == shard) {
                return Err(KernelError::Config(format!(
                    "shard {shard} declared by more than one process"
                )));
            }
        }
        let directory = Arc::new(directory);

        // ── Gate mesh, rollover peers, unfreeze ───────────────────────────
        for patch in &mut patches {
            patch.set_directory(Arc::clone(&directory));
            let me = patch.shard();
            let peers: Vec<(ShardId, GlobalAddress)> = roster
                .iter()
                .filter(|(shard, _)| *shard != me)
                .copied()
                .collect();
            for &(shard, _) in &peers {
                patch.connect_gate(shard);
                patch.expect_gate_from(shard);
            }
            patch.set_rollover_peers(peers);
            patch.freeze_dates(false);
        }

        // Everyone reaches here with a complete directory before any shard
        // starts simulating.
        self.fabric.barrier()?;

        Ok(PatchGroup::assemble(
            self.fabric,
            patches,
            Arc::new(self.registry),
        ))
    }
}
