//! `PatchGroup` — multi-shard, multi-process orchestration.
//!
//! The group owns the transport fabric and every patch local to this
//! process, and drives the top-level step loop: one scheduling turn per
//! patch in fixed order, then a non-blocking drain of inbound envelopes and
//! dispatch of the turns' gate batches.  The loop never blocks on a
//! specific shard — network I/O overlaps local computation, and the run
//! ends only when every process has agreed to stop.

use std::sync::Arc;

use tracing::debug;

use pdes_agent::{AgentRegistry, MigrationBatch};
use pdes_core::{KernelError, KernelResult, ShardId};
use pdes_net::{Fabric, MsgKind};

use crate::gate::OutboundBatch;
use crate::observer::{RunSummary, SimObserver};
use crate::patch::Patch;

/// All shards hosted by this process plus the fabric connecting them to the
/// rest of the world.  Built by
/// [`PatchGroupBuilder`][crate::PatchGroupBuilder].
pub struct PatchGroup {
    fabric: Box<dyn Fabric>,
    patches: Vec<Patch>,
    registry: Arc<AgentRegistry>,
}

impl std::fmt::Debug for PatchGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatchGroup")
            .field("patches", &self.patches.len())
            .finish()
    }
}

impl PatchGroup {
    pub(crate) fn assemble(
        fabric: Box<dyn Fabric>,
        patches: Vec<Patch>,
        registry: Arc<AgentRegistry>,
    ) -> Self {
        Self {
            fabric,
            patches,
            registry,
        }
    }

    pub fn patches(&self) -> &[Patch] {
        &self.patches
    }

    /// The local patch hosting `shard`, if any.
    pub fn patch(&self, shard: ShardId) -> Option<&Patch> {
        self.patches.iter().find(|p| p.shard() == shard)
    }

    fn index_of(&self, shard: ShardId) -> KernelResult<usize> {
        self.patches
            .iter()
            .position(|p| p.shard() == shard)
            .ok_or_else(|| {
                KernelError::Transport(format!("shard {shard} is not hosted by this process"))
            })
    }

    /// Drive the whole run to completion.
    ///
    /// Each iteration: (1) flush inbound batches queued by the previous
    /// cycle into their gate exits, (2) give every local patch exactly one
    /// turn, (3) dispatch the turns' outbound batches — direct handoff for
    /// same-process destinations, serialized envelopes otherwise, (4) once
    /// every local shard wants to stop, join the distributed shutdown
    /// handshake and terminate when the whole world agrees.
    pub fn run(&mut self, obs: &mut dyn SimObserver) -> KernelResult<RunSummary> {
        loop {
            self.drain_inbound()?;

            let mut outbound: Vec<(usize, OutboundBatch)> = Vec::new();
            let mut all_stopping = true;
            for idx in 0..self.patches.len() {
                self.fabric.tick_clock();
                let clock = self.fabric.clock().clone();
                let report = self.patches[idx].turn(&clock, obs)?;
                all_stopping &= report.wants_stop;
                for batch in report.outbound {
                    outbound.push((idx, batch));
                }
            }

            for (src, batch) in outbound {
                self.dispatch(src, batch)?;
            }

            if all_stopping {
                self.fabric.request_shutdown()?;
                if self.fabric.shutdown_agreed() {
                    break;
                }
                // Our shards are done but the world is not: keep servicing
                // inbound protocol traffic without burning the core.
                std::thread::yield_now();
            }
        }

        let summary = self.summary();
        obs.on_run_end(&summary);
        Ok(summary)
    }

    /// Route every delivered envelope into its destination patch.
    fn drain_inbound(&mut self) -> KernelResult<()> {
        while let Some(env) = self.fabric.try_recv()? {
            match env.kind {
                MsgKind::AgentBatch => {
                    let batch: MigrationBatch = serde_json::from_slice(&env.payload)
                        .map_err(|e| KernelError::Codec(e.to_string()))?;
                    debug!(
                        from = env.from.0,
                        to = env.to.0,
                        agents = batch.agents.len(),
                        "inbound batch"
                    );
                    let idx = self.index_of(env.to)?;
                    self.patches[idx].absorb_wire(env.from, batch, &self.registry)?;
                }
            }
        }
        Ok(())
    }

    /// Complete one gate batch: extract the shipped agents from the sender
    /// and hand them over (boxed locally, serialized across processes).
    fn dispatch(&mut self, src: usize, batch: OutboundBatch) -> KernelResult<()> {
        let src_shard = self.patches[src].shard();
        if self.fabric.is_local(batch.dest) {
            let agents = self.patches[src].extract_for_handoff(&batch.agents)?;
            let dst = self.index_of(batch.dest)?;
            self.patches[dst].absorb_boxed(src_shard, batch.send_day, agents)
        } else {
            let snapshots = self.patches[src].export_and_remove(&batch.agents)?;
            let wire = MigrationBatch {
                sender_day: batch.send_day,
                agents: snapshots,
            };
            let payload =
                serde_json::to_vec(&wire).map_err(|e| KernelError::Codec(e.to_string()))?;
            self.fabric
                .send(MsgKind::AgentBatch, src_shard, batch.dest, payload)
        }
    }

    /// Per-shard accounting for everything this process hosts.
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            per_shard: self
                .patches
                .iter()
                .map(|p| (p.shard(), p.stats().clone()))
                .collect(),
        }
    }
}
