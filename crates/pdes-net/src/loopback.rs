//! In-process loopback transport: every "process" is a thread.
//!
//! Each rank owns one unbounded crossbeam receiver; every rank holds a
//! sender handle to every other rank.  Crossbeam channels preserve
//! per-sender FIFO order, which is exactly the ordering guarantee the
//! [`Fabric`] contract demands.  Barriers and the start-up all-gather ride
//! `std::sync` primitives shared through one `Arc`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier, Mutex};

use crossbeam::channel::{Receiver, Sender, unbounded};
use rustc_hash::FxHashMap;
use tracing::trace;

use pdes_core::{KernelError, KernelResult, ShardId, VectorClock};

use crate::fabric::{Envelope, Fabric, MAX_PAYLOAD, MsgKind};

// ── Shared world state ────────────────────────────────────────────────────────

struct Shared {
    barrier: Barrier,
    /// One slot per rank for the all-gather exchange.
    gather: Mutex<Vec<Option<Vec<u8>>>>,
    /// Sticky per-rank shutdown requests.
    shutdown: Vec<AtomicBool>,
}

// ── LoopbackFabric ────────────────────────────────────────────────────────────

/// One rank's endpoint of the loopback world.
pub struct LoopbackFabric {
    rank: usize,
    clock: VectorClock,
    /// Sender handle per destination rank (index = rank).
    txs: Vec<Sender<Envelope>>,
    rx: Receiver<Envelope>,
    homes: Arc<FxHashMap<ShardId, usize>>,
    shared: Arc<Shared>,
}

impl LoopbackFabric {
    /// Build a fully connected world of `ranks` endpoints.
    ///
    /// `homes` assigns every shard of the run to its owning rank; all
    /// endpoints share the same map.  Returns one fabric per rank, in rank
    /// order — hand each to its thread.
    pub fn world(ranks: usize, homes: &[(ShardId, usize)]) -> KernelResult<Vec<LoopbackFabric>> {
        if ranks == 0 {
            return Err(KernelError::Config("world needs at least one rank".into()));
        }
        let home_map: FxHashMap<ShardId, usize> = homes.iter().copied().collect();
        for &(shard, rank) in homes {
            if rank >= ranks {
                return Err(KernelError::Config(format!(
                    "shard {shard} assigned to rank {rank}, but world has {ranks} ranks"
                )));
            }
        }
        let home_map = Arc::new(home_map);

        let shared = Arc::new(Shared {
            barrier: Barrier::new(ranks),
            gather: Mutex::new(vec![None; ranks]),
            shutdown: (0..ranks).map(|_| AtomicBool::new(false)).collect(),
        });

        let (txs, rxs): (Vec<_>, Vec<_>) = (0..ranks).map(|_| unbounded()).unzip();
        Ok(rxs
            .into_iter()
            .enumerate()
            .map(|(rank, rx)| LoopbackFabric {
                rank,
                clock: VectorClock::new(ranks),
                txs: txs.clone(),
                rx,
                homes: Arc::clone(&home_map),
                shared: Arc::clone(&shared),
            })
            .collect())
    }

    /// A one-rank world hosting all of `shards` — the single-process case.
    pub fn single(shards: &[ShardId]) -> KernelResult<LoopbackFabric> {
        let homes: Vec<(ShardId, usize)> = shards.iter().map(|&s| (s, 0)).collect();
        let mut world = Self::world(1, &homes)?;
        Ok(world.remove(0))
    }
}

impl Fabric for LoopbackFabric {
    fn rank(&self) -> usize {
        self.rank
    }

    fn world_size(&self) -> usize {
        self.txs.len()
    }

    fn send(
        &mut self,
        kind: MsgKind,
        from: ShardId,
        to: ShardId,
        payload: Vec<u8>,
    ) -> KernelResult<()> {
        if payload.len() > MAX_PAYLOAD {
            return Err(KernelError::Transport(format!(
                "payload of {} bytes exceeds the {MAX_PAYLOAD}-byte bound",
                payload.len()
            )));
        }
        let dest_rank = self
            .rank_of(to)
            .ok_or_else(|| KernelError::Transport(format!("no rank owns shard {to}")))?;
        self.clock.tick(self.rank);
        trace!(%from, %to, dest_rank, bytes = payload.len(), "loopback send");
        self.txs[dest_rank]
            .send(Envelope {
                kind,
                from,
                to,
                clock: self.clock.clone(),
                payload,
            })
            .map_err(|_| KernelError::Transport("receiving rank hung up".into()))
    }

    fn try_recv(&mut self) -> KernelResult<Option<Envelope>> {
        match self.rx.try_recv() {
            Ok(env) => {
                self.clock.merge(&env.clock);
                self.clock.tick(self.rank);
                Ok(Some(env))
            }
            Err(crossbeam::channel::TryRecvError::Empty) => Ok(None),
            Err(crossbeam::channel::TryRecvError::Disconnected) => {
                Err(KernelError::Transport("all senders hung up".into()))
            }
        }
    }

    fn barrier(&mut self) -> KernelResult<()> {
        self.shared.barrier.wait();
        Ok(())
    }

    fn all_gather(&mut self, bytes: Vec<u8>) -> KernelResult<Vec<Vec<u8>>> {
        {
            let mut slots = self
                .shared
                .gather
                .lock()
                .map_err(|_| KernelError::Transport("gather lock poisoned".into()))?;
            slots[self.rank] = Some(bytes);
        }
        self.shared.barrier.wait();
        let out = {
            let slots = self
                .shared
                .gather
                .lock()
                .map_err(|_| KernelError::Transport("gather lock poisoned".into()))?;
            slots
                .iter()
                .map(|s| s.clone().expect("every rank contributed before the barrier"))
                .collect()
        };
        // Second barrier: nobody may start a later gather round until every
        // rank has read this one.
        self.shared.barrier.wait();
        Ok(out)
    }

    fn clock(&self) -> &VectorClock {
        &self.clock
    }

    fn tick_clock(&mut self) {
        self.clock.tick(self.rank);
    }

    fn request_shutdown(&mut self) -> KernelResult<()> {
        self.shared.shutdown[self.rank].store(true, Ordering::SeqCst);
        Ok(())
    }

    fn shutdown_agreed(&self) -> bool {
        self.shared.shutdown.iter().all(|f| f.load(Ordering::SeqCst))
    }

    fn is_local(&self, shard: ShardId) -> bool {
        self.rank_of(shard) == Some(self.rank)
    }

    fn rank_of(&self, shard: ShardId) -> Option<usize> {
        self.homes.get(&shard).copied()
    }
}
