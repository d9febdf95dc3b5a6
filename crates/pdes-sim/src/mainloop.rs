//! The per-shard driving loop.
//!
//! # Cooperative scheduling
//!
//! One agent body executes at a time within a shard.  The loop pops the
//! next `(agent, day)` pair from the sequencer and trampolines the agent's
//! state machine: non-suspending outcomes (an immediately granted lock, an
//! unlock with no waiter) are fed straight back in as the next wake, and
//! control returns to the loop only when the agent parks, sleeps, or exits.
//!
//! # The clock duty
//!
//! A reserved timeless id — the clock agent — loops forever at the back of
//! each day's queue.  When it comes up the shard performs its cycle duties:
//! flush the gate entrances, rouse the date-change queue, and either bump
//! the day (quiescent, no peers), poll the rollover protocol (quiescent,
//! peers), or do nothing (work remains).  The injected tick policy then
//! decides whether the loop keeps draining or yields to the orchestrator.

use rustc_hash::FxHashMap;
use tracing::{debug, info, trace};

use pdes_agent::{Agent, AwakenTarget, ShardView, Step, Wake};
use pdes_core::{
    Day, GlobalAddress, KernelError, KernelResult, LocalId, RendezvousKey, RolloverAck, ShardId,
    VectorClock,
};
use pdes_interact::{InteractError, LockOutcome, Resource, UnlockOutcome, WaitTarget};
use pdes_sched::{CycleControl, Sequencer, TickPolicy};

use crate::gate::OutboundBatch;
use crate::observer::{RunSummary, SimObserver};
use crate::patch::{Arena, Directory, Patch, agent_label, route};
use crate::rollover::DateChangeMsg;

// ── MainLoop ──────────────────────────────────────────────────────────────────

/// Scheduler state of one shard: the sequencer, pending wake reasons, and
/// the cycle-boundary flags.
pub struct MainLoop {
    pub(crate) seq: Sequencer,
    /// Wake reason for each agent's next resumption; absent means a plain
    /// [`Wake::Scheduled`].
    pub(crate) wakes: FxHashMap<LocalId, Wake>,
    /// Date advancement suppressed (distributed setup in progress).
    pub(crate) dates_frozen: bool,
    /// The shard has reached its end day and wants the run to stop.
    pub(crate) stopping: bool,
    pub(crate) clock_id: LocalId,
    policy: Box<dyn TickPolicy>,
}

impl MainLoop {
    pub(crate) fn new(clock_id: LocalId, policy: Box<dyn TickPolicy>) -> Self {
        Self {
            seq: Sequencer::new(Day::ZERO),
            wakes: FxHashMap::default(),
            dates_frozen: false,
            stopping: false,
            clock_id,
            policy,
        }
    }
}

/// What one scheduling turn produced.
#[derive(Default)]
pub struct TurnReport {
    /// Gate batches drained this turn, awaiting dispatch.
    pub outbound: Vec<OutboundBatch>,
    /// The shard has reached its end day.
    pub wants_stop: bool,
    /// Agent resumptions driven.
    pub events: usize,
    /// Cycle boundaries crossed.
    pub cycles: usize,
}

// ── Driving loop ──────────────────────────────────────────────────────────────

/// How many consecutive no-progress cycles a standalone run tolerates
/// before declaring the shard stalled.
const STALL_CYCLES: usize = 3;

impl Patch {
    /// Give this shard one scheduling turn.
    ///
    /// Under a yielding tick policy the turn ends at the first cycle
    /// boundary; under [`RunToCompletion`][pdes_sched::RunToCompletion] it
    /// drains until the shard reaches its end day.
    pub fn turn(
        &mut self,
        clock: &VectorClock,
        obs: &mut dyn SimObserver,
    ) -> KernelResult<TurnReport> {
        let mut report = TurnReport::default();
        let mut events_at_last_cycle = 0usize;
        let mut stalled_cycles = 0usize;

        while let Some((id, now)) = self.main.seq.next() {
            if id == self.main.clock_id {
                let bumped = self.clock_duty(clock, &mut report)?;
                let today = self.main.seq.time_now();
                self.main
                    .seq
                    .enqueue(self.main.clock_id, true, today)
                    .map_err(|e| self.temporal(e))?;
                report.cycles += 1;
                obs.on_cycle(self.shard, today);
                if bumped {
                    obs.on_day(self.shard, today);
                }
                if self.main.stopping {
                    break;
                }
                if let CycleControl::Yield = self.main.policy.end_of_cycle(self.shard, today) {
                    break;
                }
                // A standalone run that is neither advancing days nor
                // resuming agents can only be a modeling bug; fail loudly
                // rather than spinning.
                if report.events == events_at_last_cycle && !bumped {
                    stalled_cycles += 1;
                    if stalled_cycles >= STALL_CYCLES {
                        return Err(KernelError::Protocol(format!(
                            "shard {} stalled at {today}: blocked non-timeless work cannot proceed",
                            self.shard
                        )));
                    }
                } else {
                    stalled_cycles = 0;
                }
                events_at_last_cycle = report.events;
                continue;
            }

            if let Some(agent) = self.arena.get(id) {
                obs.on_event(self.shard, now, agent.name());
            }
            report.events += 1;
            self.stats.events += 1;
            let wake = self.main.wakes.remove(&id).unwrap_or(Wake::Scheduled);
            self.drive(id, wake, now)?;
        }

        report.wants_stop = self.main.stopping;
        Ok(report)
    }

    /// Drive one shard to completion without an orchestrator — the
    /// single-shard entry point.
    pub fn run_local(&mut self, obs: &mut dyn SimObserver) -> KernelResult<RunSummary> {
        let mut clock = VectorClock::new(1);
        loop {
            clock.tick(0);
            let report = self.turn(&clock, obs)?;
            if report.wants_stop {
                break;
            }
        }
        let summary = RunSummary {
            per_shard: vec![(self.shard, self.stats.clone())],
        };
        obs.on_run_end(&summary);
        Ok(summary)
    }

    // ── Cycle duties ──────────────────────────────────────────────────────

    /// Gate flushes, date-queue rousing, and day advancement.  Returns
    /// `true` if the day was bumped.
    fn clock_duty(&mut self, clock: &VectorClock, report: &mut TurnReport) -> KernelResult<bool> {
        self.flush_gates(report)?;
        self.rouse_date_queue()?;

        if self.main.dates_frozen {
            return Ok(false);
        }
        let now = self.main.seq.time_now();
        if now >= self.config.end_day {
            self.main.stopping = true;
            return Ok(false);
        }
        if !self.quiescent() {
            return Ok(false);
        }
        if self.rollover.peers.is_empty() {
            // No peers to poll: advance unilaterally.
            self.bump();
            return Ok(true);
        }
        self.rollover_poll(clock)
    }

    /// The gate-agent duty: drain every entrance queue into bounded
    /// batches.  The drained agents stay resident until dispatch extracts
    /// them.
    fn flush_gates(&mut self, report: &mut TurnReport) -> KernelResult<()> {
        let now = self.main.seq.time_now();
        for gate in self.gates_out.values_mut() {
            let res = self
                .resources
                .get_mut(&gate.queue)
                .expect("gate queues are registered at connect time");
            let waiters = res.drain();
            if waiters.is_empty() {
                continue;
            }
            debug!(
                shard = self.shard.0,
                dest = gate.dest.0,
                agents = waiters.len(),
                %now,
                "gate flush"
            );
            for chunk in waiters.chunks(self.config.gate_batch_limit.max(1)) {
                gate.batches_sent += 1;
                gate.agents_sent += chunk.len() as u64;
                report.outbound.push(OutboundBatch {
                    dest: gate.dest,
                    send_day: now,
                    agents: chunk.iter().map(|w| w.agent).collect(),
                });
            }
        }
        Ok(())
    }

    /// The date-change duty's queue half: rouse every visiting protocol
    /// message so it can re-evaluate this shard's day status.
    fn rouse_date_queue(&mut self) -> KernelResult<()> {
        let now = self.main.seq.time_now();
        let res = self
            .resources
            .get_mut(&self.rollover.queue)
            .expect("the date-change queue is registered at construction");
        for waiter in res.drain() {
            self.main
                .wakes
                .insert(waiter.agent, Wake::Roused { key: waiter.key });
            self.main
                .seq
                .enqueue(waiter.agent, waiter.timeless, now)
                .map_err(|e| self.temporal(e))?;
        }
        Ok(())
    }

    /// The rollover duty: open a round if none is out, otherwise try to
    /// commit the open one.  Only called when the shard is quiescent.
    pub(crate) fn rollover_poll(&mut self, clock: &VectorClock) -> KernelResult<bool> {
        let now = self.main.seq.time_now();

        if !self.rollover.round_open {
            let stamp = clock.clone();
            let home = GlobalAddress::new(self.shard, self.rollover.queue);
            let peers = self.rollover.peers.clone();
            debug!(shard = self.shard.0, %now, peers = peers.len(), "rollover round opened");
            for (_, peer_queue) in &peers {
                let msg =
                    DateChangeMsg::outgoing(self.shard, home, *peer_queue, now, stamp.clone());
                self.launch(Box::new(msg), now)?;
            }
            self.rollover.round_open = true;
            self.rollover.sent = peers.len();
            self.rollover.proposed = now;
            self.rollover.acks.clear();
            return Ok(false);
        }

        if self.rollover.proposed != now {
            // The round is stale relative to the clock; abandon the tally.
            self.rollover.reset();
            return Ok(false);
        }
        if self.rollover.acks.len() < self.rollover.sent {
            return Ok(false);
        }
        // Every message came home: commit, but only causally safely.
        for ack in &self.rollover.acks {
            if ack.proposed != now {
                self.rollover.reset();
                return Ok(false);
            }
            if !ack.stamp.precedes(clock) {
                return Err(KernelError::CausalityBreach { peer: ack.peer });
            }
        }
        self.rollover.reset();
        self.bump();
        Ok(true)
    }

    fn bump(&mut self) {
        let new_day = self.main.seq.bump_time();
        self.stats.days_completed += 1;
        info!(shard = self.shard.0, %new_day, "day rollover committed");
    }

    // ── Trampoline ────────────────────────────────────────────────────────

    /// Resume one agent and trampoline its steps until it suspends, parks,
    /// or exits.
    fn drive(&mut self, id: LocalId, first_wake: Wake, now: Day) -> KernelResult<()> {
        enum Disposition {
            Suspended,
            Exited,
        }

        let mut agent = self.arena.take(id).ok_or_else(|| {
            KernelError::Protocol(format!("agent {id} is scheduled but not resident"))
        })?;
        let timeless = agent.timeless();
        let agent_name = agent.name().to_string();
        let mut wake = first_wake;

        let disposition = loop {
            let step = {
                let mut ctx = TurnCtx {
                    shard: self.shard,
                    now,
                    self_id: id,
                    agent_name: &agent_name,
                    seq: &mut self.main.seq,
                    wakes: &mut self.main.wakes,
                    arena: &mut self.arena,
                    resources: &mut self.resources,
                    directory: &self.directory,
                    gates_out: &self.gates_out,
                    acks: &mut self.rollover.acks,
                };
                agent.step(wake, &mut ctx)?
            };
            if agent.debug() {
                debug!(shard = self.shard.0, agent = %agent_name, ?step, %now, "step");
            }

            match step {
                Step::Lock(dest) => {
                    let (hop, is_final) = self.path_to(dest)?;
                    let res = self
                        .resources
                        .get_mut(&hop.local)
                        .expect("routing only returns registered resources");
                    match res.lock(id, timeless) {
                        LockOutcome::Granted => {
                            wake = Wake::Granted(dest);
                        }
                        LockOutcome::Parked => {
                            trace!(
                                shard = self.shard.0,
                                agent = %agent_name,
                                resource = res.name(),
                                is_final,
                                "parked"
                            );
                            break Disposition::Suspended;
                        }
                    }
                }

                Step::Unlock(target) => {
                    if !target.is_on(self.shard) {
                        return Err(KernelError::Protocol(format!(
                            "agent `{agent_name}` unlocked remote address {target}"
                        )));
                    }
                    let res = self.resources.get_mut(&target.local).ok_or(
                        KernelError::Unroutable {
                            shard: self.shard,
                            addr: target,
                        },
                    )?;
                    match res.unlock(id) {
                        Ok(UnlockOutcome::Released) => {
                            wake = Wake::Released(target);
                        }
                        Ok(UnlockOutcome::Handoff(next)) => {
                            // Both the promoted waiter and the releaser
                            // resume at the current day, in scheduler FIFO
                            // order.
                            self.main.wakes.insert(next.agent, Wake::Granted(target));
                            self.main
                                .seq
                                .enqueue(next.agent, next.timeless, now)
                                .map_err(|e| self.temporal(e))?;
                            self.main.wakes.insert(id, Wake::Released(target));
                            self.main
                                .seq
                                .enqueue(id, timeless, now)
                                .map_err(|e| self.temporal(e))?;
                            break Disposition::Suspended;
                        }
                        Err(e) => {
                            return Err(interact_fatal(e, &self.arena, (id, &agent_name)));
                        }
                    }
                }

                Step::Sleep(days) => {
                    self.main
                        .seq
                        .enqueue(id, timeless, now + days)
                        .map_err(|e| self.temporal(e))?;
                    break Disposition::Suspended;
                }

                Step::Exit => break Disposition::Exited,
            }
        };

        match disposition {
            Disposition::Suspended => self.arena.put(id, agent),
            Disposition::Exited => {
                trace!(shard = self.shard.0, agent = %agent_name, "exited");
                if !timeless {
                    self.stats.exited += 1;
                }
            }
        }
        Ok(())
    }
}

// ── The agent-facing view ─────────────────────────────────────────────────────

/// Borrowed view of the shard's internals for the duration of one
/// `Agent::step` call.  The running agent itself is held by the trampoline,
/// so every table here excludes it.
struct TurnCtx<'a> {
    shard: ShardId,
    now: Day,
    self_id: LocalId,
    agent_name: &'a str,
    seq: &'a mut Sequencer,
    wakes: &'a mut FxHashMap<LocalId, Wake>,
    arena: &'a mut Arena,
    resources: &'a mut FxHashMap<LocalId, Resource>,
    directory: &'a Directory,
    gates_out: &'a std::collections::BTreeMap<ShardId, crate::gate::GateEntrance>,
    acks: &'a mut Vec<RolloverAck>,
}

impl ShardView for TurnCtx<'_> {
    fn now(&self) -> Day {
        self.now
    }

    fn here(&self) -> ShardId {
        self.shard
    }

    fn self_addr(&self) -> GlobalAddress {
        GlobalAddress::new(self.shard, self.self_id)
    }

    fn path_to(&self, addr: GlobalAddress) -> KernelResult<(GlobalAddress, bool)> {
        route(self.shard, self.resources, self.gates_out, addr)
    }

    fn service_lookup(&self, kind: &str) -> &[(String, GlobalAddress)] {
        self.directory.lookup(kind)
    }

    fn reserve_key(&mut self, queue: GlobalAddress) -> KernelResult<RendezvousKey> {
        if !queue.is_on(self.shard) {
            return Err(KernelError::Unroutable {
                shard: self.shard,
                addr: queue,
            });
        }
        let res = self
            .resources
            .get_mut(&queue.local)
            .ok_or(KernelError::Unroutable {
                shard: self.shard,
                addr: queue,
            })?;
        res.reserve(self.self_id)
            .map_err(|e| interact_fatal(e, self.arena, (self.self_id, self.agent_name)))
    }

    fn awaken(
        &mut self,
        resource: GlobalAddress,
        target: AwakenTarget,
    ) -> KernelResult<GlobalAddress> {
        if !resource.is_on(self.shard) {
            return Err(KernelError::Unroutable {
                shard: self.shard,
                addr: resource,
            });
        }
        let res = self
            .resources
            .get_mut(&resource.local)
            .ok_or(KernelError::Unroutable {
                shard: self.shard,
                addr: resource,
            })?;
        let wait_target = match target {
            AwakenTarget::Agent(addr) if addr.is_on(self.shard) => WaitTarget::Agent(addr.local),
            AwakenTarget::Agent(addr) => {
                return Err(KernelError::AwakenTargetMissing {
                    target: addr.to_string(),
                    resource: res.name().to_string(),
                });
            }
            AwakenTarget::Key(key) => WaitTarget::Key(key),
        };
        let waiter = res
            .awaken(wait_target)
            .map_err(|e| interact_fatal(e, self.arena, (self.self_id, self.agent_name)))?;
        self.wakes
            .insert(waiter.agent, Wake::Roused { key: waiter.key });
        self.seq
            .enqueue(waiter.agent, waiter.timeless, self.now)
            .map_err(|e| {
                let pdes_sched::SchedError::IntoPast { agent, day, now } = e;
                KernelError::ScheduleIntoPast {
                    agent: agent_label(self.arena, agent),
                    day,
                    now,
                }
            })?;
        Ok(GlobalAddress::new(self.shard, waiter.agent))
    }

    fn is_locked(&self, resource: GlobalAddress, agent: GlobalAddress) -> KernelResult<bool> {
        if !resource.is_on(self.shard) {
            return Err(KernelError::Unroutable {
                shard: self.shard,
                addr: resource,
            });
        }
        let res = self
            .resources
            .get(&resource.local)
            .ok_or(KernelError::Unroutable {
                shard: self.shard,
                addr: resource,
            })?;
        Ok(agent.is_on(self.shard) && res.is_locked(agent.local))
    }

    fn launch(&mut self, agent: Box<dyn Agent>, at: Day) -> KernelResult<GlobalAddress> {
        if at < self.now {
            return Err(KernelError::ScheduleIntoPast {
                agent: agent.name().to_string(),
                day: at,
                now: self.now,
            });
        }
        let timeless = agent.timeless();
        let id = self.arena.admit(agent);
        self.seq
            .enqueue(id, timeless, at)
            .expect("launch day was just checked against now");
        Ok(GlobalAddress::new(self.shard, id))
    }

    fn quiescent_today(&self) -> bool {
        self.seq.quiescent_today() && self.resources.values().all(|r| r.enqueued() == 0)
    }

    fn record_rollover_ack(&mut self, ack: RolloverAck) {
        trace!(shard = self.shard.0, peer = ack.peer.0, "rollover ack tallied");
        self.acks.push(ack);
    }
}

// ── Error mapping ─────────────────────────────────────────────────────────────

/// Attach agent names to a resource-contract violation and lift it into the
/// fatal kernel taxonomy.  The running agent is out of the arena for the
/// duration of its step, so its name is carried separately.
fn interact_fatal(
    err: InteractError,
    arena: &Arena,
    running: (LocalId, &str),
) -> KernelError {
    let label = |id: LocalId| {
        if id == running.0 {
            running.1.to_string()
        } else {
            agent_label(arena, id)
        }
    };
    match err {
        InteractError::NotHolder { resource, agent } => KernelError::UnlockWithoutHold {
            agent: label(agent),
            resource,
        },
        InteractError::NotWaiting { resource, target } => {
            KernelError::AwakenTargetMissing { target, resource }
        }
        InteractError::StaleKey { resource } => KernelError::StaleRendezvousKey { resource },
        InteractError::NotARendezvous { resource } => {
            KernelError::Protocol(format!("`{resource}` does not issue rendezvous keys"))
        }
    }
}
