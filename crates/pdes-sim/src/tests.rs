//! Integration tests for pdes-sim.

use std::sync::{Arc, Mutex};
use std::thread;

use pdes_agent::{Agent, AgentRegistry, AgentSnapshot, AwakenTarget, Portable, ShardView, Step, Wake};
use pdes_core::{
    Day, GlobalAddress, KernelError, KernelResult, LocalId, RendezvousKey, RolloverAck, RunConfig,
    ShardId, VectorClock,
};
use pdes_interact::Resource;
use pdes_net::{Fabric, LoopbackFabric};
use pdes_sched::RunToCompletion;

use crate::rollover::DateChangeMsg;
use crate::{NoopObserver, Patch, PatchGroupBuilder};

// ── Helpers ───────────────────────────────────────────────────────────────────

type EventLog = Arc<Mutex<Vec<(String, u64, &'static str)>>>;

fn s(n: u32) -> ShardId {
    ShardId(n)
}

fn new_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

fn log_of(log: &EventLog) -> Vec<(String, u64, &'static str)> {
    log.lock().unwrap().clone()
}

fn standalone_patch(days: u64) -> Patch {
    Patch::new(s(0), RunConfig::days(days, 42), Box::new(RunToCompletion))
}

// ── Test patient ──────────────────────────────────────────────────────────────

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
enum PatientPhase {
    Seeking,
    InBed,
    Leaving,
}

#[derive(Clone, Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
struct PatientState {
    /// Chosen ward.  `None` until resolved through the directory, after
    /// which it is pinned so migration cannot re-route the stay.
    ward: Option<GlobalAddress>,
    /// Whether directory resolution should prefer a ward on another shard.
    prefer_remote: bool,
    stay_days: u64,
    phase: PatientPhase,
}

/// Seeks a bed, occupies it for `stay_days`, discharges, exits.
struct Patient {
    name: String,
    state: PatientState,
    log: Option<EventLog>,
}

impl Patient {
    /// A patient pointed at a known ward.
    fn to_ward(name: &str, ward: GlobalAddress, stay_days: u64, log: Option<EventLog>) -> Self {
        Self {
            name: name.to_string(),
            state: PatientState {
                ward: Some(ward),
                prefer_remote: false,
                stay_days,
                phase: PatientPhase::Seeking,
            },
            log,
        }
    }

    /// A patient that resolves a ward through the directory, preferring one
    /// hosted on a different shard.
    fn transfer(name: &str, stay_days: u64) -> Self {
        Self {
            name: name.to_string(),
            state: PatientState {
                ward: None,
                prefer_remote: true,
                stay_days,
                phase: PatientPhase::Seeking,
            },
            log: None,
        }
    }

    fn note(&self, day: Day, what: &'static str) {
        if let Some(log) = &self.log {
            log.lock().unwrap().push((self.name.clone(), day.0, what));
        }
    }

    fn resolve_ward(&mut self, ctx: &dyn ShardView) -> KernelResult<GlobalAddress> {
        if let Some(ward) = self.state.ward {
            return Ok(ward);
        }
        let here = ctx.here();
        let wards = ctx.service_lookup("ward");
        let chosen = wards
            .iter()
            .find(|(_, addr)| !self.state.prefer_remote || !addr.is_on(here))
            .or_else(|| wards.first())
            .map(|(_, addr)| *addr)
            .ok_or_else(|| KernelError::Protocol("no ward registered anywhere".into()))?;
        self.state.ward = Some(chosen);
        Ok(chosen)
    }
}

impl Agent for Patient {
    fn name(&self) -> &str {
        &self.name
    }

    fn step(&mut self, wake: Wake, ctx: &mut dyn ShardView) -> KernelResult<Step> {
        match (self.state.phase, wake) {
            (PatientPhase::Seeking, Wake::Scheduled) => {
                let ward = self.resolve_ward(ctx)?;
                Ok(Step::Lock(ward))
            }
            (PatientPhase::Seeking, Wake::Granted(_)) => {
                self.state.phase = PatientPhase::InBed;
                self.note(ctx.now(), "admitted");
                Ok(Step::Sleep(self.state.stay_days))
            }
            (PatientPhase::InBed, Wake::Scheduled) => {
                self.state.phase = PatientPhase::Leaving;
                Ok(Step::Unlock(self.state.ward.expect("ward pinned at admission")))
            }
            (PatientPhase::Leaving, Wake::Released(_)) => {
                self.note(ctx.now(), "discharged");
                Ok(Step::Exit)
            }
            (phase, wake) => Err(KernelError::Protocol(format!(
                "patient `{}` in phase {phase:?} got unexpected wake {wake:?}",
                self.name
            ))),
        }
    }

    fn export(&self) -> KernelResult<AgentSnapshot> {
        AgentSnapshot::encode(Self::KIND, &self.name, false, false, &self.state)
    }
}

impl Portable for Patient {
    const KIND: &'static str = "patient";

    fn restore(snapshot: &AgentSnapshot) -> KernelResult<Self> {
        Ok(Self {
            name: snapshot.name.clone(),
            state: snapshot.decode()?,
            log: None,
        })
    }
}

// ── Bed allocation scenario ───────────────────────────────────────────────────

#[cfg(test)]
mod bed_tests {
    use super::*;

    #[test]
    fn ward_of_two_admits_in_fifo_order() {
        // Capacity 2: P1 and P2 admitted immediately at day 0, P3 parked.
        // P1 discharges the same day (stay 0), promoting P3 at day 0.
        let log = new_log();
        let mut patch = standalone_patch(4);
        let ward = patch.add_resource(Resource::pool("icu", 2));

        for (name, stay) in [("p1", 0), ("p2", 2), ("p3", 1)] {
            patch
                .launch(
                    Box::new(Patient::to_ward(name, ward, stay, Some(log.clone()))),
                    Day::ZERO,
                )
                .unwrap();
        }
        let summary = patch.run_local(&mut NoopObserver).unwrap();

        let events = log_of(&log);
        let admissions: Vec<_> = events
            .iter()
            .filter(|(_, _, what)| *what == "admitted")
            .cloned()
            .collect();
        // P1 and P2 fill the ward at day 0; P3's admission also lands on
        // day 0 because P1's same-day discharge hands its bed over.
        assert_eq!(
            admissions,
            vec![
                ("p1".to_string(), 0, "admitted"),
                ("p2".to_string(), 0, "admitted"),
                ("p3".to_string(), 0, "admitted"),
            ]
        );
        let discharges: Vec<_> = events
            .iter()
            .filter(|(_, _, what)| *what == "discharged")
            .cloned()
            .collect();
        assert_eq!(
            discharges,
            vec![
                ("p1".to_string(), 0, "discharged"),
                ("p3".to_string(), 1, "discharged"),
                ("p2".to_string(), 2, "discharged"),
            ]
        );

        assert_eq!(summary.per_shard[0].1.exited, 3);
        // All beds free again at the end.
        let pool = patch.resource(ward).unwrap().as_pool().unwrap();
        assert_eq!(pool.n_free(), 2);
    }

    #[test]
    fn mutex_grants_strictly_in_call_order() {
        // Four patients with zero-day stays contend for a 1-bed resource;
        // admissions must follow launch order exactly.
        let log = new_log();
        let mut patch = standalone_patch(2);
        let bed = patch.add_resource(Resource::mutex("isolation-bed"));

        for name in ["a0", "a1", "a2", "a3"] {
            patch
                .launch(
                    Box::new(Patient::to_ward(name, bed, 0, Some(log.clone()))),
                    Day::ZERO,
                )
                .unwrap();
        }
        patch.run_local(&mut NoopObserver).unwrap();

        let admit_order: Vec<String> = log_of(&log)
            .into_iter()
            .filter(|(_, _, what)| *what == "admitted")
            .map(|(name, _, _)| name)
            .collect();
        assert_eq!(admit_order, vec!["a0", "a1", "a2", "a3"]);
    }

    #[test]
    fn occupied_beds_do_not_block_day_rollover() {
        // A patient holding a bed across several days is a holder, not a
        // waiter — the shard must keep rolling days while they sleep.
        let mut patch = standalone_patch(5);
        let ward = patch.add_resource(Resource::pool("icu", 1));
        patch
            .launch(Box::new(Patient::to_ward("p1", ward, 3, None)), Day::ZERO)
            .unwrap();
        let summary = patch.run_local(&mut NoopObserver).unwrap();
        assert_eq!(summary.per_shard[0].1.days_completed, 5);
        assert_eq!(summary.per_shard[0].1.exited, 1);
    }
}

// ── Keyed rendezvous scenario ─────────────────────────────────────────────────

/// Parks in a hold queue under a freshly reserved key, publishing the key
/// for a resolver to find.
struct KeyedSleeper {
    name: String,
    queue: GlobalAddress,
    slot: Arc<Mutex<Option<RendezvousKey>>>,
    roused_with: Arc<Mutex<Option<Option<RendezvousKey>>>>,
}

impl Agent for KeyedSleeper {
    fn name(&self) -> &str {
        &self.name
    }

    fn step(&mut self, wake: Wake, ctx: &mut dyn ShardView) -> KernelResult<Step> {
        match wake {
            Wake::Scheduled => {
                let key = ctx.reserve_key(self.queue)?;
                *self.slot.lock().unwrap() = Some(key);
                Ok(Step::Lock(self.queue))
            }
            Wake::Roused { key } => {
                *self.roused_with.lock().unwrap() = Some(key);
                Ok(Step::Exit)
            }
            other => Err(KernelError::Protocol(format!(
                "keyed sleeper got unexpected wake {other:?}"
            ))),
        }
    }
}

/// Picks the published key up and awakens its holder, optionally twice.
struct Resolver {
    name: String,
    queue: GlobalAddress,
    slot: Arc<Mutex<Option<RendezvousKey>>>,
    double_awaken: bool,
}

impl Agent for Resolver {
    fn name(&self) -> &str {
        &self.name
    }

    fn step(&mut self, wake: Wake, ctx: &mut dyn ShardView) -> KernelResult<Step> {
        match wake {
            Wake::Scheduled => {
                let Some(key) = *self.slot.lock().unwrap() else {
                    // The sleeper has not parked yet; yield the turn.
                    return Ok(Step::Sleep(0));
                };
                ctx.awaken(self.queue, AwakenTarget::Key(key))?;
                if self.double_awaken {
                    ctx.awaken(self.queue, AwakenTarget::Key(key))?;
                }
                Ok(Step::Exit)
            }
            other => Err(KernelError::Protocol(format!(
                "resolver got unexpected wake {other:?}"
            ))),
        }
    }
}

#[cfg(test)]
mod rendezvous_tests {
    use super::*;

    #[test]
    fn third_party_awakens_by_key_alone() {
        let mut patch = standalone_patch(1);
        let queue = patch.add_resource(Resource::rendezvous("bed-requests"));
        let slot = Arc::new(Mutex::new(None));
        let roused = Arc::new(Mutex::new(None));

        patch
            .launch(
                Box::new(KeyedSleeper {
                    name: "x".into(),
                    queue,
                    slot: Arc::clone(&slot),
                    roused_with: Arc::clone(&roused),
                }),
                Day::ZERO,
            )
            .unwrap();
        patch
            .launch(
                Box::new(Resolver {
                    name: "y".into(),
                    queue,
                    slot: Arc::clone(&slot),
                    double_awaken: false,
                }),
                Day::ZERO,
            )
            .unwrap();

        let summary = patch.run_local(&mut NoopObserver).unwrap();
        assert_eq!(summary.per_shard[0].1.exited, 2);

        // The sleeper resumed carrying the key it parked under.
        let issued = slot.lock().unwrap().expect("key was published");
        assert_eq!(*roused.lock().unwrap(), Some(Some(issued)));
    }

    #[test]
    fn second_awaken_with_consumed_key_is_fatal() {
        let mut patch = standalone_patch(1);
        let queue = patch.add_resource(Resource::rendezvous("bed-requests"));
        let slot = Arc::new(Mutex::new(None));
        let roused = Arc::new(Mutex::new(None));

        patch
            .launch(
                Box::new(KeyedSleeper {
                    name: "x".into(),
                    queue,
                    slot: Arc::clone(&slot),
                    roused_with: roused,
                }),
                Day::ZERO,
            )
            .unwrap();
        patch
            .launch(
                Box::new(Resolver {
                    name: "y".into(),
                    queue,
                    slot,
                    double_awaken: true,
                }),
                Day::ZERO,
            )
            .unwrap();

        let err = patch.run_local(&mut NoopObserver).unwrap_err();
        assert!(matches!(err, KernelError::StaleRendezvousKey { .. }));
    }
}

// ── Temporal invariants ───────────────────────────────────────────────────────

#[cfg(test)]
mod temporal_tests {
    use super::*;

    #[test]
    fn launch_into_past_rejected() {
        let mut patch = standalone_patch(3);
        patch.run_local(&mut NoopObserver).unwrap();
        assert_eq!(patch.time_now(), Day(3));
        let err = patch
            .launch(Box::new(Patient::transfer("late", 1)), Day(1))
            .unwrap_err();
        assert!(matches!(err, KernelError::ScheduleIntoPast { .. }));
    }

    #[test]
    fn gate_batch_from_past_is_fatal() {
        let mut patch = standalone_patch(2);
        patch.expect_gate_from(s(1));
        patch.run_local(&mut NoopObserver).unwrap();
        assert_eq!(patch.time_now(), Day(2));

        let stale = Patient::transfer("stale", 1);
        let err = patch
            .absorb_boxed(s(1), Day(0), vec![Box::new(stale)])
            .unwrap_err();
        assert!(matches!(
            err,
            KernelError::BatchFromPast { sent: Day(0), now: Day(2), .. }
        ));
    }

    #[test]
    fn timeless_arrivals_jump_to_receiver_day() {
        // A timeless agent from a "slow" sender is re-scheduled at the
        // receiver's current day rather than rejected.
        let mut patch = standalone_patch(2);
        patch.expect_gate_from(s(1));
        patch.run_local(&mut NoopObserver).unwrap();

        let home = GlobalAddress::new(s(1), LocalId(1));
        let target = GlobalAddress::new(s(0), LocalId(1));
        let msg = DateChangeMsg::outgoing(s(1), home, target, Day(0), VectorClock::new(1));
        patch.absorb_boxed(s(1), Day(0), vec![Box::new(msg)]).unwrap();
        assert_eq!(patch.population(), 1);
    }

    #[test]
    fn batch_from_unknown_source_is_fatal() {
        let mut patch = standalone_patch(2);
        let err = patch
            .absorb_boxed(s(9), Day(0), vec![Box::new(Patient::transfer("p", 1))])
            .unwrap_err();
        assert!(matches!(err, KernelError::Protocol(_)));
    }
}

// ── Quiescence ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod quiescence_tests {
    use super::*;

    #[test]
    fn quiescence_is_idempotent_until_work_arrives() {
        let mut patch = standalone_patch(10);
        assert!(patch.quiescent());
        assert!(patch.quiescent(), "repeated checks must stay true");

        // Timeless infrastructure does not disturb it.
        let home = GlobalAddress::new(s(0), LocalId(1));
        let msg = DateChangeMsg::outgoing(s(0), home, home, Day(0), VectorClock::new(1));
        patch.launch(Box::new(msg), Day::ZERO).unwrap();
        assert!(patch.quiescent());

        // One non-timeless agent pending today flips it.
        patch
            .launch(Box::new(Patient::transfer("p", 1)), Day::ZERO)
            .unwrap();
        assert!(!patch.quiescent());
    }

    #[test]
    fn stalled_waiter_is_detected_not_spun_on() {
        // One patient holds the only bed until past the end of the run;
        // a second parks behind it and can never be served today, so the
        // shard must fail loudly instead of looping forever.
        let mut patch = standalone_patch(3);
        let ward = patch.add_resource(Resource::pool("icu", 1));
        patch
            .launch(Box::new(Patient::to_ward("p1", ward, 50, None)), Day::ZERO)
            .unwrap();
        patch
            .launch(Box::new(Patient::to_ward("p2", ward, 1, None)), Day::ZERO)
            .unwrap();
        let err = patch.run_local(&mut NoopObserver).unwrap_err();
        assert!(matches!(err, KernelError::Protocol(msg) if msg.contains("stalled")));
    }
}

// ── Protocol violations ───────────────────────────────────────────────────────

#[cfg(test)]
mod violation_tests {
    use super::*;

    /// Unlocks a resource it never acquired.
    struct Trespasser {
        target: GlobalAddress,
    }

    impl Agent for Trespasser {
        fn name(&self) -> &str {
            "trespasser"
        }
        fn step(&mut self, _wake: Wake, _ctx: &mut dyn ShardView) -> KernelResult<Step> {
            Ok(Step::Unlock(self.target))
        }
    }

    #[test]
    fn unlock_without_hold_aborts_the_run() {
        let mut patch = standalone_patch(1);
        let ward = patch.add_resource(Resource::pool("icu", 1));
        patch
            .launch(Box::new(Trespasser { target: ward }), Day::ZERO)
            .unwrap();
        let err = patch.run_local(&mut NoopObserver).unwrap_err();
        assert!(matches!(
            err,
            KernelError::UnlockWithoutHold { agent, .. } if agent == "trespasser"
        ));
    }

    /// Locks an address no resource or gate answers to.
    struct LostSoul;

    impl Agent for LostSoul {
        fn name(&self) -> &str {
            "lost"
        }
        fn step(&mut self, _wake: Wake, _ctx: &mut dyn ShardView) -> KernelResult<Step> {
            Ok(Step::Lock(GlobalAddress::new(ShardId(77), LocalId(5))))
        }
    }

    #[test]
    fn unroutable_address_aborts_the_run() {
        let mut patch = standalone_patch(1);
        patch.launch(Box::new(LostSoul), Day::ZERO).unwrap();
        let err = patch.run_local(&mut NoopObserver).unwrap_err();
        assert!(matches!(err, KernelError::Unroutable { .. }));
    }
}

// ── Rollover protocol ─────────────────────────────────────────────────────────

#[cfg(test)]
mod rollover_tests {
    use super::*;

    #[test]
    fn datechange_msg_snapshot_roundtrip() {
        let home = GlobalAddress::new(s(0), LocalId(1));
        let target = GlobalAddress::new(s(1), LocalId(1));
        let mut stamp = VectorClock::new(2);
        stamp.tick(0);
        let msg = DateChangeMsg::outgoing(s(0), home, target, Day(7), stamp);

        let mut registry = AgentRegistry::new();
        registry.register::<DateChangeMsg>();
        let snap = msg.export().unwrap();
        let restored = registry.restore(&snap).unwrap();
        assert!(restored.timeless());
        assert_eq!(restored.name(), msg.name());
        // The restored continuation is byte-identical.
        let again = restored.export().unwrap();
        assert_eq!(snap.state, again.state);
    }

    #[test]
    fn commit_requires_causally_preceding_stamps() {
        let mut patch = standalone_patch(10);
        let peer_queue = GlobalAddress::new(s(1), LocalId(1));
        patch.set_rollover_peers(vec![(s(1), peer_queue)]);

        // Fake a fully acknowledged round whose stamp does NOT precede the
        // current clock (equal clocks are not ordered).
        let clock = VectorClock::new(2);
        patch.rollover.round_open = true;
        patch.rollover.sent = 1;
        patch.rollover.proposed = Day::ZERO;
        patch.rollover.acks.push(RolloverAck {
            peer: s(1),
            proposed: Day::ZERO,
            stamp: clock.clone(),
        });
        let err = patch.rollover_poll(&clock).unwrap_err();
        assert!(matches!(err, KernelError::CausalityBreach { peer } if peer == s(1)));
    }

    #[test]
    fn commit_with_safe_stamps_bumps_the_day() {
        let mut patch = standalone_patch(10);
        let peer_queue = GlobalAddress::new(s(1), LocalId(1));
        patch.set_rollover_peers(vec![(s(1), peer_queue)]);

        let stamp = VectorClock::new(2); // zero: precedes anything ticked
        let mut clock = VectorClock::new(2);
        clock.tick(0);

        patch.rollover.round_open = true;
        patch.rollover.sent = 1;
        patch.rollover.proposed = Day::ZERO;
        patch.rollover.acks.push(RolloverAck {
            peer: s(1),
            proposed: Day::ZERO,
            stamp,
        });
        let bumped = patch.rollover_poll(&clock).unwrap();
        assert!(bumped);
        assert_eq!(patch.time_now(), Day(1));
    }

    #[test]
    fn stale_acks_do_not_commit() {
        let mut patch = standalone_patch(10);
        let peer_queue = GlobalAddress::new(s(1), LocalId(1));
        patch.set_rollover_peers(vec![(s(1), peer_queue)]);

        let mut clock = VectorClock::new(2);
        clock.tick(0);
        patch.rollover.round_open = true;
        patch.rollover.sent = 1;
        patch.rollover.proposed = Day(5); // round from another day
        let bumped = patch.rollover_poll(&clock).unwrap();
        assert!(!bumped);
        assert!(!patch.rollover.round_open, "stale round must be abandoned");
        assert_eq!(patch.time_now(), Day::ZERO);
    }
}

// ── Multi-shard, single process ───────────────────────────────────────────────

#[cfg(test)]
mod group_tests {
    use super::*;

    #[test]
    fn two_shards_agree_on_every_day() {
        let fabric = LoopbackFabric::single(&[s(0), s(1)]).unwrap();
        let mut builder =
            PatchGroupBuilder::new(Box::new(fabric), RunConfig::days(4, 42));
        builder.add_patch(s(0)).service("ward", Resource::pool("icu", 2));
        builder.add_patch(s(1)).service("ward", Resource::pool("west", 1));
        let mut group = builder.build().unwrap();

        let summary = group.run(&mut NoopObserver).unwrap();
        assert_eq!(summary.per_shard.len(), 2);
        for (_, stats) in &summary.per_shard {
            assert_eq!(stats.days_completed, 4);
        }
        for patch in group.patches() {
            assert_eq!(patch.time_now(), Day(4));
        }
    }

    #[test]
    fn directory_lists_services_from_every_shard() {
        let fabric = LoopbackFabric::single(&[s(0), s(1)]).unwrap();
        let mut builder =
            PatchGroupBuilder::new(Box::new(fabric), RunConfig::days(1, 42));
        builder.add_patch(s(0)).service("ward", Resource::pool("icu", 2));
        builder.add_patch(s(1)).service("ward", Resource::pool("west", 1));
        let group = builder.build().unwrap();

        let patch = group.patch(s(0)).unwrap();
        let wards = patch.service_lookup("ward");
        assert_eq!(wards.len(), 2);
        // Sorted by name, identically visible from every shard.
        assert_eq!(wards[0].0, "icu");
        assert_eq!(wards[1].0, "west");
        assert!(patch.service_lookup("pharmacy").is_empty());
    }

    #[test]
    fn routing_distinguishes_local_and_remote() {
        let fabric = LoopbackFabric::single(&[s(0), s(1)]).unwrap();
        let mut builder =
            PatchGroupBuilder::new(Box::new(fabric), RunConfig::days(1, 42));
        builder.add_patch(s(0)).service("ward", Resource::pool("icu", 2));
        builder.add_patch(s(1)).service("ward", Resource::pool("west", 1));
        let group = builder.build().unwrap();

        let patch = group.patch(s(0)).unwrap();
        let wards: Vec<GlobalAddress> =
            patch.service_lookup("ward").iter().map(|(_, a)| *a).collect();
        let local = wards.iter().find(|a| a.is_on(s(0))).unwrap();
        let remote = wards.iter().find(|a| a.is_on(s(1))).unwrap();

        let (hop, is_final) = patch.path_to(*local).unwrap();
        assert!(is_final);
        assert_eq!(hop, *local);

        let (hop, is_final) = patch.path_to(*remote).unwrap();
        assert!(!is_final);
        assert!(hop.is_on(s(0)), "first hop is the local gate entrance");
    }

    #[test]
    fn patient_migrates_with_sender_time_preserved() {
        let fabric = LoopbackFabric::single(&[s(0), s(1)]).unwrap();
        let mut builder =
            PatchGroupBuilder::new(Box::new(fabric), RunConfig::days(5, 42));
        builder.registry_mut().register::<Patient>();
        builder.add_patch(s(0)).service("ward", Resource::pool("icu", 2));
        builder
            .add_patch(s(1))
            .service("ward", Resource::pool("west", 1))
            .seed(Box::new(Patient::transfer("wanderer", 1)), Day::ZERO);
        let mut group = builder.build().unwrap();

        let summary = group.run(&mut NoopObserver).unwrap();

        // The wanderer was seeded on shard 1 and prefers a remote ward, so
        // it crossed to shard 0, stayed a day, discharged, and exited there.
        let find = |shard: ShardId| {
            summary
                .per_shard
                .iter()
                .find(|(sh, _)| *sh == shard)
                .map(|(_, st)| st.clone())
                .unwrap()
        };
        assert_eq!(find(s(1)).migrated_out, 1);
        assert_eq!(find(s(0)).migrated_in, 1);
        assert_eq!(find(s(0)).exited, 1);
        for (_, stats) in &summary.per_shard {
            assert_eq!(stats.days_completed, 5);
        }
    }

    #[test]
    fn duplicate_shard_declaration_rejected() {
        let fabric = LoopbackFabric::single(&[s(0)]).unwrap();
        let mut builder =
            PatchGroupBuilder::new(Box::new(fabric), RunConfig::days(1, 42));
        builder.add_patch(s(0));
        builder.add_patch(s(0));
        assert!(matches!(
            builder.build().unwrap_err(),
            KernelError::Config(_)
        ));
    }

    #[test]
    fn foreign_shard_declaration_rejected() {
        let fabric = LoopbackFabric::single(&[s(0)]).unwrap();
        let mut builder =
            PatchGroupBuilder::new(Box::new(fabric), RunConfig::days(1, 42));
        builder.add_patch(s(3)); // the fabric never heard of shard 3
        assert!(matches!(
            builder.build().unwrap_err(),
            KernelError::Config(_)
        ));
    }
}

// ── Multi-process (two ranks on two threads) ──────────────────────────────────

#[cfg(test)]
mod distributed_tests {
    use super::*;

    #[test]
    fn two_ranks_run_to_the_same_final_day() {
        let homes = [(s(0), 0), (s(1), 1)];
        let world = LoopbackFabric::world(2, &homes).unwrap();

        let handles: Vec<_> = world
            .into_iter()
            .map(|fabric| {
                thread::spawn(move || -> KernelResult<(usize, crate::RunSummary)> {
                    let rank = fabric.rank();
                    let shard = s(rank as u32);
                    let mut builder =
                        PatchGroupBuilder::new(Box::new(fabric), RunConfig::days(3, 42));
                    builder.registry_mut().register::<Patient>();
                    let setup = builder.add_patch(shard);
                    setup.service("ward", Resource::pool(format!("ward-{rank}"), 2));
                    if rank == 0 {
                        // This patient crosses the process boundary through
                        // the serialized wire path.
                        setup.seed(Box::new(Patient::transfer("voyager", 1)), Day::ZERO);
                    }
                    let mut group = builder.build()?;
                    let summary = group.run(&mut NoopObserver)?;
                    Ok((rank, summary))
                })
            })
            .collect();

        let mut results: Vec<(usize, crate::RunSummary)> = handles
            .into_iter()
            .map(|h| h.join().unwrap().unwrap())
            .collect();
        results.sort_by_key(|(rank, _)| *rank);

        for (_, summary) in &results {
            assert_eq!(summary.per_shard.len(), 1);
            assert_eq!(summary.per_shard[0].1.days_completed, 3);
        }
        let rank0 = &results[0].1.per_shard[0].1;
        let rank1 = &results[1].1.per_shard[0].1;
        assert_eq!(rank0.migrated_out, 1, "voyager left rank 0");
        assert_eq!(rank1.migrated_in, 1, "voyager re-materialized on rank 1");
        assert_eq!(rank1.exited, 1, "voyager finished its stay remotely");
    }
}
