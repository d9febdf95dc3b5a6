//! The distributed day-rollover protocol.
//!
//! Virtual time may only advance when *every* shard, in every process, has
//! finished the current day.  There is no global lock: once a shard is
//! locally quiescent it broadcasts one [`DateChangeMsg`] per peer — a
//! timeless, migrating agent that rides the ordinary gate machinery — and
//! commits the rollover only when every message has returned home as an
//! acknowledgement whose origin vector-clock stamp causally precedes the
//! shard's current clock.  A shard with no peers advances unilaterally.
//!
//! # Message lifecycle
//!
//! Outgoing: park in the target shard's date-change queue; each cycle the
//! target's duty rouses the queue and the message re-evaluates — if the
//! target is quiescent, or its date has already moved past the proposal,
//! the message turns homeward, otherwise it re-parks and waits.
//!
//! Homeward: park in the origin's date-change queue; when roused at home it
//! deposits a [`RolloverAck`] and terminates.  Acks for a proposal the
//! origin has already left behind die without counting.

use pdes_agent::{Agent, AgentSnapshot, Portable, ShardView, Step, Wake};
use pdes_core::{Day, GlobalAddress, KernelError, KernelResult, RolloverAck, ShardId, VectorClock};

// ── Round bookkeeping (owned by each patch) ───────────────────────────────────

/// The date-change duty's state: the home queue, the peer directory, and
/// the in-flight round tally.
#[derive(Debug)]
pub struct RolloverState {
    /// Resource id of this shard's date-change queue.
    pub queue: pdes_core::LocalId,
    /// Every other shard's date-change queue, fixed after the directory
    /// exchange.  Empty ⇒ the shard rolls days unilaterally.
    pub peers: Vec<(ShardId, GlobalAddress)>,
    /// A broadcast is out and not yet fully tallied.
    pub round_open: bool,
    /// Messages sent this round.
    pub sent: usize,
    /// Proposal the open round carries.
    pub proposed: Day,
    /// Acknowledgements tallied so far this round.
    pub acks: Vec<RolloverAck>,
}

impl RolloverState {
    pub fn new(queue: pdes_core::LocalId) -> Self {
        Self {
            queue,
            peers: Vec::new(),
            round_open: false,
            sent: 0,
            proposed: Day::ZERO,
            acks: Vec::new(),
        }
    }

    /// Discard the current round's tally.
    pub fn reset(&mut self) {
        self.round_open = false;
        self.sent = 0;
        self.acks.clear();
    }
}

// ── DateChangeMsg ─────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[derive(serde::Serialize, serde::Deserialize)]
enum Phase {
    Outgoing,
    Homeward,
}

#[derive(Clone, Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
struct DateChangeState {
    origin: ShardId,
    home_queue: GlobalAddress,
    target_queue: GlobalAddress,
    proposed: Day,
    /// Origin's vector clock when the round was sent out.
    stamp: VectorClock,
    phase: Phase,
}

/// One leg of a rollover round: travels to a peer's date-change queue,
/// waits for the peer to finish the proposed day, then carries the
/// acknowledgement home.
pub struct DateChangeMsg {
    name: String,
    state: DateChangeState,
}

impl DateChangeMsg {
    pub fn outgoing(
        origin: ShardId,
        home_queue: GlobalAddress,
        target_queue: GlobalAddress,
        proposed: Day,
        stamp: VectorClock,
    ) -> Self {
        Self {
            name: format!("date-change-{}-to-{}", origin.0, target_queue.shard.0),
            state: DateChangeState {
                origin,
                home_queue,
                target_queue,
                proposed,
                stamp,
                phase: Phase::Outgoing,
            },
        }
    }
}

impl Agent for DateChangeMsg {
    fn name(&self) -> &str {
        &self.name
    }

    fn timeless(&self) -> bool {
        true
    }

    fn step(&mut self, wake: Wake, ctx: &mut dyn ShardView) -> KernelResult<Step> {
        match (self.state.phase, wake) {
            // Travelling (or re-materialized after a migration): keep
            // heading for the current phase's queue.
            (Phase::Outgoing, Wake::Scheduled) => Ok(Step::Lock(self.state.target_queue)),
            (Phase::Homeward, Wake::Scheduled) => Ok(Step::Lock(self.state.home_queue)),

            // Roused at the target by its date-change duty.
            (Phase::Outgoing, Wake::Roused { .. }) => {
                let past_proposal = ctx.now() > self.state.proposed;
                if ctx.quiescent_today() || past_proposal {
                    self.state.phase = Phase::Homeward;
                    Ok(Step::Lock(self.state.home_queue))
                } else {
                    // The target still has real work today; wait it out.
                    Ok(Step::Lock(self.state.target_queue))
                }
            }

            // Roused at home: tally and terminate.
            (Phase::Homeward, Wake::Roused { .. }) => {
                ctx.record_rollover_ack(RolloverAck {
                    peer: self.state.target_queue.shard,
                    proposed: self.state.proposed,
                    stamp: self.state.stamp.clone(),
                });
                Ok(Step::Exit)
            }

            (_, unexpected) => Err(KernelError::Protocol(format!(
                "{} received unexpected wake {unexpected:?}",
                self.name
            ))),
        }
    }

    fn export(&self) -> KernelResult<AgentSnapshot> {
        AgentSnapshot::encode(Self::KIND, &self.name, true, false, &self.state)
    }
}

impl Portable for DateChangeMsg {
    const KIND: &'static str = "date-change";

    fn restore(snapshot: &AgentSnapshot) -> KernelResult<Self> {
        Ok(Self {
            name: snapshot.name.clone(),
            state: snapshot.decode()?,
        })
    }
}
