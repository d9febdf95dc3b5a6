//! Unit tests for the loopback fabric.

use std::thread;

use pdes_core::ShardId;

use crate::{Fabric, LoopbackFabric, MsgKind};

fn s(n: u32) -> ShardId {
    ShardId(n)
}

#[cfg(test)]
mod single_rank_tests {
    use super::*;

    #[test]
    fn self_send_is_delivered_in_order() {
        let mut fab = LoopbackFabric::single(&[s(0), s(1)]).unwrap();
        fab.send(MsgKind::AgentBatch, s(0), s(1), vec![1]).unwrap();
        fab.send(MsgKind::AgentBatch, s(0), s(1), vec![2]).unwrap();

        let first = fab.try_recv().unwrap().unwrap();
        let second = fab.try_recv().unwrap().unwrap();
        assert_eq!(first.payload, vec![1]);
        assert_eq!(second.payload, vec![2]);
        assert!(fab.try_recv().unwrap().is_none());
    }

    #[test]
    fn send_to_unknown_shard_fails() {
        let mut fab = LoopbackFabric::single(&[s(0)]).unwrap();
        assert!(fab.send(MsgKind::AgentBatch, s(0), s(9), vec![]).is_err());
    }

    #[test]
    fn oversized_payload_rejected() {
        let mut fab = LoopbackFabric::single(&[s(0)]).unwrap();
        let big = vec![0u8; crate::MAX_PAYLOAD + 1];
        assert!(fab.send(MsgKind::AgentBatch, s(0), s(0), big).is_err());
    }

    #[test]
    fn locality_queries() {
        let fab = LoopbackFabric::single(&[s(0), s(1)]).unwrap();
        assert!(fab.is_local(s(0)));
        assert!(fab.is_local(s(1)));
        assert_eq!(fab.rank_of(s(1)), Some(0));
        assert_eq!(fab.rank_of(s(7)), None);
    }

    #[test]
    fn shutdown_agreed_once_all_request() {
        let mut fab = LoopbackFabric::single(&[s(0)]).unwrap();
        assert!(!fab.shutdown_agreed());
        fab.request_shutdown().unwrap();
        assert!(fab.shutdown_agreed());
    }
}

#[cfg(test)]
mod clock_tests {
    use super::*;

    #[test]
    fn send_and_recv_advance_the_clock() {
        let mut fab = LoopbackFabric::single(&[s(0)]).unwrap();
        assert_eq!(fab.clock().get(0), 0);
        fab.send(MsgKind::AgentBatch, s(0), s(0), vec![]).unwrap();
        assert_eq!(fab.clock().get(0), 1);
        fab.try_recv().unwrap().unwrap();
        assert_eq!(fab.clock().get(0), 2);
    }

    #[test]
    fn receiver_merges_sender_clock() {
        let homes = [(s(0), 0), (s(1), 1)];
        let mut world = LoopbackFabric::world(2, &homes).unwrap();
        let mut b = world.pop().unwrap();
        let mut a = world.pop().unwrap();

        // Rank 0 does some local work, then sends to rank 1.
        a.tick_clock();
        a.tick_clock();
        a.send(MsgKind::AgentBatch, s(0), s(1), vec![]).unwrap();

        let env = b.try_recv().unwrap().unwrap();
        // The stamp carries rank 0's three events; rank 1 absorbed them and
        // ticked its own slot once for the receive.
        assert_eq!(env.clock.get(0), 3);
        assert_eq!(b.clock().get(0), 3);
        assert_eq!(b.clock().get(1), 1);
        // The send-time stamp now causally precedes the receiver's clock.
        assert!(env.clock.precedes(b.clock()));
    }
}

#[cfg(test)]
mod collective_tests {
    use super::*;

    #[test]
    fn all_gather_returns_every_contribution_in_rank_order() {
        let homes = [(s(0), 0), (s(1), 1), (s(2), 2)];
        let world = LoopbackFabric::world(3, &homes).unwrap();

        let handles: Vec<_> = world
            .into_iter()
            .map(|mut fab| {
                thread::spawn(move || {
                    let mine = vec![fab.rank() as u8];
                    fab.all_gather(mine).unwrap()
                })
            })
            .collect();

        for handle in handles {
            let gathered = handle.join().unwrap();
            assert_eq!(gathered, vec![vec![0u8], vec![1u8], vec![2u8]]);
        }
    }

    #[test]
    fn barrier_releases_all_ranks() {
        let homes = [(s(0), 0), (s(1), 1)];
        let world = LoopbackFabric::world(2, &homes).unwrap();
        let handles: Vec<_> = world
            .into_iter()
            .map(|mut fab| thread::spawn(move || fab.barrier().unwrap()))
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn cross_rank_fifo_per_sender() {
        let homes = [(s(0), 0), (s(1), 1)];
        let mut world = LoopbackFabric::world(2, &homes).unwrap();
        let mut b = world.pop().unwrap();
        let mut a = world.pop().unwrap();

        for i in 0..8u8 {
            a.send(MsgKind::AgentBatch, s(0), s(1), vec![i]).unwrap();
        }
        let mut seen = Vec::new();
        while let Some(env) = b.try_recv().unwrap() {
            seen.push(env.payload[0]);
        }
        assert_eq!(seen, (0..8).collect::<Vec<u8>>());
    }
}
