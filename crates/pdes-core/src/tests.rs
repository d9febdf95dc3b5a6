//! Unit tests for pdes-core primitives.

#[cfg(test)]
mod ids {
    use crate::{GlobalAddress, LocalId, ShardId};

    #[test]
    fn index_roundtrip() {
        let id = LocalId(42);
        assert_eq!(id.index(), 42);
        assert_eq!(LocalId::try_from(42usize).unwrap(), id);
    }

    #[test]
    fn ordering() {
        assert!(ShardId(0) < ShardId(1));
        assert!(LocalId(100) > LocalId(99));
    }

    #[test]
    fn invalid_sentinels_are_max() {
        assert_eq!(ShardId::INVALID.0, u32::MAX);
        assert_eq!(LocalId::INVALID.0, u32::MAX);
    }

    #[test]
    fn address_compares_by_value() {
        let a = GlobalAddress::new(ShardId(1), LocalId(7));
        let b = GlobalAddress::new(ShardId(1), LocalId(7));
        let c = GlobalAddress::new(ShardId(2), LocalId(7));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.is_on(ShardId(1)));
        assert!(!a.is_on(ShardId(2)));
    }

    #[test]
    fn address_display() {
        let a = GlobalAddress::new(ShardId(3), LocalId(12));
        assert_eq!(a.to_string(), "3/12");
    }
}

#[cfg(test)]
mod time {
    use crate::Day;

    #[test]
    fn day_arithmetic() {
        let d = Day(10);
        assert_eq!(d + 5, Day(15));
        assert_eq!(d.offset(3), Day(13));
        assert_eq!(d.next(), Day(11));
        assert_eq!(Day(15) - Day(10), 5u64);
        assert_eq!(Day(15).since(Day(10)), 5u64);
    }

    #[test]
    fn display() {
        assert_eq!(Day(4).to_string(), "day 4");
    }
}

#[cfg(test)]
mod vclock {
    use crate::VectorClock;

    #[test]
    fn tick_and_get() {
        let mut c = VectorClock::new(3);
        c.tick(1);
        c.tick(1);
        c.tick(2);
        assert_eq!(c.get(0), 0);
        assert_eq!(c.get(1), 2);
        assert_eq!(c.get(2), 1);
    }

    #[test]
    fn merge_takes_componentwise_max() {
        let mut a = VectorClock::new(2);
        let mut b = VectorClock::new(2);
        a.tick(0);
        b.tick(1);
        b.tick(1);
        a.merge(&b);
        assert_eq!(a.get(0), 1);
        assert_eq!(a.get(1), 2);
    }

    #[test]
    fn precedes_is_strict_happened_before() {
        let mut a = VectorClock::new(2);
        let mut b = VectorClock::new(2);
        // equal clocks do not precede each other
        assert!(!a.precedes(&b));

        b.tick(0);
        assert!(a.precedes(&b));
        assert!(!b.precedes(&a));

        // concurrent clocks are incomparable
        a.tick(1);
        assert!(!a.precedes(&b));
        assert!(!b.precedes(&a));
    }
}

#[cfg(test)]
mod rng {
    use crate::{AgentRng, GlobalAddress, LocalId, ShardId, SimRng};

    #[test]
    fn same_seed_same_stream() {
        let birth = GlobalAddress::new(ShardId(0), LocalId(5));
        let mut a = AgentRng::new(42, birth);
        let mut b = AgentRng::new(42, birth);
        for _ in 0..16 {
            assert_eq!(a.gen_range(0u64..1_000_000), b.gen_range(0u64..1_000_000));
        }
    }

    #[test]
    fn different_agents_diverge() {
        let mut a = AgentRng::new(42, GlobalAddress::new(ShardId(0), LocalId(1)));
        let mut b = AgentRng::new(42, GlobalAddress::new(ShardId(0), LocalId(2)));
        let draws_a: Vec<u64> = (0..8).map(|_| a.gen_range(0..u64::MAX)).collect();
        let draws_b: Vec<u64> = (0..8).map(|_| b.gen_range(0..u64::MAX)).collect();
        assert_ne!(draws_a, draws_b);
    }

    #[test]
    fn child_streams_are_deterministic() {
        let mut root_a = SimRng::new(7);
        let mut root_b = SimRng::new(7);
        let mut child_a = root_a.child(3);
        let mut child_b = root_b.child(3);
        for _ in 0..8 {
            assert_eq!(
                child_a.gen_range(0u32..10_000),
                child_b.gen_range(0u32..10_000)
            );
        }
    }
}

#[cfg(test)]
mod config {
    use crate::{Day, RunConfig};

    #[test]
    fn days_helper() {
        let cfg = RunConfig::days(365, 42);
        assert_eq!(cfg.end_day, Day(365));
        assert_eq!(cfg.seed, 42);
        assert!(cfg.gate_batch_limit > 0);
    }
}
