//! Unit tests for the sequencer.

use pdes_core::{Day, LocalId};

use crate::{SchedError, Sequencer};

fn a(n: u32) -> LocalId {
    LocalId(n)
}

#[cfg(test)]
mod enqueue_tests {
    use super::*;

    #[test]
    fn rejects_past_days() {
        let mut seq = Sequencer::new(Day(5));
        let err = seq.enqueue(a(0), false, Day(4)).unwrap_err();
        assert!(matches!(err, SchedError::IntoPast { day: Day(4), now: Day(5), .. }));
    }

    #[test]
    fn accepts_today_and_future() {
        let mut seq = Sequencer::new(Day(5));
        seq.enqueue(a(0), false, Day(5)).unwrap();
        seq.enqueue(a(1), false, Day(9)).unwrap();
        assert_eq!(seq.len(), 2);
    }
}

#[cfg(test)]
mod iteration_tests {
    use super::*;

    #[test]
    fn same_day_runs_in_enqueue_order() {
        let mut seq = Sequencer::new(Day(0));
        for n in 0..4 {
            seq.enqueue(a(n), false, Day(0)).unwrap();
        }
        let order: Vec<_> = std::iter::from_fn(|| seq.next()).map(|(id, _)| id).collect();
        assert_eq!(order, vec![a(0), a(1), a(2), a(3)]);
    }

    #[test]
    fn advances_through_empty_days_one_at_a_time() {
        let mut seq = Sequencer::new(Day(0));
        seq.enqueue(a(0), false, Day(0)).unwrap();
        seq.enqueue(a(1), false, Day(3)).unwrap();

        assert_eq!(seq.next(), Some((a(0), Day(0))));
        // Next result is on day 3; the clock must land there exactly.
        assert_eq!(seq.next(), Some((a(1), Day(3))));
        assert_eq!(seq.time_now(), Day(3));
        assert_eq!(seq.next(), None);
    }

    #[test]
    fn exhausted_when_nothing_at_or_after_now() {
        let mut seq = Sequencer::new(Day(0));
        assert_eq!(seq.next(), None);
        assert!(seq.is_empty());
    }

    #[test]
    fn entries_added_mid_day_run_same_day() {
        let mut seq = Sequencer::new(Day(0));
        seq.enqueue(a(0), false, Day(0)).unwrap();
        assert_eq!(seq.next(), Some((a(0), Day(0))));
        // A zero-day sleep re-enqueues at the still-current day.
        seq.enqueue(a(0), false, Day(0)).unwrap();
        assert_eq!(seq.next(), Some((a(0), Day(0))));
    }
}

#[cfg(test)]
mod bump_tests {
    use super::*;

    #[test]
    fn bump_carries_leftovers_forward() {
        let mut seq = Sequencer::new(Day(0));
        seq.enqueue(a(0), true, Day(0)).unwrap(); // timeless leftover
        seq.enqueue(a(1), false, Day(1)).unwrap();

        assert_eq!(seq.bump_time(), Day(1));
        assert_eq!(seq.time_now(), Day(1));
        // Day 1's own entry runs before the carried one.
        assert_eq!(seq.next(), Some((a(1), Day(1))));
        assert_eq!(seq.next(), Some((a(0), Day(1))));
    }

    #[test]
    fn bump_on_empty_day_just_advances() {
        let mut seq = Sequencer::new(Day(7));
        assert_eq!(seq.bump_time(), Day(8));
        assert!(seq.is_empty());
    }
}

#[cfg(test)]
mod quiescence_tests {
    use super::*;

    #[test]
    fn timeless_entries_do_not_count() {
        let mut seq = Sequencer::new(Day(0));
        seq.enqueue(a(0), true, Day(0)).unwrap();
        assert!(seq.quiescent_today());
        seq.enqueue(a(1), false, Day(0)).unwrap();
        assert!(!seq.quiescent_today());
        assert_eq!(seq.nontimeless_today(), 1);
    }

    #[test]
    fn tomorrow_work_does_not_block_today() {
        let mut seq = Sequencer::new(Day(0));
        seq.enqueue(a(0), false, Day(1)).unwrap();
        assert!(seq.quiescent_today());
    }

    #[test]
    fn quiescence_restored_after_draining() {
        let mut seq = Sequencer::new(Day(0));
        seq.enqueue(a(0), false, Day(0)).unwrap();
        assert!(!seq.quiescent_today());
        seq.next();
        assert!(seq.quiescent_today());
    }
}
