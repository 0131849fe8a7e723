//! Calendar DST: random interleavings of inserts and pops across many seeds,
//! checked against a naive sorted-list oracle for time ordering and FIFO
//! ties.

use std::collections::VecDeque;

use netsim::engine::calendar::Calendar;
use netsim::engine::event::EventPayload;
use netsim::{DeterministicRng, VirtualTime};

/// Naive oracle: (at, insertion counter), kept sorted stably.
struct Oracle {
    items: VecDeque<(u64, u64)>,
    counter: u64,
}

impl Oracle {
    fn new() -> Self {
        Oracle {
            items: VecDeque::new(),
            counter: 0,
        }
    }

    fn insert(&mut self, at: u64) {
        let seq = self.counter;
        self.counter += 1;
        let pos = self
            .items
            .iter()
            .position(|&(t, _)| t > at)
            .unwrap_or(self.items.len());
        self.items.insert(pos, (at, seq));
    }

    fn pop(&mut self) -> Option<(u64, u64)> {
        self.items.pop_front()
    }

    fn peek_time(&self) -> Option<u64> {
        self.items.front().map(|&(t, _)| t)
    }
}

#[test]
fn test_calendar_matches_oracle_over_seeds() {
    for seed in 0..100 {
        let mut rng = DeterministicRng::new(seed);
        let mut cal = Calendar::new(1);
        let mut oracle = Oracle::new();

        for _ in 0..500 {
            if oracle.items.is_empty() || rng.gen_bool(0.6) {
                // Cluster timestamps so ties are common.
                let at = rng.gen_range(0, 50);
                cal.insert(VirtualTime::from_millis(at), EventPayload::Heartbeat);
                oracle.insert(at);
            } else {
                let expect = oracle.pop().unwrap();
                let got = cal.pop_min().expect("calendar and oracle agree on size");
                assert_eq!(
                    got.at.as_millis(),
                    expect.0,
                    "seed {}: pop returned wrong time",
                    seed
                );
            }
            assert_eq!(cal.size(), oracle.items.len());
            match oracle.peek_time() {
                Some(t) => assert_eq!(cal.peek_min_time(), VirtualTime::from_millis(t)),
                None => assert_eq!(cal.peek_min_time(), VirtualTime::INVALID),
            }
        }
    }
}

#[test]
fn test_drain_is_globally_sorted() {
    for seed in 0..20 {
        let mut rng = DeterministicRng::new(seed);
        let mut cal = Calendar::new(1);
        for _ in 0..1_000 {
            cal.insert(
                VirtualTime::from_millis(rng.gen_range(0, 10_000)),
                EventPayload::Heartbeat,
            );
        }
        let mut prev = VirtualTime::ZERO;
        while let Some(ev) = cal.pop_min() {
            assert!(ev.at >= prev, "seed {}: out of order", seed);
            prev = ev.at;
        }
    }
}
