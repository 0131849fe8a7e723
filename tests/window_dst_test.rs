//! Safe-time protocol DST: many seeds of randomized peer-state traffic,
//! each checked against an independently-maintained oracle of the window
//! formula and the monotone-merge rule.

use netsim::bus::frame::StateFrame;
use netsim::engine::window::WindowCtl;
use netsim::{DeterministicRng, SimDuration, VirtualTime, WorkerId};

const L: u64 = 10;

struct PeerOracle {
    last: u64,
    current: u64,
}

/// Expected window over monotone-merged peer state, computed independently.
fn oracle_window(peers: &[PeerOracle]) -> VirtualTime {
    if peers.is_empty() {
        return VirtualTime::MAX;
    }
    let min_last = peers.iter().map(|p| p.last).min().unwrap();
    let min_current = peers.iter().map(|p| p.current).min().unwrap();
    VirtualTime::from_millis(min_last.max(min_current) + L - 1)
}

fn random_frame(rng: &mut DeterministicRng, src: u16, hi: u64) -> StateFrame {
    StateFrame {
        src: WorkerId(src),
        last_event: VirtualTime::from_millis(rng.gen_range(0, hi)),
        current: VirtualTime::from_millis(rng.gen_range(0, hi)),
        next_event: if rng.gen_bool(0.2) {
            VirtualTime::INVALID
        } else {
            VirtualTime::from_millis(rng.gen_range(0, hi))
        },
        window: VirtualTime::from_millis(rng.gen_range(0, hi)),
    }
}

#[test]
fn test_window_matches_oracle_over_seeds() {
    for seed in 0..100 {
        let mut rng = DeterministicRng::new(seed);
        let peer_ids = [WorkerId(1), WorkerId(2), WorkerId(3)];
        let mut ctl = WindowCtl::new(WorkerId(0), peer_ids.to_vec());
        ctl.set_min_latency(SimDuration::from_millis(L));

        let mut oracle: Vec<PeerOracle> = peer_ids
            .iter()
            .map(|_| PeerOracle { last: 0, current: 0 })
            .collect();

        for _ in 0..200 {
            let idx = rng.gen_range(0, peer_ids.len() as u64) as usize;
            let frame = random_frame(&mut rng, peer_ids[idx].0, 10_000);

            // Monotone merge in the oracle: regressions are ignored.
            oracle[idx].last = oracle[idx].last.max(frame.last_event.as_millis());
            oracle[idx].current = oracle[idx].current.max(frame.current.as_millis());

            ctl.apply_state(&frame);
            assert_eq!(
                ctl.calc_window(false),
                oracle_window(&oracle),
                "seed {} diverged from oracle",
                seed
            );
        }
    }
}

#[test]
fn test_window_is_monotone_under_any_traffic() {
    // Whatever the frame order (including stale regressions), a valid window
    // never walks backwards.
    for seed in 0..100 {
        let mut rng = DeterministicRng::new(1_000 + seed);
        let mut ctl = WindowCtl::new(WorkerId(0), vec![WorkerId(1), WorkerId(2)]);
        ctl.set_min_latency(SimDuration::from_millis(L));

        let mut prev = ctl.calc_window(false);
        for _ in 0..300 {
            let src = 1 + rng.gen_range(0, 2) as u16;
            ctl.apply_state(&random_frame(&mut rng, src, 5_000));
            let w = ctl.calc_window(false);
            assert!(
                w >= prev,
                "seed {}: window regressed {} -> {}",
                seed,
                prev,
                w
            );
            prev = w;
        }
    }
}

#[test]
fn test_broadcast_advance_is_strictly_increasing() {
    // sync_time may only publish when its advance bound is news; collected
    // broadcasts must therefore carry strictly increasing barriers.
    for seed in 0..50 {
        let mut rng = DeterministicRng::new(2_000 + seed);
        let mut ctl = WindowCtl::new(WorkerId(0), vec![WorkerId(1)]);
        ctl.set_min_latency(SimDuration::from_millis(L));

        let mut clock = 0u64;
        let mut barriers: Vec<u64> = Vec::new();
        for _ in 0..100 {
            if rng.gen_bool(0.5) {
                ctl.apply_state(&random_frame(&mut rng, 1, 2_000));
            }
            clock += rng.gen_range(0, 50);
            let next = VirtualTime::from_millis(clock + rng.gen_range(0, 100));
            let out = ctl.sync_time(VirtualTime::from_millis(clock), next, false);
            if let Some(frame) = out.broadcast {
                barriers.push(frame.current.as_millis());
            }
        }
        for pair in barriers.windows(2) {
            assert!(
                pair[0] < pair[1],
                "seed {}: broadcast barrier did not advance {:?}",
                seed,
                pair
            );
        }
    }
}

#[test]
fn test_stall_and_recovery() {
    let mut ctl = WindowCtl::new(WorkerId(0), vec![WorkerId(1)]);
    ctl.set_min_latency(SimDuration::from_millis(L));

    // A stalled op collapses the window regardless of peer state.
    ctl.apply_state(&StateFrame {
        src: WorkerId(1),
        last_event: VirtualTime::from_millis(100),
        current: VirtualTime::from_millis(100),
        next_event: VirtualTime::from_millis(120),
        window: VirtualTime::from_millis(100),
    });
    assert_eq!(ctl.calc_window(true), VirtualTime::INVALID);

    // Recovery: the same peer state yields the normal window again.
    assert_eq!(
        ctl.calc_window(false),
        VirtualTime::from_millis(100 + L - 1)
    );

    // The published window survives a stalled sync untouched.
    let out = ctl.sync_time(VirtualTime::from_millis(50), VirtualTime::from_millis(60), false);
    assert!(out.window.is_valid());
    let stalled = ctl.sync_time(VirtualTime::from_millis(50), VirtualTime::from_millis(60), true);
    assert_eq!(stalled.window, VirtualTime::INVALID);
    assert_eq!(ctl.my_state().window, out.window);
}
