use fnv::FnvHashMap;

use super::time::{SimDuration, VirtualTime};
use super::WorkerId;
use crate::bus::frame::StateFrame;

/// Locally-held snapshot of one peer worker's published time state. Updated
/// only by inbound state frames, never by local events.
#[derive(Debug, Clone, Copy)]
pub struct PeerState {
    pub last_event: VirtualTime,
    pub current: VirtualTime,
    pub next_event: VirtualTime,
    pub window: VirtualTime,
    pub valid: bool,
}

impl PeerState {
    fn initial() -> Self {
        PeerState {
            last_event: VirtualTime::ZERO,
            current: VirtualTime::ZERO,
            next_event: VirtualTime::INVALID,
            window: VirtualTime::ZERO,
            valid: true,
        }
    }
}

/// The local worker's published 4-tuple.
#[derive(Debug, Clone, Copy)]
pub struct TimeState {
    pub last_event: VirtualTime,
    pub current: VirtualTime,
    pub next_event: VirtualTime,
    pub window: VirtualTime,
}

/// Result of a `sync_time` pass: the window events may be dispatched against
/// this heartbeat (INVALID = stall), plus an optional state frame to
/// broadcast.
#[derive(Debug)]
pub struct SyncOutcome {
    pub window: VirtualTime,
    pub broadcast: Option<StateFrame>,
}

/// Conservative synchronization state: who the peers are, what they last
/// published, and how far local dispatch may run ahead of them.
pub struct WindowCtl {
    me: WorkerId,
    peers: FnvHashMap<WorkerId, PeerState>,
    my: TimeState,
    min_latency: SimDuration,
    last_broadcast: Option<VirtualTime>,
}

impl WindowCtl {
    pub fn new(me: WorkerId, peers: impl IntoIterator<Item = WorkerId>) -> Self {
        let peers = peers
            .into_iter()
            .filter(|&p| p != me)
            .map(|p| (p, PeerState::initial()))
            .collect();
        WindowCtl {
            me,
            peers,
            my: TimeState {
                last_event: VirtualTime::ZERO,
                current: VirtualTime::ZERO,
                next_event: VirtualTime::INVALID,
                window: VirtualTime::ZERO,
            },
            min_latency: SimDuration::from_millis(1),
            last_broadcast: None,
        }
    }

    /// Set the topology's minimum cross-host delay (already clamped to the
    /// runahead floor by the caller).
    pub fn set_min_latency(&mut self, latency: SimDuration) {
        self.min_latency = latency;
    }

    pub fn min_latency(&self) -> SimDuration {
        self.min_latency
    }

    pub fn my_state(&self) -> &TimeState {
        &self.my
    }

    /// The latest time through which local dispatch is causally safe.
    ///
    /// `min_last` is historical ground truth; `min_current` is each peer's
    /// own barrier (bounded by its window), so both bounds are safe and the
    /// larger one is taken.
    pub fn calc_window(&self, stalled: bool) -> VirtualTime {
        if stalled {
            return VirtualTime::INVALID;
        }
        if self.peers.is_empty() {
            return VirtualTime::MAX;
        }

        let mut min_last = VirtualTime::MAX;
        let mut min_current = VirtualTime::MAX;
        for peer in self.peers.values() {
            if !peer.valid {
                return VirtualTime::INVALID;
            }
            min_last = min_last.min(peer.last_event);
            min_current = min_current.min(peer.current);
        }

        let lookahead = SimDuration(self.min_latency.as_millis().saturating_sub(1));
        let base = min_last.saturating_add(lookahead);
        let forward = min_current.saturating_add(lookahead);
        base.max(forward)
    }

    /// Refresh the published tuple and decide whether to broadcast.
    ///
    /// The broadcast fires only when our advance bound would actually move
    /// some peer past its known window and we have not already published an
    /// equal or better bound.
    pub fn sync_time(
        &mut self,
        current_time: VirtualTime,
        next_event: VirtualTime,
        stalled: bool,
    ) -> SyncOutcome {
        self.my.last_event = current_time;
        self.my.next_event = next_event;

        let window = self.calc_window(stalled);
        if window.is_valid() {
            self.my.window = window;
        }
        self.my.current = VirtualTime::min_valid(self.my.next_event, self.my.window);

        let lookahead = SimDuration(self.min_latency.as_millis().saturating_sub(1));
        let advance = self.my.current.saturating_add(lookahead);

        let helps_a_peer = self.peers.values().any(|p| advance > p.window);
        let is_news = match self.last_broadcast {
            Some(prev) => advance > prev,
            None => true,
        };

        let broadcast = if !self.peers.is_empty() && helps_a_peer && is_news {
            self.last_broadcast = Some(advance);
            Some(self.state_frame())
        } else {
            None
        };

        SyncOutcome { window, broadcast }
    }

    pub fn state_frame(&self) -> StateFrame {
        StateFrame {
            src: self.me,
            last_event: self.my.last_event,
            current: self.my.current,
            next_event: self.my.next_event,
            window: self.my.window,
        }
    }

    /// Merge an inbound peer state frame. State frames are idempotent and
    /// monotone: a late or reordered frame must not walk any monotone field
    /// backwards. `next_event` legitimately decreases as peers receive new
    /// events, so it is taken verbatim from the newest frame.
    pub fn apply_state(&mut self, frame: &StateFrame) {
        if frame.src == self.me {
            return;
        }
        let peer = self
            .peers
            .entry(frame.src)
            .or_insert_with(PeerState::initial);
        if peer.valid {
            peer.last_event = peer.last_event.max(frame.last_event);
            peer.current = peer.current.max(frame.current);
            peer.window = peer.window.max(frame.window);
        } else {
            peer.last_event = frame.last_event;
            peer.current = frame.current;
            peer.window = frame.window;
        }
        peer.next_event = frame.next_event;
        peer.valid = true;
    }

    /// Mark a peer unusable (error propagation); the local window collapses
    /// to INVALID until the run is torn down.
    pub fn invalidate_peer(&mut self, peer: WorkerId) {
        if let Some(p) = self.peers.get_mut(&peer) {
            p.valid = false;
        }
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const L: u64 = 10;

    fn ctl(peers: &[u16]) -> WindowCtl {
        let mut c = WindowCtl::new(
            WorkerId(0),
            peers.iter().map(|&p| WorkerId(p)).collect::<Vec<_>>(),
        );
        c.set_min_latency(SimDuration::from_millis(L));
        c
    }

    fn frame(src: u16, last: u64, current: u64, next: u64, window: u64) -> StateFrame {
        StateFrame {
            src: WorkerId(src),
            last_event: VirtualTime::from_millis(last),
            current: VirtualTime::from_millis(current),
            next_event: VirtualTime::from_millis(next),
            window: VirtualTime::from_millis(window),
        }
    }

    #[test]
    fn test_single_worker_window_is_unbounded() {
        let c = ctl(&[]);
        assert_eq!(c.calc_window(false), VirtualTime::MAX);
    }

    #[test]
    fn test_stalled_op_forces_invalid() {
        let c = ctl(&[]);
        assert_eq!(c.calc_window(true), VirtualTime::INVALID);
    }

    #[test]
    fn test_invalid_peer_forces_invalid() {
        let mut c = ctl(&[1, 2]);
        c.invalidate_peer(WorkerId(1));
        assert_eq!(c.calc_window(false), VirtualTime::INVALID);
    }

    #[test]
    fn test_initial_window_is_one_lookahead() {
        // Peers start valid at zero: dispatch allowed through min_latency - 1.
        let c = ctl(&[1]);
        assert_eq!(c.calc_window(false), VirtualTime::from_millis(L - 1));
    }

    #[test]
    fn test_window_takes_max_of_base_and_forward() {
        let mut c = ctl(&[1, 2]);
        // Peer 1: old last_event but current barrier far ahead.
        c.apply_state(&frame(1, 5, 100, 120, 100));
        c.apply_state(&frame(2, 50, 90, 95, 90));
        // min_last = 5 -> base = 14; min_current = 90 -> forward = 99.
        assert_eq!(c.calc_window(false), VirtualTime::from_millis(99));
    }

    #[test]
    fn test_window_uses_base_when_current_lags() {
        let mut c = ctl(&[1]);
        c.apply_state(&frame(1, 40, 20, 20, 20));
        // base = 49, forward = 29 -> 49.
        assert_eq!(c.calc_window(false), VirtualTime::from_millis(49));
    }

    #[test]
    fn test_sync_time_broadcasts_when_advance_helps() {
        let mut c = ctl(&[1]);
        let out = c.sync_time(VirtualTime::ZERO, VirtualTime::from_millis(5), false);
        assert_eq!(out.window, VirtualTime::from_millis(L - 1));
        // current = min(5, 9) = 5; advance = 14 > peer window 0.
        let frame = out.broadcast.expect("first sync should broadcast");
        assert_eq!(frame.current, VirtualTime::from_millis(5));

        // Unchanged state: no repeat broadcast.
        let out = c.sync_time(VirtualTime::ZERO, VirtualTime::from_millis(5), false);
        assert!(out.broadcast.is_none());
    }

    #[test]
    fn test_sync_time_with_empty_calendar_publishes_window() {
        let mut c = ctl(&[1]);
        let out = c.sync_time(VirtualTime::ZERO, VirtualTime::INVALID, false);
        let frame = out.broadcast.expect("idle worker still broadcasts");
        // current falls back to the window when there is no next event.
        assert_eq!(frame.current, VirtualTime::from_millis(L - 1));
    }

    #[test]
    fn test_state_merge_is_monotone() {
        let mut c = ctl(&[1]);
        c.apply_state(&frame(1, 100, 100, 110, 100));
        // Late, out-of-order frame: monotone fields must not regress.
        c.apply_state(&frame(1, 50, 60, 70, 60));
        let w = c.calc_window(false);
        // base = 109, forward = 109.
        assert_eq!(w, VirtualTime::from_millis(109));
    }

    #[test]
    fn test_windows_ratchet_between_idle_workers() {
        // Two idle workers trading state frames converge upward, which is
        // what lets both reach a distant End op.
        let mut a = ctl(&[1]);
        let mut b = WindowCtl::new(WorkerId(1), vec![WorkerId(0)]);
        b.set_min_latency(SimDuration::from_millis(L));

        let end = VirtualTime::from_millis(200);
        let mut rounds = 0;
        loop {
            rounds += 1;
            assert!(rounds < 100, "windows failed to converge");
            let out_a = a.sync_time(VirtualTime::ZERO, end, false);
            if let Some(f) = out_a.broadcast {
                b.apply_state(&f);
            }
            let out_b = b.sync_time(VirtualTime::ZERO, end, false);
            if let Some(f) = out_b.broadcast {
                a.apply_state(&f);
            }
            if a.calc_window(false) >= end && b.calc_window(false) >= end {
                break;
            }
        }
    }
}
