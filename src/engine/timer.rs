use fnv::FnvHashMap;

use super::time::{SimDuration, VirtualTime};
use super::{CallbackId, TimerId};

/// A one-shot timer owned by a host. Cancellation flips `valid`; the calendar
/// entry stays put and fires as a no-op, so the item is freed exactly once,
/// when its event is consumed.
#[derive(Debug)]
pub struct TimerItem {
    pub cb_id: CallbackId,
    pub arg: u64,
    pub expire: VirtualTime,
    pub valid: bool,
}

/// Per-host timer table. Timer ids are monotone per host and never reused
/// within a host's lifetime.
pub struct TimerTable {
    next_tid: u32,
    items: FnvHashMap<TimerId, TimerItem>,
}

impl TimerTable {
    pub fn new(capacity: usize) -> Self {
        TimerTable {
            next_tid: 0,
            items: FnvHashMap::with_capacity_and_hasher(capacity, Default::default()),
        }
    }

    /// Allocate a timer expiring at `now + delay`. Delay is clamped to at
    /// least one tick so a timer can never re-enter the current instant.
    /// The caller schedules the matching calendar event at the returned
    /// expiry.
    pub fn create(
        &mut self,
        now: VirtualTime,
        delay: SimDuration,
        cb_id: CallbackId,
        arg: u64,
    ) -> (TimerId, VirtualTime) {
        let delay = delay.max(SimDuration::from_millis(1));
        let expire = now + delay;
        let tid = TimerId(self.next_tid);
        self.next_tid += 1;
        self.items.insert(
            tid,
            TimerItem {
                cb_id,
                arg,
                expire,
                valid: true,
            },
        );
        (tid, expire)
    }

    /// Invalidate a timer. Idempotent; unknown and already-fired tids are
    /// ignored. Returns whether a live item was invalidated.
    pub fn cancel(&mut self, tid: TimerId) -> bool {
        match self.items.get_mut(&tid) {
            Some(item) if item.valid => {
                item.valid = false;
                true
            }
            _ => false,
        }
    }

    /// Invalidate every live item. Used when the host is destroyed; the
    /// in-calendar events drain as no-ops.
    pub fn cancel_all(&mut self) {
        for item in self.items.values_mut() {
            item.valid = false;
        }
    }

    /// Consume the item for a fired event. `None` means the tid was already
    /// consumed (cannot happen for well-formed calendars) or belongs to a
    /// table that was rebuilt.
    pub fn take(&mut self, tid: TimerId) -> Option<TimerItem> {
        self.items.remove(&tid)
    }

    pub fn live_count(&self) -> usize {
        self.items.values().filter(|i| i.valid).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> TimerTable {
        TimerTable::new(16)
    }

    #[test]
    fn test_create_assigns_monotone_tids() {
        let mut t = table();
        let now = VirtualTime::from_millis(100);
        let (a, ea) = t.create(now, SimDuration::from_millis(10), CallbackId(0), 0);
        let (b, eb) = t.create(now, SimDuration::from_millis(20), CallbackId(0), 0);
        assert!(a.0 < b.0);
        assert_eq!(ea.as_millis(), 110);
        assert_eq!(eb.as_millis(), 120);
    }

    #[test]
    fn test_zero_delay_clamped_forward() {
        let mut t = table();
        let now = VirtualTime::from_millis(100);
        let (_, expire) = t.create(now, SimDuration::ZERO, CallbackId(0), 0);
        assert!(expire > now);
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let mut t = table();
        let (tid, _) = t.create(
            VirtualTime::ZERO,
            SimDuration::from_millis(5),
            CallbackId(1),
            42,
        );
        assert!(t.cancel(tid));
        assert!(!t.cancel(tid));
        assert!(!t.cancel(tid));

        // The item still exists until its event consumes it, but invalid.
        let item = t.take(tid).unwrap();
        assert!(!item.valid);
        assert_eq!(item.arg, 42);
    }

    #[test]
    fn test_cancel_unknown_tid_is_noop() {
        let mut t = table();
        assert!(!t.cancel(TimerId(99)));
    }

    #[test]
    fn test_cancel_all_invalidates_live_items() {
        let mut t = table();
        let mut tids = Vec::new();
        for i in 0..4 {
            let (tid, _) = t.create(
                VirtualTime::ZERO,
                SimDuration::from_millis(i + 1),
                CallbackId(0),
                i,
            );
            tids.push(tid);
        }
        assert_eq!(t.live_count(), 4);
        t.cancel_all();
        assert_eq!(t.live_count(), 0);
        for tid in tids {
            assert!(!t.take(tid).unwrap().valid);
        }
    }

    #[test]
    fn test_take_consumes_item() {
        let mut t = table();
        let (tid, _) = t.create(
            VirtualTime::ZERO,
            SimDuration::from_millis(5),
            CallbackId(0),
            0,
        );
        assert!(t.take(tid).is_some());
        assert!(t.take(tid).is_none());
    }
}
