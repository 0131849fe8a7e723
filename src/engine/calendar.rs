use std::collections::{BTreeMap, VecDeque};

use super::event::{Event, EventPayload};
use super::time::VirtualTime;

/// Time-ordered event store: a priority multimap `VirtualTime -> FIFO<Event>`.
///
/// Events are bucketed by `at / granularity`; within a bucket, dispatch order
/// is insertion order. With the default granularity of 1 every bucket holds a
/// single timestamp, which gives strictly non-decreasing dispatch times and
/// FIFO ties. Coarser granularities trade intra-bucket time ordering for
/// fewer tree nodes, the same knob the event tracker has always exposed.
pub struct Calendar {
    buckets: BTreeMap<u64, VecDeque<Event>>,
    granularity: u64,
    size: usize,
    next_seq: u64,
}

impl Calendar {
    pub fn new(granularity: u64) -> Self {
        Calendar {
            buckets: BTreeMap::new(),
            granularity: granularity.max(1),
            size: 0,
            next_seq: 0,
        }
    }

    fn bucket_key(&self, at: VirtualTime) -> u64 {
        at.as_millis() / self.granularity
    }

    /// Insert a payload at `at`. Ties at the same timestamp dispatch in
    /// insertion order.
    pub fn insert(&mut self, at: VirtualTime, payload: EventPayload) {
        debug_assert!(at.is_valid(), "cannot schedule at INVALID time");
        let seq = self.next_seq;
        self.next_seq += 1;
        let key = self.bucket_key(at);
        self.buckets
            .entry(key)
            .or_default()
            .push_back(Event { at, seq, payload });
        self.size += 1;
    }

    /// Earliest scheduled time, or `INVALID` when empty.
    pub fn peek_min_time(&self) -> VirtualTime {
        match self.buckets.values().next().and_then(|q| q.front()) {
            Some(ev) => ev.at,
            None => VirtualTime::INVALID,
        }
    }

    /// Remove and return the earliest event (FIFO within a timestamp).
    pub fn pop_min(&mut self) -> Option<Event> {
        let (&key, queue) = self.buckets.iter_mut().next()?;
        let ev = queue.pop_front()?;
        if queue.is_empty() {
            self.buckets.remove(&key);
        }
        self.size -= 1;
        Some(ev)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heartbeat_at(cal: &mut Calendar, ms: u64) {
        cal.insert(VirtualTime::from_millis(ms), EventPayload::Heartbeat);
    }

    #[test]
    fn test_empty_calendar_peek_is_invalid() {
        let cal = Calendar::new(1);
        assert_eq!(cal.peek_min_time(), VirtualTime::INVALID);
        assert_eq!(cal.size(), 0);
    }

    #[test]
    fn test_pop_order_is_time_sorted() {
        let mut cal = Calendar::new(1);
        for ms in [50, 10, 30, 20, 40] {
            heartbeat_at(&mut cal, ms);
        }
        assert_eq!(cal.size(), 5);
        assert_eq!(cal.peek_min_time(), VirtualTime::from_millis(10));

        let mut seen = Vec::new();
        while let Some(ev) = cal.pop_min() {
            seen.push(ev.at.as_millis());
        }
        assert_eq!(seen, vec![10, 20, 30, 40, 50]);
        assert_eq!(cal.peek_min_time(), VirtualTime::INVALID);
    }

    #[test]
    fn test_ties_dispatch_fifo() {
        let mut cal = Calendar::new(1);
        // Three payload kinds at the same instant; insertion order must hold.
        cal.insert(
            VirtualTime::from_millis(5),
            EventPayload::Timer {
                host: crate::engine::NodeAddr(1),
                tid: crate::engine::TimerId(7),
            },
        );
        heartbeat_at(&mut cal, 5);
        cal.insert(
            VirtualTime::from_millis(5),
            EventPayload::Timer {
                host: crate::engine::NodeAddr(2),
                tid: crate::engine::TimerId(8),
            },
        );

        let first = cal.pop_min().unwrap();
        let second = cal.pop_min().unwrap();
        let third = cal.pop_min().unwrap();
        assert!(first.seq < second.seq && second.seq < third.seq);
        assert!(matches!(
            first.payload,
            EventPayload::Timer {
                host: crate::engine::NodeAddr(1),
                ..
            }
        ));
        assert!(matches!(second.payload, EventPayload::Heartbeat));
        assert!(matches!(
            third.payload,
            EventPayload::Timer {
                host: crate::engine::NodeAddr(2),
                ..
            }
        ));
    }

    #[test]
    fn test_coarse_granularity_buckets_fifo() {
        let mut cal = Calendar::new(10);
        heartbeat_at(&mut cal, 17);
        heartbeat_at(&mut cal, 12);
        // Same bucket (1): FIFO order wins over timestamp order.
        let first = cal.pop_min().unwrap();
        assert_eq!(first.at.as_millis(), 17);
        let second = cal.pop_min().unwrap();
        assert_eq!(second.at.as_millis(), 12);
    }

    #[test]
    fn test_interleaved_insert_pop() {
        let mut cal = Calendar::new(1);
        heartbeat_at(&mut cal, 10);
        heartbeat_at(&mut cal, 20);
        assert_eq!(cal.pop_min().unwrap().at.as_millis(), 10);
        heartbeat_at(&mut cal, 5);
        assert_eq!(cal.pop_min().unwrap().at.as_millis(), 5);
        assert_eq!(cal.pop_min().unwrap().at.as_millis(), 20);
        assert!(cal.pop_min().is_none());
    }
}
