use std::sync::Weak;

use bytes::Bytes;
use parking_lot::Mutex;

use super::time::VirtualTime;
use super::vepoll::VepollRecord;
use super::{NodeAddr, TimerId};
use crate::coordinator::ops::SimOp;

/// A calendar entry. Immutable once inserted; the calendar owns it until
/// `pop_min` hands it to the dispatcher, which routes it by payload kind and
/// is responsible for consuming it.
#[derive(Debug)]
pub struct Event {
    pub at: VirtualTime,
    /// Insertion order, assigned by the calendar. Breaks ties at equal `at`.
    pub(crate) seq: u64,
    pub payload: EventPayload,
}

/// Tagged payload dispatched by the worker loop. Callbacks are expressed as
/// variants resolved by match, never as erased function pointers.
#[derive(Debug)]
pub enum EventPayload {
    /// One-shot timer owned by a host; a cancelled or orphaned timer fires as
    /// a no-op.
    Timer { host: NodeAddr, tid: TimerId },
    /// Payload arriving at a host socket; deposited by the transport stub.
    Packet(Packet),
    /// Simulation operation from the coordinator; may stall on a dependency.
    Op(SimOp),
    /// Socket readiness notification scheduled by vepoll. Holds a weak
    /// reference so a destroyed record degrades to a no-op.
    Notify(Weak<Mutex<VepollRecord>>),
    /// Periodic worker progress event; logs and reschedules itself.
    Heartbeat,
}

/// Discriminant used for dispatch tracing and stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Timer,
    Packet,
    Op,
    Notify,
    Heartbeat,
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::Timer { .. } => EventKind::Timer,
            EventPayload::Packet(_) => EventKind::Packet,
            EventPayload::Op(_) => EventKind::Op,
            EventPayload::Notify(_) => EventKind::Notify,
            EventPayload::Heartbeat => EventKind::Heartbeat,
        }
    }
}

/// One endpoint of a simulated datagram pipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub addr: NodeAddr,
    pub port: u16,
}

/// A unit of guest data in flight between two hosts. `sent_at` is the
/// sender's virtual send time; the receiving worker schedules delivery at
/// `sent_at + latency(src, dst)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub src: Endpoint,
    pub dst: Endpoint,
    pub payload: Bytes,
    pub sent_at: VirtualTime,
}
