//! The guest-facing system interface.
//!
//! Every guest entry point receives a `NodeApi` borrowing exactly the state
//! the guest may touch: its own host, the worker's calendar, the read-only
//! topology, and an outbox for packets. Requests are ordinary typed methods;
//! nothing is erased through varargs or void pointers.

use bytes::Bytes;

use super::{Host, HostError};
use crate::engine::calendar::Calendar;
use crate::engine::event::{Endpoint, EventPayload, Packet};
use crate::engine::time::{SimDuration, VirtualTime};
use crate::engine::vepoll::RwSet;
use crate::engine::{CallbackId, NodeAddr, SockId, TimerId};
use crate::rng::DeterministicRng;
use crate::topology::Topology;

/// Virtual time rendered as a timeval, for guests that think in
/// `gettimeofday` terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimTimeval {
    pub tv_sec: u64,
    pub tv_usec: u32,
}

pub struct NodeApi<'w> {
    now: VirtualTime,
    wall_offset_ms: u64,
    host: &'w mut Host,
    calendar: &'w mut Calendar,
    topology: &'w Topology,
    outbox: &'w mut Vec<Packet>,
    rng: &'w mut DeterministicRng,
    exit_requested: bool,
    abort_reason: Option<String>,
}

impl<'w> NodeApi<'w> {
    pub(crate) fn new(
        now: VirtualTime,
        wall_offset_ms: u64,
        host: &'w mut Host,
        calendar: &'w mut Calendar,
        topology: &'w Topology,
        outbox: &'w mut Vec<Packet>,
        rng: &'w mut DeterministicRng,
    ) -> Self {
        NodeApi {
            now,
            wall_offset_ms,
            host,
            calendar,
            topology,
            outbox,
            rng,
            exit_requested: false,
            abort_reason: None,
        }
    }

    // --- identity and time ---

    pub fn getip(&self) -> NodeAddr {
        self.host.addr
    }

    pub fn hostname(&self) -> &str {
        &self.host.hostname
    }

    /// Current virtual time. With the wallclock startup offset configured,
    /// guests see wall-epoch + virtual instead of pure virtual.
    pub fn gettime(&self) -> VirtualTime {
        VirtualTime::from_millis(self.now.as_millis() + self.wall_offset_ms)
    }

    pub fn gettimeofday(&self) -> SimTimeval {
        let ms = self.gettime().as_millis();
        SimTimeval {
            tv_sec: ms / 1000,
            tv_usec: ((ms % 1000) * 1000) as u32,
        }
    }

    /// Deterministic randomness. Guests must draw entropy here, never from
    /// ambient process sources, or replays diverge.
    pub fn rand_u64(&mut self) -> u64 {
        self.rng.next_u64()
    }

    pub fn rand_range(&mut self, min: u64, max: u64) -> u64 {
        self.rng.gen_range(min, max)
    }

    pub fn rand_bool(&mut self, probability: f64) -> bool {
        self.rng.gen_bool(probability)
    }

    // --- timers ---

    /// Arm a one-shot timer. `cb_id` and `arg` come back verbatim in
    /// `timer_expired`.
    pub fn create_timer(&mut self, delay_ms: u64, cb_id: CallbackId, arg: u64) -> TimerId {
        let (tid, expire) =
            self.host
                .timers
                .create(self.now, SimDuration::from_millis(delay_ms), cb_id, arg);
        self.calendar.insert(
            expire,
            EventPayload::Timer {
                host: self.host.addr,
                tid,
            },
        );
        tid
    }

    /// Cancel a timer. Idempotent; the pending event fires as a no-op.
    pub fn destroy_timer(&mut self, tid: TimerId) -> bool {
        self.host.timers.cancel(tid)
    }

    // --- resolver ---

    pub fn resolve_name(&self, hostname: &str) -> Option<NodeAddr> {
        self.topology.resolve_name(hostname)
    }

    pub fn resolve_addr(&self, addr: NodeAddr) -> Option<&str> {
        self.topology.resolve_addr(addr)
    }

    pub fn resolve_minbw(&self, addr: NodeAddr) -> Option<u32> {
        self.topology.resolve_minbw(addr)
    }

    // --- sockets ---

    pub fn socket_open(&mut self, port: u16) -> Result<SockId, HostError> {
        let (sockd, armed) = self.host.sockets.open(port)?;
        if let Some(vep) = armed {
            self.calendar
                .insert(self.now, EventPayload::Notify(std::sync::Arc::downgrade(&vep)));
        }
        Ok(sockd)
    }

    pub fn socket_close(&mut self, sockd: SockId) -> Result<(), HostError> {
        self.host.sockets.close(sockd)
    }

    /// Register interest in readiness directions; arms a wakeup when one is
    /// already deliverable.
    pub fn interest_add(&mut self, sockd: SockId, dirs: RwSet) -> Result<(), HostError> {
        let sock = self
            .host
            .sockets
            .get(sockd)
            .ok_or(HostError::BadSocket(sockd))?;
        let vep = sock.vep.clone();
        if vep.lock().interest_add(dirs) {
            self.calendar
                .insert(self.now, EventPayload::Notify(std::sync::Arc::downgrade(&vep)));
        }
        Ok(())
    }

    pub fn interest_remove(&mut self, sockd: SockId, dirs: RwSet) -> Result<(), HostError> {
        let sock = self
            .host
            .sockets
            .get(sockd)
            .ok_or(HostError::BadSocket(sockd))?;
        sock.vep.lock().interest_remove(dirs);
        Ok(())
    }

    pub fn socket_is_readable(&self, sockd: SockId) -> bool {
        self.host
            .sockets
            .get(sockd)
            .map(|s| s.vep.lock().is_readable())
            .unwrap_or(false)
    }

    pub fn socket_is_writable(&self, sockd: SockId) -> bool {
        self.host
            .sockets
            .get(sockd)
            .map(|s| s.vep.lock().is_writable())
            .unwrap_or(false)
    }

    /// Send a datagram. Queued in the outbox; the worker routes it after the
    /// entry point returns. Fails when the destination is untracked or the
    /// networks are not linked.
    pub fn send_to(
        &mut self,
        sockd: SockId,
        dst: NodeAddr,
        dst_port: u16,
        payload: impl Into<Bytes>,
    ) -> Result<(), HostError> {
        let sock = self
            .host
            .sockets
            .get(sockd)
            .ok_or(HostError::BadSocket(sockd))?;
        if self.topology.latency(self.host.addr, dst).is_none() {
            return Err(HostError::Unreachable(dst));
        }
        self.outbox.push(Packet {
            src: Endpoint {
                addr: self.host.addr,
                port: sock.port,
            },
            dst: Endpoint {
                addr: dst,
                port: dst_port,
            },
            payload: payload.into(),
            sent_at: self.now,
        });
        Ok(())
    }

    /// Receive the next queued datagram, if any.
    pub fn recv_from(&mut self, sockd: SockId) -> Result<Option<(Endpoint, Bytes)>, HostError> {
        self.host.sockets.recv(sockd)
    }

    // --- lifecycle ---

    /// Run `hook` when this host is torn down.
    pub fn set_exit_hook(&mut self, hook: Box<dyn FnOnce() + Send>) {
        self.host.exit_hook = Some(hook);
    }

    /// Guest-initiated exit. The entry point should return promptly; the
    /// worker unwinds the host at the dispatch trailing edge and never
    /// re-enters it.
    pub fn exit(&mut self) {
        self.exit_requested = true;
    }

    /// Abort the whole simulation with an error surfaced to the master.
    pub fn abort(&mut self, reason: impl Into<String>) {
        self.abort_reason = Some(reason.into());
    }

    pub(crate) fn exit_requested(&self) -> bool {
        self.exit_requested
    }

    pub(crate) fn take_abort(&mut self) -> Option<String> {
        self.abort_reason.take()
    }
}
