//! The worker event loop.
//!
//! A worker owns its calendar, its hosts, its timers, and its view of every
//! peer's time state. Execution is single-threaded and cooperative: guest
//! code runs only inside event handlers, suspension happens only at
//! heartbeat boundaries, and all cross-worker traffic is frames on the bus.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use fnv::FnvHashMap;
use tracing::{debug, info, trace, warn};

use super::calendar::Calendar;
use super::context::ContextSlot;
use super::event::{Event, EventKind, EventPayload, Packet};
use super::time::VirtualTime;
use super::timer::TimerItem;
use super::vepoll::{NotifyDecision, NotifyRearm, RwSet, VepollRef};
use super::window::WindowCtl;
use super::{EngineError, NodeAddr, WorkerId, TICKTOCK_INTERVAL};
use crate::bus::frame::{Frame, StateFrame};
use crate::bus::{BusReceiver, BusSender};
use crate::config::SimConfig;
use crate::coordinator::ops::SimOp;
use crate::host::api::NodeApi;
use crate::host::plugin::{Application, PluginRegistry};
use crate::host::{Deposit, Host};
use crate::rng::DeterministicRng;
use crate::topology::Topology;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerMode {
    /// Receiving setup ops; nothing dispatches yet.
    Spooling,
    Simulating,
    Complete,
    Error,
}

#[derive(Debug, Default, Clone)]
pub struct WorkerStats {
    pub events_dispatched: u64,
    pub timers_fired: u64,
    pub timers_noop: u64,
    pub packets_deposited: u64,
    pub packets_dropped: u64,
    pub ops_executed: u64,
    pub ops_stalled: u64,
    pub notifies: u64,
    pub heartbeats: u64,
    pub broadcasts_sent: u64,
    pub frames_dropped: u64,
    pub hosts_created: u64,
    pub hosts_exited: u64,
}

/// One dispatched event, for the optional trace log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchRecord {
    pub at: VirtualTime,
    pub kind: EventKind,
}

/// What a worker hands back when its thread finishes.
#[derive(Debug)]
pub struct WorkerReport {
    pub id: WorkerId,
    pub stats: WorkerStats,
    pub error: Option<String>,
    pub dispatch_log: Vec<DispatchRecord>,
}

/// Everything a worker is wired up with at spawn time.
pub struct WorkerParams {
    pub id: WorkerId,
    pub all_workers: Vec<WorkerId>,
    pub rx: BusReceiver,
    pub peers: FnvHashMap<WorkerId, BusSender>,
    pub up: BusSender,
    pub registry: Arc<PluginRegistry>,
    pub config: SimConfig,
}

struct HeartbeatOutcome {
    dispatched: usize,
}

enum OpOutcome {
    Done,
    Stalled(SimOp),
}

pub struct Worker {
    id: WorkerId,
    mode: WorkerMode,
    clock: VirtualTime,
    calendar: Calendar,
    hosts: FnvHashMap<NodeAddr, Host>,
    windows: WindowCtl,
    stalled_ops: VecDeque<SimOp>,
    topology: Topology,
    registry: Arc<PluginRegistry>,
    context: ContextSlot,
    outbox: Vec<Packet>,
    rx: BusReceiver,
    peers: FnvHashMap<WorkerId, BusSender>,
    peer_order: Vec<WorkerId>,
    up: BusSender,
    config: SimConfig,
    rng: DeterministicRng,
    stats: WorkerStats,
    dispatch_log: Vec<DispatchRecord>,
    error: Option<String>,
    error_sent: bool,
    next_host_id: u32,
    wall_start: Instant,
    wall_offset_ms: u64,
    last_progress: Instant,
}

impl Worker {
    pub fn new(params: WorkerParams) -> Self {
        let WorkerParams {
            id,
            all_workers,
            rx,
            peers,
            up,
            registry,
            config,
        } = params;

        let mut peer_order: Vec<WorkerId> = all_workers.iter().copied().filter(|&w| w != id).collect();
        peer_order.sort();

        let wall_offset_ms = if config.use_wallclock_startup_time_offset {
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0)
        } else {
            0
        };

        Worker {
            mode: WorkerMode::Spooling,
            clock: VirtualTime::ZERO,
            calendar: Calendar::new(config.event_granularity),
            hosts: FnvHashMap::default(),
            windows: WindowCtl::new(id, all_workers),
            stalled_ops: VecDeque::new(),
            topology: Topology::new(config.runahead_floor_ms),
            registry,
            context: ContextSlot::new(),
            outbox: Vec::new(),
            rx,
            peers,
            peer_order,
            up,
            rng: DeterministicRng::derive(config.seed, id.0 as u64),
            config,
            stats: WorkerStats::default(),
            dispatch_log: Vec::new(),
            error: None,
            error_sent: false,
            next_host_id: 0,
            wall_start: Instant::now(),
            wall_offset_ms,
            last_progress: Instant::now(),
            id,
        }
    }

    /// Run to completion. The loop alternates bus drains with heartbeat
    /// batches and parks briefly when neither made progress.
    pub fn run(mut self) -> WorkerReport {
        let idle_wait = Duration::from_millis(1);
        loop {
            let drained = self.pump();
            let hb = self.heartbeat();
            if matches!(self.mode, WorkerMode::Complete | WorkerMode::Error) {
                break;
            }
            if drained == 0 && hb.dispatched == 0 {
                self.check_stall_deadline();
                if self.mode == WorkerMode::Error {
                    break;
                }
                match self.rx.recv_timeout(idle_wait) {
                    Ok(Some(frame)) => {
                        self.last_progress = Instant::now();
                        self.handle_frame(frame);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        self.stats.frames_dropped += 1;
                        warn!(worker = self.id.0, error = %e, "dropping undecodable frame");
                    }
                }
            } else {
                self.last_progress = Instant::now();
            }
        }

        info!(
            worker = self.id.0,
            vtime = %self.clock,
            events = self.stats.events_dispatched,
            broadcasts = self.stats.broadcasts_sent,
            swaps = self.context.swaps(),
            "worker finished"
        );

        WorkerReport {
            id: self.id,
            stats: self.stats,
            error: self.error,
            dispatch_log: self.dispatch_log,
        }
    }

    // --- bus intake ---

    /// Drain every queued frame. Runs between heartbeats, never inside one.
    fn pump(&mut self) -> usize {
        let mut handled = 0;
        loop {
            match self.rx.try_recv() {
                Ok(Some(frame)) => {
                    self.handle_frame(frame);
                    handled += 1;
                }
                Ok(None) => break,
                Err(e) => {
                    self.stats.frames_dropped += 1;
                    warn!(worker = self.id.0, error = %e, "dropping undecodable frame");
                }
            }
        }
        handled
    }

    fn handle_frame(&mut self, frame: Frame) {
        match frame {
            Frame::Start {
                min_latency,
                max_latency,
            } => {
                let floor = crate::engine::SimDuration::from_millis(self.config.runahead_floor_ms);
                self.windows.set_min_latency(min_latency.max(floor));
                if self.mode == WorkerMode::Spooling {
                    self.mode = WorkerMode::Simulating;
                    self.calendar
                        .insert(VirtualTime::ZERO + TICKTOCK_INTERVAL, EventPayload::Heartbeat);
                    info!(
                        worker = self.id.0,
                        min_latency = min_latency.as_millis(),
                        max_latency = max_latency.as_millis(),
                        "simulation started"
                    );
                }
            }
            Frame::Op(op) => {
                trace!(worker = self.id.0, op = op.name(), at = %op.at(), "op received");
                if !op.at().is_valid() {
                    self.stats.frames_dropped += 1;
                    warn!(worker = self.id.0, op = op.name(), "dropping op with invalid time");
                    return;
                }
                match op {
                    // Topology-plane ops take effect at receipt: a stalled op
                    // can only be unblocked by inbound frames (the stall
                    // collapses the window, so calendar events cannot run).
                    SimOp::CreateNetwork { .. } | SimOp::ConnectNetworks { .. } => {
                        self.apply_topology_op(&op);
                    }
                    _ => self.calendar.insert(op.at(), EventPayload::Op(op)),
                }
            }
            Frame::Track(record) => {
                self.topology.track(record);
            }
            Frame::State(state) => {
                trace!(worker = self.id.0, src = state.src.0, current = %state.current, "peer state");
                self.windows.apply_state(&state);
            }
            Frame::Packet(packet) => {
                if let Err(e) = self.schedule_packet_arrival(packet) {
                    self.abort_sim(e.to_string());
                }
            }
            Frame::Error { worker, message } => {
                warn!(worker = self.id.0, peer = worker.0, "peer failed: {}", message);
                self.windows.invalidate_peer(worker);
                if !matches!(self.mode, WorkerMode::Complete | WorkerMode::Error) {
                    self.fail(format!("peer {} failed: {}", worker.0, message));
                }
            }
            // Upward-only frames; a worker receiving one is a protocol
            // violation and drops it.
            Frame::DoneWorker { .. } | Frame::DoneSlave { .. } => {
                self.stats.frames_dropped += 1;
                debug!(worker = self.id.0, "dropping coordinator frame addressed upward");
            }
        }
    }

    /// Compute virtual arrival for an inbound (or loopback) packet and put it
    /// on the calendar. An arrival behind the local clock means the safe-time
    /// protocol was violated somewhere and is fatal.
    fn schedule_packet_arrival(&mut self, packet: Packet) -> Result<(), EngineError> {
        if !packet.sent_at.is_valid() {
            self.stats.frames_dropped += 1;
            warn!(worker = self.id.0, "dropping packet with invalid send time");
            return Ok(());
        }
        let Some(latency) = self.topology.latency(packet.src.addr, packet.dst.addr) else {
            self.stats.packets_dropped += 1;
            debug!(worker = self.id.0, dst = packet.dst.addr.0, "dropping unroutable packet");
            return Ok(());
        };
        let arrival = packet.sent_at + latency;
        if arrival < self.clock {
            return Err(EngineError::BackwardsTime {
                at: arrival,
                clock: self.clock,
            });
        }
        self.calendar.insert(arrival, EventPayload::Packet(packet));
        Ok(())
    }

    // --- heartbeat ---

    /// One bounded execution batch: retry stalled ops, refresh the time
    /// window, dispatch everything safe, yield.
    fn heartbeat(&mut self) -> HeartbeatOutcome {
        if self.mode != WorkerMode::Simulating {
            return HeartbeatOutcome { dispatched: 0 };
        }
        self.stats.heartbeats += 1;

        // Retry stalled ops; the head blocks everything behind it.
        while let Some(op) = self.stalled_ops.pop_front() {
            match self.execute_op(op) {
                Ok(OpOutcome::Done) => {}
                Ok(OpOutcome::Stalled(op)) => {
                    self.stalled_ops.push_front(op);
                    break;
                }
                Err(e) => {
                    self.abort_sim(e.to_string());
                    return HeartbeatOutcome { dispatched: 0 };
                }
            }
        }

        let stalled = !self.stalled_ops.is_empty();
        let sync = self
            .windows
            .sync_time(self.clock, self.calendar.peek_min_time(), stalled);
        if let Some(state) = sync.broadcast {
            self.broadcast_state(state);
        }
        if !sync.window.is_valid() {
            return HeartbeatOutcome { dispatched: 0 };
        }

        let mut dispatched = 0;
        while self.mode == WorkerMode::Simulating && dispatched < self.config.heartbeat_batch {
            let next = self.calendar.peek_min_time();
            if !next.is_valid() || next > sync.window {
                break;
            }
            let event = self
                .calendar
                .pop_min()
                .expect("calendar non-empty after peek");
            if event.at < self.clock {
                self.abort_sim(
                    EngineError::BackwardsTime {
                        at: event.at,
                        clock: self.clock,
                    }
                    .to_string(),
                );
                break;
            }
            if let Some(max_ms) = self.config.max_time_ms {
                if event.at > VirtualTime::from_millis(max_ms) {
                    info!(worker = self.id.0, "virtual time limit reached");
                    self.complete();
                    break;
                }
            }
            self.clock = event.at;
            if self.config.trace_dispatch {
                self.dispatch_log.push(DispatchRecord {
                    at: event.at,
                    kind: event.payload.kind(),
                });
            }
            self.stats.events_dispatched += 1;
            dispatched += 1;
            if let Err(e) = self.dispatch(event) {
                self.abort_sim(e.to_string());
                break;
            }
        }

        HeartbeatOutcome { dispatched }
    }

    fn dispatch(&mut self, event: Event) -> Result<(), EngineError> {
        match event.payload {
            EventPayload::Timer { host, tid } => self.dispatch_timer(host, tid),
            EventPayload::Packet(packet) => self.dispatch_packet(packet),
            EventPayload::Op(op) => {
                match self.execute_op(op)? {
                    OpOutcome::Done => {}
                    OpOutcome::Stalled(op) => {
                        self.stats.ops_stalled += 1;
                        self.stalled_ops.push_back(op);
                    }
                }
                Ok(())
            }
            EventPayload::Notify(weak) => self.dispatch_notify(weak),
            EventPayload::Heartbeat => {
                self.dispatch_ticktock();
                Ok(())
            }
        }
    }

    // --- event handlers ---

    fn dispatch_timer(&mut self, addr: NodeAddr, tid: super::TimerId) -> Result<(), EngineError> {
        let Some(mut host) = self.hosts.remove(&addr) else {
            // Host already destroyed; the timer drains as a no-op.
            self.stats.timers_noop += 1;
            return Ok(());
        };
        let Some(item) = host.timers.take(tid) else {
            self.stats.timers_noop += 1;
            self.hosts.insert(addr, host);
            return Ok(());
        };
        let TimerItem {
            cb_id, arg, valid, ..
        } = item;
        if !valid {
            self.stats.timers_noop += 1;
            self.hosts.insert(addr, host);
            return Ok(());
        }
        self.stats.timers_fired += 1;
        self.run_guest(host, |app, api| app.timer_expired(api, tid, cb_id, arg))
    }

    fn dispatch_packet(&mut self, packet: Packet) -> Result<(), EngineError> {
        let Some(host) = self.hosts.get_mut(&packet.dst.addr) else {
            self.stats.packets_dropped += 1;
            return Ok(());
        };
        match host
            .sockets
            .deposit(packet.dst.port, packet.src, packet.payload)
        {
            Deposit::NoSocket | Deposit::Full => {
                self.stats.packets_dropped += 1;
            }
            Deposit::Stored { notify } => {
                self.stats.packets_deposited += 1;
                if let Some(vep) = notify {
                    self.schedule_notify(self.clock, &vep);
                }
            }
        }
        Ok(())
    }

    fn dispatch_notify(
        &mut self,
        weak: std::sync::Weak<parking_lot::Mutex<super::vepoll::VepollRecord>>,
    ) -> Result<(), EngineError> {
        let Some(vep) = weak.upgrade() else {
            // Socket gone; the wakeup degrades to a no-op.
            return Ok(());
        };
        let (addr, sockd, decision) = {
            let mut rec = vep.lock();
            (rec.addr, rec.sockd, rec.begin_notification())
        };
        match decision {
            NotifyDecision::Destroyed | NotifyDecision::Masked => Ok(()),
            NotifyDecision::Deliver {
                can_read,
                can_write,
                read_first,
            } => {
                self.stats.notifies += 1;
                let Some(host) = self.hosts.remove(&addr) else {
                    vep.lock().finish_notification(RwSet::NONE);
                    return Ok(());
                };
                self.run_guest(host, |app, api| {
                    app.socket_ready(api, sockd, can_read, can_write, read_first)
                })?;
                let delivered = RwSet {
                    read: can_read,
                    write: can_write,
                };
                let rearm = vep.lock().finish_notification(delivered);
                match rearm {
                    NotifyRearm::Next => {
                        self.schedule_notify(
                            self.clock + crate::engine::SimDuration::from_millis(1),
                            &vep,
                        );
                    }
                    NotifyRearm::None | NotifyRearm::Destroyed => {}
                }
                Ok(())
            }
        }
    }

    fn dispatch_ticktock(&mut self) {
        info!(
            worker = self.id.0,
            vtime = %self.clock,
            wall_ms = self.wall_start.elapsed().as_millis() as u64,
            events = self.stats.events_dispatched,
            hosts = self.hosts.len(),
            calendar = self.calendar.size(),
            "ticktock"
        );
        if self.mode == WorkerMode::Simulating {
            self.calendar
                .insert(self.clock + TICKTOCK_INTERVAL, EventPayload::Heartbeat);
        }
    }

    // --- ops ---

    /// Apply a topology-plane op. Runs at frame receipt; also reachable from
    /// the dispatcher for ops that were spooled before this worker existed.
    fn apply_topology_op(&mut self, op: &SimOp) -> bool {
        let applied = match op {
            SimOp::CreateNetwork {
                id,
                intra_latency_ms,
                ..
            } => {
                self.topology.add_network(*id, *intra_latency_ms);
                true
            }
            SimOp::ConnectNetworks { a, b, latency_ms, .. } => {
                self.topology.connect(*a, *b, *latency_ms)
            }
            _ => false,
        };
        if applied {
            self.stats.ops_executed += 1;
        } else {
            warn!(worker = self.id.0, op = op.name(), "topology op not applicable");
        }
        applied
    }

    fn execute_op(&mut self, op: SimOp) -> Result<OpOutcome, EngineError> {
        match op {
            op @ (SimOp::CreateNetwork { .. } | SimOp::ConnectNetworks { .. }) => {
                if !self.apply_topology_op(&op) {
                    return Ok(OpOutcome::Stalled(op));
                }
                Ok(OpOutcome::Done)
            }
            SimOp::CreateNode {
                at,
                addr,
                network,
                hostname,
                plugin,
                args,
                kbps_up,
                kbps_down,
            } => {
                if !self.topology.has_network(network) {
                    // Network op still in flight; retry once it lands.
                    return Ok(OpOutcome::Stalled(SimOp::CreateNode {
                        at,
                        addr,
                        network,
                        hostname,
                        plugin,
                        args,
                        kbps_up,
                        kbps_down,
                    }));
                }
                let Some(factory) = self.registry.get(&plugin) else {
                    return Err(EngineError::UnknownPlugin(plugin));
                };
                let app = factory.instantiate();
                let id = self.next_host_id;
                self.next_host_id += 1;
                let host = Host::new(
                    id,
                    addr,
                    hostname.clone(),
                    network,
                    app,
                    self.config.timer_table_capacity,
                    self.config.recv_queue_packets,
                );
                self.stats.ops_executed += 1;
                self.stats.hosts_created += 1;
                info!(worker = self.id.0, host = %hostname, addr = addr.0, "node created");
                self.run_guest(host, |app, api| app.instantiate(api, &args))?;
                Ok(OpOutcome::Done)
            }
            SimOp::End { .. } => {
                self.stats.ops_executed += 1;
                self.shutdown_hosts()?;
                self.complete();
                Ok(OpOutcome::Done)
            }
        }
    }

    /// Tear down every remaining host in address order, invoking the guest
    /// `destroy` entry for each.
    fn shutdown_hosts(&mut self) -> Result<(), EngineError> {
        let mut addrs: Vec<NodeAddr> = self.hosts.keys().copied().collect();
        addrs.sort();
        for addr in addrs {
            let Some(mut host) = self.hosts.remove(&addr) else {
                continue;
            };
            if let Some(mut app) = self.context.load(&mut host) {
                let mut outbox = std::mem::take(&mut self.outbox);
                let mut api = NodeApi::new(
                    self.clock,
                    self.wall_offset_ms,
                    &mut host,
                    &mut self.calendar,
                    &self.topology,
                    &mut outbox,
                    &mut self.rng,
                );
                app.destroy(&mut api);
                drop(api);
                self.outbox = outbox;
                self.context.discard(app);
                self.flush_outbox();
            }
            self.destroy_host(host);
        }
        Ok(())
    }

    // --- guest execution ---

    /// Run one guest entry point under the context discipline: load the
    /// instance, hand it an API, and on return either write it back or, if
    /// the guest exited, unwind the host.
    fn run_guest(
        &mut self,
        mut host: Host,
        entry: impl FnOnce(&mut dyn Application, &mut NodeApi<'_>),
    ) -> Result<(), EngineError> {
        let addr = host.addr;
        let Some(mut app) = self.context.load(&mut host) else {
            self.hosts.insert(addr, host);
            return Ok(());
        };

        let mut outbox = std::mem::take(&mut self.outbox);
        let mut api = NodeApi::new(
            self.clock,
            self.wall_offset_ms,
            &mut host,
            &mut self.calendar,
            &self.topology,
            &mut outbox,
            &mut self.rng,
        );
        entry(app.as_mut(), &mut api);
        let exited = api.exit_requested();
        let abort = api.take_abort();
        drop(api);
        self.outbox = outbox;

        if exited {
            self.context.discard(app);
            info!(worker = self.id.0, host = %host.hostname, "guest exit");
            self.stats.hosts_exited += 1;
            self.destroy_host(host);
        } else {
            self.context.save(&mut host, app);
            self.hosts.insert(addr, host);
        }

        self.flush_outbox();
        debug_assert!(self.context.current().is_none());

        if let Some(reason) = abort {
            self.abort_sim(EngineError::Aborted(reason).to_string());
        }
        Ok(())
    }

    /// Final teardown of a host: timers fire as no-ops from here on, sockets
    /// defer their readiness records, the exit hook runs last.
    fn destroy_host(&mut self, mut host: Host) {
        host.timers.cancel_all();
        host.sockets.close_all();
        if let Some(hook) = host.exit_hook.take() {
            hook();
        }
    }

    fn schedule_notify(&mut self, at: VirtualTime, vep: &VepollRef) {
        self.calendar
            .insert(at, EventPayload::Notify(Arc::downgrade(vep)));
    }

    // --- outbound ---

    fn flush_outbox(&mut self) {
        if self.outbox.is_empty() {
            return;
        }
        let packets = std::mem::take(&mut self.outbox);
        for packet in packets {
            match self.topology.owner_of(packet.dst.addr) {
                Some(owner) if owner == self.id => {
                    if let Err(e) = self.schedule_packet_arrival(packet) {
                        self.abort_sim(e.to_string());
                        return;
                    }
                }
                Some(owner) => match self.peers.get(&owner) {
                    Some(tx) => tx.send(&Frame::Packet(packet)),
                    None => {
                        self.stats.packets_dropped += 1;
                        warn!(worker = self.id.0, owner = owner.0, "no bus link to owner");
                    }
                },
                None => {
                    self.stats.packets_dropped += 1;
                    debug!(worker = self.id.0, dst = packet.dst.addr.0, "dropping untracked destination");
                }
            }
        }
    }

    fn broadcast_state(&mut self, state: StateFrame) {
        self.stats.broadcasts_sent += 1;
        let frame = Frame::State(state);
        for peer in &self.peer_order {
            if let Some(tx) = self.peers.get(peer) {
                tx.send(&frame);
            }
        }
    }

    // --- lifecycle ---

    fn complete(&mut self) {
        if self.mode == WorkerMode::Complete {
            return;
        }
        self.mode = WorkerMode::Complete;
        // Final state: peers must never be window-bound by a finished worker.
        let final_state = StateFrame {
            src: self.id,
            last_event: self.clock,
            current: VirtualTime::MAX,
            next_event: VirtualTime::INVALID,
            window: VirtualTime::MAX,
        };
        self.broadcast_state(final_state);
        self.up.send(&Frame::DoneWorker { worker: self.id });
    }

    fn abort_sim(&mut self, reason: String) {
        if self.mode == WorkerMode::Error {
            return;
        }
        tracing::error!(worker = self.id.0, "aborting simulation: {}", reason);
        self.fail(reason);
        // Peers stall on our invalidated state and then see the error frame.
        if let Some(message) = self.error.clone() {
            let frame = Frame::Error {
                worker: self.id,
                message,
            };
            for peer in &self.peer_order {
                if let Some(tx) = self.peers.get(peer) {
                    tx.send(&frame);
                }
            }
        }
    }

    /// Enter error mode and report upward exactly once.
    fn fail(&mut self, reason: String) {
        if self.error.is_none() {
            self.error = Some(reason.clone());
        }
        self.mode = WorkerMode::Error;
        if !self.error_sent {
            self.error_sent = true;
            self.up.send(&Frame::Error {
                worker: self.id,
                message: reason,
            });
        }
    }

    fn check_stall_deadline(&mut self) {
        let limit = Duration::from_millis(self.config.stall_timeout_ms);
        if self.last_progress.elapsed() > limit {
            let detail = if self.mode == WorkerMode::Spooling {
                "still spooling, no start frame"
            } else if self.stalled_ops.is_empty() {
                "window never advanced"
            } else {
                "op dependency never arrived"
            };
            self.abort_sim(format!(
                "no progress for {}ms: {}",
                self.config.stall_timeout_ms, detail
            ));
        }
    }

    // --- test/introspection surface ---

    pub fn mode(&self) -> WorkerMode {
        self.mode
    }

    pub fn clock(&self) -> VirtualTime {
        self.clock
    }

    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }
}
