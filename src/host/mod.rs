//! Virtual hosts: a simulated endpoint owning its application instance, its
//! sockets (with their readiness records), and its timers.

pub mod api;
pub mod plugin;

use std::collections::VecDeque;
use std::fmt;

use bytes::Bytes;
use fnv::FnvHashMap;

use crate::engine::event::Endpoint;
use crate::engine::timer::TimerTable;
use crate::engine::vepoll::{RwSet, VepollRecord, VepollRef};
use crate::engine::{NetworkId, NodeAddr, SockId};
use plugin::Application;

#[derive(Debug)]
pub enum HostError {
    PortInUse(u16),
    BadSocket(SockId),
    Unreachable(NodeAddr),
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostError::PortInUse(p) => write!(f, "port {} already bound", p),
            HostError::BadSocket(s) => write!(f, "no such socket {}", s.0),
            HostError::Unreachable(a) => write!(f, "no route to {}", a.0),
        }
    }
}

impl std::error::Error for HostError {}

/// A simulated network endpoint. The application instance lives in `app`
/// except while a guest entry point is on the stack, when the context slot
/// holds it.
pub struct Host {
    pub id: u32,
    pub addr: NodeAddr,
    pub hostname: String,
    pub network: NetworkId,
    pub app: Option<Box<dyn Application>>,
    pub sockets: SocketMgr,
    pub timers: TimerTable,
    pub exit_hook: Option<Box<dyn FnOnce() + Send>>,
}

impl Host {
    pub fn new(
        id: u32,
        addr: NodeAddr,
        hostname: String,
        network: NetworkId,
        app: Box<dyn Application>,
        timer_capacity: usize,
        recv_queue_packets: usize,
    ) -> Self {
        Host {
            id,
            addr,
            hostname,
            network,
            app: Some(app),
            sockets: SocketMgr::new(addr, recv_queue_packets),
            timers: TimerTable::new(timer_capacity),
            exit_hook: None,
        }
    }
}

/// Result of depositing an inbound payload into a socket.
pub enum Deposit {
    /// No socket bound to the destination port.
    NoSocket,
    /// Receive queue full; payload dropped.
    Full,
    /// Stored. When `notify` is set, the caller must schedule the readiness
    /// wakeup for that record at the current time.
    Stored { notify: Option<VepollRef> },
}

pub struct Socket {
    pub sockd: SockId,
    pub port: u16,
    recv: VecDeque<(Endpoint, Bytes)>,
    pub vep: VepollRef,
}

/// Per-host socket table: datagram pipes keyed by descriptor, demultiplexed
/// by port on deposit.
pub struct SocketMgr {
    addr: NodeAddr,
    next_sockd: u32,
    socks: FnvHashMap<SockId, Socket>,
    by_port: FnvHashMap<u16, SockId>,
    recv_cap: usize,
}

impl SocketMgr {
    pub fn new(addr: NodeAddr, recv_cap: usize) -> Self {
        SocketMgr {
            addr,
            next_sockd: 0,
            socks: FnvHashMap::default(),
            by_port: FnvHashMap::default(),
            recv_cap: recv_cap.max(1),
        }
    }

    /// Bind a new socket. The write direction is available from the start
    /// (the transport stub never applies backpressure); returns the record
    /// to arm when the caller wants the initial writability wakeup.
    pub fn open(&mut self, port: u16) -> Result<(SockId, Option<VepollRef>), HostError> {
        if self.by_port.contains_key(&port) {
            return Err(HostError::PortInUse(port));
        }
        let sockd = SockId(self.next_sockd);
        self.next_sockd += 1;
        let vep = VepollRecord::new_ref(self.addr, sockd);
        let notify = {
            let mut rec = vep.lock();
            rec.mark_available(RwSet::WRITE)
        };
        let armed = notify.then(|| vep.clone());
        self.socks.insert(
            sockd,
            Socket {
                sockd,
                port,
                recv: VecDeque::new(),
                vep,
            },
        );
        self.by_port.insert(port, sockd);
        Ok((sockd, armed))
    }

    /// Tear down a socket. The readiness record defers its free to the
    /// trailing edge of any in-flight notification.
    pub fn close(&mut self, sockd: SockId) -> Result<(), HostError> {
        let sock = self.socks.remove(&sockd).ok_or(HostError::BadSocket(sockd))?;
        self.by_port.remove(&sock.port);
        sock.vep.lock().request_destroy();
        Ok(())
    }

    /// Transport deposit hook for an arriving payload.
    pub fn deposit(&mut self, port: u16, from: Endpoint, payload: Bytes) -> Deposit {
        let Some(&sockd) = self.by_port.get(&port) else {
            return Deposit::NoSocket;
        };
        let sock = self
            .socks
            .get_mut(&sockd)
            .expect("port table points at live socket");
        if sock.recv.len() >= self.recv_cap {
            return Deposit::Full;
        }
        sock.recv.push_back((from, payload));
        let notify = sock.vep.lock().mark_available(RwSet::READ);
        Deposit::Stored {
            notify: notify.then(|| sock.vep.clone()),
        }
    }

    /// Guest receive: pop the next payload; clears read availability when
    /// the queue drains.
    pub fn recv(&mut self, sockd: SockId) -> Result<Option<(Endpoint, Bytes)>, HostError> {
        let sock = self.socks.get_mut(&sockd).ok_or(HostError::BadSocket(sockd))?;
        let item = sock.recv.pop_front();
        if sock.recv.is_empty() {
            sock.vep.lock().mark_unavailable(RwSet::READ);
        }
        Ok(item)
    }

    pub fn get(&self, sockd: SockId) -> Option<&Socket> {
        self.socks.get(&sockd)
    }

    /// Destroy every socket (host teardown).
    pub fn close_all(&mut self) {
        for (_, sock) in self.socks.drain() {
            sock.vep.lock().request_destroy();
        }
        self.by_port.clear();
    }

    pub fn len(&self) -> usize {
        self.socks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.socks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mgr() -> SocketMgr {
        SocketMgr::new(NodeAddr(1), 4)
    }

    fn peer() -> Endpoint {
        Endpoint {
            addr: NodeAddr(2),
            port: 9,
        }
    }

    #[test]
    fn test_open_arms_write_readiness() {
        let mut m = mgr();
        let (sockd, armed) = m.open(80).unwrap();
        assert!(armed.is_some());
        let sock = m.get(sockd).unwrap();
        assert!(sock.vep.lock().is_writable());
        assert!(!sock.vep.lock().is_readable());
    }

    #[test]
    fn test_port_collision_rejected() {
        let mut m = mgr();
        m.open(80).unwrap();
        match m.open(80) {
            Err(HostError::PortInUse(80)) => {}
            other => panic!("expected PortInUse, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_deposit_and_recv_toggle_readability() {
        let mut m = mgr();
        let (sockd, _) = m.open(80).unwrap();

        match m.deposit(80, peer(), Bytes::from_static(b"hi")) {
            Deposit::Stored { notify } => assert!(notify.is_some()),
            _ => panic!("expected Stored"),
        }
        assert!(m.get(sockd).unwrap().vep.lock().is_readable());

        let (from, data) = m.recv(sockd).unwrap().unwrap();
        assert_eq!(from, peer());
        assert_eq!(&data[..], b"hi");
        assert!(!m.get(sockd).unwrap().vep.lock().is_readable());
        assert!(m.recv(sockd).unwrap().is_none());
    }

    #[test]
    fn test_deposit_unknown_port() {
        let mut m = mgr();
        assert!(matches!(
            m.deposit(81, peer(), Bytes::from_static(b"x")),
            Deposit::NoSocket
        ));
    }

    #[test]
    fn test_deposit_respects_queue_cap() {
        let mut m = mgr();
        m.open(80).unwrap();
        for _ in 0..4 {
            assert!(matches!(
                m.deposit(80, peer(), Bytes::from_static(b"x")),
                Deposit::Stored { .. }
            ));
        }
        assert!(matches!(
            m.deposit(80, peer(), Bytes::from_static(b"x")),
            Deposit::Full
        ));
    }

    #[test]
    fn test_close_frees_port_for_rebind() {
        let mut m = mgr();
        let (sockd, _) = m.open(80).unwrap();
        m.close(sockd).unwrap();
        assert!(m.open(80).is_ok());
        assert!(matches!(m.close(sockd), Err(HostError::BadSocket(_))));
    }
}
