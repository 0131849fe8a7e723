//! Topology oracle and placement tracking.
//!
//! Each worker holds its own copy, built from the op stream and `Track`
//! frames; nothing here is shared between workers. The master builds the
//! authoritative copy the same way before fan-out and derives the runahead
//! bound (`min_delay`) from it.

use fnv::FnvHashMap;

use crate::bus::frame::TrackRecord;
use crate::engine::time::SimDuration;
use crate::engine::{NetworkId, NodeAddr, WorkerId};

#[derive(Debug, Clone, Copy)]
struct Network {
    intra_latency: SimDuration,
}

pub struct Topology {
    networks: FnvHashMap<NetworkId, Network>,
    links: FnvHashMap<(NetworkId, NetworkId), SimDuration>,
    tracks: FnvHashMap<NodeAddr, TrackRecord>,
    by_name: FnvHashMap<String, NodeAddr>,
    runahead_floor: SimDuration,
}

impl Topology {
    pub fn new(runahead_floor_ms: u64) -> Self {
        Topology {
            networks: FnvHashMap::default(),
            links: FnvHashMap::default(),
            tracks: FnvHashMap::default(),
            by_name: FnvHashMap::default(),
            runahead_floor: SimDuration::from_millis(runahead_floor_ms),
        }
    }

    pub fn add_network(&mut self, id: NetworkId, intra_latency_ms: u64) {
        self.networks.insert(
            id,
            Network {
                intra_latency: SimDuration::from_millis(intra_latency_ms.max(1)),
            },
        );
    }

    pub fn connect(&mut self, a: NetworkId, b: NetworkId, latency_ms: u64) -> bool {
        if !self.networks.contains_key(&a) || !self.networks.contains_key(&b) {
            return false;
        }
        let latency = SimDuration::from_millis(latency_ms.max(1));
        self.links.insert(link_key(a, b), latency);
        true
    }

    pub fn has_network(&self, id: NetworkId) -> bool {
        self.networks.contains_key(&id)
    }

    /// Smallest delay over any edge, clamped to the runahead floor. `None`
    /// until at least one network exists.
    pub fn min_delay(&self) -> Option<SimDuration> {
        let intra = self.networks.values().map(|n| n.intra_latency).min();
        let cross = self.links.values().copied().min();
        let min = match (intra, cross) {
            (Some(a), Some(b)) => a.min(b),
            (Some(a), None) => a,
            (None, _) => return None,
        };
        Some(min.max(self.runahead_floor))
    }

    /// Largest delay over any edge.
    pub fn max_delay(&self) -> Option<SimDuration> {
        let intra = self.networks.values().map(|n| n.intra_latency).max();
        let cross = self.links.values().copied().max();
        match (intra, cross) {
            (Some(a), Some(b)) => Some(a.max(b).max(self.runahead_floor)),
            (Some(a), None) => Some(a.max(self.runahead_floor)),
            (None, _) => None,
        }
    }

    /// End-to-end delay between two placed hosts. `None` when either host is
    /// untracked or the networks are not linked.
    pub fn latency(&self, src: NodeAddr, dst: NodeAddr) -> Option<SimDuration> {
        let src_net = self.tracks.get(&src)?.network;
        let dst_net = self.tracks.get(&dst)?.network;
        let raw = if src_net == dst_net {
            self.networks.get(&src_net)?.intra_latency
        } else {
            *self.links.get(&link_key(src_net, dst_net))?
        };
        Some(raw.max(self.runahead_floor))
    }

    /// Record a node placement (idempotent; re-tracks overwrite).
    pub fn track(&mut self, record: TrackRecord) {
        self.by_name.insert(record.hostname.clone(), record.addr);
        self.tracks.insert(record.addr, record);
    }

    pub fn owner_of(&self, addr: NodeAddr) -> Option<WorkerId> {
        self.tracks.get(&addr).map(|t| t.owner)
    }

    pub fn resolve_name(&self, hostname: &str) -> Option<NodeAddr> {
        self.by_name.get(hostname).copied()
    }

    pub fn resolve_addr(&self, addr: NodeAddr) -> Option<&str> {
        self.tracks.get(&addr).map(|t| t.hostname.as_str())
    }

    /// Smaller of a host's up/down bandwidth, the bound a peer can rely on.
    pub fn resolve_minbw(&self, addr: NodeAddr) -> Option<u32> {
        self.tracks.get(&addr).map(|t| t.kbps_up.min(t.kbps_down))
    }

    pub fn tracked_count(&self) -> usize {
        self.tracks.len()
    }
}

fn link_key(a: NetworkId, b: NetworkId) -> (NetworkId, NetworkId) {
    if a.0 <= b.0 {
        (a, b)
    } else {
        (b, a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracked(topo: &mut Topology, addr: u32, net: u16, name: &str) {
        topo.track(TrackRecord {
            network: NetworkId(net),
            addr: NodeAddr(addr),
            owner: WorkerId(0),
            hostname: name.to_string(),
            kbps_up: 1000,
            kbps_down: 8000,
        });
    }

    #[test]
    fn test_min_delay_none_without_networks() {
        let topo = Topology::new(10);
        assert!(topo.min_delay().is_none());
    }

    #[test]
    fn test_min_delay_clamped_to_floor() {
        let mut topo = Topology::new(10);
        topo.add_network(NetworkId(1), 2);
        assert_eq!(topo.min_delay(), Some(SimDuration::from_millis(10)));

        topo.add_network(NetworkId(2), 50);
        assert!(topo.connect(NetworkId(1), NetworkId(2), 30));
        assert_eq!(topo.min_delay(), Some(SimDuration::from_millis(10)));
        assert_eq!(topo.max_delay(), Some(SimDuration::from_millis(50)));
    }

    #[test]
    fn test_connect_requires_known_networks() {
        let mut topo = Topology::new(1);
        topo.add_network(NetworkId(1), 10);
        assert!(!topo.connect(NetworkId(1), NetworkId(9), 20));
    }

    #[test]
    fn test_latency_intra_and_cross() {
        let mut topo = Topology::new(1);
        topo.add_network(NetworkId(1), 10);
        topo.add_network(NetworkId(2), 10);
        topo.connect(NetworkId(1), NetworkId(2), 40);
        tracked(&mut topo, 1, 1, "a");
        tracked(&mut topo, 2, 1, "b");
        tracked(&mut topo, 3, 2, "c");

        assert_eq!(
            topo.latency(NodeAddr(1), NodeAddr(2)),
            Some(SimDuration::from_millis(10))
        );
        // Link lookup is direction-independent.
        assert_eq!(
            topo.latency(NodeAddr(3), NodeAddr(1)),
            Some(SimDuration::from_millis(40))
        );
        assert_eq!(topo.latency(NodeAddr(1), NodeAddr(99)), None);
    }

    #[test]
    fn test_resolver() {
        let mut topo = Topology::new(1);
        topo.add_network(NetworkId(1), 10);
        tracked(&mut topo, 7, 1, "ping.example");

        assert_eq!(topo.resolve_name("ping.example"), Some(NodeAddr(7)));
        assert_eq!(topo.resolve_addr(NodeAddr(7)), Some("ping.example"));
        assert_eq!(topo.resolve_minbw(NodeAddr(7)), Some(1000));
        assert_eq!(topo.resolve_name("nope"), None);
        assert_eq!(topo.owner_of(NodeAddr(7)), Some(WorkerId(0)));
    }
}
