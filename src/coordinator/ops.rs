use crate::engine::time::VirtualTime;
use crate::engine::{NetworkId, NodeAddr};

/// A simulation operation from the coordinator's op stream. Workers schedule
/// ops as calendar events at `at`; an op whose dependency has not arrived yet
/// stalls and is retried on later heartbeats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimOp {
    /// Declare a network cloud with an intra-network latency.
    CreateNetwork {
        at: VirtualTime,
        id: NetworkId,
        intra_latency_ms: u64,
    },
    /// Link two networks with a cross-network latency.
    ConnectNetworks {
        at: VirtualTime,
        a: NetworkId,
        b: NetworkId,
        latency_ms: u64,
    },
    /// Place a host on a network and instantiate its application plug-in.
    /// Stalls until the network and plug-in are known.
    CreateNode {
        at: VirtualTime,
        addr: NodeAddr,
        network: NetworkId,
        hostname: String,
        plugin: String,
        args: Vec<String>,
        kbps_up: u32,
        kbps_down: u32,
    },
    /// End of the operation stream; the worker completes once dispatched.
    End { at: VirtualTime },
}

impl SimOp {
    pub fn at(&self) -> VirtualTime {
        match self {
            SimOp::CreateNetwork { at, .. }
            | SimOp::ConnectNetworks { at, .. }
            | SimOp::CreateNode { at, .. }
            | SimOp::End { at } => *at,
        }
    }

    /// Short tag for logs.
    pub fn name(&self) -> &'static str {
        match self {
            SimOp::CreateNetwork { .. } => "create_network",
            SimOp::ConnectNetworks { .. } => "connect_networks",
            SimOp::CreateNode { .. } => "create_node",
            SimOp::End { .. } => "end",
        }
    }
}
