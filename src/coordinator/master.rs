//! The master: authoritative topology, op fan-out, completion aggregation.
//!
//! Node-placement ops round-robin across workers; every other frame
//! broadcasts. The master never touches worker state directly — everything
//! it knows about the run comes back as `DoneSlave`/`Error` frames.

use std::fmt;
use std::time::Duration;

use fnv::FnvHashMap;
use tracing::{info, warn};

use super::ops::SimOp;
use super::slave::{self, SlaveParams};
use super::{RunReport, Scenario};
use crate::bus::frame::{Frame, TrackRecord};
use crate::bus::{self, BusSender};
use crate::config::SimConfig;
use crate::engine::time::VirtualTime;
use crate::engine::worker::WorkerParams;
use crate::engine::{NodeAddr, SlaveId, WorkerId};
use crate::host::plugin::PluginRegistry;
use crate::topology::Topology;

/// First assigned host address (10.0.0.1).
const ADDR_BASE: u32 = 0x0a00_0001;

#[derive(Debug)]
pub enum MasterError {
    EmptyTopology,
    UnknownNetwork(String),
    UnknownPlugin(String),
    NoEndOp,
    Timeout,
}

impl fmt::Display for MasterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MasterError::EmptyTopology => write!(f, "scenario declares no networks"),
            MasterError::UnknownNetwork(host) => {
                write!(f, "node '{}' placed on undeclared network", host)
            }
            MasterError::UnknownPlugin(name) => write!(f, "no plugin registered as '{}'", name),
            MasterError::NoEndOp => {
                write!(f, "scenario has no end op and no max_time_ms safety stop")
            }
            MasterError::Timeout => write!(f, "coordinator timed out waiting for slaves"),
        }
    }
}

impl std::error::Error for MasterError {}

/// Run a scenario to completion across `config.workers` workers.
pub fn run(
    scenario: Scenario,
    config: SimConfig,
    registry: std::sync::Arc<PluginRegistry>,
) -> Result<RunReport, MasterError> {
    // Authoritative topology, validated before anything spawns.
    let mut topology = Topology::new(config.runahead_floor_ms);
    for net in &scenario.networks {
        topology.add_network(net.id, net.intra_latency_ms);
    }
    for link in &scenario.links {
        if !topology.connect(link.a, link.b, link.latency_ms) {
            return Err(MasterError::UnknownNetwork(format!(
                "link {}<->{}",
                link.a.0, link.b.0
            )));
        }
    }
    let Some(min_latency) = topology.min_delay() else {
        return Err(MasterError::EmptyTopology);
    };
    let max_latency = topology.max_delay().unwrap_or(min_latency);

    for node in &scenario.nodes {
        if !topology.has_network(node.network) {
            return Err(MasterError::UnknownNetwork(node.hostname.clone()));
        }
        if registry.get(&node.plugin).is_none() {
            return Err(MasterError::UnknownPlugin(node.plugin.clone()));
        }
    }
    if scenario.end_at.is_none() && config.max_time_ms.is_none() {
        return Err(MasterError::NoEndOp);
    }

    let n = config.workers;
    let worker_ids: Vec<WorkerId> = (0..n).map(|i| WorkerId(i as u16)).collect();

    // Bus wiring: one inbound link per worker, one per slave, one for us.
    let mut worker_tx: FnvHashMap<WorkerId, BusSender> = FnvHashMap::default();
    let mut worker_rx = Vec::with_capacity(n);
    for &wid in &worker_ids {
        let (tx, rx) = bus::link();
        worker_tx.insert(wid, tx);
        worker_rx.push((wid, rx));
    }
    let (slave_tx, slave_rx) = bus::link();
    let (master_tx, master_rx) = bus::link();

    let worker_params: Vec<WorkerParams> = worker_rx
        .into_iter()
        .map(|(wid, rx)| {
            let peers: FnvHashMap<WorkerId, BusSender> = worker_tx
                .iter()
                .filter(|(&id, _)| id != wid)
                .map(|(&id, tx)| (id, tx.clone()))
                .collect();
            WorkerParams {
                id: wid,
                all_workers: worker_ids.clone(),
                rx,
                peers,
                up: slave_tx.clone(),
                registry: registry.clone(),
                config: config.clone(),
            }
        })
        .collect();

    let slave_deadline =
        Duration::from_millis(config.stall_timeout_ms * 2 + 5_000);
    let master_deadline =
        Duration::from_millis(config.stall_timeout_ms * 3 + 10_000);

    let slave_handle = std::thread::Builder::new()
        .name("netsim-slave-0".to_string())
        .spawn(move || {
            slave::run(SlaveParams {
                id: SlaveId(0),
                workers: worker_params,
                rx: slave_rx,
                up: master_tx,
                deadline: slave_deadline,
            })
        })
        .expect("spawn slave thread");

    // Fan-out. Placement records first so every worker can route and resolve
    // before any op executes, then the op stream, then the start gun.
    let broadcast = |frame: &Frame| {
        for wid in &worker_ids {
            worker_tx[wid].send(frame);
        }
    };

    let mut next_owner = 0usize;
    let mut placements = Vec::with_capacity(scenario.nodes.len());
    for (idx, node) in scenario.nodes.iter().enumerate() {
        let addr = NodeAddr(ADDR_BASE + idx as u32);
        let owner = worker_ids[next_owner % n];
        next_owner += 1;
        broadcast(&Frame::Track(TrackRecord {
            network: node.network,
            addr,
            owner,
            hostname: node.hostname.clone(),
            kbps_up: node.kbps_up,
            kbps_down: node.kbps_down,
        }));
        placements.push((addr, owner));
    }

    for net in &scenario.networks {
        broadcast(&Frame::Op(SimOp::CreateNetwork {
            at: VirtualTime::ZERO,
            id: net.id,
            intra_latency_ms: net.intra_latency_ms,
        }));
    }
    for link in &scenario.links {
        broadcast(&Frame::Op(SimOp::ConnectNetworks {
            at: VirtualTime::ZERO,
            a: link.a,
            b: link.b,
            latency_ms: link.latency_ms,
        }));
    }
    for (node, &(addr, owner)) in scenario.nodes.iter().zip(&placements) {
        worker_tx[&owner].send(&Frame::Op(SimOp::CreateNode {
            at: node.at,
            addr,
            network: node.network,
            hostname: node.hostname.clone(),
            plugin: node.plugin.clone(),
            args: node.args.clone(),
            kbps_up: node.kbps_up,
            kbps_down: node.kbps_down,
        }));
    }
    if let Some(at) = scenario.end_at {
        broadcast(&Frame::Op(SimOp::End { at }));
    }
    broadcast(&Frame::Start {
        min_latency,
        max_latency,
    });

    info!(
        workers = n,
        nodes = scenario.nodes.len(),
        min_latency = min_latency.as_millis(),
        "simulation dispatched"
    );

    // Completion aggregation: one terminal frame per slave.
    let mut error: Option<String> = None;
    let started = std::time::Instant::now();
    let mut slaves_done = 0;
    while slaves_done < 1 {
        if started.elapsed() > master_deadline {
            warn!("master deadline waiting for slaves");
            error.get_or_insert_with(|| MasterError::Timeout.to_string());
            break;
        }
        match master_rx.recv_timeout(Duration::from_millis(50)) {
            Ok(Some(Frame::DoneSlave { slave })) => {
                info!(slave = slave.0, "slave reported done");
                slaves_done += 1;
            }
            Ok(Some(Frame::Error { message, .. })) => {
                error.get_or_insert(message);
                slaves_done += 1;
            }
            Ok(Some(_)) | Ok(None) => {}
            Err(e) => warn!(error = %e, "dropping undecodable frame"),
        }
    }

    let outcome = slave_handle.join().expect("slave thread panicked");
    let error = error.or(outcome.error);

    Ok(RunReport {
        error,
        workers: outcome.reports,
    })
}
