//! Simulation coordination: scenario description, master fan-out, slave
//! worker pools, and the programmatic run harness.

pub mod master;
pub mod ops;
pub mod slave;

use std::sync::Arc;

use crate::config::SimConfig;
use crate::engine::time::VirtualTime;
use crate::engine::worker::WorkerReport;
use crate::engine::{NetworkId, WorkerId};
use crate::host::plugin::{Plugin, PluginRegistry};

#[derive(Debug, Clone)]
pub struct NetworkSpec {
    pub id: NetworkId,
    pub intra_latency_ms: u64,
}

#[derive(Debug, Clone)]
pub struct LinkSpec {
    pub a: NetworkId,
    pub b: NetworkId,
    pub latency_ms: u64,
}

#[derive(Debug, Clone)]
pub struct NodeSpec {
    pub at: VirtualTime,
    pub network: NetworkId,
    pub hostname: String,
    pub plugin: String,
    pub args: Vec<String>,
    pub kbps_up: u32,
    pub kbps_down: u32,
}

/// A complete run description: topology, node placements, end time.
#[derive(Debug, Clone, Default)]
pub struct Scenario {
    pub networks: Vec<NetworkSpec>,
    pub links: Vec<LinkSpec>,
    pub nodes: Vec<NodeSpec>,
    pub end_at: Option<VirtualTime>,
}

/// Aggregate result of a run.
#[derive(Debug)]
pub struct RunReport {
    pub error: Option<String>,
    pub workers: Vec<WorkerReport>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn worker(&self, id: WorkerId) -> Option<&WorkerReport> {
        self.workers.iter().find(|w| w.id == id)
    }

    pub fn total_events(&self) -> u64 {
        self.workers.iter().map(|w| w.stats.events_dispatched).sum()
    }

    pub fn summary(&self) -> String {
        let mut lines = Vec::new();
        match &self.error {
            None => lines.push("run: ok".to_string()),
            Some(e) => lines.push(format!("run: FAILED ({})", e)),
        }
        for w in &self.workers {
            lines.push(format!(
                "  worker {}: {} events, {} hosts, {} broadcasts, {} stalled ops",
                w.id.0,
                w.stats.events_dispatched,
                w.stats.hosts_created,
                w.stats.broadcasts_sent,
                w.stats.ops_stalled,
            ));
        }
        lines.join("\n")
    }
}

/// Programmatic construction of a full master + slave + workers run over the
/// in-process bus.
pub struct SimulationBuilder {
    config: SimConfig,
    registry: PluginRegistry,
    scenario: Scenario,
}

impl SimulationBuilder {
    pub fn new(config: SimConfig) -> Self {
        SimulationBuilder {
            config,
            registry: PluginRegistry::new(),
            scenario: Scenario::default(),
        }
    }

    pub fn plugin(mut self, plugin: Box<dyn Plugin>) -> Self {
        self.registry.register(plugin);
        self
    }

    pub fn network(mut self, id: NetworkId, intra_latency_ms: u64) -> Self {
        self.scenario.networks.push(NetworkSpec {
            id,
            intra_latency_ms,
        });
        self
    }

    pub fn link(mut self, a: NetworkId, b: NetworkId, latency_ms: u64) -> Self {
        self.scenario.links.push(LinkSpec { a, b, latency_ms });
        self
    }

    pub fn node(
        self,
        at_ms: u64,
        network: NetworkId,
        hostname: &str,
        plugin: &str,
        args: &[&str],
    ) -> Self {
        self.node_with_bw(at_ms, network, hostname, plugin, args, 10_000, 10_000)
    }

    pub fn node_with_bw(
        mut self,
        at_ms: u64,
        network: NetworkId,
        hostname: &str,
        plugin: &str,
        args: &[&str],
        kbps_up: u32,
        kbps_down: u32,
    ) -> Self {
        self.scenario.nodes.push(NodeSpec {
            at: VirtualTime::from_millis(at_ms),
            network,
            hostname: hostname.to_string(),
            plugin: plugin.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            kbps_up,
            kbps_down,
        });
        self
    }

    pub fn end_at(mut self, at_ms: u64) -> Self {
        self.scenario.end_at = Some(VirtualTime::from_millis(at_ms));
        self
    }

    /// Run to completion. Scenario-level mistakes (undeclared network,
    /// unknown plugin, missing end) surface as `Err` before anything spawns;
    /// in-run failures come back inside the report.
    pub fn run(self) -> Result<RunReport, master::MasterError> {
        master::run(self.scenario, self.config, Arc::new(self.registry))
    }
}
