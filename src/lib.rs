// Clippy configuration: allow some stylistic lints to focus on correctness
#![allow(clippy::collapsible_if)]
#![allow(clippy::collapsible_else_if)]
#![allow(clippy::type_complexity)]
#![allow(clippy::new_without_default)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::len_zero)]

pub mod apps;
pub mod bus;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod host;
pub mod rng;
pub mod topology;

pub use config::SimConfig;
pub use coordinator::{RunReport, Scenario, SimulationBuilder};
pub use engine::event::{Endpoint, EventKind, Packet};
pub use engine::vepoll::RwSet;
pub use engine::worker::{DispatchRecord, WorkerReport, WorkerStats};
pub use engine::{
    CallbackId, NetworkId, NodeAddr, SimDuration, SlaveId, SockId, TimerId, VirtualTime, WorkerId,
};
pub use host::api::NodeApi;
pub use host::plugin::{Application, Plugin, PluginRegistry};
pub use rng::DeterministicRng;
