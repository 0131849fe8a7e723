//! Guest application plug-in facade.
//!
//! A `Plugin` is a registered application factory; an `Application` is one
//! host's instance of it. The engine drives instances exclusively through
//! the entry points below, always with the host context loaded and a
//! `NodeApi` handle for everything the guest may ask of the simulator.

use fnv::FnvHashMap;

use super::api::NodeApi;
use crate::engine::{CallbackId, SockId, TimerId};

/// Per-host guest instance. Entry points must not block; the worker is
/// single-threaded and cooperative, and a guest yields only by returning.
pub trait Application: Send {
    /// Called once when the host is created, in the host's context.
    fn instantiate(&mut self, api: &mut NodeApi<'_>, args: &[String]);

    /// Called when the host is torn down by the simulation (not after a
    /// guest-initiated exit: an exited host receives no further entries).
    fn destroy(&mut self, api: &mut NodeApi<'_>);

    /// Socket readiness callback, at most one outstanding per socket.
    /// `read_first` conveys the fairness ordering when both directions are
    /// deliverable.
    fn socket_ready(
        &mut self,
        api: &mut NodeApi<'_>,
        sockd: SockId,
        readable: bool,
        writable: bool,
        read_first: bool,
    );

    /// A live timer created by this instance expired.
    fn timer_expired(&mut self, api: &mut NodeApi<'_>, tid: TimerId, cb_id: CallbackId, arg: u64);
}

/// Application factory, registered once per process under a unique name.
pub trait Plugin: Send + Sync {
    fn name(&self) -> &'static str;

    /// One-time hook at registration, before any host exists.
    fn init(&self) {}

    fn instantiate(&self) -> Box<dyn Application>;
}

/// Name-keyed plug-in table, shared read-only by every worker.
pub struct PluginRegistry {
    by_name: FnvHashMap<&'static str, Box<dyn Plugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        PluginRegistry {
            by_name: FnvHashMap::default(),
        }
    }

    /// Register a plug-in and run its `init` hook. Re-registering a name
    /// replaces the factory.
    pub fn register(&mut self, plugin: Box<dyn Plugin>) {
        plugin.init();
        self.by_name.insert(plugin.name(), plugin);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Plugin> {
        self.by_name.get(name).map(|p| p.as_ref())
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}
