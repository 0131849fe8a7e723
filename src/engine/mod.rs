//! The conservative parallel event execution engine: calendar, timers,
//! readiness mux, host context, worker loop, and the safe-time protocol.

pub mod calendar;
pub mod context;
pub mod event;
pub mod time;
pub mod timer;
pub mod vepoll;
pub mod window;
pub mod worker;

use std::fmt;

pub use time::{SimDuration, VirtualTime};

/// Periodic progress event interval in virtual time.
pub const TICKTOCK_INTERVAL: SimDuration = SimDuration(1000);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WorkerId(pub u16);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlaveId(pub u16);

/// A host's simulated network address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeAddr(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NetworkId(pub u16);

/// Socket descriptor, scoped to one host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SockId(pub u32);

/// Timer id, scoped to one host, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(pub u32);

/// Guest-chosen callback discriminator carried through timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(pub u32);

/// Worker-fatal engine failures. Anything here aborts the worker and
/// surfaces as an error frame to the coordinator.
#[derive(Debug)]
pub enum EngineError {
    /// The calendar produced an event earlier than the worker clock.
    BackwardsTime { at: VirtualTime, clock: VirtualTime },
    /// An op referenced a plug-in no registry knows.
    UnknownPlugin(String),
    /// The run was aborted by a guest or a peer.
    Aborted(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::BackwardsTime { at, clock } => {
                write!(f, "backwards time: popped {} behind clock {}", at, clock)
            }
            EngineError::UnknownPlugin(name) => write!(f, "unknown plugin '{}'", name),
            EngineError::Aborted(reason) => write!(f, "simulation aborted: {}", reason),
        }
    }
}

impl std::error::Error for EngineError {}
