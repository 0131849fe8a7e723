//! The current-host context slot.
//!
//! Exactly one host's application instance may be resident while guest code
//! runs. The dispatcher loads the instance before an entry point, saves it
//! back afterwards, and on a guest-initiated exit discards it instead — a
//! destroyed host never has state written back, and the slot is always clear
//! by the time a handler returns.

use crate::engine::NodeAddr;
use crate::host::plugin::Application;
use crate::host::Host;

pub struct ContextSlot {
    current: Option<NodeAddr>,
    last_loaded: Option<NodeAddr>,
    swaps: u64,
    swap_skips: u64,
}

impl ContextSlot {
    pub fn new() -> Self {
        ContextSlot {
            current: None,
            last_loaded: None,
            swaps: 0,
            swap_skips: 0,
        }
    }

    /// Make `host` current and take its application instance. Returns `None`
    /// for a host whose instance is gone (already unwinding), in which case
    /// the entry point must be skipped. Same-host re-entry skips the swap
    /// accounting.
    pub fn load(&mut self, host: &mut Host) -> Option<Box<dyn Application>> {
        debug_assert!(self.current.is_none(), "context slot already occupied");
        let app = host.app.take()?;
        self.current = Some(host.addr);
        if self.last_loaded == Some(host.addr) {
            self.swap_skips += 1;
        } else {
            self.swaps += 1;
            self.last_loaded = Some(host.addr);
        }
        Some(app)
    }

    /// Write the instance back after a normal return.
    pub fn save(&mut self, host: &mut Host, app: Box<dyn Application>) {
        debug_assert_eq!(self.current, Some(host.addr), "save for a non-current host");
        host.app = Some(app);
        self.current = None;
    }

    /// Exit path: drop the instance instead of writing it back.
    pub fn discard(&mut self, app: Box<dyn Application>) {
        drop(app);
        self.current = None;
        self.last_loaded = None;
    }

    pub fn current(&self) -> Option<NodeAddr> {
        self.current
    }

    pub fn swaps(&self) -> u64 {
        self.swaps
    }

    pub fn swap_skips(&self) -> u64 {
        self.swap_skips
    }
}
