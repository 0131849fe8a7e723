use std::sync::Arc;

use parking_lot::Mutex;

use super::{NodeAddr, SockId};

/// A read/write direction set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RwSet {
    pub read: bool,
    pub write: bool,
}

impl RwSet {
    pub const NONE: RwSet = RwSet {
        read: false,
        write: false,
    };
    pub const READ: RwSet = RwSet {
        read: true,
        write: false,
    };
    pub const WRITE: RwSet = RwSet {
        read: false,
        write: true,
    };
    pub const BOTH: RwSet = RwSet {
        read: true,
        write: true,
    };

    pub fn union(self, other: RwSet) -> RwSet {
        RwSet {
            read: self.read || other.read,
            write: self.write || other.write,
        }
    }

    pub fn minus(self, other: RwSet) -> RwSet {
        RwSet {
            read: self.read && !other.read,
            write: self.write && !other.write,
        }
    }

    pub fn intersect(self, other: RwSet) -> RwSet {
        RwSet {
            read: self.read && other.read,
            write: self.write && other.write,
        }
    }

    pub fn is_empty(self) -> bool {
        !self.read && !self.write
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VepollState {
    Active,
    Inactive,
}

/// Shared handle to a readiness record. The owning socket holds the strong
/// reference; in-flight calendar events hold weak ones, so a record whose
/// socket is gone degrades every pending wakeup to a no-op.
pub type VepollRef = Arc<Mutex<VepollRecord>>;

/// Outcome of opening a notification: what the dispatcher should do next.
#[derive(Debug, PartialEq, Eq)]
pub enum NotifyDecision {
    /// Record was destroyed while the notification was pending.
    Destroyed,
    /// Notifications are masked; consume silently.
    Masked,
    /// Invoke the guest exactly once with this mask. The mask may be all
    /// false: an availability set drained after arming still delivers, since
    /// `mark_unavailable` never cancels a pending notification.
    Deliver {
        can_read: bool,
        can_write: bool,
        read_first: bool,
    },
}

/// What to do after the guest callback returned.
#[derive(Debug, PartialEq, Eq)]
pub enum NotifyRearm {
    None,
    /// Interest and availability still overlap: schedule the next wakeup one
    /// tick ahead (immediate re-entry at the same instant would livelock a
    /// guest that never drains).
    Next,
    /// The guest destroyed the socket mid-callback; drop the record.
    Destroyed,
}

/// Per-socket readiness state. Collapses any number of buffer-state changes
/// into at most one guest-visible wakeup until that wakeup fires.
#[derive(Debug)]
pub struct VepollRecord {
    pub addr: NodeAddr,
    pub sockd: SockId,
    available: RwSet,
    polling: RwSet,
    state: VepollState,
    notify_scheduled: bool,
    executing: bool,
    cancel_and_destroy: bool,
    do_read_first: bool,
}

impl VepollRecord {
    pub fn new(addr: NodeAddr, sockd: SockId) -> Self {
        VepollRecord {
            addr,
            sockd,
            available: RwSet::NONE,
            polling: RwSet::NONE,
            state: VepollState::Active,
            notify_scheduled: false,
            executing: false,
            cancel_and_destroy: false,
            do_read_first: true,
        }
    }

    pub fn new_ref(addr: NodeAddr, sockd: SockId) -> VepollRef {
        Arc::new(Mutex::new(VepollRecord::new(addr, sockd)))
    }

    /// Transport reports a direction usable. Returns true when the caller
    /// must schedule the (single) wakeup event at the current time.
    pub fn mark_available(&mut self, dirs: RwSet) -> bool {
        self.available = self.available.union(dirs);
        self.activate()
    }

    /// Transport reports a direction exhausted. A pending wakeup is left in
    /// place; the notification handler re-checks availability when it fires.
    pub fn mark_unavailable(&mut self, dirs: RwSet) {
        self.available = self.available.minus(dirs);
    }

    /// Unmask notifications. Re-attempts activation so state masked during a
    /// fired notification does not strand an available socket.
    pub fn mark_active(&mut self) -> bool {
        self.state = VepollState::Active;
        if self.available.is_empty() {
            false
        } else {
            self.activate()
        }
    }

    pub fn mark_inactive(&mut self) {
        self.state = VepollState::Inactive;
    }

    /// Guest registers interest in `dirs`. Returns true when a wakeup must be
    /// scheduled now.
    pub fn interest_add(&mut self, dirs: RwSet) -> bool {
        self.polling = self.polling.union(dirs);
        self.activate()
    }

    /// Guest withdraws interest in `dirs`.
    pub fn interest_remove(&mut self, dirs: RwSet) {
        self.polling = self.polling.minus(dirs);
    }

    /// Coalescing core: arms the single pending notification. Concurrent
    /// activations while one is pending are no-ops.
    fn activate(&mut self) -> bool {
        if self.state != VepollState::Active || self.notify_scheduled {
            return false;
        }
        self.notify_scheduled = true;
        true
    }

    /// Socket teardown. When a notification is pending or the guest callback
    /// is on the stack, the free is deferred to the notification's trailing
    /// edge; otherwise the caller may drop the record immediately. Returns
    /// whether the destroy was deferred.
    pub fn request_destroy(&mut self) -> bool {
        if self.notify_scheduled || self.executing {
            self.cancel_and_destroy = true;
            true
        } else {
            false
        }
    }

    /// Open a fired notification. Clears `notify_scheduled` and decides what
    /// the dispatcher does; `Deliver` sets the re-entrancy guard, which stays
    /// up until `finish_notification`. Only a deferred destroy or an inactive
    /// record consumes the notification without delivering.
    pub fn begin_notification(&mut self) -> NotifyDecision {
        self.notify_scheduled = false;
        if self.cancel_and_destroy {
            return NotifyDecision::Destroyed;
        }
        if self.state == VepollState::Inactive {
            return NotifyDecision::Masked;
        }
        self.executing = true;
        NotifyDecision::Deliver {
            can_read: self.available.read,
            can_write: self.available.write,
            read_first: self.do_read_first,
        }
    }

    /// Close a delivered notification. `delivered` is the mask the guest was
    /// invoked with; fairness alternates only when both directions were
    /// delivered in the same firing.
    pub fn finish_notification(&mut self, delivered: RwSet) -> NotifyRearm {
        self.executing = false;
        if delivered.read && delivered.write {
            self.do_read_first = !self.do_read_first;
        }
        if self.cancel_and_destroy {
            return NotifyRearm::Destroyed;
        }
        if !self.polling.intersect(self.available).is_empty() {
            if self.activate() {
                return NotifyRearm::Next;
            }
            // A mid-callback activation already armed the wakeup.
            return NotifyRearm::None;
        }
        NotifyRearm::None
    }

    pub fn available(&self) -> RwSet {
        self.available
    }

    pub fn polling(&self) -> RwSet {
        self.polling
    }

    pub fn is_readable(&self) -> bool {
        self.available.read
    }

    pub fn is_writable(&self) -> bool {
        self.available.write
    }

    pub fn notify_scheduled(&self) -> bool {
        self.notify_scheduled
    }

    pub fn doomed(&self) -> bool {
        self.cancel_and_destroy
    }
}
