use std::fmt;
use std::ops::{Add, Sub};

/// Virtual simulation time in integer milliseconds, independent of wall clock.
///
/// Two sentinels exist alongside ordinary values: `INVALID` marks an unknown
/// time (empty calendar, stalled window) and `MAX` an unbounded one (the
/// single-worker window). Sentinels must never feed ordinary arithmetic;
/// callers check `is_valid()` first, the same way the peer-state protocol
/// carries an explicit validity bit.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VirtualTime(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SimDuration(pub u64);

impl VirtualTime {
    pub const ZERO: VirtualTime = VirtualTime(0);
    /// Unknown time.
    pub const INVALID: VirtualTime = VirtualTime(u64::MAX);
    /// Unbounded time. Strictly less than `INVALID` so sentinel checks stay cheap.
    pub const MAX: VirtualTime = VirtualTime(u64::MAX - 1);

    pub fn from_millis(millis: u64) -> Self {
        VirtualTime(millis)
    }

    pub fn from_secs(secs: u64) -> Self {
        VirtualTime(secs * 1000)
    }

    pub fn as_millis(&self) -> u64 {
        self.0
    }

    pub fn is_valid(&self) -> bool {
        *self != VirtualTime::INVALID
    }

    /// Add a duration, capping at `MAX` so sentinel territory is never entered.
    pub fn saturating_add(self, rhs: SimDuration) -> VirtualTime {
        VirtualTime(self.0.saturating_add(rhs.0).min(VirtualTime::MAX.0))
    }

    /// Smaller of two times, treating `INVALID` as absent.
    pub fn min_valid(a: VirtualTime, b: VirtualTime) -> VirtualTime {
        match (a.is_valid(), b.is_valid()) {
            (true, true) => a.min(b),
            (true, false) => a,
            (false, true) => b,
            (false, false) => VirtualTime::INVALID,
        }
    }
}

impl SimDuration {
    pub const ZERO: SimDuration = SimDuration(0);

    pub fn from_millis(millis: u64) -> Self {
        SimDuration(millis)
    }

    pub fn from_secs(secs: u64) -> Self {
        SimDuration(secs * 1000)
    }

    pub fn as_millis(&self) -> u64 {
        self.0
    }

    pub fn max(self, other: SimDuration) -> SimDuration {
        SimDuration(self.0.max(other.0))
    }
}

impl Add<SimDuration> for VirtualTime {
    type Output = VirtualTime;

    fn add(self, rhs: SimDuration) -> Self::Output {
        debug_assert!(self.is_valid(), "arithmetic on INVALID virtual time");
        self.saturating_add(rhs)
    }
}

impl Sub<VirtualTime> for VirtualTime {
    type Output = SimDuration;

    fn sub(self, rhs: VirtualTime) -> Self::Output {
        SimDuration(self.0 - rhs.0)
    }
}

impl fmt::Debug for VirtualTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == VirtualTime::INVALID {
            write!(f, "VirtualTime(INVALID)")
        } else if *self == VirtualTime::MAX {
            write!(f, "VirtualTime(MAX)")
        } else {
            write!(f, "VirtualTime({}ms)", self.0)
        }
    }
}

impl fmt::Display for VirtualTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == VirtualTime::INVALID {
            write!(f, "-")
        } else if *self == VirtualTime::MAX {
            write!(f, "max")
        } else {
            write!(f, "{}ms", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_ordering() {
        assert!(VirtualTime::ZERO < VirtualTime::MAX);
        assert!(VirtualTime::MAX < VirtualTime::INVALID);
        assert!(!VirtualTime::INVALID.is_valid());
        assert!(VirtualTime::MAX.is_valid());
    }

    #[test]
    fn test_saturating_add_caps_at_max() {
        let t = VirtualTime::MAX.saturating_add(SimDuration::from_millis(100));
        assert_eq!(t, VirtualTime::MAX);

        let t = VirtualTime::from_millis(5) + SimDuration::from_millis(10);
        assert_eq!(t.as_millis(), 15);
    }

    #[test]
    fn test_min_valid() {
        let a = VirtualTime::from_millis(10);
        let b = VirtualTime::from_millis(20);
        assert_eq!(VirtualTime::min_valid(a, b), a);
        assert_eq!(VirtualTime::min_valid(VirtualTime::INVALID, b), b);
        assert_eq!(VirtualTime::min_valid(a, VirtualTime::INVALID), a);
        assert_eq!(
            VirtualTime::min_valid(VirtualTime::INVALID, VirtualTime::INVALID),
            VirtualTime::INVALID
        );
    }
}
