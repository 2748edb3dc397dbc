//! Fabric object identifier type

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

static NEXT_FID: AtomicU64 = AtomicU64::new(1);

/// Identity of a fabric object (queue, endpoint, poll set).
///
/// Allocated from a process-wide counter; never reused.
/// Zero is reserved as a sentinel for "no object".
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct FidId(u64);

impl FidId {
    /// Sentinel value indicating no object
    pub const NONE: FidId = FidId(0);

    /// Allocate a fresh identifier
    #[inline]
    pub fn next() -> Self {
        FidId(NEXT_FID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw u64 value
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for FidId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "FidId(NONE)")
        } else {
            write!(f, "FidId({})", self.0)
        }
    }
}

impl fmt::Display for FidId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fid:{}", self.0)
    }
}
