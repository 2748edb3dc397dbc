//! Wait object abstraction.
//!
//! A `WaitObject` is the blockable handle behind blocking queue reads.
//! Each wait object carries a `PollSet` listing the queues that signal
//! it, so one wait object can be shared by several queues (a wait set).
//!
//! # Implementors
//!
//! - `FdWait` (Linux default): eventfd + poll(2). The fd can also be
//!   handed to an application's own epoll loop.
//! - `CondWait`: mutex + condition variable. Portable.

use std::sync::Weak;
use std::time::Duration;

use crate::error::FabricResult;
use crate::id::FidId;

/// Convert a millisecond timeout to a `Duration`.
///
/// Negative blocks indefinitely (`None`), zero polls once,
/// positive is milliseconds.
#[inline]
pub fn timeout_duration(timeout_ms: i32) -> Option<Duration> {
    if timeout_ms < 0 {
        None
    } else {
        Some(Duration::from_millis(timeout_ms as u64))
    }
}

/// Blockable handle with signal/wait semantics.
///
/// **Contract:**
/// - `signal()` must NEVER block, and is sticky: a signal raised while
///   nobody waits is consumed by the next `wait()`.
/// - `wait()` returns `Ok(())` when signaled or when a poll-set member
///   already has something to read, and `Err(FabricError::Again)` on
///   timeout. Callers re-check their queue either way.
pub trait WaitObject: Send + Sync {
    /// Block for up to `timeout_ms` (see `timeout_duration`).
    fn wait(&self, timeout_ms: i32) -> FabricResult<()>;

    /// Wake a blocked (or the next) waiter.
    fn signal(&self);

    /// Queues multiplexed over this wait object.
    fn pollset(&self) -> &dyn PollSet;
}

/// A queue that a poll set can query.
pub trait PollMember: Send + Sync {
    /// Whether a read would return something other than "try again".
    /// May run provider progress.
    fn poll_ready(&self) -> bool;

    /// Application context reported by `PollSet::poll`.
    fn poll_context(&self) -> usize;
}

/// Set of queues sharing one wait object.
///
/// Members are held weakly; a member that has been dropped without
/// deregistering is skipped.
pub trait PollSet: Send + Sync {
    /// Register `member` under `fid`. Fails if `fid` is already present.
    fn add(&self, fid: FidId, member: Weak<dyn PollMember>) -> FabricResult<()>;

    /// Remove the member registered under `fid`.
    fn del(&self, fid: FidId) -> FabricResult<()>;

    /// Write the contexts of ready members into `contexts`.
    /// Returns the number written.
    fn poll(&self, contexts: &mut [usize]) -> usize;

    /// Whether any member is ready.
    fn has_ready(&self) -> bool {
        let mut ctx = [0usize; 1];
        self.poll(&mut ctx) > 0
    }

    /// Number of registered members.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_conversion() {
        assert_eq!(timeout_duration(-1), None);
        assert_eq!(timeout_duration(i32::MIN), None);
        assert_eq!(timeout_duration(0), Some(Duration::ZERO));
        assert_eq!(timeout_duration(250), Some(Duration::from_millis(250)));
    }
}
