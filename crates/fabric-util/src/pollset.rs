//! `UtilPollSet` - default `PollSet` implementation.
//!
//! Every wait object owns one. Queues register after they are fully
//! constructed and deregister on close. `poll()` snapshots the member
//! list and queries members with the list lock released, because a
//! member's readiness check may run provider progress.

use std::sync::{Arc, Weak};

use fabric_core::error::{FabricError, FabricResult};
use fabric_core::id::FidId;
use fabric_core::wait::{PollMember, PollSet};

use crate::lock::{FastLock, LockClass};

pub struct UtilPollSet {
    fid: FidId,
    members: FastLock<Vec<(FidId, Weak<dyn PollMember>)>>,
}

impl UtilPollSet {
    pub fn new() -> Self {
        Self {
            fid: FidId::next(),
            members: FastLock::new(LockClass::Plain, Vec::new()),
        }
    }

    pub fn fid(&self) -> FidId {
        self.fid
    }

    fn snapshot(&self) -> Vec<Arc<dyn PollMember>> {
        self.members
            .lock()
            .iter()
            .filter_map(|(_, m)| m.upgrade())
            .collect()
    }
}

impl Default for UtilPollSet {
    fn default() -> Self {
        Self::new()
    }
}

impl PollSet for UtilPollSet {
    fn add(&self, fid: FidId, member: Weak<dyn PollMember>) -> FabricResult<()> {
        let mut members = self.members.lock();
        if members.iter().any(|(f, _)| *f == fid) {
            return Err(FabricError::InvalidArgument(format!("{} already in poll set", fid)));
        }
        members.try_reserve(1).map_err(|_| FabricError::NoMemory)?;
        members.push((fid, member));
        Ok(())
    }

    fn del(&self, fid: FidId) -> FabricResult<()> {
        let mut members = self.members.lock();
        match members.iter().position(|(f, _)| *f == fid) {
            Some(pos) => {
                members.remove(pos);
                Ok(())
            }
            None => Err(FabricError::InvalidArgument(format!("{} not in poll set", fid))),
        }
    }

    fn poll(&self, contexts: &mut [usize]) -> usize {
        let mut n = 0;
        for member in self.snapshot() {
            if n == contexts.len() {
                break;
            }
            if member.poll_ready() {
                contexts[n] = member.poll_context();
                n += 1;
            }
        }
        n
    }

    fn len(&self) -> usize {
        self.members.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Flag {
        ready: AtomicBool,
        ctx: usize,
    }

    impl PollMember for Flag {
        fn poll_ready(&self) -> bool {
            self.ready.load(Ordering::Acquire)
        }

        fn poll_context(&self) -> usize {
            self.ctx
        }
    }

    fn member(ready: bool, ctx: usize) -> Arc<Flag> {
        Arc::new(Flag { ready: AtomicBool::new(ready), ctx })
    }

    #[test]
    fn test_poll_reports_ready_contexts() {
        let set = UtilPollSet::new();
        let a = member(true, 10);
        let b = member(false, 20);
        let c = member(true, 30);
        let (fa, fb, fc) = (FidId::next(), FidId::next(), FidId::next());
        set.add(fa, Arc::downgrade(&a) as Weak<dyn PollMember>).unwrap();
        set.add(fb, Arc::downgrade(&b) as Weak<dyn PollMember>).unwrap();
        set.add(fc, Arc::downgrade(&c) as Weak<dyn PollMember>).unwrap();

        let mut ctx = [0usize; 4];
        assert_eq!(set.poll(&mut ctx), 2);
        assert_eq!(&ctx[..2], &[10, 30]);

        let mut one = [0usize; 1];
        assert_eq!(set.poll(&mut one), 1);
        assert!(set.has_ready());
    }

    #[test]
    fn test_add_del() {
        let set = UtilPollSet::new();
        let a = member(false, 1);
        let fid = FidId::next();
        set.add(fid, Arc::downgrade(&a) as Weak<dyn PollMember>).unwrap();
        assert!(set.add(fid, Arc::downgrade(&a) as Weak<dyn PollMember>).is_err());
        assert_eq!(set.len(), 1);
        set.del(fid).unwrap();
        assert!(set.is_empty());
        assert!(matches!(set.del(fid), Err(FabricError::InvalidArgument(_))));
    }

    #[test]
    fn test_dropped_member_is_skipped() {
        let set = UtilPollSet::new();
        let a = member(true, 1);
        set.add(FidId::next(), Arc::downgrade(&a) as Weak<dyn PollMember>).unwrap();
        drop(a);
        assert!(!set.has_ready());
    }
}
