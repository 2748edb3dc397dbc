//! Mutex + condition variable wait object
//!
//! Portable. Used on platforms without eventfd and when
//! `WaitObjKind::MutexCond` is requested.

use std::sync::{Condvar, Mutex, PoisonError};

use fabric_core::error::{FabricError, FabricResult};
use fabric_core::wait::{timeout_duration, PollSet, WaitObject};

use crate::pollset::UtilPollSet;

pub struct CondWait {
    /// Signal pending
    pending: Mutex<bool>,
    condvar: Condvar,
    pollset: UtilPollSet,
}

impl CondWait {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(false),
            condvar: Condvar::new(),
            pollset: UtilPollSet::new(),
        }
    }
}

impl Default for CondWait {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitObject for CondWait {
    fn wait(&self, timeout_ms: i32) -> FabricResult<()> {
        if self.pollset.has_ready() {
            return Ok(());
        }

        let guard = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let mut guard = match timeout_duration(timeout_ms) {
            None => self
                .condvar
                .wait_while(guard, |pending| !*pending)
                .unwrap_or_else(PoisonError::into_inner),
            Some(t) => {
                let (g, _) = self
                    .condvar
                    .wait_timeout_while(guard, t, |pending| !*pending)
                    .unwrap_or_else(PoisonError::into_inner);
                g
            }
        };

        if !*guard {
            return Err(FabricError::Again);
        }
        *guard = false;
        Ok(())
    }

    fn signal(&self) {
        let mut guard = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        *guard = true;
        self.condvar.notify_all();
    }

    fn pollset(&self) -> &dyn PollSet {
        &self.pollset
    }
}
