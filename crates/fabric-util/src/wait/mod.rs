//! Wait objects
//!
//! Blockable handles behind `sread`. Platform-specific implementations
//! use the most efficient primitive available; `CondWait` works everywhere.

use std::sync::Arc;

use fabric_core::attr::WaitObjKind;
use fabric_core::error::{FabricError, FabricResult};
use fabric_core::wait::WaitObject;

use crate::config::CqConfig;

mod cond;
pub use cond::CondWait;

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        mod fd;
        pub use fd::FdWait;

        /// Kind created for `WaitObjKind::Unspec` unless configured otherwise.
        pub const fn platform_default() -> WaitObjKind {
            WaitObjKind::Fd
        }
    } else {
        pub const fn platform_default() -> WaitObjKind {
            WaitObjKind::MutexCond
        }
    }
}

/// Create a wait object of `kind` for a queue to own.
///
/// `Unspec` resolves through `config`. `None` and `Set` are not
/// something a queue creates and are rejected.
pub fn open_wait(kind: WaitObjKind, config: &CqConfig) -> FabricResult<Arc<dyn WaitObject>> {
    let kind = match kind {
        WaitObjKind::Unspec => config.unspec_wait,
        k => k,
    };
    let wait: Arc<dyn WaitObject> = match kind {
        WaitObjKind::MutexCond => Arc::new(CondWait::new()),
        #[cfg(target_os = "linux")]
        WaitObjKind::Fd => Arc::new(FdWait::create()?),
        #[cfg(not(target_os = "linux"))]
        WaitObjKind::Fd => {
            return Err(FabricError::InvalidArgument(
                "fd wait objects are not supported on this platform".into(),
            ))
        }
        WaitObjKind::None | WaitObjKind::Set | WaitObjKind::Unspec => {
            return Err(FabricError::InvalidArgument(format!(
                "cannot create a {:?} wait object",
                kind
            )))
        }
    };
    tracing::debug!(target: "fabric::wait", ?kind, "wait object created");
    Ok(wait)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::{Duration, Instant};

    fn kinds() -> Vec<WaitObjKind> {
        let mut v = vec![WaitObjKind::MutexCond];
        if cfg!(target_os = "linux") {
            v.push(WaitObjKind::Fd);
        }
        v
    }

    #[test]
    fn test_timeout_reports_again() {
        for kind in kinds() {
            let w = open_wait(kind, &CqConfig::default()).unwrap();
            let start = Instant::now();
            assert!(matches!(w.wait(30), Err(FabricError::Again)), "{kind:?}");
            assert!(start.elapsed() >= Duration::from_millis(20), "{kind:?}");
            assert!(matches!(w.wait(0), Err(FabricError::Again)), "{kind:?}");
        }
    }

    #[test]
    fn test_signal_is_sticky() {
        for kind in kinds() {
            let w = open_wait(kind, &CqConfig::default()).unwrap();
            w.signal();
            w.signal();
            assert!(w.wait(0).is_ok(), "{kind:?}");
            // both signals consumed by one wait
            assert!(w.wait(0).is_err(), "{kind:?}");
        }
    }

    #[test]
    fn test_signal_wakes_blocked_waiter() {
        for kind in kinds() {
            let w = open_wait(kind, &CqConfig::default()).unwrap();
            let w2 = Arc::clone(&w);
            let handle = thread::spawn(move || w2.wait(-1));
            thread::sleep(Duration::from_millis(20));
            w.signal();
            assert!(handle.join().unwrap().is_ok(), "{kind:?}");
        }
    }

    #[test]
    fn test_unspec_follows_config() {
        let cfg = CqConfig::new().unspec_wait(WaitObjKind::MutexCond);
        let w = open_wait(WaitObjKind::Unspec, &cfg).unwrap();
        assert!(w.pollset().is_empty());
        assert!(open_wait(WaitObjKind::None, &cfg).is_err());
        assert!(open_wait(WaitObjKind::Set, &cfg).is_err());
    }
}
