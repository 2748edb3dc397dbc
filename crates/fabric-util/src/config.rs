//! Completion queue configuration

use std::sync::OnceLock;

use fabric_core::attr::WaitObjKind;
use fabric_core::env::{env_get, env_get_opt};

/// Ring size used when an open requests size 0.
pub const DEFAULT_CQ_SIZE: usize = 1024;

/// Process-wide defaults applied by `CompletionQueue::open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CqConfig {
    /// Ring size when the attribute leaves it at zero
    pub default_size: usize,

    /// Wait object created for `WaitObjKind::Unspec`
    pub unspec_wait: WaitObjKind,
}

impl Default for CqConfig {
    fn default() -> Self {
        Self {
            default_size: DEFAULT_CQ_SIZE,
            unspec_wait: crate::wait::platform_default(),
        }
    }
}

impl CqConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the ring size used for size-0 opens
    pub fn default_size(mut self, n: usize) -> Self {
        self.default_size = n.max(1);
        self
    }

    /// Set the wait object kind used for `Unspec`
    pub fn unspec_wait(mut self, kind: WaitObjKind) -> Self {
        self.unspec_wait = kind;
        self
    }

    /// Defaults with `FABRIC_CQ_*` environment overrides applied.
    ///
    /// - `FABRIC_CQ_DEFAULT_SIZE`: ring size for size-0 opens
    /// - `FABRIC_CQ_WAIT`: `fd` or `mutex_cond`
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg = cfg.default_size(env_get("FABRIC_CQ_DEFAULT_SIZE", cfg.default_size));
        if let Some(name) = env_get_opt::<String>("FABRIC_CQ_WAIT") {
            match parse_wait_name(&name) {
                Some(kind) => cfg.unspec_wait = kind,
                None => tracing::warn!(
                    target: "fabric::wait",
                    value = %name,
                    "ignoring unknown FABRIC_CQ_WAIT"
                ),
            }
        }
        cfg
    }

    /// Configuration read from the environment once per process.
    pub fn global() -> &'static CqConfig {
        static GLOBAL: OnceLock<CqConfig> = OnceLock::new();
        GLOBAL.get_or_init(CqConfig::from_env)
    }
}

fn parse_wait_name(name: &str) -> Option<WaitObjKind> {
    match name.to_ascii_lowercase().as_str() {
        "fd" => Some(WaitObjKind::Fd),
        "mutex_cond" | "mutexcond" | "cond" => Some(WaitObjKind::MutexCond),
        _ => None,
    }
}
