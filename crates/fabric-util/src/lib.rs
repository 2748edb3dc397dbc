//! # fabric-util - Completion queue engine and default implementations
//!
//! This crate provides the queue engine plus a default implementation
//! for every `fabric-core` trait a queue needs. Providers plug in their
//! own endpoints and, when they want, their own progress hook.
//!
//! ## Default stack
//!
//! | Trait / role    | Default Impl       | Alternative                  |
//! |-----------------|--------------------|------------------------------|
//! | WaitObject      | FdWait (Linux)     | CondWait (portable)          |
//! | PollSet         | UtilPollSet        | provider-supplied via `Set`  |
//! | CqProgress      | EndpointProgress   | any `Fn(&CompletionQueue)`   |
//! | ring storage    | Cirque             |                              |
//! | queue locking   | FastLock           | `lock-order` checks (feature)|
//!
//! ## Quick start
//!
//! ```ignore
//! use std::sync::Arc;
//! use fabric_core::{CqAttr, CqEntry, CqFormat, Domain, DomainCaps, Version, WaitObjKind};
//! use fabric_util::CompletionQueue;
//!
//! let domain = Arc::new(Domain::new("sockets", DomainCaps::empty(), Version::CURRENT));
//! let attr = CqAttr::new().size(64).format(CqFormat::Tagged).wait_obj(WaitObjKind::Unspec);
//! let cq = CompletionQueue::open(&domain, &attr, None, 0)?;
//!
//! let mut buf = [CqEntry::default(); 16];
//! let n = cq.sread(&mut buf, 100)?;
//! ```

pub mod cirque;
pub mod lock;
pub mod pollset;
pub mod wait;
pub mod config;
pub mod cq;

pub use config::CqConfig;
pub use cq::{CompletionQueue, CqProgress, CqWait, EndpointList, EndpointProgress};
pub use pollset::UtilPollSet;
pub use wait::{open_wait, CondWait};

#[cfg(target_os = "linux")]
pub use wait::FdWait;
