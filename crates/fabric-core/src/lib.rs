//! # fabric-core - Types and trait definitions for the fabric utility layer
//!
//! This crate defines the data that flows through a completion queue
//! and the trait boundaries of every collaborator the queue engine talks
//! to. It contains no engine logic; default implementations live in
//! `fabric-util`.
//!
//! ## Design principle
//!
//! > "Program to the interface. The engine never knows which provider,
//! >  which wait object, or which endpoint it is driving."
//!
//! | Trait         | Role                                             |
//! |---------------|--------------------------------------------------|
//! | `WaitObject`  | Blockable handle with `wait(timeout)`/`signal()` |
//! | `PollSet`     | Set of queues a wait object multiplexes over     |
//! | `PollMember`  | Something a poll set can ask "anything ready?"   |
//! | `Endpoint`    | Provider endpoint with a `progress()` routine    |
//!
//! ## Modules
//!
//! - `entry` - Completion entry formats, ring record, error record
//! - `attr` - Queue attributes, wait kinds, flag sets
//! - `error` - `FabricError` and libfabric-style error codes
//! - `wait` - Wait object and poll set traits
//! - `endpoint` - Endpoint trait
//! - `domain` - Domain collaborator (capabilities, reference count)
//! - `id` - Fabric object identifiers
//! - `env` - Environment variable utilities

pub mod entry;
pub mod attr;
pub mod error;
pub mod wait;
pub mod endpoint;
pub mod domain;
pub mod id;
pub mod env;

// Re-exports for convenience
pub use attr::{BindFlags, CqAttr, CqFlags, CqFormat, WaitCond, WaitObjKind};
pub use domain::{Domain, DomainCaps, Version};
pub use endpoint::Endpoint;
pub use entry::{
    CompletionRecord, ContextEntry, CqEntry, CqErrEntry, DataEntry, FiAddr, MsgEntry,
    TaggedEntry, FI_ADDR_NOTAVAIL,
};
pub use error::{FabricError, FabricResult};
pub use id::FidId;
pub use wait::{PollMember, PollSet, WaitObject};
