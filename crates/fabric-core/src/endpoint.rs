//! Endpoint abstraction.
//!
//! The queue engine does not own endpoints. It keeps a list of the ones
//! bound to it and calls `progress()` on them when a reader finds the
//! queue empty, so providers without a progress thread still make
//! forward progress.

use crate::attr::BindFlags;
use crate::id::FidId;

/// A provider endpoint, as seen by a completion queue.
///
/// **Contract:**
/// - `progress()` may write completions into any queue, including the
///   one currently driving it. It is called with the queue's endpoint-list
///   lock held and the completion lock released.
/// - `progress()` must not bind or unbind endpoints on the queue that is
///   driving it.
pub trait Endpoint: Send + Sync {
    fn fid(&self) -> FidId;

    /// Advance provider processing (poll hardware, retry sends, ...).
    fn progress(&self);

    /// Directions this endpoint already has bound to some queue.
    ///
    /// The endpoint framework keeps this; a queue rejects binding a
    /// direction that is already taken.
    fn cq_bindings(&self) -> BindFlags {
        BindFlags::empty()
    }
}
