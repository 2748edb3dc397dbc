//! Endpoint progress multiplexer.
//!
//! A queue keeps the endpoints bound to it and, when a reader finds the
//! ring empty, drives each of them once so providers without a progress
//! thread still produce completions.

use std::sync::Arc;

use fabric_core::attr::BindFlags;
use fabric_core::endpoint::Endpoint;
use fabric_core::error::{FabricError, FabricResult};
use fabric_core::id::FidId;

use super::CompletionQueue;
use crate::lock::{FastLock, LockClass};

/// Progress hook run by a reader that found the queue empty.
///
/// Called with the completion lock released. Closures taking
/// `&CompletionQueue` implement it.
pub trait CqProgress: Send + Sync {
    fn progress(&self, cq: &CompletionQueue);
}

impl<F> CqProgress for F
where
    F: Fn(&CompletionQueue) + Send + Sync,
{
    fn progress(&self, cq: &CompletionQueue) {
        self(cq)
    }
}

/// Default hook: progress every bound endpoint.
pub struct EndpointProgress;

impl CqProgress for EndpointProgress {
    fn progress(&self, cq: &CompletionQueue) {
        cq.endpoints().drive_all();
    }
}

struct BoundEndpoint {
    ep: Arc<dyn Endpoint>,
    flags: BindFlags,
}

/// Endpoints bound to one queue, in bind order.
pub struct EndpointList {
    entries: FastLock<Vec<BoundEndpoint>>,
}

impl EndpointList {
    pub(super) fn new(owner: FidId) -> Self {
        Self { entries: FastLock::with_owner(LockClass::EndpointList, owner, Vec::new()) }
    }

    /// Record `ep` for `flags`.
    ///
    /// Returns `true` when `ep` was newly listed (the caller takes a
    /// queue reference for it).
    pub(super) fn bind(&self, ep: Arc<dyn Endpoint>, flags: u64) -> FabricResult<bool> {
        let Some(flags) = BindFlags::from_bits(flags) else {
            tracing::warn!(target: "fabric::ep_ctrl", ep = %ep.fid(), flags, "unsupported bind flags");
            return Err(FabricError::InvalidArgument(format!("unsupported bind flags {:#x}", flags)));
        };
        let dirs = flags & (BindFlags::TRANSMIT | BindFlags::RECV);

        if ep.cq_bindings().intersects(dirs) {
            tracing::warn!(target: "fabric::ep_ctrl", ep = %ep.fid(), ?dirs, "duplicate CQ binding");
            return Err(FabricError::DuplicateBinding);
        }

        let mut entries = self.entries.lock();
        if let Some(entry) = entries.iter_mut().find(|e| e.ep.fid() == ep.fid()) {
            if entry.flags.intersects(dirs) {
                tracing::warn!(target: "fabric::ep_ctrl", ep = %ep.fid(), ?dirs, "duplicate CQ binding");
                return Err(FabricError::DuplicateBinding);
            }
            entry.flags |= flags;
            return Ok(false);
        }
        entries.try_reserve(1).map_err(|_| FabricError::NoMemory)?;
        entries.push(BoundEndpoint { ep, flags });
        Ok(true)
    }

    /// Drop `fid` from the list.
    pub(super) fn unbind(&self, fid: FidId) -> FabricResult<()> {
        let mut entries = self.entries.lock();
        match entries.iter().position(|e| e.ep.fid() == fid) {
            Some(pos) => {
                entries.remove(pos);
                Ok(())
            }
            None => Err(FabricError::InvalidArgument(format!("{} not bound", fid))),
        }
    }

    /// Directions recorded for `fid` on this queue.
    pub fn bound_flags(&self, fid: FidId) -> Option<BindFlags> {
        self.entries.lock().iter().find(|e| e.ep.fid() == fid).map(|e| e.flags)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Call `progress()` on every bound endpoint in bind order.
    ///
    /// The list lock is held throughout; endpoints may write completions
    /// but must not bind or unbind on this queue.
    pub fn drive_all(&self) {
        let entries = self.entries.lock();
        tracing::trace!(target: "fabric::cq", endpoints = entries.len(), "progress pass");
        for entry in entries.iter() {
            entry.ep.progress();
        }
    }
}
