//! Completion queue engine
//!
//! ```text
//!   producers                        consumer
//!   write / write_src ──┐        ┌── read / read_from / sread
//!   write_error ────────┤        │       │ empty? drop lock,
//!                       ▼        │       │ run progress hook
//!        ┌──────────── ring ─────┴──┐    ▼
//!        │ rec rec ERR rec ...      │  EndpointList::drive_all
//!        └──────────────────────────┘    └─ ep.progress() may write
//!                 ERR ─► errors (FIFO) ◄── read_err
//! ```
//!
//! One completion lock guards the ring, the error list and the source
//! address array. The endpoint list has its own lock, which may be held
//! while taking the completion lock but never the other way round.

mod attr;
mod err;
mod progress;


use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};

use fabric_core::attr::{CqAttr, CqFormat, WaitObjKind};
use fabric_core::domain::Domain;
use fabric_core::endpoint::Endpoint;
use fabric_core::entry::{CompletionRecord, CqEntry, CqErrEntry, FiAddr, TaggedEntry, FI_ADDR_NOTAVAIL};
use fabric_core::error::{FabricError, FabricResult};
use fabric_core::id::FidId;
use fabric_core::wait::{PollMember, WaitObject};

use crate::cirque::Cirque;
use crate::config::CqConfig;
use crate::lock::{FastLock, LockClass};
use crate::wait::open_wait;

pub use attr::{check_cq_attr, parse_format, parse_wait_cond, parse_wait_obj};
pub use progress::{CqProgress, EndpointList, EndpointProgress};

/// Wait object attached to a queue.
pub enum CqWait {
    /// Created at open; released at close.
    Owned(Arc<dyn WaitObject>),
    /// Caller-supplied wait set; left alone at close.
    Borrowed(Arc<dyn WaitObject>),
}

impl CqWait {
    pub fn object(&self) -> &Arc<dyn WaitObject> {
        match self {
            CqWait::Owned(w) | CqWait::Borrowed(w) => w,
        }
    }

    pub fn is_owned(&self) -> bool {
        matches!(self, CqWait::Owned(_))
    }
}

/// State under the completion lock.
struct CqState {
    ring: Cirque<CompletionRecord>,
    /// Parallel to ring slots; present when the domain tracks sources
    src: Option<Vec<FiAddr>>,
    errors: VecDeque<CqErrEntry>,
    closed: bool,
}

pub struct CompletionQueue {
    fid: FidId,
    context: usize,
    domain: Arc<Domain>,
    format: CqFormat,
    state: FastLock<CqState>,
    endpoints: EndpointList,
    wait: FastLock<Option<CqWait>>,
    progress: Box<dyn CqProgress>,
    refs: AtomicU32,
}

impl CompletionQueue {
    /// Open a queue with the process-wide configuration.
    ///
    /// `progress` defaults to `EndpointProgress`. `context` is reported
    /// by poll sets when this queue is ready.
    pub fn open(
        domain: &Arc<Domain>,
        attr: &CqAttr,
        progress: Option<Box<dyn CqProgress>>,
        context: usize,
    ) -> FabricResult<Arc<Self>> {
        Self::open_with_config(domain, attr, progress, context, CqConfig::global())
    }

    pub fn open_with_config(
        domain: &Arc<Domain>,
        attr: &CqAttr,
        progress: Option<Box<dyn CqProgress>>,
        context: usize,
        config: &CqConfig,
    ) -> FabricResult<Arc<Self>> {
        check_cq_attr(domain.provider(), attr)?;

        let size = if attr.size == 0 { config.default_size } else { attr.size };
        let ring = Cirque::create(size)?;

        let src = if domain.tracks_source() {
            let mut addrs = Vec::new();
            addrs.try_reserve_exact(ring.size()).map_err(|_| FabricError::NoMemory)?;
            addrs.resize(ring.size(), FI_ADDR_NOTAVAIL);
            Some(addrs)
        } else {
            None
        };

        let wait = match (attr.wait_obj, &attr.wait_set) {
            (WaitObjKind::None, _) => None,
            (WaitObjKind::Set, Some(set)) => Some(CqWait::Borrowed(Arc::clone(set))),
            (WaitObjKind::Set, None) => {
                return Err(FabricError::InvalidArgument("wait set required".into()))
            }
            (kind, _) => Some(CqWait::Owned(open_wait(kind, config)?)),
        };

        let fid = FidId::next();
        let cq = Arc::new(Self {
            fid,
            context,
            domain: Arc::clone(domain),
            format: attr.format,
            state: FastLock::with_owner(
                LockClass::Completion,
                fid,
                CqState { ring, src, errors: VecDeque::new(), closed: false },
            ),
            endpoints: EndpointList::new(fid),
            wait: FastLock::new(LockClass::Plain, wait),
            progress: progress.unwrap_or_else(|| Box::new(EndpointProgress)),
            refs: AtomicU32::new(0),
        });
        domain.acquire();

        // Register only once the queue is fully built: a poll may query it
        // from another thread as soon as it is in the set.
        if let Some(wait) = cq.wait_object() {
            let member: Weak<dyn PollMember> = Arc::downgrade(&cq) as Weak<dyn PollMember>;
            if let Err(e) = wait.pollset().add(cq.fid, member) {
                // Releases the domain reference; Drop then has nothing to do
                let _ = cq.teardown(false);
                return Err(e);
            }
        }

        tracing::debug!(
            target: "fabric::cq",
            provider = domain.provider(),
            cq = %cq.fid,
            capacity = cq.capacity(),
            format = ?cq.format,
            wait = ?attr.wait_obj,
            "completion queue opened"
        );
        Ok(cq)
    }

    /// Read up to `buf.len()` completions in FIFO order.
    ///
    /// Stops early at an error marker. `ErrorAvailable` when the marker is
    /// the first entry; drain it with `read_err`. `Again` when nothing is
    /// queued even after a progress pass.
    pub fn read(&self, buf: &mut [CqEntry]) -> FabricResult<usize> {
        self.read_inner(buf, None)
    }

    /// `read` that also reports each entry's source address.
    ///
    /// `src_addrs[i]` pairs with `buf[i]`; queues that don't track sources
    /// fill `FI_ADDR_NOTAVAIL`. At most `min(buf.len(), src_addrs.len())`
    /// entries are read.
    pub fn read_from(&self, buf: &mut [CqEntry], src_addrs: &mut [FiAddr]) -> FabricResult<usize> {
        self.read_inner(buf, Some(src_addrs))
    }

    fn read_inner(&self, buf: &mut [CqEntry], mut addrs: Option<&mut [FiAddr]>) -> FabricResult<usize> {
        let mut st = self.state.lock();
        if st.closed {
            return Err(FabricError::OpBadState);
        }
        if st.ring.is_empty() {
            drop(st);
            self.run_progress();
            st = self.state.lock();
            if st.closed {
                return Err(FabricError::OpBadState);
            }
            if st.ring.is_empty() {
                return Err(FabricError::Again);
            }
        }

        let mut count = buf.len().min(st.ring.used_count());
        if let Some(a) = addrs.as_deref() {
            count = count.min(a.len());
        }

        for (i, slot) in buf.iter_mut().take(count).enumerate() {
            let rec = *st.ring.head();
            if rec.is_error() {
                if i == 0 {
                    return Err(FabricError::ErrorAvailable);
                }
                return Ok(i);
            }
            *slot = rec.project(self.format);
            if let Some(out) = addrs.as_deref_mut() {
                out[i] = match &st.src {
                    Some(src) => src[st.ring.rindex()],
                    None => FI_ADDR_NOTAVAIL,
                };
            }
            st.ring.discard();
        }
        Ok(count)
    }

    /// Block on the wait object for up to `timeout_ms`, then `read`.
    ///
    /// Negative waits forever, zero polls. A timed-out wait shows up as
    /// `Again` from the read.
    ///
    /// # Panics
    ///
    /// If the queue was opened without a wait object.
    pub fn sread(&self, buf: &mut [CqEntry], timeout_ms: i32) -> FabricResult<usize> {
        self.block(timeout_ms)?;
        self.read(buf)
    }

    /// Blocking `read_from`. Same wait rules as `sread`.
    pub fn sread_from(
        &self,
        buf: &mut [CqEntry],
        src_addrs: &mut [FiAddr],
        timeout_ms: i32,
    ) -> FabricResult<usize> {
        self.block(timeout_ms)?;
        self.read_from(buf, src_addrs)
    }

    fn block(&self, timeout_ms: i32) -> FabricResult<()> {
        let Some(wait) = self.wait_object() else {
            panic!("{}: blocking read on a completion queue without a wait object", self.fid);
        };
        match wait.wait(timeout_ms) {
            Ok(()) | Err(FabricError::Again) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Force a wakeup of a blocked reader.
    ///
    /// # Panics
    ///
    /// If the queue was opened without a wait object.
    pub fn signal(&self) {
        let Some(wait) = self.wait_object() else {
            panic!("{}: signal on a completion queue without a wait object", self.fid);
        };
        wait.signal();
    }

    /// Post a completion. `Overrun` when the ring is full.
    pub fn write(&self, entry: TaggedEntry) -> FabricResult<()> {
        self.write_inner(entry, FI_ADDR_NOTAVAIL)
    }

    /// Post a completion with its source address.
    pub fn write_src(&self, entry: TaggedEntry, addr: FiAddr) -> FabricResult<()> {
        self.write_inner(entry, addr)
    }

    fn write_inner(&self, entry: TaggedEntry, addr: FiAddr) -> FabricResult<()> {
        {
            let mut st = self.state.lock();
            if st.closed {
                return Err(FabricError::OpBadState);
            }
            if st.ring.is_full() {
                tracing::warn!(
                    target: "fabric::cq",
                    cq = %self.fid,
                    capacity = st.ring.size(),
                    "completion queue overrun"
                );
                return Err(FabricError::Overrun);
            }
            let idx = st.ring.windex();
            if let Some(src) = st.src.as_mut() {
                src[idx] = addr;
            }
            st.ring.push(CompletionRecord::from(entry));
        }
        self.wake();
        Ok(())
    }

    /// Post an error completion: a marker in the ring plus `err` on the
    /// error list.
    pub fn write_error(&self, err: CqErrEntry) -> FabricResult<()> {
        {
            let mut st = self.state.lock();
            if st.closed {
                return Err(FabricError::OpBadState);
            }
            st.push_error(err).inspect_err(|e| {
                tracing::warn!(target: "fabric::cq", cq = %self.fid, error = %e, "error completion dropped");
            })?;
        }
        self.wake();
        Ok(())
    }

    /// Take the error record paired with the marker at the head.
    ///
    /// `Again` if the head is not an error. `flags` is reserved.
    pub fn read_err(&self, out: &mut CqErrEntry, _flags: u64) -> FabricResult<usize> {
        let mut st = self.state.lock();
        if st.closed {
            return Err(FabricError::OpBadState);
        }
        st.pop_error(out, self.domain.api_version())
    }

    /// Generic message for a provider error code.
    pub fn strerror(&self, prov_errno: i32, _err_data: &[u8]) -> String {
        fabric_core::error::strerror(prov_errno).to_string()
    }

    /// Attach `ep` for the directions in `flags` (`BindFlags` bits).
    ///
    /// Binding an endpoint already listed merges the new directions.
    /// A newly listed endpoint holds a reference on the queue until
    /// `unbind`.
    pub fn bind(&self, ep: Arc<dyn Endpoint>, flags: u64) -> FabricResult<()> {
        // Pin the queue open: close checks refs under the same lock
        {
            let st = self.state.lock();
            if st.closed {
                return Err(FabricError::OpBadState);
            }
            self.acquire_ref();
        }
        let ep_fid = ep.fid();
        match self.endpoints.bind(ep, flags) {
            Ok(true) => {}
            Ok(false) => self.release_ref(),
            Err(e) => {
                self.release_ref();
                return Err(e);
            }
        }
        tracing::debug!(target: "fabric::ep_ctrl", cq = %self.fid, ep = %ep_fid, flags, "endpoint bound");
        Ok(())
    }

    pub fn unbind(&self, ep: FidId) -> FabricResult<()> {
        self.endpoints.unbind(ep)?;
        self.release_ref();
        tracing::debug!(target: "fabric::ep_ctrl", cq = %self.fid, %ep, "endpoint unbound");
        Ok(())
    }

    pub fn acquire_ref(&self) {
        self.refs.fetch_add(1, Ordering::AcqRel);
    }

    pub fn release_ref(&self) {
        let prev = self.refs.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "completion queue reference count underflow");
    }

    pub fn ref_count(&self) -> u32 {
        self.refs.load(Ordering::Acquire)
    }

    /// Tear the queue down. `Busy` (and nothing changes) while references
    /// remain; `OpBadState` if already closed.
    pub fn close(&self) -> FabricResult<()> {
        self.teardown(true)?;
        tracing::debug!(target: "fabric::cq", cq = %self.fid, "completion queue closed");
        Ok(())
    }

    fn teardown(&self, require_idle: bool) -> FabricResult<()> {
        {
            let mut st = self.state.lock();
            if st.closed {
                return Err(FabricError::OpBadState);
            }
            let refs = self.ref_count();
            if require_idle && refs > 0 {
                tracing::debug!(target: "fabric::cq", cq = %self.fid, refs, "close refused, queue in use");
                return Err(FabricError::Busy);
            }
            st.closed = true;
            let dropped = st.drain_errors();
            if dropped > 0 {
                tracing::debug!(target: "fabric::cq", cq = %self.fid, dropped, "unread errors discarded");
            }
            st.ring.free();
            st.src = None;
        }

        let wait = self.wait.lock().take();
        if let Some(wait) = wait {
            if let Err(e) = wait.object().pollset().del(self.fid) {
                tracing::debug!(target: "fabric::wait", cq = %self.fid, error = %e, "poll set removal");
            }
            if wait.is_owned() {
                tracing::debug!(target: "fabric::wait", cq = %self.fid, "owned wait object released");
            }
        }

        self.domain.release();
        Ok(())
    }

    fn run_progress(&self) {
        self.state.assert_not_held();
        self.progress.progress(self);
    }

    fn wake(&self) {
        if let Some(wait) = self.wait_object() {
            wait.signal();
        }
    }

    /// Current ring capacity (0 after close).
    pub fn capacity(&self) -> usize {
        self.state.lock().ring.size()
    }

    pub fn format(&self) -> CqFormat {
        self.format
    }

    pub fn fid(&self) -> FidId {
        self.fid
    }

    pub fn context(&self) -> usize {
        self.context
    }

    pub fn domain(&self) -> &Arc<Domain> {
        &self.domain
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn has_wait(&self) -> bool {
        self.wait.lock().is_some()
    }

    pub fn wait_object(&self) -> Option<Arc<dyn WaitObject>> {
        self.wait.lock().as_ref().map(|w| Arc::clone(w.object()))
    }

    pub fn endpoints(&self) -> &EndpointList {
        &self.endpoints
    }
}

impl PollMember for CompletionQueue {
    fn poll_ready(&self) -> bool {
        matches!(self.read(&mut []), Ok(_) | Err(FabricError::ErrorAvailable))
    }

    fn poll_context(&self) -> usize {
        self.context
    }
}

impl Drop for CompletionQueue {
    fn drop(&mut self) {
        if !self.state.get_mut().closed {
            tracing::debug!(target: "fabric::cq", cq = %self.fid, "completion queue dropped without close");
            let _ = self.teardown(false);
        }
    }
}

impl fmt::Debug for CompletionQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionQueue")
            .field("fid", &self.fid)
            .field("format", &self.format)
            .field("context", &self.context)
            .field("refs", &self.ref_count())
            .finish_non_exhaustive()
    }
}
