//! Completion queue attributes.
//!
//! Numeric codes coming from an application are converted with
//! `TryFrom<u32>`; unknown codes are rejected with `InvalidArgument`
//! naming the field. The remaining cross-field checks (wait set present,
//! flag bits) happen once at queue open.

use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;

use crate::error::FabricError;
use crate::wait::WaitObject;

/// Format of the entries returned by a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum CqFormat {
    /// Provider's choice; this layer reads it as context-only.
    Unspec = 0,
    #[default]
    Context = 1,
    Msg = 2,
    Data = 3,
    Tagged = 4,
}

impl TryFrom<u32> for CqFormat {
    type Error = FabricError;

    fn try_from(v: u32) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(CqFormat::Unspec),
            1 => Ok(CqFormat::Context),
            2 => Ok(CqFormat::Msg),
            3 => Ok(CqFormat::Data),
            4 => Ok(CqFormat::Tagged),
            _ => Err(FabricError::InvalidArgument(format!("unsupported format {}", v))),
        }
    }
}

/// Kind of wait object attached to a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum WaitObjKind {
    /// No blocking reads.
    #[default]
    None = 0,
    /// Platform default, created and owned by the queue.
    Unspec = 1,
    /// Externally supplied wait set (`CqAttr::wait_set`), borrowed.
    Set = 2,
    /// File-descriptor based, created and owned by the queue.
    Fd = 3,
    /// Mutex + condition variable, created and owned by the queue.
    MutexCond = 4,
}

impl TryFrom<u32> for WaitObjKind {
    type Error = FabricError;

    fn try_from(v: u32) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(WaitObjKind::None),
            1 => Ok(WaitObjKind::Unspec),
            2 => Ok(WaitObjKind::Set),
            3 => Ok(WaitObjKind::Fd),
            4 => Ok(WaitObjKind::MutexCond),
            _ => Err(FabricError::InvalidArgument(format!("unsupported wait object {}", v))),
        }
    }
}

/// Condition a blocking read waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum WaitCond {
    #[default]
    None = 0,
    Threshold = 1,
}

impl TryFrom<u32> for WaitCond {
    type Error = FabricError;

    fn try_from(v: u32) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(WaitCond::None),
            1 => Ok(WaitCond::Threshold),
            _ => Err(FabricError::InvalidArgument(format!("unsupported wait cond {}", v))),
        }
    }
}

bitflags! {
    /// Queue creation flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CqFlags: u64 {
        /// `signaling_vector` is a hardware affinity hint.
        const AFFINITY = 1 << 29;
    }
}

bitflags! {
    /// Directions an endpoint binds to a queue.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct BindFlags: u64 {
        const RECV = 1 << 10;
        const TRANSMIT = 1 << 11;
        /// Only operations flagged for completion generate entries.
        const SELECTIVE_COMPLETION = 1 << 59;
    }
}

/// Attributes passed to queue open (`fi_cq_attr`).
///
/// `flags` stays a raw bit set so unknown bits can be reported instead
/// of silently truncated.
#[derive(Clone, Default)]
pub struct CqAttr {
    /// Requested capacity; zero selects the configured default.
    pub size: usize,
    pub flags: u64,
    pub format: CqFormat,
    pub wait_obj: WaitObjKind,
    pub signaling_vector: i32,
    pub wait_cond: WaitCond,
    /// Required when `wait_obj` is `WaitObjKind::Set`.
    pub wait_set: Option<Arc<dyn WaitObject>>,
}

impl CqAttr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    pub fn flags(mut self, flags: u64) -> Self {
        self.flags = flags;
        self
    }

    pub fn format(mut self, format: CqFormat) -> Self {
        self.format = format;
        self
    }

    pub fn wait_obj(mut self, kind: WaitObjKind) -> Self {
        self.wait_obj = kind;
        self
    }

    pub fn wait_cond(mut self, cond: WaitCond) -> Self {
        self.wait_cond = cond;
        self
    }

    pub fn signaling_vector(mut self, vector: i32) -> Self {
        self.signaling_vector = vector;
        self
    }

    /// Attach an external wait set and select `WaitObjKind::Set`.
    pub fn wait_set(mut self, wait: Arc<dyn WaitObject>) -> Self {
        self.wait_obj = WaitObjKind::Set;
        self.wait_set = Some(wait);
        self
    }
}

impl fmt::Debug for CqAttr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CqAttr")
            .field("size", &self.size)
            .field("flags", &format_args!("{:#x}", self.flags))
            .field("format", &self.format)
            .field("wait_obj", &self.wait_obj)
            .field("signaling_vector", &self.signaling_vector)
            .field("wait_cond", &self.wait_cond)
            .field("wait_set", &self.wait_set.is_some())
            .finish()
    }
}
