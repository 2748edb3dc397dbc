//! Completion entry types.
//!
//! A completion queue stores one generic `CompletionRecord` per ring slot
//! and projects it into the caller's requested format on read. The four
//! formats form a closed set (`CqEntry`); each is a strict prefix of the
//! tagged format, mirroring the `fi_cq_*_entry` family.

use crate::attr::CqFormat;

/// Fabric address of a peer, as resolved by an address vector.
pub type FiAddr = u64;

/// Returned in place of a source address when none is tracked.
pub const FI_ADDR_NOTAVAIL: FiAddr = u64::MAX;

/// Completion flags carried in `flags` of every format except context-only.
pub mod comp_flags {
    pub const MSG: u64 = 1 << 1;
    pub const RMA: u64 = 1 << 2;
    pub const TAGGED: u64 = 1 << 3;
    pub const ATOMIC: u64 = 1 << 4;
    pub const READ: u64 = 1 << 8;
    pub const WRITE: u64 = 1 << 9;
    pub const RECV: u64 = 1 << 10;
    pub const SEND: u64 = 1 << 11;
    pub const REMOTE_READ: u64 = 1 << 12;
    pub const REMOTE_WRITE: u64 = 1 << 13;
    pub const MULTI_RECV: u64 = 1 << 16;
    pub const REMOTE_CQ_DATA: u64 = 1 << 17;

    /// Reserved provider-specific bit: the ring slot is an error marker
    /// and the details sit at the head of the queue's error list.
    pub const UTIL_FLAG_ERROR: u64 = 1 << 60;
}

/// Context-only completion (`FI_CQ_FORMAT_CONTEXT`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct ContextEntry {
    pub op_context: usize,
}

/// Message completion (`FI_CQ_FORMAT_MSG`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct MsgEntry {
    pub op_context: usize,
    pub flags: u64,
    pub len: usize,
}

/// Data completion (`FI_CQ_FORMAT_DATA`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct DataEntry {
    pub op_context: usize,
    pub flags: u64,
    pub len: usize,
    pub buf: usize,
    /// Remote CQ data (immediate data).
    pub data: u64,
}

/// Tagged completion (`FI_CQ_FORMAT_TAGGED`). Superset of all formats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct TaggedEntry {
    pub op_context: usize,
    pub flags: u64,
    pub len: usize,
    pub buf: usize,
    pub data: u64,
    pub tag: u64,
}

/// One completion as delivered to a reader, in the queue's format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CqEntry {
    Context(ContextEntry),
    Msg(MsgEntry),
    Data(DataEntry),
    Tagged(TaggedEntry),
}

impl Default for CqEntry {
    fn default() -> Self {
        CqEntry::Context(ContextEntry::default())
    }
}

impl CqEntry {
    /// The operation context, present in every format.
    #[inline]
    pub fn op_context(&self) -> usize {
        match self {
            CqEntry::Context(e) => e.op_context,
            CqEntry::Msg(e) => e.op_context,
            CqEntry::Data(e) => e.op_context,
            CqEntry::Tagged(e) => e.op_context,
        }
    }

    pub fn flags(&self) -> Option<u64> {
        match self {
            CqEntry::Context(_) => None,
            CqEntry::Msg(e) => Some(e.flags),
            CqEntry::Data(e) => Some(e.flags),
            CqEntry::Tagged(e) => Some(e.flags),
        }
    }

    pub fn len(&self) -> Option<usize> {
        match self {
            CqEntry::Context(_) => None,
            CqEntry::Msg(e) => Some(e.len),
            CqEntry::Data(e) => Some(e.len),
            CqEntry::Tagged(e) => Some(e.len),
        }
    }

    pub fn data(&self) -> Option<u64> {
        match self {
            CqEntry::Data(e) => Some(e.data),
            CqEntry::Tagged(e) => Some(e.data),
            _ => None,
        }
    }

    pub fn tag(&self) -> Option<u64> {
        match self {
            CqEntry::Tagged(e) => Some(e.tag),
            _ => None,
        }
    }
}

/// A ring slot.
///
/// Holds the union of all format fields. When `flags` carries
/// `UTIL_FLAG_ERROR` the other fields are meaningless.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C, align(64))]
pub struct CompletionRecord {
    pub op_context: usize,
    pub flags: u64,
    pub len: usize,
    pub buf: usize,
    pub data: u64,
    pub tag: u64,
}

impl CompletionRecord {
    /// Marker slot pointing at the error list.
    pub const ERROR_MARKER: Self = Self {
        op_context: 0,
        flags: comp_flags::UTIL_FLAG_ERROR,
        len: 0,
        buf: 0,
        data: 0,
        tag: 0,
    };

    #[inline]
    pub fn is_error(&self) -> bool {
        self.flags & comp_flags::UTIL_FLAG_ERROR != 0
    }

    /// Copy-out projection. One match, one branch per format.
    #[inline]
    pub fn project(&self, format: CqFormat) -> CqEntry {
        match format {
            CqFormat::Unspec | CqFormat::Context => CqEntry::Context(ContextEntry {
                op_context: self.op_context,
            }),
            CqFormat::Msg => CqEntry::Msg(MsgEntry {
                op_context: self.op_context,
                flags: self.flags,
                len: self.len,
            }),
            CqFormat::Data => CqEntry::Data(DataEntry {
                op_context: self.op_context,
                flags: self.flags,
                len: self.len,
                buf: self.buf,
                data: self.data,
            }),
            CqFormat::Tagged => CqEntry::Tagged(TaggedEntry {
                op_context: self.op_context,
                flags: self.flags,
                len: self.len,
                buf: self.buf,
                data: self.data,
                tag: self.tag,
            }),
        }
    }
}

impl From<TaggedEntry> for CompletionRecord {
    #[inline]
    fn from(e: TaggedEntry) -> Self {
        Self {
            op_context: e.op_context,
            // The error bit is reserved for markers written by the queue.
            flags: e.flags & !comp_flags::UTIL_FLAG_ERROR,
            len: e.len,
            buf: e.buf,
            data: e.data,
            tag: e.tag,
        }
    }
}

/// Detailed error completion (`fi_cq_err_entry`).
///
/// Stored out-of-band in the queue's error list. When read back,
/// `err_data_size` on the caller's record is the capacity the caller is
/// willing to accept for `err_data`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CqErrEntry {
    pub op_context: usize,
    pub flags: u64,
    pub len: usize,
    pub buf: usize,
    pub data: u64,
    pub tag: u64,
    /// Overflow length (bytes that did not fit the posted buffer).
    pub olen: usize,
    /// Generic error code (positive errno).
    pub err: i32,
    /// Provider-specific error code.
    pub prov_errno: i32,
    pub err_data: Vec<u8>,
    pub err_data_size: usize,
}
