//! Fabric error types.
//!
//! `Again` and `ErrorAvailable` are steady-state outcomes of polling a
//! queue, not failures; they are still errors so a read can be written
//! as `match cq.read(&mut buf)`.

use thiserror::Error;

/// libfabric-compatible error codes (positive values).
pub mod errno {
    pub const FI_ENOMEM: i32 = 12;
    pub const FI_EAGAIN: i32 = 11;
    pub const FI_EBUSY: i32 = 16;
    pub const FI_EINVAL: i32 = 22;
    pub const FI_ENOSYS: i32 = 38;
    pub const FI_ETIMEDOUT: i32 = 110;
    pub const FI_EALREADY: i32 = 114;

    pub const FI_ERRNO_OFFSET: i32 = 256;
    pub const FI_EOTHER: i32 = FI_ERRNO_OFFSET;
    pub const FI_ETOOSMALL: i32 = 257;
    pub const FI_EOPBADSTATE: i32 = 258;
    pub const FI_EAVAIL: i32 = 259;
    pub const FI_EBADFLAGS: i32 = 260;
    pub const FI_ETRUNC: i32 = 265;
    pub const FI_EOVERRUN: i32 = 268;
}

#[derive(Debug, Error)]
pub enum FabricError {
    /// Nothing available right now.
    #[error("resource temporarily unavailable")]
    Again,

    /// The next entry is an error; drain it with `read_err`.
    #[error("error available")]
    ErrorAvailable,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The endpoint already has this direction bound.
    #[error("duplicate CQ binding")]
    DuplicateBinding,

    #[error("out of memory")]
    NoMemory,

    /// References are still outstanding.
    #[error("resource busy")]
    Busy,

    /// A producer wrote into a full ring.
    #[error("queue overrun")]
    Overrun,

    /// The object is closed.
    #[error("operation not supported in current state")]
    OpBadState,

    #[error("OS error: {0}")]
    Os(#[from] nix::errno::Errno),
}

impl FabricError {
    /// Negative error code, as returned through a C-style interface.
    pub fn errno(&self) -> i32 {
        let code = match self {
            FabricError::Again => errno::FI_EAGAIN,
            FabricError::ErrorAvailable => errno::FI_EAVAIL,
            FabricError::InvalidArgument(_) => errno::FI_EINVAL,
            FabricError::DuplicateBinding => errno::FI_EINVAL,
            FabricError::NoMemory => errno::FI_ENOMEM,
            FabricError::Busy => errno::FI_EBUSY,
            FabricError::Overrun => errno::FI_EOVERRUN,
            FabricError::OpBadState => errno::FI_EOPBADSTATE,
            FabricError::Os(e) => *e as i32,
        };
        -code
    }

    /// Shorthand for `matches!(e, FabricError::Again)`.
    #[inline]
    pub fn is_again(&self) -> bool {
        matches!(self, FabricError::Again)
    }
}

pub type FabricResult<T> = std::result::Result<T, FabricError>;

/// Human-readable text for an error code of either sign.
pub fn strerror(code: i32) -> &'static str {
    match code.abs() {
        0 => "success",
        errno::FI_EAGAIN => "resource temporarily unavailable",
        errno::FI_ENOMEM => "cannot allocate memory",
        errno::FI_EBUSY => "device or resource busy",
        errno::FI_EINVAL => "invalid argument",
        errno::FI_ENOSYS => "function not implemented",
        errno::FI_ETIMEDOUT => "connection timed out",
        errno::FI_EALREADY => "operation already in progress",
        errno::FI_EOTHER => "unspecified error",
        errno::FI_ETOOSMALL => "provided buffer is too small",
        errno::FI_EOPBADSTATE => "operation not permitted in current state",
        errno::FI_EAVAIL => "error available",
        errno::FI_EBADFLAGS => "flags not supported",
        errno::FI_ETRUNC => "truncation error",
        errno::FI_EOVERRUN => "queue has been overrun",
        _ => "unknown error",
    }
}
