//! Domain collaborator.
//!
//! Domain construction and attribute negotiation live elsewhere. A queue
//! only needs three things from its domain: the capability bits that
//! decide whether source addresses are tracked, the API version the
//! application asked for, and a reference count that keeps the domain
//! open while queues exist.

use std::sync::atomic::{AtomicU32, Ordering};

use bitflags::bitflags;

use crate::error::{FabricError, FabricResult};
use crate::id::FidId;

bitflags! {
    /// Domain capabilities relevant to completion queues.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DomainCaps: u64 {
        /// Completions carry the source address of the peer.
        const SOURCE = 1 << 57;
    }
}

/// API version (`major << 16 | minor`). Ordered numerically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version(u32);

impl Version {
    pub const fn new(major: u16, minor: u16) -> Self {
        Version(((major as u32) << 16) | minor as u32)
    }

    pub const fn major(self) -> u16 {
        (self.0 >> 16) as u16
    }

    pub const fn minor(self) -> u16 {
        (self.0 & 0xffff) as u16
    }

    /// Current API version of this layer.
    pub const CURRENT: Version = Version::new(1, 5);
}

impl Default for Version {
    fn default() -> Self {
        Version::CURRENT
    }
}

pub struct Domain {
    fid: FidId,
    provider: &'static str,
    caps: DomainCaps,
    api_version: Version,
    refs: AtomicU32,
}

impl Domain {
    pub fn new(provider: &'static str, caps: DomainCaps, api_version: Version) -> Self {
        Self {
            fid: FidId::next(),
            provider,
            caps,
            api_version,
            refs: AtomicU32::new(0),
        }
    }

    pub fn fid(&self) -> FidId {
        self.fid
    }

    /// Provider name, used to tag diagnostics.
    pub fn provider(&self) -> &'static str {
        self.provider
    }

    pub fn caps(&self) -> DomainCaps {
        self.caps
    }

    pub fn api_version(&self) -> Version {
        self.api_version
    }

    /// Whether queues in this domain must track source addresses.
    #[inline]
    pub fn tracks_source(&self) -> bool {
        self.caps.contains(DomainCaps::SOURCE)
    }

    pub fn acquire(&self) {
        self.refs.fetch_add(1, Ordering::AcqRel);
    }

    pub fn release(&self) {
        let prev = self.refs.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "domain reference count underflow");
    }

    pub fn ref_count(&self) -> u32 {
        self.refs.load(Ordering::Acquire)
    }

    /// Succeeds only once every dependent object is gone.
    pub fn close(&self) -> FabricResult<()> {
        if self.ref_count() != 0 {
            return Err(FabricError::Busy);
        }
        Ok(())
    }
}

impl std::fmt::Debug for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Domain")
            .field("fid", &self.fid)
            .field("provider", &self.provider)
            .field("caps", &self.caps)
            .field("api_version", &self.api_version)
            .field("refs", &self.ref_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_ordering() {
        assert!(Version::new(1, 5) >= Version::new(1, 5));
        assert!(Version::new(1, 4) < Version::new(1, 5));
        assert!(Version::new(2, 0) > Version::new(1, 9));
        assert_eq!(Version::new(1, 5).major(), 1);
        assert_eq!(Version::new(1, 5).minor(), 5);
    }

    #[test]
    fn test_domain_refs() {
        let d = Domain::new("test", DomainCaps::SOURCE, Version::CURRENT);
        assert!(d.tracks_source());
        d.acquire();
        assert!(matches!(d.close(), Err(FabricError::Busy)));
        d.release();
        assert!(d.close().is_ok());
    }
}
