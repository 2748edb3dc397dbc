//! Attribute validation at queue open.

use fabric_core::attr::{CqAttr, CqFlags, CqFormat, WaitCond, WaitObjKind};
use fabric_core::error::{FabricError, FabricResult};

/// Reject attributes a queue cannot be opened with.
///
/// Warnings are logged under the provider's name so a misconfigured
/// application can tell which provider refused it.
pub fn check_cq_attr(provider: &str, attr: &CqAttr) -> FabricResult<()> {
    if attr.wait_obj == WaitObjKind::Set && attr.wait_set.is_none() {
        tracing::warn!(target: "fabric::cq", provider, "invalid wait set");
        return Err(FabricError::InvalidArgument("wait set required".into()));
    }

    let Some(flags) = CqFlags::from_bits(attr.flags) else {
        tracing::warn!(target: "fabric::cq", provider, flags = attr.flags, "invalid flags");
        return Err(FabricError::InvalidArgument(format!("invalid flags {:#x}", attr.flags)));
    };

    if flags.contains(CqFlags::AFFINITY) {
        tracing::warn!(
            target: "fabric::cq",
            provider,
            vector = attr.signaling_vector,
            "signaling vector ignored"
        );
    }
    Ok(())
}

/// Convert raw attribute codes, logging the field that was rejected.
pub fn parse_format(provider: &str, code: u32) -> FabricResult<CqFormat> {
    CqFormat::try_from(code).inspect_err(|_| {
        tracing::warn!(target: "fabric::cq", provider, code, "unsupported format");
    })
}

pub fn parse_wait_obj(provider: &str, code: u32) -> FabricResult<WaitObjKind> {
    WaitObjKind::try_from(code).inspect_err(|_| {
        tracing::warn!(target: "fabric::cq", provider, code, "unsupported wait object");
    })
}

pub fn parse_wait_cond(provider: &str, code: u32) -> FabricResult<WaitCond> {
    WaitCond::try_from(code).inspect_err(|_| {
        tracing::warn!(target: "fabric::cq", provider, code, "unsupported wait condition");
    })
}
