//! Environment variable utilities
//!
//! Used by configuration layers to apply `FABRIC_*` overrides on top of
//! compiled-in defaults.
//!
//! ```ignore
//! use fabric_core::env::{env_get, env_get_bool};
//!
//! let size: usize = env_get("FABRIC_CQ_DEFAULT_SIZE", 1024);
//! let verbose = env_get_bool("FABRIC_CQ_TRACE", false);
//! ```

use std::str::FromStr;

/// Get environment variable parsed as type T, or return default.
///
/// Unset and unparsable values both yield `default`.
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_get_opt(key).unwrap_or(default)
}

/// Get environment variable as optional value
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Get environment variable as boolean
///
/// Accepts "1", "true", "yes", "on" (case-insensitive) as true.
/// A set variable with any other value is false; unset returns the default.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => matches!(val.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}
