//! Environment variable helpers
//!
//! All runtime knobs are read from `COSYNC_*` variables. Lenient getters fall
//! back to a default on a missing or malformed value; [`env_parse`] reports
//! the malformed case so configuration can reject it.
//!
//! ```ignore
//! use cosync_core::env::{env_get, env_get_bool};
//!
//! let workers: usize = env_get("COSYNC_NUM_WORKERS", 4);
//! let debug = env_get_bool("COSYNC_DEBUG", false);
//! ```

use std::str::FromStr;

/// A variable that is set but does not parse
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvParseError {
    pub key: String,
    pub value: String,
}

impl std::fmt::Display for EnvParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={:?} does not parse", self.key, self.value)
    }
}

impl std::error::Error for EnvParseError {}

/// Parsed value or `default` when unset or malformed
#[inline]
pub fn env_get<T: FromStr>(key: &str, default: T) -> T {
    env_get_opt(key).unwrap_or(default)
}

/// Parsed value, `None` when unset or malformed
#[inline]
pub fn env_get_opt<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Strict variant: `Ok(None)` when unset, `Err` when set but malformed
pub fn env_parse<T: FromStr>(key: &str) -> Result<Option<T>, EnvParseError> {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map(Some).map_err(|_| EnvParseError {
            key: key.to_string(),
            value: raw,
        }),
        Err(_) => Ok(None),
    }
}

/// "1", "true", "yes", "on" (any case) are true; other set values are false
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => matches!(val.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}
