//! Configuration Module
//!
//! Handles loading cache configuration from environment variables.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Response cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base path of the cache file; the `.sqlite` extension is appended on open
    pub cache_path: PathBuf,
    /// Size the cache file is shrunk towards by `enforce_size_limit`, 0 disables the limit
    pub max_size_bytes: i64,
    /// Max age in seconds callers use when they have no better freshness policy
    pub default_max_age: u64,
    /// How long to wait on a file locked by another connection, in milliseconds
    pub busy_timeout_ms: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `RESPONSE_CACHE_PATH` - Base path of the cache file (default: response_cache)
    /// - `RESPONSE_CACHE_MAX_SIZE` - Size limit in bytes (default: 52428800)
    /// - `RESPONSE_CACHE_MAX_AGE` - Default max age in seconds (default: 3600)
    /// - `RESPONSE_CACHE_BUSY_TIMEOUT_MS` - Lock wait in milliseconds (default: 5000)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            cache_path: env::var("RESPONSE_CACHE_PATH")
                .ok()
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_path),
            max_size_bytes: env::var("RESPONSE_CACHE_MAX_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v: &i64| *v >= 0)
                .unwrap_or(defaults.max_size_bytes),
            default_max_age: env::var("RESPONSE_CACHE_MAX_AGE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.default_max_age),
            busy_timeout_ms: env::var("RESPONSE_CACHE_BUSY_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.busy_timeout_ms),
        }
    }

    /// Busy timeout as a `Duration`.
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_path: PathBuf::from("response_cache"),
            max_size_bytes: 50 * 1024 * 1024,
            default_max_age: 3600,
            busy_timeout_ms: 5000,
        }
    }
}
