//! Response Cache - a disk-persisted cache for API responses
//!
//! Stores opaque response payloads in a SQLite file, keyed by request, with
//! max-age checks on lookup and oldest-first eviction to bound file size.

pub mod cache;
pub mod config;
pub mod error;

pub use cache::{CacheItem, CacheStats, CacheStore, EvictionCause, MaxAge};
pub use config::Config;
pub use error::{CacheError, Result};
