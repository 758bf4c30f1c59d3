//! Cache Module
//!
//! Provides a SQLite-backed response cache with max-age lookups and
//! size-bounded eviction of the oldest entries.

mod clock;
mod engine;
mod item;
mod stats;
mod store;


// Re-export public types
pub use clock::TickClock;
pub use engine::{RawEntry, StorageEngine};
pub use item::{CacheItem, EvictionCause, MaxAge};
pub use stats::CacheStats;
pub use store::{cache_file_path, CacheStore, EvictionHook};

// == Public Constants ==
/// Extension appended to a cache's base path to name its SQLite file
pub const FILE_EXTENSION: &str = "sqlite";

/// Smallest file SQLite produces (one 4 KiB page); shrinking never targets below it
pub const MIN_FILE_SIZE: i64 = 4096;
