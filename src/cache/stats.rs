//! Cache Statistics Module
//!
//! Tracks lookups and removals so callers can judge how well the cache works.

use serde::Serialize;

// == Cache Stats ==
/// Counters for one open cache, plus a snapshot of its current size.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    /// Lookups that returned a fresh item
    pub hits: u64,
    /// Lookups that found nothing or only a stale item
    pub misses: u64,
    /// Stale items deleted by a lookup
    pub expirations: u64,
    /// Items overwritten through `set`
    pub replacements: u64,
    /// Items removed through `set` with no new item
    pub removals: u64,
    /// Rows deleted by `shrink`
    pub evictions: u64,
    /// Current number of rows
    pub total_entries: u64,
    /// Current size of the backing file in bytes
    pub file_size_bytes: u64,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no lookups have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_expiration(&mut self) {
        self.expirations += 1;
    }

    pub fn record_replacement(&mut self) {
        self.replacements += 1;
    }

    pub fn record_removal(&mut self) {
        self.removals += 1;
    }

    /// Adds `count` shrink evictions.
    pub fn record_evictions(&mut self, count: usize) {
        self.evictions += count as u64;
    }
}
