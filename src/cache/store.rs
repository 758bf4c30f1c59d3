//! Cache Store Module
//!
//! Policy layer over the storage engine: max-age checks on lookup, eviction
//! notifications, and shrinking the file towards a size budget.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::cache::clock::{self, TickClock};
use crate::cache::engine::{RawEntry, StorageEngine};
use crate::cache::{CacheItem, CacheStats, EvictionCause, MaxAge, FILE_EXTENSION, MIN_FILE_SIZE};
use crate::config::Config;
use crate::error::{CacheError, Result};

/// Observer invoked with each item the store evicts on the caller's behalf.
pub type EvictionHook = Box<dyn Fn(&CacheItem, EvictionCause) + Send + Sync>;

/// State guarded by the store lock.
struct Inner {
    engine: StorageEngine,
    clock: TickClock,
    stats: CacheStats,
}

// == Cache Store ==
/// Disk-backed response cache.
///
/// Holds one SQLite connection for its whole lifetime. Every operation that
/// touches storage runs under a single internal mutex, so a store can be
/// shared between threads behind an `Arc`.
///
/// The eviction hook runs after the storage change has committed and before
/// the lock is released. A hook must not call back into the same store. A
/// hook that panics does not lock the store up: later operations go on
/// against the committed state.
pub struct CacheStore {
    inner: Mutex<Inner>,
    hook: Option<EvictionHook>,
    path: PathBuf,
    max_size_bytes: i64,
}

/// Returns the cache file for a base path: `<base>.sqlite`.
pub fn cache_file_path(base_path: impl AsRef<Path>) -> PathBuf {
    let mut name = base_path.as_ref().as_os_str().to_owned();
    name.push(".");
    name.push(FILE_EXTENSION);
    PathBuf::from(name)
}

impl CacheStore {
    // == Constructor ==
    /// Opens the cache stored at `<base_path>.sqlite`, creating it if needed.
    pub fn open(base_path: impl AsRef<Path>) -> Result<Self> {
        let config = Config {
            cache_path: base_path.as_ref().to_path_buf(),
            ..Config::default()
        };
        Self::from_config(&config)
    }

    /// Opens the cache described by the configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let path = cache_file_path(&config.cache_path);
        let engine = StorageEngine::open(&path, config.busy_timeout())?;
        let clock = TickClock::starting_after(engine.max_ticks()?.unwrap_or(i64::MIN));

        info!(
            path = %path.display(),
            entries = engine.count_rows()?,
            "Response cache opened"
        );

        Ok(Self {
            inner: Mutex::new(Inner {
                engine,
                clock,
                stats: CacheStats::new(),
            }),
            hook: None,
            path,
            max_size_bytes: config.max_size_bytes,
        })
    }

    /// Registers the eviction hook, replacing any previous one.
    ///
    /// The hook fires once for every item replaced or removed through `set`
    /// and for every stale item a lookup deletes. `remove`, `flush` and
    /// `shrink` never fire it.
    pub fn on_evicted<F>(mut self, hook: F) -> Self
    where
        F: Fn(&CacheItem, EvictionCause) + Send + Sync + 'static,
    {
        self.hook = Some(Box::new(hook));
        self
    }

    /// Path of the backing SQLite file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    // == Set ==
    /// Stores `item` under `key`, or removes `key` when `item` is None.
    ///
    /// Returns the item previously stored under `key`. That item is passed to
    /// the eviction hook once the write has committed. An item carrying a
    /// different key than `key` is rejected.
    pub fn set(&self, key: &str, item: Option<CacheItem>) -> Result<Option<CacheItem>> {
        validate_key(key)?;
        if let Some(item) = &item {
            if item.key() != key {
                return Err(CacheError::InvalidArgument(format!(
                    "Item key '{}' does not match '{}'",
                    item.key(),
                    key
                )));
            }
        }
        let mut inner = self.lock();
        let ticks = item.as_ref().map(|item| clock::to_ticks(item.creation_time()));
        self.write_locked(&mut inner, key, item.map(CacheItem::into_payload), ticks)
    }

    /// Stores `payload` under `key`, stamped with the store's tick clock.
    ///
    /// Stamps from one store never repeat, even within the same microsecond.
    pub fn insert(&self, key: &str, payload: impl Into<String>) -> Result<Option<CacheItem>> {
        validate_key(key)?;
        let mut inner = self.lock();
        let ticks = inner.clock.now();
        self.write_locked(&mut inner, key, Some(payload.into()), Some(ticks))
    }

    fn write_locked(
        &self,
        inner: &mut Inner,
        key: &str,
        payload: Option<String>,
        ticks: Option<i64>,
    ) -> Result<Option<CacheItem>> {
        let previous = inner.engine.get_raw(key)?.map(to_item).transpose()?;

        let cause = match (payload, ticks) {
            (Some(payload), Some(ticks)) => {
                let stored = inner.engine.put_raw(key, &payload, ticks)?;
                inner.clock.observe(stored);
                debug!(key, "cache set");
                EvictionCause::Replaced
            }
            _ => {
                if previous.is_some() {
                    inner.engine.delete_raw(key)?;
                }
                debug!(key, "cache set to nothing");
                EvictionCause::Removed
            }
        };

        if let Some(previous) = &previous {
            match cause {
                EvictionCause::Replaced => inner.stats.record_replacement(),
                _ => inner.stats.record_removal(),
            }
            self.notify(previous, cause);
        }
        Ok(previous)
    }

    // == Get ==
    /// Retrieves the item stored under `key` if it is fresh under `max_age`.
    ///
    /// A stale item yields None. With `remove_if_expired` it is also deleted
    /// and handed to the eviction hook; otherwise it stays on disk.
    pub fn get(
        &self,
        key: &str,
        max_age: MaxAge,
        remove_if_expired: bool,
    ) -> Result<Option<CacheItem>> {
        validate_key(key)?;
        max_age.validate()?;
        let mut inner = self.lock();

        let Some(raw) = inner.engine.get_raw(key)? else {
            inner.stats.record_miss();
            debug!(key, "cache miss");
            return Ok(None);
        };
        let item = to_item(raw)?;

        if !item.is_expired(max_age) {
            inner.stats.record_hit();
            debug!(key, "cache hit");
            return Ok(Some(item));
        }

        inner.stats.record_miss();
        if remove_if_expired {
            inner.engine.delete_raw(key)?;
            inner.stats.record_expiration();
            debug!(key, "expired entry removed");
            self.notify(&item, EvictionCause::Expired);
        } else {
            debug!(key, "expired entry kept");
        }
        Ok(None)
    }

    // == Remove ==
    /// Deletes the item stored under `key`, returning it.
    ///
    /// Does not fire the eviction hook.
    pub fn remove(&self, key: &str) -> Result<Option<CacheItem>> {
        validate_key(key)?;
        let inner = self.lock();

        let Some(raw) = inner.engine.get_raw(key)? else {
            return Ok(None);
        };
        let item = to_item(raw)?;
        inner.engine.delete_raw(key)?;
        debug!(key, "cache remove");
        Ok(Some(item))
    }

    // == Flush ==
    /// Deletes every item and compacts the file. Returns the number removed.
    ///
    /// Bulk removal does not fire the eviction hook.
    pub fn flush(&self) -> Result<usize> {
        let mut inner = self.lock();
        let removed = inner.engine.clear()?;
        info!(removed, "Response cache flushed");
        Ok(removed)
    }

    // == Shrink ==
    /// Deletes the oldest items until the file is roughly `target_bytes`.
    ///
    /// The number of rows to delete is estimated from the average row size
    /// (file size divided by row count), so the size after shrinking is only
    /// approximately the target. Nothing happens when the target or the file
    /// is at or below the smallest possible SQLite file, or when the file is
    /// already within the target. Returns the number of items deleted.
    pub fn shrink(&self, target_bytes: i64) -> Result<usize> {
        if target_bytes < 0 {
            return Err(CacheError::InvalidArgument(format!(
                "Cannot shrink to a negative size: {}",
                target_bytes
            )));
        }
        let mut inner = self.lock();

        let file_size = i64::try_from(inner.engine.file_size_bytes()?).unwrap_or(i64::MAX);
        if target_bytes <= MIN_FILE_SIZE || file_size <= MIN_FILE_SIZE || file_size <= target_bytes
        {
            return Ok(0);
        }

        let rows = inner.engine.count_rows()?;
        if rows == 0 {
            return Ok(0);
        }
        let avg_row_bytes = (file_size as u64 / rows).max(1);
        let excess = (file_size - target_bytes) as u64;
        let rows_to_delete = excess.div_ceil(avg_row_bytes);
        if rows_to_delete == 0 {
            return Ok(0);
        }

        let removed = inner
            .engine
            .delete_oldest(usize::try_from(rows_to_delete).unwrap_or(usize::MAX))?;
        inner.stats.record_evictions(removed);
        let after = inner.engine.file_size_bytes()?;

        info!(
            removed,
            before = file_size,
            after,
            target = target_bytes,
            "Response cache shrunk"
        );
        Ok(removed)
    }

    /// Shrinks towards the configured size limit, if one is set.
    pub fn enforce_size_limit(&self) -> Result<usize> {
        if self.max_size_bytes > 0 {
            self.shrink(self.max_size_bytes)
        } else {
            Ok(0)
        }
    }

    // == Items ==
    /// Returns every item, oldest first.
    pub fn items(&self) -> Result<Vec<CacheItem>> {
        let inner = self.lock();
        inner.engine.entries_by_age()?.into_iter().map(to_item).collect()
    }

    // == Length ==
    /// Returns the current number of items.
    pub fn len(&self) -> Result<u64> {
        self.lock().engine.count_rows()
    }

    /// Returns true if the cache holds no items.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Size of the backing file in bytes.
    pub fn file_size(&self) -> Result<u64> {
        self.lock().engine.file_size_bytes()
    }

    // == Stats ==
    /// Returns counters since open plus the current row count and file size.
    pub fn stats(&self) -> Result<CacheStats> {
        let inner = self.lock();
        let mut stats = inner.stats.clone();
        stats.total_entries = inner.engine.count_rows()?;
        stats.file_size_bytes = inner.engine.file_size_bytes()?;
        Ok(stats)
    }

    // == Close ==
    /// Closes the backing connection. Dropping the store also closes it,
    /// but silently.
    pub fn close(self) -> Result<()> {
        let inner = self.inner.into_inner().unwrap_or_else(PoisonError::into_inner);
        inner.engine.close()
    }

    // Storage commits before the hook runs, so a lock poisoned by a panicking
    // hook still guards consistent state.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            warn!("eviction hook panicked, recovering cache lock");
            self.inner.clear_poison();
            poisoned.into_inner()
        })
    }

    fn notify(&self, item: &CacheItem, cause: EvictionCause) {
        if let Some(hook) = &self.hook {
            hook(item, cause);
        }
    }
}

impl fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheStore")
            .field("path", &self.path)
            .field("max_size_bytes", &self.max_size_bytes)
            .field("hook", &self.hook.is_some())
            .finish()
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(CacheError::empty_key());
    }
    Ok(())
}

fn to_item(raw: RawEntry) -> Result<CacheItem> {
    let creation_time = clock::from_ticks(raw.ticks).ok_or_else(|| CacheError::CorruptEntry {
        key: raw.key.clone(),
        reason: format!("creation time {} is out of range", raw.ticks),
    })?;
    Ok(CacheItem::with_creation_time(raw.key, raw.payload, creation_time))
}
