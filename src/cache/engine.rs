//! Storage Engine Module
//!
//! Owns the SQLite file behind a cache: schema creation, raw row access,
//! oldest-first deletion and compaction. It knows nothing about expiry or
//! notifications; callers learn only whether a row was found or removed.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

use crate::error::{CacheError, Result};

const CREATE_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS ResponseCache (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        creationTime INTEGER NOT NULL
    );
    CREATE UNIQUE INDEX IF NOT EXISTS ResponseCacheCreationTime
        ON ResponseCache (creationTime);
";

const UPSERT: &str = "
    INSERT INTO ResponseCache (key, value, creationTime) VALUES (?1, ?2, ?3)
    ON CONFLICT(key) DO UPDATE SET
        value = excluded.value,
        creationTime = excluded.creationTime
";

const DELETE_OLDEST: &str = "
    DELETE FROM ResponseCache WHERE rowid IN (
        SELECT rowid FROM ResponseCache
        ORDER BY creationTime ASC, rowid ASC
        LIMIT ?1
    )
";

// == Raw Entry ==
/// A row as stored on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    pub key: String,
    pub payload: String,
    /// Creation time in microseconds since the Unix epoch
    pub ticks: i64,
}

impl RawEntry {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            key: row.get(0)?,
            payload: row.get(1)?,
            ticks: row.get(2)?,
        })
    }
}

// == Storage Engine ==
/// Durable key-value persistence over a single SQLite connection.
///
/// `rusqlite::Connection` is `Send` but not `Sync`; writers take `&mut self`
/// and the owning store serializes access.
#[derive(Debug)]
pub struct StorageEngine {
    conn: Connection,
    path: PathBuf,
}

impl StorageEngine {
    // == Open ==
    /// Opens or creates the database file and makes sure the schema exists.
    ///
    /// Safe to call on a populated file: existing rows are left untouched.
    /// A file that is not a SQLite database fails here instead of being
    /// replaced, so the caller decides whether to delete it.
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path)?;
        conn.busy_timeout(busy_timeout)?;

        // auto_vacuum can only be switched on before the first table exists (1 = FULL)
        let page_count: i64 = conn.query_row("PRAGMA page_count", [], |row| row.get(0))?;
        let fresh = page_count == 0;
        if fresh {
            conn.pragma_update(None, "auto_vacuum", 1)?;
        }
        conn.execute_batch(CREATE_SCHEMA)?;

        debug!(path = %path.display(), fresh, "storage opened");
        Ok(Self { conn, path })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    // == Get Raw ==
    /// Exact lookup by key.
    pub fn get_raw(&self, key: &str) -> Result<Option<RawEntry>> {
        let entry = self
            .conn
            .prepare_cached("SELECT key, value, creationTime FROM ResponseCache WHERE key = ?1")?
            .query_row(params![key], RawEntry::from_row)
            .optional()?;
        Ok(entry)
    }

    // == Put Raw ==
    /// Inserts or replaces the row for `key`.
    ///
    /// When another key already owns `ticks`, the tick is moved forward one
    /// microsecond at a time until it is free. Returns the tick actually
    /// stored.
    pub fn put_raw(&mut self, key: &str, payload: &str, ticks: i64) -> Result<i64> {
        let tx = self.conn.transaction()?;
        let mut stored = ticks;
        {
            let mut taken = tx.prepare_cached(
                "SELECT 1 FROM ResponseCache WHERE creationTime = ?1 AND key <> ?2",
            )?;
            while taken.exists(params![stored, key])? {
                stored = stored.checked_add(1).ok_or_else(|| CacheError::CorruptEntry {
                    key: key.to_string(),
                    reason: "no free creation time after requested tick".to_string(),
                })?;
            }
        }
        tx.execute(UPSERT, params![key, payload, stored])?;
        tx.commit()?;

        if stored != ticks {
            debug!(key, requested = ticks, stored, "creation time collision resolved");
        }
        Ok(stored)
    }

    // == Delete Raw ==
    /// Deletes the row for `key`, returning whether one existed.
    pub fn delete_raw(&self, key: &str) -> Result<bool> {
        let removed = self
            .conn
            .prepare_cached("DELETE FROM ResponseCache WHERE key = ?1")?
            .execute(params![key])?;
        Ok(removed > 0)
    }

    /// Number of rows in the table.
    pub fn count_rows(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM ResponseCache", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    /// Size of the backing file in bytes.
    pub fn file_size_bytes(&self) -> Result<u64> {
        Ok(fs::metadata(&self.path)?.len())
    }

    /// Newest creation time in the table, if any row exists.
    pub fn max_ticks(&self) -> Result<Option<i64>> {
        let ticks = self.conn.query_row(
            "SELECT MAX(creationTime) FROM ResponseCache",
            [],
            |row| row.get(0),
        )?;
        Ok(ticks)
    }

    /// Every row, oldest first.
    pub fn entries_by_age(&self) -> Result<Vec<RawEntry>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT key, value, creationTime FROM ResponseCache ORDER BY creationTime ASC, rowid ASC",
        )?;
        let entries = stmt
            .query_map([], RawEntry::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    // == Delete Oldest ==
    /// Deletes the `n` rows with the smallest creation time, then compacts.
    ///
    /// Returns the number of rows deleted.
    pub fn delete_oldest(&mut self, n: usize) -> Result<usize> {
        if n == 0 {
            return Ok(0);
        }
        let limit = i64::try_from(n).unwrap_or(i64::MAX);

        let tx = self.conn.transaction()?;
        let removed = tx.execute(DELETE_OLDEST, params![limit])?;
        tx.commit()?;

        self.compact()?;
        Ok(removed)
    }

    // == Clear ==
    /// Deletes every row, then compacts. Returns the number of rows deleted.
    pub fn clear(&mut self) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let removed = tx.execute("DELETE FROM ResponseCache", [])?;
        tx.commit()?;

        self.compact()?;
        Ok(removed)
    }

    /// Rebuilds the file so its size reflects the rows that remain.
    fn compact(&self) -> Result<()> {
        self.conn.execute_batch("VACUUM")?;
        Ok(())
    }

    // == Close ==
    /// Closes the connection, surfacing any error the drop path would hide.
    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, err)| CacheError::Storage(err))
    }
}
