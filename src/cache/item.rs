//! Cache Item Module
//!
//! Defines the value stored under each key together with its creation time,
//! and the max-age rules used to decide whether an item is still fresh.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::error::{CacheError, Result};

// == Cache Item ==
/// A cached response: the key it was requested under, the opaque payload,
/// and the time it was created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheItem {
    key: String,
    payload: String,
    creation_time: DateTime<Utc>,
}

impl CacheItem {
    // == Constructor ==
    /// Creates an item stamped with the current time.
    pub fn new(key: impl Into<String>, payload: impl Into<String>) -> Self {
        Self::with_creation_time(key, payload, Utc::now())
    }

    /// Creates an item with an explicit creation time.
    pub fn with_creation_time(
        key: impl Into<String>,
        payload: impl Into<String>,
        creation_time: DateTime<Utc>,
    ) -> Self {
        Self {
            key: key.into(),
            payload: payload.into(),
            creation_time,
        }
    }

    /// Key the item was stored under.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Opaque payload, usually a serialized response body.
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// When the item was written.
    pub fn creation_time(&self) -> DateTime<Utc> {
        self.creation_time
    }

    /// Consumes the item and returns its payload.
    pub fn into_payload(self) -> String {
        self.payload
    }

    /// Time elapsed since the item was created.
    pub fn age(&self) -> Duration {
        Utc::now() - self.creation_time
    }

    // == Is Expired ==
    /// Checks the item against a max age.
    ///
    /// An item is expired once its age is strictly greater than the max age,
    /// so an item exactly `max_age` old is still fresh.
    pub fn is_expired(&self, max_age: MaxAge) -> bool {
        self.is_expired_at(max_age, Utc::now())
    }

    pub(crate) fn is_expired_at(&self, max_age: MaxAge, now: DateTime<Utc>) -> bool {
        match max_age {
            MaxAge::AlwaysExpired => true,
            MaxAge::Never => false,
            MaxAge::After(limit) => now - self.creation_time > limit,
        }
    }
}

// == Max Age ==
/// How old an item may be before a lookup treats it as stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxAge {
    /// Every item is stale regardless of age
    AlwaysExpired,
    /// No item ever goes stale
    Never,
    /// Items older than the duration are stale; the duration must be positive
    After(Duration),
}

impl MaxAge {
    /// Builds a bounded max age, rejecting zero and negative durations.
    pub fn after(limit: Duration) -> Result<Self> {
        let max_age = MaxAge::After(limit);
        max_age.validate()?;
        Ok(max_age)
    }

    /// Max age in whole seconds.
    pub fn seconds(secs: i64) -> Result<Self> {
        Duration::try_seconds(secs)
            .ok_or_else(|| {
                CacheError::InvalidArgument(format!("Max age of {} seconds is out of range", secs))
            })
            .and_then(Self::after)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        match self {
            MaxAge::After(limit) if *limit <= Duration::zero() => {
                Err(CacheError::InvalidArgument(format!(
                    "Max age must be positive, got {}",
                    limit
                )))
            }
            _ => Ok(()),
        }
    }
}

impl From<std::time::Duration> for MaxAge {
    /// Zero maps to `AlwaysExpired`; values too large for chrono map to `Never`.
    fn from(limit: std::time::Duration) -> Self {
        if limit.is_zero() {
            return MaxAge::AlwaysExpired;
        }
        Duration::from_std(limit)
            .map(MaxAge::After)
            .unwrap_or(MaxAge::Never)
    }
}

// == Eviction Cause ==
/// Why an item left the cache, passed to the eviction hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionCause {
    /// Overwritten by a newer `set` on the same key
    Replaced,
    /// Removed by `set` with no item
    Removed,
    /// Removed by a lookup that found it stale
    Expired,
}
