//! Tick Clock Module
//!
//! Creation times are persisted as integer ticks: microseconds since the Unix
//! epoch, UTC. The creation time column carries a unique index, so ticks
//! handed out by the store must never repeat.

use chrono::{DateTime, Utc};

/// Converts a timestamp to storage ticks.
pub fn to_ticks(time: DateTime<Utc>) -> i64 {
    time.timestamp_micros()
}

/// Converts storage ticks back to a timestamp.
///
/// Returns None when the value lies outside chrono's representable range.
pub fn from_ticks(ticks: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_micros(ticks)
}

// == Tick Clock ==
/// Strictly increasing tick source.
///
/// Wall-clock microseconds are used while they move forward; when two stamps
/// land on the same microsecond (or the wall clock steps backwards) the last
/// issued tick plus one is used instead.
#[derive(Debug, Default)]
pub struct TickClock {
    last: i64,
}

impl TickClock {
    /// Creates a clock that will only issue ticks greater than `floor`.
    pub fn starting_after(floor: i64) -> Self {
        Self { last: floor }
    }

    /// Issues the next tick for the given wall-clock time.
    pub fn next(&mut self, now: DateTime<Utc>) -> i64 {
        let candidate = to_ticks(now);
        self.last = if candidate > self.last {
            candidate
        } else {
            self.last.saturating_add(1)
        };
        self.last
    }

    /// Issues the next tick for the current time.
    pub fn now(&mut self) -> i64 {
        self.next(Utc::now())
    }

    /// Records a tick written by someone else so later ticks stay above it.
    pub fn observe(&mut self, ticks: i64) {
        self.last = self.last.max(ticks);
    }
}
