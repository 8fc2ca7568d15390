//! Wall-clock time for message timestamps.
//!
//! Timestamps are always rendered in a fixed UTC-3 offset (Brasília time,
//! no daylight saving), independent of the host timezone. Production code
//! uses [`SystemClock`]; tests inject a [`FixedClock`].

use chrono::{DateTime, FixedOffset, Offset, SecondsFormat, Utc};
use std::fmt::Debug;

#[cfg(any(test, feature = "testing"))]
use std::sync::Mutex;

/// Offset west of UTC applied to every timestamp, in seconds.
pub const CHAT_UTC_OFFSET_WEST_SECS: i32 = 3 * 3600;

/// Returns the fixed UTC-3 offset used for chat timestamps.
pub fn chat_offset() -> FixedOffset {
    FixedOffset::west_opt(CHAT_UTC_OFFSET_WEST_SECS).unwrap_or(Utc.fix())
}

/// Formats a timestamp as ISO-8601 with millisecond precision,
/// e.g. `2026-10-18T09:30:00.000-03:00`.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.with_timezone(&chat_offset())
        .to_rfc3339_opts(SecondsFormat::Millis, false)
}

/// A time provider for message timestamps.
pub trait Clock: Send + Sync + Debug {
    /// Returns the current instant in UTC.
    fn now(&self) -> DateTime<Utc>;

    /// Returns the current instant formatted in the chat offset.
    fn timestamp(&self) -> String {
        format_timestamp(self.now())
    }
}

/// Production clock backed by [`chrono::Utc`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Test clock that only moves when told to.
#[cfg(any(test, feature = "testing"))]
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

#[cfg(any(test, feature = "testing"))]
impl FixedClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(at) }
    }

    /// Moves the clock forward by `by`.
    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

#[cfg(any(test, feature = "testing"))]
impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}
