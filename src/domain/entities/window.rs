//! Half-open time windows used to keep ledger queries within API limits.

use chrono::{DateTime, TimeZone, Utc};
use std::fmt;

pub const MILLIS_PER_HOUR: i64 = 60 * 60 * 1000;
pub const MILLIS_PER_DAY: i64 = 24 * MILLIS_PER_HOUR;

/// `[start_ms, end_ms)` in milliseconds since the Unix epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeWindow {
    pub start_ms: i64,
    pub end_ms: i64,
}

impl TimeWindow {
    pub fn new(start_ms: i64, end_ms: i64) -> Self {
        Self { start_ms, end_ms }
    }

    /// Window ending at `now_ms` and reaching `lookback_ms` into the past
    pub fn trailing(now_ms: i64, lookback_ms: i64) -> Self {
        Self::new(now_ms.saturating_sub(lookback_ms), now_ms)
    }

    pub fn is_empty(&self) -> bool {
        self.start_ms >= self.end_ms
    }

    pub fn contains(&self, ts_ms: i64) -> bool {
        ts_ms >= self.start_ms && ts_ms < self.end_ms
    }

    pub fn len_ms(&self) -> i64 {
        (self.end_ms - self.start_ms).max(0)
    }

    /// Last millisecond inside the window, for APIs with inclusive end bounds
    pub fn inclusive_end_ms(&self) -> i64 {
        self.end_ms - 1
    }

    /// Split `[start_ms, end_ms)` into consecutive windows of at most `span_ms`.
    ///
    /// Each window starts exactly where the previous one ended and the last one
    /// is clipped to `end_ms`. Returns an empty list for an empty range or a
    /// non-positive span.
    pub fn tile(start_ms: i64, end_ms: i64, span_ms: i64) -> Vec<TimeWindow> {
        let mut windows = Vec::new();
        if span_ms <= 0 {
            return windows;
        }

        let mut cursor = start_ms;
        while cursor < end_ms {
            let next = cursor.saturating_add(span_ms).min(end_ms);
            windows.push(TimeWindow::new(cursor, next));
            cursor = next;
        }
        windows
    }

    /// Tile this window into pieces of at most `span_ms`
    pub fn split(&self, span_ms: i64) -> Vec<TimeWindow> {
        Self::tile(self.start_ms, self.end_ms, span_ms)
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match (millis_to_utc(self.start_ms), millis_to_utc(self.end_ms)) {
            (Some(start), Some(end)) => write!(
                f,
                "[{}, {})",
                start.format("%Y-%m-%d %H:%M:%S"),
                end.format("%Y-%m-%d %H:%M:%S")
            ),
            _ => write!(f, "[{}, {})", self.start_ms, self.end_ms),
        }
    }
}

pub fn millis_to_utc(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}
