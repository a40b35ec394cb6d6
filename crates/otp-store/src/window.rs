//! Sliding-window counter over the issuance log.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;

/// At most `max_events` issuance records per phone number within the
/// trailing `length`, recomputed on every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SlidingWindow {
    pub max_events: u32,
    #[serde(with = "humantime_serde")]
    pub length: Duration,
}

impl SlidingWindow {
    pub fn new(max_events: u32, length: Duration) -> Self {
        Self { max_events, length }
    }

    /// Oldest timestamp still inside the window ending at `now` (inclusive).
    pub fn start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        chrono::Duration::from_std(self.length)
            .ok()
            .and_then(|length| now.checked_sub_signed(length))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Whether one more event fits given `recent` events already in the window.
    pub fn admits(&self, recent: u64) -> bool {
        recent < u64::from(self.max_events)
    }

    /// Window length in minutes, for user-facing messages. Configured
    /// windows are whole minutes.
    pub fn minutes(&self) -> u64 {
        self.length.as_secs() / 60
    }
}

impl Default for SlidingWindow {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(10 * 60))
    }
}
