use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;

const HOUR_MS: i64 = 60 * 60 * 1000;

// headroom kept on stored counters past the end of their window
pub const EXPIRY_HEADROOM: Duration = Duration::from_secs(60);

/// The UTC hour a request is accounted against.
///
/// Keys are zero-padded `YYYY-MM-DD-HH`, so they compare lexically in
/// time order and change exactly at each hour boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HourWindow {
    pub key: String,
    pub reset_at: DateTime<Utc>,
}

impl HourWindow {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            key: now.format("%Y-%m-%d-%H").to_string(),
            reset_at: now + TimeDelta::milliseconds(millis_until_reset(now)),
        }
    }
}

// milliseconds left until the next UTC hour boundary, always in 1..=HOUR_MS
pub fn millis_until_reset(now: DateTime<Utc>) -> i64 {
    HOUR_MS - now.timestamp_millis().rem_euclid(HOUR_MS)
}

// TTL for a counter belonging to the window ending at `reset_at`
pub fn counter_ttl(reset_at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    let left_ms = (reset_at - now).num_milliseconds().max(0) as u64;
    Duration::from_secs(left_ms.div_ceil(1000)) + EXPIRY_HEADROOM
}
