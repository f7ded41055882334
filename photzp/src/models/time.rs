use chrono::{DateTime, Duration, Utc};

/// Number of days used to express decay slopes "per month".
pub const DAYS_PER_MONTH: f64 = 30.0;

const SECONDS_PER_DAY: i64 = 86_400;

/// Start of the observing night that contains `timestamp`.
///
/// Nights are split at a fixed hour of the UTC day: a measurement taken
/// before `split_hour` belongs to the night that started on the previous
/// calendar day. No sunset/sunrise awareness.
pub fn night_start(timestamp: DateTime<Utc>, split_hour: u32) -> DateTime<Utc> {
    let split = i64::from(split_hour.min(23)) * 3600;
    let shifted = timestamp.timestamp() - split;
    let day = shifted.div_euclid(SECONDS_PER_DAY);
    DateTime::UNIX_EPOCH + Duration::seconds(day * SECONDS_PER_DAY + split)
}

/// Fractional days since 1970-01-01 00:00:00 UTC.
pub fn days_since_epoch(timestamp: DateTime<Utc>) -> f64 {
    (timestamp.timestamp() as f64 + timestamp.timestamp_subsec_nanos() as f64 / 1e9)
        / SECONDS_PER_DAY as f64
}

/// Inverse of [`days_since_epoch`], to the millisecond.
pub fn from_days_since_epoch(days: f64) -> DateTime<Utc> {
    let millis = (days * SECONDS_PER_DAY as f64 * 1000.0).round() as i64;
    DateTime::UNIX_EPOCH + Duration::milliseconds(millis)
}

#[cfg(test)]
#[path = "time_tests.rs"]
mod time_tests;
