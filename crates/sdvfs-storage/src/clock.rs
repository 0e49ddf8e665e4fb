//! Time helpers for the provider
//!
//! The engine keeps time as a Julian day number: days since noon UTC on
//! November 24, 4714 BC (proleptic Gregorian).

use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};

/// Julian day of 1970-01-01T00:00:00Z
pub const UNIX_EPOCH_JULIAN_DAY: f64 = 2_440_587.5;

/// [`UNIX_EPOCH_JULIAN_DAY`] in milliseconds
pub const UNIX_EPOCH_JULIAN_MILLIS: i64 = 210_866_760_000_000;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Convert a timestamp to a fractional Julian day
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn julian_day(at: DateTime<Utc>) -> f64 {
    let seconds = at.timestamp() as f64 + f64::from(at.timestamp_subsec_millis()) / 1000.0;
    seconds / SECONDS_PER_DAY + UNIX_EPOCH_JULIAN_DAY
}

/// Convert a timestamp to Julian day milliseconds
#[must_use]
pub fn julian_day_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis() + UNIX_EPOCH_JULIAN_MILLIS
}

/// Block for at least `duration` and return the time actually slept
pub fn sleep(duration: Duration) -> Duration {
    let started = Instant::now();
    std::thread::sleep(duration);
    started.elapsed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_unix_epoch() {
        let epoch = Utc.timestamp_opt(0, 0).unwrap();
        assert!((julian_day(epoch) - UNIX_EPOCH_JULIAN_DAY).abs() < f64::EPSILON);
        assert_eq!(julian_day_millis(epoch), UNIX_EPOCH_JULIAN_MILLIS);
    }

    #[test]
    fn test_known_date() {
        // 2000-01-01T12:00:00Z is the J2000 epoch, JD 2451545.0
        let j2000 = Utc.with_ymd_and_hms(2000, 1, 1, 12, 0, 0).unwrap();
        assert!((julian_day(j2000) - 2_451_545.0).abs() < 1e-9);
        assert_eq!(julian_day_millis(j2000), 2_451_545 * 86_400_000);
    }

    #[test]
    fn test_millis_constant_matches_day() {
        #[allow(clippy::cast_possible_truncation)]
        let from_days = (UNIX_EPOCH_JULIAN_DAY * 86_400_000.0) as i64;
        assert_eq!(from_days, UNIX_EPOCH_JULIAN_MILLIS);
    }

    #[test]
    fn test_sleep_reports_elapsed() {
        let requested = Duration::from_millis(5);
        assert!(sleep(requested) >= requested);
    }
}
