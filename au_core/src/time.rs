// ABOUTME: Utilities for working with times and timestamps.
// ABOUTME: Provides RFC3339 formatting, unix seconds and monotonic timers.
use ::time::{macros::format_description, OffsetDateTime};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Get the current system time
pub fn utc_now() -> SystemTime {
    SystemTime::now()
}

/// Convert a SystemTime to an RFC3339 timestamp string
///
/// # Examples
///
/// ```
/// use au_core::to_rfc3339;
/// use std::time::{Duration, UNIX_EPOCH};
///
/// let time = UNIX_EPOCH + Duration::from_secs(1_609_459_200);
/// assert_eq!(to_rfc3339(time), "2021-01-01T00:00:00.000000000Z");
/// ```
///
/// The fraction is always nine digits so stored values sort lexically.
pub fn to_rfc3339(time: SystemTime) -> String {
    let format = format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:9]Z"
    );
    OffsetDateTime::from(time)
        .format(format)
        .unwrap_or_default()
}

/// Current time as an RFC3339 string, the format stored in `*_at` text columns
pub fn now_iso8601() -> String {
    to_rfc3339(utc_now())
}

/// Current time as whole seconds since the unix epoch
///
/// Used for OTP expiry, where integer comparison in SQL is required.
pub fn unix_now() -> i64 {
    utc_now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

/// Monotonic duration measurer for logging call latencies
pub struct MonotonicTimer {
    start: Instant,
}

impl MonotonicTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

impl Default for MonotonicTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_rfc3339() {
        let time = UNIX_EPOCH + Duration::from_secs(1_609_459_200);
        assert_eq!(to_rfc3339(time), "2021-01-01T00:00:00.000000000Z");
    }

    #[test]
    fn test_timestamps_sort_lexically() {
        let base = UNIX_EPOCH + Duration::from_secs(1_700_000_005);
        let times = [
            base,
            base + Duration::from_millis(100),
            base + Duration::from_millis(120),
            base + Duration::from_millis(123),
            base + Duration::from_secs(1),
        ];
        let formatted: Vec<String> = times.iter().map(|t| to_rfc3339(*t)).collect();

        let mut sorted = formatted.clone();
        sorted.sort();
        assert_eq!(sorted, formatted);
        assert!(formatted.iter().all(|s| s.len() == formatted[0].len()));
    }

    #[test]
    fn test_unix_now_is_recent() {
        // after 2024-01-01
        assert!(unix_now() > 1_704_067_200);
    }

    #[test]
    fn test_monotonic_timer() {
        let timer = MonotonicTimer::new();
        std::thread::sleep(Duration::from_millis(1));
        assert!(timer.elapsed() >= Duration::from_millis(1));
        assert!(timer.elapsed() < Duration::from_secs(5));
    }
}
