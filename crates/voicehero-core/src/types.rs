//! Shared time types and conversions

use chrono::{DateTime as ChronoDateTime, TimeZone, Utc};

/// Standard UTC DateTime type used across all VoiceHero crates.
///
/// Serializes as ISO 8601 with a `Z` suffix. Use
/// `#[schema(value_type = String, format = DateTime)]` on fields exposed
/// through utoipa.
pub type UtcDateTime = ChronoDateTime<Utc>;

/// Current wall-clock time as epoch milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Convert epoch milliseconds into a UTC datetime, `None` when out of chrono's range.
pub fn millis_to_datetime(millis: i64) -> Option<UtcDateTime> {
    Utc.timestamp_millis_opt(millis).single()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_millis_to_datetime() {
        let dt = millis_to_datetime(1_704_067_200_000).unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_now_millis_is_recent() {
        assert!(now_millis() > 1_704_067_200_000);
    }
}
