use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};

use crate::db::models::RetentionTier;

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

pub fn parse_tier(value: i64) -> Result<RetentionTier> {
    match value {
        0 => Ok(RetentionTier::Raw),
        1 => Ok(RetentionTier::Downsampled),
        other => Err(anyhow!("unknown retention tier {other}")),
    }
}

/// Timestamps persist as RFC 3339 UTC text, which compares correctly as
/// text for range scans (constant `+00:00` offset; a fractional-seconds
/// `.` sorts above the `+` of the zone suffix at equal whole seconds).
pub fn format_datetime(value: DateTime<Utc>) -> String {
    value.to_rfc3339()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn datetime_round_trips_through_text() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap();
        let parsed = parse_datetime(&format_datetime(ts), "timestamp").unwrap();
        assert_eq!(parsed, ts);
    }

    #[test]
    fn text_ordering_matches_instant_ordering() {
        let base = Utc.with_ymd_and_hms(2026, 3, 14, 9, 0, 0).unwrap();
        let later = base + chrono::Duration::microseconds(1);
        assert!(format_datetime(base) < format_datetime(later));
    }

    #[test]
    fn tier_rejects_unknown_values() {
        assert!(parse_tier(2).is_err());
    }
}
