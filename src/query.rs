use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{db::Reading, error::StoreError, store::ReadingStore};

/// Time range selecting readings for display: one of the five named
/// dashboard windows, or an explicit `[start, end)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum WindowSpec {
    #[serde(rename = "last_hour")]
    LastHour,
    #[serde(rename = "last_12h")]
    Last12h,
    #[serde(rename = "last_24h")]
    Last24h,
    #[serde(rename = "last_7d")]
    Last7d,
    #[serde(rename = "next_12h")]
    Next12h,
    #[serde(rename = "range")]
    Range {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

impl WindowSpec {
    /// Scan bounds for this window against the injected query instant.
    /// Bounds are start-inclusive, end-exclusive. The query instant
    /// itself belongs to the past windows, so their exclusive end sits
    /// one tick past `now`; `next_12h` starts at `now` inclusive.
    pub fn resolve(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let just_after_now = now + Duration::nanoseconds(1);
        match *self {
            WindowSpec::LastHour => (now - Duration::hours(1), just_after_now),
            WindowSpec::Last12h => (now - Duration::hours(12), just_after_now),
            WindowSpec::Last24h => (now - Duration::hours(24), just_after_now),
            WindowSpec::Last7d => (now - Duration::days(7), just_after_now),
            WindowSpec::Next12h => (now, now + Duration::hours(12)),
            WindowSpec::Range { start, end } => (start, end),
        }
    }

    /// Whether the window requires raw-granularity rows. Used to pick
    /// the compaction floor, not evaluated per query.
    pub fn requires_raw(&self) -> bool {
        matches!(self, WindowSpec::LastHour | WindowSpec::Last12h)
    }
}

/// One point of a served series. `value` is null for a
/// missing/forecast-pending reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub timestamp: DateTime<Utc>,
    pub value: Option<f64>,
}

impl From<Reading> for SeriesPoint {
    fn from(reading: Reading) -> Self {
        Self {
            timestamp: reading.timestamp,
            value: reading.value,
        }
    }
}

/// Compact readout served next to the graphs: the latest reading and
/// the reading from roughly an hour earlier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub hour_ago: Option<SeriesPoint>,
    pub current: Option<SeriesPoint>,
}

/// How far before `now − 1h` the hour-ago summary may reach for a
/// nearest-before reading before reporting absence.
fn hour_ago_tolerance() -> Duration {
    Duration::hours(1)
}

/// Translates window specs into bounded scans over the reading store.
///
/// `now` is injected by the caller rather than read from a wall clock,
/// so every query is reproducible under test. A device with no readings
/// in range yields an empty series; that is a valid result, distinct
/// from a store failure.
#[derive(Clone)]
pub struct QueryEngine {
    store: ReadingStore,
}

impl QueryEngine {
    pub fn new(store: ReadingStore) -> Self {
        Self { store }
    }

    /// Ordered series for the window, ascending by timestamp.
    pub async fn series(
        &self,
        device_id: &str,
        window: WindowSpec,
        now: DateTime<Utc>,
    ) -> Result<Vec<SeriesPoint>, StoreError> {
        let (start, end) = window.resolve(now);
        if end <= start {
            return Ok(Vec::new());
        }

        let readings = self.store.scan(device_id, start, end).await?;
        Ok(readings.into_iter().map(SeriesPoint::from).collect())
    }

    /// Per-bucket mean series for the window, for graph rendering
    /// (hourly buckets for the 12h/24h graphs, daily for 7d). Only
    /// buckets containing data appear.
    pub async fn series_bucketed(
        &self,
        device_id: &str,
        window: WindowSpec,
        bucket: Duration,
        now: DateTime<Utc>,
    ) -> Result<Vec<SeriesPoint>, StoreError> {
        let (start, end) = window.resolve(now);
        let bucket_secs = bucket.num_seconds();
        if end <= start || bucket_secs <= 0 {
            return Ok(Vec::new());
        }

        let buckets = self
            .store
            .database()
            .bucketed_means(device_id, start, end, bucket_secs)
            .await?;
        Ok(buckets
            .into_iter()
            .map(|(timestamp, value)| SeriesPoint { timestamp, value })
            .collect())
    }

    /// The reading with the greatest timestamp at or before `now`, or
    /// `None` when the device has no history there. Never zero-filled.
    pub async fn current(
        &self,
        device_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<SeriesPoint>, StoreError> {
        let reading = self
            .store
            .database()
            .latest_at_or_before(device_id, now)
            .await?;
        Ok(reading.map(SeriesPoint::from))
    }

    /// Nearest reading at or before `now − 1h`, accepted only within
    /// one tolerance interval of that offset; absent on a miss. One
    /// coherent nearest-before policy for every summary.
    pub async fn hour_ago(
        &self,
        device_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<SeriesPoint>, StoreError> {
        let offset = now - Duration::hours(1);
        let reading = self
            .store
            .database()
            .latest_at_or_before(device_id, offset)
            .await?;

        Ok(reading
            .filter(|r| r.timestamp > offset - hour_ago_tolerance())
            .map(SeriesPoint::from))
    }

    /// The compact readout the dashboard shows beside the graphs.
    pub async fn snapshot(
        &self,
        device_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Snapshot, StoreError> {
        Ok(Snapshot {
            hour_ago: self.hour_ago(device_id, now).await?,
            current: self.current(device_id, now).await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()
    }

    fn in_window(window: WindowSpec, at: DateTime<Utc>) -> bool {
        let (start, end) = window.resolve(now());
        start <= at && at < end
    }

    #[test]
    fn past_windows_include_both_boundaries() {
        assert!(in_window(WindowSpec::LastHour, now()));
        assert!(in_window(WindowSpec::LastHour, now() - Duration::hours(1)));
        assert!(!in_window(
            WindowSpec::LastHour,
            now() - Duration::hours(1) - Duration::seconds(1)
        ));
        assert!(!in_window(WindowSpec::LastHour, now() + Duration::seconds(1)));
    }

    #[test]
    fn named_spans_match_their_names() {
        assert!(in_window(WindowSpec::Last12h, now() - Duration::hours(12)));
        assert!(!in_window(
            WindowSpec::Last12h,
            now() - Duration::hours(12) - Duration::seconds(1)
        ));
        assert!(in_window(WindowSpec::Last24h, now() - Duration::hours(24)));
        assert!(in_window(WindowSpec::Last7d, now() - Duration::days(7)));
        assert!(!in_window(
            WindowSpec::Last7d,
            now() - Duration::days(7) - Duration::seconds(1)
        ));
    }

    #[test]
    fn forecast_window_is_start_inclusive_end_exclusive() {
        assert!(in_window(WindowSpec::Next12h, now()));
        assert!(in_window(
            WindowSpec::Next12h,
            now() + Duration::hours(12) - Duration::seconds(1)
        ));
        assert!(!in_window(WindowSpec::Next12h, now() + Duration::hours(12)));
    }

    #[test]
    fn explicit_range_is_half_open() {
        let start = now();
        let end = now() + Duration::hours(2);
        let window = WindowSpec::Range { start, end };
        assert!(in_window(window, start));
        assert!(!in_window(window, end));
    }

    #[test]
    fn named_windows_serialize_as_snake_case_strings() {
        assert_eq!(
            serde_json::to_string(&WindowSpec::Last12h).unwrap(),
            "\"last_12h\""
        );
        assert_eq!(
            serde_json::from_str::<WindowSpec>("\"next_12h\"").unwrap(),
            WindowSpec::Next12h
        );
    }

    #[test]
    fn raw_granularity_windows_are_the_short_ones() {
        assert!(WindowSpec::LastHour.requires_raw());
        assert!(WindowSpec::Last12h.requires_raw());
        assert!(!WindowSpec::Last7d.requires_raw());
        assert!(!WindowSpec::Next12h.requires_raw());
    }
}
