use std::collections::BTreeMap;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use serde::Serialize;

use crate::db::{
    helpers::{format_datetime, parse_datetime, parse_tier},
    models::{Reading, RetentionTier},
    Database,
};

/// Outcome of one compaction pass, for logging.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CompactionStats {
    pub rows_removed: u64,
    pub buckets_written: u64,
    pub devices_touched: u64,
}

impl Database {
    /// Persist one reading. Durable once this resolves: the writer thread
    /// commits before replying.
    pub async fn insert_reading(&self, reading: &Reading) -> Result<()> {
        let record = reading.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO readings (device_id, timestamp, value, tier)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    record.device_id,
                    format_datetime(record.timestamp),
                    record.value,
                    record.tier.as_i64(),
                ],
            )
            .with_context(|| "failed to insert reading")?;
            Ok(())
        })
        .await
    }

    /// All readings for a device with `start <= timestamp < end`, ascending.
    /// Ties on timestamp keep insertion order (rowid).
    pub async fn scan_readings(
        &self,
        device_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Reading>> {
        let device_id = device_id.to_string();
        self.execute_read(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, device_id, timestamp, value, tier
                 FROM readings
                 WHERE device_id = ?1 AND timestamp >= ?2 AND timestamp < ?3
                 ORDER BY timestamp ASC, id ASC",
            )?;

            let mut rows = stmt.query(params![
                device_id,
                format_datetime(start),
                format_datetime(end),
            ])?;

            let mut readings = Vec::new();
            while let Some(row) = rows.next()? {
                readings.push(reading_from_row(row)?);
            }

            Ok(readings)
        })
        .await
    }

    /// Distinct device identifiers, derived straight from stored rows.
    pub async fn distinct_devices(&self) -> Result<Vec<String>> {
        self.execute_read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT device_id FROM readings ORDER BY device_id ASC",
            )?;

            let mut rows = stmt.query([])?;
            let mut devices = Vec::new();
            while let Some(row) = rows.next()? {
                devices.push(row.get::<_, String>(0)?);
            }

            Ok(devices)
        })
        .await
    }

    /// The reading with the greatest timestamp at or before `instant`,
    /// if any. Ties on timestamp resolve to the latest-inserted row.
    pub async fn latest_at_or_before(
        &self,
        device_id: &str,
        instant: DateTime<Utc>,
    ) -> Result<Option<Reading>> {
        let device_id = device_id.to_string();
        self.execute_read(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, device_id, timestamp, value, tier
                 FROM readings
                 WHERE device_id = ?1 AND timestamp <= ?2
                 ORDER BY timestamp DESC, id DESC
                 LIMIT 1",
            )?;

            let mut rows = stmt.query(params![device_id, format_datetime(instant)])?;
            match rows.next()? {
                Some(row) => Ok(Some(reading_from_row(row)?)),
                None => Ok(None),
            }
        })
        .await
    }

    /// Per-bucket mean values over `[start, end)`, ascending by bucket
    /// start. Only buckets that contain at least one row appear.
    pub async fn bucketed_means(
        &self,
        device_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        bucket_secs: i64,
    ) -> Result<Vec<(DateTime<Utc>, Option<f64>)>> {
        let device_id = device_id.to_string();
        self.execute_read(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT timestamp, value
                 FROM readings
                 WHERE device_id = ?1 AND timestamp >= ?2 AND timestamp < ?3
                 ORDER BY timestamp ASC",
            )?;

            let mut rows = stmt.query(params![
                device_id,
                format_datetime(start),
                format_datetime(end),
            ])?;

            let mut points = Vec::new();
            while let Some(row) = rows.next()? {
                let timestamp = parse_datetime(&row.get::<_, String>(0)?, "timestamp")?;
                let value: Option<f64> = row.get(1)?;
                points.push((timestamp, value));
            }

            Ok(aggregate_buckets(&points, bucket_secs))
        })
        .await
    }

    /// Replace raw rows older than `cutoff` with one mean-valued row per
    /// bucket, in a single transaction. Readers on the WAL snapshot see
    /// the pass fully applied or not at all; a failure rolls back and the
    /// next scheduled pass retries.
    ///
    /// The cutoff is floored to a bucket boundary before anything is
    /// touched: a bucket straddling the cutoff would otherwise be
    /// downsampled in two installments across successive passes, leaving
    /// two rows at one bucket start. Rows in the straddling bucket stay
    /// raw until the whole bucket has aged past the cutoff.
    pub async fn compact_before(
        &self,
        cutoff: DateTime<Utc>,
        bucket_secs: i64,
    ) -> Result<CompactionStats> {
        let cutoff = DateTime::<Utc>::from_timestamp(bucket_floor(cutoff, bucket_secs), 0)
            .ok_or_else(|| anyhow!("compaction cutoff out of representable range"))?;
        self.execute(move |conn| {
            let tx = conn
                .transaction()
                .context("failed to open compaction transaction")?;

            let mut per_device: BTreeMap<String, Vec<(DateTime<Utc>, Option<f64>)>> =
                BTreeMap::new();
            {
                let mut stmt = tx.prepare(
                    "SELECT device_id, timestamp, value
                     FROM readings
                     WHERE tier = 0 AND timestamp < ?1
                     ORDER BY device_id ASC, timestamp ASC",
                )?;

                let mut rows = stmt.query(params![format_datetime(cutoff)])?;
                while let Some(row) = rows.next()? {
                    let device_id: String = row.get(0)?;
                    let timestamp = parse_datetime(&row.get::<_, String>(1)?, "timestamp")?;
                    let value: Option<f64> = row.get(2)?;
                    per_device
                        .entry(device_id)
                        .or_default()
                        .push((timestamp, value));
                }
            }

            if per_device.is_empty() {
                return Ok(CompactionStats::default());
            }

            let rows_removed = tx.execute(
                "DELETE FROM readings WHERE tier = 0 AND timestamp < ?1",
                params![format_datetime(cutoff)],
            )? as u64;

            let mut stats = CompactionStats {
                rows_removed,
                buckets_written: 0,
                devices_touched: per_device.len() as u64,
            };

            {
                let mut insert = tx.prepare(
                    "INSERT INTO readings (device_id, timestamp, value, tier)
                     VALUES (?1, ?2, ?3, ?4)",
                )?;

                for (device_id, points) in &per_device {
                    for (bucket_start, mean) in aggregate_buckets(points, bucket_secs) {
                        insert.execute(params![
                            device_id,
                            format_datetime(bucket_start),
                            mean,
                            RetentionTier::Downsampled.as_i64(),
                        ])?;
                        stats.buckets_written += 1;
                    }
                }
            }

            tx.commit().context("failed to commit compaction pass")?;
            Ok(stats)
        })
        .await
    }
}

fn reading_from_row(row: &Row<'_>) -> Result<Reading> {
    Ok(Reading {
        id: row.get::<_, Option<i64>>(0)?,
        device_id: row.get::<_, String>(1)?,
        timestamp: parse_datetime(&row.get::<_, String>(2)?, "timestamp")?,
        value: row.get::<_, Option<f64>>(3)?,
        tier: parse_tier(row.get::<_, i64>(4)?)?,
    })
}

fn bucket_floor(timestamp: DateTime<Utc>, bucket_secs: i64) -> i64 {
    timestamp.timestamp().div_euclid(bucket_secs) * bucket_secs
}

/// Mean per epoch-aligned bucket, null values excluded from the mean.
/// A bucket containing only null rows keeps a null value so forecast
/// placeholders survive aggregation.
fn aggregate_buckets(
    points: &[(DateTime<Utc>, Option<f64>)],
    bucket_secs: i64,
) -> Vec<(DateTime<Utc>, Option<f64>)> {
    let mut buckets: BTreeMap<i64, (f64, u64)> = BTreeMap::new();
    for (timestamp, value) in points {
        let entry = buckets.entry(bucket_floor(*timestamp, bucket_secs)).or_insert((0.0, 0));
        if let Some(value) = value {
            entry.0 += value;
            entry.1 += 1;
        }
    }

    buckets
        .into_iter()
        .filter_map(|(bucket, (sum, count))| {
            let start = DateTime::<Utc>::from_timestamp(bucket, 0)?;
            let mean = (count > 0).then(|| sum / count as f64);
            Some((start, mean))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(minute: u32, second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 5, 10, minute, second).unwrap()
    }

    #[test]
    fn buckets_align_to_epoch_boundaries() {
        let bucket = 900;
        assert_eq!(bucket_floor(at(0, 0), bucket) % bucket, 0);
        assert_eq!(bucket_floor(at(14, 59), bucket), bucket_floor(at(0, 0), bucket));
        assert_ne!(bucket_floor(at(15, 0), bucket), bucket_floor(at(0, 0), bucket));
    }

    #[test]
    fn bucket_mean_skips_null_values() {
        let points = vec![
            (at(1, 0), Some(40.0)),
            (at(2, 0), None),
            (at(3, 0), Some(44.0)),
        ];
        let out = aggregate_buckets(&points, 900);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].1, Some(42.0));
    }

    #[test]
    fn all_null_bucket_stays_null() {
        let points = vec![(at(1, 0), None), (at(2, 0), None)];
        let out = aggregate_buckets(&points, 900);
        assert_eq!(out, vec![(out[0].0, None)]);
    }

    #[test]
    fn distinct_buckets_stay_separate() {
        let points = vec![(at(1, 0), Some(10.0)), (at(16, 0), Some(20.0))];
        let out = aggregate_buckets(&points, 900);
        assert_eq!(out.len(), 2);
        assert!(out[0].0 < out[1].0);
    }
}
