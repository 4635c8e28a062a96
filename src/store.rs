use std::{collections::BTreeSet, path::PathBuf};

use chrono::{DateTime, Utc};
use log::debug;

use crate::{
    db::{Database, Reading, RetentionTier},
    error::StoreError,
    settings::StoreSettings,
};

/// Public facade over the durable reading set.
///
/// Open one per process and share clones; the handle is cheap to clone
/// and every clone talks to the same worker threads. Workers shut down
/// when the last clone is dropped (or `close` is called on it).
#[derive(Clone)]
pub struct ReadingStore {
    db: Database,
    settings: StoreSettings,
}

impl ReadingStore {
    pub fn open(db_path: PathBuf, settings: StoreSettings) -> Result<Self, StoreError> {
        let db = Database::open(db_path)?;
        Ok(Self { db, settings })
    }

    /// Durably persist one reading. Invalid input is rejected here and
    /// never reaches storage. Duplicate (device, timestamp) pairs are
    /// accepted as distinct rows.
    pub async fn append(
        &self,
        device_id: &str,
        timestamp: DateTime<Utc>,
        value: Option<f64>,
    ) -> Result<(), StoreError> {
        if let Some(v) = value {
            if !(0.0..=100.0).contains(&v) {
                return Err(StoreError::InvalidValue(v));
            }
        }

        let skew_limit = Utc::now() + self.settings.max_future_skew();
        if timestamp > skew_limit {
            return Err(StoreError::InvalidTimestamp {
                timestamp,
                reason: format!(
                    "more than {}h in the future",
                    self.settings.max_future_skew_hours
                ),
            });
        }

        self.db
            .insert_reading(&Reading {
                id: None,
                device_id: device_id.to_string(),
                timestamp,
                value,
                tier: RetentionTier::Raw,
            })
            .await?;

        debug!("Appended reading for {device_id} at {timestamp}");
        Ok(())
    }

    /// All readings for `device_id` with `start <= timestamp < end`,
    /// ascending by timestamp. Empty when none exist; never an error.
    pub async fn scan(
        &self,
        device_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Reading>, StoreError> {
        Ok(self.db.scan_readings(device_id, start, end).await?)
    }

    /// Distinct projection over stored readings. Derived, not authored:
    /// it cannot drift from the durable content.
    pub async fn known_devices(&self) -> Result<BTreeSet<String>, StoreError> {
        let devices = self.db.distinct_devices().await?;
        Ok(devices.into_iter().collect())
    }

    /// Explicit teardown. Worker threads stop once every clone of this
    /// handle is gone; dropping the last handle is equivalent.
    pub fn close(self) {
        drop(self);
    }

    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    pub(crate) fn database(&self) -> &Database {
        &self.db
    }
}
