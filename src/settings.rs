use std::{fs, path::Path};

use anyhow::{Context, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Raw granularity must survive for the windows that require it
/// (`last_hour`, `last_12h`), so the retention horizon never drops
/// below this.
const MIN_HORIZON_HOURS: i64 = 12;

/// Tunables for retention and ingestion validation, loaded from a JSON
/// file next to the database. Missing file or unreadable contents fall
/// back to defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Age beyond which raw readings are downsampled.
    pub retention_horizon_hours: i64,
    /// Downsampling bucket width.
    pub compaction_bucket_minutes: i64,
    /// Pause between compaction passes.
    pub compaction_interval_secs: u64,
    /// How far into the future a (forecast) timestamp may point before
    /// ingestion rejects it.
    pub max_future_skew_hours: i64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            retention_horizon_hours: 24 * 7,
            compaction_bucket_minutes: 15,
            compaction_interval_secs: 3600,
            max_future_skew_hours: 24 * 30,
        }
    }
}

impl StoreSettings {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        Ok(serde_json::from_str(&contents).unwrap_or_default())
    }

    pub fn persist(&self, path: &Path) -> Result<()> {
        let serialized = serde_json::to_string_pretty(self)?;
        fs::write(path, serialized)
            .with_context(|| format!("Failed to write settings to {}", path.display()))
    }

    pub fn retention_horizon(&self) -> Duration {
        Duration::hours(self.retention_horizon_hours.max(MIN_HORIZON_HOURS))
    }

    pub fn compaction_bucket(&self) -> Duration {
        Duration::minutes(self.compaction_bucket_minutes.max(1))
    }

    pub fn compaction_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.compaction_interval_secs.max(1))
    }

    pub fn max_future_skew(&self) -> Duration {
        Duration::hours(self.max_future_skew_hours.max(1))
    }
}
