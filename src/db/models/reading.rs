//! Reading data model.
//!
//! Represents one timestamped moisture measurement for a device. Rows are
//! immutable once written; compaction replaces aged raw rows with
//! downsampled ones but never edits a row in place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Storage tier of a persisted reading.
///
/// Raw rows are kept at full resolution inside the retention horizon;
/// beyond it the compactor replaces them with one mean-valued row per
/// bucket, flagged `Downsampled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetentionTier {
    Raw,
    Downsampled,
}

impl RetentionTier {
    pub fn as_i64(&self) -> i64 {
        match self {
            RetentionTier::Raw => 0,
            RetentionTier::Downsampled => 1,
        }
    }
}

/// One persisted moisture reading.
///
/// `value` is a percentage in `[0, 100]`; `None` marks a forecast-pending
/// row written by the external predictor before it has a value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reading {
    pub id: Option<i64>,
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
    pub value: Option<f64>,
    pub tier: RetentionTier,
}
