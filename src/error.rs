use chrono::{DateTime, Utc};
use thiserror::Error;

/// Failures surfaced at the store's public boundary.
///
/// Validation failures are rejected synchronously and never reach storage.
/// `Unavailable` wraps any failure of the durable medium and is retryable;
/// a device with no history is not an error anywhere in this crate.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("moisture value {0} outside expected range 0..=100")]
    InvalidValue(f64),

    #[error("timestamp {timestamp} rejected: {reason}")]
    InvalidTimestamp {
        timestamp: DateTime<Utc>,
        reason: String,
    },

    #[error("store unavailable: {0}")]
    Unavailable(#[from] anyhow::Error),
}

impl StoreError {
    /// Whether the caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}
