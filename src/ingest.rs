use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{error::StoreError, store::ReadingStore};

/// Wire shape accepted from the transport layer for one reading.
///
/// `moisture_value` is a percentage in `[0, 100]`, or null for a
/// forecast-pending row. A missing timestamp means "stamp on receipt";
/// the external predictor supplies future timestamps through the same
/// shape and the store treats them like any other row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestRequest {
    pub device_id: String,
    pub moisture_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Validate and persist one inbound reading. `received_at` is the
/// transport's receipt instant, used when the request carries no
/// timestamp of its own.
pub async fn ingest_reading(
    store: &ReadingStore,
    request: IngestRequest,
    received_at: DateTime<Utc>,
) -> Result<(), StoreError> {
    let timestamp = request.timestamp.unwrap_or(received_at);
    store
        .append(&request.device_id, timestamp, request.moisture_value)
        .await
}
