use std::collections::BTreeSet;

use crate::{error::StoreError, store::ReadingStore};

/// Read-through view over the device identifiers present in the store.
///
/// Deliberately holds no state of its own: the set is derived from the
/// persisted readings on every call, so it can never drift from what
/// the store actually contains. Devices appear on their first persisted
/// reading and are never removed.
#[derive(Clone)]
pub struct SensorRegistry {
    store: ReadingStore,
}

impl SensorRegistry {
    pub fn new(store: ReadingStore) -> Self {
        Self { store }
    }

    pub async fn known_devices(&self) -> Result<BTreeSet<String>, StoreError> {
        self.store.known_devices().await
    }

    pub async fn contains(&self, device_id: &str) -> Result<bool, StoreError> {
        Ok(self.known_devices().await?.contains(device_id))
    }
}
