use chrono::{DateTime, Duration, TimeZone, Utc};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

use soilstore::{ReadingStore, RetentionTier, SensorRegistry, StoreError, StoreSettings};

fn test_store() -> (TempDir, ReadingStore) {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = TempDir::new().expect("tempdir");
    let store = ReadingStore::open(
        dir.path().join("soilstore.sqlite3"),
        StoreSettings::default(),
    )
    .expect("open store");
    (dir, store)
}

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()
}

#[tokio::test]
async fn append_then_scan_returns_the_reading_exactly_once() {
    let (_dir, store) = test_store();
    let ts = base();

    store.append("sensor1", ts, Some(42.0)).await.unwrap();

    let readings = store
        .scan("sensor1", ts - Duration::minutes(5), ts + Duration::minutes(5))
        .await
        .unwrap();
    assert_eq!(readings.len(), 1);
    assert_eq!(readings[0].device_id, "sensor1");
    assert_eq!(readings[0].timestamp, ts);
    assert_eq!(readings[0].value, Some(42.0));
    assert_eq!(readings[0].tier, RetentionTier::Raw);
}

#[tokio::test]
async fn scan_is_start_inclusive_end_exclusive() {
    let (_dir, store) = test_store();
    let start = base();
    let end = start + Duration::hours(1);

    store.append("sensor1", start, Some(10.0)).await.unwrap();
    store.append("sensor1", end, Some(20.0)).await.unwrap();
    store
        .append("sensor1", start - Duration::seconds(1), Some(30.0))
        .await
        .unwrap();

    let readings = store.scan("sensor1", start, end).await.unwrap();
    assert_eq!(readings.len(), 1);
    assert_eq!(readings[0].value, Some(10.0));
}

#[tokio::test]
async fn duplicate_appends_each_keep_a_distinct_row() {
    let (_dir, store) = test_store();
    let ts = base();

    for _ in 0..3 {
        store.append("sensor1", ts, Some(42.0)).await.unwrap();
    }

    let readings = store
        .scan("sensor1", ts, ts + Duration::seconds(1))
        .await
        .unwrap();
    assert_eq!(readings.len(), 3);
}

#[tokio::test]
async fn appends_to_one_device_do_not_leak_into_another() {
    let (_dir, store) = test_store();
    let ts = base();

    store.append("sensor1", ts, Some(10.0)).await.unwrap();
    store.append("sensor2", ts, Some(20.0)).await.unwrap();

    let readings = store
        .scan("sensor1", ts, ts + Duration::seconds(1))
        .await
        .unwrap();
    assert_eq!(readings.len(), 1);
    assert_eq!(readings[0].value, Some(10.0));
}

#[tokio::test]
async fn unknown_device_scans_empty_not_error() {
    let (_dir, store) = test_store();
    let readings = store
        .scan("never-seen", base(), base() + Duration::hours(1))
        .await
        .unwrap();
    assert!(readings.is_empty());
}

#[tokio::test]
async fn out_of_range_value_is_rejected_before_storage() {
    let (_dir, store) = test_store();

    let err = store.append("sensor1", base(), Some(140.0)).await.unwrap_err();
    assert!(matches!(err, StoreError::InvalidValue(_)));
    assert!(!err.is_retryable());

    let err = store.append("sensor1", base(), Some(-0.5)).await.unwrap_err();
    assert!(matches!(err, StoreError::InvalidValue(_)));

    let err = store
        .append("sensor1", base(), Some(f64::NAN))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidValue(_)));

    // Nothing reached the table.
    assert!(store.known_devices().await.unwrap().is_empty());
}

#[tokio::test]
async fn absurdly_far_future_timestamp_is_rejected() {
    let (_dir, store) = test_store();
    let far_future = Utc::now() + Duration::days(365);

    let err = store
        .append("sensor1", far_future, Some(42.0))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidTimestamp { .. }));
}

#[tokio::test]
async fn forecast_rows_within_the_skew_allowance_are_accepted() {
    let (_dir, store) = test_store();
    let soon = Utc::now() + Duration::hours(12);

    store.append("sensor1", soon, Some(55.0)).await.unwrap();
    store.append("sensor1", soon, None).await.unwrap();

    let readings = store
        .scan("sensor1", soon, soon + Duration::seconds(1))
        .await
        .unwrap();
    assert_eq!(readings.len(), 2);
    assert_eq!(readings[1].value, None);
}

#[tokio::test]
async fn boundary_values_zero_and_hundred_are_valid() {
    let (_dir, store) = test_store();
    store.append("sensor1", base(), Some(0.0)).await.unwrap();
    store
        .append("sensor1", base() + Duration::seconds(1), Some(100.0))
        .await
        .unwrap();
}

#[tokio::test]
async fn registry_reflects_exactly_the_devices_with_persisted_readings() {
    let (_dir, store) = test_store();
    let registry = SensorRegistry::new(store.clone());

    assert!(registry.known_devices().await.unwrap().is_empty());

    store.append("sensor1", base(), Some(42.0)).await.unwrap();
    store.append("sensor2", base(), Some(43.0)).await.unwrap();

    let devices = registry.known_devices().await.unwrap();
    assert_eq!(
        devices.into_iter().collect::<Vec<_>>(),
        vec!["sensor1".to_string(), "sensor2".to_string()]
    );
    assert!(registry.contains("sensor1").await.unwrap());
    assert!(!registry.contains("sensor3").await.unwrap());
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_appends_to_one_device_all_land_in_order() {
    let (_dir, store) = test_store();
    let start = base();
    let n = 50;

    let mut handles = Vec::new();
    for i in 0..n {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .append("sensor1", start + Duration::seconds(i), Some((i % 100) as f64))
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let readings = store
        .scan("sensor1", start, start + Duration::seconds(n))
        .await
        .unwrap();
    assert_eq!(readings.len(), n as usize);
    for pair in readings.windows(2) {
        assert!(pair[0].timestamp < pair[1].timestamp);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_appends_across_devices_do_not_interfere() {
    let (_dir, store) = test_store();
    let start = base();

    let mut handles = Vec::new();
    for device in 0..5 {
        for i in 0..20 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .append(
                        &format!("sensor{device}"),
                        start + Duration::seconds(i),
                        Some(50.0),
                    )
                    .await
            }));
        }
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    for device in 0..5 {
        let readings = store
            .scan(
                &format!("sensor{device}"),
                start,
                start + Duration::seconds(20),
            )
            .await
            .unwrap();
        assert_eq!(readings.len(), 20);
    }
    assert_eq!(store.known_devices().await.unwrap().len(), 5);
}

#[tokio::test]
async fn store_reopens_with_data_intact() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("soilstore.sqlite3");

    let store = ReadingStore::open(path.clone(), StoreSettings::default()).unwrap();
    store.append("sensor1", base(), Some(42.0)).await.unwrap();
    store.close();

    let store = ReadingStore::open(path, StoreSettings::default()).unwrap();
    let readings = store
        .scan("sensor1", base(), base() + Duration::seconds(1))
        .await
        .unwrap();
    assert_eq!(readings.len(), 1);
    assert_eq!(readings[0].value, Some(42.0));
}
