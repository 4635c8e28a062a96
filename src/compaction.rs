//! Background retention pass: raw rows older than the configured
//! horizon are replaced by mean-valued bucket rows. Runs off the
//! request path; a failed pass rolls back and the next tick retries.

use chrono::{DateTime, Utc};
use log::{error, info};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::{db::CompactionStats, error::StoreError, store::ReadingStore};

/// Periodic compaction until the token is cancelled. Spawn once per
/// process next to the store.
pub async fn compaction_loop(store: ReadingStore, cancel_token: CancellationToken) {
    let mut ticker = tokio::time::interval(store.settings().compaction_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match run_pass(&store).await {
                    Ok(stats) if stats.rows_removed > 0 => {
                        info!(
                            "Compacted {} raw rows into {} buckets across {} devices",
                            stats.rows_removed, stats.buckets_written, stats.devices_touched
                        );
                    }
                    Ok(_) => {}
                    Err(err) => {
                        error!("Compaction pass failed, retrying next tick: {err:?}");
                    }
                }
            }
            _ = cancel_token.cancelled() => {
                info!("Compaction loop shutting down");
                break;
            }
        }
    }
}

/// One pass against the wall clock.
pub async fn run_pass(store: &ReadingStore) -> Result<CompactionStats, StoreError> {
    run_pass_at(store, Utc::now()).await
}

/// One pass with an injected reference instant. Raw rows in buckets
/// lying wholly before `now − horizon` are downsampled in a single
/// transaction; concurrent scans see the pass entirely applied or not
/// at all.
pub async fn run_pass_at(
    store: &ReadingStore,
    now: DateTime<Utc>,
) -> Result<CompactionStats, StoreError> {
    let cutoff = now - store.settings().retention_horizon();
    let bucket_secs = store.settings().compaction_bucket().num_seconds();
    Ok(store.database().compact_before(cutoff, bucket_secs).await?)
}
