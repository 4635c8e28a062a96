//! Telemetry store and windowed-query engine for soil-moisture sensors.
//!
//! Periodic readings arrive keyed by device, land durably in SQLite,
//! and are served back as time-windowed series (last hour through last
//! seven days, plus the next-12h forecast window) for a dashboard. A
//! background task downsamples aged raw rows so storage stays bounded
//! while historical windows keep answering.
//!
//! Open one [`ReadingStore`] per process, hand clones to the transport
//! handlers, and spawn [`compaction_loop`] beside it:
//!
//! ```no_run
//! use soilstore::{compaction_loop, QueryEngine, ReadingStore, StoreSettings, WindowSpec};
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), soilstore::StoreError> {
//! let settings = StoreSettings::default();
//! let store = ReadingStore::open("soilstore.sqlite3".into(), settings)?;
//!
//! let shutdown = CancellationToken::new();
//! tokio::spawn(compaction_loop(store.clone(), shutdown.clone()));
//!
//! store.append("sensor1", chrono::Utc::now(), Some(42.0)).await?;
//!
//! let engine = QueryEngine::new(store.clone());
//! let series = engine
//!     .series("sensor1", WindowSpec::LastHour, chrono::Utc::now())
//!     .await?;
//! println!("{} points", series.len());
//!
//! shutdown.cancel();
//! store.close();
//! # Ok(())
//! # }
//! ```

mod compaction;
mod db;
mod error;
mod ingest;
mod query;
mod registry;
mod settings;
mod store;

pub use compaction::{compaction_loop, run_pass, run_pass_at};
pub use db::{CompactionStats, Reading, RetentionTier};
pub use error::StoreError;
pub use ingest::{ingest_reading, IngestRequest};
pub use query::{QueryEngine, SeriesPoint, Snapshot, WindowSpec};
pub use registry::SensorRegistry;
pub use settings::StoreSettings;
pub use store::ReadingStore;
