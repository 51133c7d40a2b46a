//! Embeddable entry point wiring every component over one mount directory.
//!
//! `LogStore` owns the WAL, segment manager, manifest, index manager, ingest
//! coordinator, and query engine, and exposes the handful of operations a
//! host needs: append, query, flush, recover, and background-flush control.
//!
//! ## Usage
//!
//! ```ignore
//! use loghouse_storage::{LogStore, StoreConfig, Query};
//!
//! let store = LogStore::open(StoreConfig::default()).await?;
//! store.recover().await?;
//! store.start_background_flush().await;
//!
//! store.append(record).await?;
//! let results = store.query(&Query { limit: 50, ..Default::default() }).await?;
//! ```

use std::sync::Arc;

use tokio::fs;
use tracing::info;

use loghouse_core::LogRecord;

use crate::config::StoreConfig;
use crate::error::Result;
use crate::index::IndexManager;
use crate::ingest::IngestCoordinator;
use crate::manifest::Manifest;
use crate::query::{Query, QueryEngine};
use crate::segment::SegmentManager;
use crate::wal::Wal;

pub struct LogStore {
    config: StoreConfig,
    wal: Arc<Wal>,
    segments: Arc<SegmentManager>,
    manifest: Arc<Manifest>,
    indexes: Arc<IndexManager>,
    ingest: Arc<IngestCoordinator>,
    query: QueryEngine,
}

impl LogStore {
    /// Open (or create) a store in `config.data_dir`. Call [`recover`] before
    /// serving traffic.
    ///
    /// [`recover`]: LogStore::recover
    pub async fn open(config: StoreConfig) -> Result<Self> {
        fs::create_dir_all(&config.data_dir).await?;

        let segments = Arc::new(
            SegmentManager::open(&config.data_dir, config.segment_max_size).await?,
        );
        let manifest = Arc::new(Manifest::open(config.data_dir.join("manifest.json")).await?);
        let wal = Arc::new(Wal::open(&config.data_dir).await?);
        let indexes = Arc::new(IndexManager::new());

        let ingest = Arc::new(IngestCoordinator::new(
            wal.clone(),
            segments.clone(),
            manifest.clone(),
            indexes.clone(),
        ));
        let query = QueryEngine::new(indexes.clone(), manifest.clone(), segments.clone());

        info!(data_dir = %config.data_dir.display(), "Log store opened");

        Ok(Self {
            config,
            wal,
            segments,
            manifest,
            indexes,
            ingest,
            query,
        })
    }

    /// Replay the unflushed WAL and rebuild indexes. Fatal on error.
    pub async fn recover(&self) -> Result<()> {
        self.ingest.recover_from_wal().await
    }

    /// Durably ingest one record.
    pub async fn append(&self, record: LogRecord) -> Result<()> {
        self.ingest.append_log(record).await
    }

    /// Drain buffered records into the active segment.
    pub async fn flush(&self) -> Result<()> {
        self.ingest.flush().await
    }

    /// Execute a filtered range query.
    pub async fn query(&self, query: &Query) -> Result<Vec<LogRecord>> {
        self.query.execute(query).await
    }

    /// Start periodic flushing at the configured interval.
    pub async fn start_background_flush(&self) {
        self.ingest
            .start_background_flush(self.config.flush_interval())
            .await;
    }

    /// Stop periodic flushing without a final flush.
    pub async fn stop_background_flush(&self) {
        self.ingest.stop_background_flush().await;
    }

    /// Register a secondary index. New inserts populate it; existing records
    /// do not backfill.
    pub async fn create_index(
        &self,
        name: impl Into<String>,
        extractor: impl Fn(&LogRecord) -> String + Send + Sync + 'static,
    ) {
        self.indexes.create_index(name, extractor).await;
    }

    /// Remove a secondary index.
    pub async fn drop_index(&self, name: &str) -> Result<()> {
        self.indexes.drop_index(name).await
    }

    /// Direct access to the index manager.
    pub fn indexes(&self) -> &IndexManager {
        &self.indexes
    }

    /// The catalogue of rotated segments.
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// The segment manager (active segment metadata, raw reads).
    pub fn segments(&self) -> &SegmentManager {
        &self.segments
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Graceful shutdown: stop the flusher, flush what remains, sync the WAL.
    pub async fn close(&self) -> Result<()> {
        self.stop_background_flush().await;
        self.flush().await?;
        self.wal.close().await?;
        info!("Log store closed");
        Ok(())
    }
}
