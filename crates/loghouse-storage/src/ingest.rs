//! Ingest Coordinator
//!
//! Ties the write path together: WAL for durability, memory buffer for
//! batching, segments + indexes + manifest for the queryable corpus.
//!
//! ## Write Path
//!
//! ```text
//! append_log ─► WAL (fsync) ─► buffer
//!                                │ flush (periodic or explicit)
//!                                ▼
//!                        active segment ─► indexes
//!                                │ on rotation
//!                                ▼
//!                            manifest
//!                                │
//!                                ▼
//!                  WAL rotate + watermark advance
//! ```
//!
//! ## Watermark Protocol
//!
//! A flush drains the buffer into the active segment, fsyncs it, records any
//! rotations in the manifest, then rotates the WAL and marks
//! `current_seq - 1` flushed. Rotating first is what lets the watermark
//! absorb the records that were just persisted; only the fresh, empty WAL
//! file survives. A crash anywhere before the watermark advance replays the
//! drained records on restart; re-appending them to a segment is accepted
//! over cross-file transactions.
//!
//! ## Recovery
//!
//! `recover_from_wal` rebuilds the indexes by scanning every manifest
//! segment (their WAL files are long gone), adopts the previous run's
//! never-rotated active segment into the manifest (a restart is a rotation),
//! then pushes replayed WAL records straight into the buffer (they are
//! already durable) and flushes. After it returns the store is in steady
//! state.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use loghouse_core::LogRecord;

use crate::buffer::MemoryBuffer;
use crate::error::Result;
use crate::index::IndexManager;
use crate::manifest::Manifest;
use crate::segment::SegmentManager;
use crate::wal::Wal;

struct Flusher {
    handle: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

/// Serializes ingestion with flushing and owns the background flush task.
pub struct IngestCoordinator {
    buffer: MemoryBuffer,
    wal: Arc<Wal>,
    segments: Arc<SegmentManager>,
    manifest: Arc<Manifest>,
    indexes: Arc<IndexManager>,
    /// Serializes `append_log` with `flush` so drains never race appends
    lock: Mutex<()>,
    flusher: Mutex<Option<Flusher>>,
}

impl IngestCoordinator {
    pub fn new(
        wal: Arc<Wal>,
        segments: Arc<SegmentManager>,
        manifest: Arc<Manifest>,
        indexes: Arc<IndexManager>,
    ) -> Self {
        Self {
            buffer: MemoryBuffer::new(),
            wal,
            segments,
            manifest,
            indexes,
            lock: Mutex::new(()),
            flusher: Mutex::new(None),
        }
    }

    /// Durably append one record. The record is in the WAL and the buffer
    /// when this returns Ok; on error the buffer is untouched and the record
    /// must be treated as not stored.
    pub async fn append_log(&self, record: LogRecord) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.wal.append(&record).await?;
        self.buffer.push(record).await;
        Ok(())
    }

    /// Drain the buffer into the active segment, update indexes and the
    /// manifest, then advance the WAL watermark. A no-op when the buffer is
    /// empty.
    pub async fn flush(&self) -> Result<()> {
        let _guard = self.lock.lock().await;

        let records = self.buffer.drain().await;
        if records.is_empty() {
            return Ok(());
        }
        let count = records.len();

        for record in records {
            let appended = self.segments.append(&record).await?;
            self.indexes
                .insert(&record, &appended.file_name, appended.offset)
                .await;
        }

        for meta in self.segments.take_rotated().await {
            self.manifest.add_segment(meta).await?;
        }

        // segment data must be on disk before any WAL file is deleted
        self.segments.flush().await?;

        self.wal.rotate().await?;
        let absorbed = self.wal.current_seq().await - 1;
        self.wal.mark_flushed(absorbed).await?;

        debug!(records = count, "Flush complete");
        Ok(())
    }

    /// Start the periodic flusher. Flush errors are logged and retried on
    /// the next tick; they never kill the task.
    pub async fn start_background_flush(self: &Arc<Self>, interval: Duration) {
        let (shutdown, mut signal) = watch::channel(false);
        let coordinator = Arc::clone(self);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(err) = coordinator.flush().await {
                            error!(error = %err, "Background flush failed");
                        }
                    }
                    _ = signal.changed() => {
                        info!("Background flusher stopped");
                        break;
                    }
                }
            }
        });

        // replacing an old flusher drops its shutdown sender, ending it too
        *self.flusher.lock().await = Some(Flusher { handle, shutdown });
    }

    /// Stop the periodic flusher without a final flush.
    pub async fn stop_background_flush(&self) {
        let flusher = self.flusher.lock().await.take();
        if let Some(flusher) = flusher {
            let _ = flusher.shutdown.send(true);
            let _ = flusher.handle.await;
        }
    }

    /// Rebuild state after a restart: adopt the previous run's segments,
    /// reindex everything on disk, replay the unflushed WAL into the buffer,
    /// and flush. Errors here are fatal to startup.
    pub async fn recover_from_wal(&self) -> Result<()> {
        let mut known: Vec<String> = self
            .manifest
            .get_segments()
            .await
            .into_iter()
            .map(|meta| meta.file_name)
            .collect();

        // rebuild indexes for the catalogued segments (their WAL is gone)
        for file_name in &known {
            let count = self.reindex_segment(file_name).await?;
            debug!(file = %file_name, records = count, "Reindexed segment");
        }

        // A restart closes the previous active segment for good, but only
        // rotation ever put a file in the manifest. Adopt any non-empty
        // segment file the catalogue does not know about so its records stay
        // visible; their WAL files may already be deleted.
        known.push(self.segments.active_meta().await.file_name);
        for file_name in self.segments.list_segment_files().await? {
            if known.contains(&file_name) {
                continue;
            }
            self.adopt_segment(&file_name).await?;
        }

        let replayed = self.wal.replay_all_unflushed().await?;
        let count = replayed.len();
        for record in replayed {
            self.buffer.push(record).await;
        }
        self.flush().await?;

        info!(replayed = count, "Recovery complete");
        Ok(())
    }

    async fn reindex_segment(&self, file_name: &str) -> Result<usize> {
        let path = self.segments.dir().join(file_name);
        let scanned = self.segments.scan_with_offsets(&path).await?;
        for (offset, record) in &scanned {
            self.indexes.insert(record, file_name, *offset).await;
        }
        Ok(scanned.len())
    }

    /// Catalogue a segment file left behind by an earlier run, computing its
    /// metadata from a scan. Empty leftovers are deleted instead.
    async fn adopt_segment(&self, file_name: &str) -> Result<()> {
        let path = self.segments.dir().join(file_name);
        let scanned = self.segments.scan_with_offsets(&path).await?;

        if scanned.is_empty() {
            debug!(file = %file_name, "Removing empty leftover segment");
            let _ = tokio::fs::remove_file(&path).await;
            return Ok(());
        }

        let mut min_ts = i64::MAX;
        let mut max_ts = i64::MIN;
        for (offset, record) in &scanned {
            min_ts = min_ts.min(record.timestamp);
            max_ts = max_ts.max(record.timestamp);
            self.indexes.insert(record, file_name, *offset).await;
        }

        let size = tokio::fs::metadata(&path).await?.len();
        info!(file = %file_name, records = scanned.len(), "Adopted leftover segment");
        self.manifest
            .add_segment(crate::manifest::SegmentMeta {
                file_name: file_name.to_string(),
                size,
                min_timestamp: min_ts,
                max_timestamp: max_ts,
            })
            .await
    }

    /// Records waiting in memory for the next flush.
    pub async fn buffered(&self) -> usize {
        self.buffer.len().await
    }
}
