//! Segment Manifest
//!
//! The manifest is the durable catalogue of rotated segments. It holds one
//! `SegmentMeta` per rotated file, in rotation order, and is rewritten
//! atomically (temp file + rename) after every addition so a crash mid-save
//! leaves either the old or the new catalogue on disk.
//!
//! The active segment is never listed here; its metadata is derived live by
//! the segment manager.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::Result;

/// Metadata describing one segment file.
///
/// For rotated segments this is persisted in the manifest; for the active
/// segment it is computed on demand. The timestamp bounds are inclusive over
/// every record in the file and drive query-time pruning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentMeta {
    pub file_name: String,

    /// File size in bytes
    pub size: u64,

    pub min_timestamp: i64,

    pub max_timestamp: i64,
}

/// Crash-safe list of rotated segments.
pub struct Manifest {
    path: PathBuf,
    segments: Mutex<Vec<SegmentMeta>>,
}

impl Manifest {
    /// Load the manifest at `path`, or start empty if it does not exist.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let segments = match fs::read(&path).await {
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(err) => return Err(err.into()),
            Ok(bytes) if bytes.is_empty() => Vec::new(),
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(segments) => segments,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "Unreadable manifest, starting empty");
                    Vec::new()
                }
            },
        };

        debug!(path = %path.display(), segments = segments.len(), "Manifest opened");
        Ok(Self {
            path,
            segments: Mutex::new(segments),
        })
    }

    /// Append a rotated segment and persist the catalogue atomically.
    pub async fn add_segment(&self, meta: SegmentMeta) -> Result<()> {
        let mut segments = self.segments.lock().await;
        segments.push(meta);

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec(&*segments)?).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Snapshot copy of all rotated segments, in rotation order.
    pub async fn get_segments(&self) -> Vec<SegmentMeta> {
        self.segments.lock().await.clone()
    }
}
