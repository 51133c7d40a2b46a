//! Segment Storage
//!
//! This module implements `SegmentManager`, which owns the active segment
//! file and every rotated segment in the mount directory.
//!
//! ## Segment Files
//!
//! A segment is a newline-delimited JSON file of records, named
//! `segment_<id>.log`. The id packs the creation time with a collision
//! counter (`millis << 8 | counter`); the counter resets whenever the
//! millisecond changes, which is enough uniqueness for files living in one
//! directory.
//!
//! ## Lifecycle
//!
//! 1. Records append to the active file; the starting byte offset of each
//!    line is handed back so indexes can point straight at it.
//! 2. The manager tracks the active file's size and inclusive min/max
//!    timestamps. Bounds are established by the first append, not at file
//!    creation, so an empty segment has no bounds.
//! 3. When the size threshold is crossed the file is fsynced, closed, its
//!    `SegmentMeta` is queued for the ingest coordinator to record in the
//!    manifest, and a fresh active file is opened. Rotated files are never
//!    written again.
//!
//! ## Reads
//!
//! `read_segment` serves both access paths: a full sequential scan when no
//! offsets are given, or seek-and-read-one-line per offset. Undecodable
//! lines are skipped in both modes.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tracing::{debug, info};

use loghouse_core::{now_millis, LogRecord};

use crate::error::Result;
use crate::manifest::SegmentMeta;

/// Where an appended record landed: the segment file (as it was named at
/// write time, before any rotation the append itself triggered) and the
/// starting byte offset of its line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendResult {
    pub file_name: String,
    pub offset: u64,
}

struct SegmentState {
    file: File,
    file_name: String,
    size: u64,
    min_ts: Option<i64>,
    max_ts: Option<i64>,
    /// Millisecond component of the last issued segment id
    id_millis: i64,
    /// Collision counter within `id_millis`
    id_counter: i64,
    /// Rotations not yet recorded in the manifest, oldest first
    rotated: Vec<SegmentMeta>,
}

/// Append-only segment files with size-based rotation.
pub struct SegmentManager {
    dir: PathBuf,
    max_size: u64,
    state: Mutex<SegmentState>,
}

impl SegmentManager {
    /// Create the manager and open a fresh active segment in `dir`.
    pub async fn open(dir: impl AsRef<Path>, max_size: u64) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;

        let mut id_millis = 0;
        let mut id_counter = 0;
        let (file, file_name) = create_segment_file(&dir, &mut id_millis, &mut id_counter).await?;

        info!(dir = %dir.display(), file = %file_name, "Segment manager opened");

        Ok(Self {
            dir,
            max_size,
            state: Mutex::new(SegmentState {
                file,
                file_name,
                size: 0,
                min_ts: None,
                max_ts: None,
                id_millis,
                id_counter,
                rotated: Vec::new(),
            }),
        })
    }

    /// Append a record to the active segment, returning where it landed.
    /// Crossing the size threshold triggers rotation after the write.
    pub async fn append(&self, record: &LogRecord) -> Result<AppendResult> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut state = self.state.lock().await;

        let result = AppendResult {
            file_name: state.file_name.clone(),
            offset: state.size,
        };

        state.file.write_all(&line).await?;
        state.size += line.len() as u64;

        state.min_ts = Some(match state.min_ts {
            Some(min) => min.min(record.timestamp),
            None => record.timestamp,
        });
        state.max_ts = Some(match state.max_ts {
            Some(max) => max.max(record.timestamp),
            None => record.timestamp,
        });

        if state.size >= self.max_size {
            self.rotate_locked(&mut state).await?;
        }

        Ok(result)
    }

    /// Close out the active file and start a fresh one.
    async fn rotate_locked(&self, state: &mut SegmentState) -> Result<()> {
        // rotated files must be durable before the manifest points at them
        state.file.sync_all().await?;

        let meta = SegmentMeta {
            file_name: state.file_name.clone(),
            size: state.size,
            min_timestamp: state.min_ts.unwrap_or(0),
            max_timestamp: state.max_ts.unwrap_or(0),
        };
        info!(
            file = %meta.file_name,
            size = meta.size,
            min_timestamp = meta.min_timestamp,
            max_timestamp = meta.max_timestamp,
            "Segment rotated"
        );
        state.rotated.push(meta);

        let (file, file_name) =
            create_segment_file(&self.dir, &mut state.id_millis, &mut state.id_counter).await?;
        state.file = file;
        state.file_name = file_name;
        state.size = 0;
        state.min_ts = None;
        state.max_ts = None;
        Ok(())
    }

    /// Read records from a segment file. With offsets, seek and read one
    /// line per offset; without, scan the whole file. Undecodable lines are
    /// skipped either way.
    pub async fn read_segment(&self, path: &Path, offsets: &[u64]) -> Result<Vec<LogRecord>> {
        let _guard = self.state.lock().await;

        let file = File::open(path).await?;
        let mut reader = BufReader::new(file);
        let mut results = Vec::new();

        if offsets.is_empty() {
            let mut lines = reader.lines();
            while let Some(line) = lines.next_line().await? {
                if let Ok(record) = serde_json::from_str::<LogRecord>(&line) {
                    results.push(record);
                }
            }
            return Ok(results);
        }

        let mut line = String::new();
        for &offset in offsets {
            reader.seek(SeekFrom::Start(offset)).await?;
            line.clear();
            reader.read_line(&mut line).await?;
            if let Ok(record) = serde_json::from_str::<LogRecord>(line.trim_end()) {
                results.push(record);
            }
        }
        Ok(results)
    }

    /// Sequentially scan a segment, yielding each record with the byte
    /// offset its line starts at. Used to rebuild indexes on recovery.
    pub async fn scan_with_offsets(&self, path: &Path) -> Result<Vec<(u64, LogRecord)>> {
        let _guard = self.state.lock().await;

        let file = File::open(path).await?;
        let mut reader = BufReader::new(file);
        let mut results = Vec::new();
        let mut position = 0u64;
        let mut line = String::new();

        loop {
            line.clear();
            let consumed = reader.read_line(&mut line).await?;
            if consumed == 0 {
                break;
            }
            if let Ok(record) = serde_json::from_str::<LogRecord>(line.trim_end()) {
                results.push((position, record));
            }
            position += consumed as u64;
        }
        Ok(results)
    }

    /// Live metadata for the active segment. An empty segment reports zero
    /// timestamp bounds.
    pub async fn active_meta(&self) -> SegmentMeta {
        let state = self.state.lock().await;
        SegmentMeta {
            file_name: state.file_name.clone(),
            size: state.size,
            min_timestamp: state.min_ts.unwrap_or(0),
            max_timestamp: state.max_ts.unwrap_or(0),
        }
    }

    /// Whether any rotations are waiting to be recorded in the manifest.
    pub async fn is_rotated(&self) -> bool {
        !self.state.lock().await.rotated.is_empty()
    }

    /// Drain the pending rotation queue, oldest first. A single flush can
    /// rotate more than once, so this is a queue rather than a latch.
    pub async fn take_rotated(&self) -> Vec<SegmentMeta> {
        std::mem::take(&mut self.state.lock().await.rotated)
    }

    /// Fsync the active segment file.
    pub async fn flush(&self) -> Result<()> {
        let state = self.state.lock().await;
        state.file.sync_all().await?;
        Ok(())
    }

    /// Mount directory holding every segment file.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Every `segment_<id>.log` file in the mount directory, ordered by id
    /// (ids embed creation time, so this is creation order).
    pub async fn list_segment_files(&self) -> Result<Vec<String>> {
        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(id) = segment_id_from_name(name) {
                files.push((id, name.to_string()));
            }
        }
        files.sort_by_key(|(id, _)| *id);
        Ok(files.into_iter().map(|(_, name)| name).collect())
    }
}

/// Segment ids pack creation millis with a per-millisecond counter.
fn next_segment_id(id_millis: &mut i64, id_counter: &mut i64) -> i64 {
    let now = now_millis();
    if now == *id_millis {
        *id_counter += 1;
    } else {
        *id_millis = now;
        *id_counter = 0;
    }
    (*id_millis << 8) | *id_counter
}

fn segment_id_from_name(name: &str) -> Option<i64> {
    name.strip_prefix("segment_")?
        .strip_suffix(".log")?
        .parse()
        .ok()
}

/// Open a brand-new segment file, bumping the collision counter until the
/// name is free. `create_new` is what keeps a restart in the same
/// millisecond from silently reusing the previous run's file.
async fn create_segment_file(
    dir: &Path,
    id_millis: &mut i64,
    id_counter: &mut i64,
) -> Result<(File, String)> {
    loop {
        let id = next_segment_id(id_millis, id_counter);
        let file_name = format!("segment_{}.log", id);
        let path = dir.join(&file_name);
        match OpenOptions::new().create_new(true).write(true).open(&path).await {
            Ok(file) => {
                debug!(file = %file_name, "Segment created");
                return Ok((file, file_name));
            }
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(err) => return Err(err.into()),
        }
    }
}
