//! Write-Ahead Log (WAL) for Durability
//!
//! Provides disk durability for every acknowledged record before it reaches
//! the in-memory buffer, so an unclean shutdown never loses acknowledged
//! writes.
//!
//! ## Problem
//!
//! Records sit in the memory buffer between flushes. If the process dies
//! before the flusher drains them into a segment, they are gone.
//!
//! ## Solution
//!
//! Append every record to a sequenced log file and fsync before
//! acknowledging. On restart, replay every WAL file newer than the flush
//! watermark to rebuild the buffer, then flush.
//!
//! ## File Layout
//!
//! ```text
//! wal_00000001.wal   newline-delimited JSON records, append order
//! wal_00000002.wal
//! wal.meta           {"last_flushed_seq":1,"current_seq":2,"last_offset":512}
//! ```
//!
//! Files are totally ordered by their sequence number. `wal.meta` is
//! persisted atomically (temp file + rename) so a crash leaves either the
//! old or the new meta, never a torn one. Every WAL file with
//! `seq <= last_flushed_seq` has been absorbed into segments and is deleted.
//!
//! ## Torn Tails
//!
//! A crash can leave a partial final line in the active file. Replay scans
//! line by line and silently drops anything that fails to decode, so a torn
//! tail never aborts recovery.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use loghouse_core::LogRecord;

use crate::error::Result;

const WAL_PREFIX: &str = "wal_";
const WAL_SUFFIX: &str = ".wal";
const META_FILE: &str = "wal.meta";

/// Durable WAL bookkeeping, persisted atomically alongside the log files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalMeta {
    /// Largest sequence known to be fully absorbed into segments
    pub last_flushed_seq: u64,

    /// Sequence of the active WAL file (always >= 1)
    pub current_seq: u64,

    /// Byte length of the active WAL file
    pub last_offset: u64,
}

impl Default for WalMeta {
    fn default() -> Self {
        Self {
            last_flushed_seq: 0,
            current_seq: 1,
            last_offset: 0,
        }
    }
}

struct WalState {
    file: File,
    meta: WalMeta,
}

/// Sequenced, fsync-per-append write-ahead log.
///
/// A single lock serializes append, replay, rotation, watermark updates, and
/// close; the WAL does not benefit from parallel appenders at this layer.
pub struct Wal {
    dir: PathBuf,
    meta_path: PathBuf,
    state: Mutex<WalState>,
}

impl Wal {
    /// Open the WAL in `dir`, creating the directory, the meta file, and the
    /// active log file as needed. The meta is loaded first so appends after
    /// a restart continue in `wal_<current_seq>`.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).await?;

        let meta_path = dir.join(META_FILE);
        let mut meta = load_meta(&meta_path).await?;

        let active_path = dir.join(wal_file_name(meta.current_seq));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&active_path)
            .await?;

        // After a crash between a data write and the meta persist, the file
        // itself is the ground truth for the append position.
        meta.last_offset = file.metadata().await?.len();

        info!(
            path = %active_path.display(),
            current_seq = meta.current_seq,
            last_flushed_seq = meta.last_flushed_seq,
            size = meta.last_offset,
            "WAL opened"
        );

        Ok(Self {
            dir,
            meta_path,
            state: Mutex::new(WalState { file, meta }),
        })
    }

    /// Append a record: JSON line, fsync, then persist meta atomically.
    ///
    /// On any error the record must be treated as not durable.
    pub async fn append(&self, record: &LogRecord) -> Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut state = self.state.lock().await;
        state.file.write_all(&line).await?;
        state.file.sync_all().await?;

        state.meta.last_offset += line.len() as u64;
        persist_meta(&self.meta_path, &state.meta).await
    }

    /// Replay every record in WAL files with `seq > last_flushed_seq`, in
    /// `(seq ascending, offset ascending)` order. Lines that fail to decode
    /// are dropped (torn tail tolerance).
    pub async fn replay_all_unflushed(&self) -> Result<Vec<LogRecord>> {
        let state = self.state.lock().await;

        let mut to_replay = list_wal_files(&self.dir).await?;
        to_replay.retain(|(seq, _)| *seq > state.meta.last_flushed_seq);
        to_replay.sort_by_key(|(seq, _)| *seq);

        let mut records = Vec::new();
        for (seq, path) in to_replay {
            let file = File::open(&path).await?;
            let mut lines = BufReader::new(file).lines();
            let mut skipped = 0usize;
            while let Some(line) = lines.next_line().await? {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<LogRecord>(&line) {
                    Ok(record) => records.push(record),
                    Err(_) => skipped += 1,
                }
            }
            if skipped > 0 {
                warn!(seq, skipped, "Skipped undecodable WAL lines");
            }
        }

        debug!(replayed = records.len(), "WAL replay complete");
        Ok(records)
    }

    /// Advance the flush watermark to `seq` and delete every WAL file with a
    /// sequence at or below it. Idempotent; individual delete failures are
    /// tolerated.
    pub async fn mark_flushed(&self, seq: u64) -> Result<()> {
        let mut state = self.state.lock().await;
        if seq <= state.meta.last_flushed_seq {
            return Ok(());
        }

        state.meta.last_flushed_seq = seq;
        persist_meta(&self.meta_path, &state.meta).await?;

        for (file_seq, path) in list_wal_files(&self.dir).await? {
            if file_seq <= seq {
                if let Err(err) = fs::remove_file(&path).await {
                    warn!(path = %path.display(), error = %err, "Failed to remove flushed WAL file");
                }
            }
        }

        debug!(last_flushed_seq = seq, "WAL watermark advanced");
        Ok(())
    }

    /// Close the active file, bump `current_seq`, and open a fresh one.
    pub async fn rotate(&self) -> Result<()> {
        let mut state = self.state.lock().await;

        state.meta.current_seq += 1;
        state.meta.last_offset = 0;

        let path = self.dir.join(wal_file_name(state.meta.current_seq));
        state.file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        persist_meta(&self.meta_path, &state.meta).await?;

        debug!(current_seq = state.meta.current_seq, "WAL rotated");
        Ok(())
    }

    /// Flush the active file to disk. The handle itself closes on drop.
    pub async fn close(&self) -> Result<()> {
        let state = self.state.lock().await;
        state.file.sync_all().await?;
        Ok(())
    }

    /// Sequence of the active WAL file
    pub async fn current_seq(&self) -> u64 {
        self.state.lock().await.meta.current_seq
    }

    /// Byte length of the active WAL file
    pub async fn active_size(&self) -> u64 {
        self.state.lock().await.meta.last_offset
    }

    /// Snapshot of the durable bookkeeping
    pub async fn meta(&self) -> WalMeta {
        self.state.lock().await.meta
    }
}

fn wal_file_name(seq: u64) -> String {
    format!("{}{:08}{}", WAL_PREFIX, seq, WAL_SUFFIX)
}

fn seq_from_name(name: &str) -> Option<u64> {
    name.strip_prefix(WAL_PREFIX)?
        .strip_suffix(WAL_SUFFIX)?
        .parse()
        .ok()
}

async fn list_wal_files(dir: &Path) -> Result<Vec<(u64, PathBuf)>> {
    let mut files = Vec::new();
    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if let Some(seq) = seq_from_name(name) {
            files.push((seq, entry.path()));
        }
    }
    Ok(files)
}

async fn load_meta(path: &Path) -> Result<WalMeta> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(WalMeta::default()),
        Err(err) => return Err(err.into()),
    };
    if bytes.is_empty() {
        return Ok(WalMeta::default());
    }

    let mut meta: WalMeta = serde_json::from_slice(&bytes)?;
    if meta.current_seq == 0 {
        meta.current_seq = 1;
    }
    Ok(meta)
}

/// Write meta via temp file + rename so readers observe either the old or
/// the new version, never a truncated one.
async fn persist_meta(path: &Path, meta: &WalMeta) -> Result<()> {
    let tmp = path.with_extension("meta.tmp");
    fs::write(&tmp, serde_json::to_vec(meta)?).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use loghouse_core::{Level, Properties};
    use tempfile::TempDir;

    fn record(ts: i64, message: &str) -> LogRecord {
        LogRecord {
            timestamp: ts,
            level: Level::Info,
            service: "auth".to_string(),
            host: "web-1".to_string(),
            message: message.to_string(),
            stack_trace: String::new(),
            properties: Properties::new(),
        }
    }

    #[tokio::test]
    async fn test_append_and_replay() {
        let temp_dir = TempDir::new().unwrap();
        let wal = Wal::open(temp_dir.path()).await.unwrap();

        for i in 0..3 {
            wal.append(&record(1000 + i, &format!("m{}", i))).await.unwrap();
        }

        let records = wal.replay_all_unflushed().await.unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].message, "m0");
        assert_eq!(records[2].message, "m2");
    }

    #[tokio::test]
    async fn test_meta_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();

        {
            let wal = Wal::open(temp_dir.path()).await.unwrap();
            wal.append(&record(1, "a")).await.unwrap();
            wal.rotate().await.unwrap();
            wal.append(&record(2, "b")).await.unwrap();
        }

        let wal = Wal::open(temp_dir.path()).await.unwrap();
        let meta = wal.meta().await;
        assert_eq!(meta.current_seq, 2);
        assert!(meta.last_offset > 0);

        // appends after reopen land in the current file, not wal_00000001
        wal.append(&record(3, "c")).await.unwrap();
        let records = wal.replay_all_unflushed().await.unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[2].message, "c");
    }

    #[tokio::test]
    async fn test_replay_skips_torn_tail() {
        let temp_dir = TempDir::new().unwrap();
        let wal = Wal::open(temp_dir.path()).await.unwrap();
        wal.append(&record(1, "whole")).await.unwrap();
        wal.append(&record(2, "also whole")).await.unwrap();

        // simulate a crash mid-write: partial JSON, no trailing newline
        let active = temp_dir.path().join("wal_00000001.wal");
        let mut contents = std::fs::read(&active).unwrap();
        contents.extend_from_slice(b"{\"Timestamp\":3,\"Lev");
        std::fs::write(&active, contents).unwrap();

        let records = wal.replay_all_unflushed().await.unwrap();
        assert_eq!(records.len(), 2);
    }

    #[tokio::test]
    async fn test_rotate_resets_offset() {
        let temp_dir = TempDir::new().unwrap();
        let wal = Wal::open(temp_dir.path()).await.unwrap();
        wal.append(&record(1, "a")).await.unwrap();
        assert!(wal.active_size().await > 0);

        wal.rotate().await.unwrap();
        assert_eq!(wal.current_seq().await, 2);
        assert_eq!(wal.active_size().await, 0);
        assert!(temp_dir.path().join("wal_00000002.wal").exists());
    }

    #[tokio::test]
    async fn test_mark_flushed_deletes_absorbed_files() {
        let temp_dir = TempDir::new().unwrap();
        let wal = Wal::open(temp_dir.path()).await.unwrap();
        wal.append(&record(1, "old")).await.unwrap();
        wal.rotate().await.unwrap();
        wal.append(&record(2, "new")).await.unwrap();

        wal.mark_flushed(1).await.unwrap();

        assert!(!temp_dir.path().join("wal_00000001.wal").exists());
        assert!(temp_dir.path().join("wal_00000002.wal").exists());

        let records = wal.replay_all_unflushed().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "new");

        // idempotent
        wal.mark_flushed(1).await.unwrap();
        assert_eq!(wal.meta().await.last_flushed_seq, 1);
    }

    #[tokio::test]
    async fn test_replay_orders_files_by_sequence() {
        let temp_dir = TempDir::new().unwrap();
        let wal = Wal::open(temp_dir.path()).await.unwrap();
        wal.append(&record(10, "first-file")).await.unwrap();
        wal.rotate().await.unwrap();
        wal.append(&record(5, "second-file")).await.unwrap();

        // file order wins over timestamp order
        let records = wal.replay_all_unflushed().await.unwrap();
        assert_eq!(records[0].message, "first-file");
        assert_eq!(records[1].message, "second-file");
    }

    #[tokio::test]
    async fn test_meta_persist_is_atomic() {
        let temp_dir = TempDir::new().unwrap();
        let wal = Wal::open(temp_dir.path()).await.unwrap();
        wal.append(&record(1, "a")).await.unwrap();

        // a leftover temp file from a crashed persist must not shadow the meta
        std::fs::write(temp_dir.path().join("wal.meta.tmp"), b"garbage").unwrap();
        drop(wal);

        let wal = Wal::open(temp_dir.path()).await.unwrap();
        assert_eq!(wal.meta().await.current_seq, 1);
        assert!(wal.meta().await.last_offset > 0);
    }
}
