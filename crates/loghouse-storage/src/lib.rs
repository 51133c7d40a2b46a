//! Loghouse Storage Engine
//!
//! An embeddable log storage engine: structured records are durably
//! ingested through a write-ahead log, batched into immutable on-disk
//! segments, indexed in memory for fast lookup, and served back through
//! filtered range queries.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌────────────┐
//! │  Writers   │
//! └─────┬──────┘
//!       │ append_log
//!       ▼
//! ┌─────────────────┐    fsync    ┌──────────────┐
//! │ IngestCoordinator├────────────►  WAL files   │
//! │  (memory buffer) │            └──────────────┘
//! └─────┬───────────┘
//!       │ flush (periodic)
//!       ▼
//! ┌──────────────┐  rotation  ┌──────────────┐
//! │ Active       ├────────────► Manifest     │
//! │ segment      │            │ (catalogue)  │
//! └─────┬────────┘            └──────┬───────┘
//!       │ offsets                    │ pruning
//!       ▼                            ▼
//! ┌──────────────┐            ┌──────────────┐
//! │ IndexManager │◄───────────┤ QueryEngine  │
//! └──────────────┘   lookups  └──────────────┘
//! ```
//!
//! ## Durability Model
//!
//! Every `append` is fsynced to the WAL before it is acknowledged. The
//! flusher later drains the buffer into the active segment, records
//! rotations in the manifest, and only then advances the WAL watermark and
//! deletes absorbed WAL files. A crash at any point replays the unflushed
//! WAL on restart; the worst case is a duplicated record in a segment, never
//! a lost one.
//!
//! ## Main Components
//!
//! - [`Wal`]: sequenced append-only log files with an atomically persisted
//!   meta blob and torn-tail tolerant replay
//! - [`SegmentManager`]: newline-delimited JSON segment files with
//!   size-based rotation and per-segment timestamp bounds
//! - [`Manifest`]: crash-safe catalogue of rotated segments
//! - [`IndexManager`]: ordered in-memory secondary indexes, rebuilt on
//!   recovery
//! - [`IngestCoordinator`]: WAL append + buffer + periodic flush + recovery
//! - [`QueryEngine`]: segment pruning, index-driven reads, residual
//!   filtering, ordered limited results
//! - [`LogStore`]: the embeddable facade wiring all of the above

pub mod buffer;
pub mod config;
pub mod error;
pub mod index;
pub mod ingest;
pub mod manifest;
pub mod query;
pub mod segment;
pub mod store;
pub mod wal;

pub use buffer::MemoryBuffer;
pub use config::StoreConfig;
pub use error::{Error, Result};
pub use index::{IndexEntry, IndexManager, KeyExtractor};
pub use ingest::IngestCoordinator;
pub use manifest::{Manifest, SegmentMeta};
pub use query::{Filter, FilterExpr, Query, QueryEngine, DEFAULT_LIMIT};
pub use segment::{AppendResult, SegmentManager};
pub use store::LogStore;
pub use wal::{Wal, WalMeta};
