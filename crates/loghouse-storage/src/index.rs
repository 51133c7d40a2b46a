//! In-Memory Secondary Indexes
//!
//! ## The Problem
//!
//! Without indexes, every query scans every candidate segment line by line.
//! For point-ish predicates (one level, one service) that reads far more
//! than it returns.
//!
//! ## The Solution
//!
//! `IndexManager` keeps a set of named ordered indexes. Each index extracts
//! a string key from a record and stores an entry in a
//! `BTreeMap<(key, timestamp), IndexEntry>`:
//!
//! ```text
//! ("ERROR", 1700000003000) -> { file: segment_42.log, offset: 512 }
//! ("ERROR", 1700000009000) -> { file: segment_42.log, offset: 9041 }
//! ("INFO",  1700000001000) -> { file: segment_42.log, offset: 0 }
//! ```
//!
//! Entries with the same `(key, timestamp)` overwrite each other; two logs
//! with identical key and millisecond are treated as equivalent probes into
//! the same line.
//!
//! A default `timestamp` index (key = decimal timestamp) is always present.
//! An extractor returning an empty string means "do not index this record".
//!
//! ## Persistence
//!
//! None. Indexes are rebuilt during recovery by scanning existing segments
//! and replaying the WAL through the normal flush path.
//!
//! ## Thread Safety
//!
//! An `RwLock` guards the index map. Searches share the read lock; inserts
//! take the write lock because `BTreeMap` cannot be mutated under a shared
//! borrow.

use std::collections::{BTreeMap, HashMap};

use tokio::sync::RwLock;
use tracing::debug;

use loghouse_core::LogRecord;

use crate::error::{Error, Result};

/// Extracts an index key from a record. Empty string means skip.
pub type KeyExtractor = Box<dyn Fn(&LogRecord) -> String + Send + Sync>;

/// A pointer from an index key to one record line in a segment file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub key: String,
    pub file_name: String,
    pub offset: u64,
    pub timestamp: i64,
}

struct Index {
    extractor: KeyExtractor,
    tree: BTreeMap<(String, i64), IndexEntry>,
}

/// Named ordered secondary indexes over segment offsets.
pub struct IndexManager {
    indexes: RwLock<HashMap<String, Index>>,
}

impl Default for IndexManager {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexManager {
    /// Create the manager with the default `timestamp` index registered.
    pub fn new() -> Self {
        let mut indexes = HashMap::new();
        indexes.insert(
            "timestamp".to_string(),
            Index {
                extractor: Box::new(|record: &LogRecord| record.timestamp.to_string()),
                tree: BTreeMap::new(),
            },
        );
        Self {
            indexes: RwLock::new(indexes),
        }
    }

    /// Register a named index. Replaces any previous index with that name;
    /// existing records are not backfilled.
    pub async fn create_index(
        &self,
        name: impl Into<String>,
        extractor: impl Fn(&LogRecord) -> String + Send + Sync + 'static,
    ) {
        let name = name.into();
        debug!(index = %name, "Index created");
        self.indexes.write().await.insert(
            name,
            Index {
                extractor: Box::new(extractor),
                tree: BTreeMap::new(),
            },
        );
    }

    /// Remove a named index.
    pub async fn drop_index(&self, name: &str) -> Result<()> {
        match self.indexes.write().await.remove(name) {
            Some(_) => Ok(()),
            None => Err(Error::IndexNotFound(name.to_string())),
        }
    }

    pub async fn has_index(&self, name: &str) -> bool {
        self.indexes.read().await.contains_key(name)
    }

    /// Insert a record into every registered index whose extractor produces
    /// a non-empty key.
    pub async fn insert(&self, record: &LogRecord, file_name: &str, offset: u64) {
        let mut indexes = self.indexes.write().await;
        for index in indexes.values_mut() {
            let key = (index.extractor)(record);
            if key.is_empty() {
                continue;
            }
            index.tree.insert(
                (key.clone(), record.timestamp),
                IndexEntry {
                    key,
                    file_name: file_name.to_string(),
                    offset,
                    timestamp: record.timestamp,
                },
            );
        }
    }

    /// All entries with exactly `key`, timestamp ascending. Unknown index
    /// names return empty rather than an error; the executor falls back to
    /// scanning.
    pub async fn search(&self, index_name: &str, key: &str) -> Vec<IndexEntry> {
        let indexes = self.indexes.read().await;
        let Some(index) = indexes.get(index_name) else {
            return Vec::new();
        };
        index
            .tree
            .range((key.to_string(), i64::MIN)..=(key.to_string(), i64::MAX))
            .map(|(_, entry)| entry.clone())
            .collect()
    }

    /// All entries with timestamp in the inclusive window, timestamp
    /// ascending.
    pub async fn range_search(&self, index_name: &str, start: i64, end: i64) -> Vec<IndexEntry> {
        let indexes = self.indexes.read().await;
        let Some(index) = indexes.get(index_name) else {
            return Vec::new();
        };
        let mut entries: Vec<IndexEntry> = index
            .tree
            .values()
            .filter(|entry| entry.timestamp >= start && entry.timestamp <= end)
            .cloned()
            .collect();
        entries.sort_by_key(|entry| entry.timestamp);
        entries
    }

    /// Offsets of entries in the inclusive timestamp window matching `key`
    /// (empty key matches everything), in tree order (key ascending, then
    /// timestamp ascending).
    pub async fn lookup(&self, index_name: &str, start: i64, end: i64, key: &str) -> Vec<u64> {
        self.lookup_entries(index_name, start, end, key, None).await
    }

    /// Like `lookup`, restricted to entries pointing into one segment file.
    /// The planner uses this so a segment's offset list never contains
    /// offsets that belong to a sibling file.
    pub async fn lookup_in_file(
        &self,
        index_name: &str,
        start: i64,
        end: i64,
        key: &str,
        file_name: &str,
    ) -> Vec<u64> {
        self.lookup_entries(index_name, start, end, key, Some(file_name))
            .await
    }

    async fn lookup_entries(
        &self,
        index_name: &str,
        start: i64,
        end: i64,
        key: &str,
        file_name: Option<&str>,
    ) -> Vec<u64> {
        let indexes = self.indexes.read().await;
        let Some(index) = indexes.get(index_name) else {
            return Vec::new();
        };
        index
            .tree
            .values()
            .filter(|entry| entry.timestamp >= start && entry.timestamp <= end)
            .filter(|entry| key.is_empty() || entry.key == key)
            .filter(|entry| file_name.map_or(true, |f| entry.file_name == f))
            .map(|entry| entry.offset)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loghouse_core::{Level, Properties};
    use serde_json::json;

    fn record(ts: i64, level: Level, service: &str) -> LogRecord {
        LogRecord {
            timestamp: ts,
            level,
            service: service.to_string(),
            host: "web-1".to_string(),
            message: String::new(),
            stack_trace: String::new(),
            properties: Properties::new(),
        }
    }

    #[tokio::test]
    async fn test_default_timestamp_index() {
        let manager = IndexManager::new();
        assert!(manager.has_index("timestamp").await);

        manager.insert(&record(1000, Level::Info, "auth"), "segment_1.log", 0).await;

        let entries = manager.search("timestamp", "1000").await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].offset, 0);
        assert_eq!(entries[0].file_name, "segment_1.log");
    }

    #[tokio::test]
    async fn test_search_orders_by_timestamp() {
        let manager = IndexManager::new();
        manager.create_index("level", |r: &LogRecord| r.level.to_string()).await;

        manager.insert(&record(3000, Level::Error, "a"), "segment_1.log", 20).await;
        manager.insert(&record(1000, Level::Error, "a"), "segment_1.log", 0).await;
        manager.insert(&record(2000, Level::Info, "a"), "segment_1.log", 10).await;

        let entries = manager.search("level", "ERROR").await;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].timestamp, 1000);
        assert_eq!(entries[1].timestamp, 3000);
    }

    #[tokio::test]
    async fn test_empty_key_skips_insert() {
        let manager = IndexManager::new();
        manager
            .create_index("module", |r: &LogRecord| {
                r.property("module")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string()
            })
            .await;

        // no module property: indexed nowhere in "module"
        manager.insert(&record(1000, Level::Info, "auth"), "segment_1.log", 0).await;

        let mut with_module = record(2000, Level::Info, "billing");
        with_module.set_property("module", json!("billing"));
        manager.insert(&with_module, "segment_1.log", 50).await;

        assert_eq!(manager.search("module", "billing").await.len(), 1);
        assert!(manager.search("module", "").await.is_empty());
    }

    #[tokio::test]
    async fn test_range_search_inclusive_window() {
        let manager = IndexManager::new();
        for (i, ts) in [1000, 2000, 3000, 4000].iter().enumerate() {
            manager
                .insert(&record(*ts, Level::Info, "a"), "segment_1.log", i as u64 * 10)
                .await;
        }

        let entries = manager.range_search("timestamp", 2000, 3000).await;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].timestamp, 2000);
        assert_eq!(entries[1].timestamp, 3000);
    }

    #[tokio::test]
    async fn test_lookup_zero_window_matches_nothing() {
        let manager = IndexManager::new();
        manager.insert(&record(1000, Level::Info, "a"), "segment_1.log", 0).await;
        assert!(manager.lookup("timestamp", 0, 0, "").await.is_empty());
    }

    #[tokio::test]
    async fn test_lookup_filters_by_key_and_file() {
        let manager = IndexManager::new();
        manager.create_index("service", |r: &LogRecord| r.service.clone()).await;

        manager.insert(&record(1000, Level::Info, "auth"), "segment_1.log", 0).await;
        manager.insert(&record(2000, Level::Info, "billing"), "segment_1.log", 40).await;
        manager.insert(&record(3000, Level::Info, "auth"), "segment_2.log", 0).await;

        let offsets = manager.lookup("service", 0, 5000, "auth").await;
        assert_eq!(offsets, vec![0, 0]);

        let offsets = manager
            .lookup_in_file("service", 0, 5000, "auth", "segment_1.log")
            .await;
        assert_eq!(offsets, vec![0]);

        let offsets = manager
            .lookup_in_file("service", 0, 5000, "", "segment_1.log")
            .await;
        assert_eq!(offsets.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_index_returns_empty_not_error() {
        let manager = IndexManager::new();
        assert!(manager.search("nope", "k").await.is_empty());
        assert!(manager.range_search("nope", 0, 10).await.is_empty());
        assert!(manager.lookup("nope", 0, 10, "").await.is_empty());
    }

    #[tokio::test]
    async fn test_drop_index() {
        let manager = IndexManager::new();
        manager.create_index("level", |r: &LogRecord| r.level.to_string()).await;
        manager.drop_index("level").await.unwrap();
        assert!(!manager.has_index("level").await);

        let err = manager.drop_index("level").await.unwrap_err();
        assert!(matches!(err, Error::IndexNotFound(_)));
    }

    #[tokio::test]
    async fn test_same_key_and_timestamp_overwrites() {
        let manager = IndexManager::new();
        manager.insert(&record(1000, Level::Info, "a"), "segment_1.log", 0).await;
        manager.insert(&record(1000, Level::Info, "a"), "segment_1.log", 99).await;

        let entries = manager.search("timestamp", "1000").await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].offset, 99);
    }
}
