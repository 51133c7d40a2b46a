//! Store Configuration
//!
//! This module defines configuration for a `LogStore` mount.
//!
//! ## StoreConfig
//!
//! Controls where data lives and when files roll:
//!
//! - **data_dir**: Mount directory holding WAL files, segments, and the
//!   manifest (default: `./loghouse_data`)
//! - **segment_max_size**: Roll the active segment when it reaches this many
//!   bytes (default: 16MB)
//! - **flush_interval_ms**: Background flush cadence (default: 1000ms). This
//!   also bounds WAL file size: the coordinator rotates the WAL at the end
//!   of every non-empty flush, so one WAL file holds at most one interval
//!   of appends.
//!
//! ## Usage
//!
//! ```ignore
//! use loghouse_storage::StoreConfig;
//!
//! let config = StoreConfig {
//!     data_dir: "/var/lib/loghouse".into(),
//!     segment_max_size: 4 * 1024 * 1024,
//!     ..Default::default()
//! };
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Mount directory for all on-disk state
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Maximum active segment size in bytes before rotation (default: 16MB)
    #[serde(default = "default_segment_max_size")]
    pub segment_max_size: u64,

    /// Background flush interval in milliseconds (default: 1000)
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
}

impl StoreConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            segment_max_size: default_segment_max_size(),
            flush_interval_ms: default_flush_interval_ms(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./loghouse_data")
}

fn default_segment_max_size() -> u64 {
    16 * 1024 * 1024 // 16MB
}

fn default_flush_interval_ms() -> u64 {
    1000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.segment_max_size, 16 * 1024 * 1024);
        assert_eq!(config.flush_interval(), Duration::from_millis(1000));
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: StoreConfig =
            serde_json::from_str(r#"{"segment_max_size": 1024}"#).unwrap();
        assert_eq!(config.segment_max_size, 1024);
        assert_eq!(config.flush_interval_ms, 1000);
        assert_eq!(config.data_dir, PathBuf::from("./loghouse_data"));
    }
}
