//! Storage Error Types
//!
//! This module defines all error types that can occur during storage
//! operations.
//!
//! ## Error Categories
//!
//! ### I/O Errors
//! - `Io`: any filesystem failure (open, write, fsync, rename, remove)
//!
//! ### Decode Errors
//! - `Decode`: JSON decode of a record, WAL meta, manifest, or query body
//!
//! ### Index Errors
//! - `IndexNotFound`: dropping an index that was never registered
//!
//! ### Record Errors
//! - `Record`: invalid record construction (unknown log level)
//!
//! ## Usage
//!
//! All storage operations return `Result<T>` which is aliased to
//! `Result<T, Error>`. This allows clean error propagation with `?`.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Index not found: {0}")]
    IndexNotFound(String),

    #[error(transparent)]
    Record(#[from] loghouse_core::Error),
}
