//! Error Types for Loghouse
//!
//! This module defines the error type shared by the record model. The storage
//! crate wraps it in its own error enum together with I/O and decode errors.
//!
//! ## Usage
//! All fallible functions return `Result<T>` which is aliased to
//! `Result<T, Error>`. This allows using `?` for error propagation.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid log level: {0}")]
    InvalidLevel(String),
}

pub type Result<T> = std::result::Result<T, Error>;
