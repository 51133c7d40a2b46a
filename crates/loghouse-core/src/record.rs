//! Log Record Data Structure
//!
//! This module defines the core `LogRecord` type - the unit of data flowing
//! through the entire engine.
//!
//! ## What is a LogRecord?
//! A single structured log event, similar to:
//! - A line shipped by a log forwarder
//! - An application log call with structured context
//!
//! ## Structure
//! Each record contains:
//! - **timestamp**: When the event happened (milliseconds since epoch).
//!   Arrival order is not assumed to be timestamp order.
//! - **level**: One of `DEBUG`, `INFO`, `ERROR`
//! - **service** / **host**: Where the event came from
//! - **message** / **stack_trace**: Free-form text, may be empty
//! - **properties**: Free-form string-keyed JSON values
//!
//! ## Wire Format
//! Records serialize as one JSON object per line in both the WAL and segment
//! files, with PascalCase field names:
//!
//! ```json
//! {"Timestamp":1700000000000,"Level":"INFO","Service":"auth","Host":"web-1",
//!  "Message":"login ok","StackTrace":"","Properties":{"user":"u1"}}
//! ```
//!
//! Absent `Properties` decode as an empty map; unknown top-level fields are
//! ignored so newer writers stay readable.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Free-form record properties (string keys, arbitrary JSON values)
pub type Properties = serde_json::Map<String, Value>;

/// Severity of a log record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Debug,
    Info,
    Error,
}

impl Level {
    /// The canonical wire spelling (`"DEBUG"`, `"INFO"`, `"ERROR"`)
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Error => "ERROR",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "DEBUG" => Ok(Level::Debug),
            "INFO" => Ok(Level::Info),
            "ERROR" => Ok(Level::Error),
            other => Err(Error::InvalidLevel(other.to_string())),
        }
    }
}

/// A single structured log record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LogRecord {
    /// Milliseconds since epoch
    pub timestamp: i64,

    pub level: Level,

    pub service: String,

    pub host: String,

    pub message: String,

    pub stack_trace: String,

    /// Free-form properties; absent on the wire means empty
    #[serde(default)]
    pub properties: Properties,
}

impl LogRecord {
    /// Create a record stamped with the current wall clock.
    pub fn new(
        level: Level,
        service: impl Into<String>,
        host: impl Into<String>,
        message: impl Into<String>,
        stack_trace: impl Into<String>,
        properties: Properties,
    ) -> Self {
        Self {
            timestamp: now_millis(),
            level,
            service: service.into(),
            host: host.into(),
            message: message.into(),
            stack_trace: stack_trace.into(),
            properties,
        }
    }

    /// Set (or replace) a property value.
    pub fn set_property(&mut self, key: impl Into<String>, value: Value) {
        self.properties.insert(key.into(), value);
    }

    /// Look up a property value.
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }
}

/// Current wall-clock time in milliseconds since epoch
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
