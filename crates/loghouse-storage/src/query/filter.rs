//! Filter tree evaluation.
//!
//! A query's predicates compile into one `Filter` tree which the executor
//! evaluates against every fetched record. Index pruning is only ever a
//! shortcut; this residual pass is what guarantees correct results.

use loghouse_core::LogRecord;
use serde_json::Value;

/// A compiled query predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Field { name: String, value: String },
    TimestampRange { start: i64, end: i64 },
}

impl Filter {
    pub fn matches(&self, record: &LogRecord) -> bool {
        match self {
            Filter::And(filters) => filters.iter().all(|f| f.matches(record)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(record)),
            Filter::Field { name, value } => matches_field(record, name, value),
            Filter::TimestampRange { start, end } => {
                // a zero bound means that side of the window is open
                (*start == 0 || record.timestamp >= *start)
                    && (*end == 0 || record.timestamp <= *end)
            }
        }
    }
}

/// Reserved field names match the fixed record fields (case-insensitive on
/// the name); `message` and `stacktrace` use substring containment, the rest
/// equality. Anything else probes the properties map.
fn matches_field(record: &LogRecord, name: &str, value: &str) -> bool {
    match name.to_ascii_lowercase().as_str() {
        "level" => record.level.as_str() == value,
        "service" => record.service == value,
        "host" => record.host == value,
        "message" => record.message.contains(value),
        "stacktrace" => record.stack_trace.contains(value),
        _ => record
            .properties
            .get(name)
            .map_or(false, |prop| property_equals(prop, value)),
    }
}

/// String properties compare directly; other JSON values compare against
/// their compact rendering (so a numeric property 3 matches "3").
fn property_equals(prop: &Value, value: &str) -> bool {
    match prop {
        Value::String(s) => s == value,
        other => other.to_string() == value,
    }
}
