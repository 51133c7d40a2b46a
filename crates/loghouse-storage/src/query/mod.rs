//! Query Pipeline
//!
//! Answers filtered range queries over the segment corpus in two stages:
//!
//! 1. **Plan**: prune segments by timestamp bounds, pick byte offsets from
//!    the secondary indexes where they help, and compile the filter tree.
//! 2. **Execute**: read only the selected offsets (or scan when the indexes
//!    had nothing to say), re-check every record against the filter tree,
//!    sort by timestamp, and cap at the limit.
//!
//! The wire shape of a query matches the HTTP API:
//!
//! ```json
//! {"StartTime":1700000000000,"EndTime":1700000010000,
//!  "Filters":[{"Field":"Level","Value":"ERROR"},
//!             {"Field":"Level","Value":"INFO","Operator":"OR"}],
//!  "Limit":50,"SortAsc":true}
//! ```
//!
//! The filter list is a flat left-associative grammar: expressions AND
//! together unless one carries `"Operator":"OR"`, which merges it with the
//! expression before it. Callers needing richer boolean structure compose
//! queries themselves.

mod executor;
mod filter;
mod planner;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use loghouse_core::LogRecord;

use crate::error::Result;
use crate::index::IndexManager;
use crate::manifest::Manifest;
use crate::segment::SegmentManager;

pub use executor::execute_plan;
pub use filter::Filter;
pub use planner::{plan_query, QueryPlan, SegmentCandidate};

/// Limit applied when a query leaves `Limit` unset.
pub const DEFAULT_LIMIT: usize = 100;

/// A single filter expression in the flat query grammar.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct FilterExpr {
    pub field: String,
    pub value: String,
    /// `"AND"` (the default, also for empty) or `"OR"`
    pub operator: String,
}

/// A filtered range query over the corpus.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Query {
    /// Window start in millis; 0 leaves the start open
    pub start_time: i64,

    /// Window end in millis; 0 leaves the end open
    pub end_time: i64,

    pub filters: Vec<FilterExpr>,

    /// Maximum records returned; 0 means [`DEFAULT_LIMIT`]
    pub limit: usize,

    /// Sort results by timestamp ascending (true) or descending (false)
    pub sort_asc: bool,
}

/// Plans and executes queries against the manifest, indexes, and segments.
pub struct QueryEngine {
    indexes: Arc<IndexManager>,
    manifest: Arc<Manifest>,
    segments: Arc<SegmentManager>,
}

impl QueryEngine {
    pub fn new(
        indexes: Arc<IndexManager>,
        manifest: Arc<Manifest>,
        segments: Arc<SegmentManager>,
    ) -> Self {
        Self {
            indexes,
            manifest,
            segments,
        }
    }

    pub async fn execute(&self, query: &Query) -> Result<Vec<LogRecord>> {
        let plan = plan_query(query, &self.indexes, &self.manifest, &self.segments).await;
        execute_plan(&plan, &self.segments).await
    }
}
