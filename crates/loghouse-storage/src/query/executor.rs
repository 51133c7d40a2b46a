//! Plan execution: fetch, residual filter, sort, limit.

use loghouse_core::LogRecord;
use tracing::debug;

use crate::error::Result;
use crate::segment::SegmentManager;

use super::planner::QueryPlan;

/// Run a plan against the segment files.
///
/// Accumulation stops as soon as `limit` records pass the filter; the final
/// sort orders whatever was accumulated, so the limit is stable under sort.
pub async fn execute_plan(plan: &QueryPlan, segments: &SegmentManager) -> Result<Vec<LogRecord>> {
    let mut results: Vec<LogRecord> = Vec::new();

    'segments: for candidate in &plan.segments {
        let records = segments.read_segment(&candidate.path, &candidate.offsets).await?;
        for record in records {
            let keep = match &plan.filter {
                Some(filter) => filter.matches(&record),
                None => true,
            };
            if keep {
                results.push(record);
                if results.len() >= plan.limit {
                    break 'segments;
                }
            }
        }
    }

    if plan.sort_asc {
        results.sort_by_key(|record| record.timestamp);
    } else {
        results.sort_by_key(|record| std::cmp::Reverse(record.timestamp));
    }

    debug!(results = results.len(), "Query executed");
    Ok(results)
}
