//! Query planning: filter tree construction, segment pruning, and
//! index-driven offset selection.
//!
//! The planner decides which segment files could hold matching records and,
//! per segment, which byte offsets to read. An empty offset list for a
//! segment means "no usable index information"; the executor answers that
//! with a full scan, which is what keeps pruning sound when no index covers
//! the predicate.

use std::collections::HashSet;
use std::path::PathBuf;

use tracing::debug;

use crate::index::IndexManager;
use crate::manifest::{Manifest, SegmentMeta};
use crate::segment::SegmentManager;

use super::filter::Filter;
use super::{Query, DEFAULT_LIMIT};

/// One segment file selected for reading.
#[derive(Debug, Clone)]
pub struct SegmentCandidate {
    pub path: PathBuf,
    pub file_name: String,
    /// Byte offsets to read; empty means scan the whole file
    pub offsets: Vec<u64>,
}

/// What the executor runs: candidate segments in manifest order (active
/// segment last), the compiled filter, and the result shaping knobs.
#[derive(Debug, Clone)]
pub struct QueryPlan {
    pub segments: Vec<SegmentCandidate>,
    pub filter: Option<Filter>,
    pub limit: usize,
    pub sort_asc: bool,
}

/// Build the execution plan for a query.
pub async fn plan_query(
    query: &Query,
    indexes: &IndexManager,
    manifest: &Manifest,
    segments: &SegmentManager,
) -> QueryPlan {
    let limit = if query.limit == 0 { DEFAULT_LIMIT } else { query.limit };
    let filter = build_filter(query);

    let mut candidates = Vec::new();
    for meta in manifest.get_segments().await {
        if overlaps(&meta, query.start_time, query.end_time) {
            candidates.push(candidate(query, indexes, segments, &meta).await);
        }
    }

    let active = segments.active_meta().await;
    if overlaps(&active, query.start_time, query.end_time) {
        candidates.push(candidate(query, indexes, segments, &active).await);
    }

    debug!(
        candidates = candidates.len(),
        limit,
        has_filter = filter.is_some(),
        "Query planned"
    );

    QueryPlan {
        segments: candidates,
        filter,
        limit,
        sort_asc: query.sort_asc,
    }
}

/// Left-associative filter stack: a timestamp window seeds the stack when
/// either bound is set; each expression pushes, except an `OR` which folds
/// into the top of the stack. More than one survivor becomes a top-level
/// `And`.
fn build_filter(query: &Query) -> Option<Filter> {
    let mut stack: Vec<Filter> = Vec::new();

    if query.start_time != 0 || query.end_time != 0 {
        stack.push(Filter::TimestampRange {
            start: query.start_time,
            end: query.end_time,
        });
    }

    for expr in &query.filters {
        let next = Filter::Field {
            name: expr.field.clone(),
            value: expr.value.clone(),
        };
        match stack.pop() {
            Some(top) if expr.operator == "OR" => stack.push(Filter::Or(vec![top, next])),
            Some(top) => {
                stack.push(top);
                stack.push(next);
            }
            None => stack.push(next),
        }
    }

    match stack.len() {
        0 => None,
        1 => stack.pop(),
        _ => Some(Filter::And(stack)),
    }
}

/// A segment can hold matches when its timestamp bounds overlap the query
/// window; a zero query bound leaves that side open.
fn overlaps(meta: &SegmentMeta, start: i64, end: i64) -> bool {
    (start == 0 || meta.max_timestamp >= start) && (end == 0 || meta.min_timestamp <= end)
}

async fn candidate(
    query: &Query,
    indexes: &IndexManager,
    segments: &SegmentManager,
    meta: &SegmentMeta,
) -> SegmentCandidate {
    SegmentCandidate {
        path: segments.dir().join(&meta.file_name),
        file_name: meta.file_name.clone(),
        offsets: offsets_for_segment(query, indexes, &meta.file_name).await,
    }
}

/// Best-effort index pruning for one segment: seed with the timestamp index,
/// then intersect with every per-field lookup that knows anything. A lookup
/// that returns nothing contributes nothing rather than vetoing the segment.
async fn offsets_for_segment(
    query: &Query,
    indexes: &IndexManager,
    file_name: &str,
) -> Vec<u64> {
    let mut offsets = indexes
        .lookup_in_file("timestamp", query.start_time, query.end_time, "", file_name)
        .await;

    for expr in &query.filters {
        let indexed = indexes
            .lookup_in_file(
                &expr.field,
                query.start_time,
                query.end_time,
                &expr.value,
                file_name,
            )
            .await;
        if indexed.is_empty() {
            continue;
        }
        if offsets.is_empty() {
            offsets = indexed;
        } else {
            offsets = intersect(&offsets, &indexed);
        }
    }

    offsets
}

fn intersect(a: &[u64], b: &[u64]) -> Vec<u64> {
    let known: HashSet<u64> = a.iter().copied().collect();
    b.iter().copied().filter(|v| known.contains(v)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::FilterExpr;

    fn expr(field: &str, value: &str, operator: &str) -> FilterExpr {
        FilterExpr {
            field: field.to_string(),
            value: value.to_string(),
            operator: operator.to_string(),
        }
    }

    fn query(start: i64, end: i64, filters: Vec<FilterExpr>) -> Query {
        Query {
            start_time: start,
            end_time: end,
            filters,
            limit: 0,
            sort_asc: true,
        }
    }

    #[test]
    fn test_build_filter_empty() {
        assert_eq!(build_filter(&query(0, 0, vec![])), None);
    }

    #[test]
    fn test_build_filter_timestamp_only() {
        let filter = build_filter(&query(10, 20, vec![])).unwrap();
        assert_eq!(filter, Filter::TimestampRange { start: 10, end: 20 });
    }

    #[test]
    fn test_build_filter_ands_by_default() {
        let filter = build_filter(&query(
            10,
            20,
            vec![expr("Level", "ERROR", ""), expr("Service", "auth", "AND")],
        ))
        .unwrap();
        match filter {
            Filter::And(parts) => {
                assert_eq!(parts.len(), 3);
                assert_eq!(parts[0], Filter::TimestampRange { start: 10, end: 20 });
            }
            other => panic!("expected And, got {:?}", other),
        }
    }

    #[test]
    fn test_build_filter_or_folds_into_top() {
        let filter = build_filter(&query(
            0,
            0,
            vec![expr("Level", "ERROR", ""), expr("Level", "INFO", "OR")],
        ))
        .unwrap();
        match filter {
            Filter::Or(parts) => {
                assert_eq!(parts.len(), 2);
                assert_eq!(
                    parts[1],
                    Filter::Field {
                        name: "Level".to_string(),
                        value: "INFO".to_string()
                    }
                );
            }
            other => panic!("expected Or, got {:?}", other),
        }
    }

    #[test]
    fn test_build_filter_or_with_empty_stack_pushes() {
        // leading OR has nothing to fold into and degrades to a plain push
        let filter = build_filter(&query(0, 0, vec![expr("Level", "ERROR", "OR")])).unwrap();
        assert_eq!(
            filter,
            Filter::Field {
                name: "Level".to_string(),
                value: "ERROR".to_string()
            }
        );
    }

    #[test]
    fn test_overlaps_pruning_predicate() {
        let meta = SegmentMeta {
            file_name: "segment_1.log".to_string(),
            size: 10,
            min_timestamp: 100,
            max_timestamp: 200,
        };
        assert!(overlaps(&meta, 150, 250));
        assert!(overlaps(&meta, 0, 150));
        assert!(overlaps(&meta, 150, 0));
        assert!(overlaps(&meta, 0, 0));
        assert!(!overlaps(&meta, 201, 300));
        assert!(!overlaps(&meta, 0, 99));
    }

    #[test]
    fn test_intersect_keeps_second_operand_order() {
        assert_eq!(intersect(&[1, 2, 3], &[3, 5, 1]), vec![3, 1]);
        assert!(intersect(&[1, 2], &[4, 5]).is_empty());
    }
}
