//! Transforms a SELECT query plus catalog lookups into the numerical
//! feature vector consumed by the scan-strategy bandit.

use crate::engine_hooks::EngineServices;

pub const QUERY_FEATURE_DIMENSIONS: usize = 8;

/// Comparison operator of a single WHERE predicate, used only to drive the
/// selectivity heuristic and the "is the first predicate an equality"
/// feature — no general expression evaluation lives here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredicateOp {
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
    In,
}

#[derive(Debug, Clone)]
pub struct WherePredicate {
    pub column: String,
    pub op: PredicateOp,
}

/// Minimal read-only view of a SELECT statement the extractor needs —
/// provided by the execution engine, not constructed by the AI layer.
#[derive(Debug, Clone, Default)]
pub struct SelectQuery {
    pub where_clause: Vec<WherePredicate>,
    pub select_all: bool,
    pub columns: Vec<String>,
    pub has_order_by: bool,
    pub limit: Option<u64>,
}

/// Numerical feature vector extracted from a SELECT statement; context for
/// the UCB1 bandit's strategy selection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryFeatures {
    pub table_row_count_log: f64,
    pub where_clause_count: f64,
    pub has_equality_predicate: f64,
    pub has_index_available: f64,
    pub selectivity_estimate: f64,
    pub column_count: f64,
    pub has_order_by: f64,
    pub has_limit: f64,
}

impl QueryFeatures {
    #[must_use]
    pub fn to_array(self) -> [f64; QUERY_FEATURE_DIMENSIONS] {
        [
            self.table_row_count_log,
            self.where_clause_count,
            self.has_equality_predicate,
            self.has_index_available,
            self.selectivity_estimate,
            self.column_count,
            self.has_order_by,
            self.has_limit,
        ]
    }
}

/// Single responsibility: transform a [`SelectQuery`] into a
/// [`QueryFeatures`] vector. Read-only; never modifies the engine.
pub struct QueryFeatureExtractor {
    engine: std::sync::Arc<dyn EngineServices>,
}

impl QueryFeatureExtractor {
    #[must_use]
    pub fn new(engine: std::sync::Arc<dyn EngineServices>) -> Self {
        Self { engine }
    }

    #[must_use]
    pub fn extract(&self, stmt: &SelectQuery, table_name: &str) -> QueryFeatures {
        let row_count = self.engine.get_row_count(table_name) as f64;
        let table_row_count_log = if row_count > 0.0 { row_count.log2() } else { 0.0 };

        let has_equality_predicate = stmt
            .where_clause
            .first()
            .is_some_and(|p| p.op == PredicateOp::Eq);
        let has_index_available = self.has_index_for_first_predicate(stmt, table_name);
        let selectivity_estimate = Self::estimate_selectivity(stmt);

        let column_count = if stmt.select_all {
            // No live schema lookup beyond row/index counts is exposed on
            // EngineServices; default to 1.0 when the projected column
            // count can't be resolved.
            1.0
        } else {
            stmt.columns.len() as f64
        };

        QueryFeatures {
            table_row_count_log,
            where_clause_count: stmt.where_clause.len() as f64,
            has_equality_predicate: f64::from(has_equality_predicate),
            has_index_available: f64::from(has_index_available),
            selectivity_estimate,
            column_count,
            has_order_by: f64::from(stmt.has_order_by),
            has_limit: f64::from(stmt.limit.is_some()),
        }
    }

    fn estimate_selectivity(stmt: &SelectQuery) -> f64 {
        if stmt.where_clause.is_empty() {
            return 1.0;
        }
        stmt.where_clause.iter().fold(1.0, |selectivity, cond| {
            selectivity
                * match cond.op {
                    PredicateOp::Eq => 0.1,
                    PredicateOp::Lt | PredicateOp::Gt | PredicateOp::Le | PredicateOp::Ge => 0.33,
                    PredicateOp::NotEq => 0.9,
                    PredicateOp::Like => 0.25,
                    PredicateOp::In => 1.0,
                }
        })
    }

    fn has_index_for_first_predicate(&self, stmt: &SelectQuery, table_name: &str) -> bool {
        let Some(first) = stmt.where_clause.first() else {
            return false;
        };
        self.engine
            .get_indexes(table_name)
            .iter()
            .any(|idx| idx.column == first.column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_hooks::{IndexInfo, RecoveryResult};

    struct StubEngine;

    #[async_trait::async_trait]
    impl EngineServices for StubEngine {
        async fn recover_to(&self, _target_timestamp_us: u64, _db_name: &str) -> RecoveryResult {
            RecoveryResult::ok(0, 0)
        }
        fn begin_checkpoint(&self) {}
        fn get_row_count(&self, _table_name: &str) -> u64 {
            1024
        }
        fn get_indexes(&self, _table_name: &str) -> Vec<IndexInfo> {
            vec![IndexInfo { column: "id".to_string() }]
        }
    }

    fn extractor() -> QueryFeatureExtractor {
        QueryFeatureExtractor::new(std::sync::Arc::new(StubEngine))
    }

    #[test]
    fn equality_predicate_on_indexed_column_is_detected() {
        let stmt = SelectQuery {
            where_clause: vec![WherePredicate { column: "id".to_string(), op: PredicateOp::Eq }],
            ..Default::default()
        };
        let features = extractor().extract(&stmt, "orders");
        assert_eq!(features.has_equality_predicate, 1.0);
        assert_eq!(features.has_index_available, 1.0);
        assert!((features.selectivity_estimate - 0.1).abs() < 1e-12);
        assert_eq!(features.table_row_count_log, 1024f64.log2());
    }

    #[test]
    fn range_predicate_on_unindexed_column_lowers_selectivity_confidence() {
        let stmt = SelectQuery {
            where_clause: vec![WherePredicate { column: "created_at".to_string(), op: PredicateOp::Gt }],
            ..Default::default()
        };
        let features = extractor().extract(&stmt, "orders");
        assert_eq!(features.has_equality_predicate, 0.0);
        assert_eq!(features.has_index_available, 0.0);
        assert!((features.selectivity_estimate - 0.33).abs() < 1e-12);
    }

    #[test]
    fn no_predicates_means_full_scan_selectivity() {
        let stmt = SelectQuery::default();
        let features = extractor().extract(&stmt, "orders");
        assert_eq!(features.selectivity_estimate, 1.0);
        assert_eq!(features.where_clause_count, 0.0);
    }

    #[test]
    fn multiple_predicates_multiply_selectivity() {
        let stmt = SelectQuery {
            where_clause: vec![
                WherePredicate { column: "id".to_string(), op: PredicateOp::Eq },
                WherePredicate { column: "status".to_string(), op: PredicateOp::Eq },
            ],
            ..Default::default()
        };
        let features = extractor().extract(&stmt, "orders");
        assert!((features.selectivity_estimate - 0.01).abs() < 1e-12);
    }
}
