//! Types and traits at the boundary between the AI layer and the execution
//! engine. The engine is an external
//! collaborator: this module only specifies what the core needs from it.

use std::fmt;

/// The four DML operation kinds the engine reports to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DmlOperation {
    Insert,
    Update,
    Delete,
    Select,
}

impl fmt::Display for DmlOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DmlOperation::Insert => "INSERT",
            DmlOperation::Update => "UPDATE",
            DmlOperation::Delete => "DELETE",
            DmlOperation::Select => "SELECT",
        };
        write!(f, "{s}")
    }
}

/// Ephemeral event passed between the engine and observers around every
/// DML operation. Unlike [`super::metrics::MetricEvent`] this is never
/// stored; it exists only for the duration of a single before/after call.
#[derive(Debug, Clone)]
pub struct DmlEvent {
    pub operation: DmlOperation,
    pub table_name: String,
    pub db_name: String,
    pub user: String,
    pub session_id: u32,
    pub rows_affected: u32,
    pub start_time_us: u64,
    pub duration_us: u64,

    // SELECT-only fields.
    pub used_index_scan: bool,
    pub where_clause_count: usize,
    pub has_order_by: bool,
    pub has_limit: bool,
    pub result_row_count: i32,
}

impl DmlEvent {
    #[must_use]
    pub fn new(operation: DmlOperation, table_name: impl Into<String>, start_time_us: u64) -> Self {
        Self {
            operation,
            table_name: table_name.into(),
            db_name: String::new(),
            user: String::new(),
            session_id: 0,
            rows_affected: 0,
            start_time_us,
            duration_us: 0,
            used_index_scan: false,
            where_clause_count: 0,
            has_order_by: false,
            has_limit: false,
            result_row_count: 0,
        }
    }

    #[must_use]
    pub fn is_mutation(&self) -> bool {
        !matches!(self.operation, DmlOperation::Select)
    }
}

/// Outcome of the engine's `recover_to` entry point.
#[derive(Debug, Clone)]
pub struct RecoveryResult {
    pub success: bool,
    pub records_processed: u64,
    pub elapsed_ms: u64,
    pub error_message: Option<String>,
}

impl RecoveryResult {
    #[must_use]
    pub fn ok(records_processed: u64, elapsed_ms: u64) -> Self {
        Self {
            success: true,
            records_processed,
            elapsed_ms,
            error_message: None,
        }
    }

    #[must_use]
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            records_processed: 0,
            elapsed_ms: 0,
            error_message: Some(reason.into()),
        }
    }
}

/// Read-only catalog index description used by the feature extractor.
#[derive(Debug, Clone)]
pub struct IndexInfo {
    pub column: String,
}

/// Everything the AI layer consumes from the execution engine: point-in-time
/// recovery, checkpoint triggering, and read-only catalog lookups. The
/// engine itself (parser, executors, B+-tree, buffer pool, WAL, catalog
/// persistence) is out of scope and is represented here only by this
/// trait boundary.
#[async_trait::async_trait]
pub trait EngineServices: Send + Sync {
    /// Point-in-time recovery for `db_name` to `target_timestamp_us`.
    async fn recover_to(&self, target_timestamp_us: u64, db_name: &str) -> RecoveryResult;

    /// Fire-and-forget checkpoint trigger.
    fn begin_checkpoint(&self);

    /// Current row count estimate for a table (0 if unknown).
    fn get_row_count(&self, table_name: &str) -> u64;

    /// Indexes declared on a table.
    fn get_indexes(&self, table_name: &str) -> Vec<IndexInfo>;
}
