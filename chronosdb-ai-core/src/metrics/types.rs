//! Metric event types recorded by all three AI subsystems.

/// Discriminant for a recorded [`MetricEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    DmlInsert,
    DmlUpdate,
    DmlDelete,
    DmlSelect,
    ScanSeq,
    ScanIndex,
    TimeTravelQuery,
    AnomalyDetected,
    SnapshotTriggered,
}

/// An immutable metric event. Once written to the [`super::MetricsStore`]
/// it is never mutated; the store retains at most
/// `METRICS_RING_BUFFER_CAPACITY` events and overwrites the oldest on wrap.
#[derive(Debug, Clone)]
pub struct MetricEvent {
    pub kind: MetricKind,
    pub timestamp_us: u64,
    pub duration_us: u64,
    pub session_id: u32,
    pub user: String,
    pub table_name: String,
    pub db_name: String,
    pub rows_affected: u32,
    /// `0` = sequential scan, `1` = index scan. Meaningful only for
    /// `ScanSeq`/`ScanIndex` events.
    pub scan_strategy: u8,
    /// Target timestamp for `TimeTravelQuery` events.
    pub target_timestamp: u64,
}

impl MetricEvent {
    /// Build a minimal event for kinds that don't use every field,
    /// leaving the rest at their zero value.
    #[must_use]
    pub fn new(kind: MetricKind, timestamp_us: u64) -> Self {
        Self {
            kind,
            timestamp_us,
            duration_us: 0,
            session_id: 0,
            user: String::new(),
            table_name: String::new(),
            db_name: String::new(),
            rows_affected: 0,
            scan_strategy: 0,
            target_timestamp: 0,
        }
    }

    #[must_use]
    pub fn is_mutation(&self) -> bool {
        matches!(
            self.kind,
            MetricKind::DmlInsert | MetricKind::DmlUpdate | MetricKind::DmlDelete
        )
    }
}
