//! Lock-light ring buffer for AI operation metrics.
//!
//! `record` increments an atomic write index and takes the shared slot
//! vector's write lock only long enough to write a single slot: readers
//! never observe a torn write, and a writer never contends with another
//! writer beyond that brief critical section. `query`/iteration take the
//! read lock for the duration of a snapshot copy.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;

use super::types::{MetricEvent, MetricKind};

/// Thread-safe fixed-capacity ring buffer for [`MetricEvent`]s.
///
/// A full buffer silently overwrites the oldest entry: metrics are
/// advisory and must never back-pressure query execution.
pub struct MetricsStore {
    capacity: usize,
    slots: RwLock<Vec<Option<MetricEvent>>>,
    write_index: AtomicUsize,
    count: AtomicUsize,
}

impl MetricsStore {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            slots: RwLock::new(vec![None; capacity]),
            write_index: AtomicUsize::new(0),
            count: AtomicUsize::new(0),
        }
    }

    /// Record a metric event. O(1); never blocks a writer against another
    /// writer beyond a single-slot write lock; never fails.
    pub fn record(&self, event: MetricEvent) {
        let idx = self.write_index.fetch_add(1, Ordering::SeqCst) % self.capacity;
        {
            let mut slots = self.slots.write();
            slots[idx] = Some(event);
        }
        let current = self.count.load(Ordering::SeqCst);
        if current < self.capacity {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// All events in insertion order (oldest first), regardless of
    /// time/kind filter. Used internally by the filtered accessors below.
    fn snapshot_ordered(&self) -> Vec<MetricEvent> {
        let slots = self.slots.read();
        let count = self.count.load(Ordering::SeqCst).min(self.capacity);
        let total_writes = self.write_index.load(Ordering::SeqCst);

        if count < self.capacity {
            // Buffer has never wrapped: slots [0, count) are in insertion order.
            return slots[..count].iter().filter_map(Clone::clone).collect();
        }

        // Buffer has wrapped: oldest entry is at `total_writes % capacity`.
        let start = total_writes % self.capacity;
        let mut out = Vec::with_capacity(self.capacity);
        for i in 0..self.capacity {
            let idx = (start + i) % self.capacity;
            if let Some(event) = &slots[idx] {
                out.push(event.clone());
            }
        }
        out
    }

    /// Events in `[start_us, end_us)` whose kind equals `kind_filter`.
    #[must_use]
    pub fn query(&self, start_us: u64, end_us: u64, kind_filter: MetricKind) -> Vec<MetricEvent> {
        self.snapshot_ordered()
            .into_iter()
            .filter(|e| {
                std::mem::discriminant(&e.kind) == std::mem::discriminant(&kind_filter)
                    && e.timestamp_us >= start_us
                    && e.timestamp_us < end_us
            })
            .collect()
    }

    /// Count of events of `kind` in the last `window_us` microseconds,
    /// relative to the latest event's timestamp (or `now_us` if provided
    /// events are empty).
    #[must_use]
    pub fn count_events(&self, kind: MetricKind, window_us: u64, now_us: u64) -> u64 {
        let cutoff = now_us.saturating_sub(window_us);
        self.snapshot_ordered()
            .into_iter()
            .filter(|e| {
                std::mem::discriminant(&e.kind) == std::mem::discriminant(&kind)
                    && e.timestamp_us >= cutoff
            })
            .count() as u64
    }

    /// Average `duration_us` (as milliseconds) for `kind` on `table` in the
    /// last `window_us` microseconds. Returns 0.0 if no matching events.
    #[must_use]
    pub fn average_duration(
        &self,
        kind: MetricKind,
        table: &str,
        window_us: u64,
        now_us: u64,
    ) -> f64 {
        let cutoff = now_us.saturating_sub(window_us);
        let matching: Vec<u64> = self
            .snapshot_ordered()
            .into_iter()
            .filter(|e| {
                std::mem::discriminant(&e.kind) == std::mem::discriminant(&kind)
                    && e.table_name == table
                    && e.timestamp_us >= cutoff
            })
            .map(|e| e.duration_us)
            .collect();
        if matching.is_empty() {
            return 0.0;
        }
        let total: u64 = matching.iter().sum();
        (total as f64 / matching.len() as f64) / 1000.0
    }

    /// Table-specific mutation row volume (INSERT+UPDATE+DELETE,
    /// summed `rows_affected`) in the last `window_us` microseconds.
    #[must_use]
    pub fn get_mutation_count(&self, table: &str, window_us: u64, now_us: u64) -> u64 {
        let cutoff = now_us.saturating_sub(window_us);
        self.snapshot_ordered()
            .into_iter()
            .filter(|e| e.is_mutation() && e.table_name == table && e.timestamp_us >= cutoff)
            .map(|e| u64::from(e.rows_affected))
            .sum()
    }

    /// User-specific event count for `kind` in the last `window_us`
    /// microseconds.
    #[must_use]
    pub fn get_user_event_count(
        &self,
        user: &str,
        kind: MetricKind,
        window_us: u64,
        now_us: u64,
    ) -> u64 {
        let cutoff = now_us.saturating_sub(window_us);
        self.snapshot_ordered()
            .into_iter()
            .filter(|e| {
                std::mem::discriminant(&e.kind) == std::mem::discriminant(&kind)
                    && e.user == user
                    && e.timestamp_us >= cutoff
            })
            .count() as u64
    }

    /// Total events ever recorded (not bounded by capacity).
    #[must_use]
    pub fn get_total_recorded(&self) -> u64 {
        self.write_index.load(Ordering::SeqCst) as u64
    }

    /// Clear all metrics.
    pub fn reset(&self) {
        let mut slots = self.slots.write();
        slots.iter_mut().for_each(|s| *s = None);
        self.write_index.store(0, Ordering::SeqCst);
        self.count.store(0, Ordering::SeqCst);
    }
}
