//! Decides when to trigger a checkpoint based on learned hotspots and
//! change points.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;

use crate::engine_hooks::EngineServices;
use crate::temporal::hotspot_detector::TemporalHotspot;

struct SchedulerState {
    scheduled_snapshots: Vec<u64>,
    last_snapshot_time_us: u64,
    total_snapshots: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct SnapshotThresholds {
    pub min_interval_us: u64,
    pub changepoint_recency_us: u64,
    pub hotspot_density_threshold: f64,
    pub hotspot_min_access_count: u64,
}

/// Triggers the engine's checkpoint on a recent change point or a
/// sufficiently dense hotspot, no more often than `min_interval_us`.
pub struct SmartSnapshotScheduler {
    engine: Arc<dyn EngineServices>,
    thresholds: SnapshotThresholds,
    state: Mutex<SchedulerState>,
}

impl SmartSnapshotScheduler {
    #[must_use]
    pub fn new(engine: Arc<dyn EngineServices>, thresholds: SnapshotThresholds) -> Self {
        Self {
            engine,
            thresholds,
            state: Mutex::new(SchedulerState {
                scheduled_snapshots: Vec::new(),
                last_snapshot_time_us: 0,
                total_snapshots: 0,
            }),
        }
    }

    /// Returns `true` if a checkpoint was triggered this call.
    pub fn evaluate(&self, hotspots: &[TemporalHotspot], change_points: &[u64], now_us: u64) -> bool {
        let mut state = self.state.lock();

        if !Self::should_snapshot(state.last_snapshot_time_us, now_us, self.thresholds.min_interval_us) {
            state.scheduled_snapshots = hotspots.iter().map(|h| h.center_timestamp_us).collect();
            return false;
        }

        let recent_change_point = change_points.iter().any(|&cp| {
            let age = now_us.saturating_sub(cp);
            age < self.thresholds.changepoint_recency_us
        });

        let dense_hotspot = hotspots.iter().any(|h| {
            h.density > self.thresholds.hotspot_density_threshold
                && h.access_count as u64 >= self.thresholds.hotspot_min_access_count
        });

        let should_trigger = recent_change_point || dense_hotspot;

        if should_trigger {
            info!(
                hotspots = hotspots.len(),
                change_points = change_points.len(),
                "smart snapshot triggered"
            );
            self.engine.begin_checkpoint();
            state.last_snapshot_time_us = now_us;
            state.total_snapshots += 1;
        }

        state.scheduled_snapshots = hotspots.iter().map(|h| h.center_timestamp_us).collect();
        should_trigger
    }

    #[must_use]
    pub fn get_scheduled_snapshots(&self) -> Vec<u64> {
        self.state.lock().scheduled_snapshots.clone()
    }

    #[must_use]
    pub fn get_last_snapshot_time(&self) -> u64 {
        self.state.lock().last_snapshot_time_us
    }

    #[must_use]
    pub fn get_total_snapshots_triggered(&self) -> usize {
        self.state.lock().total_snapshots
    }

    fn should_snapshot(last_snapshot_time_us: u64, now_us: u64, min_interval_us: u64) -> bool {
        if last_snapshot_time_us == 0 {
            return true;
        }
        now_us.saturating_sub(last_snapshot_time_us) >= min_interval_us
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_hooks::{IndexInfo, RecoveryResult};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingEngine {
        checkpoints: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl EngineServices for CountingEngine {
        async fn recover_to(&self, _target_timestamp_us: u64, _db_name: &str) -> RecoveryResult {
            RecoveryResult::ok(0, 0)
        }
        fn begin_checkpoint(&self) {
            self.checkpoints.fetch_add(1, Ordering::SeqCst);
        }
        fn get_row_count(&self, _table_name: &str) -> u64 {
            0
        }
        fn get_indexes(&self, _table_name: &str) -> Vec<IndexInfo> {
            Vec::new()
        }
    }

    fn thresholds() -> SnapshotThresholds {
        SnapshotThresholds {
            min_interval_us: 30_000_000,
            changepoint_recency_us: 300_000_000,
            hotspot_density_threshold: 1.0,
            hotspot_min_access_count: 10,
        }
    }

    fn hotspot(density: f64, access_count: usize) -> TemporalHotspot {
        TemporalHotspot {
            center_timestamp_us: 1_000_000,
            range_start_us: 900_000,
            range_end_us: 1_100_000,
            access_count,
            density,
        }
    }

    #[test]
    fn dense_hotspot_triggers_checkpoint() {
        let engine = Arc::new(CountingEngine { checkpoints: AtomicUsize::new(0) });
        let scheduler = SmartSnapshotScheduler::new(engine.clone(), thresholds());
        let triggered = scheduler.evaluate(&[hotspot(5.0, 20)], &[], 1_000_000);
        assert!(triggered);
        assert_eq!(engine.checkpoints.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.get_total_snapshots_triggered(), 1);
    }

    #[test]
    fn sparse_hotspot_does_not_trigger() {
        let engine = Arc::new(CountingEngine { checkpoints: AtomicUsize::new(0) });
        let scheduler = SmartSnapshotScheduler::new(engine, thresholds());
        let triggered = scheduler.evaluate(&[hotspot(0.1, 2)], &[], 1_000_000);
        assert!(!triggered);
    }

    #[test]
    fn respects_minimum_interval_between_snapshots() {
        let engine = Arc::new(CountingEngine { checkpoints: AtomicUsize::new(0) });
        let scheduler = SmartSnapshotScheduler::new(engine.clone(), thresholds());
        assert!(scheduler.evaluate(&[hotspot(5.0, 20)], &[], 1_000_000));
        // Too soon: 10s later, well under the 30s minimum interval.
        let triggered_again = scheduler.evaluate(&[hotspot(5.0, 20)], &[], 11_000_000);
        assert!(!triggered_again);
        assert_eq!(engine.checkpoints.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn recent_change_point_triggers_even_without_a_dense_hotspot() {
        let engine = Arc::new(CountingEngine { checkpoints: AtomicUsize::new(0) });
        let scheduler = SmartSnapshotScheduler::new(engine, thresholds());
        let triggered = scheduler.evaluate(&[], &[900_000], 1_000_000);
        assert!(triggered);
    }
}
