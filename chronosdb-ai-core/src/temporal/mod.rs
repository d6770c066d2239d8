//! Temporal Index Manager: observes time-travel queries, detects temporal
//! hotspots and change points, schedules smart snapshots, and adapts WAL
//! retention.

mod access_tracker;
mod hotspot_detector;
mod retention_manager;
mod snapshot_scheduler;

pub use access_tracker::{FrequencyBucket, TemporalAccessEvent, TemporalAccessTracker};
pub use hotspot_detector::{HotspotDetector, HotspotThresholds, TemporalHotspot};
pub use retention_manager::{RetentionPolicy, RetentionStats, WalRetentionManager};
pub use snapshot_scheduler::{SmartSnapshotScheduler, SnapshotThresholds};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::constants::AiConfig;
use crate::engine_hooks::EngineServices;
use crate::metrics::{MetricEvent, MetricKind, MetricsStore};
use crate::scheduler::AiScheduler;

/// Summary counters for "SHOW AI STATUS".
#[derive(Debug, Clone)]
pub struct TemporalSummary {
    pub hotspots_detected: usize,
    pub time_travel_queries_tracked: usize,
    pub smart_snapshots_triggered: usize,
}

/// Composition root for the four temporal sub-parts.
pub struct TemporalIndexManager {
    clock: Arc<dyn Clock>,
    access_tracker: TemporalAccessTracker,
    hotspot_detector: HotspotDetector,
    snapshot_scheduler: SmartSnapshotScheduler,
    retention_manager: WalRetentionManager,
    metrics: Arc<MetricsStore>,
    current_hotspots: RwLock<Vec<TemporalHotspot>>,
    active: AtomicBool,
}

impl TemporalIndexManager {
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        engine: Arc<dyn EngineServices>,
        metrics: Arc<MetricsStore>,
        config: &AiConfig,
    ) -> Self {
        let access_tracker = TemporalAccessTracker::new(config.access_pattern_window_size);
        let hotspot_detector = HotspotDetector::new(HotspotThresholds {
            cluster_epsilon_us: config.hotspot_cluster_epsilon_us,
            cluster_min_points: config.hotspot_cluster_min_points,
            cusum_threshold_sigma_mult: config.cusum_threshold_sigma_mult,
            cusum_drift_sigma_mult: config.cusum_drift_sigma_mult,
        });
        let snapshot_scheduler = SmartSnapshotScheduler::new(
            engine,
            SnapshotThresholds {
                min_interval_us: config.snapshot_min_interval_us,
                changepoint_recency_us: config.snapshot_changepoint_recency_us,
                hotspot_density_threshold: config.snapshot_hotspot_density_threshold,
                hotspot_min_access_count: config.snapshot_hotspot_min_access_count,
            },
        );
        let retention_manager = WalRetentionManager::new(
            config.retention_hot_retention_us,
            config.retention_cold_cutoff_us,
            config.retention_top_hot_timestamps,
        );

        Self {
            clock,
            access_tracker,
            hotspot_detector,
            snapshot_scheduler,
            retention_manager,
            metrics,
            current_hotspots: RwLock::new(Vec::new()),
            active: AtomicBool::new(false),
        }
    }

    /// Register the periodic analysis task with the shared scheduler.
    pub fn start(self: &Arc<Self>, scheduler: &Arc<AiScheduler>, interval_ms: u64) {
        self.active.store(true, Ordering::SeqCst);
        let this = Arc::clone(self);
        scheduler.schedule_periodic("TemporalIndexManager::periodic_analysis", interval_ms, move || {
            let this = Arc::clone(&this);
            async move {
                this.periodic_analysis();
            }
        });
        info!(interval_ms, "temporal index manager started");
    }

    pub fn stop(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    pub fn on_time_travel_query(&self, table_name: &str, target_timestamp_us: u64, db_name: &str) {
        if !self.active.load(Ordering::SeqCst) {
            return;
        }
        let now = self.clock.now_us();
        self.access_tracker.record_access(TemporalAccessEvent {
            queried_timestamp_us: target_timestamp_us,
            query_time_us: now,
            table_name: table_name.to_string(),
            db_name: db_name.to_string(),
        });

        let mut metric = MetricEvent::new(MetricKind::TimeTravelQuery, now);
        metric.table_name = table_name.to_string();
        metric.db_name = db_name.to_string();
        metric.target_timestamp = target_timestamp_us;
        self.metrics.record(metric);
    }

    fn periodic_analysis(&self) {
        if !self.active.load(Ordering::SeqCst) {
            return;
        }
        let events = self.access_tracker.get_all_events();
        if events.is_empty() {
            return;
        }

        let hotspots = self.hotspot_detector.detect_hotspots(&events);

        let histogram = self.access_tracker.get_frequency_histogram(60_000_000, 1_000);
        let rates: Vec<f64> = histogram.iter().map(|b| b.access_count as f64).collect();
        let timestamps: Vec<u64> = histogram.iter().map(|b| b.start_us).collect();
        let change_points = self.hotspot_detector.detect_change_points(&rates, &timestamps);

        *self.current_hotspots.write() = hotspots.clone();

        let now = self.clock.now_us();
        if self.snapshot_scheduler.evaluate(&hotspots, &change_points, now) {
            let mut metric = MetricEvent::new(MetricKind::SnapshotTriggered, now);
            metric.rows_affected = hotspots.len() as u32;
            self.metrics.record(metric);
        }

        let policy = self.retention_manager.compute_policy(&self.access_tracker, now);
        self.retention_manager.update_policy(&policy, now);

        if !hotspots.is_empty() {
            debug!(
                hotspots = hotspots.len(),
                change_points = change_points.len(),
                events = events.len(),
                "temporal analysis complete"
            );
        }
    }

    #[must_use]
    pub fn summary(&self) -> TemporalSummary {
        TemporalSummary {
            hotspots_detected: self.current_hotspots.read().len(),
            time_travel_queries_tracked: self.access_tracker.get_total_access_count(),
            smart_snapshots_triggered: self.snapshot_scheduler.get_total_snapshots_triggered(),
        }
    }

    #[must_use]
    pub fn get_current_hotspots(&self) -> Vec<TemporalHotspot> {
        self.current_hotspots.read().clone()
    }

    #[must_use]
    pub fn get_retention_stats(&self) -> RetentionStats {
        self.retention_manager.get_stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::engine_hooks::{IndexInfo, RecoveryResult};

    struct StubEngine;

    #[async_trait::async_trait]
    impl EngineServices for StubEngine {
        async fn recover_to(&self, _target_timestamp_us: u64, _db_name: &str) -> RecoveryResult {
            RecoveryResult::ok(0, 0)
        }
        fn begin_checkpoint(&self) {}
        fn get_row_count(&self, _table_name: &str) -> u64 {
            0
        }
        fn get_indexes(&self, _table_name: &str) -> Vec<IndexInfo> {
            Vec::new()
        }
    }

    fn system(clock: Arc<ManualClock>) -> TemporalIndexManager {
        let metrics = Arc::new(MetricsStore::new(100));
        let config = AiConfig::default();
        let manager = TemporalIndexManager::new(clock, Arc::new(StubEngine), metrics, &config);
        manager.active.store(true, Ordering::SeqCst);
        manager
    }

    #[test]
    fn inactive_manager_ignores_time_travel_queries() {
        let clock = Arc::new(ManualClock::new(0));
        let metrics = Arc::new(MetricsStore::new(100));
        let config = AiConfig::default();
        let manager = TemporalIndexManager::new(clock, Arc::new(StubEngine), metrics, &config);
        manager.on_time_travel_query("orders", 500, "main");
        assert_eq!(manager.access_tracker.get_total_access_count(), 0);
    }

    #[test]
    fn time_travel_query_is_recorded_and_metered() {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let manager = system(clock);
        manager.on_time_travel_query("orders", 500_000, "main");
        assert_eq!(manager.access_tracker.get_total_access_count(), 1);
        assert_eq!(manager.metrics.get_total_recorded(), 1);
    }

    #[test]
    fn periodic_analysis_is_a_noop_with_no_events() {
        let clock = Arc::new(ManualClock::new(0));
        let manager = system(clock);
        manager.periodic_analysis();
        assert_eq!(manager.summary().hotspots_detected, 0);
    }

    #[test]
    fn periodic_analysis_populates_hotspots_from_dense_access_cluster() {
        let clock = Arc::new(ManualClock::new(10_000_000));
        let manager = system(clock);
        for i in 0..6 {
            manager.on_time_travel_query("orders", 1_000_000 + i * 10_000, "main");
        }
        manager.periodic_analysis();
        assert!(manager.summary().hotspots_detected >= 1);
        assert!(!manager.get_current_hotspots().is_empty());
    }
}
