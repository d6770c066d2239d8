//! Immune System: autonomous anomaly detection and self-healing.
//!
//! Wires together the mutation monitor, user profiler, anomaly detector, and
//! response engine, and implements [`Observer`] so the engine can drive it
//! through the same hook path as the Learning Engine.

mod anomaly_detector;
mod mutation_monitor;
mod response_engine;
mod user_profiler;

pub use anomaly_detector::{AnomalyDetector, AnomalyReport, AnomalySeverity, AnomalyThresholds};
pub use mutation_monitor::MutationMonitor;
pub use response_engine::ResponseEngine;
pub use user_profiler::{UserBehaviorProfiler, UserProfile};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::info;

use crate::clock::Clock;
use crate::engine_hooks::{DmlEvent, DmlOperation, EngineServices};
use crate::metrics::{MetricEvent, MetricKind, MetricsStore};
use crate::observer::Observer;
use crate::scheduler::AiScheduler;

/// Summary counters for "SHOW AI STATUS".
#[derive(Debug, Clone)]
pub struct ImmuneSummary {
    pub total_anomalies: usize,
    pub blocked_tables: usize,
    pub blocked_users: usize,
    pub monitored_tables: usize,
}

/// Composition root for the four immune sub-parts.
pub struct ImmuneSystem {
    clock: Arc<dyn Clock>,
    mutation_monitor: MutationMonitor,
    user_profiler: UserBehaviorProfiler,
    anomaly_detector: AnomalyDetector,
    response_engine: ResponseEngine,
    metrics: Arc<MetricsStore>,
    active: AtomicBool,
}

impl ImmuneSystem {
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        engine: Arc<dyn EngineServices>,
        metrics: Arc<MetricsStore>,
        config: &crate::constants::AiConfig,
    ) -> Self {
        let mutation_monitor = MutationMonitor::new(config.mutation_rolling_window_us);
        let user_profiler = UserBehaviorProfiler::new(
            config.user_profile_history_size,
            config.rate_interval_us,
            config.user_deviation_mutation_weight,
            config.user_deviation_table_weight,
            config.user_profile_min_events,
        );
        let thresholds = AnomalyThresholds {
            low: config.zscore_low_threshold,
            medium: config.zscore_medium_threshold,
            high: config.zscore_high_threshold,
            quiet_sigma_threshold: config.zscore_quiet_sigma_threshold,
            quiet_min_absolute_spike: config.quiet_state_min_absolute_spike,
            window_size: config.mutation_window_size,
            rate_interval_us: config.rate_interval_us,
            min_buckets_for_analysis: config.min_nonempty_buckets_for_analysis,
        };
        let anomaly_detector = AnomalyDetector::new(thresholds, config.max_anomaly_history);
        let response_engine = ResponseEngine::new(
            engine,
            Arc::clone(&clock),
            config.recovery_lookback_us,
            std::time::Duration::from_micros(config.recovery_cooldown_us),
        );

        Self {
            clock,
            mutation_monitor,
            user_profiler,
            anomaly_detector,
            response_engine,
            metrics,
            active: AtomicBool::new(false),
        }
    }

    /// Register the periodic analysis task with the shared scheduler.
    pub fn start(self: &Arc<Self>, scheduler: &Arc<AiScheduler>, interval_ms: u64) {
        self.active.store(true, Ordering::SeqCst);
        let this = Arc::clone(self);
        scheduler.schedule_periodic("ImmuneSystem::periodic_analysis", interval_ms, move || {
            let this = Arc::clone(&this);
            async move {
                this.periodic_analysis().await;
            }
        });
        info!("immune system started");
    }

    pub fn stop(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    async fn periodic_analysis(&self) {
        if !self.active.load(Ordering::SeqCst) {
            return;
        }
        let now = self.clock.now_us();
        let reports = self.anomaly_detector.analyze(&self.mutation_monitor, now);
        for report in reports {
            self.response_engine.respond(&report).await;
            self.anomaly_detector.record_anomaly(report);
        }
    }

    #[must_use]
    pub fn summary(&self) -> ImmuneSummary {
        ImmuneSummary {
            total_anomalies: self.anomaly_detector.get_total_anomalies(),
            blocked_tables: self.response_engine.get_blocked_tables().len(),
            blocked_users: self.response_engine.get_blocked_users().len(),
            monitored_tables: self.mutation_monitor.get_monitored_tables().len(),
        }
    }

    #[must_use]
    pub fn get_recent_anomalies(&self, max_count: usize) -> Vec<AnomalyReport> {
        self.anomaly_detector.get_recent_anomalies(max_count)
    }

    #[must_use]
    pub fn get_blocked_tables(&self) -> Vec<String> {
        self.response_engine.get_blocked_tables()
    }

    #[must_use]
    pub fn get_blocked_users(&self) -> Vec<String> {
        self.response_engine.get_blocked_users()
    }

    pub fn unblock_table(&self, table_name: &str) {
        self.response_engine.unblock_table(table_name);
    }

    pub fn unblock_user(&self, user: &str) {
        self.response_engine.unblock_user(user);
    }
}

#[async_trait::async_trait]
impl Observer for ImmuneSystem {
    async fn on_before_dml(&self, event: &DmlEvent) -> bool {
        if !self.active.load(Ordering::SeqCst) || matches!(event.operation, DmlOperation::Select) {
            return true;
        }
        if self.response_engine.is_table_blocked(&event.table_name) {
            return false;
        }
        if !event.user.is_empty() && self.response_engine.is_user_blocked(&event.user) {
            return false;
        }
        true
    }

    async fn on_after_dml(&self, event: &DmlEvent) {
        if !self.active.load(Ordering::SeqCst) {
            return;
        }

        if event.is_mutation() {
            self.mutation_monitor
                .record_mutation(&event.table_name, event.rows_affected, event.start_time_us);
        }
        if !event.user.is_empty() {
            self.user_profiler
                .record_event(&event.user, event.operation, &event.table_name, event.start_time_us);
        }

        let kind = match event.operation {
            DmlOperation::Insert => MetricKind::DmlInsert,
            DmlOperation::Update => MetricKind::DmlUpdate,
            DmlOperation::Delete => MetricKind::DmlDelete,
            DmlOperation::Select => MetricKind::DmlSelect,
        };
        let mut metric = MetricEvent::new(kind, event.start_time_us);
        metric.duration_us = event.duration_us;
        metric.session_id = event.session_id;
        metric.user = event.user.clone();
        metric.table_name = event.table_name.clone();
        metric.db_name = event.db_name.clone();
        metric.rows_affected = event.rows_affected;
        self.metrics.record(metric);
    }
}
