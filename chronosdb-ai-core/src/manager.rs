//! Top-level coordinator for the AI layer.
//!
//! Owns the scheduler, worker pool, and the three AI subsystems, and is the
//! single initialization/shutdown point an embedding engine talks to. This
//! is an explicit `Arc<AiManager>` the caller constructs and holds —
//! idiomatic Rust has no need for an `Instance()` accessor.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::clock::Clock;
use crate::constants::AiConfig;
use crate::engine_hooks::EngineServices;
use crate::immune::ImmuneSystem;
use crate::learning::LearningEngine;
use crate::metrics::MetricsStore;
use crate::observer::{Observer, ObserverRegistry};
use crate::scheduler::AiScheduler;
use crate::temporal::TemporalIndexManager;
use crate::worker_pool::WorkerPool;

/// Snapshot returned by `SHOW AI STATUS`.
#[derive(Debug, Clone, Serialize)]
pub struct AiStatus {
    pub learning_engine_active: bool,
    pub immune_system_active: bool,
    pub temporal_index_active: bool,
    pub metrics_recorded: u64,
    pub scheduled_tasks: usize,
    pub learning_summary: String,
    pub immune_summary: String,
    pub temporal_summary: String,
}

/// Composition root owning the scheduler, worker pool, shared metrics
/// store, and the three AI subsystems.
pub struct AiManager {
    scheduler: Arc<AiScheduler>,
    observer_registry: Arc<ObserverRegistry>,
    metrics: Arc<MetricsStore>,
    learning_engine: Arc<LearningEngine>,
    immune_system: Arc<ImmuneSystem>,
    temporal_index_manager: Arc<TemporalIndexManager>,
    initialized: AtomicBool,
}

impl AiManager {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, engine: Arc<dyn EngineServices>, config: &AiConfig) -> Arc<Self> {
        let metrics = Arc::new(MetricsStore::new(config.metrics_ring_buffer_capacity));
        let worker_pool = WorkerPool::new(config.ai_thread_pool_size);
        let scheduler = AiScheduler::new(Arc::clone(&clock), worker_pool.clone(), config.ai_scheduler_tick_ms);
        let observer_registry = Arc::new(ObserverRegistry::new(worker_pool));

        let learning_engine = Arc::new(LearningEngine::new(Arc::clone(&engine), Arc::clone(&metrics), config));
        let immune_system = Arc::new(ImmuneSystem::new(
            Arc::clone(&clock),
            Arc::clone(&engine),
            Arc::clone(&metrics),
            config,
        ));
        let temporal_index_manager = Arc::new(TemporalIndexManager::new(
            clock,
            engine,
            Arc::clone(&metrics),
            config,
        ));

        Arc::new(Self {
            scheduler,
            observer_registry,
            metrics,
            learning_engine,
            immune_system,
            temporal_index_manager,
            initialized: AtomicBool::new(false),
        })
    }

    /// Start the scheduler, register observers, and start every subsystem.
    /// A second call while already initialized is a no-op.
    pub fn initialize(self: &Arc<Self>, immune_check_interval_ms: u64, temporal_analysis_interval_ms: u64) {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return;
        }

        info!("initializing ChronosDB AI layer");
        self.scheduler.start();

        self.observer_registry
            .register(Arc::clone(&self.learning_engine) as Arc<dyn Observer>);
        self.learning_engine.start();

        self.observer_registry
            .register(Arc::clone(&self.immune_system) as Arc<dyn Observer>);
        self.immune_system.start(&self.scheduler, immune_check_interval_ms);

        self.temporal_index_manager.start(&self.scheduler, temporal_analysis_interval_ms);

        info!("AI layer initialized: Learning Engine, Immune System, Temporal Index Manager");
    }

    /// Stop every subsystem, unregister observers, and stop the scheduler.
    /// A call while not initialized is a no-op.
    pub fn shutdown(&self) {
        if !self.initialized.swap(false, Ordering::SeqCst) {
            return;
        }

        info!("shutting down AI layer");
        self.temporal_index_manager.stop();

        self.observer_registry
            .unregister(&(Arc::clone(&self.immune_system) as Arc<dyn Observer>));
        self.immune_system.stop();

        self.observer_registry
            .unregister(&(Arc::clone(&self.learning_engine) as Arc<dyn Observer>));
        self.learning_engine.stop();

        self.scheduler.stop();
        info!("AI layer shut down");
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn observer_registry(&self) -> &Arc<ObserverRegistry> {
        &self.observer_registry
    }

    #[must_use]
    pub fn learning_engine(&self) -> &Arc<LearningEngine> {
        &self.learning_engine
    }

    #[must_use]
    pub fn immune_system(&self) -> &Arc<ImmuneSystem> {
        &self.immune_system
    }

    #[must_use]
    pub fn temporal_index_manager(&self) -> &Arc<TemporalIndexManager> {
        &self.temporal_index_manager
    }

    #[must_use]
    pub fn get_status(&self) -> AiStatus {
        let initialized = self.is_initialized();
        let immune_summary = self.immune_system.summary();
        let temporal_summary = self.temporal_index_manager.summary();

        AiStatus {
            learning_engine_active: initialized,
            immune_system_active: initialized,
            temporal_index_active: initialized,
            metrics_recorded: self.metrics.get_total_recorded(),
            scheduled_tasks: self.scheduler.get_scheduled_tasks().len(),
            learning_summary: self.learning_engine.get_summary(),
            immune_summary: format!(
                "{} anomalies, {} blocked tables, {} blocked users, {} monitored tables",
                immune_summary.total_anomalies,
                immune_summary.blocked_tables,
                immune_summary.blocked_users,
                immune_summary.monitored_tables,
            ),
            temporal_summary: format!(
                "{} hotspots detected, {} time-travel queries tracked, {} smart snapshots triggered",
                temporal_summary.hotspots_detected,
                temporal_summary.time_travel_queries_tracked,
                temporal_summary.smart_snapshots_triggered,
            ),
        }
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

    fn manager() -> Arc<AiManager> {
        let clock = Arc::new(ManualClock::new(0));
        let config = AiConfig::default();
        AiManager::new(clock, Arc::new(StubEngine), &config)
    }

    #[tokio::test]
    async fn starts_uninitialized_and_status_reflects_it() {
        let manager = manager();
        assert!(!manager.is_initialized());
        let status = manager.get_status();
        assert!(!status.learning_engine_active);
    }

    #[tokio::test]
    async fn initialize_registers_observers_and_flips_active() {
        let manager = manager();
        manager.initialize(1_000, 1_000);
        assert!(manager.is_initialized());
        assert_eq!(manager.observer_registry().observer_count(), 2);

        let status = manager.get_status();
        assert!(status.learning_engine_active);
        assert!(status.immune_system_active);
        assert!(status.temporal_index_active);

        manager.shutdown();
        assert!(!manager.is_initialized());
    }

    #[tokio::test]
    async fn double_initialize_is_idempotent() {
        let manager = manager();
        manager.initialize(1_000, 1_000);
        manager.initialize(1_000, 1_000);
        assert_eq!(manager.observer_registry().observer_count(), 2);
        manager.shutdown();
    }
}
