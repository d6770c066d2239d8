//! Learning Engine: self-learning query execution optimizer.
//!
//! Composes a [`QueryFeatureExtractor`], a [`Ucb1Bandit`] for scan strategy,
//! and a [`QueryPlanOptimizer`] for the richer filter/limit plan. Implements
//! [`Observer`] so `OnAfterDML` feeds the bandit from SELECT outcomes the
//! same way the engine drives the Immune System.

mod bandit;
mod features;
mod optimizer;

pub use bandit::{ArmStats, BanditConfig, ScanStrategy, Ucb1Bandit};
pub use features::{
    PredicateOp, QueryFeatureExtractor, QueryFeatures, SelectQuery, WherePredicate,
    QUERY_FEATURE_DIMENSIONS,
};
pub use optimizer::{
    DimensionStats, ExecutionFeedback, ExecutionPlan, FilterStrategy, LimitStrategy,
    OptimizerConfig, OptimizerStats, QueryPlanOptimizer,
};

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tracing::info;

use crate::constants::AiConfig;
use crate::engine_hooks::{DmlEvent, DmlOperation, EngineServices};
use crate::error::Result;
use crate::metrics::{MetricEvent, MetricKind, MetricsStore};
use crate::observer::Observer;

/// Composition root for the scan-strategy bandit and the query plan
/// optimizer.
pub struct LearningEngine {
    feature_extractor: QueryFeatureExtractor,
    bandit: Ucb1Bandit,
    plan_optimizer: QueryPlanOptimizer,
    metrics: Arc<MetricsStore>,
    total_queries: AtomicU64,
    active: AtomicBool,
}

impl LearningEngine {
    #[must_use]
    pub fn new(engine: Arc<dyn EngineServices>, metrics: Arc<MetricsStore>, config: &AiConfig) -> Self {
        let feature_extractor = QueryFeatureExtractor::new(engine);
        let bandit_config = BanditConfig {
            min_samples_before_learning: config.min_samples_before_learning,
            min_arm_pulls: config.min_arm_pulls,
            min_table_pulls_for_context: config.min_table_pulls_for_context,
            exploration_constant: config.ucb1_exploration_constant,
            reward_scale_ms: config.reward_scale_ms,
            reward_fixed_point_scale: config.reward_fixed_point_scale,
        };
        let optimizer_config = OptimizerConfig {
            min_samples_before_learning: config.min_samples_before_learning,
            min_arm_pulls: config.min_arm_pulls,
            exploration_constant: config.ucb1_exploration_constant,
            reward_scale_ms: config.reward_scale_ms,
            reward_fixed_point_scale: config.reward_fixed_point_scale,
        };

        Self {
            feature_extractor,
            bandit: Ucb1Bandit::new(bandit_config),
            plan_optimizer: QueryPlanOptimizer::new(optimizer_config),
            metrics,
            total_queries: AtomicU64::new(0),
            active: AtomicBool::new(false),
        }
    }

    pub fn start(&self) {
        self.active.store(true, Ordering::SeqCst);
        info!(
            min_samples = ?self.bandit.has_sufficient_data(),
            "learning engine started (UCB1 bandit)"
        );
    }

    pub fn stop(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    /// Recommend a scan strategy, or `None` if insufficient data (the
    /// engine should fall back to its own heuristic).
    #[must_use]
    pub fn recommend_scan_strategy(&self, stmt: &SelectQuery, table_name: &str) -> Option<ScanStrategy> {
        if !self.active.load(Ordering::SeqCst) || !self.bandit.has_sufficient_data() {
            return None;
        }
        let features = self.feature_extractor.extract(stmt, table_name);
        Some(self.bandit.select_strategy(&features, table_name))
    }

    /// Full multi-dimensional plan (filter order/strategy, limit strategy).
    #[must_use]
    pub fn optimize_query(&self, stmt: &SelectQuery, table_name: &str) -> ExecutionPlan {
        self.plan_optimizer.optimize(stmt, table_name)
    }

    pub fn record_execution_feedback(&self, feedback: &ExecutionFeedback) {
        self.plan_optimizer.record_feedback(feedback);
    }

    #[must_use]
    pub fn plan_optimizer(&self) -> &QueryPlanOptimizer {
        &self.plan_optimizer
    }

    #[must_use]
    pub fn get_arm_stats(&self) -> Vec<ArmStats> {
        self.bandit.get_stats()
    }

    #[must_use]
    pub fn get_total_queries_observed(&self) -> u64 {
        self.total_queries.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn get_summary(&self) -> String {
        let queries = self.total_queries.load(Ordering::Relaxed);
        if !self.bandit.has_sufficient_data() {
            return format!("{queries} queries observed, learning");
        }
        let mut summary = format!("{queries} queries observed, UCB1 active");
        for stats in self.bandit.get_stats() {
            let label = match stats.strategy {
                ScanStrategy::IndexScan => "IDX",
                ScanStrategy::SequentialScan => "SEQ",
            };
            summary.push_str(&format!(
                " | {label}: {} pulls, avg_r={:.0}%",
                stats.total_pulls,
                stats.average_reward * 100.0
            ));
        }
        summary
    }

    pub fn save_state(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        self.bandit.save_state(&dir.join("bandit.state"))?;
        self.plan_optimizer.save_state(&dir.join("optimizer.state"))?;
        Ok(())
    }

    pub fn load_state(&self, dir: &Path) -> Result<()> {
        self.bandit.load_state(&dir.join("bandit.state"))?;
        self.plan_optimizer.load_state(&dir.join("optimizer.state"))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Observer for LearningEngine {
    async fn on_after_dml(&self, event: &DmlEvent) {
        if !self.active.load(Ordering::SeqCst) || event.operation != DmlOperation::Select {
            return;
        }

        self.total_queries.fetch_add(1, Ordering::Relaxed);

        let used = if event.used_index_scan {
            ScanStrategy::IndexScan
        } else {
            ScanStrategy::SequentialScan
        };
        let duration_ms = event.duration_us as f64 / 1000.0;
        self.bandit.record_outcome(used, &event.table_name, duration_ms);

        let mut metric = MetricEvent::new(
            if event.used_index_scan { MetricKind::ScanIndex } else { MetricKind::ScanSeq },
            event.start_time_us,
        );
        metric.duration_us = event.duration_us;
        metric.table_name = event.table_name.clone();
        metric.db_name = event.db_name.clone();
        metric.rows_affected = event.result_row_count.max(0) as u32;
        metric.scan_strategy = u8::from(event.used_index_scan);
        self.metrics.record(metric);
    }
}
