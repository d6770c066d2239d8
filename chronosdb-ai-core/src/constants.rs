//! Tunable constants for the AI layer.
//!
//! [`AiConfig`] bundles every tunable with its spec default so an embedding
//! engine can load overrides from configuration. [`defaults`] exposes the
//! same values as bare constants for call sites that only need one of them
//! without threading an `AiConfig` through.

use serde::{Deserialize, Serialize};

/// All tunables from the external-interfaces tunable-constants table,
/// grouped by the subsystem that owns them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub metrics_ring_buffer_capacity: usize,
    pub ai_thread_pool_size: usize,
    pub ai_scheduler_tick_ms: u64,

    pub mutation_rolling_window_us: u64,
    pub rate_interval_us: u64,
    pub mutation_window_size: usize,

    pub user_profile_history_size: usize,
    pub user_deviation_mutation_weight: f64,
    pub user_deviation_table_weight: f64,
    pub user_profile_min_events: u64,

    pub zscore_low_threshold: f64,
    pub zscore_medium_threshold: f64,
    pub zscore_high_threshold: f64,
    pub zscore_quiet_sigma_threshold: f64,
    pub quiet_state_min_absolute_spike: f64,
    pub min_nonempty_buckets_for_analysis: usize,
    pub max_anomaly_history: usize,

    pub immune_check_interval_ms: u64,
    pub recovery_lookback_us: u64,
    pub recovery_cooldown_us: u64,

    pub min_samples_before_learning: u64,
    pub min_arm_pulls: u64,
    pub min_table_pulls_for_context: u64,
    pub ucb1_exploration_constant: f64,
    pub reward_scale_ms: f64,
    pub reward_fixed_point_scale: f64,

    pub access_pattern_window_size: usize,
    pub hotspot_cluster_epsilon_us: u64,
    pub hotspot_cluster_min_points: usize,
    pub cusum_threshold_sigma_mult: f64,
    pub cusum_drift_sigma_mult: f64,
    pub temporal_analysis_interval_ms: u64,

    pub snapshot_min_interval_us: u64,
    pub snapshot_changepoint_recency_us: u64,
    pub snapshot_hotspot_density_threshold: f64,
    pub snapshot_hotspot_min_access_count: u64,

    pub retention_hot_retention_us: u64,
    pub retention_cold_cutoff_us: u64,
    pub retention_top_hot_timestamps: usize,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            metrics_ring_buffer_capacity: defaults::METRICS_RING_BUFFER_CAPACITY,
            ai_thread_pool_size: defaults::AI_THREAD_POOL_SIZE,
            ai_scheduler_tick_ms: defaults::AI_SCHEDULER_TICK_MS,

            mutation_rolling_window_us: defaults::MUTATION_ROLLING_WINDOW_US,
            rate_interval_us: defaults::RATE_INTERVAL_US,
            mutation_window_size: defaults::MUTATION_WINDOW_SIZE,

            user_profile_history_size: defaults::USER_PROFILE_HISTORY_SIZE,
            user_deviation_mutation_weight: defaults::USER_DEVIATION_MUTATION_WEIGHT,
            user_deviation_table_weight: defaults::USER_DEVIATION_TABLE_WEIGHT,
            user_profile_min_events: defaults::USER_PROFILE_MIN_EVENTS,

            zscore_low_threshold: defaults::ZSCORE_LOW_THRESHOLD,
            zscore_medium_threshold: defaults::ZSCORE_MEDIUM_THRESHOLD,
            zscore_high_threshold: defaults::ZSCORE_HIGH_THRESHOLD,
            zscore_quiet_sigma_threshold: defaults::ZSCORE_QUIET_SIGMA_THRESHOLD,
            quiet_state_min_absolute_spike: defaults::QUIET_STATE_MIN_ABSOLUTE_SPIKE,
            min_nonempty_buckets_for_analysis: defaults::MIN_NONEMPTY_BUCKETS_FOR_ANALYSIS,
            max_anomaly_history: defaults::MAX_ANOMALY_HISTORY,

            immune_check_interval_ms: defaults::IMMUNE_CHECK_INTERVAL_MS,
            recovery_lookback_us: defaults::RECOVERY_LOOKBACK_US,
            recovery_cooldown_us: defaults::RECOVERY_COOLDOWN_US,

            min_samples_before_learning: defaults::MIN_SAMPLES_BEFORE_LEARNING,
            min_arm_pulls: defaults::MIN_ARM_PULLS,
            min_table_pulls_for_context: defaults::MIN_TABLE_PULLS_FOR_CONTEXT,
            ucb1_exploration_constant: defaults::UCB1_EXPLORATION_CONSTANT,
            reward_scale_ms: defaults::REWARD_SCALE_MS,
            reward_fixed_point_scale: defaults::REWARD_FIXED_POINT_SCALE,

            access_pattern_window_size: defaults::ACCESS_PATTERN_WINDOW_SIZE,
            hotspot_cluster_epsilon_us: defaults::HOTSPOT_CLUSTER_EPSILON_US,
            hotspot_cluster_min_points: defaults::HOTSPOT_CLUSTER_MIN_POINTS,
            cusum_threshold_sigma_mult: defaults::CUSUM_THRESHOLD_SIGMA_MULT,
            cusum_drift_sigma_mult: defaults::CUSUM_DRIFT_SIGMA_MULT,
            temporal_analysis_interval_ms: defaults::TEMPORAL_ANALYSIS_INTERVAL_MS,

            snapshot_min_interval_us: defaults::SNAPSHOT_MIN_INTERVAL_US,
            snapshot_changepoint_recency_us: defaults::SNAPSHOT_CHANGEPOINT_RECENCY_US,
            snapshot_hotspot_density_threshold: defaults::SNAPSHOT_HOTSPOT_DENSITY_THRESHOLD,
            snapshot_hotspot_min_access_count: defaults::SNAPSHOT_HOTSPOT_MIN_ACCESS_COUNT,

            retention_hot_retention_us: defaults::RETENTION_HOT_RETENTION_US,
            retention_cold_cutoff_us: defaults::RETENTION_COLD_CUTOFF_US,
            retention_top_hot_timestamps: defaults::RETENTION_TOP_HOT_TIMESTAMPS,
        }
    }
}

/// Bare constant values, one per row of the tunable-constants table.
pub mod defaults {
    pub const METRICS_RING_BUFFER_CAPACITY: usize = 10_000;
    pub const AI_THREAD_POOL_SIZE: usize = 4;
    pub const AI_SCHEDULER_TICK_MS: u64 = 100;

    pub const MUTATION_ROLLING_WINDOW_US: u64 = 3_600 * 1_000_000;
    pub const RATE_INTERVAL_US: u64 = 60 * 1_000_000;
    pub const MUTATION_WINDOW_SIZE: usize = 60;

    pub const USER_PROFILE_HISTORY_SIZE: usize = 1_000;
    pub const USER_DEVIATION_MUTATION_WEIGHT: f64 = 0.7;
    pub const USER_DEVIATION_TABLE_WEIGHT: f64 = 0.3;
    /// Minimum recorded events before a user profile's deviation score is
    /// considered meaningful.
    pub const USER_PROFILE_MIN_EVENTS: u64 = 20;

    pub const ZSCORE_LOW_THRESHOLD: f64 = 2.0;
    pub const ZSCORE_MEDIUM_THRESHOLD: f64 = 3.0;
    pub const ZSCORE_HIGH_THRESHOLD: f64 = 4.0;
    pub const MAX_ANOMALY_HISTORY: usize = 500;
    /// Quiet-state variance floor: below this, a table is treated
    /// as idle rather than as having a degenerate baseline.
    pub const ZSCORE_QUIET_SIGMA_THRESHOLD: f64 = 0.001;
    /// Minimum absolute spike (rows/s) from an idle baseline to be
    /// reported HIGH under the quiet-state rule.
    pub const QUIET_STATE_MIN_ABSOLUTE_SPIKE: f64 = 1.0;
    /// Minimum number of non-empty historical buckets required before a
    /// table is eligible for z-score analysis.
    pub const MIN_NONEMPTY_BUCKETS_FOR_ANALYSIS: usize = 10;

    pub const IMMUNE_CHECK_INTERVAL_MS: u64 = 30_000;
    pub const RECOVERY_LOOKBACK_US: u64 = 30 * 1_000_000;
    pub const RECOVERY_COOLDOWN_US: u64 = 60 * 1_000_000;

    pub const MIN_SAMPLES_BEFORE_LEARNING: u64 = 20;
    pub const MIN_ARM_PULLS: u64 = 5;
    pub const MIN_TABLE_PULLS_FOR_CONTEXT: u64 = 3;
    pub const UCB1_EXPLORATION_CONSTANT: f64 = std::f64::consts::SQRT_2;
    pub const REWARD_SCALE_MS: f64 = 100.0;
    /// Fixed-point scale used to encode fractional rewards in atomic
    /// 64-bit counters.
    pub const REWARD_FIXED_POINT_SCALE: f64 = 10_000.0;

    pub const ACCESS_PATTERN_WINDOW_SIZE: usize = 10_000;
    pub const HOTSPOT_CLUSTER_EPSILON_US: u64 = 5 * 60 * 1_000_000;
    pub const HOTSPOT_CLUSTER_MIN_POINTS: usize = 5;
    pub const CUSUM_THRESHOLD_SIGMA_MULT: f64 = 4.0;
    pub const CUSUM_DRIFT_SIGMA_MULT: f64 = 0.5;
    pub const TEMPORAL_ANALYSIS_INTERVAL_MS: u64 = 60_000;

    /// Snapshot scheduler: minimum wall-clock gap between triggered
    /// snapshots.
    pub const SNAPSHOT_MIN_INTERVAL_US: u64 = 30 * 1_000_000;
    /// Snapshot scheduler: a change point within this window of "now"
    /// is eligible to trigger a snapshot.
    pub const SNAPSHOT_CHANGEPOINT_RECENCY_US: u64 = 5 * 60 * 1_000_000;
    /// Snapshot scheduler: hotspot density threshold to trigger.
    pub const SNAPSHOT_HOTSPOT_DENSITY_THRESHOLD: f64 = 1.0;
    /// Snapshot scheduler: hotspot access-count threshold to trigger.
    pub const SNAPSHOT_HOTSPOT_MIN_ACCESS_COUNT: u64 = 10;

    /// Retention manager defaults.
    pub const RETENTION_HOT_RETENTION_US: u64 = 24 * 3_600 * 1_000_000;
    pub const RETENTION_COLD_CUTOFF_US: u64 = 7 * 24 * 3_600 * 1_000_000;
    pub const RETENTION_TOP_HOT_TIMESTAMPS: usize = 10;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spec_table() {
        let cfg = AiConfig::default();
        assert_eq!(cfg.metrics_ring_buffer_capacity, 10_000);
        assert_eq!(cfg.ai_thread_pool_size, 4);
        assert!((cfg.ucb1_exploration_constant - std::f64::consts::SQRT_2).abs() < 1e-12);
        assert_eq!(cfg.recovery_cooldown_us, 60_000_000);
    }
}
