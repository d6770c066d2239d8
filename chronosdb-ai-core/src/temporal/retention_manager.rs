//! Adaptive WAL retention policy: hot periods (frequently time-traveled
//! into) retain full fidelity, cold periods are eligible for pruning.

use parking_lot::Mutex;

use crate::temporal::access_tracker::TemporalAccessTracker;

#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    /// Records newer than this (relative to "now") retain full fidelity.
    pub hot_retention_us: u64,
    /// Records older than this are eligible for pruning.
    pub cold_cutoff_us: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RetentionStats {
    pub hot_zone_start_us: u64,
    pub cold_cutoff_us: u64,
    pub policy_updates: u64,
}

/// Computes and tracks a [`RetentionPolicy`], extending the cold cutoff
/// when users keep time-traveling into data that would otherwise be
/// pruned.
///
/// Truncation itself is not wired up here: no WAL-truncation entry point
/// is exposed by [`crate::engine_hooks::EngineServices`], so `update_policy`
/// remains advisory-only until one exists.
pub struct WalRetentionManager {
    default_hot_retention_us: u64,
    default_cold_cutoff_us: u64,
    top_hot_timestamps: usize,
    stats: Mutex<RetentionStats>,
}

impl WalRetentionManager {
    #[must_use]
    pub fn new(default_hot_retention_us: u64, default_cold_cutoff_us: u64, top_hot_timestamps: usize) -> Self {
        Self {
            default_hot_retention_us,
            default_cold_cutoff_us,
            top_hot_timestamps,
            stats: Mutex::new(RetentionStats::default()),
        }
    }

    #[must_use]
    pub fn compute_policy(&self, tracker: &TemporalAccessTracker, now_us: u64) -> RetentionPolicy {
        let mut policy = RetentionPolicy {
            hot_retention_us: self.default_hot_retention_us,
            cold_cutoff_us: self.default_cold_cutoff_us,
        };

        for ts in tracker.get_hot_timestamps(self.top_hot_timestamps) {
            if ts >= now_us {
                continue;
            }
            let age = now_us - ts;
            if age > policy.hot_retention_us && age < policy.cold_cutoff_us * 2 {
                policy.cold_cutoff_us = policy.cold_cutoff_us.max(age + policy.hot_retention_us);
            }
        }
        policy
    }

    #[must_use]
    pub fn get_stats(&self) -> RetentionStats {
        *self.stats.lock()
    }

    pub fn update_policy(&self, policy: &RetentionPolicy, now_us: u64) {
        let mut stats = self.stats.lock();
        stats.hot_zone_start_us = now_us.saturating_sub(policy.hot_retention_us);
        stats.cold_cutoff_us = now_us.saturating_sub(policy.cold_cutoff_us);
        stats.policy_updates += 1;
    }
}
