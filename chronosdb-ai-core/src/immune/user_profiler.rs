//! Per-user behavioral baselines.
//!
//! Tracks mutation rate, query rate, and table access distribution per user,
//! and exposes a deviation score indicating how anomalous a user's current
//! behavior is relative to their own history.

use std::collections::{HashMap, VecDeque};

use parking_lot::{Mutex, RwLock};

use crate::engine_hooks::DmlOperation;

const MINUTE_US: f64 = 60_000_000.0;

/// Snapshot of one user's behavioral baseline.
#[derive(Debug, Clone)]
pub struct UserProfile {
    pub username: String,
    pub avg_mutations_per_minute: f64,
    pub avg_queries_per_minute: f64,
    pub table_access_counts: HashMap<String, u64>,
    pub total_events: u64,
}

struct UserHistory {
    mutation_timestamps: VecDeque<u64>,
    query_timestamps: VecDeque<u64>,
    table_counts: HashMap<String, u64>,
    total_events: u64,
}

impl UserHistory {
    fn new() -> Self {
        Self {
            mutation_timestamps: VecDeque::new(),
            query_timestamps: VecDeque::new(),
            table_counts: HashMap::new(),
            total_events: 0,
        }
    }
}

/// Per-user behavioral baselines keyed by username.
///
/// Two-level locking mirrors [`super::mutation_monitor::MutationMonitor`]:
/// a shared map lock plus a per-user mutex.
pub struct UserBehaviorProfiler {
    users: RwLock<HashMap<String, Mutex<UserHistory>>>,
    history_size: usize,
    rate_interval_us: u64,
    mutation_weight: f64,
    table_weight: f64,
    min_events_for_baseline: u64,
}

impl UserBehaviorProfiler {
    #[must_use]
    pub fn new(
        history_size: usize,
        rate_interval_us: u64,
        mutation_weight: f64,
        table_weight: f64,
        min_events_for_baseline: u64,
    ) -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            history_size,
            rate_interval_us,
            mutation_weight,
            table_weight,
            min_events_for_baseline,
        }
    }

    fn with_user<R>(&self, user: &str, f: impl FnOnce(&mut UserHistory) -> R) -> R {
        {
            let users = self.users.read();
            if let Some(history) = users.get(user) {
                return f(&mut history.lock());
            }
        }
        self.users
            .write()
            .entry(user.to_string())
            .or_insert_with(|| Mutex::new(UserHistory::new()));
        let users = self.users.read();
        f(&mut users[user].lock())
    }

    pub fn record_event(&self, user: &str, op: DmlOperation, table_name: &str, timestamp_us: u64) {
        self.with_user(user, |h| {
            if matches!(op, DmlOperation::Select) {
                h.query_timestamps.push_back(timestamp_us);
            } else {
                h.mutation_timestamps.push_back(timestamp_us);
            }
            *h.table_counts.entry(table_name.to_string()).or_insert(0) += 1;
            h.total_events += 1;

            while h.mutation_timestamps.len() > self.history_size {
                h.mutation_timestamps.pop_front();
            }
            while h.query_timestamps.len() > self.history_size {
                h.query_timestamps.pop_front();
            }
        });
    }

    /// Deviation score: 0.0 is normal, higher is more anomalous. Requires at
    /// least `min_events_for_baseline` recorded events; returns 0.0
    /// otherwise since there is no reliable baseline yet.
    #[must_use]
    pub fn get_deviation_score(&self, user: &str, now_us: u64) -> f64 {
        let users = self.users.read();
        let Some(history) = users.get(user) else {
            return 0.0;
        };
        let h = history.lock();
        if h.total_events < self.min_events_for_baseline {
            return 0.0;
        }

        let recent_window = self.rate_interval_us;
        let recent_mutations = h
            .mutation_timestamps
            .iter()
            .rev()
            .take_while(|&&ts| ts >= now_us.saturating_sub(recent_window))
            .count();

        let total_span = h
            .mutation_timestamps
            .back()
            .zip(h.mutation_timestamps.front())
            .map_or(0.0, |(last, first)| (last - first) as f64);

        let avg_mutations_per_minute = if total_span > 0.0 {
            h.mutation_timestamps.len() as f64 / (total_span / MINUTE_US)
        } else {
            0.0
        };
        let recent_mutations_per_minute =
            recent_mutations as f64 / (recent_window as f64 / MINUTE_US);

        let mutation_deviation = if avg_mutations_per_minute > 0.0 {
            (recent_mutations_per_minute - avg_mutations_per_minute).abs()
                / avg_mutations_per_minute.max(1.0)
        } else {
            0.0
        };

        // Table-access deviation term is reserved for a future extension;
        // the weight and key structure are kept on the profile for it.
        let table_deviation = 0.0;

        self.mutation_weight * mutation_deviation + self.table_weight * table_deviation
    }

    #[must_use]
    pub fn get_profile(&self, user: &str) -> UserProfile {
        let users = self.users.read();
        let Some(history) = users.get(user) else {
            return UserProfile {
                username: user.to_string(),
                avg_mutations_per_minute: 0.0,
                avg_queries_per_minute: 0.0,
                table_access_counts: HashMap::new(),
                total_events: 0,
            };
        };
        let h = history.lock();

        let mut span_minutes = h
            .mutation_timestamps
            .back()
            .zip(h.mutation_timestamps.front())
            .map_or(0.0, |(last, first)| (last - first) as f64 / MINUTE_US);
        if let Some((last, first)) = h.query_timestamps.back().zip(h.query_timestamps.front()) {
            span_minutes = span_minutes.max((last - first) as f64 / MINUTE_US);
        }

        let (avg_mutations_per_minute, avg_queries_per_minute) = if span_minutes > 0.0 {
            (
                h.mutation_timestamps.len() as f64 / span_minutes,
                h.query_timestamps.len() as f64 / span_minutes,
            )
        } else {
            (0.0, 0.0)
        };

        UserProfile {
            username: user.to_string(),
            avg_mutations_per_minute,
            avg_queries_per_minute,
            table_access_counts: h.table_counts.clone(),
            total_events: h.total_events,
        }
    }

    #[must_use]
    pub fn get_all_profiles(&self) -> Vec<UserProfile> {
        let names: Vec<String> = self.users.read().keys().cloned().collect();
        names.iter().map(|name| self.get_profile(name)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profiler() -> UserBehaviorProfiler {
        UserBehaviorProfiler::new(1_000, 60_000_000, 0.7, 0.3, 20)
    }

    #[test]
    fn deviation_score_is_zero_without_baseline() {
        let p = profiler();
        for i in 0..5 {
            p.record_event("alice", DmlOperation::Update, "t", i * 1_000);
        }
        assert_eq!(p.get_deviation_score("alice", 10_000), 0.0);
    }

    #[test]
    fn deviation_score_rises_with_burst_after_baseline() {
        let p = profiler();
        // Steady low-rate baseline: one mutation every 10 seconds.
        for i in 0..25 {
            p.record_event("bob", DmlOperation::Update, "t", i * 10_000_000);
        }
        let last_ts = 24 * 10_000_000;
        // Burst of mutations right before "now".
        for i in 0..20 {
            p.record_event("bob", DmlOperation::Update, "t", last_ts + i * 1_000);
        }
        let score = p.get_deviation_score("bob", last_ts + 20_000);
        assert!(score > 0.0);
    }

    #[test]
    fn profile_tracks_table_counts_and_totals() {
        let p = profiler();
        p.record_event("carol", DmlOperation::Insert, "orders", 0);
        p.record_event("carol", DmlOperation::Select, "orders", 1_000);
        p.record_event("carol", DmlOperation::Insert, "users", 2_000);

        let profile = p.get_profile("carol");
        assert_eq!(profile.total_events, 3);
        assert_eq!(profile.table_access_counts["orders"], 2);
        assert_eq!(profile.table_access_counts["users"], 1);
    }

    #[test]
    fn unknown_user_profile_is_empty() {
        let p = profiler();
        let profile = p.get_profile("nobody");
        assert_eq!(profile.total_events, 0);
    }

    #[test]
    fn history_is_pruned_beyond_configured_size() {
        let p = UserBehaviorProfiler::new(3, 60_000_000, 0.7, 0.3, 1);
        for i in 0..10 {
            p.record_event("dana", DmlOperation::Update, "t", i * 1_000);
        }
        let profile = p.get_profile("dana");
        // total_events counts every recorded event even though the
        // timestamp deques themselves are capped.
        assert_eq!(profile.total_events, 10);
    }
}
