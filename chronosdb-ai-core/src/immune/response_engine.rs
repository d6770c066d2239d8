//! Executes graded responses to detected anomalies; owns the blocklist and
//! cooldown state.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use tracing::{error, info, warn};

use crate::clock::Clock;
use crate::engine_hooks::EngineServices;

use super::anomaly_detector::{AnomalyReport, AnomalySeverity};

/// Executes the LOW/MEDIUM/HIGH response ladder and tracks the
/// blocked-table/user and post-recovery cooldown state.
pub struct ResponseEngine {
    engine: Arc<dyn EngineServices>,
    clock: Arc<dyn Clock>,
    blocked_tables: RwLock<HashSet<String>>,
    blocked_users: RwLock<HashSet<String>>,
    cooldowns: RwLock<HashMap<String, Instant>>,
    recovery_lookback_us: u64,
    recovery_cooldown: std::time::Duration,
}

impl ResponseEngine {
    #[must_use]
    pub fn new(
        engine: Arc<dyn EngineServices>,
        clock: Arc<dyn Clock>,
        recovery_lookback_us: u64,
        recovery_cooldown: std::time::Duration,
    ) -> Self {
        Self {
            engine,
            clock,
            blocked_tables: RwLock::new(HashSet::new()),
            blocked_users: RwLock::new(HashSet::new()),
            cooldowns: RwLock::new(HashMap::new()),
            recovery_lookback_us,
            recovery_cooldown,
        }
    }

    /// Dispatch on severity. Tables currently in cooldown suppress further
    /// HIGH responses (they were just recovered) but LOW/MEDIUM still log
    /// and block — cooldown only gates the recovery step, not the logging.
    pub async fn respond(&self, report: &AnomalyReport) {
        match report.severity {
            AnomalySeverity::Low => self.respond_low(report),
            AnomalySeverity::Medium => self.respond_medium(report),
            AnomalySeverity::High => self.respond_high(report).await,
            AnomalySeverity::None => {}
        }
    }

    fn respond_low(&self, report: &AnomalyReport) {
        warn!(table = %report.table_name, "[ANOMALY LOW] {}", report.description);
    }

    fn respond_medium(&self, report: &AnomalyReport) {
        warn!(
            table = %report.table_name,
            "[ANOMALY MEDIUM] blocking mutations on table - {}",
            report.description
        );
        self.block(report);
    }

    async fn respond_high(&self, report: &AnomalyReport) {
        if self.is_in_cooldown(&report.table_name) {
            return;
        }

        error!(
            table = %report.table_name,
            "[ANOMALY HIGH] auto-recovering table - {}",
            report.description
        );
        self.block(report);

        let target_time = report.timestamp_us.saturating_sub(self.recovery_lookback_us);
        let result = self.engine.recover_to(target_time, "").await;

        if result.success {
            info!(
                table = %report.table_name,
                records_processed = result.records_processed,
                elapsed_ms = result.elapsed_ms,
                "[AUTO-RECOVERY] recovered to {}s before anomaly",
                self.recovery_lookback_us / 1_000_000,
            );
            self.blocked_tables.write().remove(&report.table_name);
            self.cooldowns
                .write()
                .insert(report.table_name.clone(), self.clock.now_instant());
        } else {
            error!(
                table = %report.table_name,
                error = ?result.error_message,
                "[AUTO-RECOVERY FAILED] table remains blocked",
            );
        }
    }

    fn block(&self, report: &AnomalyReport) {
        self.blocked_tables.write().insert(report.table_name.clone());
        if !report.user.is_empty() {
            self.blocked_users.write().insert(report.user.clone());
        }
    }

    #[must_use]
    pub fn is_table_blocked(&self, table_name: &str) -> bool {
        self.blocked_tables.read().contains(table_name)
    }

    #[must_use]
    pub fn is_user_blocked(&self, user: &str) -> bool {
        self.blocked_users.read().contains(user)
    }

    /// Whether `table_name` recovered recently enough that analysis should
    /// skip re-triggering a HIGH response against it.
    #[must_use]
    pub fn is_in_cooldown(&self, table_name: &str) -> bool {
        match self.cooldowns.read().get(table_name) {
            Some(&start) => self.clock.now_instant().saturating_duration_since(start) < self.recovery_cooldown,
            None => false,
        }
    }

    pub fn unblock_table(&self, table_name: &str) {
        self.blocked_tables.write().remove(table_name);
        info!(table = table_name, "table unblocked by admin");
    }

    pub fn unblock_user(&self, user: &str) {
        self.blocked_users.write().remove(user);
        info!(user, "user unblocked by admin");
    }

    #[must_use]
    pub fn get_blocked_tables(&self) -> Vec<String> {
        self.blocked_tables.read().iter().cloned().collect()
    }

    #[must_use]
    pub fn get_blocked_users(&self) -> Vec<String> {
        self.blocked_users.read().iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, SystemClock};
    use crate::engine_hooks::{IndexInfo, RecoveryResult};
    use std::sync::atomic::{AtomicBool, Ordering};

    struct StubEngine {
        recovery_succeeds: AtomicBool,
    }

    #[async_trait::async_trait]
    impl EngineServices for StubEngine {
        async fn recover_to(&self, _target_timestamp_us: u64, _db_name: &str) -> RecoveryResult {
            if self.recovery_succeeds.load(Ordering::SeqCst) {
                RecoveryResult::ok(10, 5)
            } else {
                RecoveryResult::failed("stub failure")
            }
        }
        fn begin_checkpoint(&self) {}
        fn get_row_count(&self, _table_name: &str) -> u64 {
            0
        }
        fn get_indexes(&self, _table_name: &str) -> Vec<IndexInfo> {
            Vec::new()
        }
    }

    fn report(severity: AnomalySeverity) -> AnomalyReport {
        AnomalyReport {
            table_name: "orders".to_string(),
            user: "attacker".to_string(),
            severity,
            z_score: 5.0,
            current_rate: 100.0,
            mean_rate: 1.0,
            std_dev: 0.5,
            timestamp_us: 10_000_000,
            description: "spike".to_string(),
        }
    }

    #[tokio::test]
    async fn medium_blocks_table_and_user() {
        let engine = Arc::new(StubEngine {
            recovery_succeeds: AtomicBool::new(true),
        });
        let r = ResponseEngine::new(
            engine,
            Arc::new(SystemClock),
            5_000_000,
            std::time::Duration::from_secs(60),
        );
        r.respond(&report(AnomalySeverity::Medium)).await;
        assert!(r.is_table_blocked("orders"));
        assert!(r.is_user_blocked("attacker"));
    }

    #[tokio::test]
    async fn successful_high_recovery_unblocks_and_enters_cooldown() {
        let engine = Arc::new(StubEngine {
            recovery_succeeds: AtomicBool::new(true),
        });
        let r = ResponseEngine::new(
            engine,
            Arc::new(SystemClock),
            5_000_000,
            std::time::Duration::from_secs(60),
        );
        r.respond(&report(AnomalySeverity::High)).await;
        assert!(!r.is_table_blocked("orders"));
        assert!(r.is_in_cooldown("orders"));
    }

    #[tokio::test]
    async fn failed_high_recovery_leaves_table_blocked() {
        let engine = Arc::new(StubEngine {
            recovery_succeeds: AtomicBool::new(false),
        });
        let r = ResponseEngine::new(
            engine,
            Arc::new(SystemClock),
            5_000_000,
            std::time::Duration::from_secs(60),
        );
        r.respond(&report(AnomalySeverity::High)).await;
        assert!(r.is_table_blocked("orders"));
        assert!(!r.is_in_cooldown("orders"));
    }

    #[tokio::test]
    async fn admin_unblock_clears_block() {
        let engine = Arc::new(StubEngine {
            recovery_succeeds: AtomicBool::new(true),
        });
        let r = ResponseEngine::new(
            engine,
            Arc::new(SystemClock),
            5_000_000,
            std::time::Duration::from_secs(60),
        );
        r.respond(&report(AnomalySeverity::Medium)).await;
        r.unblock_table("orders");
        r.unblock_user("attacker");
        assert!(!r.is_table_blocked("orders"));
        assert!(!r.is_user_blocked("attacker"));
    }

    #[tokio::test]
    async fn cooldown_expires_after_recovery_cooldown_elapses() {
        let engine = Arc::new(StubEngine {
            recovery_succeeds: AtomicBool::new(true),
        });
        let clock = Arc::new(ManualClock::new(0));
        let r = ResponseEngine::new(
            engine,
            clock.clone(),
            5_000_000,
            std::time::Duration::from_secs(60),
        );
        r.respond(&report(AnomalySeverity::High)).await;
        assert!(r.is_in_cooldown("orders"));

        clock.advance_us(59_000_000);
        assert!(r.is_in_cooldown("orders"));

        clock.advance_us(2_000_000);
        assert!(!r.is_in_cooldown("orders"));
    }
}
