//! Auto-recovery flow end-to-end: a HIGH anomaly must drive the response
//! engine's recovery call, and success/failure there must be reflected in
//! the table's blocked state, while the detector's own history keeps every
//! report regardless of recovery outcome.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use chronosdb_ai_core::clock::SystemClock;
use chronosdb_ai_core::engine_hooks::{EngineServices, IndexInfo, RecoveryResult};
use chronosdb_ai_core::immune::{AnomalyDetector, AnomalyReport, AnomalySeverity, AnomalyThresholds, ResponseEngine};

struct StubEngine {
    recovery_succeeds: AtomicBool,
}

#[async_trait]
impl EngineServices for StubEngine {
    async fn recover_to(&self, _target_timestamp_us: u64, _db_name: &str) -> RecoveryResult {
        if self.recovery_succeeds.load(Ordering::SeqCst) {
            RecoveryResult::ok(10, 5)
        } else {
            RecoveryResult::failed("stub recovery failure")
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

fn thresholds() -> AnomalyThresholds {
    AnomalyThresholds {
        low: 2.0,
        medium: 3.0,
        high: 4.0,
        quiet_sigma_threshold: 0.001,
        quiet_min_absolute_spike: 1.0,
        window_size: 60,
        rate_interval_us: 60_000_000,
        min_buckets_for_analysis: 10,
    }
}

fn high_anomaly(table: &str, timestamp_us: u64) -> AnomalyReport {
    AnomalyReport {
        table_name: table.to_string(),
        user: String::new(),
        severity: AnomalySeverity::High,
        z_score: 5.0,
        current_rate: 50.0,
        mean_rate: 5.0,
        std_dev: 1.0,
        timestamp_us,
        description: format!("table '{table}' mutation rate spiked"),
    }
}

#[tokio::test]
async fn successful_recovery_unblocks_and_failed_recovery_stays_blocked() {
    let detector = AnomalyDetector::new(thresholds(), 500);

    // Table T: recovery succeeds, so the HIGH response should unblock it
    // again once the recovery completes.
    let recovering_engine = Arc::new(StubEngine { recovery_succeeds: AtomicBool::new(true) });
    let recovering_response = ResponseEngine::new(
        recovering_engine,
        Arc::new(SystemClock),
        30_000_000,
        Duration::from_secs(60),
    );
    let recovered_report = high_anomaly("t_recovers", 1_000_000);
    recovering_response.respond(&recovered_report).await;
    detector.record_anomaly(recovered_report.clone());

    assert!(!recovering_response.is_table_blocked("t_recovers"));
    assert!(recovering_response.is_in_cooldown("t_recovers"));

    // Table U: recovery fails, so it must remain blocked.
    let failing_engine = Arc::new(StubEngine { recovery_succeeds: AtomicBool::new(false) });
    let failing_response = ResponseEngine::new(
        failing_engine,
        Arc::new(SystemClock),
        30_000_000,
        Duration::from_secs(60),
    );
    let failed_report = high_anomaly("u_stays_blocked", 2_000_000);
    failing_response.respond(&failed_report).await;
    detector.record_anomaly(failed_report.clone());

    assert!(failing_response.is_table_blocked("u_stays_blocked"));
    assert!(!failing_response.is_in_cooldown("u_stays_blocked"));

    // The detector's history is independent of recovery outcome — both
    // reports are retained.
    let history = detector.get_recent_anomalies(10);
    assert_eq!(history.len(), 2);
    assert!(history.iter().any(|r| r.table_name == "t_recovers"));
    assert!(history.iter().any(|r| r.table_name == "u_stays_blocked"));
    assert_eq!(detector.get_total_anomalies(), 2);
}
