//! Z-score based anomaly detection over per-table mutation rates.

use std::collections::VecDeque;

use parking_lot::Mutex;

use super::mutation_monitor::MutationMonitor;

/// Severity tier assigned to a detected anomaly, driving the response
/// engine's action (log, block, or auto-recover).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AnomalySeverity {
    None,
    /// z >= `ZSCORE_LOW_THRESHOLD` (2.0) -- log a warning.
    Low,
    /// z >= `ZSCORE_MEDIUM_THRESHOLD` (3.0) -- block table mutations.
    Medium,
    /// z >= `ZSCORE_HIGH_THRESHOLD` (4.0) -- auto-recover via time travel.
    High,
}

impl AnomalySeverity {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AnomalySeverity::None => "NONE",
            AnomalySeverity::Low => "LOW",
            AnomalySeverity::Medium => "MEDIUM",
            AnomalySeverity::High => "HIGH",
        }
    }
}

/// A single detected anomaly, retained for "SHOW ANOMALIES".
#[derive(Debug, Clone)]
pub struct AnomalyReport {
    pub table_name: String,
    pub user: String,
    pub severity: AnomalySeverity,
    pub z_score: f64,
    pub current_rate: f64,
    pub mean_rate: f64,
    pub std_dev: f64,
    pub timestamp_us: u64,
    pub description: String,
}

/// Thresholds and bookkeeping parameters for [`AnomalyDetector::analyze`].
#[derive(Debug, Clone, Copy)]
pub struct AnomalyThresholds {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
    pub quiet_sigma_threshold: f64,
    pub quiet_min_absolute_spike: f64,
    pub window_size: usize,
    pub rate_interval_us: u64,
    pub min_buckets_for_analysis: usize,
}

/// Z-score based anomaly detector. Analyzes the current mutation rate of
/// every monitored table against its own historical rate distribution.
pub struct AnomalyDetector {
    thresholds: AnomalyThresholds,
    history: Mutex<VecDeque<AnomalyReport>>,
    max_history: usize,
}

impl AnomalyDetector {
    #[must_use]
    pub fn new(thresholds: AnomalyThresholds, max_history: usize) -> Self {
        Self {
            thresholds,
            history: Mutex::new(VecDeque::new()),
            max_history,
        }
    }

    /// Analyze every table the mutation monitor currently tracks and return
    /// any anomalies found (does not record them; callers decide whether to
    /// via [`Self::record_anomaly`]).
    #[must_use]
    pub fn analyze(&self, monitor: &MutationMonitor, now_us: u64) -> Vec<AnomalyReport> {
        let mut reports = Vec::new();
        for table in monitor.get_monitored_tables() {
            let current_rate = monitor.get_mutation_rate(&table, self.thresholds.rate_interval_us, now_us);
            let historical = monitor.get_historical_rates(
                &table,
                self.thresholds.window_size,
                self.thresholds.rate_interval_us,
                now_us,
            );

            if historical.len() < self.thresholds.min_buckets_for_analysis {
                continue;
            }

            let z = self.compute_z_score(current_rate, &historical);
            let severity = self.classify(z);
            if severity == AnomalySeverity::None {
                continue;
            }

            let mean = mean(&historical);
            let std_dev = std_dev(&historical, mean);
            let description = format!(
                "Table '{table}' mutation rate {current_rate:.3}/s (mean={mean:.3}, z={z:.3}, severity={})",
                severity.as_str()
            );

            reports.push(AnomalyReport {
                table_name: table,
                user: String::new(),
                severity,
                z_score: z,
                current_rate,
                mean_rate: mean,
                std_dev,
                timestamp_us: now_us,
                description,
            });
        }
        reports
    }

    #[must_use]
    pub fn classify(&self, z_score: f64) -> AnomalySeverity {
        let abs_z = z_score.abs();
        let t = &self.thresholds;
        if abs_z >= t.high {
            AnomalySeverity::High
        } else if abs_z >= t.medium {
            AnomalySeverity::Medium
        } else if abs_z >= t.low {
            AnomalySeverity::Low
        } else {
            AnomalySeverity::None
        }
    }

    /// (x - mu) / sigma, with a quiet-state carve-out: when the historical
    /// distribution is essentially flat (sigma below
    /// `quiet_sigma_threshold`), only report an anomaly if the current rate
    /// is a meaningful absolute spike, not just a relative one — otherwise
    /// an idle table's noise floor would trip the high-severity branch.
    fn compute_z_score(&self, current_value: f64, historical_values: &[f64]) -> f64 {
        if historical_values.is_empty() {
            return 0.0;
        }
        let m = mean(historical_values);
        let sigma = std_dev(historical_values, m);

        if sigma < self.thresholds.quiet_sigma_threshold {
            if current_value - m < self.thresholds.quiet_min_absolute_spike {
                return 0.0;
            }
            return self.thresholds.high + 1.0;
        }

        (current_value - m) / sigma
    }

    pub fn record_anomaly(&self, report: AnomalyReport) {
        let mut history = self.history.lock();
        history.push_back(report);
        while history.len() > self.max_history {
            history.pop_front();
        }
    }

    /// Most recent anomalies first, capped at `max_count`.
    #[must_use]
    pub fn get_recent_anomalies(&self, max_count: usize) -> Vec<AnomalyReport> {
        let history = self.history.lock();
        history.iter().rev().take(max_count).cloned().collect()
    }

    #[must_use]
    pub fn get_total_anomalies(&self) -> usize {
        self.history.lock().len()
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn std_dev(values: &[f64], mean: f64) -> f64 {
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

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

    #[test]
    fn classify_thresholds_match_spec_tiers() {
        let detector = AnomalyDetector::new(thresholds(), 500);
        assert_eq!(detector.classify(1.0), AnomalySeverity::None);
        assert_eq!(detector.classify(2.5), AnomalySeverity::Low);
        assert_eq!(detector.classify(3.5), AnomalySeverity::Medium);
        assert_eq!(detector.classify(4.5), AnomalySeverity::High);
    }

    #[test]
    fn quiet_table_with_small_spike_is_not_anomalous() {
        let detector = AnomalyDetector::new(thresholds(), 500);
        let historical = vec![0.0; 60];
        let z = detector.compute_z_score(0.5, &historical);
        assert_eq!(z, 0.0);
    }

    #[test]
    fn quiet_table_with_meaningful_spike_is_flagged_high() {
        let detector = AnomalyDetector::new(thresholds(), 500);
        let historical = vec![0.0; 60];
        let z = detector.compute_z_score(5.0, &historical);
        assert!(z > thresholds().high);
    }

    #[test]
    fn history_caps_at_max_and_returns_most_recent_first() {
        let detector = AnomalyDetector::new(thresholds(), 2);
        for i in 0..5 {
            detector.record_anomaly(AnomalyReport {
                table_name: format!("t{i}"),
                user: String::new(),
                severity: AnomalySeverity::Low,
                z_score: 2.5,
                current_rate: 1.0,
                mean_rate: 0.1,
                std_dev: 0.1,
                timestamp_us: i,
                description: String::new(),
            });
        }
        assert_eq!(detector.get_total_anomalies(), 2);
        let recent = detector.get_recent_anomalies(10);
        assert_eq!(recent[0].table_name, "t4");
        assert_eq!(recent[1].table_name, "t3");
    }

    #[test]
    fn analyze_is_silent_for_a_steady_rate() {
        let monitor = MutationMonitor::new(100_000_000);
        for i in 0..10 {
            monitor.record_mutation("t", 10, i * 1_000_000);
        }
        let detector = AnomalyDetector::new(
            AnomalyThresholds {
                window_size: 10,
                rate_interval_us: 1_000_000,
                min_buckets_for_analysis: 10,
                ..thresholds()
            },
            500,
        );
        assert!(detector.analyze(&monitor, 10_000_000).is_empty());
    }

    #[test]
    fn analyze_flags_a_burst_above_a_steady_baseline() {
        let monitor = MutationMonitor::new(100_000_000);
        for i in 0..10 {
            monitor.record_mutation("t", 10, i * 1_000_000);
        }
        monitor.record_mutation("t", 100, 9_500_000);
        let detector = AnomalyDetector::new(
            AnomalyThresholds {
                window_size: 10,
                rate_interval_us: 1_000_000,
                min_buckets_for_analysis: 10,
                ..thresholds()
            },
            500,
        );
        let reports = detector.analyze(&monitor, 10_000_000);
        assert_eq!(reports.len(), 1);
        assert_ne!(reports[0].severity, AnomalySeverity::None);
    }
}
