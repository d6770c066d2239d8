//! Clusters temporal access patterns into hotspots (1-D DBSCAN sweep) and
//! flags change points in a mutation-rate time series (CUSUM).

use crate::temporal::access_tracker::TemporalAccessEvent;

/// A cluster of temporally-close time-travel queries.
#[derive(Debug, Clone, Copy)]
pub struct TemporalHotspot {
    pub center_timestamp_us: u64,
    pub range_start_us: u64,
    pub range_end_us: u64,
    pub access_count: usize,
    /// Accesses per second within `[range_start_us, range_end_us]`.
    pub density: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct HotspotThresholds {
    pub cluster_epsilon_us: u64,
    pub cluster_min_points: usize,
    pub cusum_threshold_sigma_mult: f64,
    pub cusum_drift_sigma_mult: f64,
}

/// Stateless clustering/change-point routines; all parameters are passed
/// in per call via [`HotspotThresholds`].
pub struct HotspotDetector {
    thresholds: HotspotThresholds,
}

impl HotspotDetector {
    #[must_use]
    pub fn new(thresholds: HotspotThresholds) -> Self {
        Self { thresholds }
    }

    /// Cluster the queried timestamps of `events` and report each
    /// sufficiently dense cluster as a hotspot, densest first.
    #[must_use]
    pub fn detect_hotspots(&self, events: &[TemporalAccessEvent]) -> Vec<TemporalHotspot> {
        if events.is_empty() {
            return Vec::new();
        }

        let mut timestamps: Vec<u64> = events.iter().map(|e| e.queried_timestamp_us).collect();
        timestamps.sort_unstable();

        let clusters = self.cluster_timestamps(&timestamps);

        let mut hotspots: Vec<TemporalHotspot> = clusters
            .into_iter()
            .filter(|c| c.len() >= self.thresholds.cluster_min_points)
            .map(|cluster| {
                let min_ts = cluster.iter().copied().min().unwrap();
                let max_ts = cluster.iter().copied().max().unwrap();
                let sum: f64 = cluster.iter().map(|&ts| ts as f64).sum();
                let access_count = cluster.len();
                let center = (sum / access_count as f64) as u64;
                let range_seconds = (max_ts - min_ts) as f64 / 1_000_000.0;
                let density = if range_seconds > 0.0 {
                    access_count as f64 / range_seconds
                } else {
                    access_count as f64
                };
                TemporalHotspot {
                    center_timestamp_us: center,
                    range_start_us: min_ts,
                    range_end_us: max_ts,
                    access_count,
                    density,
                }
            })
            .collect();

        hotspots.sort_by(|a, b| b.density.total_cmp(&a.density));
        hotspots
    }

    /// Timestamps (from the mutation-rate time series) where a significant
    /// upward or downward shift occurred, via CUSUM over a sigma-scaled
    /// threshold/drift. Requires at least 3 points and non-zero variance.
    #[must_use]
    pub fn detect_change_points(&self, mutation_rates: &[f64], timestamps: &[u64]) -> Vec<u64> {
        if mutation_rates.len() < 3 || mutation_rates.len() != timestamps.len() {
            return Vec::new();
        }

        let mean = mutation_rates.iter().sum::<f64>() / mutation_rates.len() as f64;
        let variance = mutation_rates.iter().map(|v| (v - mean).powi(2)).sum::<f64>()
            / mutation_rates.len() as f64;
        let sigma = variance.sqrt();
        if sigma < 0.001 {
            return Vec::new();
        }

        let threshold = self.thresholds.cusum_threshold_sigma_mult * sigma;
        let drift = self.thresholds.cusum_drift_sigma_mult * sigma;

        self.cusum_change_points(mutation_rates, mean, threshold, drift)
            .into_iter()
            .filter_map(|idx| timestamps.get(idx).copied())
            .collect()
    }

    /// Walk sorted timestamps, grouping consecutive points within epsilon
    /// of each other into a cluster (a 1-D, single-pass simplification of
    /// DBSCAN: no core/border-point distinction, since in one dimension a
    /// sorted gap sweep produces the same clusters).
    fn cluster_timestamps(&self, timestamps: &[u64]) -> Vec<Vec<u64>> {
        let mut clusters = Vec::new();
        if timestamps.is_empty() {
            return clusters;
        }

        let mut current = vec![timestamps[0]];
        for &ts in &timestamps[1..] {
            let prev = *current.last().unwrap();
            if ts - prev <= self.thresholds.cluster_epsilon_us {
                current.push(ts);
            } else {
                if current.len() >= self.thresholds.cluster_min_points {
                    clusters.push(std::mem::take(&mut current));
                } else {
                    current.clear();
                }
                current.push(ts);
            }
        }
        if current.len() >= self.thresholds.cluster_min_points {
            clusters.push(current);
        }
        clusters
    }

    fn cusum_change_points(&self, values: &[f64], mean: f64, threshold: f64, drift: f64) -> Vec<usize> {
        let mut change_points = Vec::new();
        let mut s_pos = 0.0_f64;
        let mut s_neg = 0.0_f64;

        for (i, &v) in values.iter().enumerate() {
            s_pos = (s_pos + (v - mean - drift)).max(0.0);
            s_neg = (s_neg + (mean - v - drift)).max(0.0);

            if s_pos > threshold || s_neg > threshold {
                change_points.push(i);
                s_pos = 0.0;
                s_neg = 0.0;
            }
        }
        change_points
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> HotspotThresholds {
        HotspotThresholds {
            cluster_epsilon_us: 300_000_000,
            cluster_min_points: 3,
            cusum_threshold_sigma_mult: 4.0,
            cusum_drift_sigma_mult: 0.5,
        }
    }

    fn event(queried: u64) -> TemporalAccessEvent {
        TemporalAccessEvent {
            queried_timestamp_us: queried,
            query_time_us: 0,
            table_name: "orders".to_string(),
            db_name: "main".to_string(),
        }
    }

    #[test]
    fn detects_a_dense_cluster_and_ignores_isolated_points() {
        let detector = HotspotDetector::new(thresholds());
        let events: Vec<TemporalAccessEvent> = vec![
            event(1_000_000),
            event(1_100_000),
            event(1_200_000),
            event(1_250_000),
            event(50_000_000), // isolated, below min_points
        ];
        let hotspots = detector.detect_hotspots(&events);
        assert_eq!(hotspots.len(), 1);
        assert_eq!(hotspots[0].access_count, 4);
    }

    #[test]
    fn empty_events_yield_no_hotspots() {
        let detector = HotspotDetector::new(thresholds());
        assert!(detector.detect_hotspots(&[]).is_empty());
    }

    #[test]
    fn steady_rate_has_no_change_points() {
        let detector = HotspotDetector::new(thresholds());
        let rates = vec![10.0; 20];
        let timestamps: Vec<u64> = (0..20).map(|i| i * 60_000_000).collect();
        assert!(detector.detect_change_points(&rates, &timestamps).is_empty());
    }

    #[test]
    fn sustained_jump_is_flagged_as_a_change_point() {
        let detector = HotspotDetector::new(thresholds());
        let mut rates = vec![10.0; 10];
        rates.extend(vec![100.0; 10]);
        let timestamps: Vec<u64> = (0..20).map(|i| i * 60_000_000).collect();
        let change_points = detector.detect_change_points(&rates, &timestamps);
        assert!(!change_points.is_empty());
    }

    #[test]
    fn too_few_points_yields_no_change_points() {
        let detector = HotspotDetector::new(thresholds());
        assert!(detector.detect_change_points(&[1.0, 2.0], &[0, 1]).is_empty());
    }
}
