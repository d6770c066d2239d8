//! Records which timestamps are queried via time-travel, building the
//! frequency distribution [`super::hotspot_detector::HotspotDetector`]
//! clusters.

use std::collections::{HashMap, VecDeque};

use parking_lot::RwLock;

/// A single time-travel query observation.
#[derive(Debug, Clone)]
pub struct TemporalAccessEvent {
    /// The timestamp the user time-traveled to.
    pub queried_timestamp_us: u64,
    /// When the query was executed.
    pub query_time_us: u64,
    pub table_name: String,
    pub db_name: String,
}

/// One bucket of a fixed-width frequency histogram.
#[derive(Debug, Clone, Copy)]
pub struct FrequencyBucket {
    pub start_us: u64,
    pub end_us: u64,
    pub access_count: u64,
}

/// Bounded log of [`TemporalAccessEvent`]s, capped at
/// `ACCESS_PATTERN_WINDOW_SIZE` entries.
pub struct TemporalAccessTracker {
    events: RwLock<VecDeque<TemporalAccessEvent>>,
    window_size: usize,
}

impl TemporalAccessTracker {
    #[must_use]
    pub fn new(window_size: usize) -> Self {
        Self {
            events: RwLock::new(VecDeque::new()),
            window_size,
        }
    }

    pub fn record_access(&self, event: TemporalAccessEvent) {
        let mut events = self.events.write();
        events.push_back(event);
        while events.len() > self.window_size {
            events.pop_front();
        }
    }

    /// Histogram of access counts bucketed into `bucket_width_us`-wide
    /// windows spanning the recorded timestamps, capped at `max_buckets`.
    #[must_use]
    pub fn get_frequency_histogram(&self, bucket_width_us: u64, max_buckets: usize) -> Vec<FrequencyBucket> {
        let events = self.events.read();
        if events.is_empty() || bucket_width_us == 0 {
            return Vec::new();
        }

        let min_ts = events.iter().map(|e| e.queried_timestamp_us).min().unwrap();
        let max_ts = events.iter().map(|e| e.queried_timestamp_us).max().unwrap();

        let num_buckets = max_buckets.min(((max_ts - min_ts) / bucket_width_us) as usize + 1);
        let mut histogram: Vec<FrequencyBucket> = (0..num_buckets)
            .map(|i| {
                let start = min_ts + i as u64 * bucket_width_us;
                FrequencyBucket { start_us: start, end_us: start + bucket_width_us, access_count: 0 }
            })
            .collect();

        for event in events.iter() {
            let idx = ((event.queried_timestamp_us - min_ts) / bucket_width_us) as usize;
            if let Some(bucket) = histogram.get_mut(idx) {
                bucket.access_count += 1;
            }
        }
        histogram
    }

    #[must_use]
    pub fn get_events(&self, start_us: u64, end_us: u64) -> Vec<TemporalAccessEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.queried_timestamp_us >= start_us && e.queried_timestamp_us < end_us)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn get_all_events(&self) -> Vec<TemporalAccessEvent> {
        self.events.read().iter().cloned().collect()
    }

    /// Top-`k` most frequently queried timestamps, rounded to the nearest
    /// second, most frequent first.
    #[must_use]
    pub fn get_hot_timestamps(&self, k: usize) -> Vec<u64> {
        let events = self.events.read();
        let mut freq: HashMap<u64, u64> = HashMap::new();
        for event in events.iter() {
            let bucket = event.queried_timestamp_us / 1_000_000 * 1_000_000;
            *freq.entry(bucket).or_insert(0) += 1;
        }
        let mut sorted: Vec<(u64, u64)> = freq.into_iter().collect();
        sorted.sort_by(|a, b| b.1.cmp(&a.1));
        sorted.into_iter().take(k).map(|(ts, _)| ts).collect()
    }

    #[must_use]
    pub fn get_total_access_count(&self) -> usize {
        self.events.read().len()
    }
}
