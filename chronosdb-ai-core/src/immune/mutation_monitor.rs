//! Per-table rolling-window mutation log.

use std::collections::{HashMap, VecDeque};

use parking_lot::{Mutex, RwLock};

struct MutationEntry {
    timestamp_us: u64,
    row_count: u32,
}

struct TableMutationLog {
    entries: Mutex<VecDeque<MutationEntry>>,
}

/// Tracks per-table mutation rates in a rolling time window.
///
/// Two-level locking: a reader/writer lock over the table map (read lock
/// for the common lookup, write lock only to insert a new table) plus a
/// per-table mutex so uncontended tables never serialize against each
/// other.
pub struct MutationMonitor {
    tables: RwLock<HashMap<String, TableMutationLog>>,
    rolling_window_us: u64,
}

impl MutationMonitor {
    #[must_use]
    pub fn new(rolling_window_us: u64) -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            rolling_window_us,
        }
    }

    fn get_or_create<'a>(&'a self, table_name: &str) -> parking_lot::MappedRwLockReadGuard<'a, TableMutationLog> {
        {
            let tables = self.tables.read();
            if tables.contains_key(table_name) {
                return parking_lot::RwLockReadGuard::map(tables, |t| &t[table_name]);
            }
        }
        {
            let mut tables = self.tables.write();
            tables
                .entry(table_name.to_string())
                .or_insert_with(|| TableMutationLog {
                    entries: Mutex::new(VecDeque::new()),
                });
        }
        let tables = self.tables.read();
        parking_lot::RwLockReadGuard::map(tables, |t| &t[table_name])
    }

    /// Append an entry and prune anything older than the rolling window
    /// relative to this new entry's timestamp.
    pub fn record_mutation(&self, table_name: &str, rows_affected: u32, timestamp_us: u64) {
        let log = self.get_or_create(table_name);
        let mut entries = log.entries.lock();
        entries.push_back(MutationEntry {
            timestamp_us,
            row_count: rows_affected,
        });
        let cutoff = timestamp_us.saturating_sub(self.rolling_window_us);
        while entries.front().is_some_and(|e| e.timestamp_us < cutoff) {
            entries.pop_front();
        }
    }

    /// Total rows mutated on `table_name` within `window_us` of `now_us`.
    #[must_use]
    pub fn get_mutation_count(&self, table_name: &str, window_us: u64, now_us: u64) -> u64 {
        let tables = self.tables.read();
        let Some(log) = tables.get(table_name) else {
            return 0;
        };
        let cutoff = now_us.saturating_sub(window_us);
        let entries = log.entries.lock();
        entries
            .iter()
            .filter(|e| e.timestamp_us >= cutoff)
            .map(|e| u64::from(e.row_count))
            .sum()
    }

    /// Rolling average mutation rate (rows/second) over the last
    /// `rate_interval_us`.
    #[must_use]
    pub fn get_mutation_rate(&self, table_name: &str, rate_interval_us: u64, now_us: u64) -> f64 {
        let count = self.get_mutation_count(table_name, rate_interval_us, now_us);
        let interval_seconds = rate_interval_us as f64 / 1_000_000.0;
        if interval_seconds > 0.0 {
            count as f64 / interval_seconds
        } else {
            0.0
        }
    }

    /// Bucket the mutation log into `num_intervals` contiguous intervals of
    /// `interval_us` ending "now"; index 0 is the most recent interval.
    #[must_use]
    pub fn get_historical_rates(
        &self,
        table_name: &str,
        num_intervals: usize,
        interval_us: u64,
        now_us: u64,
    ) -> Vec<f64> {
        let mut rates = vec![0.0; num_intervals];
        let tables = self.tables.read();
        let Some(log) = tables.get(table_name) else {
            return rates;
        };
        let interval_sec = interval_us as f64 / 1_000_000.0;
        let entries = log.entries.lock();
        for entry in entries.iter() {
            if entry.timestamp_us >= now_us {
                continue;
            }
            let age_us = now_us - entry.timestamp_us;
            let idx = (age_us / interval_us) as usize;
            if idx < num_intervals {
                rates[idx] += f64::from(entry.row_count) / interval_sec;
            }
        }
        rates
    }

    #[must_use]
    pub fn get_monitored_tables(&self) -> Vec<String> {
        self.tables.read().keys().cloned().collect()
    }
}
