//! UCB1 contextual bandit for scan-strategy selection.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::learning::features::QueryFeatures;

const NUM_ARMS: usize = 2;
const BANDIT_HEADER: &str = "CHRONOS_BANDIT_V1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStrategy {
    SequentialScan = 0,
    IndexScan = 1,
}

impl ScanStrategy {
    fn from_index(i: usize) -> Self {
        if i == 0 {
            ScanStrategy::SequentialScan
        } else {
            ScanStrategy::IndexScan
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct TableStats {
    pulls: u64,
    total_reward: f64,
}

struct ArmData {
    pull_count: AtomicU64,
    total_reward_fixed: AtomicU64,
    table_stats: Mutex<HashMap<String, TableStats>>,
}

impl ArmData {
    fn new() -> Self {
        Self {
            pull_count: AtomicU64::new(0),
            total_reward_fixed: AtomicU64::new(0),
            table_stats: Mutex::new(HashMap::new()),
        }
    }
}

/// Per-arm statistics snapshot for "SHOW EXECUTION STATS".
#[derive(Debug, Clone, Copy)]
pub struct ArmStats {
    pub strategy: ScanStrategy,
    pub total_pulls: u64,
    pub average_reward: f64,
    pub ucb_score: f64,
}

/// Tunables the bandit needs, threaded in from [`crate::constants::AiConfig`]
/// rather than read as free-standing globals.
#[derive(Debug, Clone, Copy)]
pub struct BanditConfig {
    pub min_samples_before_learning: u64,
    pub min_arm_pulls: u64,
    pub min_table_pulls_for_context: u64,
    pub exploration_constant: f64,
    pub reward_scale_ms: f64,
    pub reward_fixed_point_scale: f64,
}

/// Two-armed (`SEQUENTIAL_SCAN`/`INDEX_SCAN`) UCB1 bandit with per-table
/// contextual statistics layered on top of global arm statistics.
pub struct Ucb1Bandit {
    arms: [ArmData; NUM_ARMS],
    total_pulls: AtomicU64,
    config: BanditConfig,
}

impl Ucb1Bandit {
    #[must_use]
    pub fn new(config: BanditConfig) -> Self {
        Self {
            arms: [ArmData::new(), ArmData::new()],
            total_pulls: AtomicU64::new(0),
            config,
        }
    }

    #[must_use]
    pub fn select_strategy(&self, features: &QueryFeatures, table_name: &str) -> ScanStrategy {
        let total = self.total_pulls.load(Ordering::Relaxed);

        if features.has_index_available < 0.5 {
            return ScanStrategy::SequentialScan;
        }

        if total < self.config.min_samples_before_learning {
            return if total % 2 == 0 {
                ScanStrategy::IndexScan
            } else {
                ScanStrategy::SequentialScan
            };
        }

        for (i, arm) in self.arms.iter().enumerate() {
            if arm.pull_count.load(Ordering::Relaxed) < self.config.min_arm_pulls {
                return ScanStrategy::from_index(i);
            }
        }

        let has_table_context = self.arms.iter().all(|arm| {
            arm.table_stats
                .lock()
                .get(table_name)
                .is_some_and(|s| s.pulls >= self.config.min_table_pulls_for_context)
        });

        let mut best_score = f64::NEG_INFINITY;
        let mut best_arm = 0;
        for i in 0..NUM_ARMS {
            let score = if has_table_context {
                self.compute_table_ucb_score(i, table_name)
            } else {
                self.compute_ucb_score(i)
            };
            if score > best_score {
                best_score = score;
                best_arm = i;
            }
        }

        if features.selectivity_estimate < 0.05 && best_arm == 0 {
            let idx_reward = self.average_reward(1);
            let seq_reward = self.average_reward(0);
            if idx_reward > 0.0 && idx_reward > seq_reward * 0.8 {
                best_arm = 1;
            }
        } else if features.selectivity_estimate > 0.5 && best_arm == 1 {
            let idx_reward = self.average_reward(1);
            let seq_reward = self.average_reward(0);
            if seq_reward > 0.0 && seq_reward > idx_reward * 0.8 {
                best_arm = 0;
            }
        }

        ScanStrategy::from_index(best_arm)
    }

    pub fn record_outcome(&self, strategy: ScanStrategy, table_name: &str, execution_time_ms: f64) {
        let arm_idx = strategy as usize;
        let reward = Self::compute_reward(execution_time_ms, self.config.reward_scale_ms);
        let reward_fixed = (reward * self.config.reward_fixed_point_scale) as u64;

        let arm = &self.arms[arm_idx];
        arm.pull_count.fetch_add(1, Ordering::Relaxed);
        arm.total_reward_fixed.fetch_add(reward_fixed, Ordering::Relaxed);
        self.total_pulls.fetch_add(1, Ordering::Relaxed);

        let mut table_stats = arm.table_stats.lock();
        let entry = table_stats.entry(table_name.to_string()).or_insert(TableStats {
            pulls: 0,
            total_reward: 0.0,
        });
        entry.pulls += 1;
        entry.total_reward += reward;
    }

    #[must_use]
    pub fn get_stats(&self) -> Vec<ArmStats> {
        (0..NUM_ARMS)
            .map(|i| ArmStats {
                strategy: ScanStrategy::from_index(i),
                total_pulls: self.arms[i].pull_count.load(Ordering::Relaxed),
                average_reward: self.average_reward(i),
                ucb_score: self.compute_ucb_score(i),
            })
            .collect()
    }

    #[must_use]
    pub fn has_sufficient_data(&self) -> bool {
        self.total_pulls.load(Ordering::Relaxed) >= self.config.min_samples_before_learning
    }

    pub fn reset(&self) {
        for arm in &self.arms {
            arm.pull_count.store(0, Ordering::Relaxed);
            arm.total_reward_fixed.store(0, Ordering::Relaxed);
            arm.table_stats.lock().clear();
        }
        self.total_pulls.store(0, Ordering::Relaxed);
    }

    /// `decay_factor <= 0.0` is equivalent to [`Self::reset`]; `>= 1.0` is a
    /// no-op. Per-table entries whose pulls drop below 2 are evicted.
    pub fn decay(&self, decay_factor: f64) {
        if decay_factor <= 0.0 {
            self.reset();
            return;
        }
        if decay_factor >= 1.0 {
            return;
        }

        let mut new_total = 0u64;
        for arm in &self.arms {
            let old_pulls = arm.pull_count.load(Ordering::Relaxed);
            let new_pulls = (old_pulls as f64 * decay_factor) as u64;
            arm.pull_count.store(new_pulls, Ordering::Relaxed);
            new_total += new_pulls;

            let old_reward = arm.total_reward_fixed.load(Ordering::Relaxed);
            let new_reward = (old_reward as f64 * decay_factor) as u64;
            arm.total_reward_fixed.store(new_reward, Ordering::Relaxed);

            let mut table_stats = arm.table_stats.lock();
            for stats in table_stats.values_mut() {
                stats.pulls = (stats.pulls as f64 * decay_factor) as u64;
                stats.total_reward *= decay_factor;
            }
            table_stats.retain(|_, stats| stats.pulls >= 2);
        }
        self.total_pulls.store(new_total, Ordering::Relaxed);
    }

    fn compute_ucb_score(&self, arm_index: usize) -> f64 {
        let n_a = self.arms[arm_index].pull_count.load(Ordering::Relaxed);
        let n = self.total_pulls.load(Ordering::Relaxed);
        if n_a == 0 {
            return f64::INFINITY;
        }
        let q_a = self.average_reward(arm_index);
        let exploration = self.config.exploration_constant * ((n as f64).ln() / n_a as f64).sqrt();
        q_a + exploration
    }

    fn compute_table_ucb_score(&self, arm_index: usize, table_name: &str) -> f64 {
        let table_stats = self.arms[arm_index].table_stats.lock();
        let Some(stats) = table_stats.get(table_name).filter(|s| s.pulls > 0) else {
            return f64::INFINITY;
        };
        let n = self.total_pulls.load(Ordering::Relaxed);
        let q_a = stats.total_reward / stats.pulls as f64;
        let exploration =
            self.config.exploration_constant * ((n as f64).ln() / stats.pulls as f64).sqrt();
        q_a + exploration
    }

    fn compute_reward(execution_time_ms: f64, reward_scale_ms: f64) -> f64 {
        1.0 / (1.0 + execution_time_ms / reward_scale_ms)
    }

    fn average_reward(&self, arm_index: usize) -> f64 {
        let pulls = self.arms[arm_index].pull_count.load(Ordering::Relaxed);
        if pulls == 0 {
            return 0.0;
        }
        let total_reward = self.arms[arm_index].total_reward_fixed.load(Ordering::Relaxed);
        (total_reward as f64 / self.config.reward_fixed_point_scale) / pulls as f64
    }

    pub fn save_state(&self, path: &Path) -> Result<()> {
        let mut file = std::fs::File::create(path)?;
        writeln!(file, "{BANDIT_HEADER}")?;
        writeln!(file, "{}", self.total_pulls.load(Ordering::Relaxed))?;
        writeln!(file, "{NUM_ARMS}")?;

        for arm in &self.arms {
            let pulls = arm.pull_count.load(Ordering::Relaxed);
            let reward = arm.total_reward_fixed.load(Ordering::Relaxed);
            writeln!(file, "{pulls} {reward}")?;

            let table_stats = arm.table_stats.lock();
            writeln!(file, "{}", table_stats.len())?;
            for (table, stats) in table_stats.iter() {
                writeln!(file, "{table} {} {}", stats.pulls, stats.total_reward)?;
            }
        }
        Ok(())
    }

    pub fn load_state(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::open(path)?;
        let mut reader = BufReader::new(file);

        let header = read_line(&mut reader, path)?;
        if header.trim() != BANDIT_HEADER {
            return Err(Error::PersistenceCorrupted {
                path: path.display().to_string(),
                reason: "unrecognized header".to_string(),
            });
        }

        let total_pulls: u64 = parse_line(&mut reader, path)?;
        let num_arms: usize = parse_line(&mut reader, path)?;
        if num_arms != NUM_ARMS {
            return Err(Error::PersistenceCorrupted {
                path: path.display().to_string(),
                reason: format!("expected {NUM_ARMS} arms, found {num_arms}"),
            });
        }

        let mut loaded_arms: Vec<(u64, u64, HashMap<String, TableStats>)> = Vec::with_capacity(NUM_ARMS);
        for _ in 0..NUM_ARMS {
            let header_line = read_line(&mut reader, path)?;
            let mut parts = header_line.split_whitespace();
            let pulls: u64 = parse_field(&mut parts, path)?;
            let reward: u64 = parse_field(&mut parts, path)?;

            let table_count: usize = parse_line(&mut reader, path)?;
            let mut table_stats = HashMap::with_capacity(table_count);
            for _ in 0..table_count {
                let line = read_line(&mut reader, path)?;
                let mut fields = line.split_whitespace();
                let table: String = fields
                    .next()
                    .ok_or_else(|| corrupt(path, "missing table name"))?
                    .to_string();
                let t_pulls: u64 = parse_field(&mut fields, path)?;
                let t_reward: f64 = parse_field(&mut fields, path)?;
                table_stats.insert(table, TableStats { pulls: t_pulls, total_reward: t_reward });
            }
            loaded_arms.push((pulls, reward, table_stats));
        }

        self.total_pulls.store(total_pulls, Ordering::Relaxed);
        for (arm, (pulls, reward, table_stats)) in self.arms.iter().zip(loaded_arms) {
            arm.pull_count.store(pulls, Ordering::Relaxed);
            arm.total_reward_fixed.store(reward, Ordering::Relaxed);
            *arm.table_stats.lock() = table_stats;
        }
        Ok(())
    }
}

fn corrupt(path: &Path, reason: &str) -> Error {
    Error::PersistenceCorrupted {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

fn read_line(reader: &mut impl BufRead, path: &Path) -> Result<String> {
    let mut line = String::new();
    let bytes = reader.read_line(&mut line)?;
    if bytes == 0 {
        return Err(corrupt(path, "unexpected end of file"));
    }
    Ok(line)
}

fn parse_line<T: std::str::FromStr>(reader: &mut impl BufRead, path: &Path) -> Result<T> {
    let line = read_line(reader, path)?;
    line.trim()
        .parse()
        .map_err(|_| corrupt(path, "malformed numeric field"))
}

fn parse_field<'a, T: std::str::FromStr>(
    fields: &mut impl Iterator<Item = &'a str>,
    path: &Path,
) -> Result<T> {
    fields
        .next()
        .ok_or_else(|| corrupt(path, "missing field"))?
        .parse()
        .map_err(|_| corrupt(path, "malformed numeric field"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learning::features::QueryFeatures;

    fn config() -> BanditConfig {
        BanditConfig {
            min_samples_before_learning: 20,
            min_arm_pulls: 5,
            min_table_pulls_for_context: 3,
            exploration_constant: std::f64::consts::SQRT_2,
            reward_scale_ms: 100.0,
            reward_fixed_point_scale: 10_000.0,
        }
    }

    fn features(index_available: f64, selectivity: f64) -> QueryFeatures {
        QueryFeatures {
            table_row_count_log: 10.0,
            where_clause_count: 1.0,
            has_equality_predicate: 1.0,
            has_index_available: index_available,
            selectivity_estimate: selectivity,
            column_count: 2.0,
            has_order_by: 0.0,
            has_limit: 0.0,
        }
    }

    #[test]
    fn no_index_always_returns_sequential_scan() {
        let bandit = Ucb1Bandit::new(config());
        let f = features(0.0, 0.5);
        assert_eq!(bandit.select_strategy(&f, "t"), ScanStrategy::SequentialScan);
    }

    #[test]
    fn exploration_phase_alternates_strategies() {
        let bandit = Ucb1Bandit::new(config());
        let f = features(1.0, 0.5);
        let first = bandit.select_strategy(&f, "t");
        assert_eq!(first, ScanStrategy::IndexScan);
        bandit.record_outcome(first, "t", 5.0);
        let second = bandit.select_strategy(&f, "t");
        assert_eq!(second, ScanStrategy::SequentialScan);
    }

    #[test]
    fn forces_exploration_of_under_sampled_arm() {
        let bandit = Ucb1Bandit::new(config());
        let f = features(1.0, 0.5);
        for _ in 0..20 {
            bandit.record_outcome(ScanStrategy::IndexScan, "t", 1.0);
        }
        // Total pulls >= MIN_SAMPLES_BEFORE_LEARNING, but sequential scan
        // has zero pulls so it must be force-explored.
        assert_eq!(bandit.select_strategy(&f, "t"), ScanStrategy::SequentialScan);
    }

    #[test]
    fn reward_is_higher_for_faster_execution() {
        let fast = Ucb1Bandit::compute_reward(1.0, 100.0);
        let slow = Ucb1Bandit::compute_reward(1_000.0, 100.0);
        assert!(fast > slow);
        assert!(fast <= 1.0 && slow > 0.0);
    }

    #[test]
    fn reset_clears_all_state() {
        let bandit = Ucb1Bandit::new(config());
        bandit.record_outcome(ScanStrategy::IndexScan, "t", 1.0);
        bandit.reset();
        assert!(!bandit.has_sufficient_data());
        assert_eq!(bandit.get_stats()[0].total_pulls, 0);
    }

    #[test]
    fn decay_with_zero_factor_is_equivalent_to_reset() {
        let bandit = Ucb1Bandit::new(config());
        bandit.record_outcome(ScanStrategy::IndexScan, "t", 1.0);
        bandit.decay(0.0);
        assert_eq!(bandit.get_stats()[1].total_pulls, 0);
    }

    #[test]
    fn save_and_load_round_trips_state() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bandit.state");

        let bandit = Ucb1Bandit::new(config());
        for _ in 0..7 {
            bandit.record_outcome(ScanStrategy::IndexScan, "orders", 12.0);
        }
        bandit.save_state(&path).expect("save");

        let loaded = Ucb1Bandit::new(config());
        loaded.load_state(&path).expect("load");
        assert_eq!(loaded.get_stats()[1].total_pulls, 7);
    }

    #[test]
    fn load_rejects_mismatched_header() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bad.state");
        std::fs::write(&path, "NOT_A_BANDIT_FILE\n").expect("write");

        let bandit = Ucb1Bandit::new(config());
        assert!(bandit.load_state(&path).is_err());
    }
}
