//! Query Plan Optimizer: independent per-dimension UCB1 bandits plus a
//! learned selectivity model.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::learning::features::{PredicateOp, SelectQuery};

const FILTER_ARMS: usize = 3;
const LIMIT_ARMS: usize = 2;
const OPTIMIZER_HEADER: &str = "CHRONOS_OPTIMIZER_V1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterStrategy {
    Original = 0,
    Selectivity = 1,
    Cost = 2,
}

impl FilterStrategy {
    fn from_index(i: usize) -> Self {
        match i {
            1 => FilterStrategy::Selectivity,
            2 => FilterStrategy::Cost,
            _ => FilterStrategy::Original,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitStrategy {
    FullScan = 0,
    EarlyTermination = 1,
}

impl LimitStrategy {
    fn from_index(i: usize) -> Self {
        if i == 1 {
            LimitStrategy::EarlyTermination
        } else {
            LimitStrategy::FullScan
        }
    }
}

/// Output of [`QueryPlanOptimizer::optimize`].
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub filter_strategy: FilterStrategy,
    pub limit_strategy: LimitStrategy,
    pub filter_order: Vec<usize>,
    pub ai_generated: bool,
}

/// Post-execution feedback used to update the optimizer's bandits and
/// selectivity model.
#[derive(Debug, Clone)]
pub struct ExecutionFeedback {
    pub table_name: String,
    pub duration_us: u64,
    pub where_clause_count: usize,
    pub plan_used: ExecutionPlan,
    pub had_limit: bool,
    pub had_order_by: bool,
    pub total_rows_scanned: u64,
    pub rows_after_filter: u64,
}

#[derive(Debug, Clone, Copy)]
struct PredicateSelectivity {
    observations: u64,
    cumulative_selectivity: f64,
}

impl PredicateSelectivity {
    fn average(self) -> f64 {
        if self.observations == 0 {
            0.5
        } else {
            self.cumulative_selectivity / self.observations as f64
        }
    }
}

struct BanditArm {
    pull_count: AtomicU64,
    total_reward_fixed: AtomicU64,
}

impl BanditArm {
    fn new() -> Self {
        Self {
            pull_count: AtomicU64::new(0),
            total_reward_fixed: AtomicU64::new(0),
        }
    }
}

/// Per-dimension arm pull counts for "SHOW EXECUTION STATS".
#[derive(Debug, Clone)]
pub struct DimensionStats {
    pub dimension_name: String,
    pub arm_pulls: Vec<(String, u64)>,
}

#[derive(Debug, Clone)]
pub struct OptimizerStats {
    pub total_optimizations: u64,
    pub filter_reorders: u64,
    pub early_terminations: u64,
    pub plans_generated: u64,
    pub dimensions: Vec<DimensionStats>,
}

#[derive(Debug, Clone, Copy)]
pub struct OptimizerConfig {
    pub min_samples_before_learning: u64,
    pub min_arm_pulls: u64,
    pub exploration_constant: f64,
    pub reward_scale_ms: f64,
    pub reward_fixed_point_scale: f64,
}

/// Composition of independent bandits, one per decision dimension, plus a
/// learned per-(table, column, operator) selectivity model.
pub struct QueryPlanOptimizer {
    config: OptimizerConfig,
    filter_arms: [BanditArm; FILTER_ARMS],
    filter_total_pulls: AtomicU64,
    limit_arms: [BanditArm; LIMIT_ARMS],
    limit_total_pulls: AtomicU64,
    selectivity_model: Mutex<HashMap<String, PredicateSelectivity>>,
    total_optimizations: AtomicU64,
    filter_reorders: AtomicU64,
    early_terminations: AtomicU64,
}

impl QueryPlanOptimizer {
    #[must_use]
    pub fn new(config: OptimizerConfig) -> Self {
        Self {
            config,
            filter_arms: [BanditArm::new(), BanditArm::new(), BanditArm::new()],
            filter_total_pulls: AtomicU64::new(0),
            limit_arms: [BanditArm::new(), BanditArm::new()],
            limit_total_pulls: AtomicU64::new(0),
            selectivity_model: Mutex::new(HashMap::new()),
            total_optimizations: AtomicU64::new(0),
            filter_reorders: AtomicU64::new(0),
            early_terminations: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn optimize(&self, stmt: &SelectQuery, table_name: &str) -> ExecutionPlan {
        let total = self.total_optimizations.load(Ordering::Relaxed);
        let identity_order: Vec<usize> = (0..stmt.where_clause.len()).collect();

        if total < self.config.min_samples_before_learning {
            return ExecutionPlan {
                filter_strategy: FilterStrategy::Original,
                limit_strategy: LimitStrategy::FullScan,
                filter_order: identity_order,
                ai_generated: false,
            };
        }

        let filter_strategy = if stmt.where_clause.len() > 1 {
            FilterStrategy::from_index(self.select_arm(&self.filter_arms, &self.filter_total_pulls))
        } else {
            FilterStrategy::Original
        };

        let mut filter_order = self.get_optimal_filter_order(stmt, table_name, filter_strategy);

        let limit_strategy = if stmt.limit.is_some() && !stmt.has_order_by {
            LimitStrategy::from_index(self.select_arm(&self.limit_arms, &self.limit_total_pulls))
        } else {
            // ORDER BY + LIMIT requires a full scan to sort correctly first.
            LimitStrategy::FullScan
        };

        if filter_order.len() != stmt.where_clause.len() {
            filter_order = identity_order;
        }

        ExecutionPlan {
            filter_strategy,
            limit_strategy,
            filter_order,
            ai_generated: true,
        }
    }

    fn select_arm(&self, arms: &[BanditArm], total_pulls: &AtomicU64) -> usize {
        let n = total_pulls.load(Ordering::Relaxed);
        for (i, arm) in arms.iter().enumerate() {
            if arm.pull_count.load(Ordering::Relaxed) < self.config.min_arm_pulls {
                return i;
            }
        }
        let mut best_score = f64::NEG_INFINITY;
        let mut best_arm = 0;
        for (i, arm) in arms.iter().enumerate() {
            let score = self.compute_ucb(arm, n);
            if score > best_score {
                best_score = score;
                best_arm = i;
            }
        }
        best_arm
    }

    fn compute_ucb(&self, arm: &BanditArm, total_pulls: u64) -> f64 {
        let n_a = arm.pull_count.load(Ordering::Relaxed);
        if n_a == 0 {
            return f64::INFINITY;
        }
        let reward_sum = arm.total_reward_fixed.load(Ordering::Relaxed) as f64
            / self.config.reward_fixed_point_scale;
        let q_a = reward_sum / n_a as f64;
        q_a + self.config.exploration_constant * ((total_pulls as f64).ln() / n_a as f64).sqrt()
    }

    /// Recommended filter evaluation order for the given strategy. Public,
    /// reusing the same sort logic `optimize` applies internally, so a
    /// caller can preview the plan's filter order independent of running a
    /// full `optimize` pass.
    #[must_use]
    pub fn get_optimal_filter_order(
        &self,
        stmt: &SelectQuery,
        table_name: &str,
        strategy: FilterStrategy,
    ) -> Vec<usize> {
        let mut order: Vec<usize> = (0..stmt.where_clause.len()).collect();
        if stmt.where_clause.len() <= 1 {
            return order;
        }

        match strategy {
            FilterStrategy::Original => {}
            FilterStrategy::Selectivity => {
                let model = self.selectivity_model.lock();
                order.sort_by(|&a, &b| {
                    let sel_a = Self::lookup_selectivity(&model, table_name, &stmt.where_clause[a]);
                    let sel_b = Self::lookup_selectivity(&model, table_name, &stmt.where_clause[b]);
                    sel_a.total_cmp(&sel_b)
                });
            }
            FilterStrategy::Cost => {
                order.sort_by(|&a, &b| {
                    Self::estimate_predicate_cost(stmt.where_clause[a].op)
                        .total_cmp(&Self::estimate_predicate_cost(stmt.where_clause[b].op))
                });
            }
        }
        order
    }

    fn lookup_selectivity(
        model: &HashMap<String, PredicateSelectivity>,
        table_name: &str,
        predicate: &crate::learning::features::WherePredicate,
    ) -> f64 {
        let key = Self::make_selectivity_key(table_name, &predicate.column, predicate.op);
        model.get(&key).map_or(0.5, |s| s.average())
    }

    pub fn record_feedback(&self, feedback: &ExecutionFeedback) {
        self.total_optimizations.fetch_add(1, Ordering::Relaxed);

        let reward = Self::compute_reward(feedback.duration_us as f64 / 1000.0, self.config.reward_scale_ms);
        let reward_fixed = (reward * self.config.reward_fixed_point_scale) as u64;

        if feedback.where_clause_count > 1 {
            let arm_idx = feedback.plan_used.filter_strategy as usize;
            if let Some(arm) = self.filter_arms.get(arm_idx) {
                arm.pull_count.fetch_add(1, Ordering::Relaxed);
                arm.total_reward_fixed.fetch_add(reward_fixed, Ordering::Relaxed);
                self.filter_total_pulls.fetch_add(1, Ordering::Relaxed);
                if feedback.plan_used.filter_strategy != FilterStrategy::Original {
                    self.filter_reorders.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        if feedback.had_limit && !feedback.had_order_by {
            let arm_idx = feedback.plan_used.limit_strategy as usize;
            if let Some(arm) = self.limit_arms.get(arm_idx) {
                arm.pull_count.fetch_add(1, Ordering::Relaxed);
                arm.total_reward_fixed.fetch_add(reward_fixed, Ordering::Relaxed);
                self.limit_total_pulls.fetch_add(1, Ordering::Relaxed);
                if feedback.plan_used.limit_strategy == LimitStrategy::EarlyTermination {
                    self.early_terminations.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        if feedback.total_rows_scanned > 0 && feedback.where_clause_count > 0 {
            let overall_selectivity =
                feedback.rows_after_filter as f64 / feedback.total_rows_scanned as f64;
            let key = format!(
                "{}::*::{}conds",
                feedback.table_name, feedback.where_clause_count
            );
            let mut model = self.selectivity_model.lock();
            let entry = model.entry(key).or_insert(PredicateSelectivity {
                observations: 0,
                cumulative_selectivity: 0.0,
            });
            entry.observations += 1;
            entry.cumulative_selectivity += overall_selectivity;
        }
    }

    #[must_use]
    pub fn has_sufficient_data(&self) -> bool {
        self.total_optimizations.load(Ordering::Relaxed) >= self.config.min_samples_before_learning
    }

    #[must_use]
    pub fn get_stats(&self) -> OptimizerStats {
        let total_optimizations = self.total_optimizations.load(Ordering::Relaxed);
        OptimizerStats {
            total_optimizations,
            filter_reorders: self.filter_reorders.load(Ordering::Relaxed),
            early_terminations: self.early_terminations.load(Ordering::Relaxed),
            plans_generated: total_optimizations,
            dimensions: vec![
                DimensionStats {
                    dimension_name: "Filter Strategy".to_string(),
                    arm_pulls: vec![
                        ("Original Order".to_string(), self.filter_arms[0].pull_count.load(Ordering::Relaxed)),
                        ("Selectivity Order".to_string(), self.filter_arms[1].pull_count.load(Ordering::Relaxed)),
                        ("Cost Order".to_string(), self.filter_arms[2].pull_count.load(Ordering::Relaxed)),
                    ],
                },
                DimensionStats {
                    dimension_name: "Limit Strategy".to_string(),
                    arm_pulls: vec![
                        ("Full Scan".to_string(), self.limit_arms[0].pull_count.load(Ordering::Relaxed)),
                        ("Early Termination".to_string(), self.limit_arms[1].pull_count.load(Ordering::Relaxed)),
                    ],
                },
            ],
        }
    }

    pub fn reset(&self) {
        for arm in &self.filter_arms {
            arm.pull_count.store(0, Ordering::Relaxed);
            arm.total_reward_fixed.store(0, Ordering::Relaxed);
        }
        self.filter_total_pulls.store(0, Ordering::Relaxed);
        for arm in &self.limit_arms {
            arm.pull_count.store(0, Ordering::Relaxed);
            arm.total_reward_fixed.store(0, Ordering::Relaxed);
        }
        self.limit_total_pulls.store(0, Ordering::Relaxed);
        self.selectivity_model.lock().clear();
        self.total_optimizations.store(0, Ordering::Relaxed);
        self.filter_reorders.store(0, Ordering::Relaxed);
        self.early_terminations.store(0, Ordering::Relaxed);
    }

    pub fn decay(&self, decay_factor: f64) {
        if decay_factor <= 0.0 {
            self.reset();
            return;
        }
        if decay_factor >= 1.0 {
            return;
        }
        for (arms, total_pulls) in [
            (&self.filter_arms[..], &self.filter_total_pulls),
            (&self.limit_arms[..], &self.limit_total_pulls),
        ] {
            let mut new_total = 0u64;
            for arm in arms {
                let new_pulls = (arm.pull_count.load(Ordering::Relaxed) as f64 * decay_factor) as u64;
                arm.pull_count.store(new_pulls, Ordering::Relaxed);
                new_total += new_pulls;
                let new_reward =
                    (arm.total_reward_fixed.load(Ordering::Relaxed) as f64 * decay_factor) as u64;
                arm.total_reward_fixed.store(new_reward, Ordering::Relaxed);
            }
            total_pulls.store(new_total, Ordering::Relaxed);
        }
    }

    fn make_selectivity_key(table: &str, column: &str, op: PredicateOp) -> String {
        format!("{table}::{column}::{}", Self::op_key(op))
    }

    fn op_key(op: PredicateOp) -> &'static str {
        match op {
            PredicateOp::Eq => "=",
            PredicateOp::NotEq => "!=",
            PredicateOp::Lt => "<",
            PredicateOp::Le => "<=",
            PredicateOp::Gt => ">",
            PredicateOp::Ge => ">=",
            PredicateOp::Like => "LIKE",
            PredicateOp::In => "IN",
        }
    }

    fn compute_reward(execution_time_ms: f64, reward_scale_ms: f64) -> f64 {
        1.0 / (1.0 + execution_time_ms / reward_scale_ms)
    }

    fn estimate_predicate_cost(op: PredicateOp) -> f64 {
        match op {
            PredicateOp::Eq | PredicateOp::NotEq => 1.0,
            PredicateOp::Lt | PredicateOp::Gt | PredicateOp::Le | PredicateOp::Ge => 1.5,
            PredicateOp::In => 3.0,
            PredicateOp::Like => 5.0,
        }
    }

    pub fn save_state(&self, path: &Path) -> Result<()> {
        let mut file = std::fs::File::create(path)?;
        writeln!(file, "{OPTIMIZER_HEADER}")?;
        writeln!(file, "{}", self.total_optimizations.load(Ordering::Relaxed))?;
        writeln!(file, "{}", self.filter_reorders.load(Ordering::Relaxed))?;
        writeln!(file, "{}", self.early_terminations.load(Ordering::Relaxed))?;

        writeln!(file, "{}", self.filter_total_pulls.load(Ordering::Relaxed))?;
        for arm in &self.filter_arms {
            writeln!(
                file,
                "{} {}",
                arm.pull_count.load(Ordering::Relaxed),
                arm.total_reward_fixed.load(Ordering::Relaxed)
            )?;
        }

        writeln!(file, "{}", self.limit_total_pulls.load(Ordering::Relaxed))?;
        for arm in &self.limit_arms {
            writeln!(
                file,
                "{} {}",
                arm.pull_count.load(Ordering::Relaxed),
                arm.total_reward_fixed.load(Ordering::Relaxed)
            )?;
        }

        let model = self.selectivity_model.lock();
        writeln!(file, "{}", model.len())?;
        for (key, sel) in model.iter() {
            writeln!(file, "{key} {} {}", sel.observations, sel.cumulative_selectivity)?;
        }
        Ok(())
    }

    pub fn load_state(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::open(path)?;
        let mut reader = BufReader::new(file);

        let header = read_line(&mut reader, path)?;
        if header.trim() != OPTIMIZER_HEADER {
            return Err(corrupt(path, "unrecognized header"));
        }

        let total_opts: u64 = parse_line(&mut reader, path)?;
        let f_reorders: u64 = parse_line(&mut reader, path)?;
        let e_terms: u64 = parse_line(&mut reader, path)?;

        let f_total: u64 = parse_line(&mut reader, path)?;
        let mut filter_state = Vec::with_capacity(FILTER_ARMS);
        for _ in 0..FILTER_ARMS {
            let line = read_line(&mut reader, path)?;
            let mut parts = line.split_whitespace();
            let pulls: u64 = parse_field(&mut parts, path)?;
            let reward: u64 = parse_field(&mut parts, path)?;
            filter_state.push((pulls, reward));
        }

        let l_total: u64 = parse_line(&mut reader, path)?;
        let mut limit_state = Vec::with_capacity(LIMIT_ARMS);
        for _ in 0..LIMIT_ARMS {
            let line = read_line(&mut reader, path)?;
            let mut parts = line.split_whitespace();
            let pulls: u64 = parse_field(&mut parts, path)?;
            let reward: u64 = parse_field(&mut parts, path)?;
            limit_state.push((pulls, reward));
        }

        let sel_count: usize = parse_line(&mut reader, path)?;
        let mut model = HashMap::with_capacity(sel_count);
        for _ in 0..sel_count {
            let line = read_line(&mut reader, path)?;
            let mut fields = line.split_whitespace();
            let key: String = fields.next().ok_or_else(|| corrupt(path, "missing key"))?.to_string();
            let observations: u64 = parse_field(&mut fields, path)?;
            let cumulative_selectivity: f64 = parse_field(&mut fields, path)?;
            model.insert(key, PredicateSelectivity { observations, cumulative_selectivity });
        }

        self.total_optimizations.store(total_opts, Ordering::Relaxed);
        self.filter_reorders.store(f_reorders, Ordering::Relaxed);
        self.early_terminations.store(e_terms, Ordering::Relaxed);
        self.filter_total_pulls.store(f_total, Ordering::Relaxed);
        for (arm, (pulls, reward)) in self.filter_arms.iter().zip(filter_state) {
            arm.pull_count.store(pulls, Ordering::Relaxed);
            arm.total_reward_fixed.store(reward, Ordering::Relaxed);
        }
        self.limit_total_pulls.store(l_total, Ordering::Relaxed);
        for (arm, (pulls, reward)) in self.limit_arms.iter().zip(limit_state) {
            arm.pull_count.store(pulls, Ordering::Relaxed);
            arm.total_reward_fixed.store(reward, Ordering::Relaxed);
        }
        *self.selectivity_model.lock() = model;
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
    line.trim().parse().map_err(|_| corrupt(path, "malformed numeric field"))
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
    use crate::learning::features::WherePredicate;

    fn config() -> OptimizerConfig {
        OptimizerConfig {
            min_samples_before_learning: 20,
            min_arm_pulls: 5,
            exploration_constant: std::f64::consts::SQRT_2,
            reward_scale_ms: 100.0,
            reward_fixed_point_scale: 10_000.0,
        }
    }

    fn stmt(n_predicates: usize, has_limit: bool, has_order_by: bool) -> SelectQuery {
        SelectQuery {
            where_clause: (0..n_predicates)
                .map(|i| WherePredicate { column: format!("c{i}"), op: PredicateOp::Eq })
                .collect(),
            select_all: false,
            columns: vec!["a".to_string()],
            has_order_by,
            limit: has_limit.then_some(10),
        }
    }

    #[test]
    fn below_threshold_returns_non_ai_identity_plan() {
        let opt = QueryPlanOptimizer::new(config());
        let plan = opt.optimize(&stmt(3, false, false), "t");
        assert!(!plan.ai_generated);
        assert_eq!(plan.filter_order, vec![0, 1, 2]);
    }

    #[test]
    fn order_by_with_limit_forces_full_scan() {
        let opt = QueryPlanOptimizer::new(config());
        for _ in 0..25 {
            opt.record_feedback(&ExecutionFeedback {
                table_name: "t".to_string(),
                duration_us: 500,
                where_clause_count: 2,
                plan_used: ExecutionPlan {
                    filter_strategy: FilterStrategy::Original,
                    limit_strategy: LimitStrategy::FullScan,
                    filter_order: vec![0, 1],
                    ai_generated: true,
                },
                had_limit: true,
                had_order_by: true,
                total_rows_scanned: 100,
                rows_after_filter: 10,
            });
        }
        let plan = opt.optimize(&stmt(2, true, true), "t");
        assert_eq!(plan.limit_strategy, LimitStrategy::FullScan);
    }

    #[test]
    fn selectivity_order_sorts_by_learned_average() {
        let opt = QueryPlanOptimizer::new(config());
        let key_low = "t::c0::=".to_string();
        let key_high = "t::c1::=".to_string();
        opt.selectivity_model.lock().insert(
            key_low,
            PredicateSelectivity { observations: 5, cumulative_selectivity: 0.05 },
        );
        opt.selectivity_model.lock().insert(
            key_high,
            PredicateSelectivity { observations: 5, cumulative_selectivity: 4.5 },
        );
        let order = opt.get_optimal_filter_order(&stmt(2, false, false), "t", FilterStrategy::Selectivity);
        assert_eq!(order, vec![0, 1]);
    }

    #[test]
    fn feedback_updates_selectivity_model() {
        let opt = QueryPlanOptimizer::new(config());
        opt.record_feedback(&ExecutionFeedback {
            table_name: "orders".to_string(),
            duration_us: 1_000,
            where_clause_count: 1,
            plan_used: ExecutionPlan {
                filter_strategy: FilterStrategy::Original,
                limit_strategy: LimitStrategy::FullScan,
                filter_order: vec![0],
                ai_generated: false,
            },
            had_limit: false,
            had_order_by: false,
            total_rows_scanned: 1_000,
            rows_after_filter: 100,
        });
        let model = opt.selectivity_model.lock();
        let entry = model.get("orders::*::1conds").expect("entry recorded");
        assert_eq!(entry.observations, 1);
        assert!((entry.cumulative_selectivity - 0.1).abs() < 1e-12);
    }

    #[test]
    fn save_and_load_round_trips_state() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("optimizer.state");

        let opt = QueryPlanOptimizer::new(config());
        opt.record_feedback(&ExecutionFeedback {
            table_name: "orders".to_string(),
            duration_us: 1_000,
            where_clause_count: 2,
            plan_used: ExecutionPlan {
                filter_strategy: FilterStrategy::Selectivity,
                limit_strategy: LimitStrategy::FullScan,
                filter_order: vec![0, 1],
                ai_generated: true,
            },
            had_limit: false,
            had_order_by: false,
            total_rows_scanned: 100,
            rows_after_filter: 10,
        });
        opt.save_state(&path).expect("save");

        let loaded = QueryPlanOptimizer::new(config());
        loaded.load_state(&path).expect("load");
        assert_eq!(loaded.get_stats().total_optimizations, 1);
        assert_eq!(loaded.get_stats().filter_reorders, 1);
    }
}
