//! Synthetic DML workload generator.
//!
//! Drives the AI layer the way a real engine would: a mix of SELECTs (to
//! feed the Learning Engine's bandit and plan optimizer) and mutations (to
//! feed the Immune System's mutation monitor and user profiler), plus a
//! sprinkling of time-travel queries for the Temporal Index Manager. An
//! occasional burst on one table simulates the mutation spike the z-score
//! anomaly detector is meant to catch.

use std::sync::Arc;

use chronosdb_ai_core::learning::{ExecutionFeedback, PredicateOp, SelectQuery, WherePredicate};
use chronosdb_ai_core::{AiManager, DmlEvent, DmlOperation};
use rand::Rng;

/// Catalog the demo engine knows about; the workload picks among these.
pub const DEMO_TABLES: [&str; 5] = ["orders", "users", "events", "sessions", "inventory"];

/// Sizes of the synthetic workload's three phases.
pub struct WorkloadOptions {
    pub queries: u64,
    pub mutations: u64,
    pub time_travel: u64,
    /// Base timestamp (microseconds) the workload's events are offset from.
    pub now_us: u64,
}

fn random_select(rng: &mut impl Rng) -> SelectQuery {
    let predicate_count = rng.random_range(0..4);
    let where_clause = (0..predicate_count)
        .map(|i| WherePredicate {
            column: format!("col{i}"),
            op: [
                PredicateOp::Eq,
                PredicateOp::NotEq,
                PredicateOp::Lt,
                PredicateOp::Like,
                PredicateOp::In,
            ][rng.random_range(0..5)],
        })
        .collect();
    SelectQuery {
        where_clause,
        select_all: rng.random_bool(0.5),
        columns: vec!["id".to_string()],
        has_order_by: rng.random_bool(0.2),
        limit: if rng.random_bool(0.3) { Some(50) } else { None },
    }
}

/// Run `opts.queries` SELECTs, `opts.mutations` writes (with one deliberate
/// burst so the immune system has something to flag), and `opts.time_travel`
/// historical reads, against `manager`.
pub async fn run(manager: &Arc<AiManager>, opts: WorkloadOptions) {
    let mut rng = rand::rng();
    let registry = manager.observer_registry();
    let learning_engine = manager.learning_engine();

    for i in 0..opts.queries {
        let table = DEMO_TABLES[rng.random_range(0..DEMO_TABLES.len())];
        let stmt = random_select(&mut rng);
        let plan = learning_engine.optimize_query(&stmt, table);

        let mut event = DmlEvent::new(DmlOperation::Select, table, opts.now_us + i * 1_000);
        event.where_clause_count = stmt.where_clause.len();
        event.has_order_by = stmt.has_order_by;
        event.has_limit = stmt.limit.is_some();
        event.used_index_scan = rng.random_bool(0.6);
        event.duration_us = if event.used_index_scan {
            rng.random_range(200..2_000)
        } else {
            rng.random_range(2_000..20_000)
        };
        event.result_row_count = rng.random_range(0..500);

        if registry.notify_before(&event).await {
            let total_rows_scanned = rng.random_range(100..10_000);
            let rows_after_filter = (total_rows_scanned / (stmt.where_clause.len() as u64 + 1)).max(1);
            learning_engine.record_execution_feedback(&ExecutionFeedback {
                table_name: table.to_string(),
                duration_us: event.duration_us,
                where_clause_count: stmt.where_clause.len(),
                plan_used: plan,
                had_limit: event.has_limit,
                had_order_by: event.has_order_by,
                total_rows_scanned,
                rows_after_filter,
            });
            registry.notify_after(event);
        }
    }

    for i in 0..opts.mutations {
        let table = if i < opts.mutations / 4 {
            // Concentrate a burst of writes on one table late in the run.
            "orders"
        } else {
            DEMO_TABLES[rng.random_range(0..DEMO_TABLES.len())]
        };
        let op = [DmlOperation::Insert, DmlOperation::Update, DmlOperation::Delete][rng.random_range(0..3)];
        let mut event = DmlEvent::new(op, table, opts.now_us + opts.queries * 1_000 + i * 500);
        event.user = format!("user{}", rng.random_range(0..10));
        event.rows_affected = rng.random_range(1..20);
        event.duration_us = rng.random_range(500..5_000);

        if registry.notify_before(&event).await {
            registry.notify_after(event);
        }
    }

    for i in 0..opts.time_travel {
        let table = DEMO_TABLES[rng.random_range(0..DEMO_TABLES.len())];
        let target = opts.now_us.saturating_sub((i + 1) * 3_600_000_000);
        manager.temporal_index_manager().on_time_travel_query(table, target, "main");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chronosdb_ai_core::clock::SystemClock;
    use chronosdb_ai_core::AiConfig;

    use crate::demo_engine::DemoEngine;

    #[tokio::test]
    async fn workload_feeds_metrics_and_temporal_tracker() {
        let clock = Arc::new(SystemClock);
        let engine = Arc::new(DemoEngine::new(&DEMO_TABLES));
        let config = AiConfig::default();
        let manager = AiManager::new(clock, engine, &config);
        manager.initialize(config.immune_check_interval_ms, config.temporal_analysis_interval_ms);

        run(&manager, WorkloadOptions { queries: 30, mutations: 10, time_travel: 3, now_us: 1_000_000 }).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        let status = manager.get_status();
        assert!(status.metrics_recorded > 0);
        assert_eq!(
            manager.temporal_index_manager().summary().time_travel_queries_tracked,
            3
        );
        manager.shutdown();
    }
}
