use std::sync::Arc;
use std::time::Duration;

use chronosdb_ai_core::clock::{Clock, SystemClock};
use chronosdb_ai_core::AiManager;

use crate::demo_engine::DemoEngine;
use crate::output::{OutputFormat, StatusReport};
use crate::workload::{self, WorkloadOptions, DEMO_TABLES};
use crate::Cli;

#[allow(clippy::too_many_arguments)]
pub async fn handle_run_command(
    cli: &Cli,
    queries: u64,
    mutations: u64,
    time_travel: u64,
    warmup_ms: u64,
) -> anyhow::Result<()> {
    let config = cli.load_config()?;
    let clock = Arc::new(SystemClock);
    let now_us = clock.now_us();
    let engine = Arc::new(DemoEngine::new(&DEMO_TABLES));

    let manager = AiManager::new(clock, engine, &config);
    manager.initialize(config.immune_check_interval_ms, config.temporal_analysis_interval_ms);

    tracing::info!(queries, mutations, time_travel, "running synthetic workload");
    workload::run(&manager, WorkloadOptions { queries, mutations, time_travel, now_us }).await;

    // Let the worker pool drain on_after_dml fan-out before we read status.
    tokio::time::sleep(Duration::from_millis(warmup_ms)).await;

    let status = manager.get_status();
    manager.shutdown();

    print_status(cli.format, status)
}

pub(crate) fn print_status(format: OutputFormat, status: chronosdb_ai_core::AiStatus) -> anyhow::Result<()> {
    format.print(&StatusReport(status))
}
