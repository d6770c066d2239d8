use std::sync::Arc;

use chronosdb_ai_core::clock::SystemClock;
use chronosdb_ai_core::AiManager;

use crate::commands::run::print_status;
use crate::demo_engine::DemoEngine;
use crate::workload::DEMO_TABLES;
use crate::Cli;

/// Report the AI layer's baseline shape with no workload applied: useful to
/// confirm wiring and see the default thresholds/scheduled-task names
/// without generating synthetic traffic.
pub async fn handle_status_command(cli: &Cli) -> anyhow::Result<()> {
    let config = cli.load_config()?;
    let clock = Arc::new(SystemClock);
    let engine = Arc::new(DemoEngine::new(&DEMO_TABLES));

    let manager = AiManager::new(clock, engine, &config);
    manager.initialize(config.immune_check_interval_ms, config.temporal_analysis_interval_ms);
    let status = manager.get_status();
    manager.shutdown();

    print_status(cli.format, status)
}
