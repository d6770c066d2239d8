//! Thin demo binary: wires an in-memory [`chronosdb_ai_core::AiManager`] to
//! a synthetic DML workload and prints a `SHOW AI STATUS`-style report.
//! Not part of the specified system — it exists to exercise the library
//! the way an embedding engine would, without requiring a real parser,
//! executor, or storage engine.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use chronosdb_ai_core::AiConfig;

mod commands;
mod demo_engine;
mod output;
mod workload;

use commands::{handle_run_command, handle_status_command};
use output::OutputFormat;

#[derive(Parser)]
#[command(name = "chronosdb-ai-cli")]
#[command(about = "Demo driver for the ChronosDB AI layer")]
#[command(version, long_about = None)]
pub struct Cli {
    /// AI config file path (JSON), overriding spec defaults.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Human)]
    format: OutputFormat,

    /// Enable verbose (DEBUG-level) logging.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn load_config(&self) -> anyhow::Result<AiConfig> {
        match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)?;
                Ok(serde_json::from_str(&text)?)
            }
            None => Ok(AiConfig::default()),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run a synthetic workload against an in-memory AI manager, then
    /// report status.
    Run {
        /// Number of synthetic SELECT queries to run.
        #[arg(long, default_value_t = 500)]
        queries: u64,
        /// Number of synthetic INSERT/UPDATE/DELETE operations to run.
        #[arg(long, default_value_t = 50)]
        mutations: u64,
        /// Number of synthetic time-travel queries to run.
        #[arg(long, default_value_t = 5)]
        time_travel: u64,
        /// Milliseconds to wait after the workload for the worker pool's
        /// after-DML fan-out to drain before reading status.
        #[arg(long, default_value_t = 200)]
        warmup_ms: u64,
    },
    /// Print the AI layer's baseline status with no workload applied.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).init();

    match &cli.command {
        Commands::Run { queries, mutations, time_travel, warmup_ms } => {
            handle_run_command(&cli, *queries, *mutations, *time_travel, *warmup_ms).await
        }
        Commands::Status => handle_status_command(&cli).await,
    }
}
