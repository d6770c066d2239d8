//! Output formatting: human-readable summary or pretty JSON.
//!
//! Deliberately narrow since this binary exists only to demonstrate the AI
//! layer, not to serve as an operational tool.

use clap::ValueEnum;
use serde::Serialize;
use std::io::{self, Write};

use chronosdb_ai_core::AiStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable report.
    Human,
    /// Pretty-printed JSON, for scripting.
    Json,
}

pub trait Output {
    fn write_human<W: Write>(&self, writer: W) -> anyhow::Result<()>;

    fn write_json<W: Write>(&self, mut writer: W) -> anyhow::Result<()>
    where
        Self: Serialize,
    {
        serde_json::to_writer_pretty(&mut writer, self)?;
        writeln!(writer)?;
        Ok(())
    }
}

impl OutputFormat {
    pub fn print<T: Output + Serialize>(self, data: &T) -> anyhow::Result<()> {
        match self {
            OutputFormat::Human => data.write_human(io::stdout()),
            OutputFormat::Json => data.write_json(io::stdout()),
        }
    }
}

/// Thin wrapper so `AiStatus` (defined in `chronosdb-ai-core`, which has no
/// reason to know about CLI presentation) gets a human rendering here.
#[derive(Serialize)]
pub struct StatusReport(pub AiStatus);

impl Output for StatusReport {
    fn write_human<W: Write>(&self, mut writer: W) -> anyhow::Result<()> {
        let status = &self.0;
        writeln!(writer, "ChronosDB AI Layer Status")?;
        writeln!(writer, "{}", "-".repeat(40))?;
        writeln!(writer, "Metrics recorded:    {}", status.metrics_recorded)?;
        writeln!(writer, "Scheduled tasks:     {}", status.scheduled_tasks)?;
        writeln!(writer)?;

        writeln!(
            writer,
            "Learning Engine      [{}]",
            if status.learning_engine_active { "active" } else { "stopped" }
        )?;
        writeln!(writer, "  {}", status.learning_summary)?;
        writeln!(writer)?;

        writeln!(
            writer,
            "Immune System        [{}]",
            if status.immune_system_active { "active" } else { "stopped" }
        )?;
        writeln!(writer, "  {}", status.immune_summary)?;
        writeln!(writer)?;

        writeln!(
            writer,
            "Temporal Index       [{}]",
            if status.temporal_index_active { "active" } else { "stopped" }
        )?;
        writeln!(writer, "  {}", status.temporal_summary)?;

        Ok(())
    }
}
