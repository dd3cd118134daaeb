//! `syl runs` commands: inspect the run registry and checkpoint log.

use anyhow::bail;
use clap::Subcommand;
use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{Cell, Color, Table};
use console::style;
use uuid::Uuid;

use syllog_core::checkpoint::CheckpointManager;
use syllog_infra::sqlite::SqliteCheckpointRepository;
use syllog_types::run::{RunRecord, RunStatus};

use crate::state::AppState;

#[derive(Subcommand)]
pub enum RunsCommand {
    /// List recorded runs, newest first.
    List {
        /// Maximum number of runs to show.
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },

    /// Show one run's record.
    Status {
        /// The run to inspect.
        run_id: Uuid,
    },

    /// Show a run's checkpoint log.
    Checkpoints {
        /// The run whose checkpoints to list.
        run_id: Uuid,
    },
}

pub async fn handle(
    command: RunsCommand,
    state: &AppState,
    json: bool,
    quiet: bool,
) -> anyhow::Result<()> {
    let manager = CheckpointManager::new(SqliteCheckpointRepository::new(state.db_pool.clone()));

    match command {
        RunsCommand::List { limit } => {
            let runs = manager.list_runs(limit).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&runs)?);
            } else if !quiet {
                print_run_table(&runs);
            }
        }
        RunsCommand::Status { run_id } => {
            let Some(record) = manager.get_run(run_id).await? else {
                bail!("run not found: {run_id}");
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&record)?);
            } else if !quiet {
                print_run_record(&record);
            }
        }
        RunsCommand::Checkpoints { run_id } => {
            if manager.get_run(run_id).await?.is_none() {
                bail!("run not found: {run_id}");
            }
            let snapshots = manager.list_checkpoints(run_id).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&snapshots)?);
            } else if !quiet {
                print_checkpoint_table(run_id, &snapshots);
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn status_label(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Running => "running",
        RunStatus::Drained => "drained",
        RunStatus::Aborted => "aborted",
        RunStatus::Cancelled => "cancelled",
    }
}

fn status_cell(status: RunStatus) -> Cell {
    let color = match status {
        RunStatus::Running => Color::Cyan,
        RunStatus::Drained => Color::Green,
        RunStatus::Aborted => Color::Red,
        RunStatus::Cancelled => Color::Yellow,
    };
    Cell::new(status_label(status)).fg(color)
}

fn print_run_table(runs: &[RunRecord]) {
    if runs.is_empty() {
        println!("{}", style("No runs recorded.").dim());
        return;
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(vec![
        Cell::new("Run").fg(Color::Cyan),
        Cell::new("Status").fg(Color::Cyan),
        Cell::new("Updated").fg(Color::Cyan),
        Cell::new("Error").fg(Color::Cyan),
    ]);
    for run in runs {
        table.add_row(vec![
            Cell::new(run.run_id),
            status_cell(run.status),
            Cell::new(run.updated_at.to_rfc3339()),
            Cell::new(run.error.as_deref().unwrap_or("-")),
        ]);
    }
    println!("{table}");
}

fn print_run_record(record: &RunRecord) {
    println!("{} {}", style("Run:").bold(), style(record.run_id).cyan());
    println!("{} {}", style("Status:").bold(), status_label(record.status));
    println!("{} {}", style("Created:").bold(), record.created_at.to_rfc3339());
    println!("{} {}", style("Updated:").bold(), record.updated_at.to_rfc3339());
    if let Some(error) = &record.error {
        println!("{} {}", style("Error:").bold(), style(error).red());
    }
}

fn print_checkpoint_table(run_id: Uuid, snapshots: &[syllog_types::run::CheckpointSnapshot]) {
    if snapshots.is_empty() {
        println!("{}", style(format!("No checkpoints for run {run_id}.")).dim());
        return;
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(vec![
        Cell::new("Seq").fg(Color::Cyan),
        Cell::new("Pending").fg(Color::Cyan),
        Cell::new("Concepts").fg(Color::Cyan),
        Cell::new("Last event").fg(Color::Cyan),
        Cell::new("At").fg(Color::Cyan),
    ]);
    for snapshot in snapshots {
        let last_event = snapshot
            .history
            .last()
            .map(|event| format!("#{} -> {}", event.flow_index, event.produces))
            .unwrap_or_else(|| "-".to_string());
        table.add_row(vec![
            Cell::new(snapshot.sequence),
            Cell::new(snapshot.waitlist.len()),
            Cell::new(snapshot.concepts.len()),
            Cell::new(last_event),
            Cell::new(snapshot.created_at.to_rfc3339()),
        ]);
    }
    println!("{table}");
}
