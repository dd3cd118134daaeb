//! `syl run` commands: start, resume, and fork executions.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Subcommand;
use console::style;
use uuid::Uuid;

use syllog_core::checkpoint::CheckpointManager;
use syllog_core::orchestrator::{Orchestrator, OrchestratorConfig, RunOutcome};
use syllog_core::paradigm::ParadigmEngine;
use syllog_core::repo::RepositorySet;
use syllog_core::resolver::{ResolverContext, WrapperResolver};
use syllog_infra::capability::standard_body;
use syllog_infra::config::paradigm_dir;
use syllog_infra::filesystem::FileParadigmStore;
use syllog_infra::sqlite::SqliteCheckpointRepository;
use syllog_core::body::BodyContext;
use syllog_types::run::RunStatus;

use crate::state::AppState;

#[derive(Subcommand)]
pub enum RunCommand {
    /// Start a fresh run over a repository pair.
    Start {
        /// Path to the concept repository JSON file.
        concepts: PathBuf,

        /// Path to the inference repository JSON file.
        inferences: PathBuf,

        /// Workspace directory for file and script references
        /// (defaults to the current directory).
        #[arg(long)]
        workspace: Option<PathBuf>,
    },

    /// Resume an interrupted or aborted run from its latest checkpoint,
    /// patched against the current repositories.
    Resume {
        /// The run to resume.
        run_id: Uuid,

        /// Path to the concept repository JSON file.
        concepts: PathBuf,

        /// Path to the inference repository JSON file.
        inferences: PathBuf,

        #[arg(long)]
        workspace: Option<PathBuf>,
    },

    /// Fork a run's latest checkpoint into a new run, trusting the
    /// snapshot wholesale.
    Fork {
        /// The run whose checkpoint to fork from.
        from: Uuid,

        /// Path to the concept repository JSON file.
        concepts: PathBuf,

        /// Path to the inference repository JSON file.
        inferences: PathBuf,

        #[arg(long)]
        workspace: Option<PathBuf>,
    },
}

pub async fn handle(
    command: RunCommand,
    state: &AppState,
    json: bool,
    quiet: bool,
) -> anyhow::Result<()> {
    match command {
        RunCommand::Start {
            concepts,
            inferences,
            workspace,
        } => {
            let repos = load_repos(&concepts, &inferences)?;
            let orchestrator = build_orchestrator(state, workspace)?;
            let run_id = Uuid::now_v7();
            if !quiet && !json {
                println!("{} {run_id}", style("Starting run").green().bold());
            }
            let outcome = orchestrator.start(run_id, &repos).await?;
            report(&outcome, &repos, json, quiet)
        }
        RunCommand::Resume {
            run_id,
            concepts,
            inferences,
            workspace,
        } => {
            let repos = load_repos(&concepts, &inferences)?;
            let orchestrator = build_orchestrator(state, workspace)?;
            if !quiet && !json {
                println!("{} {run_id}", style("Resuming run").green().bold());
            }
            let outcome = orchestrator.resume(run_id, &repos).await?;
            report(&outcome, &repos, json, quiet)
        }
        RunCommand::Fork {
            from,
            concepts,
            inferences,
            workspace,
        } => {
            let repos = load_repos(&concepts, &inferences)?;
            let orchestrator = build_orchestrator(state, workspace)?;
            let new_run_id = Uuid::now_v7();
            if !quiet && !json {
                println!(
                    "{} {from} {} {new_run_id}",
                    style("Forking run").green().bold(),
                    style("->").dim()
                );
            }
            let outcome = orchestrator.fork(from, new_run_id, &repos).await?;
            report(&outcome, &repos, json, quiet)
        }
    }
}

/// Validate a repository pair without executing anything.
pub fn handle_validate(
    concepts: &Path,
    inferences: &Path,
    json: bool,
    quiet: bool,
) -> anyhow::Result<()> {
    let repos = load_repos(concepts, inferences)?;
    if json {
        println!(
            "{}",
            serde_json::json!({
                "valid": true,
                "concepts": repos.concepts.len(),
                "inferences": repos.inferences.len(),
            })
        );
    } else if !quiet {
        println!(
            "{} {} concepts, {} inferences",
            style("Valid:").green().bold(),
            repos.concepts.len(),
            repos.inferences.len()
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

fn load_repos(concepts: &Path, inferences: &Path) -> anyhow::Result<RepositorySet> {
    RepositorySet::load(concepts, inferences).context("repository validation failed")
}

fn build_orchestrator(
    state: &AppState,
    workspace: Option<PathBuf>,
) -> anyhow::Result<Orchestrator<SqliteCheckpointRepository>> {
    let workspace = match workspace {
        Some(dir) => dir,
        None => std::env::current_dir().context("cannot determine current directory")?,
    };

    let mut body_ctx = BodyContext::new(&workspace);
    if let Some(model) = &state.config.model {
        body_ctx = body_ctx.with_model(model.clone());
    }
    let body = Arc::new(standard_body(body_ctx));

    let resolver_ctx = ResolverContext::new(&workspace);
    let store = Arc::new(FileParadigmStore::new(paradigm_dir(&state.data_dir)));
    let engine = ParadigmEngine::new(
        store,
        body,
        WrapperResolver::new(resolver_ctx.clone()),
    );

    let checkpoint = Arc::new(CheckpointManager::new(SqliteCheckpointRepository::new(
        state.db_pool.clone(),
    )));

    Ok(Orchestrator::new(
        checkpoint,
        engine,
        WrapperResolver::new(resolver_ctx),
        OrchestratorConfig {
            cycle_budget: state.config.cycle_budget,
        },
    ))
}

// ---------------------------------------------------------------------------
// Reporting
// ---------------------------------------------------------------------------

fn report(
    outcome: &RunOutcome,
    repos: &RepositorySet,
    json: bool,
    quiet: bool,
) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&outcome_json(outcome, repos))?);
    } else if !quiet {
        print_outcome(outcome, repos);
    }

    // Aborted runs exit non-zero so scripts can react.
    if outcome.status == RunStatus::Aborted {
        let reason = outcome
            .abort
            .as_ref()
            .map(|a| a.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        bail!("run {} aborted: {reason}", outcome.run_id);
    }
    Ok(())
}

fn outcome_json(outcome: &RunOutcome, repos: &RepositorySet) -> serde_json::Value {
    let finals: serde_json::Map<String, serde_json::Value> = final_concepts(outcome, repos)
        .into_iter()
        .map(|(name, payloads)| {
            (
                name.to_string(),
                serde_json::Value::Array(payloads.into_iter().cloned().collect()),
            )
        })
        .collect();

    serde_json::json!({
        "run_id": outcome.run_id,
        "status": outcome.status,
        "abort": outcome.abort.as_ref().map(|a| a.to_string()),
        "cycles": outcome.cycles,
        "finals": finals,
        "history": outcome.history,
    })
}

fn print_outcome(outcome: &RunOutcome, repos: &RepositorySet) {
    let status = match outcome.status {
        RunStatus::Drained => style("drained").green().bold(),
        RunStatus::Aborted => style("aborted").red().bold(),
        RunStatus::Cancelled => style("cancelled").yellow().bold(),
        RunStatus::Running => style("running").cyan().bold(),
    };
    println!(
        "Run {} {status} after {} cycle(s)",
        style(outcome.run_id).cyan(),
        outcome.cycles
    );

    let finals = final_concepts(outcome, repos);
    if finals.is_empty() {
        println!("{}", style("(no final concepts)").dim());
        return;
    }
    for (name, payloads) in finals {
        println!("{}", style(name).cyan().bold());
        if payloads.is_empty() {
            println!("  {}", style("(no values)").dim());
        }
        for payload in payloads {
            println!("  {payload}");
        }
    }
}

/// Final concepts and their produced payloads, in definition order.
fn final_concepts<'a>(
    outcome: &'a RunOutcome,
    repos: &'a RepositorySet,
) -> Vec<(&'a str, Vec<&'a serde_json::Value>)> {
    repos
        .concepts
        .iter()
        .filter(|def| def.is_final)
        .map(|def| {
            let payloads = outcome
                .concept(&def.name)
                .map(|state| state.produced_payloads())
                .unwrap_or_default();
            (def.name.as_str(), payloads)
        })
        .collect()
}
