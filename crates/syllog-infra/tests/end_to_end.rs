//! End-to-end runs over the real infrastructure: SQLite checkpoint store,
//! filesystem paradigm store, and the standard capability registry.

use std::path::Path;
use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;
use uuid::Uuid;

use syllog_core::body::BodyContext;
use syllog_core::checkpoint::CheckpointManager;
use syllog_core::orchestrator::{Orchestrator, OrchestratorConfig};
use syllog_core::paradigm::ParadigmEngine;
use syllog_core::repo::RepositorySet;
use syllog_core::resolver::{ResolverContext, WrapperResolver};
use syllog_infra::capability::standard_body;
use syllog_infra::filesystem::FileParadigmStore;
use syllog_infra::sqlite::{DatabasePool, SqliteCheckpointRepository};
use syllog_types::run::{AbortReason, RunStatus};

const ADD_TWO: &str = r#"{
    "name": "add_two",
    "capability_requirements": [{"tool": "text", "affordance": "add"}],
    "plan": [
        {
            "output_key": "total",
            "capability": {"tool": "text", "affordance": "add"},
            "params": {
                "lhs": {"from": "input", "position": 0},
                "rhs": {"from": "input", "position": 1}
            }
        }
    ],
    "return_key": "total"
}"#;

const SHOUT: &str = r#"{
    "name": "shout",
    "capability_requirements": [{"tool": "text", "affordance": "upper"}],
    "plan": [
        {
            "output_key": "loud",
            "capability": {"tool": "text", "affordance": "upper"},
            "params": {"value": {"from": "input", "position": 0}}
        }
    ],
    "return_key": "loud"
}"#;

struct Harness {
    orchestrator: Orchestrator<SqliteCheckpointRepository>,
    _dir: TempDir,
}

async fn harness_with(cycle_budget: u64) -> Harness {
    let dir = TempDir::new().unwrap();
    let orchestrator = harness_in(dir.path(), cycle_budget).await;
    Harness {
        orchestrator,
        _dir: dir,
    }
}

/// Build an orchestrator rooted at `dir`, so tests can build a second one
/// over the same database.
async fn harness_in(dir: &Path, cycle_budget: u64) -> Orchestrator<SqliteCheckpointRepository> {
    let paradigm_dir = dir.join("paradigms");
    std::fs::create_dir_all(&paradigm_dir).unwrap();
    std::fs::write(paradigm_dir.join("add_two.json"), ADD_TWO).unwrap();
    std::fs::write(paradigm_dir.join("shout.json"), SHOUT).unwrap();

    let url = format!("sqlite://{}/syllog.db?mode=rwc", dir.display());
    let pool = DatabasePool::new(&url).await.unwrap();

    let ctx = ResolverContext::new(dir);
    let body = Arc::new(standard_body(BodyContext::new(dir)));
    let engine = ParadigmEngine::new(
        Arc::new(FileParadigmStore::new(paradigm_dir)),
        body,
        WrapperResolver::new(ctx.clone()),
    );
    let checkpoint = Arc::new(CheckpointManager::new(SqliteCheckpointRepository::new(pool)));

    Orchestrator::new(
        checkpoint,
        engine,
        WrapperResolver::new(ctx),
        OrchestratorConfig { cycle_budget },
    )
}

fn write_repos(dir: &Path, concepts: serde_json::Value, inferences: serde_json::Value) -> RepositorySet {
    let concept_path = dir.join("concepts.json");
    let inference_path = dir.join("inferences.json");
    std::fs::write(&concept_path, serde_json::to_string_pretty(&concepts).unwrap()).unwrap();
    std::fs::write(&inference_path, serde_json::to_string_pretty(&inferences).unwrap()).unwrap();
    RepositorySet::load(&concept_path, &inference_path).unwrap()
}

fn add_concepts() -> serde_json::Value {
    json!([
        {"name": "behavior", "kind": "scalar", "is_ground": true, "values": ["add_two"]},
        {"name": "a", "kind": "scalar", "is_ground": true, "values": ["5"]},
        {"name": "b", "kind": "scalar", "is_ground": true, "values": ["7"]},
        {"name": "sum", "kind": "scalar", "is_final": true}
    ])
}

fn add_inferences() -> serde_json::Value {
    json!([
        {
            "flow_index": 1,
            "sequence_kind": "paradigm",
            "produces": "sum",
            "function_concept": "behavior",
            "value_concepts": ["a", "b"],
            "binding": {"paradigm": "add_two", "value_order": {"a": 0, "b": 1}}
        }
    ])
}

#[tokio::test]
async fn full_run_through_sqlite_and_file_store() {
    let h = harness_with(100).await;
    let repos = write_repos(h._dir.path(), add_concepts(), add_inferences());

    let run_id = Uuid::now_v7();
    let outcome = h.orchestrator.start(run_id, &repos).await.unwrap();

    assert_eq!(outcome.status, RunStatus::Drained);
    assert_eq!(outcome.cycles, 1);
    let sum = outcome.concept("sum").unwrap();
    assert_eq!(sum.produced_payloads(), vec![&json!("12")]);

    // The run record and checkpoint log landed in SQLite.
    let record = h.orchestrator.checkpoint().get_run(run_id).await.unwrap().unwrap();
    assert_eq!(record.status, RunStatus::Drained);
    let snapshots = h.orchestrator.checkpoint().list_checkpoints(run_id).await.unwrap();
    assert_eq!(snapshots.len(), 1);
    assert!(snapshots[0].waitlist.is_empty());
}

#[tokio::test]
async fn wrapper_reference_reads_workspace_file() {
    let h = harness_with(100).await;
    std::fs::write(h._dir.path().join("note.txt"), "hello syllog").unwrap();

    let concepts = json!([
        {"name": "behavior", "kind": "scalar", "is_ground": true, "values": ["shout"]},
        {
            "name": "note",
            "kind": "scalar",
            "is_ground": true,
            "values": ["%{file}note(note.txt)"]
        },
        {"name": "loud_note", "kind": "scalar", "is_final": true}
    ]);
    let inferences = json!([
        {
            "flow_index": 1,
            "sequence_kind": "paradigm",
            "produces": "loud_note",
            "function_concept": "behavior",
            "value_concepts": ["note"],
            "binding": {"paradigm": "shout", "value_order": {"note": 0}}
        }
    ]);
    let repos = write_repos(h._dir.path(), concepts, inferences);

    let outcome = h.orchestrator.start(Uuid::now_v7(), &repos).await.unwrap();

    assert_eq!(outcome.status, RunStatus::Drained);
    let loud = outcome.concept("loud_note").unwrap();
    assert_eq!(loud.produced_payloads(), vec![&json!("HELLO SYLLOG")]);
}

#[tokio::test]
async fn budget_abort_then_resume_completes_via_sqlite() {
    let dir = TempDir::new().unwrap();

    let concepts = json!([
        {"name": "behavior", "kind": "scalar", "is_ground": true, "values": ["add_two"]},
        {"name": "a", "kind": "scalar", "is_ground": true, "values": ["5"]},
        {"name": "b", "kind": "scalar", "is_ground": true, "values": ["7"]},
        {"name": "sum", "kind": "scalar"},
        {"name": "sum_again", "kind": "scalar", "is_ground": true, "values": ["0"]},
        {"name": "double_sum", "kind": "scalar", "is_final": true}
    ]);
    // Both slots of the doubling call draw from the same sum concept.
    let inferences = json!([
        {
            "flow_index": 1,
            "sequence_kind": "paradigm",
            "produces": "sum",
            "function_concept": "behavior",
            "value_concepts": ["a", "b"],
            "binding": {"paradigm": "add_two", "value_order": {"a": 0, "b": 1}}
        },
        {
            "flow_index": 2,
            "sequence_kind": "paradigm",
            "produces": "double_sum",
            "function_concept": "behavior",
            "value_concepts": ["sum", "sum_again"],
            "binding": {
                "paradigm": "add_two",
                "value_order": {"sum": 0, "sum_again": 1},
                "value_selectors": {
                    "sum_again": {"source_concept": "sum"}
                }
            }
        }
    ]);

    let strict = harness_in(dir.path(), 1).await;
    let repos = write_repos(dir.path(), concepts, inferences);

    let run_id = Uuid::now_v7();
    let outcome = strict.start(run_id, &repos).await.unwrap();
    assert_eq!(outcome.status, RunStatus::Aborted);
    assert!(matches!(
        outcome.abort,
        Some(AbortReason::BudgetExhausted { cycles: 1 })
    ));

    // A fresh orchestrator over the same database resumes from the
    // persisted checkpoint and finishes the remaining inference.
    let relaxed = harness_in(dir.path(), 100).await;
    let outcome = relaxed.resume(run_id, &repos).await.unwrap();
    assert_eq!(outcome.status, RunStatus::Drained);
    assert_eq!(outcome.cycles, 1);
    let doubled = outcome.concept("double_sum").unwrap();
    assert_eq!(doubled.produced_payloads(), vec![&json!("24")]);
}

#[tokio::test]
async fn fork_creates_independent_run_in_registry() {
    let dir = TempDir::new().unwrap();
    let orchestrator = harness_in(dir.path(), 100).await;
    let repos = {
        let concepts = add_concepts();
        let inferences = add_inferences();
        write_repos(dir.path(), concepts, inferences)
    };

    let source = Uuid::now_v7();
    orchestrator.start(source, &repos).await.unwrap();

    let forked = Uuid::now_v7();
    let outcome = orchestrator.fork(source, forked, &repos).await.unwrap();
    assert_eq!(outcome.status, RunStatus::Drained);

    // Both runs are visible, and the fork carries its seed snapshot.
    let runs = orchestrator.checkpoint().list_runs(10).await.unwrap();
    let ids: Vec<Uuid> = runs.iter().map(|r| r.run_id).collect();
    assert!(ids.contains(&source));
    assert!(ids.contains(&forked));

    let seed = orchestrator
        .checkpoint()
        .list_checkpoints(forked)
        .await
        .unwrap();
    assert_eq!(seed[0].sequence, 0);
    assert_eq!(seed[0].run_id, forked);
}
