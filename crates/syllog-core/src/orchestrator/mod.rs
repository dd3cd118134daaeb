//! Run orchestrator: dependency-driven sequential scheduling with durable
//! checkpointing.
//!
//! A run is a single-writer state machine: Idle -> Scanning -> Executing
//! -> Scanning ... until the waitlist drains or the run aborts. Each scan
//! picks the lowest-`flow_index` ready inference, executes it to
//! completion, applies its results to the target concept, and checkpoints
//! before the next scan. Nothing executes concurrently within one run;
//! separate runs may proceed in parallel against the same store.
//!
//! # Execution flow
//!
//! 1. Register the run (or restore it via resume/fork).
//! 2. Scan the waitlist for ready inferences (every dependency concept
//!    has at least one value).
//! 3. Execute the chosen inference: selector evaluation, binding-set
//!    construction, paradigm interpretation (or grouping).
//! 4. Apply results to the target concept, append a history event,
//!    checkpoint.
//! 5. On drain/abort/cancel, update the run record.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use syllog_types::concept::{ConceptState, ConceptValue};
use syllog_types::inference::{Inference, SelectorSpec, SequenceKind};
use syllog_types::run::{
    AbortReason, CheckpointSnapshot, HistoryEvent, InferenceOutcome, RunStatus, WaitlistEntry,
};

use crate::checkpoint::{CheckpointError, CheckpointManager, RestoredRun};
use crate::paradigm::{ParadigmEngine, ParadigmError};
use crate::repo::RepositorySet;
use crate::repository::CheckpointRepository;
use crate::resolver::selector::SelectedInput;
use crate::resolver::{WrapperResolver, apply_selector, selection_sequence};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub use syllog_types::config::DEFAULT_CYCLE_BUDGET;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Run-level orchestrator failures. Per-inference failures never surface
/// here; they are isolated into history events and failed result values.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}

// ---------------------------------------------------------------------------
// Configuration and outcome
// ---------------------------------------------------------------------------

/// Per-orchestrator tuning knobs.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Maximum scan-execute cycles before a `BudgetExhausted` abort.
    pub cycle_budget: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            cycle_budget: DEFAULT_CYCLE_BUDGET,
        }
    }
}

/// Result of a finished run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: Uuid,
    pub status: RunStatus,
    /// Abort reason for `Aborted` runs.
    pub abort: Option<AbortReason>,
    /// Scan-execute cycles consumed.
    pub cycles: u64,
    /// Every concept's final state.
    pub concepts: Vec<ConceptState>,
    pub history: Vec<HistoryEvent>,
}

impl RunOutcome {
    /// Look up a concept's final state by name.
    pub fn concept(&self, name: &str) -> Option<&ConceptState> {
        self.concepts.iter().find(|c| c.name == name)
    }
}

// ---------------------------------------------------------------------------
// Internal run state
// ---------------------------------------------------------------------------

/// Scheduler phase, for lifecycle tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Scanning,
    Executing,
    Drained,
    Aborted,
}

/// Mutable state of one in-flight run. Owned exclusively by the driving
/// task: the single-writer rule is structural, not locked.
struct RunCursor {
    run_id: Uuid,
    phase: Phase,
    /// Pending inferences, ascending `flow_index`.
    waitlist: Vec<Inference>,
    /// Concept states keyed by name; ordered for stable snapshots.
    concepts: BTreeMap<String, ConceptState>,
    history: Vec<HistoryEvent>,
    next_sequence: u64,
}

impl RunCursor {
    fn enter(&mut self, phase: Phase) {
        if self.phase != phase {
            tracing::trace!(run_id = %self.run_id, from = ?self.phase, to = ?phase, "phase transition");
            self.phase = phase;
        }
    }

    fn snapshot(&self) -> CheckpointSnapshot {
        CheckpointSnapshot {
            run_id: self.run_id,
            sequence: self.next_sequence,
            waitlist: self.waitlist.iter().map(waitlist_entry).collect(),
            concepts: self.concepts.values().cloned().collect(),
            history: self.history.clone(),
            created_at: Utc::now(),
        }
    }
}

fn waitlist_entry(inference: &Inference) -> WaitlistEntry {
    WaitlistEntry {
        flow_index: inference.flow_index,
        produces: inference.produces.clone(),
        depends_on: inference
            .depends_on()
            .iter()
            .map(|s| s.to_string())
            .collect(),
    }
}

/// How one inference execution concluded, before history recording.
enum ExecOutcome {
    /// Produced values for the target concept.
    Values(Vec<Value>),
    /// The capability call failed mid-plan.
    CapabilityFailed(String),
    /// Configuration or selector failure; nothing to record on the target.
    Invalid(String),
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Drives runs against a repository set.
///
/// Generic over `R: CheckpointRepository` for storage flexibility.
pub struct Orchestrator<R: CheckpointRepository> {
    checkpoint: Arc<CheckpointManager<R>>,
    engine: ParadigmEngine,
    resolver: WrapperResolver,
    config: OrchestratorConfig,
    /// Cancellation tokens keyed by run_id.
    cancellation_tokens: DashMap<Uuid, CancellationToken>,
}

impl<R: CheckpointRepository> Orchestrator<R> {
    pub fn new(
        checkpoint: Arc<CheckpointManager<R>>,
        engine: ParadigmEngine,
        resolver: WrapperResolver,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            checkpoint,
            engine,
            resolver,
            config,
            cancellation_tokens: DashMap::new(),
        }
    }

    /// Access the checkpoint manager.
    pub fn checkpoint(&self) -> &CheckpointManager<R> {
        &self.checkpoint
    }

    /// Request cooperative cancellation of a run. Takes effect between
    /// cycles, never mid-invocation.
    pub fn cancel(&self, run_id: Uuid) {
        if let Some(token) = self.cancellation_tokens.get(&run_id) {
            tracing::info!(run_id = %run_id, "cancellation requested");
            token.cancel();
        }
    }

    // -----------------------------------------------------------------------
    // Entry points
    // -----------------------------------------------------------------------

    /// Start a fresh run over validated repositories.
    pub async fn start(
        &self,
        run_id: Uuid,
        repos: &RepositorySet,
    ) -> Result<RunOutcome, OrchestratorError> {
        self.checkpoint.begin_run(run_id).await?;

        let concepts = repos
            .concepts
            .iter()
            .map(|def| (def.name.clone(), ConceptState::from_definition(def)))
            .collect();

        let cursor = RunCursor {
            run_id,
            phase: Phase::Idle,
            waitlist: repos.inferences.iter().cloned().collect(),
            concepts,
            history: Vec::new(),
            next_sequence: 0,
        };
        self.drive(cursor).await
    }

    /// Resume a run from its latest checkpoint, patched against the
    /// current inference repository.
    pub async fn resume(
        &self,
        run_id: Uuid,
        repos: &RepositorySet,
    ) -> Result<RunOutcome, OrchestratorError> {
        let restored = self.checkpoint.resume(run_id, repos).await?;
        self.drive(self.cursor_from(restored, repos)).await
    }

    /// Fork a run's latest checkpoint under a new run id.
    pub async fn fork(
        &self,
        from_run_id: Uuid,
        new_run_id: Uuid,
        repos: &RepositorySet,
    ) -> Result<RunOutcome, OrchestratorError> {
        let restored = self.checkpoint.fork(from_run_id, new_run_id, repos).await?;
        self.drive(self.cursor_from(restored, repos)).await
    }

    fn cursor_from(&self, restored: RestoredRun, repos: &RepositorySet) -> RunCursor {
        let waitlist = restored
            .pending
            .iter()
            .filter_map(|idx| repos.inferences.get(*idx).cloned())
            .collect();
        RunCursor {
            run_id: restored.run_id,
            phase: Phase::Idle,
            waitlist,
            concepts: restored
                .concepts
                .into_iter()
                .map(|c| (c.name.clone(), c))
                .collect(),
            history: restored.history,
            next_sequence: restored.next_sequence,
        }
    }

    // -----------------------------------------------------------------------
    // Main loop
    // -----------------------------------------------------------------------

    async fn drive(&self, mut cursor: RunCursor) -> Result<RunOutcome, OrchestratorError> {
        let run_id = cursor.run_id;
        let token = CancellationToken::new();
        self.cancellation_tokens.insert(run_id, token.clone());

        let result = self.run_cycles(&mut cursor, &token).await;
        self.cancellation_tokens.remove(&run_id);

        let (status, abort, cycles) = result?;
        let error = abort.as_ref().map(|a| a.to_string());
        self.checkpoint
            .finish_run(run_id, status, error.as_deref())
            .await?;

        tracing::info!(run_id = %run_id, status = ?status, cycles, "run finished");
        Ok(RunOutcome {
            run_id,
            status,
            abort,
            cycles,
            concepts: cursor.concepts.into_values().collect(),
            history: cursor.history,
        })
    }

    async fn run_cycles(
        &self,
        cursor: &mut RunCursor,
        token: &CancellationToken,
    ) -> Result<(RunStatus, Option<AbortReason>, u64), OrchestratorError> {
        let mut cycles: u64 = 0;

        loop {
            if token.is_cancelled() {
                cursor.enter(Phase::Aborted);
                return Ok((RunStatus::Cancelled, None, cycles));
            }
            if cursor.waitlist.is_empty() {
                cursor.enter(Phase::Drained);
                return Ok((RunStatus::Drained, None, cycles));
            }
            if cycles >= self.config.cycle_budget {
                cursor.enter(Phase::Aborted);
                let reason = AbortReason::BudgetExhausted { cycles };
                tracing::warn!(run_id = %cursor.run_id, cycles, "cycle budget exhausted");
                return Ok((RunStatus::Aborted, Some(reason), cycles));
            }
            cycles += 1;

            cursor.enter(Phase::Scanning);
            let Some(position) = self.scan(cursor) else {
                cursor.enter(Phase::Aborted);
                let pending: Vec<u64> =
                    cursor.waitlist.iter().map(|i| i.flow_index).collect();
                tracing::warn!(run_id = %cursor.run_id, ?pending, "deadlock: no ready inference");
                let reason = AbortReason::Deadlock { pending };
                return Ok((RunStatus::Aborted, Some(reason), cycles));
            };

            cursor.enter(Phase::Executing);
            let inference = cursor.waitlist.remove(position);
            tracing::debug!(
                run_id = %cursor.run_id,
                flow_index = inference.flow_index,
                produces = %inference.produces,
                "executing inference"
            );

            let exec = self.execute(&inference, cursor).await;
            self.apply(&inference, exec, cursor).await?;
        }
    }

    /// Find the ready waitlist item with the lowest `flow_index`. The
    /// waitlist is kept sorted, so the first ready item wins the tie-break.
    fn scan(&self, cursor: &RunCursor) -> Option<usize> {
        cursor.waitlist.iter().position(|inference| {
            inference.depends_on().iter().all(|dep| {
                cursor
                    .concepts
                    .get(*dep)
                    .is_some_and(ConceptState::has_values)
            })
        })
    }

    // -----------------------------------------------------------------------
    // Inference execution
    // -----------------------------------------------------------------------

    async fn execute(&self, inference: &Inference, cursor: &RunCursor) -> ExecOutcome {
        match inference.sequence_kind {
            SequenceKind::Grouping => self.execute_grouping(inference, cursor),
            SequenceKind::Paradigm => self.execute_paradigm(inference, cursor).await,
        }
    }

    /// A grouping inference composes its dependencies' current payloads
    /// into one composite value, slot-ordered, with no capability call.
    fn execute_grouping(&self, inference: &Inference, cursor: &RunCursor) -> ExecOutcome {
        let mut elements = Vec::with_capacity(inference.value_concepts.len());
        for concept in slot_ordered(inference) {
            let Some(state) = cursor.concepts.get(concept) else {
                return ExecOutcome::Invalid(format!("concept '{concept}' has no state"));
            };
            let payloads = state.produced_payloads();
            match payloads.as_slice() {
                [] => {
                    return ExecOutcome::Invalid(format!(
                        "concept '{concept}' has no produced values to group"
                    ));
                }
                [single] => elements.push((*single).clone()),
                many => elements.push(Value::Array(many.iter().map(|v| (*v).clone()).collect())),
            }
        }
        ExecOutcome::Values(vec![Value::Array(elements)])
    }

    /// A paradigm inference binds inputs through selectors, expands unpack
    /// cross-products into binding sets, and interprets the plan once per
    /// set.
    async fn execute_paradigm(&self, inference: &Inference, cursor: &RunCursor) -> ExecOutcome {
        let mut slots = Vec::with_capacity(inference.value_concepts.len());
        for concept in slot_ordered(inference) {
            let default_spec = SelectorSpec {
                source_concept: None,
                index: None,
                branch: None,
                unpack: false,
            };
            let spec = inference
                .binding
                .value_selectors
                .get(concept)
                .unwrap_or(&default_spec);
            let source = spec.source_concept.as_deref().unwrap_or(concept);

            let Some(state) = cursor.concepts.get(source) else {
                return ExecOutcome::Invalid(format!("concept '{source}' has no state"));
            };
            let sequence = selection_sequence(&state.produced_payloads());
            match apply_selector(spec, &sequence, &self.resolver) {
                Ok(selected) => slots.push(selected),
                Err(err) => {
                    return ExecOutcome::Invalid(format!("selector on '{source}': {err}"));
                }
            }
        }

        let sets = binding_sets(slots);
        match self.engine.run(&inference.binding.paradigm, sets).await {
            Ok(result) => ExecOutcome::Values(result.values),
            Err(ParadigmError::Capability(err)) => ExecOutcome::CapabilityFailed(err.to_string()),
            Err(err) => ExecOutcome::Invalid(err.to_string()),
        }
    }

    // -----------------------------------------------------------------------
    // Result application
    // -----------------------------------------------------------------------

    async fn apply(
        &self,
        inference: &Inference,
        exec: ExecOutcome,
        cursor: &mut RunCursor,
    ) -> Result<(), OrchestratorError> {
        let target = cursor
            .concepts
            .entry(inference.produces.clone())
            .or_insert_with(|| ConceptState {
                name: inference.produces.clone(),
                values: Vec::new(),
            });

        let outcome = match exec {
            ExecOutcome::Values(values) => {
                let count = values.len();
                let superseded = !target.values.is_empty();
                // Last writer wins: new results replace the concept's
                // visible values rather than piling up beside them.
                target.values = values
                    .into_iter()
                    .map(|v| ConceptValue::produced(v, Some(inference.flow_index)))
                    .collect();
                if superseded {
                    InferenceOutcome::Superseded { count }
                } else {
                    InferenceOutcome::Completed { count }
                }
            }
            ExecOutcome::CapabilityFailed(error) => {
                // Failed result values keep downstream presence checks
                // truthful: the concept was produced, unsuccessfully.
                target
                    .values
                    .push(ConceptValue::failed(error.clone(), inference.flow_index));
                tracing::warn!(
                    run_id = %cursor.run_id,
                    flow_index = inference.flow_index,
                    error = %error,
                    "capability failed"
                );
                InferenceOutcome::CapabilityFailed { error }
            }
            ExecOutcome::Invalid(error) => {
                tracing::warn!(
                    run_id = %cursor.run_id,
                    flow_index = inference.flow_index,
                    error = %error,
                    "inference invalid"
                );
                InferenceOutcome::Invalid { error }
            }
        };

        cursor.history.push(HistoryEvent {
            flow_index: inference.flow_index,
            produces: inference.produces.clone(),
            outcome,
            at: Utc::now(),
        });

        self.checkpoint.checkpoint(&cursor.snapshot()).await?;
        cursor.next_sequence += 1;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Binding helpers
// ---------------------------------------------------------------------------

/// Value concepts in ascending slot order. Validation guarantees the
/// order is a dense permutation.
fn slot_ordered(inference: &Inference) -> Vec<&str> {
    let mut ordered: Vec<(&str, usize)> = inference
        .value_concepts
        .iter()
        .map(|c| (c.as_str(), inference.binding.value_order[c]))
        .collect();
    ordered.sort_by_key(|(_, slot)| *slot);
    ordered.into_iter().map(|(c, _)| c).collect()
}

/// Expand per-slot selections into binding sets: fixed slots contribute
/// one choice, unpacked slots one per element, combined as a
/// cross-product with earlier slots varying slowest.
fn binding_sets(slots: Vec<SelectedInput>) -> Vec<Vec<Value>> {
    let mut sets: Vec<Vec<Value>> = vec![Vec::new()];
    for slot in slots {
        let choices: Vec<Value> = match slot {
            SelectedInput::Fixed(value) => vec![value],
            SelectedInput::Unpacked(values) => values,
        };
        sets = sets
            .into_iter()
            .flat_map(|prefix| {
                choices.iter().map(move |choice| {
                    let mut next = prefix.clone();
                    next.push(choice.clone());
                    next
                })
            })
            .collect();
    }
    sets
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
