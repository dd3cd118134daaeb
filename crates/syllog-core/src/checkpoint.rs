//! Durable checkpoint manager for run state.
//!
//! Wraps `CheckpointRepository` to provide a higher-level API over the
//! append-only snapshot log. A snapshot is written after every successful
//! inference execution, so an interrupted run can continue from its last
//! checkpoint. Two restore modes exist: resume (patch the snapshot
//! against the current inference repository) and fork (trust the snapshot
//! wholesale under a new run id).

use chrono::Utc;
use uuid::Uuid;

use syllog_types::concept::ConceptState;
use syllog_types::run::{
    CheckpointSnapshot, HistoryEvent, RunRecord, RunStatus, WaitlistEntry,
};

use crate::repo::RepositorySet;
use crate::repository::CheckpointRepository;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur during checkpoint operations.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    /// Underlying repository operation failed.
    #[error("checkpoint repository error: {0}")]
    Repository(String),

    /// Run not found (for restore operations).
    #[error("run not found: {0}")]
    RunNotFound(Uuid),

    /// The run exists but has no checkpoint to restore from.
    #[error("run {0} has no checkpoints")]
    NoCheckpoint(Uuid),

    /// A stored snapshot is unusable. Fatal to this restore only.
    #[error("corrupt checkpoint for run {run_id}: {reason}")]
    Corrupt { run_id: Uuid, reason: String },
}

// ---------------------------------------------------------------------------
// Restored state
// ---------------------------------------------------------------------------

/// Run state reconstructed from a snapshot, ready for the scheduler.
#[derive(Debug, Clone)]
pub struct RestoredRun {
    pub run_id: Uuid,
    /// Sequence number the next checkpoint will use.
    pub next_sequence: u64,
    /// Flow indices of the inferences still pending.
    pub pending: Vec<u64>,
    pub concepts: Vec<ConceptState>,
    pub history: Vec<HistoryEvent>,
}

// ---------------------------------------------------------------------------
// CheckpointManager
// ---------------------------------------------------------------------------

/// Manages the run registry and the append-only snapshot log.
///
/// Generic over `R: CheckpointRepository` so it works with any storage
/// backend (SQLite, in-memory). Every snapshot is persisted before the
/// scheduler moves on to its next scan.
pub struct CheckpointManager<R: CheckpointRepository> {
    repo: R,
}

impl<R: CheckpointRepository> CheckpointManager<R> {
    /// Create a new checkpoint manager backed by the given repository.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Access the underlying repository.
    pub fn repo(&self) -> &R {
        &self.repo
    }

    // -----------------------------------------------------------------------
    // Run registry
    // -----------------------------------------------------------------------

    /// Register a new run in `Running` status.
    pub async fn begin_run(&self, run_id: Uuid) -> Result<(), CheckpointError> {
        let now = Utc::now();
        let record = RunRecord {
            run_id,
            status: RunStatus::Running,
            created_at: now,
            updated_at: now,
            error: None,
        };
        self.repo
            .create_run(&record)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))?;

        tracing::debug!(run_id = %run_id, "registered run");
        Ok(())
    }

    /// Record a run's terminal (or cancelled) status.
    pub async fn finish_run(
        &self,
        run_id: Uuid,
        status: RunStatus,
        error: Option<&str>,
    ) -> Result<(), CheckpointError> {
        self.repo
            .update_run_status(&run_id, status, error)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))?;

        tracing::debug!(run_id = %run_id, status = ?status, "recorded run status");
        Ok(())
    }

    /// Get a run record by id.
    pub async fn get_run(&self, run_id: Uuid) -> Result<Option<RunRecord>, CheckpointError> {
        self.repo
            .get_run(&run_id)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))
    }

    /// List run records, newest first.
    pub async fn list_runs(&self, limit: u32) -> Result<Vec<RunRecord>, CheckpointError> {
        self.repo
            .list_runs(limit)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))
    }

    // -----------------------------------------------------------------------
    // Snapshots
    // -----------------------------------------------------------------------

    /// Append one snapshot to the run's checkpoint log.
    pub async fn checkpoint(&self, snapshot: &CheckpointSnapshot) -> Result<(), CheckpointError> {
        self.repo
            .append_checkpoint(snapshot)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))?;

        tracing::debug!(
            run_id = %snapshot.run_id,
            sequence = snapshot.sequence,
            waitlist = snapshot.waitlist.len(),
            "checkpointed run state"
        );
        Ok(())
    }

    /// All snapshots for a run, ordered by sequence.
    pub async fn list_checkpoints(
        &self,
        run_id: Uuid,
    ) -> Result<Vec<CheckpointSnapshot>, CheckpointError> {
        self.repo
            .list_checkpoints(&run_id)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))
    }

    /// Fetch the latest snapshot for a restore, validating its integrity.
    async fn restore_snapshot(&self, run_id: Uuid) -> Result<CheckpointSnapshot, CheckpointError> {
        let snapshot = self
            .repo
            .latest_checkpoint(&run_id)
            .await
            // A read failure on a snapshot row means the stored state is
            // unusable for this restore.
            .map_err(|e| CheckpointError::Corrupt {
                run_id,
                reason: e.to_string(),
            })?
            .ok_or(CheckpointError::NoCheckpoint(run_id))?;

        if snapshot.run_id != run_id {
            return Err(CheckpointError::Corrupt {
                run_id,
                reason: format!("snapshot belongs to run {}", snapshot.run_id),
            });
        }
        Ok(snapshot)
    }

    // -----------------------------------------------------------------------
    // Resume (patch)
    // -----------------------------------------------------------------------

    /// Restore a run under its own id, patching the snapshot against the
    /// current inference repository.
    ///
    /// Concept values are kept verbatim. A waitlist entry survives only if
    /// the repository still has an inference with the same `(flow_index,
    /// produces, depends_on)`; mismatches are discarded. Repository
    /// inferences neither matched nor already completed in history are
    /// re-derived as fresh pending entries.
    pub async fn resume(
        &self,
        run_id: Uuid,
        repos: &RepositorySet,
    ) -> Result<RestoredRun, CheckpointError> {
        if self.get_run(run_id).await?.is_none() {
            return Err(CheckpointError::RunNotFound(run_id));
        }
        let snapshot = self.restore_snapshot(run_id).await?;

        let mut pending = Vec::new();
        for entry in &snapshot.waitlist {
            match repos.inferences.get(entry.flow_index) {
                Some(inference) if entry_matches(entry, inference) => {
                    pending.push(entry.flow_index);
                }
                _ => {
                    tracing::warn!(
                        run_id = %run_id,
                        flow_index = entry.flow_index,
                        "waitlist entry no longer matches repository, discarding"
                    );
                }
            }
        }

        let completed = snapshot.completed_flow_indices();
        for inference in repos.inferences.iter() {
            let idx = inference.flow_index;
            if !pending.contains(&idx) && !completed.contains(&idx) {
                pending.push(idx);
            }
        }
        pending.sort_unstable();

        let concepts = merge_repo_concepts(snapshot.concepts.clone(), repos);

        self.finish_run(run_id, RunStatus::Running, None).await?;

        Ok(RestoredRun {
            run_id,
            next_sequence: snapshot.sequence + 1,
            pending,
            concepts,
            history: snapshot.history,
        })
    }

    // -----------------------------------------------------------------------
    // Fork (overwrite)
    // -----------------------------------------------------------------------

    /// Restore a run's snapshot under a new id.
    ///
    /// The snapshot's waitlist, concept state, and history are trusted
    /// wholesale: concept values are never re-read from the caller's
    /// repository. The copied state is written as the new run's sequence-0
    /// checkpoint before any execution. Concepts present only in the
    /// caller's repository are added fresh to the in-memory state.
    pub async fn fork(
        &self,
        from_run_id: Uuid,
        new_run_id: Uuid,
        repos: &RepositorySet,
    ) -> Result<RestoredRun, CheckpointError> {
        if self.get_run(from_run_id).await?.is_none() {
            return Err(CheckpointError::RunNotFound(from_run_id));
        }
        let source = self.restore_snapshot(from_run_id).await?;

        // Every pending entry must still resolve to a definition, or the
        // forked run could never execute it.
        for entry in &source.waitlist {
            if repos.inferences.get(entry.flow_index).is_none() {
                return Err(CheckpointError::Corrupt {
                    run_id: from_run_id,
                    reason: format!(
                        "waitlist inference {} missing from repository",
                        entry.flow_index
                    ),
                });
            }
        }

        self.begin_run(new_run_id).await?;

        let seed = CheckpointSnapshot {
            run_id: new_run_id,
            sequence: 0,
            waitlist: source.waitlist.clone(),
            concepts: source.concepts.clone(),
            history: source.history.clone(),
            created_at: Utc::now(),
        };
        self.checkpoint(&seed).await?;

        let mut pending: Vec<u64> = source.waitlist.iter().map(|e| e.flow_index).collect();
        pending.sort_unstable();

        let concepts = merge_repo_concepts(source.concepts, repos);

        Ok(RestoredRun {
            run_id: new_run_id,
            next_sequence: 1,
            pending,
            concepts,
            history: source.history,
        })
    }
}

/// Whether a persisted waitlist entry still matches its repository
/// definition.
fn entry_matches(entry: &WaitlistEntry, inference: &syllog_types::inference::Inference) -> bool {
    entry.produces == inference.produces
        && entry.depends_on
            == inference
                .depends_on()
                .iter()
                .map(|s| s.to_string())
                .collect::<Vec<_>>()
}

/// Snapshot concepts stay verbatim; repository concepts the snapshot has
/// never seen start from their definitions.
fn merge_repo_concepts(mut concepts: Vec<ConceptState>, repos: &RepositorySet) -> Vec<ConceptState> {
    for def in repos.concepts.iter() {
        if !concepts.iter().any(|c| c.name == def.name) {
            concepts.push(ConceptState::from_definition(def));
        }
    }
    concepts
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
