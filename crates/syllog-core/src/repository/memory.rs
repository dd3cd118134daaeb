//! In-memory checkpoint repository.
//!
//! Backs tests and library embedders that do not want SQLite. Same
//! append-only semantics as the persistent implementation.

use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use syllog_types::error::RepositoryError;
use syllog_types::run::{CheckpointSnapshot, RunRecord, RunStatus};

use super::CheckpointRepository;

/// Keeps runs and snapshots in concurrent maps.
#[derive(Default)]
pub struct MemoryCheckpointRepository {
    runs: DashMap<Uuid, RunRecord>,
    checkpoints: DashMap<Uuid, Vec<CheckpointSnapshot>>,
}

impl MemoryCheckpointRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckpointRepository for MemoryCheckpointRepository {
    async fn create_run(&self, run: &RunRecord) -> Result<(), RepositoryError> {
        if self.runs.contains_key(&run.run_id) {
            return Err(RepositoryError::Conflict(format!(
                "run {} already exists",
                run.run_id
            )));
        }
        self.runs.insert(run.run_id, run.clone());
        Ok(())
    }

    async fn update_run_status(
        &self,
        run_id: &Uuid,
        status: RunStatus,
        error: Option<&str>,
    ) -> Result<(), RepositoryError> {
        let mut run = self.runs.get_mut(run_id).ok_or(RepositoryError::NotFound)?;
        run.status = status;
        run.error = error.map(str::to_string);
        run.updated_at = Utc::now();
        Ok(())
    }

    async fn get_run(&self, run_id: &Uuid) -> Result<Option<RunRecord>, RepositoryError> {
        Ok(self.runs.get(run_id).map(|r| r.clone()))
    }

    async fn list_runs(&self, limit: u32) -> Result<Vec<RunRecord>, RepositoryError> {
        let mut runs: Vec<RunRecord> = self.runs.iter().map(|r| r.clone()).collect();
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        runs.truncate(limit as usize);
        Ok(runs)
    }

    async fn append_checkpoint(
        &self,
        snapshot: &CheckpointSnapshot,
    ) -> Result<(), RepositoryError> {
        let mut rows = self.checkpoints.entry(snapshot.run_id).or_default();
        if rows.iter().any(|s| s.sequence == snapshot.sequence) {
            return Err(RepositoryError::Conflict(format!(
                "checkpoint ({}, {}) already exists",
                snapshot.run_id, snapshot.sequence
            )));
        }
        rows.push(snapshot.clone());
        rows.sort_by_key(|s| s.sequence);
        Ok(())
    }

    async fn latest_checkpoint(
        &self,
        run_id: &Uuid,
    ) -> Result<Option<CheckpointSnapshot>, RepositoryError> {
        Ok(self
            .checkpoints
            .get(run_id)
            .and_then(|rows| rows.last().cloned()))
    }

    async fn list_checkpoints(
        &self,
        run_id: &Uuid,
    ) -> Result<Vec<CheckpointSnapshot>, RepositoryError> {
        Ok(self
            .checkpoints
            .get(run_id)
            .map(|rows| rows.clone())
            .unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
