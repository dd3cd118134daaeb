//! Checkpoint repository trait definition.
//!
//! Defines the storage interface for run records and checkpoint
//! snapshots. The infrastructure layer (syllog-infra) implements this
//! trait with SQLite persistence; an in-memory implementation lives next
//! to it for tests and embedding.

use syllog_types::error::RepositoryError;
use syllog_types::run::{CheckpointSnapshot, RunRecord, RunStatus};
use uuid::Uuid;

/// Repository trait for run and checkpoint persistence.
///
/// Covers two entity families:
/// - **Runs:** the run registry (create/update-status/get/list).
/// - **Checkpoints:** append-only snapshots keyed by `(run_id, sequence)`.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait CheckpointRepository: Send + Sync {
    // -----------------------------------------------------------------------
    // Runs
    // -----------------------------------------------------------------------

    /// Create a new run record. Fails with `Conflict` if the id exists.
    fn create_run(
        &self,
        run: &RunRecord,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Update a run's status (and optionally its error message).
    fn update_run_status(
        &self,
        run_id: &Uuid,
        status: RunStatus,
        error: Option<&str>,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get a run record by its UUID.
    fn get_run(
        &self,
        run_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<RunRecord>, RepositoryError>> + Send;

    /// List run records, newest first.
    fn list_runs(
        &self,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<RunRecord>, RepositoryError>> + Send;

    // -----------------------------------------------------------------------
    // Checkpoints
    // -----------------------------------------------------------------------

    /// Append one snapshot. `(run_id, sequence)` must be new; existing
    /// rows are never rewritten.
    fn append_checkpoint(
        &self,
        snapshot: &CheckpointSnapshot,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// The highest-sequence snapshot for a run, if any.
    fn latest_checkpoint(
        &self,
        run_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<CheckpointSnapshot>, RepositoryError>> + Send;

    /// All snapshots for a run, ordered by sequence ASC.
    fn list_checkpoints(
        &self,
        run_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Vec<CheckpointSnapshot>, RepositoryError>> + Send;
}
