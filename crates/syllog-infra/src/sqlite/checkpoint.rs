//! SQLite checkpoint repository implementation.
//!
//! Implements `CheckpointRepository` from `syllog-core` using sqlx with
//! split read/write pools. Snapshots are stored as JSON blobs in an
//! append-only table keyed by `(run_id, sequence)`.

use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use syllog_core::repository::CheckpointRepository;
use syllog_types::error::RepositoryError;
use syllog_types::run::{CheckpointSnapshot, RunRecord, RunStatus};

use super::pool::DatabasePool;

/// SQLite-backed implementation of `CheckpointRepository`.
pub struct SqliteCheckpointRepository {
    pool: DatabasePool,
}

impl SqliteCheckpointRepository {
    /// Create a new repository backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Internal row types
// ---------------------------------------------------------------------------

struct RunRow {
    id: String,
    status: String,
    created_at: String,
    updated_at: String,
    error: Option<String>,
}

impl RunRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            status: row.try_get("status")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            error: row.try_get("error")?,
        })
    }

    fn into_record(self) -> Result<RunRecord, RepositoryError> {
        let status: RunStatus =
            serde_json::from_value(serde_json::Value::String(self.status.clone()))
                .map_err(|_| RepositoryError::Query(format!("invalid run status: {}", self.status)))?;
        Ok(RunRecord {
            run_id: parse_uuid(&self.id)?,
            status,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
            error: self.error,
        })
    }
}

struct CheckpointRow {
    snapshot: String,
}

impl CheckpointRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            snapshot: row.try_get("snapshot")?,
        })
    }

    fn into_snapshot(self) -> Result<CheckpointSnapshot, RepositoryError> {
        serde_json::from_str(&self.snapshot)
            .map_err(|e| RepositoryError::Query(format!("invalid checkpoint snapshot JSON: {e}")))
    }
}

fn parse_uuid(raw: &str) -> Result<Uuid, RepositoryError> {
    Uuid::parse_str(raw).map_err(|_| RepositoryError::Query(format!("invalid UUID: {raw}")))
}

fn parse_datetime(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| RepositoryError::Query(format!("invalid timestamp: {raw}")))
}

fn status_str(status: RunStatus) -> String {
    // RunStatus serializes as a bare snake_case string.
    serde_json::to_value(status)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}

fn map_write_error(e: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(dbe) = &e
        && matches!(dbe.kind(), sqlx::error::ErrorKind::UniqueViolation)
    {
        return RepositoryError::Conflict(dbe.message().to_string());
    }
    RepositoryError::Query(e.to_string())
}

// ---------------------------------------------------------------------------
// Trait implementation
// ---------------------------------------------------------------------------

impl CheckpointRepository for SqliteCheckpointRepository {
    async fn create_run(&self, run: &RunRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO runs (id, status, created_at, updated_at, error)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(run.run_id.to_string())
        .bind(status_str(run.status))
        .bind(run.created_at.to_rfc3339())
        .bind(run.updated_at.to_rfc3339())
        .bind(&run.error)
        .execute(&self.pool.writer)
        .await
        .map_err(map_write_error)?;
        Ok(())
    }

    async fn update_run_status(
        &self,
        run_id: &Uuid,
        status: RunStatus,
        error: Option<&str>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE runs SET status = ?, error = ?, updated_at = ? WHERE id = ?",
        )
        .bind(status_str(status))
        .bind(error)
        .bind(Utc::now().to_rfc3339())
        .bind(run_id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(map_write_error)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn get_run(&self, run_id: &Uuid) -> Result<Option<RunRecord>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, status, created_at, updated_at, error FROM runs WHERE id = ?",
        )
        .bind(run_id.to_string())
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        row.map(|r| RunRow::from_row(&r).map_err(|e| RepositoryError::Query(e.to_string())))
            .transpose()?
            .map(RunRow::into_record)
            .transpose()
    }

    async fn list_runs(&self, limit: u32) -> Result<Vec<RunRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, status, created_at, updated_at, error FROM runs
             ORDER BY created_at DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        rows.iter()
            .map(|r| {
                RunRow::from_row(r)
                    .map_err(|e| RepositoryError::Query(e.to_string()))?
                    .into_record()
            })
            .collect()
    }

    async fn append_checkpoint(
        &self,
        snapshot: &CheckpointSnapshot,
    ) -> Result<(), RepositoryError> {
        let payload = serde_json::to_string(snapshot)
            .map_err(|e| RepositoryError::Query(format!("cannot serialize snapshot: {e}")))?;

        sqlx::query(
            "INSERT INTO checkpoints (run_id, sequence, snapshot, created_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(snapshot.run_id.to_string())
        .bind(snapshot.sequence as i64)
        .bind(payload)
        .bind(snapshot.created_at.to_rfc3339())
        .execute(&self.pool.writer)
        .await
        .map_err(map_write_error)?;
        Ok(())
    }

    async fn latest_checkpoint(
        &self,
        run_id: &Uuid,
    ) -> Result<Option<CheckpointSnapshot>, RepositoryError> {
        let row = sqlx::query(
            "SELECT snapshot FROM checkpoints WHERE run_id = ?
             ORDER BY sequence DESC LIMIT 1",
        )
        .bind(run_id.to_string())
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        row.map(|r| CheckpointRow::from_row(&r).map_err(|e| RepositoryError::Query(e.to_string())))
            .transpose()?
            .map(CheckpointRow::into_snapshot)
            .transpose()
    }

    async fn list_checkpoints(
        &self,
        run_id: &Uuid,
    ) -> Result<Vec<CheckpointSnapshot>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT snapshot FROM checkpoints WHERE run_id = ? ORDER BY sequence ASC",
        )
        .bind(run_id.to_string())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        rows.iter()
            .map(|r| {
                CheckpointRow::from_row(r)
                    .map_err(|e| RepositoryError::Query(e.to_string()))?
                    .into_snapshot()
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use syllog_types::concept::{ConceptState, ConceptValue};
    use syllog_types::run::WaitlistEntry;

    async fn repo() -> (tempfile::TempDir, SqliteCheckpointRepository) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("t.db").display());
        let pool = DatabasePool::new(&url).await.unwrap();
        (dir, SqliteCheckpointRepository::new(pool))
    }

    fn run_record() -> RunRecord {
        RunRecord {
            run_id: Uuid::now_v7(),
            status: RunStatus::Running,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            error: None,
        }
    }

    fn snapshot(run_id: Uuid, sequence: u64) -> CheckpointSnapshot {
        CheckpointSnapshot {
            run_id,
            sequence,
            waitlist: vec![WaitlistEntry {
                flow_index: 2,
                produces: "sum".to_string(),
                depends_on: vec!["a".to_string(), "b".to_string()],
            }],
            concepts: vec![ConceptState {
                name: "a".to_string(),
                values: vec![ConceptValue::produced(json!("5"), None)],
            }],
            history: vec![],
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn run_roundtrip() {
        let (_dir, repo) = repo().await;
        let run = run_record();
        repo.create_run(&run).await.unwrap();

        let fetched = repo.get_run(&run.run_id).await.unwrap().unwrap();
        assert_eq!(fetched.run_id, run.run_id);
        assert_eq!(fetched.status, RunStatus::Running);

        repo.update_run_status(&run.run_id, RunStatus::Aborted, Some("deadlock"))
            .await
            .unwrap();
        let fetched = repo.get_run(&run.run_id).await.unwrap().unwrap();
        assert_eq!(fetched.status, RunStatus::Aborted);
        assert_eq!(fetched.error.as_deref(), Some("deadlock"));
    }

    #[tokio::test]
    async fn duplicate_run_conflicts() {
        let (_dir, repo) = repo().await;
        let run = run_record();
        repo.create_run(&run).await.unwrap();
        let err = repo.create_run(&run).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn update_missing_run_not_found() {
        let (_dir, repo) = repo().await;
        let err = repo
            .update_run_status(&Uuid::now_v7(), RunStatus::Drained, None)
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound));
    }

    #[tokio::test]
    async fn checkpoint_roundtrip_and_ordering() {
        let (_dir, repo) = repo().await;
        let run = run_record();
        repo.create_run(&run).await.unwrap();

        repo.append_checkpoint(&snapshot(run.run_id, 0)).await.unwrap();
        repo.append_checkpoint(&snapshot(run.run_id, 1)).await.unwrap();

        let latest = repo.latest_checkpoint(&run.run_id).await.unwrap().unwrap();
        assert_eq!(latest.sequence, 1);
        assert_eq!(
            latest.concept("a").unwrap().produced_payloads(),
            vec![&json!("5")]
        );

        let all = repo.list_checkpoints(&run.run_id).await.unwrap();
        let sequences: Vec<u64> = all.iter().map(|s| s.sequence).collect();
        assert_eq!(sequences, vec![0, 1]);
    }

    #[tokio::test]
    async fn duplicate_sequence_conflicts() {
        let (_dir, repo) = repo().await;
        let run = run_record();
        repo.create_run(&run).await.unwrap();

        repo.append_checkpoint(&snapshot(run.run_id, 0)).await.unwrap();
        let err = repo
            .append_checkpoint(&snapshot(run.run_id, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn corrupt_snapshot_surfaces_query_error() {
        let (_dir, repo) = repo().await;
        let run = run_record();
        repo.create_run(&run).await.unwrap();

        sqlx::query(
            "INSERT INTO checkpoints (run_id, sequence, snapshot, created_at)
             VALUES (?, 0, 'not json', ?)",
        )
        .bind(run.run_id.to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(&repo.pool.writer)
        .await
        .unwrap();

        let err = repo.latest_checkpoint(&run.run_id).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Query(_)));
    }

    #[tokio::test]
    async fn list_runs_newest_first() {
        let (_dir, repo) = repo().await;
        for _ in 0..3 {
            repo.create_run(&run_record()).await.unwrap();
        }
        let runs = repo.list_runs(2).await.unwrap();
        assert_eq!(runs.len(), 2);
        assert!(runs[0].created_at >= runs[1].created_at);
    }
}
