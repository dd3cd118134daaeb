//! Run and checkpoint domain types.
//!
//! A checkpoint snapshot is the unit of persistence: the remaining
//! waitlist, all concept values, and the execution history at one point in
//! a run. Snapshots are append-only rows keyed by `(run_id, sequence)` and
//! are what the resume (patch) and fork (overwrite) operations read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::concept::ConceptState;

// ---------------------------------------------------------------------------
// Run lifecycle
// ---------------------------------------------------------------------------

/// Overall status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    /// Terminal success: the waitlist drained.
    Drained,
    /// Terminal failure (see `AbortReason`).
    Aborted,
    Cancelled,
}

/// Why a run aborted. Budget exhaustion is explicitly distinguishable from
/// deadlock so callers can tell a long run from a stuck one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AbortReason {
    /// The scan-execute cycle cap was reached with work remaining.
    BudgetExhausted { cycles: u64 },
    /// A scan made zero progress: no waitlist item ever becomes ready.
    Deadlock { pending: Vec<u64> },
    /// A non-recoverable internal failure.
    Fatal { message: String },
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AbortReason::BudgetExhausted { cycles } => {
                write!(f, "cycle budget exhausted after {cycles} cycles")
            }
            AbortReason::Deadlock { pending } => {
                write!(f, "deadlock: no waitlist item became ready ({} pending)", pending.len())
            }
            AbortReason::Fatal { message } => write!(f, "fatal: {message}"),
        }
    }
}

/// Run registry record, for external tooling to list and inspect runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Abort reason or error message for failed runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Checkpoint snapshot
// ---------------------------------------------------------------------------

/// A point-in-time snapshot of run state. Written after every successful
/// inference execution; never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointSnapshot {
    pub run_id: Uuid,
    /// Monotonic per-run sequence number.
    pub sequence: u64,
    /// Inferences not yet executed.
    pub waitlist: Vec<WaitlistEntry>,
    /// Every concept's accumulated values.
    pub concepts: Vec<ConceptState>,
    /// Ordered execution history, including failures and supersedes.
    pub history: Vec<HistoryEvent>,
    pub created_at: DateTime<Utc>,
}

/// A pending inference reference persisted in a checkpoint. Carries enough
/// of the definition for resume (patch) to detect repository drift.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitlistEntry {
    pub flow_index: u64,
    pub produces: String,
    /// Sorted, deduplicated dependency set at checkpoint time.
    pub depends_on: Vec<String>,
}

/// One executed (or failed) inference in the run history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEvent {
    pub flow_index: u64,
    pub produces: String,
    pub outcome: InferenceOutcome,
    pub at: DateTime<Utc>,
}

/// How an inference's execution concluded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InferenceOutcome {
    /// Produced `count` values for the target concept.
    Completed { count: usize },
    /// Replaced earlier values on the target concept (last writer wins).
    Superseded { count: usize },
    /// The capability call failed; a failed result value was recorded.
    CapabilityFailed { error: String },
    /// Configuration or selector error; nothing was recorded on the target.
    Invalid { error: String },
}

impl CheckpointSnapshot {
    /// Look up a concept's state by name.
    pub fn concept(&self, name: &str) -> Option<&ConceptState> {
        self.concepts.iter().find(|c| c.name == name)
    }

    /// Flow indices recorded as completed (including supersedes).
    pub fn completed_flow_indices(&self) -> Vec<u64> {
        self.history
            .iter()
            .filter(|e| {
                matches!(
                    e.outcome,
                    InferenceOutcome::Completed { .. } | InferenceOutcome::Superseded { .. }
                )
            })
            .map(|e| e.flow_index)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
