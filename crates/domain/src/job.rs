//! Job items and their status state machine.
//!
//! ```text
//! pending ──▶ loading ──▶ success
//!                    └──▶ error
//! ```
//!
//! `success` and `error` are terminal. A job item is owned by the batch that
//! created it and mutated only by that batch's drain loop.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{GenerationError, GenerationOutput, JobItemId, Timestamp};

/// Lifecycle state of a [`JobItem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created, not yet scheduled.
    Pending,
    /// Scheduled; shown as a placeholder until it resolves.
    Loading,
    /// Finished with a result.
    Success,
    /// Finished without a result.
    Error,
}

impl JobStatus {
    /// Returns `true` for `success` and `error`.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Error)
    }

    /// Returns `true` if the state machine permits moving to `next`.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Loading)
                | (JobStatus::Loading, JobStatus::Success)
                | (JobStatus::Loading, JobStatus::Error)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Loading => "loading",
            JobStatus::Success => "success",
            JobStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// An illegal status change was attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Job item {item} cannot move from {from} to {to}")]
pub struct TransitionError {
    /// The item concerned.
    pub item: JobItemId,
    /// Current status.
    pub from: JobStatus,
    /// Requested status.
    pub to: JobStatus,
}

/// One unit of work derived from a replica of a generation task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobItem {
    /// Unique identity of this item.
    pub id: JobItemId,
    /// Index of the originating task in the submitted list.
    pub task_index: usize,
    /// Zero-based replica number within the originating task.
    pub replica: u32,
    /// Current status.
    pub status: JobStatus,
    /// Output, present only when `status == Success`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<GenerationOutput>,
    /// Failure, present only when `status == Error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<GenerationError>,
    /// Non-fatal problems (e.g. the relay failed and the original asset was kept).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    /// Item-level attempts made so far.
    pub attempts: u32,
    /// When the item was materialised.
    pub created_at: Timestamp,
    /// When the item reached a terminal state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<Timestamp>,
}

impl JobItem {
    /// Creates a `pending` item for replica `replica` of task `task_index`.
    pub fn new(task_index: usize, replica: u32) -> Self {
        Self {
            id: JobItemId::new_random(),
            task_index,
            replica,
            status: JobStatus::Pending,
            result: None,
            error: None,
            warnings: Vec::new(),
            attempts: 0,
            created_at: Timestamp::now(),
            finished_at: None,
        }
    }

    fn transition(&mut self, to: JobStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(to) {
            return Err(TransitionError {
                item: self.id,
                from: self.status,
                to,
            });
        }
        self.status = to;
        if to.is_terminal() {
            self.finished_at = Some(Timestamp::now());
        }
        Ok(())
    }

    /// `pending → loading`.
    pub fn start(&mut self) -> Result<(), TransitionError> {
        self.transition(JobStatus::Loading)
    }

    /// `loading → success`, storing the output.
    pub fn succeed(&mut self, output: GenerationOutput) -> Result<(), TransitionError> {
        self.transition(JobStatus::Success)?;
        self.result = Some(output);
        Ok(())
    }

    /// `loading → error`, storing the failure.
    pub fn fail(&mut self, error: GenerationError) -> Result<(), TransitionError> {
        self.transition(JobStatus::Error)?;
        self.error = Some(error);
        Ok(())
    }

    /// Records a non-fatal warning.
    pub fn warn(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    /// Returns `true` once the item is `success` or `error`.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
