//! Outcome model: the single terminal result of a task invocation.
//!
//! The pipeline returns exactly one of these per run. Nothing is persisted; a
//! `TaskReport` is only the serializable view of it for callers that print or
//! ship results.

use serde::{Deserialize, Serialize};

use super::errors::{ErrorKind, TaskError};
use super::ids::{ArtifactKey, TaskId};
use super::state::PipelineStage;

/// Artifact key on success, classified failure otherwise.
pub type TaskOutcome = Result<ArtifactKey, TaskError>;

/// We serialize as SCREAMING_SNAKE_CASE: SUCCESS / FAILURE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeKind {
    Success,
    Failure,
}

/// Serializable summary of a `TaskOutcome`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskReport {
    pub task_id: TaskId,
    pub kind: OutcomeKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_key: Option<ArtifactKey>,

    /// Stage the task failed in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<PipelineStage>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl TaskReport {
    pub fn from_outcome(task_id: &TaskId, outcome: &TaskOutcome) -> Self {
        match outcome {
            Ok(key) => Self {
                task_id: task_id.clone(),
                kind: OutcomeKind::Success,
                artifact_key: Some(key.clone()),
                failed_stage: None,
                error_kind: None,
                reason: None,
            },
            Err(err) => Self {
                task_id: task_id.clone(),
                kind: OutcomeKind::Failure,
                artifact_key: None,
                failed_stage: Some(err.stage()),
                error_kind: Some(err.kind()),
                reason: Some(err.to_string()),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        self.kind == OutcomeKind::Success
    }
}
