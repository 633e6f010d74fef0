//! Sub-task and step status enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of one remote sub-task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubTaskStatus {
    /// Created but not yet picked up by a worker.
    #[default]
    Pending,
    /// A worker is executing the job.
    Running,
    /// The job finished and produced a result.
    Success,
    /// The job finished with an error.
    Failed,
    /// The job was cancelled.
    Canceled,
}

impl fmt::Display for SubTaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
            Self::Canceled => write!(f, "canceled"),
        }
    }
}

impl SubTaskStatus {
    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Canceled)
    }
}

/// UI-facing status of one pipeline step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Not started, or re-armed for a new run.
    #[default]
    Pending,
    /// Dispatched and being polled.
    Running,
    /// Completed with a stored result.
    Success,
    /// Failed; carries an error message until reset.
    Error,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Success => write!(f, "success"),
            Self::Error => write!(f, "error"),
        }
    }
}

impl StepStatus {
    /// Returns whether moving from `self` to `next` is allowed.
    ///
    /// `Success -> Pending` is the re-arm performed when a completed step
    /// is included in a new run. `Error -> Pending` is an explicit reset.
    #[must_use]
    pub fn can_transition(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Running, Self::Success | Self::Error)
                | (Self::Error | Self::Success, Self::Pending)
        )
    }

    /// Returns true for `Success` and `Error`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Error)
    }
}
