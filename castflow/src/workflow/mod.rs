//! Workflow state machine.
//!
//! Holds the per-stage [`WorkflowStepInfo`] list, the editable
//! [`StageForms`] and the global [`ExecutionMode`], and drives single-step
//! and automatic runs through [`WorkflowCoordinator`].

mod coordinator;
mod forms;
mod step;

pub use coordinator::WorkflowCoordinator;
pub use forms::{EditedFields, StageForms};
pub use step::WorkflowStepInfo;

use crate::catalog::StageId;
use crate::pipeline::TerminalMode;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Tracing target for the workflow coordinator.
pub const TRACING_TARGET: &str = crate::observability::WORKFLOW_TARGET;

/// Global execution mode. `Manual` is the resting state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// No automatic advancing.
    #[default]
    Manual,
    /// Advancing automatically through video synthesis.
    AutoToSynthesis,
    /// Advancing automatically through publishing.
    AutoToPublish,
}

impl ExecutionMode {
    /// Returns true for the automatic modes.
    #[must_use]
    pub const fn is_auto(self) -> bool {
        !matches!(self, Self::Manual)
    }

    /// Returns the stable snake-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::AutoToSynthesis => "auto_to_synthesis",
            Self::AutoToPublish => "auto_to_publish",
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Target of an automatic run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoMode {
    /// Run through video synthesis.
    ToSynthesis,
    /// Run through publishing.
    ToPublish,
}

impl AutoMode {
    /// Returns the builder mode for this run.
    #[must_use]
    pub const fn terminal_mode(self) -> TerminalMode {
        match self {
            Self::ToSynthesis => TerminalMode::ThroughSynthesis,
            Self::ToPublish => TerminalMode::ThroughPublish,
        }
    }

    /// Returns the execution mode held while the run advances.
    #[must_use]
    pub const fn execution_mode(self) -> ExecutionMode {
        match self {
            Self::ToSynthesis => ExecutionMode::AutoToSynthesis,
            Self::ToPublish => ExecutionMode::AutoToPublish,
        }
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Identifier of this run in logs and events.
    pub run_id: Uuid,
    /// The submitted main task.
    pub main_task_id: i64,
    /// Stages that succeeded, in order.
    pub completed: Vec<StageId>,
    /// True if a stop ended the run before its terminal stage.
    pub stopped: bool,
}
