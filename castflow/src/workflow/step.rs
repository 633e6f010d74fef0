//! Per-stage status as shown to the user.

use crate::catalog::{self, StageId};
use crate::core::{StageResult, StepStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Status, error and last result of one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStepInfo {
    /// The stage.
    pub stage_id: StageId,
    /// Display name.
    pub name: &'static str,
    /// Short description.
    pub description: &'static str,
    /// Current status.
    pub status: StepStatus,
    /// Failure message, set only while the step is in error.
    pub error: Option<String>,
    /// Result of the last successful run, kept across resets.
    pub result: Option<StageResult>,
    /// Sub-task driving the current or last attempt.
    pub sub_task_id: Option<i64>,
    /// When the current or last attempt was dispatched.
    pub started_at: Option<DateTime<Utc>>,
    /// When the current or last attempt ended.
    pub finished_at: Option<DateTime<Utc>>,
}

impl WorkflowStepInfo {
    /// Creates the initial, pending step for a stage.
    #[must_use]
    pub fn new(stage: StageId) -> Self {
        let definition = catalog::definition(stage);
        Self {
            stage_id: stage,
            name: definition.display_name,
            description: definition.description,
            status: StepStatus::Pending,
            error: None,
            result: None,
            sub_task_id: None,
            started_at: None,
            finished_at: None,
        }
    }

    /// Returns the initial steps for all stages.
    #[must_use]
    pub fn initial() -> Vec<Self> {
        StageId::ALL.into_iter().map(Self::new).collect()
    }

    fn transition(&mut self, next: StepStatus) -> bool {
        if !self.status.can_transition(next) {
            tracing::debug!(
                target: super::TRACING_TARGET,
                stage = %self.stage_id,
                from = ?self.status,
                to = ?next,
                "Ignoring invalid step transition"
            );
            return false;
        }
        self.status = next;
        true
    }

    /// Clears the error of a failed step. The stored result is kept.
    pub fn reset(&mut self) -> bool {
        if self.status != StepStatus::Error {
            return false;
        }
        self.transition(StepStatus::Pending);
        self.error = None;
        true
    }

    /// Marks the step running for a new sub-task.
    ///
    /// A succeeded step is re-armed first. A step in error is left alone
    /// until [`reset`](Self::reset) clears it.
    pub fn begin(&mut self, sub_task_id: i64) -> bool {
        if self.status == StepStatus::Success {
            self.transition(StepStatus::Pending);
        }
        if !self.transition(StepStatus::Running) {
            return false;
        }
        self.error = None;
        self.sub_task_id = Some(sub_task_id);
        self.started_at = Some(Utc::now());
        self.finished_at = None;
        true
    }

    /// Records a successful result.
    pub fn succeed(&mut self, result: StageResult) -> bool {
        if !self.transition(StepStatus::Success) {
            return false;
        }
        self.result = Some(result);
        self.finished_at = Some(Utc::now());
        true
    }

    /// Records a failure message.
    pub fn fail(&mut self, message: impl Into<String>) -> bool {
        if !self.transition(StepStatus::Error) {
            return false;
        }
        self.error = Some(message.into());
        self.finished_at = Some(Utc::now());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_steps_follow_catalog() {
        let steps = WorkflowStepInfo::initial();
        assert_eq!(steps.len(), StageId::COUNT);
        assert_eq!(steps[2].name, "Synthesize Voice");
        assert!(steps.iter().all(|s| s.status == StepStatus::Pending));
    }

    #[test]
    fn test_failure_then_reset_keeps_result() {
        let mut step = WorkflowStepInfo::new(StageId::RewriteScript);
        assert!(step.begin(10));
        assert!(step.succeed(StageResult::from_raw("first")));

        assert!(step.begin(11));
        assert!(step.result.is_some());
        assert!(step.fail("资源不存在"));
        assert_eq!(step.error.as_deref(), Some("资源不存在"));

        assert!(step.reset());
        assert_eq!(step.status, StepStatus::Pending);
        assert!(step.error.is_none());
        assert_eq!(step.result.as_ref().map(|r| r.raw_payload.as_str()), Some("first"));
    }

    #[test]
    fn test_failed_step_does_not_begin_without_reset() {
        let mut step = WorkflowStepInfo::new(StageId::ParseLink);
        assert!(step.begin(1));
        assert!(step.fail("链接无效"));

        assert!(!step.begin(2));
        assert_eq!(step.status, StepStatus::Error);
        assert_eq!(step.sub_task_id, Some(1));

        assert!(step.reset());
        assert!(step.begin(2));
        assert_eq!(step.status, StepStatus::Running);
    }

    #[test]
    fn test_invalid_transitions_are_ignored() {
        let mut step = WorkflowStepInfo::new(StageId::Publish);
        assert!(!step.succeed(StageResult::from_raw("x")));
        assert!(!step.fail("x"));
        assert!(!step.reset());
        assert_eq!(step.status, StepStatus::Pending);
        assert!(step.finished_at.is_none());
    }
}
