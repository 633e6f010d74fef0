//! Main task and sub-task references.

use super::SubTaskStatus;
use crate::catalog::StageId;
use serde::{Deserialize, Serialize};

/// One stage instance within a main task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubTaskRef {
    /// Remote-assigned id.
    pub id: i64,
    /// Position in the pipeline (0-4).
    pub sequence_index: usize,
    /// The stage this sub-task runs.
    pub stage_id: StageId,
    /// Last known status.
    pub status: SubTaskStatus,
    /// The `seq` value reported by the backend.
    pub remote_seq: i64,
}

/// One submitted run of contiguous stages.
///
/// Immutable once created; resuming after a failure needs a new main task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MainTask {
    /// Remote-assigned id.
    pub id: i64,
    /// Sequence index of the first included stage.
    pub start_step: usize,
    sub_tasks: Vec<SubTaskRef>,
}

impl MainTask {
    /// Creates a main task, checking that sub-task indices are contiguous
    /// from `start_step`.
    ///
    /// Returns `None` when the list is empty or has a gap.
    #[must_use]
    pub fn new(id: i64, start_step: usize, sub_tasks: Vec<SubTaskRef>) -> Option<Self> {
        if sub_tasks.is_empty() {
            return None;
        }
        let contiguous = sub_tasks
            .iter()
            .enumerate()
            .all(|(offset, sub)| {
                sub.sequence_index == start_step + offset
                    && sub.stage_id.sequence_index() == sub.sequence_index
            });
        contiguous.then_some(Self {
            id,
            start_step,
            sub_tasks,
        })
    }

    /// Returns the sub-tasks in execution order.
    #[must_use]
    pub fn sub_tasks(&self) -> &[SubTaskRef] {
        &self.sub_tasks
    }

    /// Returns the sub-task for a stage, if the stage is part of this task.
    #[must_use]
    pub fn sub_task(&self, stage: StageId) -> Option<&SubTaskRef> {
        self.sub_tasks.iter().find(|sub| sub.stage_id == stage)
    }

    /// Records the last known status of a sub-task.
    ///
    /// The stage list itself never changes. Returns false for an unknown id.
    pub(crate) fn record_status(&mut self, sub_task_id: i64, status: SubTaskStatus) -> bool {
        match self.sub_tasks.iter_mut().find(|sub| sub.id == sub_task_id) {
            Some(sub) => {
                sub.status = status;
                true
            }
            None => false,
        }
    }

    /// Returns the sequence index of the last included stage.
    #[must_use]
    pub fn end_step(&self) -> usize {
        self.start_step + self.sub_tasks.len() - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sub(id: i64, stage: StageId) -> SubTaskRef {
        SubTaskRef {
            id,
            sequence_index: stage.sequence_index(),
            stage_id: stage,
            status: SubTaskStatus::Pending,
            remote_seq: i64::try_from(stage.sequence_index()).unwrap(),
        }
    }

    #[test]
    fn test_main_task_contiguous() {
        let task = MainTask::new(
            9,
            2,
            vec![
                sub(1, StageId::SynthesizeVoice),
                sub(2, StageId::SynthesizeVideo),
            ],
        )
        .unwrap();
        assert_eq!(task.end_step(), 3);
        assert_eq!(task.sub_task(StageId::SynthesizeVideo).unwrap().id, 2);
        assert!(task.sub_task(StageId::Publish).is_none());
    }

    #[test]
    fn test_main_task_rejects_gap_and_empty() {
        assert!(MainTask::new(1, 0, vec![]).is_none());
        assert!(MainTask::new(
            1,
            0,
            vec![sub(1, StageId::ParseLink), sub(2, StageId::SynthesizeVoice)]
        )
        .is_none());
        assert!(MainTask::new(1, 1, vec![sub(1, StageId::ParseLink)]).is_none());
    }

    #[test]
    fn test_record_status_updates_only_known_sub_tasks() {
        let mut task = MainTask::new(3, 0, vec![sub(7, StageId::ParseLink)]).unwrap();
        assert!(task.record_status(7, SubTaskStatus::Canceled));
        assert!(!task.record_status(8, SubTaskStatus::Failed));
        assert_eq!(task.sub_tasks()[0].status, SubTaskStatus::Canceled);
        assert_eq!(task.sub_tasks().len(), 1);
    }
}
