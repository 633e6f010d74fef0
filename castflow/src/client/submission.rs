//! Main task submission.

use crate::backend::{CreateTaskRequest, SubTaskDef, SubTaskType, TaskBackend};
use crate::catalog::StageId;
use crate::core::{MainTask, SubTaskRef};
use crate::errors::SubmissionError;
use crate::pipeline::{PipelineBuilder, StageRequest};
use std::sync::Arc;

/// Tracing target for task submission.
pub const TRACING_TARGET: &str = "castflow::client::submission";

/// Submits a built stage list as one main task.
#[derive(Clone)]
pub struct TaskSubmissionClient {
    backend: Arc<dyn TaskBackend>,
}

impl std::fmt::Debug for TaskSubmissionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskSubmissionClient").finish_non_exhaustive()
    }
}

impl TaskSubmissionClient {
    /// Creates a submission client.
    #[must_use]
    pub fn new(backend: Arc<dyn TaskBackend>) -> Self {
        Self { backend }
    }

    /// Creates a main task for `requests`.
    ///
    /// The response must contain exactly one sub-task per request, in
    /// submission order and with matching stage types; otherwise no main
    /// task is returned and the whole list has to be resubmitted.
    pub async fn submit(
        &self,
        start_step: usize,
        requests: &[StageRequest],
    ) -> Result<MainTask, SubmissionError> {
        match requests.first() {
            None => return Err(SubmissionError::invalid_response("no stages to submit")),
            Some(first) if first.sequence_index != start_step => {
                return Err(SubmissionError::invalid_response(format!(
                    "first stage index {} does not match start step {start_step}",
                    first.sequence_index
                )));
            }
            Some(_) => {}
        }

        let defs: Vec<SubTaskDef> = requests
            .iter()
            .map(|request| SubTaskDef {
                task_type: request.stage_id.into(),
                parameter: request.params.to_parameter(),
            })
            .collect();
        let key = PipelineBuilder::submission_key(start_step, requests);
        let create = CreateTaskRequest::new(start_step, &defs)
            .map_err(SubmissionError::from_backend)?
            .with_idempotency_key(key.clone());

        tracing::info!(
            target: TRACING_TARGET,
            start_step,
            stages = requests.len(),
            idempotency_key = %key,
            "Submitting main task"
        );

        let view = self
            .backend
            .create_task(&create)
            .await
            .map_err(SubmissionError::from_backend)?;

        if view.sub_tasks.len() != requests.len() {
            return Err(SubmissionError::invalid_response(format!(
                "expected {} sub-tasks, backend created {}",
                requests.len(),
                view.sub_tasks.len()
            )));
        }

        let mut sub_tasks = Vec::with_capacity(requests.len());
        for (offset, (request, remote)) in requests.iter().zip(&view.sub_tasks).enumerate() {
            let expected = SubTaskType::from(request.stage_id);
            if remote.task_type != expected {
                return Err(SubmissionError::invalid_response(format!(
                    "sub-task {} has type {:?}, expected {:?}",
                    remote.id, remote.task_type, expected
                )));
            }
            sub_tasks.push(SubTaskRef {
                id: remote.id,
                sequence_index: start_step + offset,
                stage_id: StageId::from(remote.task_type),
                status: remote.status.into(),
                remote_seq: remote.seq,
            });
        }

        let task = MainTask::new(view.id, start_step, sub_tasks).ok_or_else(|| {
            SubmissionError::invalid_response("submitted stages are not contiguous")
        })?;

        tracing::info!(
            target: TRACING_TARGET,
            main_task_id = task.id,
            sub_task_ids = ?task.sub_tasks().iter().map(|s| s.id).collect::<Vec<_>>(),
            "Main task created"
        );
        Ok(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MockTaskBackend, RemoteStatus, SubTaskView, TaskView};
    use crate::errors::BackendError;
    use crate::pipeline::{default_snapshot, TerminalMode};

    fn view(id: i64, start: usize, types: &[SubTaskType]) -> TaskView {
        TaskView {
            id,
            start_step: i64::try_from(start).unwrap(),
            sub_tasks: types
                .iter()
                .enumerate()
                .map(|(i, t)| SubTaskView {
                    id: 100 + i64::try_from(i).unwrap(),
                    seq: i64::try_from(i).unwrap(),
                    task_type: *t,
                    status: RemoteStatus::None,
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_submit_assigns_ids_in_order() {
        let requests =
            PipelineBuilder::build(2, TerminalMode::ThroughPublish, &default_snapshot()).unwrap();
        let mut mock = MockTaskBackend::new();
        mock.expect_create_task()
            .withf(|req| {
                req.start_step == 2
                    && req.idempotency_key.is_some()
                    && req.stage_defs().map(|d| d.len()).unwrap_or(0) == 3
            })
            .times(1)
            .returning(|_| {
                Ok(view(
                    9,
                    2,
                    &[
                        SubTaskType::TimbreSynthesis,
                        SubTaskType::VideoSynthesis,
                        SubTaskType::Publish,
                    ],
                ))
            });

        let task = TaskSubmissionClient::new(Arc::new(mock))
            .submit(2, &requests)
            .await
            .unwrap();
        assert_eq!(task.id, 9);
        let indices: Vec<usize> = task.sub_tasks().iter().map(|s| s.sequence_index).collect();
        assert_eq!(indices, vec![2, 3, 4]);
        assert_eq!(task.sub_tasks()[0].id, 100);
        assert_eq!(task.sub_tasks()[2].stage_id, StageId::Publish);
    }

    #[tokio::test]
    async fn test_submit_rejects_count_mismatch() {
        let requests =
            PipelineBuilder::build(0, TerminalMode::ThroughSynthesis, &default_snapshot()).unwrap();
        let mut mock = MockTaskBackend::new();
        mock.expect_create_task()
            .returning(|_| Ok(view(1, 0, &[SubTaskType::LinkParse])));

        let err = TaskSubmissionClient::new(Arc::new(mock))
            .submit(0, &requests)
            .await
            .unwrap_err();
        assert!(err.retryable);
        assert!(err.message.contains("expected 4"));
    }

    #[tokio::test]
    async fn test_submit_rejects_type_mismatch() {
        let requests =
            PipelineBuilder::build(0, TerminalMode::SingleStep, &default_snapshot()).unwrap();
        let mut mock = MockTaskBackend::new();
        mock.expect_create_task()
            .returning(|_| Ok(view(1, 0, &[SubTaskType::Publish])));

        let err = TaskSubmissionClient::new(Arc::new(mock))
            .submit(0, &requests)
            .await
            .unwrap_err();
        assert!(err.message.contains("expected LinkParse"));
    }

    #[tokio::test]
    async fn test_submit_network_failure_is_retryable() {
        let requests =
            PipelineBuilder::build(0, TerminalMode::SingleStep, &default_snapshot()).unwrap();
        let mut mock = MockTaskBackend::new();
        mock.expect_create_task()
            .returning(|_| Err(BackendError::Status { status: 502, body: String::new() }));

        let err = TaskSubmissionClient::new(Arc::new(mock))
            .submit(0, &requests)
            .await
            .unwrap_err();
        assert!(err.retryable);
        assert!(err.source.is_some());
    }

    #[tokio::test]
    async fn test_submit_empty_list_rejected_locally() {
        let mut mock = MockTaskBackend::new();
        mock.expect_create_task().never();
        let err = TaskSubmissionClient::new(Arc::new(mock))
            .submit(0, &[])
            .await
            .unwrap_err();
        assert!(err.source.is_none());
    }
}
