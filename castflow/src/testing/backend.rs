//! In-memory scripted backend.

use crate::backend::{
    CheckResponse, CreateTaskRequest, LinkParseRequest, PublishRequest, RemoteStatus,
    RewriteRequest, SubTaskView, TaskBackend, TaskView, TimbreSynthesisRequest,
    VideoSynthesisRequest,
};
use crate::catalog::StageId;
use crate::errors::BackendError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

/// One scripted answer to `task.check`. `Err` becomes a failed request.
pub type CheckStep = Result<CheckResponse, String>;

/// A call received by [`ScriptedBackend`].
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    /// `task.create`.
    CreateTask(CreateTaskRequest),
    /// `task.linkParse`.
    LinkParse(LinkParseRequest),
    /// `task.rewrite`.
    Rewrite(RewriteRequest),
    /// `task.timbreSynthesis`.
    TimbreSynthesis(TimbreSynthesisRequest),
    /// `task.videoSynthesis`.
    VideoSynthesis(VideoSynthesisRequest),
    /// `task.publish`.
    Publish(PublishRequest),
    /// `task.check`.
    Check(i64),
}

impl BackendCall {
    /// Returns the stage of a kickoff call.
    #[must_use]
    pub fn kickoff_stage(&self) -> Option<StageId> {
        match self {
            Self::LinkParse(_) => Some(StageId::ParseLink),
            Self::Rewrite(_) => Some(StageId::RewriteScript),
            Self::TimbreSynthesis(_) => Some(StageId::SynthesizeVoice),
            Self::VideoSynthesis(_) => Some(StageId::SynthesizeVideo),
            Self::Publish(_) => Some(StageId::Publish),
            Self::CreateTask(_) | Self::Check(_) => None,
        }
    }
}

#[derive(Default)]
struct State {
    next_task_id: i64,
    next_sub_task_id: i64,
    sub_task_stages: HashMap<i64, StageId>,
    scripts: HashMap<StageId, VecDeque<CheckStep>>,
    kickoff_failures: HashMap<StageId, String>,
    create_failure: Option<String>,
    calls: Vec<BackendCall>,
}

/// A [`TaskBackend`] that assigns ids, records every call and replays
/// scripted `task.check` answers per stage.
///
/// Without a script a stage succeeds on its first check with a canned
/// result. A script's last step repeats once the others are used up.
#[derive(Default)]
pub struct ScriptedBackend {
    state: Mutex<State>,
}

impl std::fmt::Debug for ScriptedBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedBackend")
            .field("calls", &self.state.lock().calls.len())
            .finish_non_exhaustive()
    }
}

impl ScriptedBackend {
    /// Creates a backend where every stage succeeds.
    #[must_use]
    pub fn new() -> Self {
        let backend = Self::default();
        {
            let mut state = backend.state.lock();
            state.next_task_id = 1;
            state.next_sub_task_id = 100;
        }
        backend
    }

    /// Returns the canned successful check for a stage.
    #[must_use]
    pub fn default_success(stage: StageId) -> CheckResponse {
        match stage {
            StageId::ParseLink => CheckResponse::success("parsed script", None),
            StageId::RewriteScript => CheckResponse::success("rewritten script", None),
            StageId::SynthesizeVoice => CheckResponse::success("/audio/101.wav", Some(101)),
            StageId::SynthesizeVideo => CheckResponse::success("/video/202.mp4", Some(202)),
            StageId::Publish => CheckResponse::success("published", None),
        }
    }

    /// Scripts the `task.check` answers for a stage.
    pub fn script(&self, stage: StageId, steps: impl IntoIterator<Item = CheckStep>) {
        self.state
            .lock()
            .scripts
            .insert(stage, steps.into_iter().collect());
    }

    /// Scripts `pending` non-terminal polls followed by `last`.
    pub fn script_after_pending(&self, stage: StageId, pending: usize, last: CheckStep) {
        let steps = std::iter::repeat_with(|| Ok(CheckResponse::status(RemoteStatus::Running)))
            .take(pending)
            .chain(std::iter::once(last));
        self.script(stage, steps);
    }

    /// Makes the kickoff call of a stage fail.
    pub fn fail_kickoff(&self, stage: StageId, message: impl Into<String>) {
        self.state
            .lock()
            .kickoff_failures
            .insert(stage, message.into());
    }

    /// Makes the next `task.create` fail.
    pub fn fail_next_create(&self, message: impl Into<String>) {
        self.state.lock().create_failure = Some(message.into());
    }

    /// Returns every call in order.
    #[must_use]
    pub fn calls(&self) -> Vec<BackendCall> {
        self.state.lock().calls.clone()
    }

    /// Returns the stages kicked off, in order.
    #[must_use]
    pub fn kickoffs(&self) -> Vec<StageId> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(BackendCall::kickoff_stage)
            .collect()
    }

    /// Returns the `task.create` requests received.
    #[must_use]
    pub fn create_requests(&self) -> Vec<CreateTaskRequest> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                BackendCall::CreateTask(request) => Some(request.clone()),
                _ => None,
            })
            .collect()
    }

    /// Returns how many status checks were made for a stage.
    #[must_use]
    pub fn check_count(&self, stage: StageId) -> usize {
        let state = self.state.lock();
        state
            .calls
            .iter()
            .filter(|call| {
                matches!(call, BackendCall::Check(id) if state.sub_task_stages.get(id) == Some(&stage))
            })
            .count()
    }

    fn kickoff(&self, stage: StageId, call: BackendCall) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        state.calls.push(call);
        match state.kickoff_failures.get(&stage) {
            Some(message) => Err(BackendError::Api {
                code: 500,
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl TaskBackend for ScriptedBackend {
    async fn create_task(&self, request: &CreateTaskRequest) -> Result<TaskView, BackendError> {
        let mut state = self.state.lock();
        state.calls.push(BackendCall::CreateTask(request.clone()));
        if let Some(message) = state.create_failure.take() {
            return Err(BackendError::Other(message));
        }

        let defs = request.stage_defs()?;
        let id = state.next_task_id;
        state.next_task_id += 1;

        let mut sub_tasks = Vec::with_capacity(defs.len());
        for (offset, def) in defs.iter().enumerate() {
            let sub_id = state.next_sub_task_id;
            state.next_sub_task_id += 1;
            state.sub_task_stages.insert(sub_id, StageId::from(def.task_type));
            sub_tasks.push(SubTaskView {
                id: sub_id,
                seq: i64::try_from(request.start_step + offset).unwrap_or(i64::MAX),
                task_type: def.task_type,
                status: RemoteStatus::None,
            });
        }

        Ok(TaskView {
            id,
            start_step: i64::try_from(request.start_step).unwrap_or(i64::MAX),
            sub_tasks,
        })
    }

    async fn link_parse(&self, request: &LinkParseRequest) -> Result<(), BackendError> {
        self.kickoff(StageId::ParseLink, BackendCall::LinkParse(request.clone()))
    }

    async fn rewrite(&self, request: &RewriteRequest) -> Result<(), BackendError> {
        self.kickoff(StageId::RewriteScript, BackendCall::Rewrite(request.clone()))
    }

    async fn timbre_synthesis(
        &self,
        request: &TimbreSynthesisRequest,
    ) -> Result<(), BackendError> {
        self.kickoff(
            StageId::SynthesizeVoice,
            BackendCall::TimbreSynthesis(request.clone()),
        )
    }

    async fn video_synthesis(&self, request: &VideoSynthesisRequest) -> Result<(), BackendError> {
        self.kickoff(
            StageId::SynthesizeVideo,
            BackendCall::VideoSynthesis(request.clone()),
        )
    }

    async fn publish(&self, request: &PublishRequest) -> Result<(), BackendError> {
        self.kickoff(StageId::Publish, BackendCall::Publish(request.clone()))
    }

    async fn check(&self, sub_task_id: i64) -> Result<CheckResponse, BackendError> {
        let mut state = self.state.lock();
        state.calls.push(BackendCall::Check(sub_task_id));
        let stage = state
            .sub_task_stages
            .get(&sub_task_id)
            .copied()
            .ok_or_else(|| BackendError::Api {
                code: 404,
                message: format!("sub-task {sub_task_id} not found"),
            })?;

        let step = match state.scripts.get_mut(&stage) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };
        match step {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(BackendError::Other(message)),
            None => Ok(Self::default_success(stage)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{SubTaskDef, SubTaskType};

    async fn create(backend: &ScriptedBackend, types: &[SubTaskType]) -> TaskView {
        let defs: Vec<SubTaskDef> = types
            .iter()
            .map(|t| SubTaskDef {
                task_type: *t,
                parameter: serde_json::json!({}),
            })
            .collect();
        backend
            .create_task(&CreateTaskRequest::new(1, &defs).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_assigns_ids_and_replays_script() {
        let backend = ScriptedBackend::new();
        let view = create(&backend, &[SubTaskType::CopyReproduce]).await;
        let sub_id = view.sub_tasks[0].id;

        backend.script(
            StageId::RewriteScript,
            vec![
                Err("timeout".to_string()),
                Ok(CheckResponse::failed("bad")),
            ],
        );
        assert!(backend.check(sub_id).await.is_err());
        assert_eq!(backend.check(sub_id).await.unwrap().status, RemoteStatus::Failed);
        // last step repeats
        assert_eq!(backend.check(sub_id).await.unwrap().status, RemoteStatus::Failed);
        assert_eq!(backend.check_count(StageId::RewriteScript), 3);
    }

    #[tokio::test]
    async fn test_default_success_and_unknown_sub_task() {
        let backend = ScriptedBackend::new();
        let view = create(&backend, &[SubTaskType::TimbreSynthesis]).await;
        let check = backend.check(view.sub_tasks[0].id).await.unwrap();
        assert_eq!(check.resource_id, Some(101));
        assert!(backend.check(9999).await.is_err());
    }

    #[tokio::test]
    async fn test_create_failure_is_one_shot() {
        let backend = ScriptedBackend::new();
        backend.fail_next_create("connection reset");
        let defs: Vec<SubTaskDef> = Vec::new();
        let request = CreateTaskRequest::new(0, &defs).unwrap();
        assert!(backend.create_task(&request).await.is_err());
        assert!(backend.create_task(&request).await.is_ok());
        assert_eq!(backend.create_requests().len(), 2);
    }
}
