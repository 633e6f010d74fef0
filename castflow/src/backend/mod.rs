//! Remote worker backend contract.
//!
//! [`TaskBackend`] mirrors the backend's task endpoints one method per
//! route. [`HttpTaskBackend`] is the production implementation; tests use
//! [`crate::testing::ScriptedBackend`] or the generated `MockTaskBackend`.

mod http;
pub mod wire;

pub use http::HttpTaskBackend;
pub use wire::{
    ApiEnvelope, CheckResponse, CreateTaskRequest, LinkParseRequest, PublishRequest,
    RemoteStatus, RewriteRequest, SubTaskDef, SubTaskType, SubTaskView, TaskView,
    TimbreSynthesisRequest, VideoSynthesisRequest,
};

use crate::errors::BackendError;
use async_trait::async_trait;

/// The task endpoints of the worker backend.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TaskBackend: Send + Sync {
    /// `POST /task/create`: creates a main task and one sub-task per stage.
    async fn create_task(&self, request: &CreateTaskRequest) -> Result<TaskView, BackendError>;

    /// `POST /task/linkParse`.
    async fn link_parse(&self, request: &LinkParseRequest) -> Result<(), BackendError>;

    /// `POST /task/rewrite`.
    async fn rewrite(&self, request: &RewriteRequest) -> Result<(), BackendError>;

    /// `POST /task/timbreSynthesis`.
    async fn timbre_synthesis(&self, request: &TimbreSynthesisRequest)
        -> Result<(), BackendError>;

    /// `POST /task/videoSynthesis`.
    async fn video_synthesis(&self, request: &VideoSynthesisRequest) -> Result<(), BackendError>;

    /// `POST /task/publish`.
    async fn publish(&self, request: &PublishRequest) -> Result<(), BackendError>;

    /// `GET /task/check?subTaskId=`.
    async fn check(&self, sub_task_id: i64) -> Result<CheckResponse, BackendError>;
}
