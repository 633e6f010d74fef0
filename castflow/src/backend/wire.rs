//! Request and response shapes of the worker backend.

use crate::catalog::{PixelType, StageId};
use crate::core::SubTaskStatus;
use crate::errors::BackendError;
use serde::{Deserialize, Serialize};

/// Envelope code that means success.
pub const SUCCESS_CODE: i64 = 200;

/// Standard response envelope: `{ code, message, data }`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope<T> {
    /// Result code; `200` on success.
    pub code: i64,
    /// Human-readable message.
    #[serde(default)]
    pub message: String,
    /// Payload.
    pub data: Option<T>,
}

impl<T> ApiEnvelope<T> {
    /// Fails with [`BackendError::Api`] unless the code is `200`.
    pub fn ensure_ok(self) -> Result<Self, BackendError> {
        if self.code == SUCCESS_CODE {
            Ok(self)
        } else {
            Err(BackendError::Api {
                code: self.code,
                message: self.message,
            })
        }
    }

    /// Returns the payload of a successful envelope.
    pub fn into_data(self, what: &str) -> Result<T, BackendError> {
        self.ensure_ok()?
            .data
            .ok_or_else(|| BackendError::MissingData(what.to_string()))
    }
}

/// Sub-task type names used by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubTaskType {
    /// Link parsing.
    LinkParse,
    /// Script rewriting.
    CopyReproduce,
    /// Voice synthesis.
    TimbreSynthesis,
    /// Video synthesis.
    VideoSynthesis,
    /// Publishing.
    Publish,
}

impl From<StageId> for SubTaskType {
    fn from(stage: StageId) -> Self {
        match stage {
            StageId::ParseLink => Self::LinkParse,
            StageId::RewriteScript => Self::CopyReproduce,
            StageId::SynthesizeVoice => Self::TimbreSynthesis,
            StageId::SynthesizeVideo => Self::VideoSynthesis,
            StageId::Publish => Self::Publish,
        }
    }
}

impl From<SubTaskType> for StageId {
    fn from(kind: SubTaskType) -> Self {
        match kind {
            SubTaskType::LinkParse => Self::ParseLink,
            SubTaskType::CopyReproduce => Self::RewriteScript,
            SubTaskType::TimbreSynthesis => Self::SynthesizeVoice,
            SubTaskType::VideoSynthesis => Self::SynthesizeVideo,
            SubTaskType::Publish => Self::Publish,
        }
    }
}

/// Task status names used by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemoteStatus {
    /// Not yet scheduled.
    #[default]
    None,
    /// Queued.
    Pending,
    /// Executing.
    Running,
    /// Finished successfully.
    Success,
    /// Finished with an error.
    Failed,
    /// Cancelled.
    Canceled,
}

impl From<RemoteStatus> for SubTaskStatus {
    fn from(status: RemoteStatus) -> Self {
        match status {
            RemoteStatus::None | RemoteStatus::Pending => Self::Pending,
            RemoteStatus::Running => Self::Running,
            RemoteStatus::Success => Self::Success,
            RemoteStatus::Failed => Self::Failed,
            RemoteStatus::Canceled => Self::Canceled,
        }
    }
}

/// One entry of the encoded stage list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubTaskDef {
    /// Stage type.
    #[serde(rename = "type")]
    pub task_type: SubTaskType,
    /// Stage parameters.
    pub parameter: serde_json::Value,
}

/// Body of `POST /task/create`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    /// Sequence index of the first stage.
    pub start_step: usize,
    /// JSON-encoded array of [`SubTaskDef`].
    pub json: String,
    /// Sent as the `Idempotency-Key` header.
    #[serde(skip)]
    pub idempotency_key: Option<String>,
}

impl CreateTaskRequest {
    /// Encodes a stage list.
    pub fn new(start_step: usize, defs: &[SubTaskDef]) -> Result<Self, BackendError> {
        Ok(Self {
            start_step,
            json: serde_json::to_string(defs)?,
            idempotency_key: None,
        })
    }

    /// Sets the idempotency key.
    #[must_use]
    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    /// Decodes the stage list.
    pub fn stage_defs(&self) -> Result<Vec<SubTaskDef>, BackendError> {
        Ok(serde_json::from_str(&self.json)?)
    }
}

/// A sub-task as returned by `task.create`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubTaskView {
    /// Sub-task id.
    pub id: i64,
    /// Backend sequence number.
    #[serde(default)]
    pub seq: i64,
    /// Stage type.
    #[serde(rename = "type")]
    pub task_type: SubTaskType,
    /// Current status.
    #[serde(default)]
    pub status: RemoteStatus,
}

/// A main task as returned by `task.create`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskView {
    /// Main task id.
    pub id: i64,
    /// Echoed start step.
    #[serde(default)]
    pub start_step: i64,
    /// Created sub-tasks.
    #[serde(default)]
    pub sub_tasks: Vec<SubTaskView>,
}

/// Response of `GET /task/check`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResponse {
    /// Current status.
    #[serde(default)]
    pub status: RemoteStatus,
    /// Result text or path.
    #[serde(default)]
    pub result: Option<String>,
    /// Stored artifact handle.
    #[serde(default)]
    pub resource_id: Option<i64>,
    /// Failure message.
    #[serde(default)]
    pub message: Option<String>,
}

impl CheckResponse {
    /// A response with only a status.
    #[must_use]
    pub fn status(status: RemoteStatus) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    /// A successful response.
    #[must_use]
    pub fn success(result: impl Into<String>, resource_id: Option<i64>) -> Self {
        Self {
            status: RemoteStatus::Success,
            result: Some(result.into()),
            resource_id,
            message: None,
        }
    }

    /// A failed response.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: RemoteStatus::Failed,
            message: Some(message.into()),
            ..Self::default()
        }
    }

    /// Returns the failure message: `message`, then `result`, then a fixed fallback.
    #[must_use]
    pub fn failure_message(&self) -> String {
        [self.message.as_deref(), self.result.as_deref()]
            .into_iter()
            .flatten()
            .find(|text| !text.trim().is_empty())
            .unwrap_or("Task execution failed")
            .to_string()
    }

    /// Returns the raw payload of a successful check.
    ///
    /// A bare result is passed through unchanged; a result with a resource
    /// id is wrapped as `{"resourceId": .., "result": ..}`.
    #[must_use]
    pub fn raw_payload(&self) -> String {
        match self.resource_id {
            Some(resource_id) => serde_json::json!({
                "resourceId": resource_id,
                "result": self.result,
            })
            .to_string(),
            None => self.result.clone().unwrap_or_default(),
        }
    }
}

/// Body of `POST /task/linkParse`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkParseRequest {
    /// Target sub-task.
    pub sub_task_id: i64,
    /// Share link.
    pub link: String,
}

/// Body of `POST /task/rewrite`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewriteRequest {
    /// Target sub-task.
    pub sub_task_id: i64,
    /// Script text.
    pub content: String,
    /// Writing style.
    pub styles: String,
    /// Tone.
    pub tone: String,
    /// Extra instructions.
    pub extra_instructions: String,
}

/// Body of `POST /task/timbreSynthesis`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimbreSynthesisRequest {
    /// Target sub-task.
    pub sub_task_id: i64,
    /// Reference voice sample.
    pub audio_resource_id: i64,
    /// Text to speak.
    pub content: String,
    /// Emotion prompt.
    pub emotion_text: String,
}

/// Body of `POST /task/videoSynthesis`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoSynthesisRequest {
    /// Target sub-task.
    pub sub_task_id: i64,
    /// Narration audio.
    pub audio_resource_id: i64,
    /// Source video.
    pub video_resource_id: i64,
    /// Output ratio.
    pub pixel_type: PixelType,
}

/// Body of `POST /task/publish`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishRequest {
    /// Target sub-task.
    pub sub_task_id: i64,
    /// Video path.
    pub video_path: String,
    /// Optional title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Optional description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}
