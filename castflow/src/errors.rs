//! Error types for the castflow coordinator.
//!
//! Local checks (validation, preconditions, range) never reach the backend
//! and are never retried automatically. Remote failures are split by the
//! call that produced them: task creation, stage kickoff, status polling,
//! or a terminal `FAILED` status reported by the backend.

use crate::catalog::StageId;
use serde_json::json;
use std::collections::HashMap;
use thiserror::Error;

/// The main error type for castflow operations.
#[derive(Debug, Error)]
pub enum CastflowError {
    /// Stage parameters failed local validation.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// A local precondition (such as account authorization) is not met.
    #[error("{0}")]
    Precondition(#[from] PreconditionError),

    /// The requested start step does not exist for the terminal mode.
    #[error("{0}")]
    Range(#[from] RangeError),

    /// The main task could not be created.
    #[error("{0}")]
    Submission(#[from] SubmissionError),

    /// A stage kickoff call failed.
    #[error("{0}")]
    Dispatch(#[from] DispatchError),

    /// Polling gave up after hitting a configured ceiling.
    #[error("{0}")]
    Poll(#[from] PollError),

    /// The backend reported a terminal failure for a stage.
    #[error("Stage {stage} failed: {message}")]
    StageFailed {
        /// The failed stage.
        stage: StageId,
        /// The backend message, verbatim.
        message: String,
    },

    /// The active sub-task was cancelled.
    #[error("Stage {stage} cancelled: {reason}")]
    Cancelled {
        /// The cancelled stage.
        stage: StageId,
        /// The cancellation reason.
        reason: String,
    },

    /// Another run is already in progress on this coordinator.
    #[error("A pipeline run is already in progress")]
    Busy,

    /// Invalid configuration.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// A backend call failed outside of a stage context.
    #[error("{0}")]
    Backend(#[from] BackendError),

    /// The tracing subscriber could not be installed.
    #[error("Logging initialisation failed: {0}")]
    Logging(String),
}

impl CastflowError {
    /// Returns a stable, machine-readable tag for the error class.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Precondition(_) => "precondition",
            Self::Range(_) => "range",
            Self::Submission(_) => "submission",
            Self::Dispatch(_) => "dispatch",
            Self::Poll(_) => "poll",
            Self::StageFailed { .. } => "stage_failure",
            Self::Cancelled { .. } => "cancelled",
            Self::Busy => "busy",
            Self::Config(_) => "config",
            Self::Backend(_) => "backend",
            Self::Logging(_) => "logging",
        }
    }

    /// Returns true if resubmitting the same run may succeed without user action.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Submission(err) => err.retryable,
            Self::Dispatch(err) => err.source.is_retryable(),
            Self::Backend(err) => err.is_retryable(),
            _ => false,
        }
    }

    /// Returns the stage the error is attributed to, if any.
    #[must_use]
    pub fn stage(&self) -> Option<StageId> {
        match self {
            Self::Validation(err) => Some(err.stage),
            Self::Precondition(err) => Some(err.stage),
            Self::Dispatch(err) => Some(err.stage),
            Self::StageFailed { stage, .. } | Self::Cancelled { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Converts to a dictionary representation for event payloads.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("kind".to_string(), json!(self.kind()));
        map.insert("message".to_string(), json!(self.to_string()));
        map.insert("retryable".to_string(), json!(self.is_retryable()));
        if let Some(stage) = self.stage() {
            map.insert("stage".to_string(), json!(stage));
        }
        map
    }
}

/// Error raised when a stage's parameters fail local validation.
///
/// Never sent to the backend; the user must correct the parameters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ValidationError {
    /// The stage whose parameters are invalid.
    pub stage: StageId,
    /// The first offending field, in declaration order.
    pub field: String,
    /// Human-readable message naming the stage and field.
    pub message: String,
}

impl ValidationError {
    /// Creates a "required field missing" error.
    #[must_use]
    pub fn missing(stage: StageId, field: impl Into<String>) -> Self {
        let field = field.into();
        let message = format!("{}: {} is required", stage.display_name(), field);
        Self {
            stage,
            field,
            message,
        }
    }

    /// Creates an error for parameters that belong to a different stage.
    #[must_use]
    pub fn mismatched(stage: StageId, supplied: StageId) -> Self {
        Self {
            stage,
            field: String::new(),
            message: format!(
                "{}: received parameters for {}",
                stage.display_name(),
                supplied.display_name()
            ),
        }
    }
}

/// Error raised when a local precondition for a stage is not met.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{stage}: {message}")]
pub struct PreconditionError {
    /// The gated stage.
    pub stage: StageId,
    /// What is missing.
    pub message: String,
}

impl PreconditionError {
    /// Creates a new precondition error.
    #[must_use]
    pub fn new(stage: StageId, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }

    /// The publishing account has not been authorized yet.
    #[must_use]
    pub fn not_authorized(stage: StageId) -> Self {
        Self::new(stage, "account authorization is required before publishing")
    }

    /// The stage failed earlier and has not been reset.
    #[must_use]
    pub fn needs_reset(stage: StageId) -> Self {
        Self::new(stage, "stage is in error; reset it before running again")
    }
}

/// Error raised when a start step is outside the range a terminal mode allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("start step {start_step} is out of range 0..={max_step}")]
pub struct RangeError {
    /// The requested start step.
    pub start_step: usize,
    /// The highest start step the terminal mode accepts.
    pub max_step: usize,
}

/// Error raised when the main task could not be created.
///
/// No partial main task exists after this error; callers resubmit the
/// full stage list.
#[derive(Debug, Error)]
#[error("Task submission failed: {message}")]
pub struct SubmissionError {
    /// Description of the failure.
    pub message: String,
    /// Whether resubmitting may succeed.
    pub retryable: bool,
    /// The underlying backend error, if any.
    #[source]
    pub source: Option<BackendError>,
}

impl SubmissionError {
    /// The backend call itself failed.
    #[must_use]
    pub fn from_backend(err: BackendError) -> Self {
        Self {
            message: err.to_string(),
            retryable: err.is_retryable(),
            source: Some(err),
        }
    }

    /// The backend answered with a task that does not match the submission.
    #[must_use]
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
            source: None,
        }
    }
}

/// Error raised when a stage kickoff call fails.
#[derive(Debug, Error)]
#[error("Dispatch of {stage} (sub-task {sub_task_id}) failed: {source}")]
pub struct DispatchError {
    /// The stage being dispatched.
    pub stage: StageId,
    /// The remote sub-task id.
    pub sub_task_id: i64,
    /// The underlying backend error.
    #[source]
    pub source: BackendError,
}

/// Errors produced while polling a sub-task.
#[derive(Debug, Error)]
pub enum PollError {
    /// A single status request failed; polling continues with a wider interval.
    #[error("Status check for sub-task {sub_task_id} failed: {source}")]
    Transient {
        /// The polled sub-task.
        sub_task_id: i64,
        /// The underlying backend error.
        #[source]
        source: BackendError,
    },

    /// The configured maximum wait elapsed without a terminal status.
    #[error("Sub-task {sub_task_id} did not finish within {elapsed_ms} ms ({polls} polls)")]
    Exhausted {
        /// The polled sub-task.
        sub_task_id: i64,
        /// Time spent polling.
        elapsed_ms: u64,
        /// Number of scheduled polls issued.
        polls: u32,
    },

    /// Too many consecutive status requests failed.
    #[error("Sub-task {sub_task_id} status unavailable after {errors} consecutive errors: {last_error}")]
    TooManyErrors {
        /// The polled sub-task.
        sub_task_id: i64,
        /// Consecutive failures observed.
        errors: u32,
        /// The last error message.
        last_error: String,
    },
}

/// Errors returned by the remote worker backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Transport-level failure.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status.
    #[error("HTTP {status}: {body}")]
    Status {
        /// The HTTP status code.
        status: u16,
        /// A prefix of the response body.
        body: String,
    },

    /// The response envelope carried a non-success code.
    #[error("Backend error {code}: {message}")]
    Api {
        /// The envelope code.
        code: i64,
        /// The envelope message.
        message: String,
    },

    /// The response body could not be decoded.
    #[error("Invalid response body: {0}")]
    Decode(#[from] serde_json::Error),

    /// The envelope was successful but carried no data.
    #[error("Response for {0} carried no data")]
    MissingData(String),

    /// Failure produced by an in-process backend.
    #[error("{0}")]
    Other(String),
}

impl BackendError {
    /// Returns true for failures that may go away on their own.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(err) => err.is_timeout() || err.is_connect() || err.is_request(),
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Other(_) => true,
            Self::Api { .. } | Self::Decode(_) | Self::MissingData(_) => false,
        }
    }
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read config file {path}: {source}")]
    Read {
        /// The file path.
        path: String,
        /// The IO error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for the expected shape.
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        /// The file path.
        path: String,
        /// The parse error.
        #[source]
        source: serde_json::Error,
    },

    /// An environment variable had an unusable value.
    #[error("Invalid value for {name}: {value}")]
    Env {
        /// The variable name.
        name: String,
        /// The offending value.
        value: String,
    },

    /// A value is outside its allowed range.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
