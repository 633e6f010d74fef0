//! # Castflow
//!
//! Coordinator for a five-stage, remotely executed content pipeline:
//! link parsing, script rewriting, voice synthesis, video synthesis and
//! publishing.
//!
//! Every stage is a long-running job on a worker backend. Castflow builds
//! the list of stages to run, submits it as one main task, then drives each
//! sub-task through kickoff and status polling, copying the typed result of
//! stage *n* into the parameters of stage *n+1* before it is dispatched.
//!
//! - **Stage catalog**: ordered stage definitions with deterministic validation
//! - **Pipeline builder**: parameter snapshots for single-step or automatic runs
//! - **Status polling**: tiered interval widening with error backoff and cancellation
//! - **Result propagation**: fixed source-to-target field table with an edit policy
//! - **Workflow coordinator**: per-stage status, execution mode, stop and reset
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use castflow::prelude::*;
//! use std::sync::Arc;
//!
//! let config = CoordinatorConfig::from_env()?;
//! let backend = Arc::new(HttpTaskBackend::new(config.backend.clone())?);
//! let auth = Arc::new(AuthorizationState::new());
//! let coordinator = WorkflowCoordinator::new(config, backend, auth);
//!
//! coordinator.edit_params(StageId::ParseLink, |params| {
//!     if let StageParams::ParseLink(p) = params {
//!         p.link = "https://v.douyin.com/abc/".into();
//!     }
//! });
//! let report = coordinator.run_auto(AutoMode::ToSynthesis).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod auth;
pub mod backend;
pub mod cancellation;
pub mod catalog;
pub mod client;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod polling;
pub mod propagation;
pub mod testing;
pub mod workflow;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::auth::{AuthorizationSignal, AuthorizationState};
    pub use crate::backend::{HttpTaskBackend, TaskBackend};
    pub use crate::cancellation::CancellationToken;
    pub use crate::catalog::{
        PixelType, ParseLinkParams, PublishParams, RewriteParams, StageDefinition, StageId,
        StageParams, VideoParams, VoiceParams,
    };
    pub use crate::client::{StageDispatcher, TaskSubmissionClient};
    pub use crate::config::{
        BackendConfig, CoordinatorConfig, LogConfig, PropagationConfig, WorkflowConfig,
    };
    pub use crate::core::{
        MainTask, ParsedPayload, StageOutcome, StageResult, StepStatus, SubTaskRef,
        SubTaskStatus,
    };
    pub use crate::errors::{
        BackendError, CastflowError, ConfigError, DispatchError, PollError, PreconditionError,
        RangeError, SubmissionError, ValidationError,
    };
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::pipeline::{PipelineBuilder, StageRequest, TerminalMode};
    pub use crate::polling::{Clock, PollConfig, PollState, StatusPoller, TokioClock};
    pub use crate::propagation::{PropagationPolicy, ResultPropagator};
    pub use crate::workflow::{
        AutoMode, ExecutionMode, RunReport, StageForms, WorkflowCoordinator, WorkflowStepInfo,
    };
}
