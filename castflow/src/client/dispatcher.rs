//! Stage kickoff calls.

use crate::auth::AuthorizationSignal;
use crate::backend::{
    LinkParseRequest, PublishRequest, RewriteRequest, TaskBackend, TimbreSynthesisRequest,
    VideoSynthesisRequest,
};
use crate::catalog::{self, StageId, StageParams};
use crate::errors::{CastflowError, DispatchError, PreconditionError, ValidationError};
use std::sync::Arc;

/// Tracing target for stage dispatch.
pub const TRACING_TARGET: &str = "castflow::client::dispatch";

/// Issues the stage-specific kickoff call for a sub-task.
///
/// Kickoff is fire-and-forget; completion is observed by polling.
#[derive(Clone)]
pub struct StageDispatcher {
    backend: Arc<dyn TaskBackend>,
    auth: Arc<dyn AuthorizationSignal>,
}

impl std::fmt::Debug for StageDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageDispatcher")
            .field("authorized", &self.auth.is_authorized())
            .finish_non_exhaustive()
    }
}

impl StageDispatcher {
    /// Creates a dispatcher.
    #[must_use]
    pub fn new(backend: Arc<dyn TaskBackend>, auth: Arc<dyn AuthorizationSignal>) -> Self {
        Self { backend, auth }
    }

    /// Checks everything that can be checked without the network.
    ///
    /// Publishing requires the authorization signal; every stage requires
    /// valid parameters.
    pub fn preflight(&self, stage: StageId, params: &StageParams) -> Result<(), CastflowError> {
        if stage == StageId::Publish && !self.auth.is_authorized() {
            return Err(PreconditionError::not_authorized(stage).into());
        }
        catalog::validate(stage, params)?;
        Ok(())
    }

    /// Kicks off `stage` on sub-task `sub_task_id`.
    pub async fn dispatch(
        &self,
        sub_task_id: i64,
        stage: StageId,
        params: &StageParams,
    ) -> Result<(), CastflowError> {
        self.preflight(stage, params)?;

        tracing::info!(target: TRACING_TARGET, sub_task_id, %stage, "Dispatching stage");

        let result = match params {
            StageParams::ParseLink(p) => {
                self.backend
                    .link_parse(&LinkParseRequest {
                        sub_task_id,
                        link: p.link.clone(),
                    })
                    .await
            }
            StageParams::RewriteScript(p) => {
                self.backend
                    .rewrite(&RewriteRequest {
                        sub_task_id,
                        content: p.content.clone(),
                        styles: p.styles.clone(),
                        tone: p.tone.clone(),
                        extra_instructions: p.extra_instructions.clone(),
                    })
                    .await
            }
            StageParams::SynthesizeVoice(p) => {
                let audio_resource_id = required(stage, "audioResourceId", p.audio_resource_id)?;
                self.backend
                    .timbre_synthesis(&TimbreSynthesisRequest {
                        sub_task_id,
                        audio_resource_id,
                        content: p.content.clone(),
                        emotion_text: p.emotion_text.clone(),
                    })
                    .await
            }
            StageParams::SynthesizeVideo(p) => {
                let audio_resource_id = required(stage, "audioResourceId", p.audio_resource_id)?;
                let video_resource_id = required(stage, "videoResourceId", p.video_resource_id)?;
                self.backend
                    .video_synthesis(&VideoSynthesisRequest {
                        sub_task_id,
                        audio_resource_id,
                        video_resource_id,
                        pixel_type: p.pixel_type,
                    })
                    .await
            }
            StageParams::Publish(p) => {
                self.backend
                    .publish(&PublishRequest {
                        sub_task_id,
                        video_path: p.video_path.clone(),
                        title: p.title.clone().filter(|t| !t.is_empty()),
                        description: p.description.clone().filter(|d| !d.is_empty()),
                    })
                    .await
            }
        };

        result.map_err(|source| {
            tracing::warn!(
                target: TRACING_TARGET,
                sub_task_id,
                %stage,
                error = %source,
                "Stage kickoff failed"
            );
            CastflowError::from(DispatchError {
                stage,
                sub_task_id,
                source,
            })
        })
    }
}

fn required(stage: StageId, field: &str, value: Option<i64>) -> Result<i64, ValidationError> {
    value.ok_or_else(|| ValidationError::missing(stage, field))
}
