//! Shared harness for coordinator integration tests.

#![allow(dead_code)]

use castflow::auth::AuthorizationState;
use castflow::catalog::{StageId, StageParams};
use castflow::config::CoordinatorConfig;
use castflow::events::CollectingEventSink;
use castflow::testing::{valid_params, ScriptedBackend, VirtualClock};
use castflow::workflow::WorkflowCoordinator;
use std::sync::Arc;

pub struct Harness {
    pub coordinator: Arc<WorkflowCoordinator>,
    pub backend: Arc<ScriptedBackend>,
    pub clock: Arc<VirtualClock>,
    pub auth: Arc<AuthorizationState>,
    pub events: Arc<CollectingEventSink>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(CoordinatorConfig::default())
    }

    pub fn with_config(config: CoordinatorConfig) -> Self {
        let backend = Arc::new(ScriptedBackend::new());
        let clock = Arc::new(VirtualClock::new());
        let auth = Arc::new(AuthorizationState::authorized());
        let events = Arc::new(CollectingEventSink::new());
        let coordinator = WorkflowCoordinator::new(config, backend.clone(), auth.clone())
            .with_clock(clock.clone())
            .with_event_sink(events.clone());
        Self {
            coordinator: Arc::new(coordinator),
            backend,
            clock,
            auth,
            events,
        }
    }

    /// Fills only what no upstream stage produces: the link, the reference
    /// voice and the source video.
    pub fn fill_user_inputs(&self) {
        self.fill(StageId::ParseLink);
        self.coordinator
            .edit_params(StageId::SynthesizeVoice, |params| {
                if let StageParams::SynthesizeVoice(p) = params {
                    p.audio_resource_id = Some(11);
                }
            });
        self.coordinator
            .edit_params(StageId::SynthesizeVideo, |params| {
                if let StageParams::SynthesizeVideo(p) = params {
                    p.video_resource_id = Some(7);
                }
            });
    }

    pub fn fill(&self, stage: StageId) {
        let value = valid_params(stage);
        self.coordinator.edit_params(stage, |params| *params = value);
    }

    pub fn set(&self, params: StageParams) {
        self.coordinator
            .edit_params(params.stage_id(), |slot| *slot = params);
    }
}
