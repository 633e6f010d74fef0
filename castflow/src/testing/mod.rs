//! Testing utilities for castflow.
//!
//! This module provides:
//! - [`ScriptedBackend`]: in-memory backend with per-stage scripted status checks
//! - [`VirtualClock`]: clock whose sleeps are instant and recorded
//! - Fixtures for valid stage parameters

mod backend;
mod clock;

pub use backend::{BackendCall, CheckStep, ScriptedBackend};
pub use clock::VirtualClock;

use crate::catalog::{PixelType, StageId, StageParams};

/// Sample share link accepted by the link parser.
pub const SAMPLE_LINK: &str = "https://v.douyin.com/iRNBho6u/";

/// Returns parameters that pass validation for `stage`.
#[must_use]
pub fn valid_params(stage: StageId) -> StageParams {
    let mut params = StageParams::default_for(stage);
    match &mut params {
        StageParams::ParseLink(p) => p.link = SAMPLE_LINK.to_string(),
        StageParams::RewriteScript(p) => p.content = "original script".to_string(),
        StageParams::SynthesizeVoice(p) => {
            p.audio_resource_id = Some(11);
            p.content = "rewritten script".to_string();
        }
        StageParams::SynthesizeVideo(p) => {
            p.audio_resource_id = Some(101);
            p.video_resource_id = Some(7);
            p.pixel_type = PixelType::Portrait9x16;
        }
        StageParams::Publish(p) => {
            p.video_path = "/video/202.mp4".to_string();
            p.title = Some("Launch day".to_string());
        }
    }
    params
}

/// Returns a full set of valid parameters, indexed by sequence index.
#[must_use]
pub fn valid_snapshot() -> [StageParams; StageId::COUNT] {
    StageId::ALL.map(valid_params)
}
