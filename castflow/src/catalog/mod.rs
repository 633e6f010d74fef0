//! Stage catalog: the ordered stage list, typed parameters and validation.

mod definition;
mod params;
mod stage;

pub use definition::{definition, validate, ParameterField, StageDefinition, STAGE_CATALOG};
pub use params::{
    ParseLinkParams, PublishParams, RewriteParams, StageParams, VideoParams, VoiceParams,
    DEFAULT_EMOTION, DEFAULT_STYLES, DEFAULT_TONE,
};
pub use stage::{PixelType, StageId};
