//! Static stage definitions and parameter validation.

use super::{StageId, StageParams};
use crate::errors::ValidationError;
use serde::Serialize;

/// One named field of a stage's parameter schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ParameterField {
    /// Wire name of the field.
    pub name: &'static str,
    /// Whether the field must be present before dispatch.
    pub required: bool,
}

impl ParameterField {
    const fn required(name: &'static str) -> Self {
        Self {
            name,
            required: true,
        }
    }

    const fn optional(name: &'static str) -> Self {
        Self {
            name,
            required: false,
        }
    }
}

/// Immutable catalog entry for one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StageDefinition {
    /// Fixed position in the pipeline (0-4).
    pub sequence_index: usize,
    /// Stage identifier.
    pub stage_id: StageId,
    /// Human-readable name.
    pub display_name: &'static str,
    /// Short description of what the stage produces.
    pub description: &'static str,
    /// Parameter fields in declaration order.
    pub parameter_schema: &'static [ParameterField],
}

impl StageDefinition {
    /// Returns the names of required fields in declaration order.
    pub fn required_fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.parameter_schema
            .iter()
            .filter(|field| field.required)
            .map(|field| field.name)
    }

    /// Validates a parameter set against this definition.
    ///
    /// Returns the first missing required field in declaration order.
    pub fn validate(&self, params: &StageParams) -> Result<(), ValidationError> {
        if params.stage_id() != self.stage_id {
            return Err(ValidationError::mismatched(self.stage_id, params.stage_id()));
        }

        let serde_json::Value::Object(values) = params.to_parameter() else {
            return Err(ValidationError::mismatched(self.stage_id, params.stage_id()));
        };

        for name in self.required_fields() {
            if !is_present(values.get(name)) {
                return Err(ValidationError::missing(self.stage_id, name));
            }
        }
        Ok(())
    }
}

/// A value counts as present unless it is absent, null, blank or zero.
fn is_present(value: Option<&serde_json::Value>) -> bool {
    match value {
        None | Some(serde_json::Value::Null) => false,
        Some(serde_json::Value::String(s)) => !s.trim().is_empty(),
        Some(serde_json::Value::Number(n)) => n.as_i64() != Some(0),
        Some(_) => true,
    }
}

const PARSE_LINK_FIELDS: &[ParameterField] = &[ParameterField::required("link")];

const REWRITE_FIELDS: &[ParameterField] = &[
    ParameterField::required("content"),
    ParameterField::required("styles"),
    ParameterField::required("tone"),
    ParameterField::optional("extraInstructions"),
];

const VOICE_FIELDS: &[ParameterField] = &[
    ParameterField::required("audioResourceId"),
    ParameterField::required("content"),
    ParameterField::required("emotionText"),
];

const VIDEO_FIELDS: &[ParameterField] = &[
    ParameterField::required("audioResourceId"),
    ParameterField::required("videoResourceId"),
    ParameterField::required("pixelType"),
];

const PUBLISH_FIELDS: &[ParameterField] = &[
    ParameterField::required("videoPath"),
    ParameterField::optional("title"),
    ParameterField::optional("description"),
];

/// The five stages in execution order.
pub static STAGE_CATALOG: [StageDefinition; StageId::COUNT] = [
    StageDefinition {
        sequence_index: 0,
        stage_id: StageId::ParseLink,
        display_name: StageId::ParseLink.display_name(),
        description: "Extract the spoken script from a share link",
        parameter_schema: PARSE_LINK_FIELDS,
    },
    StageDefinition {
        sequence_index: 1,
        stage_id: StageId::RewriteScript,
        display_name: StageId::RewriteScript.display_name(),
        description: "Rewrite the script with a chosen style and tone",
        parameter_schema: REWRITE_FIELDS,
    },
    StageDefinition {
        sequence_index: 2,
        stage_id: StageId::SynthesizeVoice,
        display_name: StageId::SynthesizeVoice.display_name(),
        description: "Clone a reference voice and narrate the script",
        parameter_schema: VOICE_FIELDS,
    },
    StageDefinition {
        sequence_index: 3,
        stage_id: StageId::SynthesizeVideo,
        display_name: StageId::SynthesizeVideo.display_name(),
        description: "Lip-sync the narration onto the source video",
        parameter_schema: VIDEO_FIELDS,
    },
    StageDefinition {
        sequence_index: 4,
        stage_id: StageId::Publish,
        display_name: StageId::Publish.display_name(),
        description: "Publish the finished video to the authorized account",
        parameter_schema: PUBLISH_FIELDS,
    },
];

/// Returns the catalog entry for a stage.
#[must_use]
pub fn definition(stage: StageId) -> &'static StageDefinition {
    &STAGE_CATALOG[stage.sequence_index()]
}

/// Validates a stage's parameters against the catalog.
pub fn validate(stage: StageId, params: &StageParams) -> Result<(), ValidationError> {
    definition(stage).validate(params)
}
