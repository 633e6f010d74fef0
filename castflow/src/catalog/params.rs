//! Typed parameter sets, one per stage.

use super::{PixelType, StageId};
use serde::{Deserialize, Serialize};

/// Default rewrite style.
pub const DEFAULT_STYLES: &str = "专业";
/// Default rewrite tone.
pub const DEFAULT_TONE: &str = "友好";
/// Default emotion prompt for voice synthesis.
pub const DEFAULT_EMOTION: &str = "平静";

/// Parameters for [`StageId::ParseLink`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseLinkParams {
    /// Share link of the source video.
    pub link: String,
}

/// Parameters for [`StageId::RewriteScript`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewriteParams {
    /// Original script text.
    pub content: String,
    /// Target writing style.
    pub styles: String,
    /// Target tone.
    pub tone: String,
    /// Free-form extra instructions.
    #[serde(default)]
    pub extra_instructions: String,
}

impl Default for RewriteParams {
    fn default() -> Self {
        Self {
            content: String::new(),
            styles: DEFAULT_STYLES.to_string(),
            tone: DEFAULT_TONE.to_string(),
            extra_instructions: String::new(),
        }
    }
}

/// Parameters for [`StageId::SynthesizeVoice`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceParams {
    /// Stored reference voice sample.
    pub audio_resource_id: Option<i64>,
    /// Text to speak.
    pub content: String,
    /// Emotion prompt.
    pub emotion_text: String,
}

impl Default for VoiceParams {
    fn default() -> Self {
        Self {
            audio_resource_id: None,
            content: String::new(),
            emotion_text: DEFAULT_EMOTION.to_string(),
        }
    }
}

/// Parameters for [`StageId::SynthesizeVideo`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoParams {
    /// Narration audio.
    pub audio_resource_id: Option<i64>,
    /// Source video material.
    pub video_resource_id: Option<i64>,
    /// Output aspect ratio.
    pub pixel_type: PixelType,
}

/// Parameters for [`StageId::Publish`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishParams {
    /// Server-side path of the video to publish.
    pub video_path: String,
    /// Optional title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Preview URL of the video, when a resource base URL is known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    /// Stored video resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_resource_id: Option<i64>,
}

/// The parameter set of one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage", content = "params", rename_all = "snake_case")]
pub enum StageParams {
    /// Link parsing parameters.
    ParseLink(ParseLinkParams),
    /// Script rewriting parameters.
    RewriteScript(RewriteParams),
    /// Voice synthesis parameters.
    SynthesizeVoice(VoiceParams),
    /// Video synthesis parameters.
    SynthesizeVideo(VideoParams),
    /// Publishing parameters.
    Publish(PublishParams),
}

impl StageParams {
    /// Returns the initial parameter set of a stage.
    #[must_use]
    pub fn default_for(stage: StageId) -> Self {
        match stage {
            StageId::ParseLink => Self::ParseLink(ParseLinkParams::default()),
            StageId::RewriteScript => Self::RewriteScript(RewriteParams::default()),
            StageId::SynthesizeVoice => Self::SynthesizeVoice(VoiceParams::default()),
            StageId::SynthesizeVideo => Self::SynthesizeVideo(VideoParams::default()),
            StageId::Publish => Self::Publish(PublishParams::default()),
        }
    }

    /// Returns the stage these parameters belong to.
    #[must_use]
    pub const fn stage_id(&self) -> StageId {
        match self {
            Self::ParseLink(_) => StageId::ParseLink,
            Self::RewriteScript(_) => StageId::RewriteScript,
            Self::SynthesizeVoice(_) => StageId::SynthesizeVoice,
            Self::SynthesizeVideo(_) => StageId::SynthesizeVideo,
            Self::Publish(_) => StageId::Publish,
        }
    }

    /// Returns the parameters as the JSON object submitted with the main task.
    #[must_use]
    pub fn to_parameter(&self) -> serde_json::Value {
        let value = match self {
            Self::ParseLink(p) => serde_json::to_value(p),
            Self::RewriteScript(p) => serde_json::to_value(p),
            Self::SynthesizeVoice(p) => serde_json::to_value(p),
            Self::SynthesizeVideo(p) => serde_json::to_value(p),
            Self::Publish(p) => serde_json::to_value(p),
        };
        // Plain structs of strings, integers and enums always serialize.
        value.unwrap_or(serde_json::Value::Null)
    }

    /// Returns the value of a field by its wire name.
    #[must_use]
    pub fn field_value(&self, name: &str) -> Option<serde_json::Value> {
        match self.to_parameter() {
            serde_json::Value::Object(mut map) => map.remove(name),
            _ => None,
        }
    }

    /// Returns the names of fields whose values differ from `other`.
    #[must_use]
    pub fn changed_fields(&self, other: &Self) -> Vec<String> {
        let (serde_json::Value::Object(before), serde_json::Value::Object(after)) =
            (self.to_parameter(), other.to_parameter())
        else {
            return Vec::new();
        };

        let mut names: Vec<String> = before
            .keys()
            .chain(after.keys())
            .filter(|key| before.get(*key) != after.get(*key))
            .cloned()
            .collect();
        names.sort();
        names.dedup();
        names
    }
}
