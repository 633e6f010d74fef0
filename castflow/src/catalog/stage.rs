//! Stage identifiers and shared enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the five ordered pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    /// Extract the script text from a video link.
    ParseLink,
    /// Rewrite the script in a given style and tone.
    RewriteScript,
    /// Synthesize narration from the script with a reference voice.
    SynthesizeVoice,
    /// Lip-sync the narration onto a source video.
    SynthesizeVideo,
    /// Publish the finished video to the authorized account.
    Publish,
}

impl StageId {
    /// All stages in execution order.
    pub const ALL: [Self; 5] = [
        Self::ParseLink,
        Self::RewriteScript,
        Self::SynthesizeVoice,
        Self::SynthesizeVideo,
        Self::Publish,
    ];

    /// Number of stages.
    pub const COUNT: usize = Self::ALL.len();

    /// Index of the last stage.
    pub const LAST_INDEX: usize = Self::COUNT - 1;

    /// Returns the fixed position of the stage (0-4).
    #[must_use]
    pub const fn sequence_index(self) -> usize {
        match self {
            Self::ParseLink => 0,
            Self::RewriteScript => 1,
            Self::SynthesizeVoice => 2,
            Self::SynthesizeVideo => 3,
            Self::Publish => 4,
        }
    }

    /// Returns the stage at a sequence index.
    #[must_use]
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Returns the stage that follows this one.
    #[must_use]
    pub fn next(self) -> Option<Self> {
        Self::from_index(self.sequence_index() + 1)
    }

    /// Returns the human-readable name.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::ParseLink => "Parse Link",
            Self::RewriteScript => "Rewrite Script",
            Self::SynthesizeVoice => "Synthesize Voice",
            Self::SynthesizeVideo => "Synthesize Video",
            Self::Publish => "Publish",
        }
    }

    /// Returns the stable snake-case identifier.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ParseLink => "parse_link",
            Self::RewriteScript => "rewrite_script",
            Self::SynthesizeVoice => "synthesize_voice",
            Self::SynthesizeVideo => "synthesize_video",
            Self::Publish => "publish",
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output aspect ratio for video synthesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PixelType {
    /// 9:16 portrait, 720x1280. The only ratio the worker currently renders.
    #[default]
    #[serde(rename = "P9_16")]
    Portrait9x16,
    /// 16:9 landscape.
    #[serde(rename = "RATIO_16_9")]
    Landscape16x9,
    /// 1:1 square.
    #[serde(rename = "RATIO_1_1")]
    Square1x1,
}

impl PixelType {
    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Portrait9x16 => "P9_16",
            Self::Landscape16x9 => "RATIO_16_9",
            Self::Square1x1 => "RATIO_1_1",
        }
    }
}

impl fmt::Display for PixelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PixelType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "P9_16" | "9:16" => Ok(Self::Portrait9x16),
            "RATIO_16_9" | "16:9" => Ok(Self::Landscape16x9),
            "RATIO_1_1" | "1:1" => Ok(Self::Square1x1),
            other => Err(format!("unknown pixel type: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_index_matches_order() {
        for (index, stage) in StageId::ALL.iter().enumerate() {
            assert_eq!(stage.sequence_index(), index);
            assert_eq!(StageId::from_index(index), Some(*stage));
        }
        assert_eq!(StageId::from_index(5), None);
    }

    #[test]
    fn test_next() {
        assert_eq!(StageId::ParseLink.next(), Some(StageId::RewriteScript));
        assert_eq!(StageId::SynthesizeVideo.next(), Some(StageId::Publish));
        assert_eq!(StageId::Publish.next(), None);
    }

    #[test]
    fn test_stage_id_serialize() {
        let json = serde_json::to_string(&StageId::SynthesizeVoice).unwrap();
        assert_eq!(json, r#""synthesize_voice""#);
        assert_eq!(StageId::SynthesizeVoice.to_string(), "synthesize_voice");
    }

    #[test]
    fn test_pixel_type_wire_names() {
        assert_eq!(serde_json::to_string(&PixelType::default()).unwrap(), r#""P9_16""#);
        let parsed: PixelType = serde_json::from_str(r#""RATIO_1_1""#).unwrap();
        assert_eq!(parsed, PixelType::Square1x1);
        assert_eq!("16:9".parse::<PixelType>(), Ok(PixelType::Landscape16x9));
    }
}
