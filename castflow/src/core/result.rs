//! Stage results and outcomes.

use super::SubTaskStatus;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// A completed stage's payload, parsed into one of two explicit shapes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParsedPayload {
    /// A JSON object carrying a resource handle and/or a result locator.
    Structured {
        /// Stored artifact handle.
        resource_id: Option<i64>,
        /// Result text or path.
        result: Option<String>,
    },
    /// A bare string, used verbatim.
    RawPath {
        /// The payload itself.
        path: String,
    },
}

impl ParsedPayload {
    /// Parses a raw payload.
    ///
    /// JSON objects with a `resourceId`, `id` or `result` key become
    /// [`ParsedPayload::Structured`]; anything else is kept as a raw path.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.starts_with('{') {
            if let Ok(serde_json::Value::Object(map)) = serde_json::from_str(trimmed) {
                let resource_id = map
                    .get("resourceId")
                    .or_else(|| map.get("id"))
                    .and_then(json_to_id);
                let result = map.get("result").and_then(|value| match value {
                    serde_json::Value::Null => None,
                    serde_json::Value::String(s) => Some(s.clone()),
                    other => Some(other.to_string()),
                });
                let has_keys = ["resourceId", "id", "result"]
                    .iter()
                    .any(|key| map.contains_key(*key));
                if has_keys {
                    return Self::Structured {
                        resource_id,
                        result,
                    };
                }
            }
        }
        Self::RawPath {
            path: raw.to_string(),
        }
    }

    /// Returns the result text or path, if any.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Structured { result, .. } => result.as_deref(),
            Self::RawPath { path } => Some(path.as_str()),
        }
    }

    /// Returns the resource id, recovering it from a `/resource/<digits>`
    /// path when the payload is a bare path.
    #[must_use]
    pub fn resource_id(&self) -> Option<i64> {
        match self {
            Self::Structured { resource_id, .. } => *resource_id,
            Self::RawPath { path } => resource_id_from_path(path),
        }
    }
}

fn json_to_id(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn resource_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"/resource/(\d+)").ok())
        .as_ref()
}

/// Extracts the numeric id from a `.../resource/<digits>...` path.
#[must_use]
pub fn resource_id_from_path(path: &str) -> Option<i64> {
    resource_pattern()?
        .captures(path)?
        .get(1)?
        .as_str()
        .parse()
        .ok()
}

/// Parsed output of a completed stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageResult {
    /// The payload exactly as returned by the backend.
    pub raw_payload: String,
    /// Stored artifact handle.
    pub resource_id: Option<i64>,
    /// Result text or locator.
    pub result_path: Option<String>,
}

impl StageResult {
    /// Derives a result from a raw payload.
    #[must_use]
    pub fn from_raw(raw: impl Into<String>) -> Self {
        let raw_payload = raw.into();
        let parsed = ParsedPayload::parse(&raw_payload);
        Self {
            resource_id: parsed.resource_id(),
            result_path: parsed.text().map(str::to_string),
            raw_payload,
        }
    }
}

/// Terminal outcome of polling one sub-task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    /// The backend reported success.
    Success(StageResult),
    /// The backend reported a terminal failure.
    Failed {
        /// Backend message, verbatim.
        message: String,
    },
    /// The sub-task was cancelled locally or remotely.
    Canceled {
        /// Cancellation reason.
        reason: String,
    },
}

impl StageOutcome {
    /// Returns true for [`StageOutcome::Success`].
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Returns the terminal sub-task status this outcome records.
    #[must_use]
    pub fn sub_task_status(&self) -> SubTaskStatus {
        match self {
            Self::Success(_) => SubTaskStatus::Success,
            Self::Failed { .. } => SubTaskStatus::Failed,
            Self::Canceled { .. } => SubTaskStatus::Canceled,
        }
    }
}
