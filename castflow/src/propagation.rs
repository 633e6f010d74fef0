//! Result propagation into the next stage's parameters.
//!
//! Which result fields feed which parameters is a fixed table; nothing is
//! inferred from the payload shape.

use crate::catalog::{StageId, StageParams};
use crate::core::ParsedPayload;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Tracing target for propagation.
pub const TRACING_TARGET: &str = "castflow::propagation";

/// Whether propagation may overwrite parameters the user edited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropagationPolicy {
    /// Skip a user-edited field unless it is back at its default value.
    #[default]
    PreserveUserEdits,
    /// Always write derived values.
    AlwaysOverwrite,
}

/// The part of a parsed result a rule reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultField {
    /// The result text or path.
    Text,
    /// The resource id.
    ResourceId,
    /// The result path joined onto the configured resource base URL.
    ResourceUrl,
}

/// One `(source stage) -> target field` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropagationRule {
    /// Stage whose result is read.
    pub source: StageId,
    /// Stage whose parameters are written.
    pub target: StageId,
    /// Target field wire name.
    pub field: &'static str,
    /// Value written into the field.
    pub value: ResultField,
}

const fn rule(
    source: StageId,
    target: StageId,
    field: &'static str,
    value: ResultField,
) -> PropagationRule {
    PropagationRule {
        source,
        target,
        field,
        value,
    }
}

/// The propagation table.
pub static PROPAGATION_TABLE: &[PropagationRule] = &[
    rule(StageId::ParseLink, StageId::RewriteScript, "content", ResultField::Text),
    rule(StageId::RewriteScript, StageId::SynthesizeVoice, "content", ResultField::Text),
    rule(
        StageId::SynthesizeVoice,
        StageId::SynthesizeVideo,
        "audioResourceId",
        ResultField::ResourceId,
    ),
    rule(StageId::SynthesizeVideo, StageId::Publish, "videoPath", ResultField::Text),
    rule(
        StageId::SynthesizeVideo,
        StageId::Publish,
        "videoResourceId",
        ResultField::ResourceId,
    ),
    rule(StageId::SynthesizeVideo, StageId::Publish, "videoUrl", ResultField::ResourceUrl),
];

/// Returns the rules whose source is `stage`.
pub fn rules_for(stage: StageId) -> impl Iterator<Item = &'static PropagationRule> {
    PROPAGATION_TABLE.iter().filter(move |rule| rule.source == stage)
}

/// What one propagation call changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PropagationReport {
    /// The stage that received values, if any rule applied.
    pub target: Option<StageId>,
    /// Fields that were written.
    pub written: Vec<&'static str>,
    /// Fields left alone because the user edited them.
    pub preserved: Vec<&'static str>,
}

impl PropagationReport {
    /// Returns true if nothing was written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.written.is_empty()
    }
}

/// Writes a completed stage's result into the next stage's parameters.
#[derive(Debug, Clone, Default)]
pub struct ResultPropagator {
    policy: PropagationPolicy,
    resource_base_url: Option<String>,
}

impl ResultPropagator {
    /// Creates a propagator.
    #[must_use]
    pub fn new(policy: PropagationPolicy) -> Self {
        Self {
            policy,
            resource_base_url: None,
        }
    }

    /// Sets the base URL used for [`ResultField::ResourceUrl`].
    #[must_use]
    pub fn with_resource_base_url(mut self, base_url: Option<String>) -> Self {
        self.resource_base_url = base_url.filter(|url| !url.trim().is_empty());
        self
    }

    /// Returns the policy.
    #[must_use]
    pub fn policy(&self) -> PropagationPolicy {
        self.policy
    }

    /// Propagates `raw_payload` from `completed` into `target`.
    ///
    /// Only fields declared in the table for `(completed, target)` are
    /// touched. `user_edited` lists fields of `target` the user changed.
    pub fn propagate(
        &self,
        completed: StageId,
        raw_payload: &str,
        target: &mut StageParams,
        user_edited: &BTreeSet<String>,
    ) -> PropagationReport {
        let parsed = ParsedPayload::parse(raw_payload);
        let target_stage = target.stage_id();
        let defaults = StageParams::default_for(target_stage);
        let mut report = PropagationReport::default();

        for rule in rules_for(completed).filter(|rule| rule.target == target_stage) {
            report.target = Some(rule.target);
            let Some(value) = self.derive(rule.value, &parsed) else {
                continue;
            };

            if self.policy == PropagationPolicy::PreserveUserEdits
                && user_edited.contains(rule.field)
                && target.field_value(rule.field) != defaults.field_value(rule.field)
            {
                report.preserved.push(rule.field);
                continue;
            }

            if write_field(target, rule.field, value) {
                report.written.push(rule.field);
            }
        }

        if report.target.is_some() {
            tracing::debug!(
                target: TRACING_TARGET,
                source = %completed,
                written = ?report.written,
                preserved = ?report.preserved,
                "Propagated stage result"
            );
        }
        report
    }

    fn derive(&self, field: ResultField, parsed: &ParsedPayload) -> Option<Derived> {
        match field {
            ResultField::Text => parsed
                .text()
                .filter(|text| !text.is_empty())
                .map(|text| Derived::Text(text.to_string())),
            ResultField::ResourceId => parsed.resource_id().map(Derived::Id),
            ResultField::ResourceUrl => {
                let base = self.resource_base_url.as_deref()?;
                let path = parsed.text().filter(|text| !text.is_empty())?;
                Some(Derived::Text(join_url(base, path)))
            }
        }
    }
}

enum Derived {
    Text(String),
    Id(i64),
}

fn join_url(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    let base = base.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}

fn write_field(target: &mut StageParams, field: &str, value: Derived) -> bool {
    match (target, field, value) {
        (StageParams::RewriteScript(p), "content", Derived::Text(text)) => p.content = text,
        (StageParams::SynthesizeVoice(p), "content", Derived::Text(text)) => p.content = text,
        (StageParams::SynthesizeVideo(p), "audioResourceId", Derived::Id(id)) => {
            p.audio_resource_id = Some(id);
        }
        (StageParams::Publish(p), "videoPath", Derived::Text(text)) => p.video_path = text,
        (StageParams::Publish(p), "videoResourceId", Derived::Id(id)) => {
            p.video_resource_id = Some(id);
        }
        (StageParams::Publish(p), "videoUrl", Derived::Text(url)) => p.video_url = Some(url),
        _ => return false,
    }
    true
}
