//! Editable parameter forms with per-field edit tracking.

use crate::catalog::{StageId, StageParams};
use crate::pipeline::default_snapshot;
use crate::propagation::{PropagationReport, ResultPropagator};
use std::collections::BTreeSet;

/// Edited-field sets of every stage, indexed by sequence index.
pub type EditedFields = [BTreeSet<String>; StageId::COUNT];

/// The live parameter set of every stage.
///
/// Fields changed through [`StageForms::edit`] are remembered as user edits
/// so that propagation can leave them alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageForms {
    params: [StageParams; StageId::COUNT],
    edited: EditedFields,
}

impl Default for StageForms {
    fn default() -> Self {
        Self {
            params: default_snapshot(),
            edited: Default::default(),
        }
    }
}

impl StageForms {
    /// Creates forms holding default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the parameters of a stage.
    #[must_use]
    pub fn params(&self, stage: StageId) -> &StageParams {
        &self.params[stage.sequence_index()]
    }

    /// Returns the fields of a stage the user has edited.
    #[must_use]
    pub fn edited_fields(&self, stage: StageId) -> &BTreeSet<String> {
        &self.edited[stage.sequence_index()]
    }

    /// Applies a user edit and returns the fields it changed.
    ///
    /// An edit that swaps in another stage's parameters is rolled back.
    pub fn edit<F>(&mut self, stage: StageId, f: F) -> Vec<String>
    where
        F: FnOnce(&mut StageParams),
    {
        let slot = &mut self.params[stage.sequence_index()];
        let before = slot.clone();
        f(slot);
        if slot.stage_id() != stage {
            *slot = before;
            return Vec::new();
        }

        let changed = before.changed_fields(slot);
        self.edited[stage.sequence_index()].extend(changed.iter().cloned());
        changed
    }

    /// Returns a copy of every stage's parameters.
    #[must_use]
    pub fn snapshot(&self) -> [StageParams; StageId::COUNT] {
        self.params.clone()
    }

    /// Returns a copy of every stage's edited-field set.
    #[must_use]
    pub fn edited_snapshot(&self) -> EditedFields {
        self.edited.clone()
    }

    /// Writes a completed stage's result into the following stage's form.
    pub fn apply_propagation(
        &mut self,
        propagator: &ResultPropagator,
        completed: StageId,
        raw_payload: &str,
    ) -> PropagationReport {
        let Some(next) = completed.next() else {
            return PropagationReport::default();
        };
        let index = next.sequence_index();
        propagator.propagate(completed, raw_payload, &mut self.params[index], &self.edited[index])
    }

    /// Restores every form to its defaults and forgets all edits.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::propagation::PropagationPolicy;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_edit_tracks_changed_fields() {
        let mut forms = StageForms::new();
        let changed = forms.edit(StageId::RewriteScript, |params| {
            if let StageParams::RewriteScript(p) = params {
                p.content = "hand written".into();
                p.tone = "幽默".into();
            }
        });
        assert_eq!(changed, vec!["content", "tone"]);
        assert!(forms.edited_fields(StageId::RewriteScript).contains("content"));
        assert!(forms.edited_fields(StageId::ParseLink).is_empty());
    }

    #[test]
    fn test_edit_rejects_variant_swap() {
        let mut forms = StageForms::new();
        let changed = forms.edit(StageId::ParseLink, |params| {
            *params = StageParams::default_for(StageId::Publish);
        });
        assert!(changed.is_empty());
        assert_eq!(forms.params(StageId::ParseLink).stage_id(), StageId::ParseLink);
    }

    #[test]
    fn test_propagation_respects_edits() {
        let mut forms = StageForms::new();
        forms.edit(StageId::RewriteScript, |params| {
            if let StageParams::RewriteScript(p) = params {
                p.content = "mine".into();
            }
        });
        let propagator = ResultPropagator::new(PropagationPolicy::PreserveUserEdits);
        let report = forms.apply_propagation(&propagator, StageId::ParseLink, "parsed");
        assert_eq!(report.preserved, vec!["content"]);
        assert_eq!(
            forms.params(StageId::RewriteScript).field_value("content"),
            Some(serde_json::json!("mine"))
        );

        let report = forms.apply_propagation(&propagator, StageId::Publish, "done");
        assert!(report.target.is_none());
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut forms = StageForms::new();
        let snapshot = forms.snapshot();
        forms.edit(StageId::ParseLink, |params| {
            if let StageParams::ParseLink(p) = params {
                p.link = "https://example.com/v".into();
            }
        });
        assert_eq!(snapshot[0], StageParams::default_for(StageId::ParseLink));

        forms.reset();
        assert_eq!(forms, StageForms::default());
    }
}
