//! Builds the ordered stage list for one run.

use super::idempotency::{generate_idempotency_key, hash_parameters};
use crate::catalog::{StageId, StageParams};
use crate::errors::RangeError;
use serde::{Deserialize, Serialize};

/// How far a run advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalMode {
    /// Only the start stage.
    SingleStep,
    /// From the start stage through video synthesis.
    ThroughSynthesis,
    /// From the start stage through publishing.
    ThroughPublish,
}

impl TerminalMode {
    /// Returns the last stage index the mode includes for a start step.
    #[must_use]
    pub const fn terminal_index(self, start_step: usize) -> usize {
        match self {
            Self::SingleStep => start_step,
            Self::ThroughSynthesis => StageId::SynthesizeVideo.sequence_index(),
            Self::ThroughPublish => StageId::Publish.sequence_index(),
        }
    }

    /// Returns the highest start step the mode accepts.
    #[must_use]
    pub const fn max_start(self) -> usize {
        match self {
            Self::SingleStep | Self::ThroughPublish => StageId::LAST_INDEX,
            Self::ThroughSynthesis => StageId::SynthesizeVideo.sequence_index(),
        }
    }
}

/// One stage to submit, with its parameters frozen at build time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRequest {
    /// Position in the pipeline.
    pub sequence_index: usize,
    /// Stage identifier.
    pub stage_id: StageId,
    /// Parameter snapshot.
    pub params: StageParams,
    /// Deterministic key over index, stage and parameters.
    pub request_key: String,
}

impl StageRequest {
    /// Creates a request for a stage and computes its key.
    #[must_use]
    pub fn new(stage_id: StageId, params: StageParams) -> Self {
        let sequence_index = stage_id.sequence_index();
        let request_key = generate_idempotency_key(&[
            &sequence_index.to_string(),
            stage_id.as_str(),
            &hash_parameters(&params.to_parameter()),
        ]);
        Self {
            sequence_index,
            stage_id,
            params,
            request_key,
        }
    }
}

/// Pipeline builder.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineBuilder;

impl PipelineBuilder {
    /// Builds the stage requests for a run.
    ///
    /// `snapshot` holds one parameter set per stage, indexed by sequence
    /// index. Each request clones its entry, so later edits to the source
    /// forms do not reach the submitted run.
    pub fn build(
        start_step: usize,
        mode: TerminalMode,
        snapshot: &[StageParams; StageId::COUNT],
    ) -> Result<Vec<StageRequest>, RangeError> {
        let max_step = mode.max_start();
        if start_step > max_step {
            return Err(RangeError {
                start_step,
                max_step,
            });
        }

        let requests = (start_step..=mode.terminal_index(start_step))
            .filter_map(StageId::from_index)
            .map(|stage| StageRequest::new(stage, snapshot[stage.sequence_index()].clone()))
            .collect();
        Ok(requests)
    }

    /// Returns the submission key for a list of requests.
    #[must_use]
    pub fn submission_key(start_step: usize, requests: &[StageRequest]) -> String {
        let start = start_step.to_string();
        let mut components: Vec<&str> = Vec::with_capacity(requests.len() + 1);
        components.push(&start);
        components.extend(requests.iter().map(|request| request.request_key.as_str()));
        generate_idempotency_key(&components)
    }
}

/// Returns the default parameter set of every stage.
#[must_use]
pub fn default_snapshot() -> [StageParams; StageId::COUNT] {
    StageId::ALL.map(StageParams::default_for)
}
