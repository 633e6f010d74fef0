//! Core data model.
//!
//! - Sub-task and step status enums
//! - Main task and sub-task references
//! - Stage results, parsed payloads and poll outcomes

mod result;
mod status;
mod task;

pub use result::{resource_id_from_path, ParsedPayload, StageOutcome, StageResult};
pub use status::{StepStatus, SubTaskStatus};
pub use task::{MainTask, SubTaskRef};
