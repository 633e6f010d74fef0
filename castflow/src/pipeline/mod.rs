//! Pipeline construction: terminal modes, stage requests and request keys.

mod builder;
mod idempotency;

pub use builder::{default_snapshot, PipelineBuilder, StageRequest, TerminalMode};
pub use idempotency::{generate_idempotency_key, hash_parameters};
