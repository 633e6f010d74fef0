//! Workflow event notification.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// Execution mode changed.
pub const MODE_CHANGED: &str = "workflow.mode.changed";
/// A main task was created.
pub const TASK_SUBMITTED: &str = "workflow.task.submitted";
/// A step was dispatched.
pub const STEP_RUNNING: &str = "workflow.step.running";
/// A step completed.
pub const STEP_SUCCEEDED: &str = "workflow.step.succeeded";
/// A step failed.
pub const STEP_FAILED: &str = "workflow.step.failed";
/// A step was reset to pending.
pub const STEP_RESET: &str = "workflow.step.reset";
/// A result was written into the next stage's parameters.
pub const PARAMS_PROPAGATED: &str = "workflow.params.propagated";
/// A status request failed; polling continues.
pub const POLL_ERROR: &str = "workflow.poll.error";
/// A run ended.
pub const RUN_FINISHED: &str = "workflow.run.finished";
