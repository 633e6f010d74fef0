//! Backend-facing clients: main task submission and stage kickoff.

mod dispatcher;
mod submission;

pub use dispatcher::StageDispatcher;
pub use submission::TaskSubmissionClient;
