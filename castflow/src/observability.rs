//! Tracing subscriber setup and run spans.

use crate::config::LogConfig;
use crate::errors::CastflowError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Tracing target for workflow coordination.
pub const WORKFLOW_TARGET: &str = "castflow::workflow";

/// Builds the filter: `RUST_LOG` when set, otherwise `config.filter`.
pub fn env_filter(config: &LogConfig) -> Result<EnvFilter, CastflowError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.filter)
            .map_err(|e| CastflowError::Logging(format!("invalid filter {:?}: {e}", config.filter))),
    }
}

/// Installs the global tracing subscriber.
///
/// Fails instead of panicking if a subscriber is already installed.
pub fn init_tracing(config: &LogConfig) -> Result<(), CastflowError> {
    let filter = env_filter(config)?;
    let layer = fmt::layer().with_target(true);
    let layer = if config.json {
        layer.json().flatten_event(true).boxed()
    } else {
        layer.boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init()
        .map_err(|e| CastflowError::Logging(e.to_string()))
}

/// Creates the span that wraps one pipeline run.
#[must_use]
pub fn run_span(run_id: &uuid::Uuid, mode: &str, start_step: usize) -> tracing::Span {
    tracing::info_span!(
        target: WORKFLOW_TARGET,
        "pipeline_run",
        run_id = %run_id,
        mode,
        start_step,
        main_task_id = tracing::field::Empty,
    )
}
