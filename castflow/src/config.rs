//! Coordinator configuration.
//!
//! Every section deserializes with per-field defaults, so a config file
//! only needs the values it changes:
//!
//! ```json
//! { "backend": { "base_url": "https://api.example.com/api" },
//!   "polling": { "max_wait_ms": 1800000 } }
//! ```

use crate::errors::ConfigError;
use crate::polling::PollConfig;
use crate::propagation::PropagationPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable overriding [`BackendConfig::base_url`].
pub const ENV_API_BASE: &str = "CASTFLOW_API_BASE";
/// Environment variable overriding [`BackendConfig::auth_token`].
pub const ENV_API_TOKEN: &str = "CASTFLOW_API_TOKEN";
/// Environment variable overriding [`LogConfig::filter`].
pub const ENV_LOG: &str = "CASTFLOW_LOG";
/// Environment variable overriding [`LogConfig::json`].
pub const ENV_LOG_JSON: &str = "CASTFLOW_LOG_JSON";

/// Worker backend connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the task API, without a trailing route.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Per-request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Bearer token sent with every request.
    #[serde(default)]
    pub auth_token: Option<String>,
    /// User agent string.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_base_url() -> String {
    "http://localhost:8080/api".to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_user_agent() -> String {
    concat!("castflow/", env!("CARGO_PKG_VERSION")).to_string()
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_ms: default_timeout_ms(),
            auth_token: None,
            user_agent: default_user_agent(),
        }
    }
}

impl BackendConfig {
    /// Sets the base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Sets the bearer token.
    #[must_use]
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Gets the timeout as a Duration.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Result propagation settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropagationConfig {
    /// Whether propagation may overwrite user-edited fields.
    #[serde(default)]
    pub policy: PropagationPolicy,
    /// Base URL prepended to a synthesized video's path to build its preview URL.
    #[serde(default)]
    pub resource_base_url: Option<String>,
}

/// Automatic run settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Pause between a stage's success and the next dispatch.
    #[serde(default = "default_advance_delay_ms")]
    pub advance_delay_ms: u64,
    /// Require the source video before an automatic run that reaches video synthesis.
    #[serde(default = "default_true")]
    pub preflight_materials: bool,
}

fn default_advance_delay_ms() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            advance_delay_ms: default_advance_delay_ms(),
            preflight_materials: true,
        }
    }
}

impl WorkflowConfig {
    /// Gets the advance delay as a Duration.
    #[must_use]
    pub fn advance_delay(&self) -> Duration {
        Duration::from_millis(self.advance_delay_ms)
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_log_filter() -> String {
    "castflow=info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
        }
    }
}

/// Top-level configuration for a [`crate::workflow::WorkflowCoordinator`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Backend connection.
    #[serde(default)]
    pub backend: BackendConfig,
    /// Status polling cadence.
    #[serde(default)]
    pub polling: PollConfig,
    /// Result propagation.
    #[serde(default)]
    pub propagation: PropagationConfig,
    /// Automatic runs.
    #[serde(default)]
    pub workflow: WorkflowConfig,
    /// Logging.
    #[serde(default)]
    pub log: LogConfig,
}

impl CoordinatorConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a JSON configuration file, then applies environment overrides.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: display.clone(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: display,
            source,
        })?;
        let config = config.with_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Builds a configuration from defaults and environment overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self::default().with_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `CASTFLOW_*` environment variables.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Applies overrides from a variable lookup.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(base_url) = lookup(ENV_API_BASE) {
            self.backend.base_url = base_url;
        }
        if let Some(token) = lookup(ENV_API_TOKEN) {
            self.backend.auth_token = Some(token).filter(|t| !t.is_empty());
        }
        if let Some(filter) = lookup(ENV_LOG) {
            self.log.filter = filter;
        }
        if let Some(value) = lookup(ENV_LOG_JSON) {
            self.log.json = parse_bool(&value).ok_or_else(|| ConfigError::Env {
                name: ENV_LOG_JSON.to_string(),
                value,
            })?;
        }
        Ok(self)
    }

    /// Checks that values are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("backend.base_url must not be empty".into()));
        }
        if self.backend.timeout_ms == 0 {
            return Err(ConfigError::Invalid("backend.timeout_ms must be positive".into()));
        }
        self.polling.validate()
    }

    /// Sets the backend section.
    #[must_use]
    pub fn with_backend(mut self, backend: BackendConfig) -> Self {
        self.backend = backend;
        self
    }

    /// Sets the polling section.
    #[must_use]
    pub fn with_polling(mut self, polling: PollConfig) -> Self {
        self.polling = polling;
        self
    }

    /// Sets the propagation policy.
    #[must_use]
    pub fn with_policy(mut self, policy: PropagationPolicy) -> Self {
        self.propagation.policy = policy;
        self
    }

    /// Sets the advance delay.
    #[must_use]
    pub fn with_advance_delay_ms(mut self, delay_ms: u64) -> Self {
        self.workflow.advance_delay_ms = delay_ms;
        self
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
