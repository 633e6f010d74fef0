//! Poll interval schedule and backoff state.

use crate::errors::{ConfigError, PollError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Widens the interval once polling has run for `after_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollTier {
    /// Elapsed polling time at which the tier applies.
    pub after_ms: u64,
    /// Interval while the tier applies.
    pub interval_ms: u64,
}

/// Configuration for status polling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollConfig {
    /// Interval before any tier applies.
    #[serde(default = "default_initial_interval_ms")]
    pub initial_interval_ms: u64,
    /// Interval tiers, ordered by `after_ms`.
    #[serde(default = "default_tiers")]
    pub tiers: Vec<PollTier>,
    /// Interval multiplier after a failed status request.
    #[serde(default = "default_error_multiplier")]
    pub error_multiplier: f64,
    /// Upper bound for the interval after failed requests.
    #[serde(default = "default_error_ceiling_ms")]
    pub error_ceiling_ms: u64,
    /// Give up after polling this long. Unbounded when unset.
    #[serde(default)]
    pub max_wait_ms: Option<u64>,
    /// Give up after this many consecutive failed requests. Unbounded when unset.
    #[serde(default)]
    pub max_consecutive_errors: Option<u32>,
}

fn default_initial_interval_ms() -> u64 {
    2000
}

fn default_tiers() -> Vec<PollTier> {
    vec![
        PollTier {
            after_ms: 20_000,
            interval_ms: 3000,
        },
        PollTier {
            after_ms: 60_000,
            interval_ms: 5000,
        },
    ]
}

fn default_error_multiplier() -> f64 {
    1.5
}

fn default_error_ceiling_ms() -> u64 {
    8000
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_interval_ms: default_initial_interval_ms(),
            tiers: default_tiers(),
            error_multiplier: default_error_multiplier(),
            error_ceiling_ms: default_error_ceiling_ms(),
            max_wait_ms: None,
            max_consecutive_errors: None,
        }
    }
}

impl PollConfig {
    /// Creates a new poll config with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum total wait.
    #[must_use]
    pub fn with_max_wait_ms(mut self, max_wait_ms: u64) -> Self {
        self.max_wait_ms = Some(max_wait_ms);
        self
    }

    /// Sets the maximum number of consecutive failed requests.
    #[must_use]
    pub fn with_max_consecutive_errors(mut self, errors: u32) -> Self {
        self.max_consecutive_errors = Some(errors);
        self
    }

    /// Returns the scheduled interval for an elapsed polling time.
    #[must_use]
    pub fn tier_interval(&self, elapsed: Duration) -> Duration {
        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        let interval_ms = self
            .tiers
            .iter()
            .filter(|tier| elapsed_ms >= tier.after_ms)
            .map(|tier| tier.interval_ms)
            .max()
            .unwrap_or(self.initial_interval_ms)
            .max(self.initial_interval_ms);
        Duration::from_millis(interval_ms)
    }

    /// Returns the widest interval reachable without errors.
    #[must_use]
    pub fn happy_path_ceiling(&self) -> Duration {
        let widest = self
            .tiers
            .iter()
            .map(|tier| tier.interval_ms)
            .fold(self.initial_interval_ms, u64::max);
        Duration::from_millis(widest)
    }

    /// Checks that the schedule is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "polling.initial_interval_ms must be positive".into(),
            ));
        }
        let mut previous = PollTier {
            after_ms: 0,
            interval_ms: self.initial_interval_ms,
        };
        for tier in &self.tiers {
            if tier.after_ms < previous.after_ms || tier.interval_ms < previous.interval_ms {
                return Err(ConfigError::Invalid(
                    "polling.tiers must be ordered with non-decreasing intervals".into(),
                ));
            }
            previous = *tier;
        }
        if !self.error_multiplier.is_finite() || self.error_multiplier < 1.0 {
            return Err(ConfigError::Invalid(
                "polling.error_multiplier must be a finite number of at least 1.0".into(),
            ));
        }
        #[allow(clippy::cast_precision_loss)]
        let widest_step = self.error_ceiling_ms as f64 / self.initial_interval_ms as f64;
        if self.error_multiplier > widest_step.max(1.0) {
            return Err(ConfigError::Invalid(
                "polling.error_multiplier must not exceed error_ceiling_ms / initial_interval_ms"
                    .into(),
            ));
        }
        if Duration::from_millis(self.error_ceiling_ms) < self.happy_path_ceiling() {
            return Err(ConfigError::Invalid(
                "polling.error_ceiling_ms must not be below the widest tier interval".into(),
            ));
        }
        Ok(())
    }
}

/// Backoff state of one polling loop.
///
/// The interval never decreases while the same sub-task is polled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollState {
    /// Interval before the next scheduled poll.
    pub interval: Duration,
    /// Scheduled polls issued so far.
    pub attempt: u32,
    /// Time spent polling.
    pub elapsed: Duration,
    /// Failed requests since the last successful one.
    pub consecutive_errors: u32,
}

impl PollState {
    /// Creates the initial state.
    #[must_use]
    pub fn new(config: &PollConfig) -> Self {
        Self {
            interval: Duration::from_millis(config.initial_interval_ms),
            attempt: 0,
            elapsed: Duration::ZERO,
            consecutive_errors: 0,
        }
    }

    /// Records a scheduled poll that returned a non-terminal status.
    pub fn on_pending(&mut self, config: &PollConfig, elapsed: Duration) {
        self.attempt += 1;
        self.elapsed = elapsed;
        self.consecutive_errors = 0;
        self.interval = self.interval.max(config.tier_interval(elapsed));
    }

    /// Records a scheduled poll whose request failed.
    pub fn on_error(&mut self, config: &PollConfig, elapsed: Duration) {
        self.attempt += 1;
        self.elapsed = elapsed;
        self.consecutive_errors += 1;
        let ceiling = Duration::from_millis(config.error_ceiling_ms);
        let widened = Duration::try_from_secs_f64(
            self.interval.as_secs_f64() * config.error_multiplier,
        )
        .map_or(ceiling, |widened| widened.min(ceiling));
        self.interval = self.interval.max(widened);
    }

    /// Records a forced poll outside the schedule.
    ///
    /// Only the error count changes; the interval is kept.
    pub fn on_forced(&mut self, failed: bool) {
        if failed {
            self.consecutive_errors += 1;
        } else {
            self.consecutive_errors = 0;
        }
    }

    /// Returns the error for a ceiling that has been reached, if any.
    #[must_use]
    pub fn exceeded(&self, config: &PollConfig, sub_task_id: i64, last_error: &str) -> Option<PollError> {
        if let Some(max) = config.max_consecutive_errors {
            if self.consecutive_errors >= max {
                return Some(PollError::TooManyErrors {
                    sub_task_id,
                    errors: self.consecutive_errors,
                    last_error: last_error.to_string(),
                });
            }
        }
        if let Some(max_wait_ms) = config.max_wait_ms {
            if self.elapsed >= Duration::from_millis(max_wait_ms) {
                return Some(PollError::Exhausted {
                    sub_task_id,
                    elapsed_ms: u64::try_from(self.elapsed.as_millis()).unwrap_or(u64::MAX),
                    polls: self.attempt,
                });
            }
        }
        None
    }
}
