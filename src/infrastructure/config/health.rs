//! Health probe defaults.

use std::time::Duration;

use serde::Deserialize;

use crate::application::health::{BackoffPolicy, ProbeBudget};

/// Backoff and budget applied to every probe unless the manifest overrides
/// them per service.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthConfig {
    /// Delay after the first failed attempt (milliseconds).
    #[serde(default = "default_base_interval_ms")]
    pub base_interval_ms: u64,
    /// Multiplier applied to the delay after each failed attempt.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Ceiling for the delay between attempts (milliseconds).
    #[serde(default = "default_max_interval_ms")]
    pub max_interval_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Overall probe deadline per service (seconds).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_interval_ms() -> u64 {
    500
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_interval_ms() -> u64 {
    5_000
}

fn default_max_attempts() -> u32 {
    10
}

fn default_timeout_secs() -> u64 {
    60
}

impl HealthConfig {
    #[must_use]
    pub fn policy(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            Duration::from_millis(self.base_interval_ms),
            self.multiplier,
            Duration::from_millis(self.max_interval_ms),
        )
    }

    #[must_use]
    pub fn budget(&self) -> ProbeBudget {
        ProbeBudget::new(Duration::from_secs(self.timeout_secs), self.max_attempts)
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            base_interval_ms: default_base_interval_ms(),
            multiplier: default_multiplier(),
            max_interval_ms: default_max_interval_ms(),
            max_attempts: default_max_attempts(),
            timeout_secs: default_timeout_secs(),
        }
    }
}
