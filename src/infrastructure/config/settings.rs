//! Application configuration loading and validation.
//!
//! Provides the main [`Config`] struct that aggregates all settings.
//! Configuration is loaded from a TOML file; every section is optional and an
//! empty file yields the defaults. `STACKCTL_ENVIRONMENT` overrides the
//! default environment.
//!
//! # Example
//!
//! ```no_run
//! use stackctl::infrastructure::config::settings::Config;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("stackctl.toml")?;
//!     config.logging.init(0);
//!     Ok(())
//! }
//! ```

use std::path::Path;

use serde::Deserialize;

use super::health::HealthConfig;
use super::logging::LoggingConfig;
use super::project::ProjectConfig;
use super::retention::{BackupConfig, ReportsConfig, RunConfig};
use super::runtime::RuntimeConfig;
use crate::error::{ConfigError, Result};

/// Environment variable overriding `[project] default_environment`.
pub const ENVIRONMENT_VAR: &str = "STACKCTL_ENVIRONMENT";

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub project: ProjectConfig,

    /// Logging and tracing configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Probe backoff and budget defaults.
    #[serde(default)]
    pub health: HealthConfig,

    #[serde(default)]
    pub run: RunConfig,

    #[serde(default)]
    pub reports: ReportsConfig,

    #[serde(default)]
    pub backup: BackupConfig,
}

impl Config {
    /// Parse configuration from TOML content.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or validation fails.
    pub fn parse_toml(content: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;

        if let Ok(environment) = std::env::var(ENVIRONMENT_VAR) {
            if !environment.trim().is_empty() {
                config.project.default_environment = environment.trim().to_string();
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsing fails.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        Self::parse_toml(&content)
    }

    /// The requested environment, or the configured default.
    #[must_use]
    pub fn environment(&self, requested: Option<&str>) -> String {
        requested
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map_or_else(|| self.project.default_environment.clone(), str::to_string)
    }

    fn validate(&self) -> Result<()> {
        if self.project.default_environment.is_empty() {
            return Err(ConfigError::MissingField {
                field: "default_environment",
            }
            .into());
        }
        if self.runtime.binary.trim().is_empty() {
            return Err(ConfigError::MissingField { field: "binary" }.into());
        }
        if self.health.base_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "base_interval_ms",
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }
        if self.health.max_interval_ms < self.health.base_interval_ms {
            return Err(ConfigError::InvalidValue {
                field: "max_interval_ms",
                reason: "must be >= base_interval_ms".to_string(),
            }
            .into());
        }
        if self.health.multiplier < 1.0 {
            return Err(ConfigError::InvalidValue {
                field: "multiplier",
                reason: "must be >= 1.0".to_string(),
            }
            .into());
        }
        if self.health.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_attempts",
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }
        if self.health.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "timeout_secs",
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }
        if self.run.timeout_secs == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "run.timeout_secs",
                reason: "must be greater than 0 when set".to_string(),
            }
            .into());
        }
        if self.reports.keep == 0 {
            return Err(ConfigError::InvalidValue {
                field: "reports.keep",
                reason: "must keep at least one report".to_string(),
            }
            .into());
        }
        if self.backup.keep == 0 {
            return Err(ConfigError::InvalidValue {
                field: "backup.keep",
                reason: "must keep at least one snapshot".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn empty_config_uses_defaults() {
        let config = Config::parse_toml("").unwrap();
        assert_eq!(config.runtime.binary, "docker");
        assert_eq!(config.health.max_attempts, 10);
        assert_eq!(config.reports.retention_days, 30);
        assert_eq!(config.backup.keep, 7);
        assert!(config.run.timeout().is_none());
    }

    #[test]
    fn sections_override_defaults() {
        let config = Config::parse_toml(
            r#"
[project]
manifest_dir = "deploy"

[runtime]
binary = "podman"

[health]
base_interval_ms = 100
max_interval_ms = 1000
max_attempts = 3

[run]
timeout_secs = 600
"#,
        )
        .unwrap();
        assert_eq!(config.project.manifest_dir, Path::new("deploy"));
        assert_eq!(config.runtime.binary, "podman");
        assert_eq!(config.health.budget().max_attempts, 3);
        assert_eq!(
            config.health.policy().delay(2),
            std::time::Duration::from_millis(200)
        );
        assert_eq!(config.run.timeout(), Some(std::time::Duration::from_secs(600)));
    }

    #[test]
    fn rejects_inverted_backoff() {
        let err = Config::parse_toml("[health]\nbase_interval_ms = 500\nmax_interval_ms = 100\n")
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::InvalidValue {
                field: "max_interval_ms",
                ..
            })
        ));
    }

    #[test]
    fn rejects_unknown_sections() {
        assert!(matches!(
            Config::parse_toml("[wallet]\nkey = 1\n"),
            Err(Error::Config(ConfigError::Parse(_)))
        ));
    }

    #[test]
    fn explicit_environment_wins() {
        let config = Config::default();
        assert_eq!(config.environment(Some("prod")), "prod");
        assert_eq!(config.environment(Some("  ")), config.project.default_environment);
    }
}
