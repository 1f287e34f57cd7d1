//! Logging configuration and initialization.

use serde::Deserialize;
use tracing_subscriber::{fmt, EnvFilter};

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default = "default_format")]
    pub format: String,
}

fn default_level() -> String {
    "info".into()
}

fn default_format() -> String {
    "pretty".into()
}

impl LoggingConfig {
    /// Filter directive after applying `-v` flags.
    #[must_use]
    pub fn effective_level(&self, verbosity: u8) -> String {
        match verbosity {
            0 => self.level.clone(),
            1 => "debug".into(),
            _ => "trace".into(),
        }
    }

    /// Initialize the tracing subscriber with this logging configuration.
    ///
    /// Logs go to stderr so stdout carries only command output. `RUST_LOG`
    /// wins over the configured level.
    pub fn init(&self, verbosity: u8) {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.effective_level(verbosity)));

        // A second init (e.g. from tests) keeps the first subscriber.
        let _ = match self.format.as_str() {
            "json" => fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init(),
            _ => fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init(),
        };
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: default_format(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_raises_level() {
        let config = LoggingConfig::default();
        assert_eq!(config.effective_level(0), "info");
        assert_eq!(config.effective_level(1), "debug");
        assert_eq!(config.effective_level(3), "trace");
    }
}
