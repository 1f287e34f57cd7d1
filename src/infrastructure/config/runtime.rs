//! Container runtime configuration.

use serde::Deserialize;

/// Which runtime binary to drive and how patiently.
#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    /// A `docker`-compatible CLI, e.g. `docker` or `podman`.
    #[serde(default = "default_binary")]
    pub binary: String,
    /// Grace period passed to `stop` before the runtime kills a container.
    #[serde(default = "default_stop_timeout_secs")]
    pub stop_timeout_secs: u64,
}

fn default_binary() -> String {
    "docker".to_string()
}

fn default_stop_timeout_secs() -> u64 {
    10
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            stop_timeout_secs: default_stop_timeout_secs(),
        }
    }
}
