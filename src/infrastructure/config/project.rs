//! Project location configuration.

use std::path::PathBuf;

use serde::Deserialize;

/// Where the manifest and the state directory live.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectConfig {
    /// Directory holding `stack.toml` and its overlays.
    #[serde(default = "default_manifest_dir")]
    pub manifest_dir: PathBuf,
    /// Locks, reports, snapshots and last-good records.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    /// Environment used when none is given. `STACKCTL_ENVIRONMENT` overrides.
    #[serde(default = "default_environment")]
    pub default_environment: String,
}

fn default_manifest_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".stackctl")
}

fn default_environment() -> String {
    "dev".to_string()
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            manifest_dir: default_manifest_dir(),
            state_dir: default_state_dir(),
            default_environment: default_environment(),
        }
    }
}
