//! Canonical test configurations.
//!
//! Single source of truth for `stackctl.toml` contents used across tests.
//! Avoids each test module defining its own slightly-different defaults.

use std::path::Path;

use crate::infrastructure::config::settings::Config;

/// A runtime binary that does not exist, so nothing touches a real daemon.
pub const ABSENT_RUNTIME: &str = "stackctl-test-no-runtime";

/// Config TOML pointing at `manifest_dir` and `state_dir` with fast probes
/// and an absent runtime binary.
pub fn toml(manifest_dir: &Path, state_dir: &Path) -> String {
    format!(
        r#"[project]
manifest_dir = {manifest:?}
state_dir = {state:?}
default_environment = "dev"

[runtime]
binary = "{ABSENT_RUNTIME}"

[health]
base_interval_ms = 5
max_interval_ms = 20
max_attempts = 2
timeout_secs = 1

[reports]
keep = 5
"#,
        manifest = manifest_dir.display().to_string(),
        state = state_dir.display().to_string(),
    )
}

/// Parsed form of [`toml`].
pub fn config(manifest_dir: &Path, state_dir: &Path) -> Config {
    Config::parse_toml(&toml(manifest_dir, state_dir)).expect("canonical test config parses")
}
