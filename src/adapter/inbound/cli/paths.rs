//! Path utilities for stackctl.
//!
//! Configuration is looked up in order:
//! - `--config PATH` when given
//! - `./stackctl.toml`
//! - `~/.stackctl/config.toml`

use std::path::{Path, PathBuf};

/// Config file name looked up in the working directory.
pub const LOCAL_CONFIG: &str = "stackctl.toml";

/// Returns the stackctl home directory (`~/.stackctl/`).
pub fn home_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".stackctl")
}

/// Returns the per-user config file path (`~/.stackctl/config.toml`).
pub fn default_config() -> PathBuf {
    home_dir().join("config.toml")
}

/// The config file to read, if any.
pub fn resolve_config(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    [PathBuf::from(LOCAL_CONFIG), default_config()]
        .into_iter()
        .find(|candidate| candidate.is_file())
}
