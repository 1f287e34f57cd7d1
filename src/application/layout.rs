//! On-disk layout of the state directory.
//!
//! ```text
//! <state_dir>/
//!   locks/<env>.lock
//!   environments/<env>/last-good.json
//!   environments/<env>/restore-incomplete.json
//!   snapshots/<env>/<snapshot-id>/
//!   reports/<env>/<ts>-<action>-<run>.{json,log}
//! ```

use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateLayout {
    root: PathBuf,
}

impl StateLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn locks_dir(&self) -> PathBuf {
        self.root.join("locks")
    }

    #[must_use]
    pub fn environment_dir(&self, environment: &str) -> PathBuf {
        self.root.join("environments").join(environment)
    }

    #[must_use]
    pub fn snapshots_dir(&self, environment: &str) -> PathBuf {
        self.root.join("snapshots").join(environment)
    }

    #[must_use]
    pub fn reports_dir(&self, environment: &str) -> PathBuf {
        self.root.join("reports").join(environment)
    }
}
