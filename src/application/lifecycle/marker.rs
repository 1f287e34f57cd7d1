//! Restore-incomplete marker.
//!
//! Written by restore once the stack is stopped and removed only after the
//! restored data is in place. While it exists the controller refuses runs.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::application::layout::StateLayout;
use crate::application::persist;
use crate::error::Result;

const FILE_NAME: &str = "restore-incomplete.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreMarker {
    pub snapshot: String,
    /// Last restore step that was started.
    pub step: String,
    pub since: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MarkerStore {
    layout: StateLayout,
}

impl MarkerStore {
    pub fn new(layout: StateLayout) -> Self {
        Self { layout }
    }

    #[must_use]
    pub fn path(&self, environment: &str) -> PathBuf {
        self.layout.environment_dir(environment).join(FILE_NAME)
    }

    pub fn write(&self, environment: &str, marker: &RestoreMarker) -> Result<()> {
        persist::write_json(&self.path(environment), marker)
    }

    pub fn read(&self, environment: &str) -> Result<Option<RestoreMarker>> {
        persist::read_json(&self.path(environment))
    }

    pub fn clear(&self, environment: &str) -> Result<()> {
        persist::remove_if_exists(&self.path(environment))?;
        Ok(())
    }
}
