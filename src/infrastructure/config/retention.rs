//! Run deadline and retention configuration.

use std::time::Duration;

use serde::Deserialize;

use crate::application::report::retention::RetentionPolicy;

/// Per-run limits.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunConfig {
    /// Wall-clock limit for one run; unbounded when absent.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl RunConfig {
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// Report retention.
#[derive(Debug, Clone, Deserialize)]
pub struct ReportsConfig {
    /// The newest reports kept regardless of age.
    #[serde(default = "default_report_keep")]
    pub keep: usize,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_report_keep() -> usize {
    20
}

fn default_retention_days() -> u32 {
    30
}

impl ReportsConfig {
    #[must_use]
    pub fn policy(&self) -> RetentionPolicy {
        RetentionPolicy::new(self.keep, self.retention_days)
    }
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            keep: default_report_keep(),
            retention_days: default_retention_days(),
        }
    }
}

/// Snapshot retention.
#[derive(Debug, Clone, Deserialize)]
pub struct BackupConfig {
    #[serde(default = "default_backup_keep")]
    pub keep: usize,
}

fn default_backup_keep() -> usize {
    7
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            keep: default_backup_keep(),
        }
    }
}
