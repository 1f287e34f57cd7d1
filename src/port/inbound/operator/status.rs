//! Status projection types for operator-facing adapters.
//!
//! Defines view models for the read-only `status` display.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;

/// One container as shown in status displays.
#[derive(Debug, Clone, Serialize)]
pub struct ContainerView {
    pub service: String,
    pub container: String,
    pub running: bool,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_bytes: Option<u64>,
}

/// Current holder of the environment lock.
#[derive(Debug, Clone, Serialize)]
pub struct LockView {
    pub holder: String,
    pub purpose: String,
    pub pid: u32,
    pub host: String,
    pub since: String,
    /// The holder process is gone and the lock will be reclaimed.
    pub stale: bool,
}

/// The most recent recorded run.
#[derive(Debug, Clone, Serialize)]
pub struct LastRunView {
    pub run_id: String,
    pub action: String,
    pub status: String,
    pub finished_at: Option<String>,
}

/// An outstanding restore-incomplete marker.
#[derive(Debug, Clone, Serialize)]
pub struct RestoreMarkerView {
    pub snapshot: String,
    pub step: String,
    pub since: String,
}

/// Host resources in display units.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HostView {
    pub memory_available_bytes: Option<u64>,
    pub memory_total_bytes: Option<u64>,
    pub disk_available_bytes: Option<u64>,
    pub disk_total_bytes: Option<u64>,
}

/// Current stack status snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub project: String,
    pub environment: String,
    pub containers: Vec<ContainerView>,
    /// Set when the runtime could not be queried.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime_error: Option<String>,
    pub host: HostView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock: Option<LockView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run: Option<LastRunView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restore_marker: Option<RestoreMarkerView>,
}

/// Status use-cases for operator-facing adapters.
///
/// # Thread Safety
///
/// Implementations must be thread-safe (`Send + Sync`).
#[async_trait]
pub trait StatusOperator: Send + Sync {
    /// Load the current status snapshot. Never mutates state.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration or the manifest is invalid.
    async fn load_status(
        &self,
        config_toml: &str,
        environment: Option<&str>,
    ) -> Result<StatusSnapshot>;
}
