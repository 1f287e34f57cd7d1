//! Health check use-cases for operator-facing adapters.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;

/// Request for an on-demand health sweep.
#[derive(Debug, Clone, Default)]
pub struct HealthRequest {
    /// Raw TOML configuration content.
    pub config_toml: String,
    pub environment: Option<String>,
    /// Limit the sweep to these services; empty means all enabled services.
    pub services: Vec<String>,
    /// Override the configured attempt budget.
    pub attempts: Option<u32>,
}

/// One row of the health table.
#[derive(Debug, Clone, Serialize)]
pub struct HealthRow {
    pub service: String,
    /// Check kind (`http`, `tcp`, `exec`) or `none`.
    pub check: String,
    pub healthy: bool,
    pub attempts: u32,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of a health sweep.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub environment: String,
    pub rows: Vec<HealthRow>,
}

impl HealthReport {
    #[must_use]
    pub fn unhealthy_count(&self) -> usize {
        self.rows.iter().filter(|row| !row.healthy).count()
    }
}

/// Health use-cases for operator-facing adapters.
#[async_trait]
pub trait HealthOperator: Send + Sync {
    /// Probe every selected service once, with retries, and report.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration or the manifest is invalid.
    async fn check_health(&self, request: HealthRequest) -> Result<HealthReport>;
}
