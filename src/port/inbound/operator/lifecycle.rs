//! Lifecycle use-cases for operator-facing adapters.
//!
//! Covers every stack-mutating action: start, stop, restart, build, pull,
//! update, scale and rollback.

use async_trait::async_trait;
use serde::Serialize;

use crate::domain::run::{Action, RunStatus};
use crate::error::Result;

/// A lifecycle action requested by an operator.
#[derive(Debug, Clone)]
pub struct LifecycleRequest {
    /// Raw TOML configuration content. Empty means defaults.
    pub config_toml: String,

    /// Target environment; the configured default when `None`.
    pub environment: Option<String>,

    /// Action to perform.
    pub action: Action,

    /// Selected service names. Empty selects every enabled service.
    pub services: Vec<String>,

    /// Build images before starting (`start --build`).
    pub build: bool,

    /// Replica count for `scale`.
    pub replicas: Option<u32>,
}

impl LifecycleRequest {
    /// A request with no selection, build or replica override.
    pub fn new(config_toml: impl Into<String>, action: Action) -> Self {
        Self {
            config_toml: config_toml.into(),
            environment: None,
            action,
            services: Vec::new(),
            build: false,
            replicas: None,
        }
    }
}

/// Final state of one service after a run.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceOutcome {
    pub service: String,
    pub phase: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub healthy: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Display-ready outcome of a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub environment: String,
    pub action: Action,
    pub status: RunStatus,
    pub services: Vec<ServiceOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<String>,
    pub cancelled: bool,
    pub deadline_exceeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    /// Location of the structured report, when one was written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<String>,
}

impl RunSummary {
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.status.is_success()
    }
}

/// Lifecycle use-cases for operator-facing adapters.
///
/// # Thread Safety
///
/// Implementations must be thread-safe (`Send + Sync`).
#[async_trait]
pub trait LifecycleOperator: Send + Sync {
    /// Execute a lifecycle action against one environment.
    ///
    /// A run that finishes `PartiallyFailed` or `Aborted` is still returned
    /// as `Ok`; the summary carries the status.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration or the manifest is invalid, a
    /// selected service is unknown, or another run holds the environment.
    async fn execute(&self, request: LifecycleRequest) -> Result<RunSummary>;
}
