//! Container runtime port.
//!
//! The lifecycle controller and the backup manager drive containers only
//! through this trait. Adapters translate each call into the primitives of a
//! concrete runtime.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::id::ServiceId;
use crate::domain::service::Service;
use crate::error::RuntimeError;

/// One container belonging to the project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerStatus {
    pub service: ServiceId,
    pub container: String,
    pub running: bool,
    /// Runtime-reported state text, e.g. `running` or `exited (1)`.
    pub state: String,
}

/// Point-in-time resource usage of one container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerUsage {
    pub container: String,
    pub cpu_percent: f64,
    pub memory_bytes: u64,
}

/// Result of running a command inside a service container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: String,
}

impl ExecOutput {
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runtime primitives used by the orchestrator.
///
/// All calls are idempotent from the orchestrator's point of view: starting a
/// service that already runs the requested replica count, or stopping one
/// that is not running, succeeds without effect.
///
/// # Thread Safety
///
/// Implementations must be thread-safe (`Send + Sync`); one instance serves
/// every per-service task of a run.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Check that the runtime answers.
    async fn ping(&self) -> Result<(), RuntimeError>;

    /// Build the service image from its build section.
    async fn build(&self, project: &str, service: &Service) -> Result<(), RuntimeError>;

    /// Pull the service image.
    async fn pull(&self, project: &str, service: &Service) -> Result<(), RuntimeError>;

    /// Reconcile the service to exactly `service.replicas` running containers.
    async fn start(&self, project: &str, service: &Service) -> Result<(), RuntimeError>;

    /// Stop and remove every container of the service.
    async fn stop(&self, project: &str, service: &ServiceId) -> Result<(), RuntimeError>;

    /// Run a command in the first running container of the service.
    async fn exec(
        &self,
        project: &str,
        service: &ServiceId,
        command: &[String],
        stdin: Option<Vec<u8>>,
    ) -> Result<ExecOutput, RuntimeError>;

    /// List the project's containers, running or not.
    async fn list(&self, project: &str) -> Result<Vec<ContainerStatus>, RuntimeError>;

    /// Resource usage of the project's running containers.
    async fn usage(&self, project: &str) -> Result<Vec<ContainerUsage>, RuntimeError>;
}
