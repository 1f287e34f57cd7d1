//! Single-attempt readiness check port.

use async_trait::async_trait;

use crate::domain::id::ServiceId;
use crate::domain::service::HealthCheck;

/// Result of one readiness attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Ready,
    /// Not ready yet, with the reason observed.
    NotReady(String),
}

impl ProbeOutcome {
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

/// Performs exactly one attempt of a declared health check.
///
/// Retries, backoff and the overall deadline belong to the caller.
#[async_trait]
pub trait ReadinessCheck: Send + Sync {
    async fn check(&self, project: &str, service: &ServiceId, check: &HealthCheck) -> ProbeOutcome;
}
