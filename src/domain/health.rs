//! Health verdict types.

use serde::{Deserialize, Serialize};

use super::id::ServiceId;

/// Result of probing one service.
///
/// Derived per run and attached to the run's service records; it is never
/// persisted on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthVerdict {
    pub service: ServiceId,
    pub healthy: bool,
    /// Time from the first attempt until the verdict was reached.
    pub latency_ms: u64,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl HealthVerdict {
    /// Verdict for a service without a declared check.
    #[must_use]
    pub fn unchecked(service: ServiceId) -> Self {
        Self {
            service,
            healthy: true,
            latency_ms: 0,
            attempts: 0,
            last_error: None,
        }
    }

    #[must_use]
    pub fn healthy(service: ServiceId, attempts: u32, latency_ms: u64) -> Self {
        Self {
            service,
            healthy: true,
            latency_ms,
            attempts,
            last_error: None,
        }
    }

    #[must_use]
    pub fn unhealthy(
        service: ServiceId,
        attempts: u32,
        latency_ms: u64,
        last_error: impl Into<String>,
    ) -> Self {
        Self {
            service,
            healthy: false,
            latency_ms,
            attempts,
            last_error: Some(last_error.into()),
        }
    }
}

/// Aggregate of a health sweep over several services.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthSummary {
    pub verdicts: Vec<HealthVerdict>,
}

impl HealthSummary {
    #[must_use]
    pub fn new(verdicts: Vec<HealthVerdict>) -> Self {
        Self { verdicts }
    }

    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.verdicts.iter().all(|v| v.healthy)
    }

    #[must_use]
    pub fn unhealthy_count(&self) -> usize {
        self.verdicts.iter().filter(|v| !v.healthy).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unchecked_services_are_healthy_without_attempts() {
        let verdict = HealthVerdict::unchecked(ServiceId::new("docs"));
        assert!(verdict.healthy);
        assert_eq!(verdict.attempts, 0);
    }

    #[test]
    fn summary_counts_unhealthy() {
        let summary = HealthSummary::new(vec![
            HealthVerdict::healthy(ServiceId::new("db"), 1, 5),
            HealthVerdict::unhealthy(ServiceId::new("api"), 3, 900, "connection refused"),
        ]);
        assert!(!summary.is_healthy());
        assert_eq!(summary.unhealthy_count(), 1);
    }

    #[test]
    fn empty_summary_is_healthy() {
        assert!(HealthSummary::default().is_healthy());
    }
}
