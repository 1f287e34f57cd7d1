//! Health prober: bounded, backed-off readiness polling.
//!
//! The prober owns retries and the overall deadline; a [`ReadinessCheck`]
//! performs exactly one attempt. Exhausting the budget yields an unhealthy
//! verdict, never an error.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::domain::health::HealthVerdict;
use crate::domain::service::Service;
use crate::port::outbound::probe::{ProbeOutcome, ReadinessCheck};

/// Exponential backoff between probe attempts.
///
/// `delay(attempt) = min(base * multiplier^(attempt - 1), ceiling)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub multiplier: f64,
    pub ceiling: Duration,
}

impl BackoffPolicy {
    #[must_use]
    pub const fn new(base: Duration, multiplier: f64, ceiling: Duration) -> Self {
        Self {
            base,
            multiplier,
            ceiling,
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let millis = self.base.as_millis() as f64 * self.multiplier.powi(exponent);
        let ceiling = self.ceiling.as_millis() as f64;
        if !millis.is_finite() || millis >= ceiling {
            self.ceiling
        } else {
            Duration::from_millis(millis.max(0.0) as u64)
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(500), 2.0, Duration::from_secs(5))
    }
}

/// Time and attempt budget for probing one service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeBudget {
    pub timeout: Duration,
    pub max_attempts: u32,
}

impl ProbeBudget {
    #[must_use]
    pub const fn new(timeout: Duration, max_attempts: u32) -> Self {
        Self {
            timeout,
            max_attempts,
        }
    }

    /// Apply the service's manifest overrides.
    #[must_use]
    pub fn for_service(&self, service: &Service) -> Self {
        Self {
            timeout: service
                .probe
                .timeout_secs
                .map_or(self.timeout, Duration::from_secs),
            max_attempts: service.probe.attempts.unwrap_or(self.max_attempts),
        }
    }
}

impl Default for ProbeBudget {
    fn default() -> Self {
        Self::new(Duration::from_secs(60), 10)
    }
}

/// Polls readiness checks with bounded retries.
///
/// Stateless apart from its immutable inputs; cheap to clone and safe to use
/// concurrently for different services.
#[derive(Clone)]
pub struct HealthProber {
    check: Arc<dyn ReadinessCheck>,
    policy: BackoffPolicy,
}

impl HealthProber {
    pub fn new(check: Arc<dyn ReadinessCheck>, policy: BackoffPolicy) -> Self {
        Self { check, policy }
    }

    #[must_use]
    pub fn policy(&self) -> BackoffPolicy {
        self.policy
    }

    /// Probe `service` until it is ready, `max_attempts` are spent, or
    /// `timeout` elapses.
    pub async fn probe(
        &self,
        project: &str,
        service: &Service,
        timeout: Duration,
        max_attempts: u32,
    ) -> HealthVerdict {
        let Some(check) = &service.health else {
            return HealthVerdict::unchecked(service.id.clone());
        };

        let started = Instant::now();
        let deadline = started + timeout;
        let mut attempts = 0u32;
        let mut last_error = String::from("no attempt made within the probe budget");

        while attempts < max_attempts {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            attempts += 1;

            let attempt = self.check.check(project, &service.id, check);
            match tokio::time::timeout(deadline - now, attempt).await {
                Ok(ProbeOutcome::Ready) => {
                    let latency = elapsed_ms(started);
                    debug!(service = %service.id, attempts, latency_ms = latency, "Service ready");
                    return HealthVerdict::healthy(service.id.clone(), attempts, latency);
                }
                Ok(ProbeOutcome::NotReady(reason)) => {
                    debug!(service = %service.id, attempt = attempts, reason = %reason, "Not ready");
                    last_error = reason;
                }
                Err(_) => {
                    last_error = format!("attempt {attempts} exceeded the probe timeout");
                }
            }

            if attempts >= max_attempts {
                break;
            }
            let delay = self.policy.delay(attempts);
            if Instant::now() + delay >= deadline {
                last_error = format!("{last_error} (probe timeout reached)");
                break;
            }
            tokio::time::sleep(delay).await;
        }

        let latency = elapsed_ms(started);
        warn!(
            service = %service.id,
            attempts,
            latency_ms = latency,
            error = %last_error,
            "Service unhealthy"
        );
        HealthVerdict::unhealthy(service.id.clone(), attempts, latency, last_error)
    }

    /// Probe with a configured budget, applying manifest overrides.
    pub async fn probe_with(
        &self,
        project: &str,
        service: &Service,
        budget: ProbeBudget,
    ) -> HealthVerdict {
        let budget = budget.for_service(service);
        self.probe(project, service, budget.timeout, budget.max_attempts)
            .await
    }

    /// Probe several services concurrently; verdicts come back in input order.
    pub async fn probe_all(
        &self,
        project: &str,
        services: Vec<Service>,
        budget: ProbeBudget,
    ) -> Vec<HealthVerdict> {
        let mut tasks = JoinSet::new();
        for (index, service) in services.iter().cloned().enumerate() {
            let prober = self.clone();
            let project = project.to_string();
            tasks.spawn(async move { (index, prober.probe_with(&project, &service, budget).await) });
        }

        let mut verdicts: Vec<Option<HealthVerdict>> = vec![None; services.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, verdict)) => verdicts[index] = Some(verdict),
                Err(e) => warn!(error = %e, "Probe task failed"),
            }
        }

        verdicts
            .into_iter()
            .zip(services)
            .map(|(verdict, service)| {
                verdict.unwrap_or_else(|| {
                    HealthVerdict::unhealthy(service.id, 0, 0, "probe task failed")
                })
            })
            .collect()
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
