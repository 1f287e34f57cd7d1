//! Health operator implementation.

use async_trait::async_trait;

use crate::error::Result;
use crate::infrastructure::bootstrap;
use crate::port::inbound::operator::health::{HealthOperator, HealthReport, HealthRequest, HealthRow};

use super::{entry::Operator, shared};

#[async_trait]
impl HealthOperator for Operator {
    async fn check_health(&self, request: HealthRequest) -> Result<HealthReport> {
        let session = shared::session(&request.config_toml, request.environment.as_deref())?;
        let manifest = bootstrap::load_manifest(&session.config, &session.environment)?;
        let set = &manifest.services;
        let services = shared::selected_services(set, &request.services)?;

        let mut budget = session.config.health.budget();
        if let Some(attempts) = request.attempts {
            budget.max_attempts = attempts.max(1);
        }

        let runtime = bootstrap::build_runtime(&session.config);
        let prober = bootstrap::build_prober(&session.config, runtime);
        let checks: Vec<String> = services.iter().map(shared::check_kind).collect();
        let verdicts = prober.probe_all(&set.project, services, budget).await;

        let rows = verdicts
            .into_iter()
            .zip(checks)
            .map(|(verdict, check)| HealthRow {
                service: verdict.service.to_string(),
                check,
                healthy: verdict.healthy,
                attempts: verdict.attempts,
                latency_ms: verdict.latency_ms,
                error: verdict.last_error,
            })
            .collect();

        Ok(HealthReport {
            environment: session.environment,
            rows,
        })
    }
}
