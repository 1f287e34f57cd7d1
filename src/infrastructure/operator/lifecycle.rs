//! Lifecycle operator implementation.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::application::lifecycle::controller::RunRequest;
use crate::error::Result;
use crate::infrastructure::bootstrap;
use crate::port::inbound::operator::lifecycle::{LifecycleOperator, LifecycleRequest, RunSummary};

use super::{entry::Operator, shared};

#[async_trait]
impl LifecycleOperator for Operator {
    async fn execute(&self, request: LifecycleRequest) -> Result<RunSummary> {
        let session = shared::session(&request.config_toml, request.environment.as_deref())?;
        let stack = bootstrap::build_stack(&session.config, &session.environment)?;
        let set = &stack.manifest.services;

        let run = RunRequest {
            action: request.action,
            services: shared::service_ids(set, &request.services)?,
            build: request.build,
            replicas: request.replicas,
        };
        info!(
            project = %set.project,
            environment = %session.environment,
            action = %request.action,
            services = ?request.services,
            "Run requested"
        );

        let cancel = CancellationToken::new();
        let _interrupt = shared::cancel_on_interrupt(&cancel);
        let outcome = stack.controller.execute(set, run, cancel).await?;
        Ok(shared::summarize(&outcome))
    }
}
