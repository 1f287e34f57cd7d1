//! Status operator implementation.
//!
//! Read-only: queries the runtime and the state directory but never takes
//! the lock or writes anything.

use async_trait::async_trait;
use tracing::warn;

use crate::application::lifecycle::lock::LockManager;
use crate::application::lifecycle::marker::MarkerStore;
use crate::error::Result;
use crate::infrastructure::bootstrap;
use crate::port::inbound::operator::status::{
    ContainerView, HostView, LastRunView, LockView, RestoreMarkerView, StatusOperator,
    StatusSnapshot,
};

use super::{entry::Operator, shared};

#[async_trait]
impl StatusOperator for Operator {
    async fn load_status(
        &self,
        config_toml: &str,
        environment: Option<&str>,
    ) -> Result<StatusSnapshot> {
        let session = shared::session(config_toml, environment)?;
        let config = &session.config;
        let env = session.environment.as_str();
        let manifest = bootstrap::load_manifest(config, env)?;
        let project = manifest.services.project.clone();
        let layout = bootstrap::state_layout(config);
        let runtime = bootstrap::build_runtime(config);

        let (containers, runtime_error) = match runtime.list(&project).await {
            Ok(listed) => {
                let usage = runtime.usage(&project).await.unwrap_or_else(|e| {
                    warn!(error = %e, "Container usage unavailable");
                    Vec::new()
                });
                let views = listed
                    .into_iter()
                    .map(|c| {
                        let sample = usage.iter().find(|u| u.container == c.container);
                        ContainerView {
                            service: c.service.to_string(),
                            container: c.container,
                            running: c.running,
                            state: c.state,
                            cpu_percent: sample.map(|u| u.cpu_percent),
                            memory_bytes: sample.map(|u| u.memory_bytes),
                        }
                    })
                    .collect();
                (views, None)
            }
            Err(e) => (Vec::new(), Some(e.to_string())),
        };

        let host = bootstrap::build_sampler(config).sample_host();
        let lock = LockManager::new(layout.locks_dir())
            .inspect(env)?
            .map(|(record, stale)| LockView {
                holder: record.holder,
                purpose: record.purpose,
                pid: record.pid,
                host: record.host,
                since: record.acquired_at.to_rfc3339(),
                stale,
            });
        let last_run = bootstrap::build_report_store(config)
            .latest(env)?
            .map(|report| LastRunView {
                run_id: report.run_id.to_string(),
                action: report.action.to_string(),
                status: report.status.to_string(),
                finished_at: Some(report.finished_at.to_rfc3339()),
            });
        let restore_marker = MarkerStore::new(layout)
            .read(env)?
            .map(|marker| RestoreMarkerView {
                snapshot: marker.snapshot,
                step: marker.step,
                since: marker.since.to_rfc3339(),
            });

        Ok(StatusSnapshot {
            project,
            environment: session.environment.clone(),
            containers,
            runtime_error,
            host: HostView {
                memory_available_bytes: host.memory_available_bytes,
                memory_total_bytes: host.memory_total_bytes,
                disk_available_bytes: host.disk_available_bytes,
                disk_total_bytes: host.disk_total_bytes,
            },
            lock,
            last_run,
            restore_marker,
        })
    }
}
