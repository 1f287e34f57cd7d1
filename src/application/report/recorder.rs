//! Samples resources, generates and publishes a run's report.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use super::generator::{self, ResourceSnapshot};
use super::store::ReportStore;
use crate::domain::run::RunState;
use crate::port::outbound::resource::ResourceSampler;
use crate::port::outbound::runtime::ContainerRuntime;

#[derive(Clone)]
pub struct ReportRecorder {
    runtime: Arc<dyn ContainerRuntime>,
    sampler: Arc<dyn ResourceSampler>,
    store: ReportStore,
}

impl ReportRecorder {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        sampler: Arc<dyn ResourceSampler>,
        store: ReportStore,
    ) -> Self {
        Self {
            runtime,
            sampler,
            store,
        }
    }

    #[must_use]
    pub fn store(&self) -> &ReportStore {
        &self.store
    }

    /// Host figures plus per-container usage when the runtime answers.
    pub async fn sample(&self, project: &str) -> ResourceSnapshot {
        let host = self.sampler.sample_host();
        let (containers, container_error) = match self.runtime.usage(project).await {
            Ok(usage) => (usage, None),
            Err(e) => (Vec::new(), Some(e.to_string())),
        };
        ResourceSnapshot {
            sampled_at: Some(Utc::now()),
            host,
            containers,
            container_error,
        }
    }

    /// Publish the report of a concluded run.
    ///
    /// A failed write is logged and yields `None`; the run outcome stands.
    pub async fn record(&self, run: &RunState, project: &str) -> Option<PathBuf> {
        let resources = self.sample(project).await;
        let report = generator::generate(run, project, resources);
        match self.store.publish(&report) {
            Ok(path) => {
                info!(run_id = %run.run_id, path = %path.display(), "Run report written");
                Some(path)
            }
            Err(e) => {
                warn!(run_id = %run.run_id, error = %e, "Failed to write run report");
                None
            }
        }
    }
}
