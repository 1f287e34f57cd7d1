//! Manifest operator implementation.

use crate::error::Result;
use crate::infrastructure::bootstrap;
use crate::port::inbound::operator::manifest::{ManifestOperator, ManifestSummary, ServiceView};

use super::{entry::Operator, shared};

impl ManifestOperator for Operator {
    fn validate_manifest(
        &self,
        config_toml: &str,
        environment: Option<&str>,
    ) -> Result<ManifestSummary> {
        let session = shared::session(config_toml, environment)?;
        let loaded = bootstrap::load_manifest(&session.config, &session.environment)?;
        let set = &loaded.services;
        let start_order = set.start_order();

        let services = start_order
            .iter()
            .filter_map(|id| set.get(id))
            .map(|service| ServiceView {
                name: service.id.to_string(),
                image: service.image.clone(),
                replicas: service.replicas,
                depends_on: service.depends_on.iter().map(ToString::to_string).collect(),
                health: shared::check_kind(service),
                build: service.is_buildable(),
            })
            .collect();

        Ok(ManifestSummary {
            project: set.project.clone(),
            environment: set.environment.clone(),
            sources: loaded
                .sources
                .iter()
                .map(|s| s.path.display().to_string())
                .collect(),
            start_order: start_order.iter().map(ToString::to_string).collect(),
            services,
            volumes: set.volumes.keys().cloned().collect(),
            database: set.database.as_ref().map(|db| db.service.to_string()),
        })
    }
}
