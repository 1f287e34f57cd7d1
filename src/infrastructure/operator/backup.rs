//! Backup operator implementation.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::application::backup::manager::BackupManager;
use crate::domain::id::SnapshotId;
use crate::error::Result;
use crate::infrastructure::bootstrap;
use crate::port::inbound::operator::backup::{
    BackupOperator, BackupReceipt, BackupRequest, RestoreReceipt, RestoreRequest, SnapshotListing,
};

use super::{entry::Operator, shared};

#[async_trait]
impl BackupOperator for Operator {
    async fn backup(&self, request: BackupRequest) -> Result<BackupReceipt> {
        let session = shared::session(&request.config_toml, request.environment.as_deref())?;
        let stack = bootstrap::build_stack(&session.config, &session.environment)?;
        let outcome = stack.backups.backup(&stack.manifest).await?;
        let manifest = &outcome.manifest;

        Ok(BackupReceipt {
            snapshot_id: manifest.id.to_string(),
            environment: manifest.environment.clone(),
            artifacts: manifest.artifacts.len(),
            bytes: manifest.total_bytes(),
            database_dump: manifest.database_dump().is_some(),
            pruned: outcome.pruned.iter().map(ToString::to_string).collect(),
        })
    }

    async fn restore(&self, request: RestoreRequest) -> Result<RestoreReceipt> {
        let session = shared::session(&request.config_toml, request.environment.as_deref())?;
        let stack = bootstrap::build_stack(&session.config, &session.environment)?;
        let id = SnapshotId::new(request.snapshot.trim());

        let cancel = CancellationToken::new();
        let _interrupt = shared::cancel_on_interrupt(&cancel);
        let outcome = stack
            .backups
            .restore(&stack.manifest.services, &id, cancel)
            .await?;

        Ok(RestoreReceipt {
            snapshot_id: outcome.snapshot.id.to_string(),
            environment: outcome.snapshot.environment.clone(),
            volumes_restored: outcome.volumes_restored.len(),
            database_restored: outcome.database_restored,
            start: shared::summarize(&outcome.start),
        })
    }

    fn list_snapshots(
        &self,
        config_toml: &str,
        environment: Option<&str>,
    ) -> Result<Vec<SnapshotListing>> {
        let session = shared::session(config_toml, environment)?;
        let runtime = bootstrap::build_runtime(&session.config);
        let backups = BackupManager::new(
            bootstrap::build_controller(&session.config, runtime),
            bootstrap::state_layout(&session.config),
            session.config.backup.keep,
        );

        Ok(backups
            .list(&session.environment)?
            .into_iter()
            .map(|summary| SnapshotListing {
                id: summary.id.to_string(),
                created_at: summary.created_at.to_rfc3339(),
                volumes: summary.volumes,
                database_dump: summary.has_database_dump,
                bytes: summary.bytes,
            })
            .collect())
    }
}
