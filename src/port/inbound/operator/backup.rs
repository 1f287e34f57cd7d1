//! Backup and restore use-cases for operator-facing adapters.

use async_trait::async_trait;
use serde::Serialize;

use super::lifecycle::RunSummary;
use crate::error::Result;

#[derive(Debug, Clone, Default)]
pub struct BackupRequest {
    /// Raw TOML configuration content.
    pub config_toml: String,
    pub environment: Option<String>,
}

/// A published snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct BackupReceipt {
    pub snapshot_id: String,
    pub environment: String,
    pub artifacts: usize,
    pub bytes: u64,
    pub database_dump: bool,
    /// Ids of older snapshots removed by retention.
    pub pruned: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RestoreRequest {
    /// Raw TOML configuration content.
    pub config_toml: String,
    pub environment: Option<String>,
    pub snapshot: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RestoreReceipt {
    pub snapshot_id: String,
    pub environment: String,
    pub volumes_restored: usize,
    pub database_restored: bool,
    /// The final health-gated start of the whole stack.
    pub start: RunSummary,
}

/// Listing entry for `snapshots`.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotListing {
    pub id: String,
    pub created_at: String,
    pub volumes: usize,
    pub database_dump: bool,
    pub bytes: u64,
}

/// Backup and restore use-cases for operator-facing adapters.
///
/// # Thread Safety
///
/// Implementations must be thread-safe (`Send + Sync`).
#[async_trait]
pub trait BackupOperator: Send + Sync {
    /// Snapshot volumes and the database of a quiesced stack.
    ///
    /// # Errors
    ///
    /// Returns an error if the stack is not quiesced, another run holds the
    /// environment, or any archive or dump step fails. Nothing is published
    /// on error.
    async fn backup(&self, request: BackupRequest) -> Result<BackupReceipt>;

    /// Replay a snapshot into the stack.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot is missing or corrupt, or a step
    /// fails. A failure after the stack was stopped leaves a
    /// restore-incomplete marker behind.
    async fn restore(&self, request: RestoreRequest) -> Result<RestoreReceipt>;

    /// Published snapshots, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid or the snapshot
    /// directory cannot be read.
    fn list_snapshots(
        &self,
        config_toml: &str,
        environment: Option<&str>,
    ) -> Result<Vec<SnapshotListing>>;
}
