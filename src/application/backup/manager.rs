//! Snapshot creation, listing, verification and pruning.
//!
//! A snapshot is assembled in a hidden staging directory next to its final
//! location and published by a single rename, so a listed snapshot is always
//! complete. `snapshot.json` records the SHA-256 of every artifact.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::archive::{self, FileDigest};
use crate::application::layout::StateLayout;
use crate::application::lifecycle::controller::LifecycleController;
use crate::application::manifest::LoadedManifest;
use crate::application::persist;
use crate::domain::id::SnapshotId;
use crate::domain::run::RunStatus;
use crate::domain::service::ServiceSet;
use crate::domain::snapshot::{ArtifactEntry, ArtifactKind, SnapshotManifest, SnapshotSummary};
use crate::error::{BackupError, Error, Result};

const STAGING_PREFIX: &str = ".staging-";
const SERVICE_SET_FILE: &str = "service-set.json";

/// A published snapshot.
#[derive(Debug, Clone)]
pub struct BackupOutcome {
    pub manifest: SnapshotManifest,
    pub path: PathBuf,
    /// Older snapshots removed by retention.
    pub pruned: Vec<SnapshotId>,
}

pub struct BackupManager {
    pub(super) controller: Arc<LifecycleController>,
    pub(super) layout: StateLayout,
    keep: usize,
}

impl BackupManager {
    pub fn new(controller: Arc<LifecycleController>, layout: StateLayout, keep: usize) -> Self {
        Self {
            controller,
            layout,
            keep: keep.max(1),
        }
    }

    /// Snapshot volumes, the database and the manifest of a quiesced stack.
    ///
    /// Holds the environment lock for its whole duration.
    ///
    /// # Errors
    ///
    /// [`BackupError::NotQuiesced`] when the stack may be mid-change, a held
    /// lock, or any archive, dump or I/O failure. A failed backup leaves no
    /// trace in the snapshot directory.
    pub async fn backup(&self, loaded: &LoadedManifest) -> Result<BackupOutcome> {
        let set = &loaded.services;
        let env = set.environment.as_str();
        let _lock = self.controller.locks().acquire(env, "backup")?;

        if let Some(marker) = self.controller.markers().read(env)? {
            return Err(BackupError::NotQuiesced(format!(
                "restore of snapshot {} is incomplete",
                marker.snapshot
            ))
            .into());
        }
        let database_running = self.check_quiesced(set).await?;

        let dir = self.layout.snapshots_dir(env);
        fs::create_dir_all(&dir)?;
        let staging = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(&dir)?;
        let mut artifacts = Vec::new();

        for (name, volume) in &set.volumes {
            let file = format!("volumes/{name}.tar.gz");
            let dest = staging.path().join(&file);
            fs::create_dir_all(dest.parent().unwrap_or(staging.path()))?;
            if !volume.host_path.exists() {
                warn!(volume = %name, path = %volume.host_path.display(), "Volume directory missing; archiving empty");
            }
            let digest = archive::pack_dir(&volume.host_path, &dest).map_err(|e| BackupError::Archive {
                volume: name.clone(),
                reason: e.to_string(),
            })?;
            debug!(volume = %name, bytes = digest.bytes, "Volume archived");
            artifacts.push(entry(name, ArtifactKind::Volume, file, digest));
        }

        if let Some(database) = &set.database {
            if database_running {
                let output = self
                    .controller
                    .runtime()
                    .exec(&set.project, &database.service, &database.dump, None)
                    .await
                    .map_err(|e| BackupError::Dump {
                        service: database.service.to_string(),
                        reason: e.to_string(),
                    })?;
                if !output.success() {
                    return Err(BackupError::Dump {
                        service: database.service.to_string(),
                        reason: format!("exit code {}: {}", output.exit_code, output.stderr.trim()),
                    }
                    .into());
                }
                let file = format!("database/{}.dump", database.service);
                let digest = archive::write_digested(&staging.path().join(&file), &output.stdout)?;
                info!(service = %database.service, bytes = digest.bytes, "Database dumped");
                artifacts.push(entry(database.service.as_str(), ArtifactKind::DatabaseDump, file, digest));
            } else {
                warn!(service = %database.service, "Database is not running; snapshot will not include a dump");
            }
        }

        for source in &loaded.sources {
            let name = source.file_name();
            let file = format!("manifest/{name}");
            let digest = archive::write_digested(&staging.path().join(&file), source.contents.as_bytes())?;
            artifacts.push(entry(&name, ArtifactKind::Manifest, file, digest));
        }

        let resolved = serde_json::to_vec_pretty(set)?;
        let digest = archive::write_digested(&staging.path().join(SERVICE_SET_FILE), &resolved)?;
        artifacts.push(entry("services", ArtifactKind::ServiceSet, SERVICE_SET_FILE.to_string(), digest));

        let created_at = Utc::now();
        let id = unique_id(&dir, created_at);
        let manifest = SnapshotManifest {
            id: id.clone(),
            environment: env.to_string(),
            project: set.project.clone(),
            created_at,
            artifacts,
        };
        persist::write_json(&staging.path().join(SnapshotManifest::FILE_NAME), &manifest)?;
        sync_tree(staging.path())?;

        let path = dir.join(id.as_str());
        fs::rename(staging.path(), &path)?;
        archive::sync_dir(&dir)?;
        info!(
            environment = env,
            snapshot = %id,
            artifacts = manifest.artifacts.len(),
            bytes = manifest.total_bytes(),
            "Snapshot published"
        );

        let pruned = match self.prune(env) {
            Ok(pruned) => pruned,
            Err(e) => {
                warn!(environment = env, error = %e, "Snapshot pruning failed");
                Vec::new()
            }
        };

        Ok(BackupOutcome {
            manifest,
            path,
            pruned,
        })
    }

    /// Published snapshots, newest first.
    pub fn list(&self, environment: &str) -> Result<Vec<SnapshotSummary>> {
        let mut manifests = self.manifests(environment)?;
        manifests.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(manifests.iter().map(SnapshotSummary::from).collect())
    }

    /// Read the metadata of one snapshot.
    pub fn load(&self, environment: &str, id: &SnapshotId) -> Result<SnapshotManifest> {
        let path = self.snapshot_path(environment, id);
        let manifest: Option<SnapshotManifest> =
            persist::read_json(&path.join(SnapshotManifest::FILE_NAME))?;
        let manifest = manifest.ok_or_else(|| BackupError::SnapshotNotFound(id.to_string()))?;
        if &manifest.id != id || manifest.environment != environment {
            return Err(BackupError::Corrupt {
                id: id.to_string(),
                reason: "metadata does not match its location".to_string(),
            }
            .into());
        }
        Ok(manifest)
    }

    /// Recompute every artifact digest.
    pub fn verify(&self, manifest: &SnapshotManifest) -> Result<()> {
        let root = self.snapshot_path(&manifest.environment, &manifest.id);
        for artifact in &manifest.artifacts {
            let corrupt = |reason: String| BackupError::Corrupt {
                id: manifest.id.to_string(),
                reason,
            };
            let digest = archive::digest_file(&root.join(&artifact.file))
                .map_err(|e| corrupt(format!("{}: {e}", artifact.file)))?;
            if digest.sha256 != artifact.sha256 || digest.bytes != artifact.bytes {
                return Err(corrupt(format!("{} does not match its recorded digest", artifact.file)).into());
            }
        }
        Ok(())
    }

    /// Delete the oldest snapshots beyond the retention count.
    pub fn prune(&self, environment: &str) -> Result<Vec<SnapshotId>> {
        let mut ids: Vec<SnapshotId> = self.manifests(environment)?.into_iter().map(|m| m.id).collect();
        ids.sort_by(|a, b| b.cmp(a));
        let expired: Vec<SnapshotId> = ids.into_iter().skip(self.keep).collect();
        for id in &expired {
            fs::remove_dir_all(self.snapshot_path(environment, id))?;
            info!(environment, snapshot = %id, "Snapshot pruned");
        }
        Ok(expired)
    }

    pub(super) fn snapshot_path(&self, environment: &str, id: &SnapshotId) -> PathBuf {
        self.layout.snapshots_dir(environment).join(id.as_str())
    }

    fn manifests(&self, environment: &str) -> Result<Vec<SnapshotManifest>> {
        let dir = self.layout.snapshots_dir(environment);
        let read = match fs::read_dir(&dir) {
            Ok(read) => read,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut manifests = Vec::new();
        for item in read {
            let item = item?;
            let name = item.file_name();
            let name = name.to_string_lossy();
            if name.starts_with('.') || !item.file_type()?.is_dir() {
                continue;
            }
            match persist::read_json::<SnapshotManifest>(&item.path().join(SnapshotManifest::FILE_NAME)) {
                Ok(Some(manifest)) => manifests.push(manifest),
                Ok(None) => warn!(snapshot = %name, "Snapshot directory without metadata"),
                Err(e) => warn!(snapshot = %name, error = %e, "Unreadable snapshot metadata"),
            }
        }
        Ok(manifests)
    }

    /// Whether the stack is safe to snapshot; returns whether the database
    /// service has a running container.
    async fn check_quiesced(&self, set: &ServiceSet) -> Result<bool> {
        let env = set.environment.as_str();
        let last = self.controller.reports().store().latest_mutating(env)?;
        let last_completed = last.as_ref().is_some_and(|r| r.status == RunStatus::Completed);

        let containers = match self.controller.runtime().list(&set.project).await {
            Ok(containers) => containers,
            Err(e) if last_completed => {
                warn!(environment = env, error = %e, "Cannot list containers; trusting last completed run");
                return Ok(set.database.is_some());
            }
            Err(e) => {
                return Err(BackupError::NotQuiesced(format!("cannot list containers: {e}")).into());
            }
        };
        let running: Vec<_> = containers.iter().filter(|c| c.running).collect();

        if !last_completed && !running.is_empty() {
            let reason = match &last {
                Some(report) => format!(
                    "last {} run {} ended {} and {} container(s) are running",
                    report.action,
                    report.run_id,
                    report.status,
                    running.len()
                ),
                None => format!(
                    "no completed run recorded and {} container(s) are running",
                    running.len()
                ),
            };
            return Err(Error::Backup(BackupError::NotQuiesced(reason)));
        }

        Ok(set
            .database
            .as_ref()
            .is_some_and(|db| running.iter().any(|c| c.service == db.service)))
    }
}

fn entry(name: &str, kind: ArtifactKind, file: String, digest: FileDigest) -> ArtifactEntry {
    ArtifactEntry {
        name: name.to_string(),
        kind,
        file,
        sha256: digest.sha256,
        bytes: digest.bytes,
    }
}

fn unique_id(dir: &Path, at: chrono::DateTime<Utc>) -> SnapshotId {
    let mut suffix = 0;
    loop {
        let id = SnapshotId::from_timestamp(at, suffix);
        if !dir.join(id.as_str()).exists() {
            return id;
        }
        suffix += 1;
    }
}

fn sync_tree(root: &Path) -> io::Result<()> {
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            sync_tree(&entry.path())?;
        }
    }
    archive::sync_dir(root)
}
