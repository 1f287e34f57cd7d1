//! Restore a snapshot into the stack.
//!
//! Order: verify digests, take the lock, stop everything, write the
//! restore-incomplete marker, replace volumes, replay the dump into a
//! freshly started database, clear the marker, start the whole stack.
//! Failures after the marker is written leave it in place with the failing
//! step recorded; the controller refuses runs until a restore succeeds.

use std::fs;
use std::path::Path;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::archive;
use super::manager::BackupManager;
use crate::application::lifecycle::controller::{RunOutcome, RunRequest};
use crate::application::lifecycle::lock::RunLock;
use crate::application::lifecycle::marker::RestoreMarker;
use crate::domain::id::SnapshotId;
use crate::domain::run::{Action, RunStatus, ServicePhase};
use crate::domain::service::ServiceSet;
use crate::domain::snapshot::{ArtifactKind, SnapshotManifest};
use crate::error::{BackupError, Error, Result};

/// What a successful restore did.
#[derive(Debug, Clone)]
pub struct RestoreOutcome {
    pub snapshot: SnapshotManifest,
    pub volumes_restored: Vec<String>,
    pub database_restored: bool,
    /// The final start of the whole stack.
    pub start: RunOutcome,
}

/// A failed step after the marker was written.
struct StepFailure {
    step: &'static str,
    error: Error,
}

trait StepContext<T> {
    fn at(self, step: &'static str) -> std::result::Result<T, StepFailure>;
}

impl<T, E: Into<Error>> StepContext<T> for std::result::Result<T, E> {
    fn at(self, step: &'static str) -> std::result::Result<T, StepFailure> {
        self.map_err(|e| StepFailure {
            step,
            error: e.into(),
        })
    }
}

impl BackupManager {
    /// Replay `id` into `set`'s environment.
    ///
    /// Destructive: current volume contents and database rows are replaced.
    ///
    /// # Errors
    ///
    /// Fails without side effects on a missing or corrupt snapshot, a volume
    /// the manifest does not declare, or a held lock. Fails with
    /// [`BackupError::RestoreIncomplete`] once data replacement has begun.
    pub async fn restore(
        &self,
        set: &ServiceSet,
        id: &SnapshotId,
        cancel: CancellationToken,
    ) -> Result<RestoreOutcome> {
        let env = set.environment.as_str();
        let snapshot = self.load(env, id)?;
        self.verify(&snapshot)?;
        check_compatible(set, &snapshot)?;

        let lock = self.controller.locks().acquire(env, "restore")?;

        let stop = self
            .controller
            .run_locked(&lock, set, RunRequest::new(Action::Stop), cancel.clone())
            .await?;
        if stop.state.status != RunStatus::Completed {
            return Err(Error::RunIncomplete {
                run_id: stop.state.run_id.to_string(),
                status: stop.state.status,
            });
        }

        let mut marker = RestoreMarker {
            snapshot: id.to_string(),
            step: "volumes".to_string(),
            since: Utc::now(),
            error: None,
        };
        self.controller.markers().write(env, &marker)?;
        info!(environment = env, snapshot = %id, "Restore started; stack stopped");

        let replayed = self.replay(&lock, set, &snapshot, &mut marker, &cancel).await;
        let (volumes_restored, database_restored) = match replayed {
            Ok(done) => done,
            Err(StepFailure { step, error: cause }) => {
                marker.step = step.to_string();
                marker.error = Some(cause.to_string());
                if let Err(e) = self.controller.markers().write(env, &marker) {
                    error!(environment = env, error = %e, "Failed to update restore marker");
                }
                error!(environment = env, snapshot = %id, step, error = %cause, "Restore incomplete");
                return Err(BackupError::RestoreIncomplete {
                    snapshot: id.to_string(),
                    step: step.to_string(),
                    reason: cause.to_string(),
                }
                .into());
            }
        };

        self.controller.markers().clear(env)?;
        info!(environment = env, snapshot = %id, "Restored data in place; starting stack");

        let start = self
            .controller
            .run_locked(&lock, set, RunRequest::new(Action::Start), cancel)
            .await?;

        Ok(RestoreOutcome {
            snapshot,
            volumes_restored,
            database_restored,
            start,
        })
    }

    async fn replay(
        &self,
        lock: &RunLock,
        set: &ServiceSet,
        snapshot: &SnapshotManifest,
        marker: &mut RestoreMarker,
        cancel: &CancellationToken,
    ) -> std::result::Result<(Vec<String>, bool), StepFailure> {
        let env = set.environment.as_str();
        let root = self.snapshot_path(env, &snapshot.id);

        let mut volumes = Vec::new();
        for artifact in snapshot.of_kind(ArtifactKind::Volume) {
            let Some(volume) = set.volumes.get(&artifact.name) else {
                continue;
            };
            replace_dir(&root.join(&artifact.file), &volume.host_path).at("volumes")?;
            info!(volume = %artifact.name, path = %volume.host_path.display(), "Volume restored");
            volumes.push(artifact.name.clone());
        }

        let (Some(dump), Some(database)) = (snapshot.database_dump(), &set.database) else {
            return Ok((volumes, false));
        };

        marker.step = "database".to_string();
        self.controller.markers().write(env, marker).at("database")?;

        let start = self
            .controller
            .run_locked(
                lock,
                set,
                RunRequest::new(Action::Start).with_services([database.service.clone()]),
                cancel.clone(),
            )
            .await
            .at("database")?;
        if start.state.phase(&database.service) != Some(ServicePhase::Healthy) {
            return Err(StepFailure {
                step: "database",
                error: Error::RunIncomplete {
                    run_id: start.state.run_id.to_string(),
                    status: start.state.status,
                },
            });
        }

        let bytes = fs::read(root.join(&dump.file)).at("database")?;
        let output = self
            .controller
            .runtime()
            .exec(&set.project, &database.service, &database.restore, Some(bytes))
            .await
            .at("database")?;
        if !output.success() {
            return Err(StepFailure {
                step: "database",
                error: BackupError::Dump {
                    service: database.service.to_string(),
                    reason: format!(
                        "restore exited with {}: {}",
                        output.exit_code,
                        output.stderr.trim()
                    ),
                }
                .into(),
            });
        }
        info!(service = %database.service, bytes = dump.bytes, "Database restored");

        Ok((volumes, true))
    }
}

/// Refuse snapshots the current manifest cannot receive.
fn check_compatible(set: &ServiceSet, snapshot: &SnapshotManifest) -> Result<()> {
    if let Some(volume) = snapshot
        .of_kind(ArtifactKind::Volume)
        .find(|a| !set.volumes.contains_key(&a.name))
    {
        return Err(BackupError::Archive {
            volume: volume.name.clone(),
            reason: "not declared in the current manifest".to_string(),
        }
        .into());
    }
    if let Some(dump) = snapshot.database_dump() {
        if set.database.is_none() {
            return Err(BackupError::Dump {
                service: dump.name.clone(),
                reason: "snapshot has a dump but the manifest declares no database".to_string(),
            }
            .into());
        }
    }
    Ok(())
}

/// Unpack next to `target`, then swap it in.
fn replace_dir(archive_path: &Path, target: &Path) -> std::io::Result<()> {
    let parent = target
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    let incoming = tempfile::Builder::new()
        .prefix(".restore-")
        .tempdir_in(parent)?;
    archive::unpack_into(archive_path, incoming.path())?;

    match fs::remove_dir_all(target) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e),
        _ => {}
    }
    fs::rename(incoming.path(), target)?;
    archive::sync_dir(parent)
}
