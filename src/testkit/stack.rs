//! A sandboxed stack: manifest on disk, fake runtime, scripted probes and a
//! wired controller and backup manager with fast timings.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use super::probe::ScriptedCheck;
use super::resources::FixedResources;
use super::runtime::FakeRuntime;
use crate::application::backup::manager::BackupManager;
use crate::application::health::{BackoffPolicy, HealthProber, ProbeBudget};
use crate::application::layout::StateLayout;
use crate::application::lifecycle::controller::{
    ControllerOptions, LifecycleController, RunOutcome, RunRequest,
};
use crate::application::manifest::{LoadedManifest, ManifestLoader, BASE_FILE};
use crate::application::report::recorder::ReportRecorder;
use crate::application::report::retention::RetentionPolicy;
use crate::application::report::store::ReportStore;
use crate::domain::service::ServiceSet;
use crate::error::Result;

/// `db` (TCP check, `pgdata` volume, dump/restore commands) and `api`
/// depending on it.
pub const MANIFEST: &str = r#"
[project]
name = "acme"

[volumes.pgdata]

[database]
service = "db"
dump = ["dump"]
restore = ["restore"]

[services.db]
image = "postgres:16"
volumes = ["pgdata:/var/lib/postgresql/data"]
health = { tcp = 5432 }

[services.api]
image = "acme/api:1"
depends_on = ["db"]
health = { http = "http://127.0.0.1:8080/health" }
"#;

pub const ENVIRONMENT: &str = "dev";

pub struct TestStack {
    pub dir: TempDir,
    pub runtime: Arc<FakeRuntime>,
    pub check: Arc<ScriptedCheck>,
    controller: Arc<LifecycleController>,
    backups: BackupManager,
}

impl TestStack {
    pub fn new() -> Self {
        Self::with_manifest(MANIFEST)
    }

    pub fn with_manifest(manifest: &str) -> Self {
        Self::with_options(manifest, ControllerOptions {
            budget: ProbeBudget::new(Duration::from_secs(2), 3),
            run_timeout: None,
        })
    }

    pub fn with_options(manifest: &str, options: ControllerOptions) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(dir.path().join("stack")).expect("manifest dir");
        fs::write(dir.path().join("stack").join(BASE_FILE), manifest).expect("manifest");

        let runtime = Arc::new(FakeRuntime::new());
        let check = Arc::new(ScriptedCheck::new());
        let layout = StateLayout::new(dir.path().join("state"));
        let prober = HealthProber::new(
            check.clone(),
            BackoffPolicy::new(Duration::from_millis(5), 2.0, Duration::from_millis(20)),
        );
        let recorder = ReportRecorder::new(
            runtime.clone(),
            Arc::new(FixedResources::default()),
            ReportStore::new(layout.clone(), RetentionPolicy::default()),
        );
        let controller = Arc::new(LifecycleController::new(
            runtime.clone(),
            prober,
            &layout,
            recorder,
            options,
        ));
        let backups = BackupManager::new(controller.clone(), layout, 5);

        Self {
            dir,
            runtime,
            check,
            controller,
            backups,
        }
    }

    pub fn manifest_dir(&self) -> PathBuf {
        self.dir.path().join("stack")
    }

    pub fn layout(&self) -> StateLayout {
        StateLayout::new(self.dir.path().join("state"))
    }

    /// Host directory backing a declared volume.
    pub fn volume_dir(&self, name: &str) -> PathBuf {
        self.manifest_dir().join("volumes").join(name)
    }

    pub fn load(&self) -> LoadedManifest {
        ManifestLoader::new(self.manifest_dir())
            .load(ENVIRONMENT)
            .expect("test manifest loads")
    }

    pub fn services(&self) -> ServiceSet {
        self.load().services
    }

    pub fn controller(&self) -> &LifecycleController {
        &self.controller
    }

    pub fn backups(&self) -> &BackupManager {
        &self.backups
    }

    /// Run `request` against the current manifest with a fresh token.
    pub async fn run(&self, request: RunRequest) -> Result<RunOutcome> {
        self.controller
            .execute(&self.services(), request, CancellationToken::new())
            .await
    }
}

impl Default for TestStack {
    fn default() -> Self {
        Self::new()
    }
}
