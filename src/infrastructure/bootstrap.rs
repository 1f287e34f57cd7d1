//! Infrastructure bootstrap helpers for runtime wiring.
//!
//! The composition root: turns a validated [`Config`] into the concrete
//! runtime, prober, controller and backup manager used by the operator.

use std::sync::Arc;

use tracing::debug;

use crate::adapter::outbound::docker::runtime::DockerCli;
use crate::adapter::outbound::host::HostSampler;
use crate::adapter::outbound::probe::NetworkCheck;
use crate::application::backup::manager::BackupManager;
use crate::application::health::HealthProber;
use crate::application::layout::StateLayout;
use crate::application::lifecycle::controller::{ControllerOptions, LifecycleController};
use crate::application::manifest::{LoadedManifest, ManifestLoader};
use crate::application::report::recorder::ReportRecorder;
use crate::application::report::store::ReportStore;
use crate::error::Result;
use crate::infrastructure::config::settings::Config;
use crate::port::outbound::resource::ResourceSampler;
use crate::port::outbound::runtime::ContainerRuntime;

/// Fully wired components for one environment.
pub(crate) struct Stack {
    pub manifest: LoadedManifest,
    pub controller: Arc<LifecycleController>,
    pub backups: BackupManager,
}

pub(crate) fn state_layout(config: &Config) -> StateLayout {
    StateLayout::new(config.project.state_dir.clone())
}

/// Load and validate the manifest for `environment`.
pub(crate) fn load_manifest(config: &Config, environment: &str) -> Result<LoadedManifest> {
    let loaded = ManifestLoader::new(config.project.manifest_dir.clone()).load(environment)?;
    debug!(
        project = %loaded.services.project,
        environment,
        services = loaded.services.len(),
        "Manifest loaded"
    );
    Ok(loaded)
}

pub(crate) fn build_runtime(config: &Config) -> Arc<dyn ContainerRuntime> {
    Arc::new(DockerCli::new(
        config.runtime.binary.clone(),
        config.runtime.stop_timeout_secs,
    ))
}

pub(crate) fn build_sampler(config: &Config) -> Arc<dyn ResourceSampler> {
    Arc::new(HostSampler::new(config.project.state_dir.clone()))
}

pub(crate) fn build_prober(config: &Config, runtime: Arc<dyn ContainerRuntime>) -> HealthProber {
    HealthProber::new(Arc::new(NetworkCheck::new(runtime)), config.health.policy())
}

pub(crate) fn build_report_store(config: &Config) -> ReportStore {
    ReportStore::new(state_layout(config), config.reports.policy())
}

pub(crate) fn controller_options(config: &Config) -> ControllerOptions {
    ControllerOptions {
        budget: config.health.budget(),
        run_timeout: config.run.timeout(),
    }
}

pub(crate) fn build_controller(
    config: &Config,
    runtime: Arc<dyn ContainerRuntime>,
) -> Arc<LifecycleController> {
    let layout = state_layout(config);
    let recorder = ReportRecorder::new(
        runtime.clone(),
        build_sampler(config),
        build_report_store(config),
    );
    Arc::new(LifecycleController::new(
        runtime.clone(),
        build_prober(config, runtime),
        &layout,
        recorder,
        controller_options(config),
    ))
}

/// Wire every component against the manifest for `environment`.
pub(crate) fn build_stack(config: &Config, environment: &str) -> Result<Stack> {
    let manifest = load_manifest(config, environment)?;
    let runtime = build_runtime(config);
    let controller = build_controller(config, runtime);
    let backups = BackupManager::new(controller.clone(), state_layout(config), config.backup.keep);
    Ok(Stack {
        manifest,
        controller,
        backups,
    })
}
