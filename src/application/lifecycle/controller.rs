//! Lifecycle controller.
//!
//! Takes the environment lock, runs pre-flight checks, drives the planned
//! passes through the [`Scheduler`], then records last-good state and the
//! run report.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::last_good::LastGoodStore;
use super::lock::{LockManager, RunLock};
use super::marker::MarkerStore;
use super::plan;
use super::schedule::Scheduler;
use crate::application::health::{HealthProber, ProbeBudget};
use crate::application::layout::StateLayout;
use crate::application::report::recorder::ReportRecorder;
use crate::domain::id::ServiceId;
use crate::domain::run::{Action, RunState, RunStatus};
use crate::domain::service::ServiceSet;
use crate::error::{ConfigError, Error, Result};
use crate::port::outbound::runtime::ContainerRuntime;

/// Tunables applied to every run.
#[derive(Debug, Clone, Copy, Default)]
pub struct ControllerOptions {
    pub budget: ProbeBudget,
    /// Wall-clock limit for one run; unbounded when `None`.
    pub run_timeout: Option<Duration>,
}

/// One operator request, already resolved to service ids.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub action: Action,
    /// Empty selects every service.
    pub services: Vec<ServiceId>,
    pub build: bool,
    pub replicas: Option<u32>,
}

impl RunRequest {
    pub fn new(action: Action) -> Self {
        Self {
            action,
            services: Vec::new(),
            build: false,
            replicas: None,
        }
    }

    #[must_use]
    pub fn with_services(mut self, services: impl IntoIterator<Item = impl Into<ServiceId>>) -> Self {
        self.services = services.into_iter().map(Into::into).collect();
        self
    }
}

/// A concluded run and where its report went.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub state: RunState,
    pub report: Option<PathBuf>,
}

pub struct LifecycleController {
    runtime: Arc<dyn ContainerRuntime>,
    prober: HealthProber,
    locks: LockManager,
    last_good: LastGoodStore,
    markers: MarkerStore,
    reports: ReportRecorder,
    options: ControllerOptions,
}

impl LifecycleController {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        prober: HealthProber,
        layout: &StateLayout,
        reports: ReportRecorder,
        options: ControllerOptions,
    ) -> Self {
        Self {
            runtime,
            prober,
            locks: LockManager::new(layout.locks_dir()),
            last_good: LastGoodStore::new(layout.clone()),
            markers: MarkerStore::new(layout.clone()),
            reports,
            options,
        }
    }

    #[must_use]
    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    #[must_use]
    pub fn markers(&self) -> &MarkerStore {
        &self.markers
    }

    #[must_use]
    pub fn last_good(&self) -> &LastGoodStore {
        &self.last_good
    }

    #[must_use]
    pub fn reports(&self) -> &ReportRecorder {
        &self.reports
    }

    #[must_use]
    pub fn runtime(&self) -> &Arc<dyn ContainerRuntime> {
        &self.runtime
    }

    /// Execute `request` against `set`'s environment.
    ///
    /// Request validation happens before the lock is taken and before any
    /// runtime call. A run that ends `PartiallyFailed` or `Aborted` is
    /// returned as `Ok`.
    ///
    /// # Errors
    ///
    /// Unknown services, a missing rollback target, an invalid scale request
    /// or a held lock.
    pub async fn execute(
        &self,
        set: &ServiceSet,
        request: RunRequest,
        cancel: CancellationToken,
    ) -> Result<RunOutcome> {
        for id in &request.services {
            if !set.contains(id) {
                return Err(Error::UnknownService(id.to_string()));
            }
        }

        let target = match request.action {
            Action::Rollback => {
                let record = self
                    .last_good
                    .load(&set.environment)?
                    .ok_or_else(|| Error::NoRollbackTarget(set.environment.clone()))?;
                info!(
                    environment = %set.environment,
                    run_id = %record.run_id,
                    recorded_at = %record.recorded_at,
                    "Rolling back to last good deployment"
                );
                record.services
            }
            Action::Scale => scaled(set, &request)?,
            _ => set.clone(),
        };

        let lock = self.locks.acquire(&set.environment, request.action.as_str())?;

        if let Some(marker) = self.markers.read(&set.environment)? {
            let reason = format!(
                "restore of snapshot {} is incomplete (step '{}'); run restore again",
                marker.snapshot, marker.step
            );
            return Ok(self.refuse(&target, &request, reason).await);
        }

        self.run_locked(&lock, &target, request, cancel).await
    }

    /// Run `request` while the caller holds the environment lock.
    ///
    /// Skips the restore-marker check, so restore can drive its own stop and
    /// start passes.
    pub async fn run_locked(
        &self,
        lock: &RunLock,
        set: &ServiceSet,
        request: RunRequest,
        cancel: CancellationToken,
    ) -> Result<RunOutcome> {
        debug_assert_eq!(lock.environment(), set.environment);

        let selection: BTreeSet<ServiceId> = request.services.iter().cloned().collect();
        let plan = plan::plan(set, request.action, &selection, request.build);
        let mut run = RunState::new(
            set.environment.clone(),
            request.action,
            request.services.clone(),
            plan.targets.iter().cloned(),
        );
        info!(
            run_id = %run.run_id,
            environment = %run.environment,
            action = %run.action,
            services = plan.targets.len(),
            "Run started"
        );

        if let Err(e) = self.runtime.ping().await {
            warn!(run_id = %run.run_id, error = %e, "Pre-flight failed");
            run.abort(format!("pre-flight failed: {e}"));
        } else {
            let deadline = self.options.run_timeout.map(|t| Instant::now() + t);
            let scheduler = Scheduler::new(
                Arc::clone(&self.runtime),
                self.prober.clone(),
                self.options.budget,
                cancel,
                deadline,
            );
            scheduler.run(set, &plan, &mut run).await;
        }

        Ok(self.finish(set, run).await)
    }

    async fn refuse(&self, set: &ServiceSet, request: &RunRequest, reason: String) -> RunOutcome {
        let selection: BTreeSet<ServiceId> = request.services.iter().cloned().collect();
        let plan = plan::plan(set, request.action, &selection, request.build);
        let mut run = RunState::new(
            set.environment.clone(),
            request.action,
            request.services.clone(),
            plan.targets,
        );
        warn!(run_id = %run.run_id, reason = %reason, "Run refused");
        run.abort(reason);
        self.finish(set, run).await
    }

    async fn finish(&self, set: &ServiceSet, mut run: RunState) -> RunOutcome {
        let status = run.conclude();

        if status == RunStatus::Completed && run.action.records_last_good() {
            if let Err(e) = self.last_good.save(&run.run_id, set) {
                warn!(run_id = %run.run_id, error = %e, "Failed to record last good deployment");
            }
        }

        let report = self.reports.record(&run, &set.project).await;
        info!(
            run_id = %run.run_id,
            status = %status,
            duration_ms = run.duration_ms().unwrap_or_default(),
            "Run finished"
        );
        RunOutcome { state: run, report }
    }
}

/// `set` with the selected services at the requested replica count.
fn scaled(set: &ServiceSet, request: &RunRequest) -> Result<ServiceSet> {
    let replicas = match request.replicas {
        Some(n) if n >= 1 => n,
        Some(_) => {
            return Err(ConfigError::InvalidValue {
                field: "replicas",
                reason: "must be at least 1".to_string(),
            }
            .into())
        }
        None => {
            return Err(ConfigError::InvalidValue {
                field: "replicas",
                reason: "scale requires a replica count".to_string(),
            }
            .into())
        }
    };
    if request.services.is_empty() {
        return Err(ConfigError::InvalidValue {
            field: "services",
            reason: "scale requires at least one selected service".to_string(),
        }
        .into());
    }

    let mut scaled = set.clone();
    for id in &request.services {
        if let Some(service) = scaled.services.get_mut(id) {
            service.replicas = replicas;
        }
    }
    Ok(scaled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::lifecycle::marker::RestoreMarker;
    use crate::testkit::runtime::RuntimeCall;
    use crate::testkit::stack::TestStack;

    #[tokio::test]
    async fn unknown_service_is_rejected_before_side_effects() {
        let stack = TestStack::new();
        let err = stack
            .controller()
            .execute(
                &stack.services(),
                RunRequest::new(Action::Start).with_services(["nope"]),
                CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownService(name) if name == "nope"));
        assert!(stack.runtime.calls().is_empty());
        assert!(!stack.controller().locks().path("dev").exists());
    }

    #[tokio::test]
    async fn completed_start_records_last_good() {
        let stack = TestStack::new();
        let outcome = stack.run(RunRequest::new(Action::Start)).await.unwrap();
        assert_eq!(outcome.state.status, RunStatus::Completed);
        assert!(outcome.report.is_some());
        let record = stack.controller().last_good().load("dev").unwrap().unwrap();
        assert_eq!(record.run_id, outcome.state.run_id);
    }

    #[tokio::test]
    async fn unreachable_runtime_aborts_without_touching_services() {
        let stack = TestStack::new();
        stack.runtime.set_unreachable(true);
        let outcome = stack.run(RunRequest::new(Action::Start)).await.unwrap();
        assert_eq!(outcome.state.status, RunStatus::Aborted);
        assert_eq!(stack.runtime.calls(), vec![RuntimeCall::Ping]);
        assert!(outcome
            .state
            .abort_reason
            .as_deref()
            .unwrap()
            .starts_with("pre-flight failed"));
    }

    #[tokio::test]
    async fn restore_marker_refuses_runs() {
        let stack = TestStack::new();
        stack
            .controller()
            .markers()
            .write(
                "dev",
                &RestoreMarker {
                    snapshot: "20260101T000000.000Z".into(),
                    step: "volumes".into(),
                    since: chrono::Utc::now(),
                    error: Some("disk full".into()),
                },
            )
            .unwrap();
        let outcome = stack.run(RunRequest::new(Action::Start)).await.unwrap();
        assert_eq!(outcome.state.status, RunStatus::Aborted);
        assert!(outcome.state.abort_reason.unwrap().contains("restore"));
        assert!(stack.runtime.calls().is_empty());
    }

    #[tokio::test]
    async fn rollback_without_record_fails() {
        let stack = TestStack::new();
        let err = stack.run(RunRequest::new(Action::Rollback)).await.unwrap_err();
        assert!(matches!(err, Error::NoRollbackTarget(env) if env == "dev"));
    }

    #[tokio::test]
    async fn scale_requires_a_selection() {
        let stack = TestStack::new();
        let mut request = RunRequest::new(Action::Scale);
        request.replicas = Some(3);
        let err = stack.run(request).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::InvalidValue { field: "services", .. })
        ));
    }

    #[tokio::test]
    async fn scale_sets_replicas_on_selected_services() {
        let stack = TestStack::new();
        let mut request = RunRequest::new(Action::Scale).with_services(["api"]);
        request.replicas = Some(3);
        let outcome = stack.run(request).await.unwrap();
        assert_eq!(outcome.state.status, RunStatus::Completed);
        assert_eq!(stack.runtime.running(&"api".into()), 3);
        assert_eq!(stack.runtime.running(&"db".into()), 1);
    }
}
