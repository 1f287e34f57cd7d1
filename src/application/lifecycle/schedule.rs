//! Pass executor.
//!
//! Each pass runs one task per service in a [`JoinSet`]; a service is only
//! dispatched once its prerequisites are satisfied. Tasks report their
//! intermediate phases over a channel and return the final one. The
//! dispatcher is the only writer of the [`RunState`].

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::{Id, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::plan::{Pass, PassKind, Plan};
use crate::application::health::{HealthProber, ProbeBudget};
use crate::domain::graph::{self, DependencyEdges};
use crate::domain::health::HealthVerdict;
use crate::domain::id::ServiceId;
use crate::domain::run::{RunState, ServicePhase};
use crate::domain::service::{Service, ServiceSet};
use crate::port::outbound::runtime::ContainerRuntime;

const DEADLINE_REASON: &str = "run deadline exceeded";

type PhaseEvent = (ServiceId, ServicePhase);

/// Final result of one service step.
#[derive(Debug)]
struct StepReport {
    service: ServiceId,
    phase: ServicePhase,
    error: Option<String>,
    health: Option<HealthVerdict>,
}

impl StepReport {
    fn reached(service: ServiceId, phase: ServicePhase) -> Self {
        Self {
            service,
            phase,
            error: None,
            health: None,
        }
    }

    fn failed(service: ServiceId, error: impl ToString) -> Self {
        Self {
            service,
            phase: ServicePhase::Failed,
            error: Some(error.to_string()),
            health: None,
        }
    }
}

enum Gate {
    Ready,
    Wait,
    Blocked(String),
}

/// Drives the passes of a [`Plan`] against the container runtime.
pub struct Scheduler {
    runtime: Arc<dyn ContainerRuntime>,
    prober: HealthProber,
    budget: ProbeBudget,
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl Scheduler {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        prober: HealthProber,
        budget: ProbeBudget,
        cancel: CancellationToken,
        deadline: Option<Instant>,
    ) -> Self {
        Self {
            runtime,
            prober,
            budget,
            cancel,
            deadline,
        }
    }

    /// Run every pass in order, stopping early on abort, cancellation or
    /// deadline. The caller concludes the run.
    pub async fn run(&self, set: &ServiceSet, plan: &Plan, run: &mut RunState) {
        for (index, pass) in plan.passes.iter().enumerate() {
            if self.cancel.is_cancelled() {
                mark_cancelled(run);
            }
            if self.deadline.is_some_and(|at| Instant::now() >= at) {
                run.deadline_exceeded = true;
            }
            if run.cancelled || run.deadline_exceeded {
                break;
            }
            if run.abort_reason.is_some() {
                for later in &plan.passes[index..] {
                    abort_untouched(later, run);
                }
                break;
            }
            debug!(run_id = %run.run_id, pass = ?pass.kind, targets = pass.targets.len(), "Pass started");
            self.run_pass(set, pass, run).await;
        }
    }

    async fn run_pass(&self, set: &ServiceSet, pass: &Pass, run: &mut RunState) {
        let order: Vec<ServiceId> = match pass.kind {
            PassKind::Stop => set.stop_order(),
            PassKind::Prepare | PassKind::Start => set.start_order(),
        }
        .into_iter()
        .filter(|id| pass.targets.contains(id))
        .collect();
        let dependents = graph::reverse(&set.edges());

        let (events_tx, mut events) = mpsc::unbounded_channel::<PhaseEvent>();
        let mut tasks: JoinSet<StepReport> = JoinSet::new();
        let mut in_flight: HashMap<Id, ServiceId> = HashMap::new();
        let mut dispatched: BTreeSet<ServiceId> = BTreeSet::new();

        let deadline = sleep_until(self.deadline);
        tokio::pin!(deadline);

        loop {
            if !run.cancelled {
                for id in &order {
                    if dispatched.contains(id) || !run.phase(id).is_some_and(|p| eligible(pass.kind, p)) {
                        continue;
                    }
                    match gate(set, &dependents, pass, id, run) {
                        Gate::Wait => {}
                        Gate::Blocked(reason) => {
                            info!(run_id = %run.run_id, service = %id, reason = %reason, "Service aborted");
                            fail(run, id, ServicePhase::Aborted, reason);
                            dispatched.insert(id.clone());
                        }
                        Gate::Ready => {
                            let Some(service) = set.get(id).cloned() else {
                                continue;
                            };
                            transition(run, id, initial_phase(pass.kind, &service));
                            let handle = tasks.spawn(step(
                                pass.kind,
                                Arc::clone(&self.runtime),
                                self.prober.clone(),
                                self.budget,
                                set.project.clone(),
                                service,
                                events_tx.clone(),
                            ));
                            in_flight.insert(handle.id(), id.clone());
                            dispatched.insert(id.clone());
                        }
                    }
                }
            }

            if in_flight.is_empty() {
                break;
            }

            tokio::select! {
                biased;
                () = &mut deadline => {
                    tasks.abort_all();
                    while let Ok((id, phase)) = events.try_recv() {
                        transition(run, &id, phase);
                    }
                    expire(run, in_flight.values());
                    while tasks.join_next().await.is_some() {}
                    return;
                }
                () = self.cancel.cancelled(), if !run.cancelled => {
                    mark_cancelled(run);
                }
                Some((id, phase)) = events.recv() => {
                    transition(run, &id, phase);
                }
                Some(joined) = tasks.join_next_with_id() => {
                    while let Ok((id, phase)) = events.try_recv() {
                        transition(run, &id, phase);
                    }
                    match joined {
                        Ok((task, report)) => {
                            in_flight.remove(&task);
                            apply_report(set, pass.kind, run, report);
                        }
                        Err(e) => {
                            if let Some(service) = in_flight.remove(&e.id()) {
                                error!(run_id = %run.run_id, service = %service, error = %e, "Step task failed");
                                fail(run, &service, ServicePhase::Failed, format!("step task failed: {e}"));
                            }
                        }
                    }
                }
            }
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

fn eligible(kind: PassKind, phase: ServicePhase) -> bool {
    use ServicePhase::{Built, Pending, Pulled, Stopped};
    match kind {
        PassKind::Prepare => phase == Pending,
        PassKind::Stop => matches!(phase, Pending | Built | Pulled),
        PassKind::Start => matches!(phase, Pending | Built | Pulled | Stopped),
    }
}

fn initial_phase(kind: PassKind, service: &Service) -> ServicePhase {
    match kind {
        PassKind::Prepare if service.is_buildable() => ServicePhase::Building,
        PassKind::Prepare => ServicePhase::Pulling,
        PassKind::Stop => ServicePhase::Stopping,
        PassKind::Start => ServicePhase::Starting,
    }
}

fn gate(
    set: &ServiceSet,
    dependents: &DependencyEdges,
    pass: &Pass,
    id: &ServiceId,
    run: &RunState,
) -> Gate {
    let (prerequisites, satisfied, relation): (Vec<&ServiceId>, ServicePhase, &str) = match pass.kind {
        PassKind::Prepare => return Gate::Ready,
        PassKind::Start => (
            set.dependencies_within(id, &pass.targets).collect(),
            ServicePhase::Healthy,
            "dependency",
        ),
        PassKind::Stop => (
            dependents
                .get(id)
                .into_iter()
                .flatten()
                .filter(|d| pass.targets.contains(*d))
                .collect(),
            ServicePhase::Stopped,
            "dependent",
        ),
    };

    let mut waiting = false;
    for other in prerequisites {
        match run.phase(other) {
            Some(phase) if phase == satisfied => {}
            Some(phase) if phase.is_failure() => {
                return Gate::Blocked(format!("{relation} '{other}' is {phase}"));
            }
            _ => waiting = true,
        }
    }
    if waiting {
        Gate::Wait
    } else {
        Gate::Ready
    }
}

async fn step(
    kind: PassKind,
    runtime: Arc<dyn ContainerRuntime>,
    prober: HealthProber,
    budget: ProbeBudget,
    project: String,
    service: Service,
    events: mpsc::UnboundedSender<PhaseEvent>,
) -> StepReport {
    let id = service.id.clone();
    match kind {
        PassKind::Prepare => {
            let (result, done) = if service.is_buildable() {
                (runtime.build(&project, &service).await, ServicePhase::Built)
            } else {
                (runtime.pull(&project, &service).await, ServicePhase::Pulled)
            };
            match result {
                Ok(()) => StepReport::reached(id, done),
                Err(e) => StepReport::failed(id, e),
            }
        }
        PassKind::Stop => match runtime.stop(&project, &id).await {
            Ok(()) => StepReport::reached(id, ServicePhase::Stopped),
            Err(e) => StepReport::failed(id, e),
        },
        PassKind::Start => {
            if let Err(e) = runtime.start(&project, &service).await {
                return StepReport::failed(id, e);
            }
            if service.health.is_none() {
                return StepReport {
                    health: Some(HealthVerdict::unchecked(id.clone())),
                    ..StepReport::reached(id, ServicePhase::Healthy)
                };
            }

            // Receiver outlives every task of the pass.
            let _ = events.send((id.clone(), ServicePhase::AwaitingHealth));
            let verdict = prober.probe_with(&project, &service, budget).await;
            if verdict.healthy {
                StepReport {
                    health: Some(verdict),
                    ..StepReport::reached(id, ServicePhase::Healthy)
                }
            } else {
                StepReport {
                    service: id,
                    phase: ServicePhase::Unhealthy,
                    error: verdict.last_error.clone(),
                    health: Some(verdict),
                }
            }
        }
    }
}

fn apply_report(set: &ServiceSet, kind: PassKind, run: &mut RunState, report: StepReport) {
    let StepReport {
        service,
        phase,
        error,
        health,
    } = report;

    match error {
        Some(error) => {
            warn!(run_id = %run.run_id, service = %service, phase = %phase, error = %error, "Service step failed");
            if kind == PassKind::Prepare {
                let op = if set.get(&service).is_some_and(Service::is_buildable) {
                    "build"
                } else {
                    "pull"
                };
                run.abort(format!("{op} of '{service}' failed: {error}"));
            }
            fail(run, &service, phase, error);
        }
        None => transition(run, &service, phase),
    }
    if let Some(verdict) = health {
        run.attach_health(verdict);
    }
}

/// Mark every in-flight service as cut off by the deadline.
fn expire<'a>(run: &mut RunState, in_flight: impl Iterator<Item = &'a ServiceId>) {
    run.deadline_exceeded = true;
    for id in in_flight {
        let to = match run.phase(id) {
            Some(ServicePhase::AwaitingHealth) => ServicePhase::Unhealthy,
            _ => ServicePhase::Failed,
        };
        warn!(run_id = %run.run_id, service = %id, "Run deadline exceeded");
        fail(run, id, to, DEADLINE_REASON);
    }
}

/// After a fatal abort, services still waiting on a later pass are aborted.
fn abort_untouched(pass: &Pass, run: &mut RunState) {
    let reason = format!(
        "run aborted: {}",
        run.abort_reason.as_deref().unwrap_or("unknown reason")
    );
    for id in &pass.targets {
        if run.phase(id).is_some_and(|p| eligible(pass.kind, p)) {
            fail(run, id, ServicePhase::Aborted, reason.clone());
        }
    }
}

fn mark_cancelled(run: &mut RunState) {
    if !run.cancelled {
        info!(run_id = %run.run_id, "Run cancelled; waiting for in-flight steps");
        run.cancelled = true;
    }
}

fn transition(run: &mut RunState, id: &ServiceId, to: ServicePhase) {
    match run.set_phase(id, to) {
        Ok(Some(seq)) => debug!(run_id = %run.run_id, service = %id, phase = %to, seq, "Transition"),
        Ok(None) => {}
        Err(e) => error!(run_id = %run.run_id, error = %e, "Rejected transition"),
    }
}

fn fail(run: &mut RunState, id: &ServiceId, to: ServicePhase, error: impl Into<String>) {
    if let Err(e) = run.fail(id, to, error) {
        error!(run_id = %run.run_id, error = %e, "Rejected transition");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::application::health::BackoffPolicy;
    use crate::application::lifecycle::plan::plan;
    use crate::domain::run::Action;
    use crate::domain::service::HealthCheck;
    use crate::port::outbound::probe::ProbeOutcome;
    use crate::testkit::probe::ScriptedCheck;
    use crate::testkit::runtime::{FakeRuntime, Op};

    fn tcp(port: u16) -> HealthCheck {
        HealthCheck::Tcp {
            host: "127.0.0.1".into(),
            port,
        }
    }

    fn stack() -> ServiceSet {
        ServiceSet::new(
            "acme",
            "dev",
            vec![
                Service::new("db", "postgres:16").with_health(tcp(5432)),
                Service::new("cache", "redis:7"),
                Service::new("api", "acme/api")
                    .with_dependencies(&["db", "cache"])
                    .with_health(tcp(8080)),
                Service::new("web", "acme/web").with_dependencies(&["api"]),
            ],
            Vec::new(),
            None,
        )
        .unwrap()
    }

    struct Harness {
        runtime: Arc<FakeRuntime>,
        check: Arc<ScriptedCheck>,
        cancel: CancellationToken,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                runtime: Arc::new(FakeRuntime::new()),
                check: Arc::new(ScriptedCheck::new()),
                cancel: CancellationToken::new(),
            }
        }

        fn scheduler(&self, deadline: Option<Instant>) -> Scheduler {
            let prober = HealthProber::new(
                self.check.clone(),
                BackoffPolicy::new(Duration::from_millis(10), 2.0, Duration::from_millis(50)),
            );
            Scheduler::new(
                self.runtime.clone(),
                prober,
                ProbeBudget::new(Duration::from_secs(1), 3),
                self.cancel.clone(),
                deadline,
            )
        }

        async fn run(&self, action: Action, deadline: Option<Instant>) -> RunState {
            let set = stack();
            let plan = plan(&set, action, &BTreeSet::new(), false);
            let mut run = RunState::new("dev", action, Vec::new(), plan.targets.clone());
            self.scheduler(deadline).run(&set, &plan, &mut run).await;
            run.conclude();
            run
        }
    }

    fn id(name: &str) -> ServiceId {
        ServiceId::new(name)
    }

    #[tokio::test]
    async fn dependencies_are_healthy_before_dependents_start() {
        let h = Harness::new();
        let run = h.run(Action::Start, None).await;
        assert!(run.status.is_success());
        for (dep, dependent) in [("db", "api"), ("cache", "api"), ("api", "web")] {
            let healthy = run.seq_of(&id(dep), ServicePhase::Healthy).unwrap();
            let starting = run.seq_of(&id(dependent), ServicePhase::Starting).unwrap();
            assert!(healthy < starting, "{dep} healthy at {healthy}, {dependent} starting at {starting}");
        }
        assert_eq!(
            run.services[&id("api")].health.as_ref().map(|v| v.attempts),
            Some(1)
        );
        assert!(run.seq_of(&id("api"), ServicePhase::AwaitingHealth).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn unhealthy_dependency_aborts_dependents() {
        let h = Harness::new();
        h.check.always("db", ProbeOutcome::NotReady("refused".into()));
        let run = h.run(Action::Start, None).await;

        assert_eq!(run.phase(&id("db")), Some(ServicePhase::Unhealthy));
        assert_eq!(run.phase(&id("api")), Some(ServicePhase::Aborted));
        assert_eq!(run.phase(&id("web")), Some(ServicePhase::Aborted));
        assert_eq!(run.phase(&id("cache")), Some(ServicePhase::Healthy));
        assert_eq!(run.status, crate::domain::run::RunStatus::PartiallyFailed);
        assert!(!h.runtime.started().contains(&id("api")));
        assert_eq!(
            run.services[&id("api")].error.as_deref(),
            Some("dependency 'db' is unhealthy")
        );
    }

    #[tokio::test]
    async fn stop_walks_dependents_first() {
        let h = Harness::new();
        for name in ["db", "cache", "api", "web"] {
            h.runtime.set_running(name, 1);
        }
        let run = h.run(Action::Stop, None).await;
        assert!(run.status.is_success());
        let web = run.seq_of(&id("web"), ServicePhase::Stopped).unwrap();
        let api_stopping = run.seq_of(&id("api"), ServicePhase::Stopping).unwrap();
        let api = run.seq_of(&id("api"), ServicePhase::Stopped).unwrap();
        let db_stopping = run.seq_of(&id("db"), ServicePhase::Stopping).unwrap();
        assert!(web < api_stopping);
        assert!(api < db_stopping);
        assert!(!h.runtime.any_running());
    }

    #[tokio::test]
    async fn failed_stop_leaves_dependencies_running() {
        let h = Harness::new();
        h.runtime.set_running("db", 1);
        h.runtime.set_running("api", 1);
        h.runtime.fail(Op::Stop, "api");
        let run = h.run(Action::Stop, None).await;
        assert_eq!(run.phase(&id("api")), Some(ServicePhase::Failed));
        assert_eq!(run.phase(&id("db")), Some(ServicePhase::Aborted));
        assert_eq!(h.runtime.running(&id("db")), 1);
    }

    #[tokio::test]
    async fn prepare_failure_aborts_the_run() {
        let h = Harness::new();
        h.runtime.fail(Op::Pull, "cache");
        let run = h.run(Action::Update, None).await;
        assert_eq!(run.status, crate::domain::run::RunStatus::Aborted);
        assert_eq!(run.phase(&id("cache")), Some(ServicePhase::Failed));
        assert_eq!(run.phase(&id("db")), Some(ServicePhase::Aborted));
        assert!(run.abort_reason.as_deref().unwrap().contains("pull of 'cache'"));
        assert!(h.runtime.stopped().is_empty());
        assert!(h.runtime.started().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_finishes_in_flight_and_leaves_rest_pending() {
        let h = Harness::new();
        h.runtime.delay(Op::Start, "db", Duration::from_millis(200));
        let cancel = h.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });
        let run = h.run(Action::Start, None).await;

        assert!(run.cancelled);
        assert_eq!(run.status, crate::domain::run::RunStatus::Aborted);
        assert_eq!(run.phase(&id("db")), Some(ServicePhase::Healthy));
        assert_eq!(run.phase(&id("web")), Some(ServicePhase::Pending));
        assert!(run.services.values().all(|r| !r.phase.is_transient()));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_cuts_in_flight_steps() {
        let h = Harness::new();
        h.check.hang("db");
        let deadline = Instant::now() + Duration::from_millis(300);
        let run = h.run(Action::Start, Some(deadline)).await;

        assert!(run.deadline_exceeded);
        assert_eq!(run.status, crate::domain::run::RunStatus::PartiallyFailed);
        assert_eq!(run.phase(&id("db")), Some(ServicePhase::Unhealthy));
        assert_eq!(run.services[&id("db")].error.as_deref(), Some(DEADLINE_REASON));
        assert_eq!(run.phase(&id("api")), Some(ServicePhase::Pending));
    }
}
