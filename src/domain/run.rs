//! Run state for one orchestration invocation.
//!
//! A [`RunState`] tracks every selected service through the lifecycle state
//! machine. Each accepted transition is appended to an ordered log with a
//! monotonically increasing sequence number, which is what reports and
//! ordering assertions are built on.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::DomainError;
use super::health::HealthVerdict;
use super::id::{RunId, ServiceId};

/// Operator-requested action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Start,
    Stop,
    Restart,
    Build,
    Pull,
    Update,
    Scale,
    Rollback,
}

impl Action {
    /// Name used in reports, file names and log fields.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
            Self::Build => "build",
            Self::Pull => "pull",
            Self::Update => "update",
            Self::Scale => "scale",
            Self::Rollback => "rollback",
        }
    }

    /// Whether the action changes which containers are running.
    #[must_use]
    pub const fn mutates_stack(self) -> bool {
        !matches!(self, Self::Build | Self::Pull)
    }

    /// Whether a completed run of this action leaves a known-good deployment.
    #[must_use]
    pub const fn records_last_good(self) -> bool {
        matches!(
            self,
            Self::Start | Self::Restart | Self::Update | Self::Scale | Self::Rollback
        )
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-service lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServicePhase {
    Pending,
    Building,
    Built,
    Pulling,
    Pulled,
    Starting,
    AwaitingHealth,
    Healthy,
    Unhealthy,
    Stopping,
    Stopped,
    /// A runtime call failed.
    Failed,
    /// Skipped because a prerequisite did not become ready.
    Aborted,
}

impl ServicePhase {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Building => "building",
            Self::Built => "built",
            Self::Pulling => "pulling",
            Self::Pulled => "pulled",
            Self::Starting => "starting",
            Self::AwaitingHealth => "awaiting_health",
            Self::Healthy => "healthy",
            Self::Unhealthy => "unhealthy",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
        }
    }

    /// Whether the state machine allows moving from `self` to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        use ServicePhase::{
            Aborted, AwaitingHealth, Building, Built, Failed, Healthy, Pending, Pulled, Pulling,
            Starting, Stopped, Stopping, Unhealthy,
        };
        matches!(
            (self, next),
            (Pending, Building | Pulling | Starting | Stopping | Aborted)
                | (Building, Built | Failed)
                | (Pulling, Pulled | Failed)
                | (Built | Pulled, Starting | Stopping | Aborted)
                | (Starting, AwaitingHealth | Healthy | Failed)
                | (AwaitingHealth, Healthy | Unhealthy)
                | (Stopping, Stopped | Failed)
                | (Stopped, Starting | Aborted)
        )
    }

    /// A step for this service is in flight.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(
            self,
            Self::Building | Self::Pulling | Self::Starting | Self::AwaitingHealth | Self::Stopping
        )
    }

    /// The service ended the run in a failed state.
    #[must_use]
    pub const fn is_failure(self) -> bool {
        matches!(self, Self::Unhealthy | Self::Failed | Self::Aborted)
    }
}

impl fmt::Display for ServicePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    InProgress,
    Completed,
    PartiallyFailed,
    Aborted,
}

impl RunStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::PartiallyFailed => "partially_failed",
            Self::Aborted => "aborted",
        }
    }

    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one service within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub phase: ServicePhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<HealthVerdict>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServiceRecord {
    fn pending() -> Self {
        Self {
            phase: ServicePhase::Pending,
            health: None,
            error: None,
        }
    }
}

/// One accepted phase change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub seq: u64,
    pub service: ServiceId,
    pub from: ServicePhase,
    pub to: ServicePhase,
    pub at: DateTime<Utc>,
}

/// State of a single orchestration run.
///
/// Owned by the lifecycle controller for the duration of the run and handed
/// to the report generator once concluded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: RunId,
    pub environment: String,
    pub action: Action,
    /// Services named by the operator; empty means the whole stack.
    pub selected: Vec<ServiceId>,
    pub services: BTreeMap<ServiceId, ServiceRecord>,
    pub transitions: Vec<Transition>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<String>,
    #[serde(default)]
    pub cancelled: bool,
    #[serde(default)]
    pub deadline_exceeded: bool,
}

impl RunState {
    /// Start tracking a run over `targets`, every service `Pending`.
    pub fn new(
        environment: impl Into<String>,
        action: Action,
        selected: Vec<ServiceId>,
        targets: impl IntoIterator<Item = ServiceId>,
    ) -> Self {
        Self {
            run_id: RunId::new(),
            environment: environment.into(),
            action,
            selected,
            services: targets
                .into_iter()
                .map(|id| (id, ServiceRecord::pending()))
                .collect(),
            transitions: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
            status: RunStatus::InProgress,
            abort_reason: None,
            cancelled: false,
            deadline_exceeded: false,
        }
    }

    /// Current phase of a tracked service.
    #[must_use]
    pub fn phase(&self, service: &ServiceId) -> Option<ServicePhase> {
        self.services.get(service).map(|record| record.phase)
    }

    /// Apply a transition, returning its sequence number.
    ///
    /// Setting the current phase again is a no-op and returns `None`.
    pub fn set_phase(
        &mut self,
        service: &ServiceId,
        to: ServicePhase,
    ) -> Result<Option<u64>, DomainError> {
        let record = self
            .services
            .get_mut(service)
            .ok_or_else(|| DomainError::NotInRun(service.to_string()))?;
        let from = record.phase;
        if from == to {
            return Ok(None);
        }
        if !from.can_transition_to(to) {
            return Err(DomainError::InvalidTransition {
                service: service.to_string(),
                from,
                to,
            });
        }
        record.phase = to;

        let seq = self.transitions.len() as u64 + 1;
        self.transitions.push(Transition {
            seq,
            service: service.clone(),
            from,
            to,
            at: Utc::now(),
        });
        Ok(Some(seq))
    }

    /// Transition into a failure phase and remember why.
    pub fn fail(
        &mut self,
        service: &ServiceId,
        to: ServicePhase,
        error: impl Into<String>,
    ) -> Result<(), DomainError> {
        self.set_phase(service, to)?;
        if let Some(record) = self.services.get_mut(service) {
            record.error = Some(error.into());
        }
        Ok(())
    }

    pub fn attach_health(&mut self, verdict: HealthVerdict) {
        if let Some(record) = self.services.get_mut(&verdict.service) {
            if !verdict.healthy && record.error.is_none() {
                record.error = verdict.last_error.clone();
            }
            record.health = Some(verdict);
        }
    }

    /// Mark the run aborted; the first reason wins.
    pub fn abort(&mut self, reason: impl Into<String>) {
        if self.abort_reason.is_none() {
            self.abort_reason = Some(reason.into());
        }
    }

    /// Sequence number of the first transition of `service` into `phase`.
    #[must_use]
    pub fn seq_of(&self, service: &ServiceId, phase: ServicePhase) -> Option<u64> {
        self.transitions
            .iter()
            .find(|t| &t.service == service && t.to == phase)
            .map(|t| t.seq)
    }

    /// Services currently in `phase`.
    pub fn in_phase(&self, phase: ServicePhase) -> impl Iterator<Item = &ServiceId> {
        self.services
            .iter()
            .filter(move |(_, record)| record.phase == phase)
            .map(|(id, _)| id)
    }

    /// Compute the terminal status and stamp the end time.
    ///
    /// A blown deadline always yields `PartiallyFailed`. Cancellation or an
    /// explicit abort yields `Aborted`. Otherwise any failed service makes the
    /// run `PartiallyFailed`.
    pub fn conclude(&mut self) -> RunStatus {
        let status = if self.deadline_exceeded {
            RunStatus::PartiallyFailed
        } else if self.cancelled || self.abort_reason.is_some() {
            RunStatus::Aborted
        } else if self.services.values().any(|r| r.phase.is_failure()) {
            RunStatus::PartiallyFailed
        } else {
            RunStatus::Completed
        };
        self.status = status;
        self.finished_at = Some(Utc::now());
        status
    }

    /// Wall-clock duration in milliseconds, once concluded.
    #[must_use]
    pub fn duration_ms(&self) -> Option<i64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<ServiceId> {
        names.iter().map(|n| ServiceId::new(*n)).collect()
    }

    fn run(names: &[&str]) -> RunState {
        RunState::new("dev", Action::Start, Vec::new(), ids(names))
    }

    #[test]
    fn start_path_is_allowed() {
        use ServicePhase::*;
        let path = [Pending, Building, Built, Starting, AwaitingHealth, Healthy];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn terminal_phases_do_not_move() {
        use ServicePhase::*;
        for phase in [Healthy, Unhealthy, Failed, Aborted] {
            assert!(!phase.can_transition_to(Starting));
            assert!(!phase.can_transition_to(Pending));
        }
    }

    #[test]
    fn pending_cannot_jump_to_healthy() {
        assert!(!ServicePhase::Pending.can_transition_to(ServicePhase::Healthy));
    }

    #[test]
    fn set_phase_assigns_increasing_sequence_numbers() {
        let mut state = run(&["db", "api"]);
        let db = ServiceId::new("db");
        let api = ServiceId::new("api");

        let a = state.set_phase(&db, ServicePhase::Starting).unwrap().unwrap();
        let b = state.set_phase(&api, ServicePhase::Starting).unwrap().unwrap();
        let c = state.set_phase(&db, ServicePhase::Healthy).unwrap().unwrap();
        assert!(a < b && b < c);
        assert_eq!(state.seq_of(&db, ServicePhase::Healthy), Some(c));
    }

    #[test]
    fn repeated_phase_is_a_noop() {
        let mut state = run(&["db"]);
        let db = ServiceId::new("db");
        state.set_phase(&db, ServicePhase::Starting).unwrap();
        assert_eq!(state.set_phase(&db, ServicePhase::Starting).unwrap(), None);
        assert_eq!(state.transitions.len(), 1);
    }

    #[test]
    fn illegal_transition_is_rejected() {
        let mut state = run(&["db"]);
        let err = state
            .set_phase(&ServiceId::new("db"), ServicePhase::Healthy)
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition { .. }));
        assert!(state.transitions.is_empty());
    }

    #[test]
    fn unknown_service_is_rejected() {
        let mut state = run(&["db"]);
        assert_eq!(
            state.set_phase(&ServiceId::new("web"), ServicePhase::Starting),
            Err(DomainError::NotInRun("web".into()))
        );
    }

    #[test]
    fn conclude_completed_when_all_healthy() {
        let mut state = run(&["db"]);
        let db = ServiceId::new("db");
        state.set_phase(&db, ServicePhase::Starting).unwrap();
        state.set_phase(&db, ServicePhase::Healthy).unwrap();
        assert_eq!(state.conclude(), RunStatus::Completed);
        assert!(state.finished_at.is_some());
    }

    #[test]
    fn conclude_partially_failed_on_unhealthy() {
        let mut state = run(&["db", "api"]);
        let db = ServiceId::new("db");
        state.set_phase(&db, ServicePhase::Starting).unwrap();
        state.set_phase(&db, ServicePhase::AwaitingHealth).unwrap();
        state.fail(&db, ServicePhase::Unhealthy, "timeout").unwrap();
        state
            .fail(&ServiceId::new("api"), ServicePhase::Aborted, "db not ready")
            .unwrap();
        assert_eq!(state.conclude(), RunStatus::PartiallyFailed);
        assert_eq!(state.services[&db].error.as_deref(), Some("timeout"));
    }

    #[test]
    fn abort_reason_wins_over_service_failures() {
        let mut state = run(&["db"]);
        state.abort("build failed");
        state.abort("second reason");
        assert_eq!(state.conclude(), RunStatus::Aborted);
        assert_eq!(state.abort_reason.as_deref(), Some("build failed"));
    }

    #[test]
    fn deadline_forces_partially_failed() {
        let mut state = run(&["db"]);
        state.cancelled = true;
        state.deadline_exceeded = true;
        assert_eq!(state.conclude(), RunStatus::PartiallyFailed);
    }

    #[test]
    fn action_classification() {
        assert!(!Action::Build.mutates_stack());
        assert!(Action::Stop.mutates_stack());
        assert!(Action::Rollback.records_last_good());
        assert!(!Action::Stop.records_last_good());
    }

    #[test]
    fn run_state_serializes_phases_in_snake_case() {
        let mut state = run(&["db"]);
        state
            .set_phase(&ServiceId::new("db"), ServicePhase::Starting)
            .unwrap();
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["services"]["db"]["phase"], "starting");
        assert_eq!(json["status"], "in_progress");
        assert_eq!(json["action"], "start");
    }
}
