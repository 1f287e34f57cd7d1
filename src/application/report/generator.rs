//! Run reports: a pure projection of a concluded [`RunState`] plus a resource
//! snapshot taken when the run ended.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::id::{RunId, ServiceId};
use crate::domain::run::{Action, RunState, RunStatus, ServicePhase, Transition};
use crate::port::outbound::resource::HostResources;
use crate::port::outbound::runtime::ContainerUsage;

/// Schema version of the JSON report.
pub const REPORT_VERSION: u32 = 1;

/// Timestamp format used in report file names.
const STAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.3fZ";

/// Resources observed when the run ended.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    pub sampled_at: Option<DateTime<Utc>>,
    pub host: HostResources,
    #[serde(default)]
    pub containers: Vec<ContainerUsage>,
    /// Why container usage is missing, when it is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_error: Option<String>,
}

/// Outcome of one service in a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceReport {
    pub service: ServiceId,
    pub phase: ServicePhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub healthy: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Structured record of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub version: u32,
    pub run_id: RunId,
    pub project: String,
    pub environment: String,
    pub action: Action,
    pub status: RunStatus,
    pub selected: Vec<ServiceId>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<String>,
    #[serde(default)]
    pub cancelled: bool,
    #[serde(default)]
    pub deadline_exceeded: bool,
    pub services: Vec<ServiceReport>,
    pub transitions: Vec<Transition>,
    pub resources: ResourceSnapshot,
}

/// Project a run into its report.
///
/// A run that was never concluded is reported with its start time as the end
/// time.
#[must_use]
pub fn generate(run: &RunState, project: &str, resources: ResourceSnapshot) -> RunReport {
    let finished_at = run.finished_at.unwrap_or(run.started_at);
    let services = run
        .services
        .iter()
        .map(|(id, record)| ServiceReport {
            service: id.clone(),
            phase: record.phase,
            healthy: record.health.as_ref().map(|v| v.healthy),
            attempts: record.health.as_ref().map(|v| v.attempts),
            latency_ms: record.health.as_ref().map(|v| v.latency_ms),
            error: record.error.clone(),
        })
        .collect();

    RunReport {
        version: REPORT_VERSION,
        run_id: run.run_id.clone(),
        project: project.to_string(),
        environment: run.environment.clone(),
        action: run.action,
        status: run.status,
        selected: run.selected.clone(),
        started_at: run.started_at,
        finished_at,
        duration_ms: (finished_at - run.started_at).num_milliseconds(),
        abort_reason: run.abort_reason.clone(),
        cancelled: run.cancelled,
        deadline_exceeded: run.deadline_exceeded,
        services,
        transitions: run.transitions.clone(),
        resources,
    }
}

impl RunReport {
    /// `<finished>-<action>-<run>`, sortable by time.
    #[must_use]
    pub fn file_stem(&self) -> String {
        format!(
            "{}-{}-{}",
            self.finished_at.format(STAMP_FORMAT),
            self.action,
            self.run_id.short()
        )
    }

    /// Human-readable rendition written next to the JSON report.
    #[must_use]
    pub fn render_log(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "run {} {} {} ({}/{})",
            self.run_id, self.action, self.status, self.project, self.environment
        );
        let _ = writeln!(
            out,
            "started {}  finished {}  duration {}ms",
            self.started_at.to_rfc3339(),
            self.finished_at.to_rfc3339(),
            self.duration_ms
        );
        if let Some(reason) = &self.abort_reason {
            let _ = writeln!(out, "aborted: {reason}");
        }
        if self.cancelled {
            let _ = writeln!(out, "cancelled by operator");
        }
        if self.deadline_exceeded {
            let _ = writeln!(out, "run deadline exceeded");
        }

        let _ = writeln!(out, "\nservices:");
        for service in &self.services {
            let _ = write!(out, "  {:<20} {:<16}", service.service, service.phase);
            if let (Some(attempts), Some(latency)) = (service.attempts, service.latency_ms) {
                let _ = write!(out, " attempts={attempts} latency={latency}ms");
            }
            if let Some(error) = &service.error {
                let _ = write!(out, " error={error}");
            }
            out.push('\n');
        }

        let _ = writeln!(out, "\ntransitions:");
        for t in &self.transitions {
            let _ = writeln!(
                out,
                "  #{:<4} {} {:<20} {} -> {}",
                t.seq,
                t.at.format("%H:%M:%S%.3f"),
                t.service,
                t.from,
                t.to
            );
        }

        let _ = writeln!(out, "\nresources:");
        let host = &self.resources.host;
        if let (Some(avail), Some(total)) = (host.memory_available_bytes, host.memory_total_bytes) {
            let _ = writeln!(out, "  memory {avail}/{total} bytes available");
        }
        if let (Some(avail), Some(total)) = (host.disk_available_bytes, host.disk_total_bytes) {
            let _ = writeln!(out, "  disk   {avail}/{total} bytes available");
        }
        for c in &self.resources.containers {
            let _ = writeln!(
                out,
                "  {:<28} cpu {:>6.2}%  mem {} bytes",
                c.container, c.cpu_percent, c.memory_bytes
            );
        }
        if let Some(error) = &self.resources.container_error {
            let _ = writeln!(out, "  container usage unavailable: {error}");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::health::HealthVerdict;

    fn concluded() -> RunState {
        let db = ServiceId::new("db");
        let api = ServiceId::new("api");
        let mut run = RunState::new("dev", Action::Start, Vec::new(), [db.clone(), api.clone()]);
        run.set_phase(&db, ServicePhase::Starting).unwrap();
        run.set_phase(&db, ServicePhase::AwaitingHealth).unwrap();
        run.fail(&db, ServicePhase::Unhealthy, "refused").unwrap();
        run.attach_health(HealthVerdict::unhealthy(db, 3, 700, "refused"));
        run.fail(&api, ServicePhase::Aborted, "dependency 'db' is unhealthy")
            .unwrap();
        run.conclude();
        run
    }

    #[test]
    fn report_mirrors_the_run() {
        let run = concluded();
        let report = generate(&run, "acme", ResourceSnapshot::default());

        assert_eq!(report.version, REPORT_VERSION);
        assert_eq!(report.status, RunStatus::PartiallyFailed);
        assert_eq!(report.transitions.len(), 4);
        let db = &report.services[1];
        assert_eq!(db.service.as_str(), "db");
        assert_eq!(db.healthy, Some(false));
        assert_eq!(db.attempts, Some(3));
        let api = &report.services[0];
        assert_eq!(api.phase, ServicePhase::Aborted);
        assert_eq!(api.healthy, None);
    }

    #[test]
    fn file_stem_sorts_by_finish_time() {
        let report = generate(&concluded(), "acme", ResourceSnapshot::default());
        let stem = report.file_stem();
        assert!(stem.ends_with(&format!("-start-{}", report.run_id.short())));
        assert_eq!(&stem[8..9], "T");
    }

    #[test]
    fn log_lists_services_and_transitions() {
        let report = generate(&concluded(), "acme", ResourceSnapshot::default());
        let log = report.render_log();
        assert!(log.contains("partially_failed"));
        assert!(log.contains("error=dependency 'db' is unhealthy"));
        assert!(log.contains("starting -> awaiting_health"));
    }
}
