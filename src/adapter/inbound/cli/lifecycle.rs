//! Handlers for stack-mutating commands.

use serde::Serialize;
use tabled::Tabled;

use crate::adapter::inbound::cli::command::TargetArgs;
use crate::adapter::inbound::cli::{operator, output};
use crate::domain::run::Action;
use crate::error::{Error, Result};
use crate::port::inbound::operator::lifecycle::{LifecycleRequest, RunSummary, ServiceOutcome};

/// Extra knobs for `start --build` and `scale --replicas`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    pub build: bool,
    pub replicas: Option<u32>,
}

/// Run one lifecycle action and render its summary.
///
/// Returns `Error::RunIncomplete` when the run did not complete, so the
/// process exits non-zero after the table has been printed.
pub async fn execute(
    config_toml: String,
    action: Action,
    target: &TargetArgs,
    options: RunOptions,
) -> Result<()> {
    let request = LifecycleRequest {
        environment: target.env.environment.clone(),
        services: target.services.clone(),
        build: options.build,
        replicas: options.replicas,
        ..LifecycleRequest::new(config_toml, action)
    };

    let pb = output::spinner(&format!("{}...", progress_verb(action)));
    let summary = match operator::operator()?.execute(request).await {
        Ok(summary) => summary,
        Err(e) => {
            output::spinner_fail(&pb, &format!("{action} failed"));
            return Err(e);
        }
    };

    if summary.succeeded() {
        output::spinner_success(&pb, &format!("{action} completed"));
    } else {
        output::spinner_fail(&pb, &format!("{action} {}", summary.status));
    }
    render(&summary);

    if summary.succeeded() {
        Ok(())
    } else {
        Err(Error::RunIncomplete {
            run_id: summary.run_id,
            status: summary.status,
        })
    }
}

/// Print a finished run: per-service table, then run metadata.
pub fn render(summary: &RunSummary) {
    if output::is_json() {
        output::json_output(serde_json::json!(summary));
        return;
    }

    output::field("Environment", &summary.environment);
    output::field("Run", output::muted(&summary.run_id));
    output::field("Status", status_label(summary));
    if let Some(ms) = summary.duration_ms {
        output::field("Duration", format!("{ms} ms"));
    }

    let rows: Vec<OutcomeRow> = summary.services.iter().map(OutcomeRow::from).collect();
    if !rows.is_empty() {
        output::section("Services");
        output::table(&rows);
    }

    if let Some(reason) = &summary.abort_reason {
        output::warning(&format!("aborted: {reason}"));
    }
    if summary.deadline_exceeded {
        output::warning("run deadline exceeded; in-flight work was cancelled");
    } else if summary.cancelled {
        output::warning("run cancelled by operator");
    }
    if let Some(report) = &summary.report {
        output::note(&format!("report: {report}"));
    }
}

fn status_label(summary: &RunSummary) -> String {
    if summary.succeeded() {
        output::positive(summary.status)
    } else {
        output::negative(summary.status)
    }
}

const fn progress_verb(action: Action) -> &'static str {
    match action {
        Action::Start => "Starting",
        Action::Stop => "Stopping",
        Action::Restart => "Restarting",
        Action::Build => "Building",
        Action::Pull => "Pulling",
        Action::Update => "Updating",
        Action::Scale => "Scaling",
        Action::Rollback => "Rolling back",
    }
}

#[derive(Debug, Serialize, Tabled)]
struct OutcomeRow {
    #[tabled(rename = "Service")]
    service: String,
    #[tabled(rename = "Phase")]
    phase: String,
    #[tabled(rename = "Attempts")]
    attempts: String,
    #[tabled(rename = "Latency")]
    latency: String,
    #[tabled(rename = "Error")]
    error: String,
}

impl From<&ServiceOutcome> for OutcomeRow {
    fn from(outcome: &ServiceOutcome) -> Self {
        Self {
            service: outcome.service.clone(),
            phase: outcome.phase.clone(),
            attempts: outcome.attempts.map(|a| a.to_string()).unwrap_or_default(),
            latency: outcome
                .latency_ms
                .map(|ms| format!("{ms} ms"))
                .unwrap_or_default(),
            error: outcome.error.clone().unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_rows_blank_missing_fields() {
        let row = OutcomeRow::from(&ServiceOutcome {
            service: "api".into(),
            phase: "stopped".into(),
            healthy: None,
            attempts: None,
            latency_ms: None,
            error: None,
        });
        assert_eq!(row.attempts, "");
        assert_eq!(row.latency, "");
    }

    #[test]
    fn every_action_has_a_progress_verb() {
        assert_eq!(progress_verb(Action::Rollback), "Rolling back");
        assert_eq!(progress_verb(Action::Scale), "Scaling");
    }
}
