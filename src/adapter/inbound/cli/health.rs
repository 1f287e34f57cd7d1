//! Handler for the `health` command.

use serde::Serialize;
use tabled::Tabled;

use crate::adapter::inbound::cli::command::HealthArgs;
use crate::adapter::inbound::cli::{operator, output};
use crate::error::{Error, Result};
use crate::port::inbound::operator::health::{HealthRequest, HealthRow};

/// Probe the selected services and print a pass/fail table.
///
/// Exits non-zero through `Error::Unhealthy` when any service fails.
pub async fn execute(config_toml: String, args: &HealthArgs) -> Result<()> {
    let request = HealthRequest {
        config_toml,
        environment: args.target.env.environment.clone(),
        services: args.target.services.clone(),
        attempts: args.attempts,
    };

    let pb = output::spinner("Probing services...");
    let report = match operator::operator()?.check_health(request).await {
        Ok(report) => report,
        Err(e) => {
            output::spinner_fail(&pb, "health check failed");
            return Err(e);
        }
    };

    let unhealthy = report.unhealthy_count();
    if unhealthy == 0 {
        output::spinner_success(&pb, &format!("{} service(s) healthy", report.rows.len()));
    } else {
        output::spinner_fail(&pb, &format!("{unhealthy} of {} unhealthy", report.rows.len()));
    }

    output::field("Environment", &report.environment);
    let rows: Vec<CheckRow> = report.rows.iter().map(CheckRow::from).collect();
    output::table(&rows);

    if unhealthy == 0 {
        Ok(())
    } else {
        Err(Error::Unhealthy(unhealthy))
    }
}

#[derive(Debug, Serialize, Tabled)]
struct CheckRow {
    #[tabled(rename = "Service")]
    service: String,
    #[tabled(rename = "Check")]
    check: String,
    #[tabled(rename = "Result")]
    result: &'static str,
    #[tabled(rename = "Attempts")]
    attempts: u32,
    #[tabled(rename = "Latency")]
    latency: String,
    #[tabled(rename = "Last error")]
    error: String,
}

impl From<&HealthRow> for CheckRow {
    fn from(row: &HealthRow) -> Self {
        Self {
            service: row.service.clone(),
            check: row.check.clone(),
            result: if row.healthy { "pass" } else { "fail" },
            attempts: row.attempts,
            latency: format!("{} ms", row.latency_ms),
            error: row.error.clone().unwrap_or_default(),
        }
    }
}
