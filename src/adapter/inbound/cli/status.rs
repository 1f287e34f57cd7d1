//! Handler for the `status` command.

use serde::Serialize;
use tabled::Tabled;

use crate::adapter::inbound::cli::command::EnvironmentArg;
use crate::adapter::inbound::cli::{operator, output};
use crate::error::Result;
use crate::port::inbound::operator::status::{ContainerView, HostView, StatusSnapshot};

/// Show containers, resource usage, lock holder and the last run.
pub async fn execute(config_toml: &str, args: &EnvironmentArg) -> Result<()> {
    let snapshot = operator::operator()?
        .load_status(config_toml, args.environment.as_deref())
        .await?;

    if output::is_json() {
        output::json_output(serde_json::to_value(&snapshot)?);
        return Ok(());
    }
    if output::is_quiet() {
        return Ok(());
    }

    display(&snapshot);
    Ok(())
}

fn display(snapshot: &StatusSnapshot) {
    output::header(env!("CARGO_PKG_VERSION"));
    output::field("Project", &snapshot.project);
    output::field("Environment", &snapshot.environment);

    output::section("Containers");
    if let Some(error) = &snapshot.runtime_error {
        output::warning(&format!("runtime unavailable: {error}"));
    } else if snapshot.containers.is_empty() {
        output::note("no containers");
    } else {
        let rows: Vec<ContainerRow> = snapshot.containers.iter().map(ContainerRow::from).collect();
        output::table(&rows);
    }

    output::section("Host");
    display_host(&snapshot.host);

    output::section("Lock");
    match &snapshot.lock {
        Some(lock) => {
            let holder = format!("{} ({}, pid {} on {})", lock.holder, lock.purpose, lock.pid, lock.host);
            output::field("Holder", holder);
            output::field("Since", &lock.since);
            if lock.stale {
                output::hint("holder process is gone; the next run reclaims this lock");
            }
        }
        None => output::field("Holder", output::muted("free")),
    }

    output::section("Last run");
    match &snapshot.last_run {
        Some(run) => {
            output::field("Run", output::muted(&run.run_id));
            output::field("Action", &run.action);
            let status = if run.status == "completed" {
                output::positive(&run.status)
            } else {
                output::negative(&run.status)
            };
            output::field("Status", status);
            if let Some(finished) = &run.finished_at {
                output::field("Finished", finished);
            }
        }
        None => output::note("no runs recorded"),
    }

    if let Some(marker) = &snapshot.restore_marker {
        output::warning(&format!(
            "restore of snapshot {} incomplete at step '{}' (since {})",
            marker.snapshot, marker.step, marker.since
        ));
        output::hint("re-run `stackctl restore --snapshot <id>` to finish it");
    }
}

fn display_host(host: &HostView) {
    let pair = |available: Option<u64>, total: Option<u64>| match (available, total) {
        (Some(a), Some(t)) => format!("{} free of {}", output::bytes(a), output::bytes(t)),
        (Some(a), None) => format!("{} free", output::bytes(a)),
        _ => output::muted("unknown"),
    };
    output::field(
        "Memory",
        pair(host.memory_available_bytes, host.memory_total_bytes),
    );
    output::field("Disk", pair(host.disk_available_bytes, host.disk_total_bytes));
}

#[derive(Debug, Serialize, Tabled)]
struct ContainerRow {
    #[tabled(rename = "Service")]
    service: String,
    #[tabled(rename = "Container")]
    container: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "Memory")]
    memory: String,
}

impl From<&ContainerView> for ContainerRow {
    fn from(view: &ContainerView) -> Self {
        Self {
            service: view.service.clone(),
            container: view.container.clone(),
            state: view.state.clone(),
            cpu: view
                .cpu_percent
                .map(|cpu| format!("{cpu:.1}%"))
                .unwrap_or_else(|| "-".into()),
            memory: view.memory_bytes.map(output::bytes).unwrap_or_else(|| "-".into()),
        }
    }
}
