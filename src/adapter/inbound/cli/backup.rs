//! Handlers for `backup`, `restore` and `snapshots`.

use dialoguer::Input;
use serde::Serialize;
use tabled::Tabled;

use crate::adapter::inbound::cli::command::{EnvironmentArg, RestoreArgs};
use crate::adapter::inbound::cli::{lifecycle, operator, output};
use crate::error::{Error, Result};
use crate::port::inbound::operator::backup::{BackupRequest, RestoreRequest, SnapshotListing};

/// Snapshot the quiesced stack.
///
/// The snapshot id is printed even in quiet mode so scripts can capture it.
pub async fn backup(config_toml: String, args: &EnvironmentArg) -> Result<()> {
    let request = BackupRequest {
        config_toml,
        environment: args.environment.clone(),
    };

    let pb = output::spinner("Creating snapshot...");
    let receipt = match operator::operator()?.backup(request).await {
        Ok(receipt) => receipt,
        Err(e) => {
            output::spinner_fail(&pb, "backup failed");
            return Err(e);
        }
    };
    output::spinner_success(&pb, &format!("snapshot {} published", receipt.snapshot_id));

    if output::is_json() {
        output::json_output(serde_json::to_value(&receipt)?);
        return Ok(());
    }
    if output::is_quiet() {
        println!("{}", receipt.snapshot_id);
        return Ok(());
    }

    output::field("Environment", &receipt.environment);
    output::field("Snapshot", output::highlight(&receipt.snapshot_id));
    output::field("Artifacts", receipt.artifacts);
    output::field("Size", output::bytes(receipt.bytes));
    output::field(
        "Database",
        if receipt.database_dump {
            "dumped".to_string()
        } else {
            output::muted("none")
        },
    );
    for pruned in &receipt.pruned {
        output::note(&format!("pruned {pruned}"));
    }
    Ok(())
}

/// Replay a snapshot. Asks for confirmation unless `--force` is given.
pub async fn restore(config_toml: String, args: &RestoreArgs) -> Result<()> {
    if !args.force {
        confirm_restore(args)?;
    }

    let request = RestoreRequest {
        config_toml,
        environment: args.env.environment.clone(),
        snapshot: args.snapshot.clone(),
    };

    let pb = output::spinner(&format!("Restoring {}...", args.snapshot));
    let receipt = match operator::operator()?.restore(request).await {
        Ok(receipt) => receipt,
        Err(e) => {
            output::spinner_fail(&pb, "restore failed");
            return Err(e);
        }
    };

    if receipt.start.succeeded() {
        output::spinner_success(&pb, &format!("snapshot {} restored", receipt.snapshot_id));
    } else {
        output::spinner_fail(&pb, "snapshot restored but the stack did not come up");
    }

    if output::is_json() {
        output::json_output(serde_json::to_value(&receipt)?);
    } else {
        output::field("Volumes", receipt.volumes_restored);
        output::field("Database", receipt.database_restored);
        lifecycle::render(&receipt.start);
    }

    if receipt.start.succeeded() {
        Ok(())
    } else {
        Err(Error::RunIncomplete {
            run_id: receipt.start.run_id,
            status: receipt.start.status,
        })
    }
}

fn confirm_restore(args: &RestoreArgs) -> Result<()> {
    if output::is_json() {
        return Err(Error::Cancelled(
            "restore needs --force in JSON mode".to_string(),
        ));
    }

    let environment = args.env.environment.as_deref().unwrap_or("the default environment");
    output::warning(&format!(
        "restore stops {environment} and replaces its volumes and database with snapshot {}",
        args.snapshot
    ));
    let answer: String = Input::new()
        .with_prompt("  Type 'yes' to continue")
        .allow_empty(true)
        .interact_text()?;

    if answer.trim() == "yes" {
        Ok(())
    } else {
        Err(Error::Cancelled("restore not confirmed".to_string()))
    }
}

/// List snapshots, newest first.
pub fn snapshots(config_toml: &str, args: &EnvironmentArg) -> Result<()> {
    let listing = operator::operator()?.list_snapshots(config_toml, args.environment.as_deref())?;

    if output::is_json() {
        output::json_output(serde_json::to_value(&listing)?);
        return Ok(());
    }
    if listing.is_empty() {
        output::note("no snapshots");
        return Ok(());
    }

    let rows: Vec<SnapshotRow> = listing.iter().map(SnapshotRow::from).collect();
    output::table(&rows);
    Ok(())
}

#[derive(Debug, Serialize, Tabled)]
struct SnapshotRow {
    #[tabled(rename = "Snapshot")]
    id: String,
    #[tabled(rename = "Created")]
    created_at: String,
    #[tabled(rename = "Volumes")]
    volumes: usize,
    #[tabled(rename = "Database")]
    database: &'static str,
    #[tabled(rename = "Size")]
    size: String,
}

impl From<&SnapshotListing> for SnapshotRow {
    fn from(listing: &SnapshotListing) -> Self {
        Self {
            id: listing.id.clone(),
            created_at: listing.created_at.clone(),
            volumes: listing.volumes,
            database: if listing.database_dump { "yes" } else { "no" },
            size: output::bytes(listing.bytes),
        }
    }
}
