//! Handler for the `validate` command.

use crate::adapter::inbound::cli::command::EnvironmentArg;
use crate::adapter::inbound::cli::{operator, output};
use crate::error::Result;

/// Load and validate the manifest, then print the start order.
pub fn execute(config_toml: &str, args: &EnvironmentArg) -> Result<()> {
    let summary =
        operator::operator()?.validate_manifest(config_toml, args.environment.as_deref())?;

    if output::is_json() {
        output::json_output(serde_json::to_value(&summary)?);
        return Ok(());
    }

    output::header(env!("CARGO_PKG_VERSION"));
    output::field("Project", &summary.project);
    output::field("Environment", &summary.environment);
    for source in &summary.sources {
        output::field("Source", output::muted(source));
    }

    output::section("Start order");
    for (position, name) in summary.start_order.iter().enumerate() {
        let Some(service) = summary.services.iter().find(|s| &s.name == name) else {
            continue;
        };
        let deps = if service.depends_on.is_empty() {
            String::new()
        } else {
            output::muted(format!("after {}", service.depends_on.join(", ")))
        };
        output::lines(&format!(
            "{:>2}. {} {} x{} [{}] {}",
            position + 1,
            output::highlight(&service.name),
            service.image,
            service.replicas,
            service.health,
            deps
        ));
    }

    if !summary.volumes.is_empty() {
        output::field("Volumes", summary.volumes.join(", "));
    }
    if let Some(database) = &summary.database {
        output::field("Database", database);
    }

    output::success("manifest is valid");
    Ok(())
}
