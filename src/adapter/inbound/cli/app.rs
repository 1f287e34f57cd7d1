//! Command dispatch and error presentation.

use miette::Report;
use tracing::debug;

use crate::adapter::inbound::cli::command::{Cli, ColorChoice, Commands, TargetArgs};
use crate::adapter::inbound::cli::diagnostic::ManifestDiagnostic;
use crate::adapter::inbound::cli::lifecycle::RunOptions;
use crate::adapter::inbound::cli::{backup, health, lifecycle, operator, output, status, validate};
use crate::domain::run::Action;
use crate::error::{exit, Error, Result};

/// Apply global flags, run the command and map the outcome to an exit code.
pub async fn run(cli: Cli) -> i32 {
    output::set_color(match cli.color {
        ColorChoice::Auto => None,
        ColorChoice::Always => Some(true),
        ColorChoice::Never => Some(false),
    });
    output::configure(output::OutputConfig::new(cli.json, cli.quiet, cli.verbose));

    match dispatch(&cli).await {
        Ok(()) => exit::SUCCESS,
        Err(e) => {
            report(&e);
            e.exit_code()
        }
    }
}

async fn dispatch(cli: &Cli) -> Result<()> {
    let config_toml = operator::read_config_toml(cli.config.as_deref())?;
    debug!(command = ?cli.command, "Dispatching");

    match &cli.command {
        Commands::Start(args) => {
            let options = RunOptions {
                build: args.build,
                replicas: None,
            };
            lifecycle::execute(config_toml, Action::Start, &args.target, options).await
        }
        Commands::Stop(target) => {
            lifecycle::execute(config_toml, Action::Stop, target, RunOptions::default()).await
        }
        Commands::Restart(target) => {
            lifecycle::execute(config_toml, Action::Restart, target, RunOptions::default()).await
        }
        Commands::Build(target) => {
            lifecycle::execute(config_toml, Action::Build, target, RunOptions::default()).await
        }
        Commands::Pull(target) => {
            lifecycle::execute(config_toml, Action::Pull, target, RunOptions::default()).await
        }
        Commands::Update(target) => {
            lifecycle::execute(config_toml, Action::Update, target, RunOptions::default()).await
        }
        Commands::Scale(args) => {
            let options = RunOptions {
                build: false,
                replicas: Some(args.replicas),
            };
            lifecycle::execute(config_toml, Action::Scale, &args.target, options).await
        }
        Commands::Rollback(env) => {
            let target = TargetArgs {
                env: env.clone(),
                services: Vec::new(),
            };
            let options = RunOptions::default();
            lifecycle::execute(config_toml, Action::Rollback, &target, options).await
        }
        Commands::Health(args) => health::execute(config_toml, args).await,
        Commands::Backup(env) => backup::backup(config_toml, env).await,
        Commands::Restore(args) => backup::restore(config_toml, args).await,
        Commands::Snapshots(env) => backup::snapshots(&config_toml, env),
        Commands::Status(env) => status::execute(&config_toml, env).await,
        Commands::Validate(env) => validate::execute(&config_toml, env),
    }
}

fn report(err: &Error) {
    if !output::is_json() {
        if let Some(diagnostic) = ManifestDiagnostic::from_error(err) {
            eprintln!("{:?}", Report::new(diagnostic));
            return;
        }
    }
    output::error(&err.to_string());
}
