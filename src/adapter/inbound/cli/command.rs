//! Command-line interface definitions.
//!
//! Defines the CLI structure for the stackctl binary using `clap`. Every
//! stack-mutating subcommand shares [`TargetArgs`] for environment and
//! service selection.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Dependency-ordered lifecycle, health gating, backup and restore for
/// multi-service container stacks
#[derive(Parser, Debug)]
#[command(name = "stackctl")]
#[command(version)]
pub struct Cli {
    /// Path to the configuration file [default: ./stackctl.toml, then ~/.stackctl/config.toml]
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Color output mode [auto, always, never]
    #[arg(
        long,
        global = true,
        default_value = "auto",
        hide_possible_values = true
    )]
    pub color: ColorChoice,

    /// JSON output for scripting
    #[arg(long, global = true)]
    pub json: bool,

    /// Decrease output verbosity
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Increase output verbosity
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Color output mode for terminal rendering.
#[derive(Clone, Debug, Default, clap::ValueEnum)]
pub enum ColorChoice {
    /// Detect automatically
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

/// Top-level subcommands for the stackctl CLI.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start services and their dependencies, health gated
    Start(StartArgs),
    /// Stop services and everything that depends on them
    Stop(TargetArgs),
    /// Stop then start services and their dependents
    Restart(TargetArgs),
    /// Build images for services that declare a build
    Build(TargetArgs),
    /// Pull images for services without a build
    Pull(TargetArgs),
    /// Refresh images, then replace the selected services
    Update(TargetArgs),
    /// Run selected services at a new replica count
    Scale(ScaleArgs),
    /// Redeploy the last successful service set
    Rollback(EnvironmentArg),
    /// Probe services and print a pass/fail table
    Health(HealthArgs),
    /// Snapshot volumes and the database of a quiesced stack
    Backup(EnvironmentArg),
    /// Replace volumes and the database from a snapshot
    Restore(RestoreArgs),
    /// Show containers, resource usage, lock holder and last run
    Status(EnvironmentArg),
    /// List snapshots, newest first
    Snapshots(EnvironmentArg),
    /// Load and validate the manifest, then print the start order
    Validate(EnvironmentArg),
}

/// Shared argument struct for commands that only select an environment.
#[derive(Args, Debug, Clone, Default)]
pub struct EnvironmentArg {
    /// Target environment [default: from config or STACKCTL_ENVIRONMENT]
    #[arg(short, long)]
    pub environment: Option<String>,
}

/// Environment plus service selection.
#[derive(Args, Debug, Clone, Default)]
pub struct TargetArgs {
    #[command(flatten)]
    pub env: EnvironmentArg,

    /// Comma-separated service names; all services when omitted
    #[arg(short, long, value_delimiter = ',')]
    pub services: Vec<String>,
}

/// Arguments for the `start` subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct StartArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Build images for buildable services before starting
    #[arg(long)]
    pub build: bool,
}

/// Arguments for the `scale` subcommand.
#[derive(Args, Debug, Clone)]
pub struct ScaleArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Replica count for every selected service
    #[arg(long)]
    pub replicas: u32,
}

/// Arguments for the `health` subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct HealthArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Attempts per service, overriding `[health] max_attempts`
    #[arg(long)]
    pub attempts: Option<u32>,
}

/// Arguments for the `restore` subcommand.
#[derive(Args, Debug, Clone)]
pub struct RestoreArgs {
    #[command(flatten)]
    pub env: EnvironmentArg,

    /// Snapshot id as printed by `backup` or `snapshots`
    #[arg(long)]
    pub snapshot: String,

    /// Skip the confirmation prompt
    #[arg(long)]
    pub force: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_name() {
        assert_eq!(Cli::command().get_name(), "stackctl");
    }

    #[test]
    fn test_parse_global_flags() {
        let cli = Cli::try_parse_from(["stackctl", "--json", "-vv", "status"]).unwrap();
        assert!(cli.json);
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.color, ColorChoice::Auto));
        assert!(matches!(cli.command, Commands::Status(_)));
    }

    #[test]
    fn test_parse_start_with_selection() {
        let cli =
            Cli::try_parse_from(["stackctl", "start", "-e", "staging", "-s", "api,web", "--build"])
                .unwrap();
        let Commands::Start(args) = cli.command else {
            panic!("Expected Start command");
        };
        assert!(args.build);
        assert_eq!(args.target.env.environment.as_deref(), Some("staging"));
        assert_eq!(args.target.services, ["api", "web"]);
    }

    #[test]
    fn test_scale_requires_replicas() {
        assert!(Cli::try_parse_from(["stackctl", "scale", "-s", "api"]).is_err());
        let cli = Cli::try_parse_from(["stackctl", "scale", "-s", "api", "--replicas", "3"]).unwrap();
        let Commands::Scale(args) = cli.command else {
            panic!("Expected Scale command");
        };
        assert_eq!(args.replicas, 3);
    }

    #[test]
    fn test_restore_requires_snapshot() {
        assert!(Cli::try_parse_from(["stackctl", "restore"]).is_err());
        let cli =
            Cli::try_parse_from(["stackctl", "restore", "--snapshot", "20260101T000000.000Z", "--force"])
                .unwrap();
        let Commands::Restore(args) = cli.command else {
            panic!("Expected Restore command");
        };
        assert!(args.force);
    }

    #[test]
    fn test_parse_health_attempts() {
        let cli = Cli::try_parse_from(["stackctl", "health", "--attempts", "2"]).unwrap();
        let Commands::Health(args) = cli.command else {
            panic!("Expected Health command");
        };
        assert_eq!(args.attempts, Some(2));
    }

    #[test]
    fn test_config_flag_is_global() {
        let cli = Cli::try_parse_from(["stackctl", "validate", "--config", "x.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
    }
}
