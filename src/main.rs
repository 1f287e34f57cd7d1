use clap::Parser;
use tracing::info;

use stackctl::adapter::inbound::cli::command::Cli;
use stackctl::adapter::inbound::cli::{app, operator};
use stackctl::error::exit;
use stackctl::infrastructure::config::logging::LoggingConfig;
use stackctl::infrastructure::config::settings::Config;
use stackctl::infrastructure::operator::entry::Operator;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    // Exit code 2 belongs to lock contention, so usage errors exit 1.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if e.use_stderr() => {
            let _ = e.print();
            std::process::exit(exit::FAILURE);
        }
        Err(e) => e.exit(),
    };

    // Config errors are reported by the command itself; logging falls back
    // to defaults until then.
    let logging = operator::read_config_toml(cli.config.as_deref())
        .ok()
        .and_then(|toml| Config::parse_toml(&toml).ok())
        .map_or_else(LoggingConfig::default, |config| config.logging);
    logging.init(cli.verbose);

    if operator::install(Box::new(Operator)).is_err() {
        eprintln!("operator already installed");
        std::process::exit(exit::FAILURE);
    }

    info!(version = env!("CARGO_PKG_VERSION"), "stackctl starting");
    let code = app::run(cli).await;
    std::process::exit(code);
}
