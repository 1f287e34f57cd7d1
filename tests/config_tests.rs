use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use stackctl::error::{ConfigError, Error};
use stackctl::infrastructure::config::settings::Config;

static TEMP_COUNTER: AtomicUsize = AtomicUsize::new(0);

fn write_temp_config(contents: &str) -> PathBuf {
    let mut path = std::env::temp_dir();
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let suffix = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    path.push(format!("stackctl-config-test-{nanos}-{suffix}.toml"));
    fs::write(&path, contents).expect("write temp config");
    path
}

fn load(toml: &str) -> stackctl::error::Result<Config> {
    let path = write_temp_config(toml);
    let result = Config::load(&path);
    let _ = fs::remove_file(&path);
    result
}

#[test]
fn config_loads_every_section() {
    let config = load(
        r#"
[project]
manifest_dir = "deploy"
state_dir = "/var/lib/stackctl"
default_environment = "staging"

[logging]
level = "warn"
format = "json"

[runtime]
binary = "podman"
stop_timeout_secs = 30

[health]
base_interval_ms = 250
multiplier = 1.5
max_interval_ms = 4000
max_attempts = 20
timeout_secs = 90

[run]
timeout_secs = 900

[reports]
keep = 50
retention_days = 14

[backup]
keep = 3
"#,
    )
    .unwrap();

    assert_eq!(config.project.default_environment, "staging");
    assert_eq!(config.logging.format, "json");
    assert_eq!(config.runtime.stop_timeout_secs, 30);
    assert_eq!(config.health.budget().max_attempts, 20);
    assert_eq!(config.reports.policy().keep, 50);
    assert_eq!(config.backup.keep, 3);
}

#[test]
fn config_rejects_zero_attempts() {
    match load("[health]\nmax_attempts = 0\n") {
        Err(Error::Config(ConfigError::InvalidValue {
            field: "max_attempts",
            ..
        })) => {}
        Err(err) => panic!("Expected invalid attempts error, got {err}"),
        Ok(config) => panic!(
            "Expected zero attempts to be rejected, got {}",
            config.health.max_attempts
        ),
    }
}

#[test]
fn config_rejects_empty_runtime_binary() {
    assert!(
        matches!(
            load("[runtime]\nbinary = \"  \"\n"),
            Err(Error::Config(ConfigError::MissingField { field: "binary" }))
        ),
        "Expected empty runtime binary to be rejected"
    );
}

#[test]
fn config_rejects_shrinking_backoff() {
    match load("[health]\nmultiplier = 0.5\n") {
        Err(Error::Config(ConfigError::InvalidValue {
            field: "multiplier",
            ..
        })) => {}
        Err(err) => panic!("Expected invalid multiplier error, got {err}"),
        Ok(_) => panic!("Expected shrinking backoff to be rejected"),
    }
}

#[test]
fn config_rejects_zero_retention_counts() {
    assert!(matches!(
        load("[reports]\nkeep = 0\n"),
        Err(Error::Config(ConfigError::InvalidValue {
            field: "reports.keep",
            ..
        }))
    ));
    assert!(matches!(
        load("[backup]\nkeep = 0\n"),
        Err(Error::Config(ConfigError::InvalidValue {
            field: "backup.keep",
            ..
        }))
    ));
}

#[test]
fn config_rejects_zero_run_timeout() {
    assert!(matches!(
        load("[run]\ntimeout_secs = 0\n"),
        Err(Error::Config(ConfigError::InvalidValue {
            field: "run.timeout_secs",
            ..
        }))
    ));
}

#[test]
fn missing_config_file_is_a_read_error() {
    let result = Config::load("/nonexistent/stackctl.toml");
    assert!(matches!(
        result,
        Err(Error::Config(ConfigError::ReadFile(_)))
    ));
}
