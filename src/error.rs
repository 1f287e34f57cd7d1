use std::path::PathBuf;

use thiserror::Error;

use crate::domain::error::DomainError;
use crate::domain::run::RunStatus;

/// Process exit codes shared by every CLI command.
pub mod exit {
    /// Success, or every probed service healthy.
    pub const SUCCESS: i32 = 0;
    /// Generic failure, including partially failed and aborted runs.
    pub const FAILURE: i32 = 1;
    /// Another run holds the environment lock.
    pub const RUN_IN_PROGRESS: i32 = 2;
    /// The manifest failed to parse or validate.
    pub const MANIFEST_INVALID: i32 = 3;
}

/// Configuration-related errors with structured variants.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("failed to read config file: {0}")]
    ReadFile(#[source] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[source] toml::de::Error),
}

/// Manifest loading and validation errors.
///
/// Every variant aborts the run before any side effect.
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("failed to read manifest {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse manifest {}: {message}", path.display())]
    Parse {
        path: PathBuf,
        message: String,
        /// Raw file contents, kept for diagnostics.
        src: String,
        /// Byte range of the offending token, when the parser reports one.
        span: Option<(usize, usize)>,
    },

    #[error("service '{service}' depends on '{dependency}', which is not a declared, enabled service")]
    UnresolvedDependency { service: String, dependency: String },

    #[error("cyclic dependency: {}", cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    #[error("service '{service}' mounts undeclared volume '{volume}'")]
    UnknownVolume { service: String, volume: String },

    #[error("environment '{environment}' is not declared (known: {})", known.join(", "))]
    UnknownEnvironment {
        environment: String,
        known: Vec<String>,
    },

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: String, reason: String },
}

impl From<DomainError> for ManifestError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::UnresolvedDependency {
                service,
                dependency,
            } => ManifestError::UnresolvedDependency {
                service,
                dependency,
            },
            DomainError::CyclicDependency { cycle } => ManifestError::CyclicDependency { cycle },
            other => ManifestError::Invalid {
                field: "services".to_string(),
                reason: other.to_string(),
            },
        }
    }
}

/// Container runtime failures.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {code:?}: {stderr}")]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("container runtime unreachable: {0}")]
    Unreachable(String),

    #[error("unexpected runtime output: {0}")]
    Output(String),
}

/// Backup and restore failures.
#[derive(Error, Debug)]
pub enum BackupError {
    #[error("stack is not quiesced: {0}")]
    NotQuiesced(String),

    #[error("snapshot '{0}' not found")]
    SnapshotNotFound(String),

    #[error("snapshot '{id}' is corrupt: {reason}")]
    Corrupt { id: String, reason: String },

    #[error("volume '{volume}' archive failed: {reason}")]
    Archive { volume: String, reason: String },

    #[error("database dump from '{service}' failed: {reason}")]
    Dump { service: String, reason: String },

    #[error("restore of snapshot '{snapshot}' incomplete at step '{step}': {reason}")]
    RestoreIncomplete {
        snapshot: String,
        step: String,
        reason: String,
    },
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Backup(#[from] BackupError),

    #[error("a run is already in progress for environment '{environment}' (holder {holder}, {purpose}, pid {pid} on {host}, since {since})")]
    RunInProgress {
        environment: String,
        holder: String,
        purpose: String,
        pid: u32,
        host: String,
        since: String,
    },

    #[error("unknown service '{0}'")]
    UnknownService(String),

    #[error("no successful deployment recorded for environment '{0}'; nothing to roll back to")]
    NoRollbackTarget(String),

    #[error("run {run_id} finished {status}")]
    RunIncomplete { run_id: String, status: RunStatus },

    #[error("{0} service(s) unhealthy")]
    Unhealthy(usize),

    #[error("operation cancelled: {0}")]
    Cancelled(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("task failed: {0}")]
    Task(String),
}

impl Error {
    /// Map this error onto the CLI exit-code contract.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::RunInProgress { .. } => exit::RUN_IN_PROGRESS,
            Error::Manifest(_) => exit::MANIFEST_INVALID,
            _ => exit::FAILURE,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<dialoguer::Error> for Error {
    fn from(err: dialoguer::Error) -> Self {
        // dialoguer::Error wraps an IO error
        Error::Io(std::io::Error::other(err.to_string()))
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Task(err.to_string())
    }
}
