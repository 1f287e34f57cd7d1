//! Inbound operator accessor for CLI handlers.

use std::path::Path;
use std::sync::OnceLock;

use crate::error::{Error, Result};
use crate::port::inbound::operator::port::OperatorPort;

use super::paths;

static OPERATOR: OnceLock<Box<dyn OperatorPort>> = OnceLock::new();

/// Installs the operator implementation used by CLI handlers.
pub fn install(operator: Box<dyn OperatorPort>) -> std::result::Result<(), Box<dyn OperatorPort>> {
    OPERATOR.set(operator)
}

/// Returns the configured operator capability surface for CLI handlers.
///
/// # Errors
///
/// Fails when `main` has not installed an operator.
pub fn operator() -> Result<&'static dyn OperatorPort> {
    OPERATOR
        .get()
        .map(AsRef::as_ref)
        .ok_or_else(|| Error::Task("CLI operator not installed; call cli::operator::install from main".into()))
}

/// Load config TOML for operator-facing use-cases.
///
/// An explicit path must exist. Without one, the first default location
/// that exists is read; with none, the empty document selects defaults.
pub fn read_config_toml(explicit: Option<&Path>) -> Result<String> {
    match paths::resolve_config(explicit) {
        Some(path) => Ok(std::fs::read_to_string(path)?),
        None => Ok(String::new()),
    }
}
