//! Manifest validation use-cases for operator-facing adapters.

use serde::Serialize;

use crate::error::Result;

/// One service as shown by `validate`.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceView {
    pub name: String,
    pub image: String,
    pub replicas: u32,
    pub depends_on: Vec<String>,
    /// Check kind or `none`.
    pub health: String,
    pub build: bool,
}

/// A successfully loaded manifest.
#[derive(Debug, Clone, Serialize)]
pub struct ManifestSummary {
    pub project: String,
    pub environment: String,
    /// Files merged to produce the service set, base first.
    pub sources: Vec<String>,
    pub start_order: Vec<String>,
    pub services: Vec<ServiceView>,
    pub volumes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
}

/// Manifest use-cases for operator-facing adapters.
pub trait ManifestOperator: Send + Sync {
    /// Load and validate the manifest for an environment.
    ///
    /// # Errors
    ///
    /// Returns a manifest error describing the first violation found.
    fn validate_manifest(
        &self,
        config_toml: &str,
        environment: Option<&str>,
    ) -> Result<ManifestSummary>;
}
