//! Resolved service definitions.
//!
//! These are the validated, immutable results of loading a manifest for one
//! environment. A [`ServiceSet`] can only be built through
//! [`ServiceSet::new`], which checks that the dependency graph resolves and
//! is acyclic.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::error::DomainError;
use super::graph::{self, DependencyEdges};
use super::id::ServiceId;

/// Readiness check declared for a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HealthCheck {
    /// GET the url and compare the status code.
    Http { url: String, expect_status: u16 },
    /// Open a TCP connection.
    Tcp { host: String, port: u16 },
    /// Run a command inside the service container and compare its exit code.
    Exec {
        command: Vec<String>,
        expect_exit: i32,
    },
}

impl HealthCheck {
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Http { .. } => "http",
            Self::Tcp { .. } => "tcp",
            Self::Exec { .. } => "exec",
        }
    }
}

/// Container restart policy, passed through to the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    #[default]
    No,
    Always,
    OnFailure,
    UnlessStopped,
}

impl RestartPolicy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::No => "no",
            Self::Always => "always",
            Self::OnFailure => "on-failure",
            Self::UnlessStopped => "unless-stopped",
        }
    }
}

/// How to build a service image locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSpec {
    /// Build context, resolved against the manifest directory.
    pub context: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dockerfile: Option<String>,
    #[serde(default)]
    pub args: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortBinding {
    pub host: u16,
    pub container: u16,
}

/// A named volume mounted into a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mount {
    pub volume: String,
    /// Host directory backing the volume.
    pub host_path: PathBuf,
    /// Mount point inside the container.
    pub target: String,
    #[serde(default)]
    pub read_only: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Resources {
    /// Memory limit in runtime syntax, e.g. `512m`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpus: Option<f64>,
}

/// Per-service overrides of the configured probe budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProbeOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
}

/// One deployable service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub id: ServiceId,
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildSpec>,
    #[serde(default)]
    pub depends_on: Vec<ServiceId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<HealthCheck>,
    #[serde(default)]
    pub restart: RestartPolicy,
    pub replicas: u32,
    #[serde(default)]
    pub ports: Vec<PortBinding>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub mounts: Vec<Mount>,
    #[serde(default)]
    pub resources: Resources,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
    #[serde(default)]
    pub probe: ProbeOverrides,
}

impl Service {
    /// A minimal service with one replica and no check.
    pub fn new(id: impl Into<ServiceId>, image: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            image: image.into(),
            build: None,
            depends_on: Vec::new(),
            health: None,
            restart: RestartPolicy::default(),
            replicas: 1,
            ports: Vec::new(),
            env: BTreeMap::new(),
            mounts: Vec::new(),
            resources: Resources::default(),
            command: None,
            probe: ProbeOverrides::default(),
        }
    }

    #[must_use]
    pub fn with_dependencies(mut self, deps: &[&str]) -> Self {
        self.depends_on = deps.iter().map(|d| ServiceId::new(*d)).collect();
        self
    }

    #[must_use]
    pub fn with_health(mut self, check: HealthCheck) -> Self {
        self.health = Some(check);
        self
    }

    #[must_use]
    pub fn is_buildable(&self) -> bool {
        self.build.is_some()
    }
}

/// A named volume and the host directory that backs it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeSpec {
    pub name: String,
    pub host_path: PathBuf,
}

/// The relational store and its native dump/restore commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSpec {
    pub service: ServiceId,
    /// Writes a dump to stdout when run inside the service container.
    pub dump: Vec<String>,
    /// Reads a dump from stdin when run inside the service container.
    pub restore: Vec<String>,
}

/// Validated services for one project and environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceSet {
    pub project: String,
    pub environment: String,
    pub services: BTreeMap<ServiceId, Service>,
    #[serde(default)]
    pub volumes: BTreeMap<String, VolumeSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<DatabaseSpec>,
}

impl ServiceSet {
    /// Build a set, rejecting unresolved or cyclic dependencies.
    pub fn new(
        project: impl Into<String>,
        environment: impl Into<String>,
        services: impl IntoIterator<Item = Service>,
        volumes: impl IntoIterator<Item = VolumeSpec>,
        database: Option<DatabaseSpec>,
    ) -> Result<Self, DomainError> {
        let set = Self {
            project: project.into(),
            environment: environment.into(),
            services: services.into_iter().map(|s| (s.id.clone(), s)).collect(),
            volumes: volumes.into_iter().map(|v| (v.name.clone(), v)).collect(),
            database,
        };
        set.validate()?;
        Ok(set)
    }

    /// Re-check graph invariants, e.g. after deserializing a stored set.
    pub fn validate(&self) -> Result<(), DomainError> {
        graph::validate(&self.edges())
    }

    #[must_use]
    pub fn edges(&self) -> DependencyEdges {
        self.services
            .iter()
            .map(|(id, s)| (id.clone(), s.depends_on.clone()))
            .collect()
    }

    #[must_use]
    pub fn get(&self, id: &ServiceId) -> Option<&Service> {
        self.services.get(id)
    }

    #[must_use]
    pub fn contains(&self, id: &ServiceId) -> bool {
        self.services.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &ServiceId> {
        self.services.keys()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.services.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Dependencies-first order, ties broken by name.
    #[must_use]
    pub fn start_order(&self) -> Vec<ServiceId> {
        graph::topological_order(&self.edges())
    }

    /// Dependents-first order.
    #[must_use]
    pub fn stop_order(&self) -> Vec<ServiceId> {
        let mut order = self.start_order();
        order.reverse();
        order
    }

    /// `seeds` plus every service they transitively depend on.
    #[must_use]
    pub fn dependency_closure(&self, seeds: &BTreeSet<ServiceId>) -> BTreeSet<ServiceId> {
        graph::closure(&self.edges(), seeds)
    }

    /// `seeds` plus every service that transitively depends on them.
    #[must_use]
    pub fn dependent_closure(&self, seeds: &BTreeSet<ServiceId>) -> BTreeSet<ServiceId> {
        graph::closure(&graph::reverse(&self.edges()), seeds)
    }

    /// Direct dependencies of `id` that are also in `within`.
    pub fn dependencies_within<'a>(
        &'a self,
        id: &ServiceId,
        within: &'a BTreeSet<ServiceId>,
    ) -> impl Iterator<Item = &'a ServiceId> {
        self.services
            .get(id)
            .into_iter()
            .flat_map(|s| s.depends_on.iter())
            .filter(move |dep| within.contains(*dep))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack() -> ServiceSet {
        ServiceSet::new(
            "acme",
            "dev",
            vec![
                Service::new("db", "postgres:16"),
                Service::new("cache", "redis:7"),
                Service::new("api", "acme/api").with_dependencies(&["db", "cache"]),
                Service::new("web", "acme/web").with_dependencies(&["api"]),
                Service::new("docs", "acme/docs"),
            ],
            Vec::new(),
            None,
        )
        .unwrap()
    }

    fn set(names: &[&str]) -> BTreeSet<ServiceId> {
        names.iter().map(|n| ServiceId::new(*n)).collect()
    }

    fn names(ids: impl IntoIterator<Item = ServiceId>) -> Vec<String> {
        ids.into_iter().map(|id| id.to_string()).collect()
    }

    #[test]
    fn new_rejects_cycles() {
        let err = ServiceSet::new(
            "acme",
            "dev",
            vec![
                Service::new("a", "img").with_dependencies(&["b"]),
                Service::new("b", "img").with_dependencies(&["a"]),
            ],
            Vec::new(),
            None,
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "cyclic dependency: a -> b -> a");
    }

    #[test]
    fn start_and_stop_orders_mirror_each_other() {
        let stack = stack();
        assert_eq!(
            names(stack.start_order()),
            vec!["cache", "db", "api", "docs", "web"]
        );
        assert_eq!(
            names(stack.stop_order()),
            vec!["web", "docs", "api", "db", "cache"]
        );
    }

    #[test]
    fn closures_follow_direction() {
        let stack = stack();
        assert_eq!(
            names(stack.dependency_closure(&set(&["api"]))),
            vec!["api", "cache", "db"]
        );
        assert_eq!(
            names(stack.dependent_closure(&set(&["db"]))),
            vec!["api", "db", "web"]
        );
    }

    #[test]
    fn dependencies_within_filters_by_targets() {
        let stack = stack();
        let targets = set(&["api", "db"]);
        let deps: Vec<_> = stack
            .dependencies_within(&ServiceId::new("api"), &targets)
            .map(ServiceId::as_str)
            .collect();
        assert_eq!(deps, vec!["db"]);
    }

    #[test]
    fn health_check_serializes_with_kind_tag() {
        let check = HealthCheck::Tcp {
            host: "127.0.0.1".into(),
            port: 5432,
        };
        let json = serde_json::to_value(&check).unwrap();
        assert_eq!(json["kind"], "tcp");
        assert_eq!(check.kind(), "tcp");
    }
}
