//! Manifest loading and validation.
//!
//! A manifest is a base `stack.toml` plus an optional `stack.<env>.toml`
//! overlay in the same directory. Overlay tables are merged into the base
//! field by field; scalar and array values in the overlay replace the base
//! value. The merged document is validated into a [`ServiceSet`].
//!
//! Loading is pure parse and validate: nothing is cached between runs and
//! no side effect happens before validation succeeds.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::domain::id::ServiceId;
use crate::domain::service::{
    BuildSpec, DatabaseSpec, HealthCheck, Mount, PortBinding, ProbeOverrides, Resources,
    RestartPolicy, Service, ServiceSet, VolumeSpec,
};
use crate::error::ManifestError;

/// Base manifest file name.
pub const BASE_FILE: &str = "stack.toml";

/// Overlay file name for an environment.
#[must_use]
pub fn overlay_file(environment: &str) -> String {
    format!("stack.{environment}.toml")
}

/// A manifest file as read from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestSource {
    pub path: PathBuf,
    pub contents: String,
}

impl ManifestSource {
    pub fn new(path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            contents: contents.into(),
        }
    }

    /// File name without directories, used inside snapshots.
    #[must_use]
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| BASE_FILE.to_string())
    }
}

/// A validated service set and the sources it was built from.
#[derive(Debug, Clone)]
pub struct LoadedManifest {
    pub services: ServiceSet,
    /// Base first, then the overlay when present.
    pub sources: Vec<ManifestSource>,
}

/// Reads manifests from one directory.
#[derive(Debug, Clone)]
pub struct ManifestLoader {
    dir: PathBuf,
}

impl ManifestLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load and validate the manifest for `environment`.
    pub fn load(&self, environment: &str) -> Result<LoadedManifest, ManifestError> {
        check_environment_name(environment)?;

        let base_path = self.dir.join(BASE_FILE);
        let base = read_source(&base_path)?;

        let overlay_path = self.dir.join(overlay_file(environment));
        let overlay = if overlay_path.is_file() {
            Some(read_source(&overlay_path)?)
        } else {
            debug!(environment, path = %overlay_path.display(), "No environment overlay");
            None
        };

        parse(&self.dir, environment, base, overlay)
    }
}

fn read_source(path: &Path) -> Result<ManifestSource, ManifestError> {
    let contents = fs::read_to_string(path).map_err(|source| ManifestError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(ManifestSource::new(path, contents))
}

/// Parse, merge and validate already-read sources.
///
/// Relative paths in the manifest resolve against `dir`.
pub fn parse(
    dir: &Path,
    environment: &str,
    base: ManifestSource,
    overlay: Option<ManifestSource>,
) -> Result<LoadedManifest, ManifestError> {
    check_environment_name(environment)?;

    let mut merged = parse_table(&base)?;
    if let Some(overlay) = &overlay {
        let table = parse_table(overlay)?;
        merge_tables(&mut merged, table);
    }

    let raw: RawManifest =
        toml::Value::Table(merged)
            .try_into()
            .map_err(|e: toml::de::Error| ManifestError::Invalid {
                field: "manifest".to_string(),
                reason: e.message().to_string(),
            })?;

    let services = resolve(dir, environment, raw)?;

    let mut sources = vec![base];
    sources.extend(overlay);
    Ok(LoadedManifest { services, sources })
}

/// Parse one file, both as a generic table for merging and against the
/// manifest schema so type errors point at the offending file and span.
fn parse_table(source: &ManifestSource) -> Result<toml::Table, ManifestError> {
    let to_parse_error = |e: toml::de::Error| ManifestError::Parse {
        path: source.path.clone(),
        message: e.message().to_string(),
        src: source.contents.clone(),
        span: e.span().map(|r| (r.start, r.end.saturating_sub(r.start))),
    };

    toml::from_str::<RawManifest>(&source.contents).map_err(to_parse_error)?;
    toml::from_str::<toml::Table>(&source.contents).map_err(to_parse_error)
}

/// Merge `overlay` into `base`. Tables merge recursively; anything else in
/// the overlay replaces the base value.
pub fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

fn check_environment_name(environment: &str) -> Result<(), ManifestError> {
    let valid = !environment.is_empty()
        && environment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(ManifestError::Invalid {
            field: "environment".to_string(),
            reason: format!("'{environment}' must be non-empty and use only [A-Za-z0-9_-]"),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawManifest {
    #[serde(default)]
    project: RawProject,
    #[serde(default)]
    volumes: BTreeMap<String, RawVolume>,
    #[serde(default)]
    database: Option<RawDatabase>,
    #[serde(default)]
    services: BTreeMap<String, RawService>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawProject {
    name: Option<String>,
    #[serde(default)]
    environments: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawVolume {
    path: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDatabase {
    service: Option<String>,
    #[serde(default)]
    dump: Vec<String>,
    #[serde(default)]
    restore: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawService {
    image: Option<String>,
    build: Option<RawBuild>,
    #[serde(default)]
    depends_on: Vec<String>,
    health: Option<RawHealth>,
    #[serde(default)]
    restart: RestartPolicy,
    #[serde(default = "default_replicas")]
    replicas: u32,
    #[serde(default)]
    ports: Vec<String>,
    #[serde(default)]
    env: BTreeMap<String, String>,
    #[serde(default)]
    volumes: Vec<String>,
    #[serde(default)]
    resources: Resources,
    command: Option<Vec<String>>,
    #[serde(default = "default_enabled")]
    enabled: bool,
    #[serde(default)]
    probe: ProbeOverrides,
}

fn default_replicas() -> u32 {
    1
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawBuild {
    context: Option<PathBuf>,
    dockerfile: Option<String>,
    #[serde(default)]
    args: BTreeMap<String, String>,
}

/// Exactly one of `http`, `tcp` or `exec` must be set.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawHealth {
    http: Option<String>,
    expect_status: Option<u16>,
    tcp: Option<u16>,
    host: Option<String>,
    exec: Option<Vec<String>>,
    expect_exit: Option<i32>,
}

fn invalid(field: impl Into<String>, reason: impl Into<String>) -> ManifestError {
    ManifestError::Invalid {
        field: field.into(),
        reason: reason.into(),
    }
}

fn resolve(dir: &Path, environment: &str, raw: RawManifest) -> Result<ServiceSet, ManifestError> {
    let project = raw
        .project
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| invalid("project.name", "must be set and non-empty"))?;

    if !raw.project.environments.is_empty()
        && !raw.project.environments.iter().any(|e| e == environment)
    {
        return Err(ManifestError::UnknownEnvironment {
            environment: environment.to_string(),
            known: raw.project.environments.clone(),
        });
    }

    let volumes: BTreeMap<String, VolumeSpec> = raw
        .volumes
        .into_iter()
        .map(|(name, volume)| {
            let path = volume
                .path
                .unwrap_or_else(|| PathBuf::from("volumes").join(&name));
            let host_path = dir.join(path);
            (name.clone(), VolumeSpec { name, host_path })
        })
        .collect();

    let mut services = Vec::new();
    for (name, service) in raw.services {
        if !service.enabled {
            debug!(service = %name, "Service disabled in this environment");
            continue;
        }
        services.push(resolve_service(dir, &project, &name, service, &volumes)?);
    }

    if services.is_empty() {
        return Err(invalid("services", "no enabled services declared"));
    }

    let enabled: BTreeSet<&ServiceId> = services.iter().map(|s| &s.id).collect();
    let database = match raw.database {
        Some(db) => {
            let name = db
                .service
                .ok_or_else(|| invalid("database.service", "must be set"))?;
            let id = ServiceId::new(name.clone());
            if !enabled.contains(&id) {
                return Err(invalid(
                    "database.service",
                    format!("'{name}' is not a declared, enabled service"),
                ));
            }
            if db.dump.is_empty() || db.restore.is_empty() {
                return Err(invalid(
                    "database",
                    "dump and restore commands must be non-empty",
                ));
            }
            Some(DatabaseSpec {
                service: id,
                dump: db.dump,
                restore: db.restore,
            })
        }
        None => None,
    };

    Ok(ServiceSet::new(
        project,
        environment,
        services,
        volumes.into_values(),
        database,
    )?)
}

fn resolve_service(
    dir: &Path,
    project: &str,
    name: &str,
    raw: RawService,
    volumes: &BTreeMap<String, VolumeSpec>,
) -> Result<Service, ManifestError> {
    let field = |suffix: &str| format!("services.{name}.{suffix}");

    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(invalid(
            format!("services.{name}"),
            "service names use only [A-Za-z0-9_-]",
        ));
    }

    let build = raw
        .build
        .map(|b| {
            let context = b
                .context
                .ok_or_else(|| invalid(field("build.context"), "must be set"))?;
            Ok::<_, ManifestError>(BuildSpec {
                context: dir.join(context),
                dockerfile: b.dockerfile,
                args: b.args,
            })
        })
        .transpose()?;

    let image = match (raw.image, &build) {
        (Some(image), _) if !image.trim().is_empty() => image,
        (_, Some(_)) => format!("{project}-{name}:latest"),
        _ => return Err(invalid(field("image"), "an image or a build section is required")),
    };

    if raw.replicas == 0 {
        return Err(invalid(field("replicas"), "must be at least 1"));
    }

    let health = raw
        .health
        .map(|h| resolve_health(&field("health"), h))
        .transpose()?;

    let ports = raw
        .ports
        .iter()
        .map(|binding| parse_port(binding).ok_or_else(|| invalid(field("ports"), format!("invalid binding '{binding}'"))))
        .collect::<Result<Vec<_>, _>>()?;

    let mut mounts = Vec::with_capacity(raw.volumes.len());
    for entry in &raw.volumes {
        let (volume, target, read_only) = parse_mount(entry)
            .ok_or_else(|| invalid(field("volumes"), format!("invalid mount '{entry}'")))?;
        let declared = volumes.get(volume).ok_or_else(|| ManifestError::UnknownVolume {
            service: name.to_string(),
            volume: volume.to_string(),
        })?;
        mounts.push(Mount {
            volume: volume.to_string(),
            host_path: declared.host_path.clone(),
            target: target.to_string(),
            read_only,
        });
    }

    if let Some(command) = &raw.command {
        if command.is_empty() {
            return Err(invalid(field("command"), "must not be empty when set"));
        }
    }
    if raw.probe.attempts == Some(0) {
        return Err(invalid(field("probe.attempts"), "must be at least 1"));
    }
    if raw.probe.timeout_secs == Some(0) {
        return Err(invalid(field("probe.timeout_secs"), "must be greater than 0"));
    }

    Ok(Service {
        id: ServiceId::new(name),
        image,
        build,
        depends_on: raw.depends_on.into_iter().map(ServiceId::new).collect(),
        health,
        restart: raw.restart,
        replicas: raw.replicas,
        ports,
        env: raw.env,
        mounts,
        resources: raw.resources,
        command: raw.command,
        probe: raw.probe,
    })
}

fn resolve_health(field: &str, raw: RawHealth) -> Result<HealthCheck, ManifestError> {
    match (raw.http, raw.tcp, raw.exec) {
        (Some(url), None, None) => {
            let parsed = url::Url::parse(&url)
                .map_err(|e| invalid(format!("{field}.http"), format!("'{url}': {e}")))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(invalid(
                    format!("{field}.http"),
                    format!("'{url}' must use http or https"),
                ));
            }
            Ok(HealthCheck::Http {
                url,
                expect_status: raw.expect_status.unwrap_or(200),
            })
        }
        (None, Some(port), None) => {
            if port == 0 {
                return Err(invalid(format!("{field}.tcp"), "port must be non-zero"));
            }
            Ok(HealthCheck::Tcp {
                host: raw.host.unwrap_or_else(|| "127.0.0.1".to_string()),
                port,
            })
        }
        (None, None, Some(command)) => {
            if command.is_empty() {
                return Err(invalid(format!("{field}.exec"), "command must not be empty"));
            }
            Ok(HealthCheck::Exec {
                command,
                expect_exit: raw.expect_exit.unwrap_or(0),
            })
        }
        _ => Err(invalid(field, "exactly one of http, tcp or exec must be set")),
    }
}

/// `HOST:CONTAINER` or a single port published on the same number.
fn parse_port(binding: &str) -> Option<PortBinding> {
    let (host, container) = match binding.split_once(':') {
        Some((host, container)) => (host.parse().ok()?, container.parse().ok()?),
        None => {
            let port = binding.parse().ok()?;
            (port, port)
        }
    };
    (host != 0 && container != 0).then_some(PortBinding { host, container })
}

/// `VOLUME:/target` with an optional `:ro` suffix.
fn parse_mount(entry: &str) -> Option<(&str, &str, bool)> {
    let mut parts = entry.split(':');
    let volume = parts.next().filter(|v| !v.is_empty())?;
    let target = parts.next().filter(|t| t.starts_with('/'))?;
    let read_only = match parts.next() {
        None => false,
        Some("ro") => true,
        Some("rw") => false,
        Some(_) => return None,
    };
    if parts.next().is_some() {
        return None;
    }
    Some((volume, target, read_only))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = r#"
[project]
name = "acme"
environments = ["development", "staging"]

[volumes.pgdata]
path = "data/pg"

[database]
service = "db"
dump = ["pg_dump", "app"]
restore = ["psql", "app"]

[services.db]
image = "postgres:16"
volumes = ["pgdata:/var/lib/postgresql/data"]
health = { tcp = 5432 }

[services.api]
build = { context = "api" }
depends_on = ["db"]
ports = ["8080:80"]
health = { http = "http://127.0.0.1:8080/health" }

[services.worker]
image = "acme/worker:1"
depends_on = ["db"]
enabled = false
"#;

    fn load(base: &str, overlay: Option<&str>, env: &str) -> Result<LoadedManifest, ManifestError> {
        parse(
            Path::new("/srv/acme"),
            env,
            ManifestSource::new("/srv/acme/stack.toml", base),
            overlay.map(|o| ManifestSource::new(format!("/srv/acme/stack.{env}.toml"), o)),
        )
    }

    #[test]
    fn resolves_base_manifest() {
        let loaded = load(BASE, None, "development").unwrap();
        let set = &loaded.services;
        assert_eq!(set.project, "acme");
        assert_eq!(set.len(), 2);

        let api = set.get(&ServiceId::new("api")).unwrap();
        assert_eq!(api.image, "acme-api:latest");
        assert_eq!(api.ports, vec![PortBinding { host: 8080, container: 80 }]);
        assert_eq!(
            api.build.as_ref().unwrap().context,
            PathBuf::from("/srv/acme/api")
        );

        let db = set.get(&ServiceId::new("db")).unwrap();
        assert_eq!(db.mounts[0].host_path, PathBuf::from("/srv/acme/data/pg"));
        assert_eq!(
            db.health,
            Some(HealthCheck::Tcp {
                host: "127.0.0.1".into(),
                port: 5432
            })
        );
        assert_eq!(set.database.as_ref().unwrap().service.as_str(), "db");
        assert_eq!(loaded.sources.len(), 1);
    }

    #[test]
    fn overlay_wins_field_by_field() {
        let overlay = r#"
[services.db]
replicas = 2

[services.worker]
enabled = true
"#;
        let loaded = load(BASE, Some(overlay), "staging").unwrap();
        let set = &loaded.services;
        let db = set.get(&ServiceId::new("db")).unwrap();
        assert_eq!(db.replicas, 2);
        assert_eq!(db.image, "postgres:16");
        assert!(set.contains(&ServiceId::new("worker")));
        assert_eq!(loaded.sources.len(), 2);
    }

    #[test]
    fn overlay_arrays_replace() {
        let overlay = r#"
[services.api]
ports = ["9090:80"]
"#;
        let loaded = load(BASE, Some(overlay), "staging").unwrap();
        let api = loaded.services.get(&ServiceId::new("api")).unwrap().clone();
        assert_eq!(api.ports, vec![PortBinding { host: 9090, container: 80 }]);
    }

    #[test]
    fn unknown_environment_is_rejected() {
        let err = load(BASE, None, "production").unwrap_err();
        assert!(matches!(err, ManifestError::UnknownEnvironment { .. }));
    }

    #[test]
    fn path_like_environment_names_are_rejected() {
        let err = load(BASE, None, "../etc").unwrap_err();
        assert!(matches!(err, ManifestError::Invalid { .. }));
    }

    #[test]
    fn dependency_on_disabled_service_is_unresolved() {
        let overlay = r#"
[services.api]
depends_on = ["db", "worker"]
"#;
        let err = load(BASE, Some(overlay), "staging").unwrap_err();
        match err {
            ManifestError::UnresolvedDependency { service, dependency } => {
                assert_eq!(service, "api");
                assert_eq!(dependency, "worker");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn cycles_name_the_path() {
        let overlay = r#"
[services.db]
depends_on = ["api"]
"#;
        let err = load(BASE, Some(overlay), "staging").unwrap_err();
        assert_eq!(err.to_string(), "cyclic dependency: api -> db -> api");
    }

    #[test]
    fn undeclared_volume_is_rejected() {
        let overlay = r#"
[services.api]
volumes = ["uploads:/srv/uploads"]
"#;
        let err = load(BASE, Some(overlay), "staging").unwrap_err();
        assert!(matches!(err, ManifestError::UnknownVolume { .. }));
    }

    #[test]
    fn parse_errors_carry_span() {
        let err = load("[project\nname = 1", None, "development").unwrap_err();
        match err {
            ManifestError::Parse { span, src, .. } => {
                assert!(span.is_some());
                assert!(src.starts_with("[project"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn type_errors_point_at_the_file() {
        let overlay = "[services.db]\nreplicas = \"two\"\n";
        let err = load(BASE, Some(overlay), "staging").unwrap_err();
        match err {
            ManifestError::Parse { path, .. } => {
                assert!(path.ends_with("stack.staging.toml"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn health_check_needs_exactly_one_kind() {
        let overlay = r#"
[services.db.health]
exec = ["pg_isready"]
"#;
        let err = load(BASE, Some(overlay), "staging").unwrap_err();
        assert!(matches!(err, ManifestError::Invalid { .. }));
    }

    #[test]
    fn zero_replicas_is_rejected() {
        let overlay = "[services.db]\nreplicas = 0\n";
        assert!(load(BASE, Some(overlay), "staging").is_err());
    }

    #[test]
    fn port_and_mount_syntax() {
        assert_eq!(parse_port("5432"), Some(PortBinding { host: 5432, container: 5432 }));
        assert_eq!(parse_port("0:80"), None);
        assert_eq!(parse_port("a:b"), None);
        assert_eq!(parse_mount("data:/srv:ro"), Some(("data", "/srv", true)));
        assert_eq!(parse_mount("data:relative"), None);
        assert_eq!(parse_mount("data:/srv:rx"), None);
    }

    #[test]
    fn merge_recurses_into_tables() {
        let mut base: toml::Table = toml::from_str("[a]\nx = 1\ny = [1, 2]\n").unwrap();
        let overlay: toml::Table = toml::from_str("[a]\ny = [3]\nz = true\n").unwrap();
        merge_tables(&mut base, overlay);
        let a = base["a"].as_table().unwrap();
        assert_eq!(a["x"].as_integer(), Some(1));
        assert_eq!(a["y"].as_array().unwrap().len(), 1);
        assert_eq!(a["z"].as_bool(), Some(true));
    }
}
