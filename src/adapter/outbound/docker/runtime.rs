//! [`ContainerRuntime`] backed by a docker-compatible CLI.
//!
//! Containers are named `<project>-<service>-<replica>` and labelled with
//! the project, service and replica index so they can be found again
//! without any local bookkeeping. Only the first replica publishes ports.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::dto::{self, PsLine, StatsLine, PROJECT_LABEL, REPLICA_LABEL, SERVICE_LABEL};
use crate::domain::id::ServiceId;
use crate::domain::service::Service;
use crate::error::RuntimeError;
use crate::port::outbound::runtime::{
    ContainerRuntime, ContainerStatus, ContainerUsage, ExecOutput,
};

/// Raw result of one CLI invocation.
struct Invocation {
    code: Option<i32>,
    stdout: Vec<u8>,
    stderr: String,
}

impl Invocation {
    fn success(&self) -> bool {
        self.code == Some(0)
    }

    fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }
}

/// Drives containers through `docker` (or `podman`) subprocesses.
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
    stop_timeout_secs: u64,
}

impl DockerCli {
    pub fn new(binary: impl Into<String>, stop_timeout_secs: u64) -> Self {
        Self {
            binary: binary.into(),
            stop_timeout_secs,
        }
    }

    #[must_use]
    pub fn container_name(project: &str, service: &ServiceId, replica: u32) -> String {
        format!("{project}-{service}-{replica}")
    }

    async fn invoke(
        &self,
        args: &[String],
        stdin: Option<Vec<u8>>,
    ) -> Result<Invocation, RuntimeError> {
        debug!(binary = %self.binary, args = ?args, "Invoking runtime");
        let mut command = Command::new(&self.binary);
        command
            .args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|source| RuntimeError::Spawn {
            program: self.binary.clone(),
            source,
        })?;

        // Feed stdin while stdout is drained.
        let writer = match (stdin, child.stdin.take()) {
            (Some(bytes), Some(mut pipe)) => Some(tokio::spawn(async move {
                let written = pipe.write_all(&bytes).await;
                drop(pipe);
                written
            })),
            _ => None,
        };

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| RuntimeError::Output(e.to_string()))?;

        if let Some(writer) = writer {
            match writer.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                Ok(Err(e)) => return Err(RuntimeError::Output(format!("writing stdin: {e}"))),
                Err(e) => return Err(RuntimeError::Output(e.to_string())),
            }
        }

        Ok(Invocation {
            code: output.status.code(),
            stdout: output.stdout,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }

    /// Invoke and require a zero exit status.
    async fn checked(&self, args: Vec<String>) -> Result<Invocation, RuntimeError> {
        let invocation = self.invoke(&args, None).await?;
        if invocation.success() {
            Ok(invocation)
        } else {
            Err(RuntimeError::CommandFailed {
                command: format!("{} {}", self.binary, args.join(" ")),
                code: invocation.code,
                stderr: invocation.stderr,
            })
        }
    }

    async fn ps(&self, filters: &[String]) -> Result<Vec<PsLine>, RuntimeError> {
        let mut args = vec!["ps".to_string(), "-a".to_string()];
        for filter in filters {
            args.push("--filter".to_string());
            args.push(format!("label={filter}"));
        }
        args.push("--format".to_string());
        args.push("{{json .}}".to_string());
        let invocation = self.checked(args).await?;
        dto::parse_lines(&invocation.stdout_text()).map_err(|e| RuntimeError::Output(e.to_string()))
    }

    async fn service_containers(
        &self,
        project: &str,
        service: &ServiceId,
    ) -> Result<Vec<PsLine>, RuntimeError> {
        self.ps(&[
            format!("{PROJECT_LABEL}={project}"),
            format!("{SERVICE_LABEL}={service}"),
        ])
        .await
    }

    fn run_args(&self, project: &str, service: &Service, replica: u32) -> Result<Vec<String>, RuntimeError> {
        let name = Self::container_name(project, &service.id, replica);
        let mut args = vec![
            "run".to_string(),
            "-d".to_string(),
            "--name".to_string(),
            name,
            "--label".to_string(),
            format!("{PROJECT_LABEL}={project}"),
            "--label".to_string(),
            format!("{SERVICE_LABEL}={}", service.id),
            "--label".to_string(),
            format!("{REPLICA_LABEL}={replica}"),
            "--restart".to_string(),
            service.restart.as_str().to_string(),
        ];
        for (key, value) in &service.env {
            args.push("-e".to_string());
            args.push(format!("{key}={value}"));
        }
        for mount in &service.mounts {
            let host = absolute(&mount.host_path)?;
            std::fs::create_dir_all(&host).map_err(|e| {
                RuntimeError::Output(format!("creating {}: {e}", host.display()))
            })?;
            let mut mount_arg = format!("{}:{}", host.display(), mount.target);
            if mount.read_only {
                mount_arg.push_str(":ro");
            }
            args.push("-v".to_string());
            args.push(mount_arg);
        }
        if replica == 1 {
            for port in &service.ports {
                args.push("-p".to_string());
                args.push(format!("{}:{}", port.host, port.container));
            }
        }
        if let Some(memory) = &service.resources.memory {
            args.push("--memory".to_string());
            args.push(memory.clone());
        }
        if let Some(cpus) = service.resources.cpus {
            args.push("--cpus".to_string());
            args.push(cpus.to_string());
        }
        args.push(service.image.clone());
        if let Some(command) = &service.command {
            args.extend(command.iter().cloned());
        }
        Ok(args)
    }

    async fn remove(&self, name: &str) -> Result<(), RuntimeError> {
        self.checked(vec![
            "stop".to_string(),
            "-t".to_string(),
            self.stop_timeout_secs.to_string(),
            name.to_string(),
        ])
        .await?;
        self.checked(vec!["rm".to_string(), "-f".to_string(), name.to_string()])
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn ping(&self) -> Result<(), RuntimeError> {
        let args = vec![
            "version".to_string(),
            "--format".to_string(),
            "{{.Server.Version}}".to_string(),
        ];
        let invocation = self.invoke(&args, None).await.map_err(|e| RuntimeError::Unreachable(e.to_string()))?;
        if invocation.success() {
            debug!(version = %invocation.stdout_text().trim(), "Runtime reachable");
            Ok(())
        } else {
            Err(RuntimeError::Unreachable(invocation.stderr))
        }
    }

    async fn build(&self, _project: &str, service: &Service) -> Result<(), RuntimeError> {
        let Some(build) = &service.build else {
            return Err(RuntimeError::Output(format!(
                "service '{}' declares no build",
                service.id
            )));
        };
        let mut args = vec!["build".to_string(), "-t".to_string(), service.image.clone()];
        if let Some(dockerfile) = &build.dockerfile {
            args.push("-f".to_string());
            args.push(build.context.join(dockerfile).display().to_string());
        }
        for (key, value) in &build.args {
            args.push("--build-arg".to_string());
            args.push(format!("{key}={value}"));
        }
        args.push(build.context.display().to_string());
        self.checked(args).await?;
        info!(service = %service.id, image = %service.image, "Image built");
        Ok(())
    }

    async fn pull(&self, _project: &str, service: &Service) -> Result<(), RuntimeError> {
        self.checked(vec!["pull".to_string(), service.image.clone()])
            .await?;
        info!(service = %service.id, image = %service.image, "Image pulled");
        Ok(())
    }

    async fn start(&self, project: &str, service: &Service) -> Result<(), RuntimeError> {
        let existing = self.service_containers(project, &service.id).await?;
        let wanted = service.replicas.max(1);

        for line in &existing {
            if line.replica().map_or(true, |r| r > wanted) {
                info!(service = %service.id, container = line.name(), "Removing surplus replica");
                self.remove(line.name()).await?;
            }
        }

        for replica in 1..=wanted {
            let name = Self::container_name(project, &service.id, replica);
            match existing.iter().find(|line| line.name() == name) {
                Some(line) if line.running() => {
                    debug!(container = %name, "Already running");
                }
                Some(_) => {
                    self.checked(vec!["start".to_string(), name.clone()])
                        .await?;
                    debug!(container = %name, "Container restarted");
                }
                None => {
                    self.checked(self.run_args(project, service, replica)?)
                        .await?;
                    debug!(container = %name, "Container created");
                }
            }
        }
        Ok(())
    }

    async fn stop(&self, project: &str, service: &ServiceId) -> Result<(), RuntimeError> {
        for line in self.service_containers(project, service).await? {
            self.remove(line.name()).await?;
            debug!(container = line.name(), "Container removed");
        }
        Ok(())
    }

    async fn exec(
        &self,
        project: &str,
        service: &ServiceId,
        command: &[String],
        stdin: Option<Vec<u8>>,
    ) -> Result<ExecOutput, RuntimeError> {
        let mut running: Vec<PsLine> = self
            .service_containers(project, service)
            .await?
            .into_iter()
            .filter(PsLine::running)
            .collect();
        running.sort_by_key(|line| line.replica().unwrap_or(u32::MAX));
        let Some(target) = running.first() else {
            return Err(RuntimeError::Output(format!(
                "service '{service}' has no running container"
            )));
        };

        let mut args = vec!["exec".to_string()];
        if stdin.is_some() {
            args.push("-i".to_string());
        }
        args.push(target.name().to_string());
        args.extend(command.iter().cloned());

        let invocation = self.invoke(&args, stdin).await?;
        Ok(ExecOutput {
            exit_code: invocation.code.unwrap_or(-1),
            stdout: invocation.stdout,
            stderr: invocation.stderr,
        })
    }

    async fn list(&self, project: &str) -> Result<Vec<ContainerStatus>, RuntimeError> {
        let mut containers: Vec<ContainerStatus> = self
            .ps(&[format!("{PROJECT_LABEL}={project}")])
            .await?
            .into_iter()
            .filter_map(|line| {
                let service = line.label(SERVICE_LABEL)?.to_string();
                Some(ContainerStatus {
                    service: ServiceId::new(service),
                    container: line.name().to_string(),
                    running: line.running(),
                    state: line.describe(),
                })
            })
            .collect();
        containers.sort_by(|a, b| a.container.cmp(&b.container));
        Ok(containers)
    }

    async fn usage(&self, project: &str) -> Result<Vec<ContainerUsage>, RuntimeError> {
        let names: Vec<String> = self
            .list(project)
            .await?
            .into_iter()
            .filter(|c| c.running)
            .map(|c| c.container)
            .collect();
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let mut args = vec![
            "stats".to_string(),
            "--no-stream".to_string(),
            "--format".to_string(),
            "{{json .}}".to_string(),
        ];
        args.extend(names);
        let invocation = self.checked(args).await?;
        let lines: Vec<StatsLine> = dto::parse_lines(&invocation.stdout_text())
            .map_err(|e| RuntimeError::Output(e.to_string()))?;
        Ok(lines.iter().map(StatsLine::to_usage).collect())
    }
}

fn absolute(path: &Path) -> Result<PathBuf, RuntimeError> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    match std::env::current_dir() {
        Ok(cwd) => Ok(cwd.join(path)),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Cannot resolve working directory");
            Err(RuntimeError::Output(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::service::{Mount, PortBinding};

    fn api() -> Service {
        let mut service = Service::new("api", "acme/api:1");
        service.ports = vec![PortBinding {
            host: 8080,
            container: 80,
        }];
        service.env.insert("MODE".into(), "prod".into());
        service.command = Some(vec!["serve".into(), "--fast".into()]);
        service
    }

    #[test]
    fn names_containers_by_project_service_and_replica() {
        assert_eq!(
            DockerCli::container_name("acme", &ServiceId::new("api"), 2),
            "acme-api-2"
        );
    }

    #[test]
    fn only_first_replica_publishes_ports() {
        let cli = DockerCli::new("docker", 10);
        let first = cli.run_args("acme", &api(), 1).unwrap();
        let second = cli.run_args("acme", &api(), 2).unwrap();
        assert!(first.windows(2).any(|w| w[0] == "-p" && w[1] == "8080:80"));
        assert!(!second.iter().any(|a| a == "-p"));
    }

    #[test]
    fn run_args_end_with_image_and_command() {
        let cli = DockerCli::new("docker", 10);
        let args = cli.run_args("acme", &api(), 1).unwrap();
        assert_eq!(&args[args.len() - 3..], ["acme/api:1", "serve", "--fast"]);
        assert!(args.contains(&"MODE=prod".to_string()));
        assert!(args.contains(&"stackctl.service=api".to_string()));
    }

    #[test]
    fn mounts_use_absolute_host_paths() {
        let dir = tempfile::tempdir().unwrap();
        let mut service = Service::new("db", "postgres:16");
        service.mounts = vec![Mount {
            volume: "pgdata".into(),
            host_path: dir.path().join("pgdata"),
            target: "/var/lib/postgresql/data".into(),
            read_only: true,
        }];
        let args = DockerCli::new("docker", 10).run_args("acme", &service, 1).unwrap();
        let expected = format!("{}:/var/lib/postgresql/data:ro", dir.path().join("pgdata").display());
        assert!(args.contains(&expected));
        assert!(dir.path().join("pgdata").is_dir());
    }

    #[tokio::test]
    async fn missing_binary_is_unreachable() {
        let cli = DockerCli::new("stackctl-no-such-runtime", 1);
        assert!(matches!(cli.ping().await, Err(RuntimeError::Unreachable(_))));
    }
}
