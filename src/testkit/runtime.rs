//! In-memory [`ContainerRuntime`] for controller, backup and operator tests.
//!
//! Tracks running replicas per service, records every call in order, and
//! simulates a relational store whose `dump`/`restore` commands serialize a
//! list of rows as newline-separated text.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::domain::id::ServiceId;
use crate::domain::service::Service;
use crate::error::RuntimeError;
use crate::port::outbound::runtime::{ContainerRuntime, ContainerStatus, ContainerUsage, ExecOutput};

/// A recorded runtime call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCall {
    Ping,
    Build(ServiceId),
    Pull(ServiceId),
    Start(ServiceId, u32),
    Stop(ServiceId),
    Exec(ServiceId, Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Build,
    Pull,
    Start,
    Stop,
    Exec,
}

#[derive(Debug, Default)]
struct State {
    calls: Vec<RuntimeCall>,
    running: BTreeMap<ServiceId, u32>,
    failures: HashSet<(Op, ServiceId)>,
    delays: HashMap<(Op, ServiceId), Duration>,
    unreachable: bool,
    rows: Vec<String>,
}

/// Fake container runtime.
#[derive(Debug, Default)]
pub struct FakeRuntime {
    state: Mutex<State>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `op` against `service` fail.
    pub fn fail(&self, op: Op, service: impl Into<ServiceId>) {
        self.state.lock().failures.insert((op, service.into()));
    }

    /// Clear an injected failure.
    pub fn heal(&self, op: Op, service: impl Into<ServiceId>) {
        self.state.lock().failures.remove(&(op, service.into()));
    }

    /// Delay every `op` against `service`.
    pub fn delay(&self, op: Op, service: impl Into<ServiceId>, by: Duration) {
        self.state.lock().delays.insert((op, service.into()), by);
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().unreachable = unreachable;
    }

    /// Pretend `service` already runs `replicas` containers.
    pub fn set_running(&self, service: impl Into<ServiceId>, replicas: u32) {
        let mut state = self.state.lock();
        let service = service.into();
        if replicas == 0 {
            state.running.remove(&service);
        } else {
            state.running.insert(service, replicas);
        }
    }

    pub fn running(&self, service: &ServiceId) -> u32 {
        self.state.lock().running.get(service).copied().unwrap_or(0)
    }

    pub fn any_running(&self) -> bool {
        !self.state.lock().running.is_empty()
    }

    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.state.lock().calls.clone()
    }

    /// Services started, in call order.
    pub fn started(&self) -> Vec<ServiceId> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                RuntimeCall::Start(id, _) => Some(id),
                _ => None,
            })
            .collect()
    }

    /// Services stopped, in call order.
    pub fn stopped(&self) -> Vec<ServiceId> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                RuntimeCall::Stop(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    /// Calls other than `ping`.
    pub fn mutating_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| !matches!(call, RuntimeCall::Ping))
            .count()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn set_database_rows(&self, rows: Vec<String>) {
        self.state.lock().rows = rows;
    }

    pub fn database_rows(&self) -> Vec<String> {
        self.state.lock().rows.clone()
    }

    async fn enter(&self, op: Op, service: &ServiceId, call: RuntimeCall) -> Result<(), RuntimeError> {
        let delay = {
            let mut state = self.state.lock();
            state.calls.push(call);
            state.delays.get(&(op, service.clone())).copied()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.state.lock().failures.contains(&(op, service.clone())) {
            return Err(RuntimeError::CommandFailed {
                command: format!("{op:?} {service}").to_lowercase(),
                code: Some(1),
                stderr: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn ping(&self) -> Result<(), RuntimeError> {
        let mut state = self.state.lock();
        state.calls.push(RuntimeCall::Ping);
        if state.unreachable {
            return Err(RuntimeError::Unreachable("fake runtime is down".to_string()));
        }
        Ok(())
    }

    async fn build(&self, _project: &str, service: &Service) -> Result<(), RuntimeError> {
        self.enter(Op::Build, &service.id, RuntimeCall::Build(service.id.clone()))
            .await
    }

    async fn pull(&self, _project: &str, service: &Service) -> Result<(), RuntimeError> {
        self.enter(Op::Pull, &service.id, RuntimeCall::Pull(service.id.clone()))
            .await
    }

    async fn start(&self, _project: &str, service: &Service) -> Result<(), RuntimeError> {
        self.enter(
            Op::Start,
            &service.id,
            RuntimeCall::Start(service.id.clone(), service.replicas),
        )
        .await?;
        self.state
            .lock()
            .running
            .insert(service.id.clone(), service.replicas);
        Ok(())
    }

    async fn stop(&self, _project: &str, service: &ServiceId) -> Result<(), RuntimeError> {
        self.enter(Op::Stop, service, RuntimeCall::Stop(service.clone()))
            .await?;
        self.state.lock().running.remove(service);
        Ok(())
    }

    async fn exec(
        &self,
        _project: &str,
        service: &ServiceId,
        command: &[String],
        stdin: Option<Vec<u8>>,
    ) -> Result<ExecOutput, RuntimeError> {
        self.enter(
            Op::Exec,
            service,
            RuntimeCall::Exec(service.clone(), command.to_vec()),
        )
        .await?;

        let mut state = self.state.lock();
        if !state.running.contains_key(service) {
            return Err(RuntimeError::CommandFailed {
                command: command.join(" "),
                code: None,
                stderr: format!("service '{service}' is not running"),
            });
        }

        let program = command.first().map(String::as_str).unwrap_or_default();
        let stdout = if program.ends_with("dump") {
            state.rows.join("\n").into_bytes()
        } else if program.ends_with("restore") {
            let input = String::from_utf8_lossy(&stdin.unwrap_or_default()).into_owned();
            state.rows = input
                .lines()
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect();
            Vec::new()
        } else {
            Vec::new()
        };

        Ok(ExecOutput {
            exit_code: 0,
            stdout,
            stderr: String::new(),
        })
    }

    async fn list(&self, project: &str) -> Result<Vec<ContainerStatus>, RuntimeError> {
        let state = self.state.lock();
        if state.unreachable {
            return Err(RuntimeError::Unreachable("fake runtime is down".to_string()));
        }
        Ok(state
            .running
            .iter()
            .flat_map(|(service, replicas)| {
                (1..=*replicas).map(move |n| ContainerStatus {
                    service: service.clone(),
                    container: format!("{project}-{service}-{n}"),
                    running: true,
                    state: "running".to_string(),
                })
            })
            .collect())
    }

    async fn usage(&self, project: &str) -> Result<Vec<ContainerUsage>, RuntimeError> {
        Ok(self
            .list(project)
            .await?
            .into_iter()
            .map(|c| ContainerUsage {
                container: c.container,
                cpu_percent: 1.5,
                memory_bytes: 64 * 1024 * 1024,
            })
            .collect())
    }
}
