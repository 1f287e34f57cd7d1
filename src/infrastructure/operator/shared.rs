//! Shared helper routines for operator implementations.

use tokio::signal;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::warn;

use crate::application::lifecycle::controller::RunOutcome;
use crate::domain::id::ServiceId;
use crate::domain::service::{Service, ServiceSet};
use crate::error::{Error, Result};
use crate::infrastructure::config::settings::Config;
use crate::port::inbound::operator::lifecycle::{RunSummary, ServiceOutcome};

/// Parsed configuration and the environment it resolves to.
pub(super) struct Session {
    pub config: Config,
    pub environment: String,
}

pub(super) fn session(config_toml: &str, environment: Option<&str>) -> Result<Session> {
    let config = Config::parse_toml(config_toml)?;
    let environment = config.environment(environment);
    Ok(Session {
        config,
        environment,
    })
}

/// Cancel `cancel` on Ctrl-C until the returned guard drops.
pub(super) fn cancel_on_interrupt(cancel: &CancellationToken) -> DropGuard {
    let done = CancellationToken::new();
    let watch = done.clone();
    let token = cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            result = signal::ctrl_c() => {
                if result.is_ok() {
                    warn!("Interrupt received; cancelling run");
                    token.cancel();
                }
            }
            () = watch.cancelled() => {}
        }
    });
    done.drop_guard()
}

/// Resolve operator-supplied names against the manifest.
pub(super) fn service_ids(set: &ServiceSet, names: &[String]) -> Result<Vec<ServiceId>> {
    names
        .iter()
        .map(|name| {
            let id = ServiceId::new(name.trim());
            if set.contains(&id) {
                Ok(id)
            } else {
                Err(Error::UnknownService(name.clone()))
            }
        })
        .collect()
}

/// Selected services in start order; all of them when `names` is empty.
pub(super) fn selected_services(set: &ServiceSet, names: &[String]) -> Result<Vec<Service>> {
    let ids = service_ids(set, names)?;
    Ok(set
        .start_order()
        .into_iter()
        .filter(|id| ids.is_empty() || ids.contains(id))
        .filter_map(|id| set.get(&id).cloned())
        .collect())
}

pub(super) fn check_kind(service: &Service) -> String {
    service
        .health
        .as_ref()
        .map_or("none", |check| check.kind())
        .to_string()
}

pub(super) fn summarize(outcome: &RunOutcome) -> RunSummary {
    let state = &outcome.state;
    let services = state
        .services
        .iter()
        .map(|(id, record)| ServiceOutcome {
            service: id.to_string(),
            phase: record.phase.as_str().to_string(),
            healthy: record.health.as_ref().map(|h| h.healthy),
            attempts: record.health.as_ref().map(|h| h.attempts),
            latency_ms: record.health.as_ref().map(|h| h.latency_ms),
            error: record.error.clone(),
        })
        .collect();

    RunSummary {
        run_id: state.run_id.to_string(),
        environment: state.environment.clone(),
        action: state.action,
        status: state.status,
        services,
        abort_reason: state.abort_reason.clone(),
        cancelled: state.cancelled,
        deadline_exceeded: state.deadline_exceeded,
        duration_ms: state.duration_ms(),
        report: outcome.report.as_ref().map(|p| p.display().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::service::HealthCheck;

    fn set() -> ServiceSet {
        ServiceSet::new(
            "acme",
            "dev",
            vec![
                Service::new("db", "postgres:16"),
                Service::new("api", "acme/api").with_dependencies(&["db"]).with_health(
                    HealthCheck::Tcp {
                        host: "127.0.0.1".into(),
                        port: 80,
                    },
                ),
            ],
            Vec::new(),
            None,
        )
        .unwrap()
    }

    #[test]
    fn unknown_names_are_rejected() {
        let err = service_ids(&set(), &["api".into(), "cache".into()]).unwrap_err();
        assert!(matches!(err, Error::UnknownService(name) if name == "cache"));
    }

    #[test]
    fn empty_selection_is_every_service_in_start_order() {
        let ids: Vec<String> = selected_services(&set(), &[])
            .unwrap()
            .into_iter()
            .map(|s| s.id.to_string())
            .collect();
        assert_eq!(ids, ["db", "api"]);
    }

    #[test]
    fn check_kind_defaults_to_none() {
        let set = set();
        assert_eq!(check_kind(set.get(&ServiceId::new("db")).unwrap()), "none");
        assert_eq!(check_kind(set.get(&ServiceId::new("api")).unwrap()), "tcp");
    }
}
