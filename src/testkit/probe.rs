//! Scripted [`ReadinessCheck`] for prober and controller tests.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::domain::id::ServiceId;
use crate::domain::service::HealthCheck;
use crate::port::outbound::probe::{ProbeOutcome, ReadinessCheck};

#[derive(Debug, Clone)]
enum Behaviour {
    /// Pop outcomes in order; the last one repeats once the script runs dry.
    Script(VecDeque<ProbeOutcome>),
    Always(ProbeOutcome),
    /// Never answer.
    Hang,
}

/// A readiness check whose answers are scripted per service.
///
/// Services without a script are ready on the first attempt.
#[derive(Debug, Default)]
pub struct ScriptedCheck {
    behaviours: Mutex<HashMap<ServiceId, Behaviour>>,
    calls: Mutex<HashMap<ServiceId, u32>>,
}

impl ScriptedCheck {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, service: impl Into<ServiceId>, outcomes: Vec<ProbeOutcome>) {
        self.behaviours
            .lock()
            .insert(service.into(), Behaviour::Script(outcomes.into()));
    }

    pub fn always(&self, service: impl Into<ServiceId>, outcome: ProbeOutcome) {
        self.behaviours
            .lock()
            .insert(service.into(), Behaviour::Always(outcome));
    }

    pub fn hang(&self, service: impl Into<ServiceId>) {
        self.behaviours.lock().insert(service.into(), Behaviour::Hang);
    }

    /// Number of attempts made against `service`.
    pub fn calls(&self, service: &ServiceId) -> u32 {
        self.calls.lock().get(service).copied().unwrap_or(0)
    }

    fn next(&self, service: &ServiceId) -> Option<ProbeOutcome> {
        *self.calls.lock().entry(service.clone()).or_insert(0) += 1;

        let mut behaviours = self.behaviours.lock();
        match behaviours.get_mut(service) {
            None => Some(ProbeOutcome::Ready),
            Some(Behaviour::Always(outcome)) => Some(outcome.clone()),
            Some(Behaviour::Hang) => None,
            Some(Behaviour::Script(queue)) => {
                if queue.len() > 1 {
                    queue.pop_front()
                } else {
                    Some(queue.front().cloned().unwrap_or(ProbeOutcome::Ready))
                }
            }
        }
    }
}

#[async_trait]
impl ReadinessCheck for ScriptedCheck {
    async fn check(&self, _project: &str, service: &ServiceId, _check: &HealthCheck) -> ProbeOutcome {
        match self.next(service) {
            Some(outcome) => outcome,
            None => std::future::pending().await,
        }
    }
}
