//! Target selection: which services an action touches, and in which passes.

use std::collections::BTreeSet;

use crate::domain::id::ServiceId;
use crate::domain::run::Action;
use crate::domain::service::ServiceSet;

/// What a pass does to each of its targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassKind {
    /// Build services with a build section, pull the others. No ordering.
    Prepare,
    /// Stop dependents before their dependencies.
    Stop,
    /// Start dependencies first, gated on health.
    Start,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pass {
    pub kind: PassKind,
    pub targets: BTreeSet<ServiceId>,
}

/// Ordered passes of a run and every service they touch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub targets: BTreeSet<ServiceId>,
    pub passes: Vec<Pass>,
}

impl Plan {
    fn from_passes(passes: Vec<Pass>) -> Self {
        let passes: Vec<Pass> = passes.into_iter().filter(|p| !p.targets.is_empty()).collect();
        let targets = passes
            .iter()
            .flat_map(|p| p.targets.iter().cloned())
            .collect();
        Self { targets, passes }
    }
}

/// Plan `action` over `selection`; an empty selection means every service.
///
/// `build` adds an image build pass before a start.
#[must_use]
pub fn plan(set: &ServiceSet, action: Action, selection: &BTreeSet<ServiceId>, build: bool) -> Plan {
    let selected: BTreeSet<ServiceId> = if selection.is_empty() {
        set.ids().cloned().collect()
    } else {
        selection.clone()
    };
    let buildable = |ids: &BTreeSet<ServiceId>| -> BTreeSet<ServiceId> {
        ids.iter()
            .filter(|id| set.get(id).is_some_and(|s| s.is_buildable()))
            .cloned()
            .collect()
    };
    let pass = |kind: PassKind, targets: BTreeSet<ServiceId>| Pass { kind, targets };

    let passes = match action {
        Action::Start | Action::Scale => {
            let targets = set.dependency_closure(&selected);
            let mut passes = Vec::new();
            if build {
                passes.push(pass(PassKind::Prepare, buildable(&targets)));
            }
            passes.push(pass(PassKind::Start, targets));
            passes
        }
        Action::Stop => vec![pass(PassKind::Stop, set.dependent_closure(&selected))],
        Action::Restart => {
            let stopped = set.dependent_closure(&selected);
            let started = set.dependency_closure(&stopped);
            vec![
                pass(PassKind::Stop, stopped),
                pass(PassKind::Start, started),
            ]
        }
        Action::Build => vec![pass(PassKind::Prepare, buildable(&selected))],
        Action::Pull => {
            let pulled = selected.difference(&buildable(&selected)).cloned().collect();
            vec![pass(PassKind::Prepare, pulled)]
        }
        Action::Update | Action::Rollback => {
            let stopped = set.dependent_closure(&selected);
            let started = set.dependency_closure(&stopped);
            vec![
                pass(PassKind::Prepare, selected),
                pass(PassKind::Stop, stopped),
                pass(PassKind::Start, started),
            ]
        }
    };

    Plan::from_passes(passes)
}
