//! Domain validation errors for core domain types.
//!
//! This module defines errors that occur when domain invariants are violated:
//! a dependency graph that does not resolve or loops, and per-service phase
//! transitions the lifecycle state machine does not allow.

use thiserror::Error;

use super::run::ServicePhase;

/// Errors that occur when domain invariants are violated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A dependency edge points at a service that is not part of the set.
    #[error("service '{service}' depends on unknown service '{dependency}'")]
    UnresolvedDependency {
        /// The service declaring the edge.
        service: String,
        /// The missing dependency.
        dependency: String,
    },

    /// The dependency graph contains a cycle.
    #[error("cyclic dependency: {}", cycle.join(" -> "))]
    CyclicDependency {
        /// Services along the cycle, first and last entries equal.
        cycle: Vec<String>,
    },

    /// The lifecycle state machine rejected a transition.
    #[error("service '{service}' cannot move from {from} to {to}")]
    InvalidTransition {
        service: String,
        from: ServicePhase,
        to: ServicePhase,
    },

    /// A run referenced a service it does not track.
    #[error("service '{0}' is not part of this run")]
    NotInRun(String),
}
