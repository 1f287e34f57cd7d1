//! Runtime-agnostic domain model: services, dependency graph, runs and snapshots.

pub mod error;
pub mod graph;
pub mod health;
pub mod id;
pub mod run;
pub mod service;
pub mod snapshot;
