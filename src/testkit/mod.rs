//! Shared test utilities available to both unit and integration tests.
//!
//! Enabled via `#[cfg(test)]` (unit tests) or the `testkit` feature
//! (integration tests).
//!
//! # Modules
//!
//! - [`runtime`]: `FakeRuntime`, an in-memory container runtime with
//!   injectable failures and delays.
//! - [`probe`]: `ScriptedCheck`, per-service readiness answers.
//! - [`resources`]: `FixedResources`, constant host figures.
//! - [`stack`]: `TestStack`, a sandboxed manifest with a wired controller.
//! - [`config`]: Canonical test configurations.

pub mod config;
pub mod probe;
pub mod resources;
pub mod runtime;
pub mod stack;
