//! Infrastructure layer.
//!
//! Provides technical concerns that support the application without containing
//! business logic: configuration, composition of adapters, and the operator
//! facade consumed by the CLI.
//!
//! # Submodules
//!
//! - [`bootstrap`] - Composition root for runtime wiring
//! - [`config`] - Configuration loading and validation
//! - [`operator`] - CLI operator interface

pub mod bootstrap;
pub mod config;
pub mod operator;
