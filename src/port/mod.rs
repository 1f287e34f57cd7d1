//! Trait definitions (hexagonal ports). Depend only on domain.
//!
//! Inbound ports expose operator use cases to drivers such as the CLI.
//! Outbound ports describe the external systems the application drives:
//! the container runtime, readiness checks and host sampling.

pub mod inbound;
pub mod outbound;
