//! Outbound adapters (driven side).

pub mod docker;
pub mod host;
pub mod probe;
