//! Inbound (driving) ports consumed by inbound adapters.
//!
//! - [`operator`]: operator-facing use cases for lifecycle, health, backup,
//!   status and manifest validation

pub mod operator;
