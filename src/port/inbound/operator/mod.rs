//! Operator-facing inbound ports consumed by CLI adapters.

pub mod backup;
pub mod health;
pub mod lifecycle;
pub mod manifest;
pub mod port;
pub mod status;
