//! Operator implementations for inbound adapters.

pub mod backup;
pub mod entry;
pub mod health;
pub mod lifecycle;
pub mod manifest;
pub mod status;

mod shared;
