//! Application services (use cases).
//!
//! These services orchestrate domain logic and drive outbound ports to
//! implement the operator's use cases.

pub mod backup;
pub mod health;
pub mod layout;
pub mod lifecycle;
pub mod manifest;
pub mod persist;
pub mod report;
