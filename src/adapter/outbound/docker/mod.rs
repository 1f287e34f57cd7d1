//! Docker-compatible CLI runtime adapter.

pub mod dto;
pub mod runtime;
