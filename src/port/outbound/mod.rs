//! Outbound ports (driven side): interfaces implemented by outbound adapters.
//!
//! These contracts describe the container runtime, readiness checks and
//! host resource sampling.

pub mod probe;
pub mod resource;
pub mod runtime;
