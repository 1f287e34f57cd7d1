//! Operator entry point.

/// Concrete operator consumed by inbound adapters through `OperatorPort`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Operator;
