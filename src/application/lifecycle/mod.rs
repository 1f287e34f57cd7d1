//! Lifecycle controller and the state it keeps between runs.

pub mod controller;
pub mod last_good;
pub mod lock;
pub mod marker;
pub mod plan;
pub mod schedule;
