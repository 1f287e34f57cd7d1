//! Run reports: generation, storage and retention.

pub mod generator;
pub mod recorder;
pub mod retention;
pub mod store;
