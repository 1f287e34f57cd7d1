//! CLI module graph.

pub mod app;
pub mod backup;
pub mod command;
pub mod diagnostic;
pub mod health;
pub mod lifecycle;
pub mod operator;
pub mod output;
pub mod paths;
pub mod status;
pub mod validate;
