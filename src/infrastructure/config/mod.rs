//! Infrastructure configuration modules.

pub mod health;
pub mod logging;
pub mod project;
pub mod retention;
pub mod runtime;
pub mod settings;
