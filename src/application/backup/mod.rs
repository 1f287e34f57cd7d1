//! Snapshot backup and restore.

pub mod archive;
pub mod manager;
pub mod restore;
