//! stackctl - dependency-ordered lifecycle, health gating, backup and
//! restore for multi-service container stacks.
//!
//! # Architecture
//!
//! The crate follows a hexagonal layout:
//!
//! - [`domain`] - services, the dependency graph, runs and snapshots
//! - [`port`] - inbound operator use cases and outbound runtime, probe and
//!   resource contracts
//! - [`application`] - manifest loading, health probing, the lifecycle
//!   controller, backup/restore and run reports
//! - [`adapter`] - the CLI plus Docker, network probe and host adapters
//! - [`infrastructure`] - configuration and wiring
//!
//! # Example
//!
//! ```no_run
//! use stackctl::infrastructure::operator::entry::Operator;
//! use stackctl::port::inbound::operator::manifest::ManifestOperator;
//!
//! let summary = Operator.validate_manifest("", Some("staging")).unwrap();
//! println!("{}", summary.start_order.join(" -> "));
//! ```

pub mod adapter;
pub mod application;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod port;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;
