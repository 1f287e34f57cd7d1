//! Unified operator capability surface for inbound adapters.

use super::backup::BackupOperator;
use super::health::HealthOperator;
use super::lifecycle::LifecycleOperator;
use super::manifest::ManifestOperator;
use super::status::StatusOperator;

/// Unified operator capability surface consumed by inbound adapters.
pub trait OperatorPort:
    BackupOperator + HealthOperator + LifecycleOperator + ManifestOperator + StatusOperator
{
}

impl<T> OperatorPort for T where
    T: BackupOperator + HealthOperator + LifecycleOperator + ManifestOperator + StatusOperator
{
}
