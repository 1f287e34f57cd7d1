//! Host resource sampling port.

use serde::{Deserialize, Serialize};

/// Host resources at sampling time. Fields are `None` when unavailable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostResources {
    pub memory_total_bytes: Option<u64>,
    pub memory_available_bytes: Option<u64>,
    pub disk_total_bytes: Option<u64>,
    pub disk_available_bytes: Option<u64>,
}

/// Source of host resource figures for reports and status.
pub trait ResourceSampler: Send + Sync {
    fn sample_host(&self) -> HostResources;
}
