//! Fixed host resource figures.

use crate::port::outbound::resource::{HostResources, ResourceSampler};

/// Reports the same host figures on every sample.
#[derive(Debug, Clone)]
pub struct FixedResources(pub HostResources);

impl Default for FixedResources {
    fn default() -> Self {
        Self(HostResources {
            memory_total_bytes: Some(16 << 30),
            memory_available_bytes: Some(8 << 30),
            disk_total_bytes: Some(500 << 30),
            disk_available_bytes: Some(200 << 30),
        })
    }
}

impl ResourceSampler for FixedResources {
    fn sample_host(&self) -> HostResources {
        self.0.clone()
    }
}
