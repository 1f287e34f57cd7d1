//! Domain identifier types with proper encapsulation.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Service identifier, unique within a manifest.
///
/// The inner String is private to ensure all construction goes through
/// the defined constructors.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceId(String);

impl ServiceId {
    /// Create a new `ServiceId` from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the service ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ServiceId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for ServiceId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Unique identifier for one orchestration invocation.
///
/// Generated as UUID v4 at run start.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Create a new `RunId` with a generated UUID.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Get the run ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight characters, used in file names.
    #[must_use]
    pub fn short(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for RunId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Timestamp-derived snapshot identifier.
///
/// Sorts chronologically as a plain string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotId(String);

impl SnapshotId {
    /// Format used for the timestamp part of the id.
    pub const FORMAT: &'static str = "%Y%m%dT%H%M%S%.3fZ";

    /// Build an id from a timestamp, with an optional collision suffix.
    #[must_use]
    pub fn from_timestamp(at: DateTime<Utc>, suffix: u32) -> Self {
        let base = at.format(Self::FORMAT).to_string();
        if suffix == 0 {
            Self(base)
        } else {
            Self(format!("{base}-{suffix}"))
        }
    }

    /// Wrap an existing id, e.g. one given on the command line.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn service_ids_order_by_name() {
        let mut ids = vec![ServiceId::new("web"), ServiceId::new("api"), ServiceId::new("db")];
        ids.sort();
        let names: Vec<_> = ids.iter().map(ServiceId::as_str).collect();
        assert_eq!(names, vec!["api", "db", "web"]);
    }

    #[test]
    fn run_ids_are_unique() {
        assert_ne!(RunId::new(), RunId::new());
    }

    #[test]
    fn run_id_short_is_eight_chars() {
        let id = RunId::new();
        assert_eq!(id.short().len(), 8);
        assert!(id.as_str().starts_with(id.short()));
    }

    #[test]
    fn snapshot_id_formats_timestamp_with_millis() {
        let at = Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap()
            + chrono::Duration::milliseconds(89);
        assert_eq!(
            SnapshotId::from_timestamp(at, 0).as_str(),
            "20260304T050607.089Z"
        );
        assert_eq!(
            SnapshotId::from_timestamp(at, 2).as_str(),
            "20260304T050607.089Z-2"
        );
    }

    #[test]
    fn snapshot_ids_sort_chronologically() {
        let early = SnapshotId::from_timestamp(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(), 0);
        let late = SnapshotId::from_timestamp(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(), 0);
        assert!(early < late);
    }
}
