//! Snapshot metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::SnapshotId;

/// What an artifact inside a snapshot holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Gzipped tar of one named volume.
    Volume,
    /// Output of the database dump command.
    DatabaseDump,
    /// A manifest source file as read at backup time.
    Manifest,
    /// The resolved service set in effect.
    ServiceSet,
}

/// One file in a snapshot, addressed by its content digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactEntry {
    pub name: String,
    pub kind: ArtifactKind,
    /// Path relative to the snapshot directory.
    pub file: String,
    /// Lowercase hex SHA-256 of the file contents.
    pub sha256: String,
    pub bytes: u64,
}

/// Contents of `snapshot.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotManifest {
    pub id: SnapshotId,
    pub environment: String,
    pub project: String,
    pub created_at: DateTime<Utc>,
    pub artifacts: Vec<ArtifactEntry>,
}

impl SnapshotManifest {
    /// File name of the metadata file inside a snapshot directory.
    pub const FILE_NAME: &'static str = "snapshot.json";

    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.artifacts.iter().map(|a| a.bytes).sum()
    }

    pub fn of_kind(&self, kind: ArtifactKind) -> impl Iterator<Item = &ArtifactEntry> {
        self.artifacts.iter().filter(move |a| a.kind == kind)
    }

    #[must_use]
    pub fn database_dump(&self) -> Option<&ArtifactEntry> {
        self.of_kind(ArtifactKind::DatabaseDump).next()
    }
}

/// Listing entry for a published snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotSummary {
    pub id: SnapshotId,
    pub created_at: DateTime<Utc>,
    pub volumes: usize,
    pub has_database_dump: bool,
    pub bytes: u64,
}

impl From<&SnapshotManifest> for SnapshotSummary {
    fn from(manifest: &SnapshotManifest) -> Self {
        Self {
            id: manifest.id.clone(),
            created_at: manifest.created_at,
            volumes: manifest.of_kind(ArtifactKind::Volume).count(),
            has_database_dump: manifest.database_dump().is_some(),
            bytes: manifest.total_bytes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, kind: ArtifactKind, bytes: u64) -> ArtifactEntry {
        ArtifactEntry {
            name: name.into(),
            kind,
            file: format!("{name}.bin"),
            sha256: "00".into(),
            bytes,
        }
    }

    #[test]
    fn summary_counts_artifacts() {
        let manifest = SnapshotManifest {
            id: SnapshotId::new("20260101T000000.000Z"),
            environment: "dev".into(),
            project: "acme".into(),
            created_at: Utc::now(),
            artifacts: vec![
                entry("pgdata", ArtifactKind::Volume, 10),
                entry("uploads", ArtifactKind::Volume, 20),
                entry("db", ArtifactKind::DatabaseDump, 5),
                entry("stack.toml", ArtifactKind::Manifest, 1),
            ],
        };
        let summary = SnapshotSummary::from(&manifest);
        assert_eq!(summary.volumes, 2);
        assert!(summary.has_database_dump);
        assert_eq!(summary.bytes, 36);
    }
}
