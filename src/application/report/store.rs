//! Report storage under `reports/<env>/`.
//!
//! Every report is written twice: `<stem>.json` for tooling and `<stem>.log`
//! for humans. Both writes are atomic. Retention runs after each publish.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::{debug, warn};

use super::generator::RunReport;
use super::retention::{self, ReportEntry, RetentionPolicy};
use crate::application::layout::StateLayout;
use crate::application::persist;
use crate::error::Result;

const STAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.3fZ";

#[derive(Debug, Clone)]
pub struct ReportStore {
    layout: StateLayout,
    retention: RetentionPolicy,
}

impl ReportStore {
    pub fn new(layout: StateLayout, retention: RetentionPolicy) -> Self {
        Self { layout, retention }
    }

    /// Write both renditions and prune; returns the JSON path.
    pub fn publish(&self, report: &RunReport) -> Result<PathBuf> {
        let dir = self.layout.reports_dir(&report.environment);
        let stem = report.file_stem();
        let json = dir.join(format!("{stem}.json"));

        persist::write_json(&json, report)?;
        persist::write_atomic(&dir.join(format!("{stem}.log")), report.render_log().as_bytes())?;
        debug!(path = %json.display(), "Report published");

        if let Err(e) = self.prune(&report.environment, Utc::now()) {
            warn!(environment = %report.environment, error = %e, "Report pruning failed");
        }
        Ok(json)
    }

    /// Published reports, newest first.
    pub fn list(&self, environment: &str) -> Result<Vec<ReportEntry>> {
        let dir = self.layout.reports_dir(environment);
        let read = match fs::read_dir(&dir) {
            Ok(read) => read,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        for item in read {
            let path = item?.path();
            if let Some(entry) = entry_for(&path) {
                entries.push(entry);
            }
        }
        entries.sort_by(|a, b| b.finished_at.cmp(&a.finished_at).then(b.stem.cmp(&a.stem)));
        Ok(entries)
    }

    /// The newest report of the environment.
    pub fn latest(&self, environment: &str) -> Result<Option<RunReport>> {
        match self.list(environment)?.first() {
            Some(entry) => self.read(environment, &entry.stem),
            None => Ok(None),
        }
    }

    /// The newest report of a run that changed which containers run.
    pub fn latest_mutating(&self, environment: &str) -> Result<Option<RunReport>> {
        for entry in self.list(environment)? {
            match self.read(environment, &entry.stem) {
                Ok(Some(report)) if report.action.mutates_stack() => return Ok(Some(report)),
                Ok(_) => {}
                Err(e) => warn!(stem = %entry.stem, error = %e, "Skipping unreadable report"),
            }
        }
        Ok(None)
    }

    /// Delete reports the retention policy expires at `now`.
    pub fn prune(&self, environment: &str, now: DateTime<Utc>) -> Result<usize> {
        let dir = self.layout.reports_dir(environment);
        let expired = retention::expired(&self.list(environment)?, self.retention, now);
        for stem in &expired {
            persist::remove_if_exists(&dir.join(format!("{stem}.json")))?;
            persist::remove_if_exists(&dir.join(format!("{stem}.log")))?;
        }
        if !expired.is_empty() {
            debug!(environment, pruned = expired.len(), "Pruned old reports");
        }
        Ok(expired.len())
    }

    fn read(&self, environment: &str, stem: &str) -> Result<Option<RunReport>> {
        persist::read_json(
            &self
                .layout
                .reports_dir(environment)
                .join(format!("{stem}.json")),
        )
    }
}

fn entry_for(path: &Path) -> Option<ReportEntry> {
    if path.extension()? != "json" {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    let stamp = stem.split('-').next()?;
    let finished = NaiveDateTime::parse_from_str(stamp, STAMP_FORMAT).ok()?;
    Some(ReportEntry {
        stem: stem.to_string(),
        finished_at: finished.and_utc(),
    })
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::application::report::generator::{generate, ResourceSnapshot};
    use crate::domain::id::ServiceId;
    use crate::domain::run::{Action, RunState, ServicePhase};

    fn report(action: Action, finished: DateTime<Utc>) -> RunReport {
        let db = ServiceId::new("db");
        let mut run = RunState::new("dev", action, Vec::new(), [db.clone()]);
        run.set_phase(&db, ServicePhase::Pulling).unwrap();
        run.set_phase(&db, ServicePhase::Pulled).unwrap();
        run.conclude();
        run.started_at = finished - Duration::seconds(1);
        run.finished_at = Some(finished);
        generate(&run, "acme", ResourceSnapshot::default())
    }

    fn store(keep: usize) -> (tempfile::TempDir, ReportStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ReportStore::new(StateLayout::new(dir.path()), RetentionPolicy::new(keep, 30));
        (dir, store)
    }

    #[test]
    fn publish_writes_json_and_log() {
        let (_dir, store) = store(10);
        let report = report(Action::Start, Utc::now());
        let path = store.publish(&report).unwrap();
        assert!(path.exists());
        assert!(path.with_extension("log").exists());
        assert_eq!(store.latest("dev").unwrap(), Some(report));
    }

    #[test]
    fn latest_mutating_skips_build_and_pull() {
        let (_dir, store) = store(10);
        let now = Utc::now();
        store
            .publish(&report(Action::Start, now - Duration::minutes(2)))
            .unwrap();
        store
            .publish(&report(Action::Pull, now - Duration::minutes(1)))
            .unwrap();

        assert_eq!(store.latest("dev").unwrap().unwrap().action, Action::Pull);
        assert_eq!(
            store.latest_mutating("dev").unwrap().unwrap().action,
            Action::Start
        );
    }

    #[test]
    fn publish_prunes_expired_reports() {
        let (_dir, store) = store(1);
        let now = Utc::now();
        store
            .publish(&report(Action::Start, now - Duration::days(90)))
            .unwrap();
        store
            .publish(&report(Action::Stop, now - Duration::days(60)))
            .unwrap();
        store.publish(&report(Action::Start, now)).unwrap();

        let left = store.list("dev").unwrap();
        assert_eq!(left.len(), 1);
        assert!(left[0].stem.contains("-start-"));
    }

    #[test]
    fn missing_directory_lists_nothing() {
        let (_dir, store) = store(1);
        assert!(store.list("prod").unwrap().is_empty());
        assert!(store.latest("prod").unwrap().is_none());
    }
}
