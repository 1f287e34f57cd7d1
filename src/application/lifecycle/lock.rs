//! Per-environment run lock.
//!
//! The lock is a JSON record created with `create_new`, so exactly one
//! process can hold it. The guard removes the file on drop. A lock whose
//! holder process no longer exists on this host is stale and is reclaimed
//! by the next acquirer.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// A lock file younger than this with unreadable content is assumed to be
/// mid-write by another acquirer.
const TORN_WRITE_GRACE: Duration = Duration::from_secs(5);

/// Contents of a lock file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    /// Unique id of the acquisition.
    pub holder: String,
    pub pid: u32,
    pub host: String,
    /// What the holder is doing, e.g. `start` or `backup`.
    pub purpose: String,
    pub acquired_at: DateTime<Utc>,
}

impl LockRecord {
    fn current(purpose: &str) -> Self {
        Self {
            holder: uuid::Uuid::new_v4().to_string(),
            pid: std::process::id(),
            host: hostname(),
            purpose: purpose.to_string(),
            acquired_at: Utc::now(),
        }
    }

    /// Holder is provably gone: same host and the pid no longer exists.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.host == hostname() && !process_alive(self.pid)
    }

    fn into_error(self, environment: &str) -> Error {
        Error::RunInProgress {
            environment: environment.to_string(),
            holder: self.holder,
            purpose: self.purpose,
            pid: self.pid,
            host: self.host,
            since: self.acquired_at.to_rfc3339(),
        }
    }
}

/// Held lock; released when dropped.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
    environment: String,
    record: LockRecord,
}

impl RunLock {
    #[must_use]
    pub fn environment(&self) -> &str {
        &self.environment
    }

    #[must_use]
    pub fn record(&self) -> &LockRecord {
        &self.record
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        // Only remove the file while it still carries our holder id.
        match read_record(&self.path) {
            Ok(Some(record)) if record.holder == self.record.holder => {
                if let Err(e) = fs::remove_file(&self.path) {
                    warn!(path = %self.path.display(), error = %e, "Failed to release run lock");
                } else {
                    debug!(environment = %self.environment, "Run lock released");
                }
            }
            Ok(_) => warn!(path = %self.path.display(), "Run lock replaced by another holder"),
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to read run lock"),
        }
    }
}

/// Acquires and inspects locks under one directory.
#[derive(Debug, Clone)]
pub struct LockManager {
    dir: PathBuf,
}

impl LockManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn path(&self, environment: &str) -> PathBuf {
        self.dir.join(format!("{environment}.lock"))
    }

    /// Take the lock for `environment`, failing fast if it is held.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RunInProgress`] when a live holder exists.
    pub fn acquire(&self, environment: &str, purpose: &str) -> Result<RunLock> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path(environment);

        // One retry after reclaiming a stale lock.
        for _ in 0..2 {
            let record = LockRecord::current(purpose);
            match create_exclusive(&path, &record) {
                Ok(()) => {
                    info!(environment, purpose, holder = %record.holder, "Run lock acquired");
                    return Ok(RunLock {
                        path,
                        environment: environment.to_string(),
                        record,
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
                Err(e) => return Err(e.into()),
            }

            match read_record(&path) {
                Ok(Some(existing)) if existing.is_stale() => {
                    warn!(
                        environment,
                        holder = %existing.holder,
                        pid = existing.pid,
                        "Reclaiming stale run lock"
                    );
                    reclaim(&path, Some(&existing))?;
                }
                Ok(Some(existing)) => return Err(existing.into_error(environment)),
                Ok(None) => continue,
                Err(_) if recently_modified(&path) => {
                    return Err(Error::RunInProgress {
                        environment: environment.to_string(),
                        holder: "unknown".to_string(),
                        purpose: "unknown".to_string(),
                        pid: 0,
                        host: "unknown".to_string(),
                        since: "just now".to_string(),
                    });
                }
                Err(_) => {
                    warn!(environment, "Reclaiming unreadable run lock");
                    reclaim(&path, None)?;
                }
            }
        }

        match read_record(&path) {
            Ok(Some(existing)) => Err(existing.into_error(environment)),
            _ => Err(io::Error::new(
                io::ErrorKind::WouldBlock,
                format!("could not acquire lock {}", path.display()),
            )
            .into()),
        }
    }

    /// Current holder and whether it is stale, without taking the lock.
    pub fn inspect(&self, environment: &str) -> Result<Option<(LockRecord, bool)>> {
        match read_record(&self.path(environment)) {
            Ok(Some(record)) => {
                let stale = record.is_stale();
                Ok(Some((record, stale)))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

fn create_exclusive(path: &Path, record: &LockRecord) -> io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    let json = serde_json::to_vec_pretty(record).map_err(io::Error::other)?;
    file.write_all(&json)?;
    file.sync_all()
}

fn read_record(path: &Path) -> io::Result<Option<LockRecord>> {
    match fs::read(path) {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Remove a stale lock, but only if it still holds what we judged stale.
fn reclaim(path: &Path, expected: Option<&LockRecord>) -> io::Result<()> {
    let current = read_record(path).ok().flatten();
    if current.as_ref() != expected {
        return Ok(());
    }
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

fn recently_modified(path: &Path) -> bool {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .is_some_and(|age| age < TORN_WRITE_GRACE)
}

/// Host name of this machine, or `localhost` when unavailable.
#[must_use]
pub fn hostname() -> String {
    let mut buf = [0u8; 256];
    // SAFETY: buf is valid for buf.len() bytes; gethostname NUL-terminates
    // on success when the name fits.
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len()) };
    if rc != 0 {
        return "localhost".to_string();
    }
    let end = buf.iter().position(|b| *b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

/// Whether a process with `pid` exists on this host.
#[must_use]
pub fn process_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    // SAFETY: signal 0 performs error checking only; no signal is sent.
    let rc = unsafe { libc::kill(pid, 0) };
    rc == 0 || io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> (tempfile::TempDir, LockManager) {
        let dir = tempfile::tempdir().unwrap();
        let manager = LockManager::new(dir.path().join("locks"));
        (dir, manager)
    }

    #[test]
    fn second_acquire_fails_while_held() {
        let (_dir, locks) = manager();
        let held = locks.acquire("dev", "start").unwrap();
        let err = locks.acquire("dev", "stop").unwrap_err();
        match err {
            Error::RunInProgress {
                purpose, holder, pid, ..
            } => {
                assert_eq!(purpose, "start");
                assert_eq!(holder, held.record().holder);
                assert_eq!(pid, std::process::id());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn environments_lock_independently() {
        let (_dir, locks) = manager();
        let _dev = locks.acquire("dev", "start").unwrap();
        assert!(locks.acquire("prod", "start").is_ok());
    }

    #[test]
    fn drop_releases_the_lock() {
        let (_dir, locks) = manager();
        {
            let _held = locks.acquire("dev", "start").unwrap();
            assert!(locks.path("dev").exists());
        }
        assert!(!locks.path("dev").exists());
        assert!(locks.acquire("dev", "start").is_ok());
    }

    #[test]
    fn stale_lock_is_reclaimed() {
        let (_dir, locks) = manager();
        fs::create_dir_all(locks.path("dev").parent().unwrap()).unwrap();
        let stale = LockRecord {
            holder: "gone".into(),
            pid: i32::MAX as u32,
            host: hostname(),
            purpose: "start".into(),
            acquired_at: Utc::now(),
        };
        fs::write(locks.path("dev"), serde_json::to_vec(&stale).unwrap()).unwrap();

        let (record, is_stale) = locks.inspect("dev").unwrap().unwrap();
        assert_eq!(record.holder, "gone");
        assert!(is_stale);

        let lock = locks.acquire("dev", "restart").unwrap();
        assert_ne!(lock.record().holder, "gone");
    }

    #[test]
    fn foreign_host_lock_is_never_stale() {
        let record = LockRecord {
            holder: "x".into(),
            pid: i32::MAX as u32,
            host: "some-other-host.invalid".into(),
            purpose: "start".into(),
            acquired_at: Utc::now(),
        };
        assert!(!record.is_stale());
    }

    #[test]
    fn fresh_unreadable_lock_counts_as_held() {
        let (_dir, locks) = manager();
        fs::create_dir_all(locks.path("dev").parent().unwrap()).unwrap();
        fs::write(locks.path("dev"), b"").unwrap();
        assert!(matches!(
            locks.acquire("dev", "start"),
            Err(Error::RunInProgress { .. })
        ));
    }

    #[test]
    fn current_process_is_alive() {
        assert!(process_alive(std::process::id()));
        assert!(!process_alive(0));
    }
}
