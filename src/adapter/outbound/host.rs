//! Host resource sampling from `/proc/meminfo` and `statvfs`.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::port::outbound::resource::{HostResources, ResourceSampler};

const MEMINFO: &str = "/proc/meminfo";

/// Samples memory and the free space of the filesystem holding `disk_path`.
#[derive(Debug, Clone)]
pub struct HostSampler {
    disk_path: PathBuf,
}

impl HostSampler {
    pub fn new(disk_path: impl Into<PathBuf>) -> Self {
        Self {
            disk_path: disk_path.into(),
        }
    }
}

impl ResourceSampler for HostSampler {
    fn sample_host(&self) -> HostResources {
        let (memory_total_bytes, memory_available_bytes) = match std::fs::read_to_string(MEMINFO) {
            Ok(text) => parse_meminfo(&text),
            Err(e) => {
                debug!(error = %e, "Memory figures unavailable");
                (None, None)
            }
        };
        let (disk_total_bytes, disk_available_bytes) = disk_space(&nearest_existing(&self.disk_path))
            .map_or((None, None), |(total, available)| (Some(total), Some(available)));

        HostResources {
            memory_total_bytes,
            memory_available_bytes,
            disk_total_bytes,
            disk_available_bytes,
        }
    }
}

/// `MemTotal` and `MemAvailable` in bytes.
fn parse_meminfo(text: &str) -> (Option<u64>, Option<u64>) {
    let field = |name: &str| {
        text.lines()
            .find_map(|line| line.strip_prefix(name))
            .and_then(|rest| rest.trim_start_matches(':').split_whitespace().next())
            .and_then(|kb| kb.parse::<u64>().ok())
            .map(|kb| kb * 1024)
    };
    (field("MemTotal"), field("MemAvailable"))
}

/// The state directory may not exist yet; measure its closest ancestor.
fn nearest_existing(path: &Path) -> PathBuf {
    let mut current = path;
    loop {
        if current.exists() {
            return current.to_path_buf();
        }
        match current.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => current = parent,
            _ => return PathBuf::from("."),
        }
    }
}

#[cfg(unix)]
fn disk_space(path: &Path) -> Option<(u64, u64)> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes()).ok()?;
    // SAFETY: statvfs is plain old data; zeroed is a valid initial value.
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    // SAFETY: c_path is NUL-terminated and stat is a valid out-pointer.
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
    if rc != 0 {
        debug!(path = %path.display(), error = %std::io::Error::last_os_error(), "statvfs failed");
        return None;
    }
    #[allow(clippy::unnecessary_cast)]
    let fragment = stat.f_frsize as u64;
    #[allow(clippy::unnecessary_cast)]
    Some((stat.f_blocks as u64 * fragment, stat.f_bavail as u64 * fragment))
}

#[cfg(not(unix))]
fn disk_space(_path: &Path) -> Option<(u64, u64)> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_meminfo_kilobytes() {
        let text = "MemTotal:       16303072 kB\nMemFree:         1234 kB\nMemAvailable:    8000000 kB\n";
        assert_eq!(
            parse_meminfo(text),
            (Some(16_303_072 * 1024), Some(8_000_000 * 1024))
        );
    }

    #[test]
    fn missing_fields_are_none() {
        assert_eq!(parse_meminfo("Buffers: 1 kB\n"), (None, None));
    }

    #[test]
    fn measures_an_existing_ancestor() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("a/b/c");
        assert_eq!(nearest_existing(&missing), dir.path());
    }

    #[cfg(unix)]
    #[test]
    fn samples_disk_of_the_state_directory() {
        let dir = tempfile::tempdir().unwrap();
        let host = HostSampler::new(dir.path().join("state")).sample_host();
        let (total, available) = (host.disk_total_bytes.unwrap(), host.disk_available_bytes.unwrap());
        assert!(total >= available);
    }
}
