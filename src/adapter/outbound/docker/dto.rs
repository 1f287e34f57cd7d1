//! Docker CLI JSON output types.
//!
//! `docker ps` and `docker stats` print one JSON object per line when given
//! `--format '{{json .}}'`:
//! ```json
//! {"Names":"acme-db-1","State":"running","Status":"Up 3 minutes","Labels":"stackctl.project=acme,stackctl.service=db"}
//! {"Name":"acme-db-1","CPUPerc":"0.07%","MemUsage":"31.5MiB / 7.6GiB"}
//! ```

use serde::Deserialize;

use crate::port::outbound::runtime::ContainerUsage;

/// Label carrying the project name.
pub const PROJECT_LABEL: &str = "stackctl.project";
/// Label carrying the service name.
pub const SERVICE_LABEL: &str = "stackctl.service";
/// Label carrying the 1-based replica index.
pub const REPLICA_LABEL: &str = "stackctl.replica";

/// One line of `docker ps --format '{{json .}}'`.
#[derive(Debug, Clone, Deserialize)]
pub struct PsLine {
    #[serde(rename = "Names")]
    pub names: String,
    #[serde(rename = "State", default)]
    pub state: String,
    #[serde(rename = "Status", default)]
    pub status: String,
    #[serde(rename = "Labels", default)]
    pub labels: String,
}

impl PsLine {
    #[must_use]
    pub fn running(&self) -> bool {
        self.state.eq_ignore_ascii_case("running")
    }

    /// Value of a `k=v` label from the comma-joined label string.
    #[must_use]
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels
            .split(',')
            .filter_map(|pair| pair.split_once('='))
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v)
    }

    /// First container name; `ps` joins aliases with commas.
    #[must_use]
    pub fn name(&self) -> &str {
        self.names.split(',').next().unwrap_or(&self.names)
    }

    #[must_use]
    pub fn replica(&self) -> Option<u32> {
        self.label(REPLICA_LABEL).and_then(|r| r.parse().ok())
    }

    /// Display text: status when present, else the raw state.
    #[must_use]
    pub fn describe(&self) -> String {
        if self.status.is_empty() {
            self.state.clone()
        } else {
            self.status.clone()
        }
    }
}

/// One line of `docker stats --no-stream --format '{{json .}}'`.
#[derive(Debug, Clone, Deserialize)]
pub struct StatsLine {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "CPUPerc", default)]
    pub cpu_perc: String,
    #[serde(rename = "MemUsage", default)]
    pub mem_usage: String,
}

impl StatsLine {
    #[must_use]
    pub fn to_usage(&self) -> ContainerUsage {
        ContainerUsage {
            container: self.name.clone(),
            cpu_percent: self
                .cpu_perc
                .trim()
                .trim_end_matches('%')
                .parse()
                .unwrap_or(0.0),
            memory_bytes: self
                .mem_usage
                .split('/')
                .next()
                .and_then(parse_size)
                .unwrap_or(0),
        }
    }
}

/// Parse every non-empty line of `output` as `T`.
pub fn parse_lines<T: for<'de> Deserialize<'de>>(output: &str) -> serde_json::Result<Vec<T>> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(serde_json::from_str)
        .collect()
}

/// Parse a human size such as `31.5MiB` or `1.2GB` into bytes.
#[must_use]
pub fn parse_size(text: &str) -> Option<u64> {
    let text = text.trim();
    let split = text
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(text.len());
    let (number, unit) = text.split_at(split);
    let value: f64 = number.parse().ok()?;
    let factor: f64 = match unit.trim() {
        "" | "B" => 1.0,
        "kB" | "KB" => 1e3,
        "MB" => 1e6,
        "GB" => 1e9,
        "TB" => 1e12,
        "KiB" => 1024.0,
        "MiB" => 1024.0 * 1024.0,
        "GiB" => 1024.0 * 1024.0 * 1024.0,
        "TiB" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        _ => return None,
    };
    Some((value * factor).round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_ps_labels() {
        let lines: Vec<PsLine> = parse_lines(
            r#"{"Names":"acme-db-1","State":"running","Status":"Up 3 minutes","Labels":"stackctl.project=acme,stackctl.service=db,stackctl.replica=1"}
{"Names":"acme-api-1","State":"exited","Status":"","Labels":"stackctl.service=api"}
"#,
        )
        .unwrap();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].running());
        assert_eq!(lines[0].label(SERVICE_LABEL), Some("db"));
        assert_eq!(lines[0].replica(), Some(1));
        assert!(!lines[1].running());
        assert_eq!(lines[1].describe(), "exited");
    }

    #[test]
    fn converts_stats() {
        let line: StatsLine =
            serde_json::from_str(r#"{"Name":"acme-db-1","CPUPerc":"12.50%","MemUsage":"1.5MiB / 7.6GiB"}"#)
                .unwrap();
        let usage = line.to_usage();
        assert!((usage.cpu_percent - 12.5).abs() < f64::EPSILON);
        assert_eq!(usage.memory_bytes, 1_572_864);
    }

    #[test]
    fn sizes() {
        assert_eq!(parse_size("512B"), Some(512));
        assert_eq!(parse_size("2kB"), Some(2000));
        assert_eq!(parse_size("1GiB"), Some(1 << 30));
        assert_eq!(parse_size("lots"), None);
    }
}
