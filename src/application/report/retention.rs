//! Report retention.

use chrono::{DateTime, Duration, Utc};

/// How long reports are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// The newest `keep` reports survive regardless of age.
    pub keep: usize,
    pub max_age: Duration,
}

impl RetentionPolicy {
    #[must_use]
    pub fn new(keep: usize, retention_days: u32) -> Self {
        Self {
            keep,
            max_age: Duration::days(i64::from(retention_days)),
        }
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::new(20, 30)
    }
}

/// A published report, identified by its file stem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportEntry {
    pub stem: String,
    pub finished_at: DateTime<Utc>,
}

/// Stems of the reports `policy` expires at `now`.
#[must_use]
pub fn expired(entries: &[ReportEntry], policy: RetentionPolicy, now: DateTime<Utc>) -> Vec<String> {
    let mut newest_first: Vec<&ReportEntry> = entries.iter().collect();
    newest_first.sort_by(|a, b| b.finished_at.cmp(&a.finished_at).then(b.stem.cmp(&a.stem)));

    let cutoff = now - policy.max_age;
    newest_first
        .into_iter()
        .skip(policy.keep)
        .filter(|entry| entry.finished_at < cutoff)
        .map(|entry| entry.stem.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(stem: &str, days_ago: i64, now: DateTime<Utc>) -> ReportEntry {
        ReportEntry {
            stem: stem.to_string(),
            finished_at: now - Duration::days(days_ago),
        }
    }

    #[test]
    fn old_reports_beyond_keep_expire() {
        let now = Utc::now();
        let entries = vec![
            entry("a", 40, now),
            entry("b", 35, now),
            entry("c", 1, now),
            entry("d", 0, now),
        ];
        let gone = expired(&entries, RetentionPolicy::new(1, 30), now);
        assert_eq!(gone, vec!["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn newest_reports_survive_even_when_old() {
        let now = Utc::now();
        let entries = vec![entry("a", 400, now), entry("b", 300, now), entry("c", 200, now)];
        let gone = expired(&entries, RetentionPolicy::new(2, 30), now);
        assert_eq!(gone, vec!["a".to_string()]);
    }

    #[test]
    fn keep_zero_still_respects_age() {
        let now = Utc::now();
        let entries = vec![entry("fresh", 0, now)];
        assert!(expired(&entries, RetentionPolicy::new(0, 30), now).is_empty());
    }
}
