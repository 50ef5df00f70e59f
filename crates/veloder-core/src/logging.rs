//! Append-only run journal under `data/logs/YYYY/MM/`.

use std::collections::BTreeSet;
use std::fs::{self, OpenOptions, create_dir_all};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use chrono::{Datelike, Utc};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Serialize;
use tracing::{debug, warn};

const JOURNAL_FILE: &str = "run.jsonl";
const AUDIT_FILE: &str = "audit.jsonl";
const SUMMARY_LIMIT: usize = 500;

static REDACTION_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    vec![
        (
            "api_key",
            Regex::new(r"(?i)(api[_-]?key\s*[:=]\s*)([A-Za-z0-9\-_.+/]+)")
                .expect("invalid api_key regex"),
        ),
        (
            "secret",
            Regex::new(r"(?i)(secret\s*[:=]\s*)([A-Za-z0-9\-_.+/]+)")
                .expect("invalid secret regex"),
        ),
        (
            "bearer",
            Regex::new(r"(?i)(bearer\s+)([A-Za-z0-9\-_.+=/]+)").expect("invalid bearer regex"),
        ),
        (
            "query_key",
            Regex::new(r"([?&]key=)([A-Za-z0-9\-_]+)").expect("invalid query_key regex"),
        ),
        (
            "sk_token",
            Regex::new(r"(sk-[A-Za-z0-9]{16,})").expect("invalid sk_token regex"),
        ),
        (
            "google_key",
            Regex::new(r"(AIza[0-9A-Za-z\-_]{20,})").expect("invalid google_key regex"),
        ),
    ]
});

/// What a finished run reports to the journal.
#[derive(Debug, Clone)]
pub struct RunLogInput {
    pub run_id: String,
    pub variant: String,
    pub topic: String,
    pub summary: String,
    pub artifacts: Vec<String>,
    pub trace_path: Option<String>,
}

#[derive(Serialize)]
struct RunLogRecord {
    timestamp: String,
    run_id: String,
    variant: String,
    topic: String,
    summary: String,
    artifacts: Vec<String>,
    trace_path: Option<String>,
    redactions: Vec<String>,
}

#[derive(Serialize)]
struct AuditLogRecord {
    timestamp: String,
    run_id: String,
    redactions: Vec<String>,
}

fn append_json_line<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        create_dir_all(parent)
            .with_context(|| format!("failed to create log directory {}", parent.display()))?;
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    let line = serde_json::to_string(value)?;
    writeln!(writer, "{line}")
        .with_context(|| format!("failed to append log entry to {}", path.display()))?;
    writer.flush()?;
    Ok(())
}

fn sanitize_text(input: &str, redactions: &mut BTreeSet<String>) -> String {
    let mut output = input.to_string();
    for (name, regex) in REDACTION_PATTERNS.iter() {
        let mut matched = false;
        output = regex
            .replace_all(&output, |caps: &Captures| {
                matched = true;
                if caps.len() > 2 {
                    format!("{}[REDACTED]", &caps[1])
                } else {
                    "[REDACTED]".to_string()
                }
            })
            .to_string();
        if matched {
            redactions.insert((*name).to_string());
        }
    }
    output
}

fn truncate_summary(summary: &str) -> String {
    if summary.chars().count() <= SUMMARY_LIMIT {
        return summary.to_string();
    }
    let mut cut: String = summary.chars().take(SUMMARY_LIMIT).collect();
    cut.push_str("...");
    cut
}

/// Append one record to `<base_dir>/YYYY/MM/run.jsonl` and prune old files.
///
/// Returns the journal path. `retention_days == 0` disables pruning.
pub fn log_run_completion(
    base_dir: impl AsRef<Path>,
    retention_days: u64,
    input: RunLogInput,
) -> Result<PathBuf> {
    let base_dir = base_dir.as_ref();
    let timestamp = Utc::now();
    let mut redactions = BTreeSet::new();

    let topic = sanitize_text(&input.topic, &mut redactions);
    let summary = sanitize_text(&truncate_summary(&input.summary), &mut redactions);
    let artifacts = input
        .artifacts
        .iter()
        .map(|path| sanitize_text(path, &mut redactions))
        .collect();

    let record = RunLogRecord {
        timestamp: timestamp.to_rfc3339(),
        run_id: input.run_id.clone(),
        variant: input.variant,
        topic,
        summary,
        artifacts,
        trace_path: input.trace_path,
        redactions: redactions.into_iter().collect(),
    };

    let month_dir = base_dir
        .join(format!("{:04}", timestamp.year()))
        .join(format!("{:02}", timestamp.month()));
    let journal_path = month_dir.join(JOURNAL_FILE);
    append_json_line(&journal_path, &record)?;

    if !record.redactions.is_empty() {
        let audit = AuditLogRecord {
            timestamp: record.timestamp.clone(),
            run_id: input.run_id.clone(),
            redactions: record.redactions.clone(),
        };
        append_json_line(&month_dir.join(AUDIT_FILE), &audit)?;
        warn!(
            run_id = %input.run_id,
            fields = ?record.redactions,
            "redacted potential secrets from run journal"
        );
    }

    enforce_retention(base_dir, retention_days)?;
    debug!(path = %journal_path.display(), "run journal updated");
    Ok(journal_path)
}

fn enforce_retention(base_dir: &Path, retention_days: u64) -> Result<()> {
    if retention_days == 0 || !base_dir.exists() {
        return Ok(());
    }
    let cutoff = SystemTime::now()
        .checked_sub(Duration::from_secs(retention_days.saturating_mul(86_400)))
        .unwrap_or(SystemTime::UNIX_EPOCH);

    prune_directory(base_dir, cutoff)
}

fn prune_directory(dir: &Path, cutoff: SystemTime) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let metadata = entry.metadata()?;
        if metadata.is_dir() {
            prune_directory(&path, cutoff)?;
            if path.read_dir()?.next().is_none() {
                fs::remove_dir(&path).ok();
            }
        } else if metadata.is_file()
            && metadata
                .modified()
                .map(|time| time < cutoff)
                .unwrap_or(false)
        {
            fs::remove_file(&path).ok();
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use tempfile::TempDir;

    fn input(summary: &str) -> RunLogInput {
        RunLogInput {
            run_id: "run-test".to_string(),
            variant: "blog".to_string(),
            topic: "Inteligência Artificial".to_string(),
            summary: summary.to_string(),
            artifacts: vec!["data/output/post/post_seo_20250805_101010.html".to_string()],
            trace_path: Some("data/traces/run-test.json".to_string()),
        }
    }

    #[test]
    fn journal_redacts_and_audits() -> Result<()> {
        let temp = TempDir::new().expect("temp dir");
        let path = log_run_completion(
            temp.path(),
            0,
            input("called ?key=AIzaSyA1234567890abcdefghij with bearer XYZ"),
        )?;
        assert!(path.ends_with(JOURNAL_FILE));

        let line = fs::read_to_string(&path)?;
        let record: Value = serde_json::from_str(line.trim())?;
        assert_eq!(record["run_id"], "run-test");
        assert_eq!(record["variant"], "blog");
        let summary = record["summary"].as_str().unwrap();
        assert!(!summary.contains("AIzaSy"), "{summary}");
        assert!(summary.contains("bearer [REDACTED]"));
        assert!(path.with_file_name(AUDIT_FILE).exists());
        Ok(())
    }

    #[test]
    fn clean_runs_skip_the_audit_log() -> Result<()> {
        let temp = TempDir::new().expect("temp dir");
        let path = log_run_completion(temp.path(), 90, input("post gerado"))?;
        assert!(path.exists());
        assert!(!path.with_file_name(AUDIT_FILE).exists());

        log_run_completion(temp.path(), 90, input("segundo"))?;
        assert_eq!(fs::read_to_string(&path)?.lines().count(), 2);
        Ok(())
    }

    #[test]
    fn long_summaries_are_truncated() {
        let long = "a".repeat(SUMMARY_LIMIT + 10);
        let cut = truncate_summary(&long);
        assert_eq!(cut.chars().count(), SUMMARY_LIMIT + 3);
        assert!(cut.ends_with("..."));
    }
}
