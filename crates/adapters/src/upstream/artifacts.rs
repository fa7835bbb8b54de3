// Copyright 2025 AuditBench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Engine artifact contract (version 1).
//!
//! After each invocation the engine is expected to have written two files at
//! the paths the workspace handed it:
//!
//! - **findings**: a JSON object `{"findings": [{file, title, line?, severity,
//!   focus_area?, description?, suggestion?, id?}, ...]}`
//! - **cost ledger**: JSON lines, one entry per provider call; the last entry
//!   holds `{input_tokens, output_tokens, cache_read_tokens, cost_estimate}`
//!
//! Both readers are total: a missing or malformed artifact degrades to empty /
//! zero values and reports its [`ArtifactStatus`] instead of failing. Finding
//! ids supplied by the engine are ignored; ids are always re-derived with
//! [`finding_id`](auditbench_core::finding_id) so they are comparable across
//! engines.

use auditbench_core::{ArtifactStatus, Finding, Severity, TokenUsage};
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, warn};

/// Artifact contract version written into every scoped config.
pub const CONTRACT_VERSION: u32 = 1;

/// Result of reading the findings artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct FindingsArtifact {
    /// Read status
    pub status: ArtifactStatus,
    /// Findings with re-derived ids
    pub findings: Vec<Finding>,
    /// Entries skipped because `file` or `title` was missing
    pub dropped: usize,
}

impl FindingsArtifact {
    fn degraded(status: ArtifactStatus) -> Self {
        Self {
            status,
            findings: Vec::new(),
            dropped: 0,
        }
    }
}

/// Result of reading the cost ledger.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UsageArtifact {
    /// Read status
    pub status: ArtifactStatus,
    /// Token usage from the last entry
    pub usage: TokenUsage,
    /// Engine-side cost estimate from the last entry
    pub cost_estimate: Option<f64>,
}

impl UsageArtifact {
    fn degraded(status: ArtifactStatus) -> Self {
        Self {
            status,
            usage: TokenUsage::default(),
            cost_estimate: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawFindingsFile {
    #[serde(default)]
    findings: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RawFinding {
    file: Option<String>,
    title: Option<String>,
    #[serde(default)]
    line: serde_json::Value,
    #[serde(default)]
    severity: Option<String>,
    #[serde(default, alias = "focus")]
    focus_area: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    suggestion: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LedgerEntry {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
    #[serde(default)]
    cache_read_tokens: u64,
    #[serde(default)]
    cost_estimate: Option<f64>,
}

fn read_optional(path: &Path) -> Result<Option<String>, io::Error> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

fn parse_line(value: &serde_json::Value) -> Option<u32> {
    match value {
        serde_json::Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Read the findings artifact.
///
/// Findings without a `focus_area` inherit `default_focus` (the cell's focus
/// tier).
pub fn read_findings(path: &Path, default_focus: &str) -> FindingsArtifact {
    let content = match read_optional(path) {
        Ok(Some(content)) => content,
        Ok(None) => {
            debug!(path = %path.display(), "Findings artifact missing");
            return FindingsArtifact::degraded(ArtifactStatus::Missing);
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Findings artifact unreadable");
            return FindingsArtifact::degraded(ArtifactStatus::Malformed);
        }
    };

    let raw: RawFindingsFile = match serde_json::from_str(&content) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Findings artifact malformed");
            return FindingsArtifact::degraded(ArtifactStatus::Malformed);
        }
    };

    let mut findings = Vec::with_capacity(raw.findings.len());
    let mut dropped = 0;
    for value in raw.findings {
        let entry: RawFinding = match serde_json::from_value(value) {
            Ok(entry) => entry,
            Err(_) => {
                dropped += 1;
                continue;
            }
        };
        let (Some(file), Some(title)) = (entry.file, entry.title) else {
            dropped += 1;
            continue;
        };
        let focus = entry
            .focus_area
            .filter(|f| !f.trim().is_empty())
            .unwrap_or_else(|| default_focus.to_string());
        let severity = entry
            .severity
            .as_deref()
            .map(Severity::parse)
            .unwrap_or(Severity::Unknown);

        let mut finding = Finding::new(
            file,
            title,
            parse_line(&entry.line),
            severity,
            focus,
            entry.description.unwrap_or_default(),
        );
        finding.suggestion = entry.suggestion;
        findings.push(finding);
    }

    if dropped > 0 {
        warn!(path = %path.display(), dropped, "Skipped findings without file or title");
    }

    FindingsArtifact {
        status: ArtifactStatus::Present,
        findings,
        dropped,
    }
}

/// Read the last well-formed entry of the cost ledger.
///
/// Trailing lines that fail to parse (a truncated append) are skipped with a
/// warning; the ledger is `Malformed` only when no line parses.
pub fn read_cost_ledger(path: &Path) -> UsageArtifact {
    let content = match read_optional(path) {
        Ok(Some(content)) => content,
        Ok(None) => {
            debug!(path = %path.display(), "Cost ledger missing");
            return UsageArtifact::degraded(ArtifactStatus::Missing);
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Cost ledger unreadable");
            return UsageArtifact::degraded(ArtifactStatus::Malformed);
        }
    };

    let mut lines = content.lines().rev().filter(|l| !l.trim().is_empty()).peekable();
    if lines.peek().is_none() {
        return UsageArtifact::degraded(ArtifactStatus::Missing);
    }

    for line in lines {
        match serde_json::from_str::<LedgerEntry>(line) {
            Ok(entry) => {
                return UsageArtifact {
                    status: ArtifactStatus::Present,
                    usage: TokenUsage::new(
                        entry.input_tokens,
                        entry.output_tokens,
                        entry.cache_read_tokens,
                    ),
                    cost_estimate: entry.cost_estimate.filter(|c| c.is_finite() && *c >= 0.0),
                };
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping malformed cost ledger entry");
            }
        }
    }

    UsageArtifact::degraded(ArtifactStatus::Malformed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use auditbench_core::finding_id;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_read_findings_rederives_ids() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "findings.json",
            r#"{"findings": [
                {"id": "engine-made", "file": "auth.py", "title": "SQL injection", "line": 10,
                 "severity": "high", "focus": "security", "description": "d"},
                {"file": "api.py", "title": "No timeout", "line": "42", "severity": "MEDIUM"}
            ]}"#,
        );

        let artifact = read_findings(&path, "does_it_work");
        assert_eq!(artifact.status, ArtifactStatus::Present);
        assert_eq!(artifact.findings.len(), 2);

        let first = &artifact.findings[0];
        assert_eq!(first.id, finding_id("auth.py", "SQL injection", Some(10), "security"));
        assert_eq!(first.severity, Severity::High);

        let second = &artifact.findings[1];
        assert_eq!(second.line, Some(42));
        assert_eq!(second.focus_area, "does_it_work");
        assert_eq!(second.severity, Severity::Medium);
    }

    #[test]
    fn test_read_findings_drops_incomplete_entries() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "findings.json",
            r#"{"findings": [{"file": "a.py"}, {"title": "t"}, 7, {"file": "b.py", "title": "ok"}]}"#,
        );
        let artifact = read_findings(&path, "security");
        assert_eq!(artifact.findings.len(), 1);
        assert_eq!(artifact.dropped, 3);
        assert_eq!(artifact.findings[0].severity, Severity::Unknown);
        assert_eq!(artifact.findings[0].line, None);
    }

    #[test]
    fn test_read_findings_missing_and_malformed() {
        let dir = TempDir::new().unwrap();
        let missing = read_findings(&dir.path().join("nope.json"), "security");
        assert_eq!(missing.status, ArtifactStatus::Missing);
        assert!(missing.findings.is_empty());

        let path = write(&dir, "bad.json", "{not json");
        let malformed = read_findings(&path, "security");
        assert_eq!(malformed.status, ArtifactStatus::Malformed);
        assert!(malformed.findings.is_empty());
    }

    #[test]
    fn test_read_findings_empty_object_is_present() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "f.json", "{}");
        let artifact = read_findings(&path, "security");
        assert_eq!(artifact.status, ArtifactStatus::Present);
        assert!(artifact.findings.is_empty());
    }

    #[test]
    fn test_read_cost_ledger_uses_last_entry() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "ledger.jsonl",
            concat!(
                "{\"input_tokens\": 1, \"output_tokens\": 1, \"cost_estimate\": 0.5}\n",
                "{\"input_tokens\": 12000, \"output_tokens\": 800, \"cache_read_tokens\": 300, \"cost_estimate\": 0.0123}\n",
                "\n"
            ),
        );
        let usage = read_cost_ledger(&path);
        assert_eq!(usage.status, ArtifactStatus::Present);
        assert_eq!(usage.usage, TokenUsage::new(12000, 800, 300));
        assert_eq!(usage.cost_estimate, Some(0.0123));
    }

    #[test]
    fn test_read_cost_ledger_degrades() {
        let dir = TempDir::new().unwrap();
        let missing = read_cost_ledger(&dir.path().join("none.jsonl"));
        assert_eq!(missing.status, ArtifactStatus::Missing);
        assert_eq!(missing.usage, TokenUsage::default());

        let empty = read_cost_ledger(&write(&dir, "empty.jsonl", "\n\n"));
        assert_eq!(empty.status, ArtifactStatus::Missing);

        let truncated =
            read_cost_ledger(&write(&dir, "cut.jsonl", "{\"input_tokens\": 5}\n{\"inp"));
        assert_eq!(truncated.status, ArtifactStatus::Present);
        assert_eq!(truncated.usage.input_tokens, 5);
        assert_eq!(truncated.cost_estimate, None);

        let garbage = read_cost_ledger(&write(&dir, "garbage.jsonl", "{\"inp\nnot json\n"));
        assert_eq!(garbage.status, ArtifactStatus::Malformed);
        assert_eq!(garbage.usage, TokenUsage::default());
    }

    #[test]
    fn test_read_cost_ledger_recovers_from_truncated_append() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "ledger.jsonl",
            concat!(
                "{\"input_tokens\": 12000, \"output_tokens\": 800, \"cost_estimate\": 0.05}\n",
                "{\"input_tok"
            ),
        );
        let usage = read_cost_ledger(&path);
        assert_eq!(usage.status, ArtifactStatus::Present);
        assert_eq!(usage.usage, TokenUsage::new(12000, 800, 0));
        assert_eq!(usage.cost_estimate, Some(0.05));
    }
}
