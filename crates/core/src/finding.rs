// Copyright 2025 AuditBench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Findings and their content-derived identifiers.
//!
//! The finding id is the join key for every cross-run metric. It is a hash
//! over `(focus_area, file, title, line)` only, so the same issue reported by
//! two different models, providers or runs collapses to the same id. A model
//! that rewords a title produces a different id; consistency numbers are a
//! conservative lower bound because of that.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Number of hex characters kept from the SHA-256 digest.
pub const FINDING_ID_LEN: usize = 12;

/// Severity reported by the audit engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Critical
    Critical,
    /// High
    High,
    /// Medium
    Medium,
    /// Low
    Low,
    /// Informational
    Info,
    /// Anything the engine emitted that we do not recognise
    #[serde(other)]
    Unknown,
}

impl Severity {
    /// Parse a severity leniently; unrecognised strings map to `Unknown`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "critical" => Self::Critical,
            "high" => Self::High,
            "medium" => Self::Medium,
            "low" => Self::Low,
            "info" | "informational" => Self::Info,
            _ => Self::Unknown,
        }
    }

    /// Whether this severity counts toward the high-severity rate.
    pub fn is_high(&self) -> bool {
        matches!(self, Self::Critical | Self::High)
    }

    /// Lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Info => "info",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One reported issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// Content-derived id, see [`finding_id`]
    pub id: String,
    /// Repository-relative file path
    pub file: String,
    /// Short title
    pub title: String,
    /// Line number, when the engine reported one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    /// Severity
    pub severity: Severity,
    /// Focus area the finding belongs to
    pub focus_area: String,
    /// Longer description
    #[serde(default)]
    pub description: String,
    /// Suggested remediation text, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl Finding {
    /// Build a finding, deriving its id from the identifying fields.
    pub fn new(
        file: impl Into<String>,
        title: impl Into<String>,
        line: Option<u32>,
        severity: Severity,
        focus_area: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        let file = file.into();
        let title = title.into();
        let focus_area = focus_area.into();
        Self {
            id: finding_id(&file, &title, line, &focus_area),
            file,
            title,
            line,
            severity,
            focus_area,
            description: description.into(),
            suggestion: None,
        }
    }

    /// Attach a suggestion.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

/// Stable id over `(file, title, line, focus_area)`.
///
/// Hashes `"{focus_area}:{file}:{title}:{line}"` with SHA-256 (an absent line
/// renders as the empty string) and keeps the first [`FINDING_ID_LEN`] hex
/// characters.
pub fn finding_id(file: &str, title: &str, line: Option<u32>, focus_area: &str) -> String {
    let line = line.map(|l| l.to_string()).unwrap_or_default();
    let key = format!("{focus_area}:{file}:{title}:{line}");
    let digest = Sha256::digest(key.as_bytes());
    let mut id = hex::encode(digest);
    id.truncate(FINDING_ID_LEN);
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finding_id_is_deterministic() {
        let a = finding_id("auth.py", "SQL injection", Some(10), "security");
        let b = finding_id("auth.py", "SQL injection", Some(10), "security");
        assert_eq!(a, b);
        assert_eq!(a.len(), FINDING_ID_LEN);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_finding_id_depends_on_every_field() {
        let base = finding_id("auth.py", "SQL injection", Some(10), "security");
        assert_ne!(base, finding_id("api.py", "SQL injection", Some(10), "security"));
        assert_ne!(base, finding_id("auth.py", "SQL Injection", Some(10), "security"));
        assert_ne!(base, finding_id("auth.py", "SQL injection", Some(11), "security"));
        assert_ne!(base, finding_id("auth.py", "SQL injection", None, "security"));
        assert_ne!(base, finding_id("auth.py", "SQL injection", Some(10), "testing"));
    }

    #[test]
    fn test_finding_id_ignores_non_identifying_fields() {
        let a = Finding::new("a.py", "Leak", Some(3), Severity::High, "security", "one");
        let b = Finding::new("a.py", "Leak", Some(3), Severity::Low, "security", "two")
            .with_suggestion("fix it");
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn test_severity_parse_and_high() {
        assert_eq!(Severity::parse("HIGH"), Severity::High);
        assert_eq!(Severity::parse(" critical "), Severity::Critical);
        assert_eq!(Severity::parse("bogus"), Severity::Unknown);
        assert!(Severity::Critical.is_high());
        assert!(Severity::High.is_high());
        assert!(!Severity::Medium.is_high());
    }

    #[test]
    fn test_severity_deserializes_unknown() {
        let sev: Severity = serde_json::from_str("\"catastrophic\"").unwrap();
        assert_eq!(sev, Severity::Unknown);
        let sev: Severity = serde_json::from_str("\"medium\"").unwrap();
        assert_eq!(sev, Severity::Medium);
    }
}
