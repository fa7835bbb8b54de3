// Copyright 2025 AuditBench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Persisted outcome of one experiment cell.
//!
//! A [`ResultRecord`] is write-once. Every record has the same shape whether
//! the cell succeeded, failed, or was a dry run, so the aggregator can tell
//! "no issues found" apart from "execution failed" by looking at
//! [`ExitStatus`] and [`ArtifactsHealth`] instead of missing fields.

use crate::finding::{Finding, Severity};
use crate::spec::RunSpec;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use uuid::Uuid;

/// Current record schema version.
pub const RECORD_SCHEMA_VERSION: u32 = 1;

/// Token usage reported by the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Input tokens
    #[serde(default)]
    pub input_tokens: u64,
    /// Output tokens
    #[serde(default)]
    pub output_tokens: u64,
    /// Tokens served from the provider's prompt cache
    #[serde(default)]
    pub cache_read_tokens: u64,
}

impl TokenUsage {
    /// Create a usage sample.
    pub fn new(input_tokens: u64, output_tokens: u64, cache_read_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            cache_read_tokens,
        }
    }

    /// Sum of all token classes.
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens + self.cache_read_tokens
    }
}

/// Whether the engine invocation succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExitStatus {
    /// Exit code zero (or a dry run)
    Success,
    /// Non-zero exit, timeout, spawn or setup failure
    Failure {
        /// Process exit code, when the process ran to completion
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<i32>,
        /// Error detail
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl ExitStatus {
    /// Failure with an error message and no exit code.
    pub fn failed(error: impl Into<String>) -> Self {
        Self::Failure {
            code: None,
            error: Some(error.into()),
        }
    }

    /// Whether this is a success.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// State of one artifact read back from the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactStatus {
    /// Read and parsed
    Present,
    /// Not produced
    #[default]
    Missing,
    /// Produced but unreadable; fields degraded to zero
    Malformed,
}

/// Health of both artifacts for a record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactsHealth {
    /// Findings artifact
    #[serde(default)]
    pub findings: ArtifactStatus,
    /// Cost ledger artifact
    #[serde(default)]
    pub usage: ArtifactStatus,
}

/// Where `cost_usd` came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostSource {
    /// Token usage × configured pricing
    PricingTable,
    /// The engine's own estimate from the cost ledger
    EngineEstimate,
    /// No cost information
    #[default]
    None,
}

/// Findings counted by severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    /// Critical
    #[serde(default)]
    pub critical: u32,
    /// High
    #[serde(default)]
    pub high: u32,
    /// Medium
    #[serde(default)]
    pub medium: u32,
    /// Low
    #[serde(default)]
    pub low: u32,
    /// Info
    #[serde(default)]
    pub info: u32,
    /// Unrecognised
    #[serde(default)]
    pub unknown: u32,
}

impl SeverityCounts {
    /// Count findings by severity.
    pub fn from_findings(findings: &[Finding]) -> Self {
        let mut counts = Self::default();
        for finding in findings {
            let slot = match finding.severity {
                Severity::Critical => &mut counts.critical,
                Severity::High => &mut counts.high,
                Severity::Medium => &mut counts.medium,
                Severity::Low => &mut counts.low,
                Severity::Info => &mut counts.info,
                Severity::Unknown => &mut counts.unknown,
            };
            *slot += 1;
        }
        counts
    }

    /// High plus critical.
    pub fn high_severity(&self) -> u32 {
        self.critical + self.high
    }

    /// Accumulate another set of counts.
    pub fn add(&mut self, other: &Self) {
        self.critical += other.critical;
        self.high += other.high;
        self.medium += other.medium;
        self.low += other.low;
        self.info += other.info;
        self.unknown += other.unknown;
    }
}

/// Persisted outcome of one [`RunSpec`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    /// Record schema version
    pub schema_version: u32,
    /// Cell identity
    #[serde(flatten)]
    pub spec: RunSpec,
    /// Orchestration invocation that produced this record
    pub invocation_id: Uuid,
    /// When the cell finished
    pub timestamp: DateTime<Utc>,
    /// Wall-clock duration of the engine invocation
    pub duration_seconds: f64,
    /// Placeholder record fabricated without invoking the engine
    #[serde(default)]
    pub dry_run: bool,
    /// Engine exit status
    pub exit: ExitStatus,
    /// Artifact read-back health
    #[serde(default)]
    pub artifacts: ArtifactsHealth,
    /// Token usage
    #[serde(default)]
    pub usage: TokenUsage,
    /// Cost in USD
    #[serde(default)]
    pub cost_usd: f64,
    /// Origin of `cost_usd`
    #[serde(default)]
    pub cost_source: CostSource,
    /// Number of findings
    pub findings_count: usize,
    /// Findings by severity
    #[serde(default)]
    pub severity_counts: SeverityCounts,
    /// Findings in engine order
    #[serde(default)]
    pub findings: Vec<Finding>,
}

impl ResultRecord {
    /// A zero-valued successful record for `spec`.
    pub fn new(spec: RunSpec, invocation_id: Uuid) -> Self {
        Self {
            schema_version: RECORD_SCHEMA_VERSION,
            spec,
            invocation_id,
            timestamp: Utc::now(),
            duration_seconds: 0.0,
            dry_run: false,
            exit: ExitStatus::Success,
            artifacts: ArtifactsHealth::default(),
            usage: TokenUsage::default(),
            cost_usd: 0.0,
            cost_source: CostSource::None,
            findings_count: 0,
            severity_counts: SeverityCounts::default(),
            findings: Vec::new(),
        }
    }

    /// Zero-cost placeholder for dry runs.
    pub fn dry_run(spec: RunSpec, invocation_id: Uuid) -> Self {
        Self {
            dry_run: true,
            ..Self::new(spec, invocation_id)
        }
    }

    /// Set the exit status.
    pub fn with_exit(mut self, exit: ExitStatus) -> Self {
        self.exit = exit;
        self
    }

    /// Set the wall-clock duration.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_seconds = duration.as_secs_f64();
        self
    }

    /// Set findings, updating the derived counts.
    pub fn with_findings(mut self, findings: Vec<Finding>) -> Self {
        self.findings_count = findings.len();
        self.severity_counts = SeverityCounts::from_findings(&findings);
        self.findings = findings;
        self
    }

    /// Set usage and cost.
    pub fn with_cost(mut self, usage: TokenUsage, cost_usd: f64, source: CostSource) -> Self {
        self.usage = usage;
        self.cost_usd = cost_usd;
        self.cost_source = source;
        self
    }

    /// Set artifact health.
    pub fn with_artifacts(mut self, artifacts: ArtifactsHealth) -> Self {
        self.artifacts = artifacts;
        self
    }

    /// Whether the engine invocation succeeded.
    pub fn is_success(&self) -> bool {
        self.exit.is_success()
    }

    /// High plus critical findings.
    pub fn high_severity_count(&self) -> u32 {
        self.severity_counts.high_severity()
    }

    /// Set of finding ids.
    pub fn finding_ids(&self) -> BTreeSet<&str> {
        self.findings.iter().map(|f| f.id.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::ModelRef;

    fn spec() -> RunSpec {
        RunSpec::new(
            "requests",
            ModelRef::new("gemini", "gemini-2.0-flash"),
            "security",
            false,
            1,
        )
    }

    #[test]
    fn test_with_findings_updates_counts() {
        let findings = vec![
            Finding::new("a.py", "A", Some(1), Severity::High, "security", ""),
            Finding::new("b.py", "B", None, Severity::Critical, "security", ""),
            Finding::new("c.py", "C", Some(9), Severity::Low, "security", ""),
        ];
        let record = ResultRecord::new(spec(), Uuid::new_v4()).with_findings(findings);
        assert_eq!(record.findings_count, 3);
        assert_eq!(record.high_severity_count(), 2);
        assert_eq!(record.severity_counts.low, 1);
        assert_eq!(record.finding_ids().len(), 3);
    }

    #[test]
    fn test_record_json_shape() {
        let record = ResultRecord::new(spec(), Uuid::nil())
            .with_exit(ExitStatus::Failure {
                code: Some(1),
                error: Some("boom".into()),
            })
            .with_cost(TokenUsage::new(10, 5, 0), 0.001, CostSource::PricingTable);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["repository"], "requests");
        assert_eq!(json["provider"], "gemini");
        assert_eq!(json["model"], "gemini-2.0-flash");
        assert_eq!(json["focus_tier"], "security");
        assert_eq!(json["repetition"], 1);
        assert_eq!(json["exit"]["status"], "failure");
        assert_eq!(json["exit"]["code"], 1);
        assert_eq!(json["cost_source"], "pricing_table");
        assert_eq!(json["artifacts"]["findings"], "missing");

        let back: ResultRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_dry_run_is_zero_valued_success() {
        let record = ResultRecord::dry_run(spec(), Uuid::new_v4());
        assert!(record.dry_run);
        assert!(record.is_success());
        assert_eq!(record.cost_usd, 0.0);
        assert!(record.findings.is_empty());
    }
}
