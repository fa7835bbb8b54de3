// Copyright 2025 AuditBench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Scorecard aggregator.
//!
//! Reduces a [`Snapshot`] of result records into an [`AggregateView`]:
//! per-cell projections, per-group averages and consistency, per-model
//! roll-ups, cross-model unique findings and pre-pass deltas.
//!
//! Dry-run placeholders are excluded from every metric. Averages and
//! consistency use successful records only, and any metric without a valid
//! denominator is reported as [`Measure::NotComputable`] rather than a
//! numeric default.

use crate::io::{Snapshot, UnreadableRecord};
use crate::matrix::Matrix;
use auditbench_core::pricing::BATCH_DISCOUNT;
use auditbench_core::{
    ExitStatus, Measure, ResultRecord, RunSpec, SeverityCounts, TokenUsage, Unmeasurable,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Jaccard similarity `|A ∩ B| / |A ∪ B|`.
///
/// Two empty sets are identical, so their similarity is `1`.
pub fn jaccard(a: &BTreeSet<&str>, b: &BTreeSet<&str>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 1.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Mean pairwise Jaccard similarity over the successful records of one group.
pub fn consistency(records: &[&ResultRecord]) -> Measure {
    let sets: Vec<BTreeSet<&str>> = records
        .iter()
        .filter(|r| r.is_success() && !r.dry_run)
        .map(|r| r.finding_ids())
        .collect();
    if sets.len() < 2 {
        return Measure::not_computable(Unmeasurable::InsufficientRepetitions);
    }

    let mut scores = Vec::with_capacity(sets.len() * (sets.len() - 1) / 2);
    for (i, a) in sets.iter().enumerate() {
        for b in &sets[i + 1..] {
            scores.push(jaccard(a, b));
        }
    }
    Measure::mean(&scores, Unmeasurable::InsufficientRepetitions)
}

/// Cost per finding for one record.
pub fn cost_per_finding(record: &ResultRecord) -> Measure {
    Measure::ratio(
        record.cost_usd,
        record.findings_count as f64,
        Unmeasurable::ZeroFindings,
    )
}

/// Identity of a group of repetitions.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct GroupKey {
    /// Repository
    pub repository: String,
    /// Provider
    pub provider: String,
    /// Model
    pub model: String,
    /// Focus tier
    pub focus_tier: String,
    /// Pre-pass condition
    pub prepass: bool,
}

impl From<&RunSpec> for GroupKey {
    fn from(spec: &RunSpec) -> Self {
        Self {
            repository: spec.repository.clone(),
            provider: spec.provider().to_string(),
            model: spec.model_name().to_string(),
            focus_tier: spec.focus_tier.clone(),
            prepass: spec.prepass,
        }
    }
}

/// Direct projection of one record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellMetrics {
    /// Result identity
    pub cell: String,
    /// Cell spec
    #[serde(flatten)]
    pub spec: RunSpec,
    /// Whether the engine succeeded
    pub success: bool,
    /// Failure detail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Findings
    pub findings_count: usize,
    /// Findings by severity
    pub severity_counts: SeverityCounts,
    /// Cost in USD
    pub cost_usd: f64,
    /// Wall-clock seconds
    pub duration_seconds: f64,
    /// Token usage
    pub usage: TokenUsage,
    /// Cost divided by findings
    pub cost_per_finding_usd: Measure,
}

impl CellMetrics {
    fn from_record(record: &ResultRecord) -> Self {
        let error = match &record.exit {
            ExitStatus::Success => None,
            ExitStatus::Failure { code, error } => Some(match (code, error) {
                (_, Some(error)) => error.clone(),
                (Some(code), None) => format!("exit code {code}"),
                (None, None) => "failed".to_string(),
            }),
        };
        Self {
            cell: record.spec.result_id().to_string(),
            spec: record.spec.clone(),
            success: record.is_success(),
            error,
            findings_count: record.findings_count,
            severity_counts: record.severity_counts,
            cost_usd: record.cost_usd,
            duration_seconds: record.duration_seconds,
            usage: record.usage,
            cost_per_finding_usd: cost_per_finding(record),
        }
    }
}

/// Averages over the repetitions of one group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupMetrics {
    /// Group identity
    #[serde(flatten)]
    pub key: GroupKey,
    /// Records in the group
    pub records: usize,
    /// Successful records
    pub succeeded: usize,
    /// Failed records
    pub failed: usize,
    /// Mean findings
    pub avg_findings: Measure,
    /// Mean high-plus-critical findings
    pub avg_high_severity: Measure,
    /// Mean cost
    pub avg_cost_usd: Measure,
    /// Mean cost at batch pricing
    pub avg_batch_cost_usd: Measure,
    /// Mean duration
    pub avg_duration_seconds: Measure,
    /// Mean input tokens
    pub avg_input_tokens: Measure,
    /// Mean output tokens
    pub avg_output_tokens: Measure,
    /// Total cost over total findings
    pub cost_per_finding_usd: Measure,
    /// Mean pairwise Jaccard similarity
    pub consistency: Measure,
}

struct Pooled<'a> {
    ok: Vec<&'a ResultRecord>,
    failed: usize,
}

impl<'a> Pooled<'a> {
    fn new(records: &[&'a ResultRecord]) -> Self {
        let ok: Vec<_> = records.iter().copied().filter(|r| r.is_success()).collect();
        let failed = records.len() - ok.len();
        Self { ok, failed }
    }

    fn mean(&self, f: impl Fn(&ResultRecord) -> f64) -> Measure {
        let values: Vec<f64> = self.ok.iter().map(|&r| f(r)).collect();
        Measure::mean(&values, Unmeasurable::NoRecords)
    }

    fn total(&self, f: impl Fn(&ResultRecord) -> f64) -> f64 {
        self.ok.iter().map(|&r| f(r)).sum()
    }

    /// Pooled ratio over successful records.
    fn ratio(
        &self,
        num: impl Fn(&ResultRecord) -> f64,
        den: impl Fn(&ResultRecord) -> f64,
    ) -> Measure {
        if self.ok.is_empty() {
            return Measure::not_computable(Unmeasurable::NoRecords);
        }
        Measure::ratio(self.total(num), self.total(den), Unmeasurable::ZeroFindings)
    }
}

fn findings(r: &ResultRecord) -> f64 {
    r.findings_count as f64
}

fn high_severity(r: &ResultRecord) -> f64 {
    f64::from(r.high_severity_count())
}

impl GroupMetrics {
    fn compute(key: GroupKey, records: &[&ResultRecord]) -> Self {
        let pooled = Pooled::new(records);
        Self {
            key,
            records: records.len(),
            succeeded: pooled.ok.len(),
            failed: pooled.failed,
            avg_findings: pooled.mean(findings),
            avg_high_severity: pooled.mean(high_severity),
            avg_cost_usd: pooled.mean(|r| r.cost_usd),
            avg_batch_cost_usd: pooled.mean(|r| r.cost_usd * BATCH_DISCOUNT),
            avg_duration_seconds: pooled.mean(|r| r.duration_seconds),
            avg_input_tokens: pooled.mean(|r| r.usage.input_tokens as f64),
            avg_output_tokens: pooled.mean(|r| r.usage.output_tokens as f64),
            cost_per_finding_usd: pooled.ratio(|r| r.cost_usd, findings),
            consistency: consistency(records),
        }
    }
}

/// Roll-up of one provider/model across every cell present.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelRollup {
    /// Provider
    pub provider: String,
    /// Model
    pub model: String,
    /// Records contributing
    pub records: usize,
    /// Successful records
    pub succeeded: usize,
    /// Failed records
    pub failed: usize,
    /// Mean findings per successful record
    pub avg_findings: Measure,
    /// Mean cost per successful record
    pub avg_cost_usd: Measure,
    /// Mean duration per successful record
    pub avg_duration_seconds: Measure,
    /// High-plus-critical findings over all findings
    pub high_severity_rate: Measure,
    /// Total cost over total findings
    pub cost_per_finding_usd: Measure,
    /// Mean of the computable group consistencies
    pub consistency: Measure,
    /// Findings attributed uniquely to this model
    pub unique_findings: usize,
}

/// One model's side of a unique-findings comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelUniqueSet {
    /// Provider
    pub provider: String,
    /// Model
    pub model: String,
    /// Distinct finding ids across the model's repetitions
    pub found: usize,
    /// Ids no other model reported, sorted
    pub unique: Vec<String>,
}

/// Unique-finding attribution for one repository and focus tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UniqueFindings {
    /// Repository
    pub repository: String,
    /// Focus tier
    pub focus_tier: String,
    /// Pre-pass condition
    pub prepass: bool,
    /// Per-model attribution, sorted by provider and model
    pub models: Vec<ModelUniqueSet>,
}

/// Attribute finding ids that exactly one model reported.
///
/// Records are grouped by `(repository, focus_tier, prepass)`. Per model the
/// ids of its successful records are unioned across repetitions; a model's
/// unique set is its union minus the union of every other model's.
pub fn unique_findings(records: &[&ResultRecord]) -> Vec<UniqueFindings> {
    type ModelKey = (String, String);
    let mut cells: BTreeMap<(String, String, bool), BTreeMap<ModelKey, BTreeSet<&str>>> =
        BTreeMap::new();

    for record in records.iter().filter(|r| r.is_success() && !r.dry_run) {
        let spec = &record.spec;
        cells
            .entry((spec.repository.clone(), spec.focus_tier.clone(), spec.prepass))
            .or_default()
            .entry((spec.provider().to_string(), spec.model_name().to_string()))
            .or_default()
            .extend(record.finding_ids());
    }

    cells
        .into_iter()
        .map(|((repository, focus_tier, prepass), by_model)| {
            let models = by_model
                .iter()
                .map(|(key, own)| {
                    let others: BTreeSet<&str> = by_model
                        .iter()
                        .filter(|(other, _)| *other != key)
                        .flat_map(|(_, ids)| ids.iter().copied())
                        .collect();
                    ModelUniqueSet {
                        provider: key.0.clone(),
                        model: key.1.clone(),
                        found: own.len(),
                        unique: own.difference(&others).map(|id| id.to_string()).collect(),
                    }
                })
                .collect();
            UniqueFindings {
                repository,
                focus_tier,
                prepass,
                models,
            }
        })
        .collect()
}

/// Averages for one pre-pass condition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConditionStats {
    /// Successful records averaged
    pub records: usize,
    /// Mean input tokens
    pub avg_input_tokens: f64,
    /// Mean cost
    pub avg_cost_usd: f64,
    /// Mean findings
    pub avg_findings: f64,
    /// Mean high-plus-critical findings
    pub avg_high_severity: f64,
}

impl ConditionStats {
    fn from_records(records: &[&ResultRecord]) -> Option<Self> {
        if records.is_empty() {
            return None;
        }
        let n = records.len() as f64;
        let avg = |f: &dyn Fn(&ResultRecord) -> f64| records.iter().map(|&r| f(r)).sum::<f64>() / n;
        Some(Self {
            records: records.len(),
            avg_input_tokens: avg(&|r| r.usage.input_tokens as f64),
            avg_cost_usd: avg(&|r| r.cost_usd),
            avg_findings: avg(&findings),
            avg_high_severity: avg(&high_severity),
        })
    }
}

/// Differences `with - without`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PrepassDelta {
    /// Input token delta
    pub input_tokens: f64,
    /// Cost delta
    pub cost_usd: f64,
    /// Findings delta
    pub findings: f64,
    /// High-severity delta
    pub high_severity: f64,
}

/// Paired comparison of the two pre-pass conditions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrepassComparison {
    /// Repository
    pub repository: String,
    /// Provider
    pub provider: String,
    /// Model
    pub model: String,
    /// Focus tier
    pub focus_tier: String,
    /// Pre-pass disabled
    pub without: ConditionStats,
    /// Pre-pass enabled
    pub with: ConditionStats,
    /// `with - without`
    pub delta: PrepassDelta,
}

/// Compare pre-pass conditions where both have successful records.
pub fn prepass_comparisons(records: &[&ResultRecord]) -> Vec<PrepassComparison> {
    type Pair<'a> = (Vec<&'a ResultRecord>, Vec<&'a ResultRecord>);
    let mut pairs: BTreeMap<(String, String, String, String), Pair<'_>> = BTreeMap::new();
    for record in records.iter().copied().filter(|r| r.is_success() && !r.dry_run) {
        let spec = &record.spec;
        let entry = pairs
            .entry((
                spec.repository.clone(),
                spec.provider().to_string(),
                spec.model_name().to_string(),
                spec.focus_tier.clone(),
            ))
            .or_default();
        if spec.prepass {
            entry.1.push(record);
        } else {
            entry.0.push(record);
        }
    }

    pairs
        .into_iter()
        .filter_map(|((repository, provider, model, focus_tier), (off, on))| {
            let without = ConditionStats::from_records(&off)?;
            let with = ConditionStats::from_records(&on)?;
            Some(PrepassComparison {
                repository,
                provider,
                model,
                focus_tier,
                delta: PrepassDelta {
                    input_tokens: with.avg_input_tokens - without.avg_input_tokens,
                    cost_usd: with.avg_cost_usd - without.avg_cost_usd,
                    findings: with.avg_findings - without.avg_findings,
                    high_severity: with.avg_high_severity - without.avg_high_severity,
                },
                without,
                with,
            })
        })
        .collect()
}

/// The aggregator's output document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateView {
    /// When the view was built
    pub generated_at: DateTime<Utc>,
    /// Records loaded from the snapshot
    pub records_loaded: usize,
    /// Dry-run records excluded from metrics
    pub dry_run_excluded: usize,
    /// Files that could not be loaded
    pub unreadable: Vec<UnreadableRecord>,
    /// Matrix cells with no record (empty when no matrix was supplied)
    pub missing: Vec<String>,
    /// Per-cell projections
    pub cells: Vec<CellMetrics>,
    /// Per-group metrics
    pub groups: Vec<GroupMetrics>,
    /// Per-model roll-ups
    pub models: Vec<ModelRollup>,
    /// Cross-model unique findings
    pub unique_findings: Vec<UniqueFindings>,
    /// Pre-pass deltas
    pub prepass: Vec<PrepassComparison>,
}

impl AggregateView {
    /// Build the view from one snapshot.
    ///
    /// When `matrix` is given, its cells without a record are listed in
    /// [`AggregateView::missing`].
    pub fn build(snapshot: &Snapshot, matrix: Option<&Matrix>) -> Self {
        let scored: Vec<&ResultRecord> = snapshot.records.iter().filter(|r| !r.dry_run).collect();
        let dry_run_excluded = snapshot.records.len() - scored.len();

        let mut cells: Vec<CellMetrics> =
            scored.iter().map(|&r| CellMetrics::from_record(r)).collect();
        cells.sort_by(|a, b| a.spec.cmp(&b.spec));

        let mut by_group: BTreeMap<GroupKey, Vec<&ResultRecord>> = BTreeMap::new();
        for record in &scored {
            by_group
                .entry(GroupKey::from(&record.spec))
                .or_default()
                .push(*record);
        }
        let groups: Vec<GroupMetrics> = by_group
            .iter()
            .map(|(key, records)| GroupMetrics::compute(key.clone(), records))
            .collect();

        let unique_findings = unique_findings(&scored);
        let models = model_rollups(&scored, &groups, &unique_findings);
        let prepass = prepass_comparisons(&scored);

        let missing = matrix
            .map(|m| {
                m.missing(&snapshot.records)
                    .into_iter()
                    .map(|spec| spec.result_id().to_string())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            generated_at: Utc::now(),
            records_loaded: snapshot.records.len(),
            dry_run_excluded,
            unreadable: snapshot.unreadable.clone(),
            missing,
            cells,
            groups,
            models,
            unique_findings,
            prepass,
        }
    }

    /// Distinct focus tiers in the view, sorted.
    pub fn focus_tiers(&self) -> Vec<&str> {
        let tiers: BTreeSet<&str> = self.groups.iter().map(|g| g.key.focus_tier.as_str()).collect();
        tiers.into_iter().collect()
    }

    /// Distinct repositories in the view, sorted.
    pub fn repositories(&self) -> Vec<&str> {
        let repos: BTreeSet<&str> = self.groups.iter().map(|g| g.key.repository.as_str()).collect();
        repos.into_iter().collect()
    }
}

fn model_rollups(
    records: &[&ResultRecord],
    groups: &[GroupMetrics],
    unique: &[UniqueFindings],
) -> Vec<ModelRollup> {
    let mut by_model: BTreeMap<(&str, &str), Vec<&ResultRecord>> = BTreeMap::new();
    for record in records {
        by_model
            .entry((record.spec.provider(), record.spec.model_name()))
            .or_default()
            .push(*record);
    }

    by_model
        .into_iter()
        .map(|((provider, model), records)| {
            let pooled = Pooled::new(&records);
            let consistencies: Vec<f64> = groups
                .iter()
                .filter(|g| g.key.provider == provider && g.key.model == model)
                .filter_map(|g| g.consistency.value())
                .collect();
            let unique_findings: usize = unique
                .iter()
                .flat_map(|u| u.models.iter())
                .filter(|m| m.provider == provider && m.model == model)
                .map(|m| m.unique.len())
                .sum();

            ModelRollup {
                provider: provider.to_string(),
                model: model.to_string(),
                records: records.len(),
                succeeded: pooled.ok.len(),
                failed: pooled.failed,
                avg_findings: pooled.mean(findings),
                avg_cost_usd: pooled.mean(|r| r.cost_usd),
                avg_duration_seconds: pooled.mean(|r| r.duration_seconds),
                high_severity_rate: pooled.ratio(high_severity, findings),
                cost_per_finding_usd: pooled.ratio(|r| r.cost_usd, findings),
                consistency: Measure::mean(&consistencies, Unmeasurable::InsufficientRepetitions),
                unique_findings,
            }
        })
        .collect()
}
