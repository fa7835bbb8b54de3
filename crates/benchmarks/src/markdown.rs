// Copyright 2025 AuditBench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Markdown rendering of an [`AggregateView`].
//!
//! Tables only. Metrics that are not computable render as `—`.

use crate::scorecard::AggregateView;
use auditbench_core::Measure;
use std::fmt::{self, Write};

const NOT_COMPUTABLE: &str = "—";

fn number(m: &Measure, decimals: usize) -> String {
    match m.value() {
        Some(v) => format!("{v:.decimals$}"),
        None => NOT_COMPUTABLE.to_string(),
    }
}

fn usd(m: &Measure) -> String {
    match m.value() {
        Some(v) => format!("${v:.4}"),
        None => NOT_COMPUTABLE.to_string(),
    }
}

fn percent(m: &Measure) -> String {
    match m.value() {
        Some(v) => format!("{:.0}%", v * 100.0),
        None => NOT_COMPUTABLE.to_string(),
    }
}

fn signed(v: f64, decimals: usize) -> String {
    format!("{v:+.decimals$}")
}

fn model_label(provider: &str, model: &str, prepass: bool) -> String {
    if prepass {
        format!("{provider}:{model} +prepass")
    } else {
        format!("{provider}:{model}")
    }
}

/// Render the scorecard.
pub fn render_scorecard(view: &AggregateView) -> String {
    let mut output = String::new();
    write_scorecard(&mut output, view).ok();
    output
}

fn write_scorecard(output: &mut String, view: &AggregateView) -> fmt::Result {
    writeln!(output, "# AuditBench Scorecard")?;
    writeln!(output)?;
    writeln!(output, "Generated: {}", view.generated_at.to_rfc3339())?;
    writeln!(output)?;
    writeln!(
        output,
        "Records: {} loaded, {} dry-run excluded, {} unreadable, {} missing",
        view.records_loaded,
        view.dry_run_excluded,
        view.unreadable.len(),
        view.missing.len()
    )?;
    writeln!(output)?;

    for tier in view.focus_tiers() {
        writeln!(output, "## Focus tier: {tier}")?;
        writeln!(output)?;
        writeln!(
            output,
            "| Repository | Model | Runs | Avg findings | Avg high | Avg cost | Batch cost | Cost/finding | Consistency | Avg time (s) |"
        )?;
        writeln!(
            output,
            "|------------|-------|------|--------------|----------|----------|------------|--------------|-------------|--------------|"
        )?;
        for group in view.groups.iter().filter(|g| g.key.focus_tier == tier) {
            writeln!(
                output,
                "| {} | {} | {}/{} | {} | {} | {} | {} | {} | {} | {} |",
                group.key.repository,
                model_label(&group.key.provider, &group.key.model, group.key.prepass),
                group.succeeded,
                group.records,
                number(&group.avg_findings, 1),
                number(&group.avg_high_severity, 1),
                usd(&group.avg_cost_usd),
                usd(&group.avg_batch_cost_usd),
                usd(&group.cost_per_finding_usd),
                number(&group.consistency, 2),
                number(&group.avg_duration_seconds, 0),
            )?;
        }
        writeln!(output)?;
    }

    writeln!(output, "## Models")?;
    writeln!(output)?;
    writeln!(
        output,
        "| Model | Runs | Failed | Avg findings | High-severity rate | Avg cost | Cost/finding | Avg time (s) | Consistency | Unique |"
    )?;
    writeln!(
        output,
        "|-------|------|--------|--------------|--------------------|----------|--------------|--------------|-------------|--------|"
    )?;
    for model in &view.models {
        writeln!(
            output,
            "| {} | {} | {} | {} | {} | {} | {} | {} | {} | {} |",
            model_label(&model.provider, &model.model, false),
            model.records,
            model.failed,
            number(&model.avg_findings, 1),
            percent(&model.high_severity_rate),
            usd(&model.avg_cost_usd),
            usd(&model.cost_per_finding_usd),
            number(&model.avg_duration_seconds, 0),
            number(&model.consistency, 2),
            model.unique_findings,
        )?;
    }
    writeln!(output)?;

    if !view.unique_findings.is_empty() {
        writeln!(output, "## Unique findings")?;
        writeln!(output)?;
        for cell in &view.unique_findings {
            let suffix = if cell.prepass { " (prepass)" } else { "" };
            writeln!(output, "### {} / {}{}", cell.repository, cell.focus_tier, suffix)?;
            writeln!(output)?;
            writeln!(output, "| Model | Found | Unique | Unique ids |")?;
            writeln!(output, "|-------|-------|--------|------------|")?;
            for model in &cell.models {
                writeln!(
                    output,
                    "| {} | {} | {} | {} |",
                    model_label(&model.provider, &model.model, false),
                    model.found,
                    model.unique.len(),
                    model.unique.join(", ")
                )?;
            }
            writeln!(output)?;
        }
    }

    if !view.prepass.is_empty() {
        writeln!(output, "## Pre-pass impact")?;
        writeln!(output)?;
        writeln!(
            output,
            "| Repository | Model | Tier | Δ input tokens | Δ cost | Δ findings | Δ high |"
        )?;
        writeln!(
            output,
            "|------------|-------|------|----------------|--------|------------|--------|"
        )?;
        for row in &view.prepass {
            writeln!(
                output,
                "| {} | {} | {} | {} | {} | {} | {} |",
                row.repository,
                model_label(&row.provider, &row.model, false),
                row.focus_tier,
                signed(row.delta.input_tokens, 0),
                signed(row.delta.cost_usd, 4),
                signed(row.delta.findings, 1),
                signed(row.delta.high_severity, 1),
            )?;
        }
        writeln!(output)?;
    }

    let failed: Vec<_> = view.cells.iter().filter(|c| !c.success).collect();
    if !failed.is_empty() {
        writeln!(output, "## Failed cells")?;
        writeln!(output)?;
        for cell in failed {
            writeln!(
                output,
                "- `{}`: {}",
                cell.cell,
                cell.error.as_deref().unwrap_or("failed")
            )?;
        }
        writeln!(output)?;
    }

    if !view.missing.is_empty() {
        writeln!(output, "## Missing cells")?;
        writeln!(output)?;
        for cell in &view.missing {
            writeln!(output, "- `{cell}`")?;
        }
        writeln!(output)?;
    }

    if !view.unreadable.is_empty() {
        writeln!(output, "## Unreadable records")?;
        writeln!(output)?;
        for record in &view.unreadable {
            writeln!(output, "- `{}`: {}", record.path.display(), record.error)?;
        }
        writeln!(output)?;
    }

    writeln!(output, "---")?;
    writeln!(output, "Total cells scored: {}", view.cells.len())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::Snapshot;
    use auditbench_core::{ExitStatus, Finding, ModelRef, ResultRecord, RunSpec, Severity};
    use uuid::Uuid;

    fn record(rep: u32, titles: &[&str]) -> ResultRecord {
        let spec = RunSpec::new(
            "requests",
            ModelRef::new("gemini", "gemini-2.0-flash"),
            "security",
            false,
            rep,
        );
        let findings = titles
            .iter()
            .map(|t| Finding::new("auth.py", *t, None, Severity::High, "security", ""))
            .collect();
        ResultRecord::new(spec, Uuid::nil()).with_findings(findings)
    }

    #[test]
    fn test_render_scorecard_tables() {
        let snapshot = Snapshot {
            records: vec![
                record(1, &["A"]),
                record(2, &[]).with_exit(ExitStatus::failed("quota exceeded")),
            ],
            unreadable: Vec::new(),
        };
        let view = AggregateView::build(&snapshot, None);
        let md = render_scorecard(&view);

        assert!(md.starts_with("# AuditBench Scorecard"));
        assert!(md.contains("## Focus tier: security"));
        assert!(md.contains("| requests | gemini:gemini-2.0-flash | 1/2 | 1.0 |"));
        assert!(md.contains("## Models"));
        assert!(md.contains("| 100% |"));
        assert!(
            md.contains("- `requests/gemini_gemini-2.0-flash_security_run2.json`: quota exceeded")
        );
        assert!(!md.contains("## Pre-pass impact"));
    }

    #[test]
    fn test_not_computable_renders_dash() {
        let snapshot = Snapshot {
            records: vec![record(1, &[])],
            unreadable: Vec::new(),
        };
        let md = render_scorecard(&AggregateView::build(&snapshot, None));
        // Zero findings: cost/finding, consistency and rate are all not computable.
        assert!(md.contains("| $0.0000 | $0.0000 | — | — |"));
        assert!(md.contains("| — |"));
    }

    #[test]
    fn test_measure_formatting() {
        assert_eq!(number(&Measure::computed(0.5), 2), "0.50");
        assert_eq!(percent(&Measure::computed(0.25)), "25%");
        assert_eq!(usd(&Measure::computed(0.01234)), "$0.0123");
        assert_eq!(signed(-3.0, 1), "-3.0");
        assert_eq!(signed(2.0, 0), "+2");
    }
}
