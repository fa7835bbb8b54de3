// Copyright 2025 AuditBench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Experiment matrix.
//!
//! The matrix is the Cartesian product of repositories, models, focus tiers,
//! pre-pass conditions and repetitions, enumerated in that order so repeated
//! planning over the same configuration yields the same sequence.

use auditbench_core::{ConfigError, ExperimentConfig, ModelRef, ResultRecord, RunSpec};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

/// Restricts the matrix to a subset of each axis.
///
/// Empty lists select every configured value. Every named value must exist
/// in the configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatrixFilter {
    /// Repository names
    pub repositories: Vec<String>,
    /// `provider:model` or bare model names
    pub models: Vec<String>,
    /// Focus tier names
    pub focus_tiers: Vec<String>,
    /// Run only this repetition
    pub repetition: Option<u32>,
    /// Override the configured repetition count
    pub repetitions: Option<u32>,
    /// Run only this pre-pass condition
    pub prepass: Option<bool>,
}

impl MatrixFilter {
    /// Whether the filter selects everything.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// An ordered list of cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matrix {
    cells: Vec<RunSpec>,
}

fn select_axis<'a, T>(
    axis: &'static str,
    available: &'a [T],
    wanted: &[String],
    label: impl Fn(&T) -> String,
    matches: impl Fn(&T, &str) -> bool,
) -> Result<Vec<&'a T>, ConfigError> {
    if wanted.is_empty() {
        return Ok(available.iter().collect());
    }
    for value in wanted {
        if !available.iter().any(|item| matches(item, value.as_str())) {
            return Err(ConfigError::UnknownAxisValue {
                axis,
                value: value.clone(),
                available: available.iter().map(&label).collect::<Vec<_>>().join(", "),
            });
        }
    }
    Ok(available
        .iter()
        .filter(|item| wanted.iter().any(|value| matches(*item, value.as_str())))
        .collect())
}

fn model_matches(model: &ModelRef, value: &str) -> bool {
    match value.parse::<ModelRef>() {
        Ok(wanted) if value.contains(':') => *model == wanted,
        _ => model.model == value,
    }
}

impl Matrix {
    /// Every cell of the configured matrix.
    pub fn full(config: &ExperimentConfig) -> Result<Self, ConfigError> {
        Self::plan(config, &MatrixFilter::default())
    }

    /// Cells selected by `filter`.
    ///
    /// Fails with [`ConfigError::UnknownAxisValue`] when the filter names a
    /// value the configuration does not define.
    pub fn plan(config: &ExperimentConfig, filter: &MatrixFilter) -> Result<Self, ConfigError> {
        let repositories = select_axis(
            "repository",
            &config.repositories,
            &filter.repositories,
            |r| r.name.clone(),
            |r, v| r.name == v,
        )?;
        let all_models = config.model_refs()?;
        let models = select_axis(
            "model",
            &all_models,
            &filter.models,
            |m| m.to_string(),
            model_matches,
        )?;
        let tiers = select_axis(
            "focus tier",
            &config.focus_tiers,
            &filter.focus_tiers,
            |t| t.name.clone(),
            |t, v| t.name == v,
        )?;

        let mut conditions = config.prepass_conditions();
        if let Some(prepass) = filter.prepass {
            if !conditions.contains(&prepass) {
                return Err(ConfigError::UnknownAxisValue {
                    axis: "prepass condition",
                    value: prepass.to_string(),
                    available: conditions
                        .iter()
                        .map(bool::to_string)
                        .collect::<Vec<_>>()
                        .join(", "),
                });
            }
            conditions = vec![prepass];
        }

        let count = filter.repetitions.unwrap_or(config.repetitions);
        if count == 0 {
            return Err(ConfigError::Invalid("repetitions must be at least 1".into()));
        }
        let repetitions: Vec<u32> = match filter.repetition {
            Some(rep) if (1..=count).contains(&rep) => vec![rep],
            Some(rep) => {
                return Err(ConfigError::UnknownAxisValue {
                    axis: "repetition",
                    value: rep.to_string(),
                    available: format!("1..={count}"),
                })
            }
            None => (1..=count).collect(),
        };

        let mut cells = Vec::with_capacity(
            repositories.len() * models.len() * tiers.len() * conditions.len() * repetitions.len(),
        );
        for repo in &repositories {
            for model in &models {
                for tier in &tiers {
                    for prepass in &conditions {
                        for rep in &repetitions {
                            cells.push(RunSpec::new(
                                repo.name.clone(),
                                (*model).clone(),
                                tier.name.clone(),
                                *prepass,
                                *rep,
                            ));
                        }
                    }
                }
            }
        }
        Ok(Self { cells })
    }

    /// Cells in enumeration order.
    pub fn cells(&self) -> &[RunSpec] {
        &self.cells
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether the matrix is empty.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Distinct repositories in enumeration order.
    pub fn repositories(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.cells
            .iter()
            .map(|c| c.repository.as_str())
            .filter(|r| seen.insert(*r))
            .collect()
    }

    /// Cells with no record among `records`.
    pub fn missing<'a>(&'a self, records: &[ResultRecord]) -> Vec<&'a RunSpec> {
        let present: HashSet<_> = records.iter().map(|r| r.spec.result_id()).collect();
        self.cells
            .iter()
            .filter(|c| !present.contains(&c.result_id()))
            .collect()
    }

    /// Per-repository progress against `records`.
    ///
    /// Records for cells outside this matrix are ignored.
    pub fn coverage(&self, records: &[ResultRecord]) -> Vec<RepoCoverage> {
        let by_id: BTreeMap<_, _> = records.iter().map(|r| (r.spec.result_id(), r)).collect();
        let mut rows: Vec<RepoCoverage> = self
            .repositories()
            .into_iter()
            .map(RepoCoverage::new)
            .collect();

        for cell in &self.cells {
            let Some(row) = rows.iter_mut().find(|r| r.repository == cell.repository) else {
                continue;
            };
            row.expected += 1;
            match by_id.get(&cell.result_id()) {
                None => row.missing += 1,
                Some(record) if record.dry_run => row.dry_run += 1,
                Some(record) if record.is_success() => row.succeeded += 1,
                Some(_) => row.failed += 1,
            }
        }
        rows
    }
}

/// Progress of one repository's cells.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepoCoverage {
    /// Repository
    pub repository: String,
    /// Cells in the matrix
    pub expected: usize,
    /// Successful records
    pub succeeded: usize,
    /// Failed records
    pub failed: usize,
    /// Dry-run placeholders
    pub dry_run: usize,
    /// Cells with no record
    pub missing: usize,
}

impl RepoCoverage {
    fn new(repository: &str) -> Self {
        Self {
            repository: repository.to_string(),
            expected: 0,
            succeeded: 0,
            failed: 0,
            dry_run: 0,
            missing: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use auditbench_core::ExitStatus;
    use uuid::Uuid;

    fn config() -> ExperimentConfig {
        let mut config = ExperimentConfig::default();
        config.repositories.truncate(2);
        config.models = vec![
            "gemini:gemini-2.0-flash".to_string(),
            "anthropic:claude-sonnet-4-5".to_string(),
        ];
        config.focus_tiers.truncate(2);
        config.repetitions = 2;
        config.prepass_variants = vec![false, true];
        config
    }

    #[test]
    fn test_full_matrix_order() {
        let config = config();
        let matrix = Matrix::full(&config).unwrap();
        assert_eq!(matrix.len(), 2 * 2 * 2 * 2 * 2);

        let cells = matrix.cells();
        let first_repo = &config.repositories[0].name;
        assert!(cells[..16].iter().all(|c| &c.repository == first_repo));
        assert_eq!(cells[0].repetition, 1);
        assert_eq!(cells[1].repetition, 2);
        assert!(!cells[1].prepass);
        assert!(cells[2].prepass);
        assert_eq!(cells[4].focus_tier, config.focus_tiers[1].name);
        assert_eq!(cells[8].model_name(), "claude-sonnet-4-5");

        let ids: HashSet<_> = cells.iter().map(RunSpec::result_id).collect();
        assert_eq!(ids.len(), cells.len());
    }

    #[test]
    fn test_plan_is_deterministic() {
        let config = config();
        assert_eq!(Matrix::full(&config).unwrap(), Matrix::full(&config).unwrap());
    }

    #[test]
    fn test_filter_by_bare_model_and_repetition() {
        let config = config();
        let filter = MatrixFilter {
            models: vec!["gemini-2.0-flash".into()],
            repetition: Some(2),
            prepass: Some(false),
            ..Default::default()
        };
        let matrix = Matrix::plan(&config, &filter).unwrap();
        assert_eq!(matrix.len(), 2 * 2);
        assert!(matrix
            .cells()
            .iter()
            .all(|c| c.provider() == "gemini" && c.repetition == 2 && !c.prepass));
    }

    #[test]
    fn test_filter_by_qualified_model() {
        let config = config();
        let filter = MatrixFilter {
            models: vec!["anthropic:claude-sonnet-4-5".into()],
            focus_tiers: vec![config.focus_tiers[0].name.clone()],
            ..Default::default()
        };
        let matrix = Matrix::plan(&config, &filter).unwrap();
        assert_eq!(matrix.len(), 2 * 2 * 2);

        let wrong_provider = MatrixFilter {
            models: vec!["openai:claude-sonnet-4-5".into()],
            ..Default::default()
        };
        assert!(Matrix::plan(&config, &wrong_provider).is_err());
    }

    #[test]
    fn test_unknown_filter_values_are_rejected() {
        let config = config();
        let cases = [
            MatrixFilter {
                repositories: vec!["nope".into()],
                ..Default::default()
            },
            MatrixFilter {
                models: vec!["gpt-0".into()],
                ..Default::default()
            },
            MatrixFilter {
                focus_tiers: vec!["style".into()],
                ..Default::default()
            },
            MatrixFilter {
                repetition: Some(3),
                ..Default::default()
            },
        ];
        for filter in cases {
            let err = Matrix::plan(&config, &filter).unwrap_err();
            assert!(matches!(err, ConfigError::UnknownAxisValue { .. }), "{filter:?}");
        }
    }

    #[test]
    fn test_repetition_override() {
        let config = config();
        let filter = MatrixFilter {
            repetitions: Some(1),
            prepass: Some(true),
            ..Default::default()
        };
        let matrix = Matrix::plan(&config, &filter).unwrap();
        assert_eq!(matrix.len(), 2 * 2 * 2);
        assert!(matrix.cells().iter().all(|c| c.repetition == 1 && c.prepass));
    }

    #[test]
    fn test_coverage_and_missing() {
        let mut config = config();
        config.repositories.truncate(1);
        config.prepass_variants = vec![false];
        config.models.truncate(1);
        config.focus_tiers.truncate(1);
        let matrix = Matrix::full(&config).unwrap();
        assert_eq!(matrix.len(), 2);

        let ok = ResultRecord::new(matrix.cells()[0].clone(), Uuid::new_v4());
        let stray = ResultRecord::new(
            RunSpec::new("other", ModelRef::new("x", "y"), "security", false, 1),
            Uuid::new_v4(),
        )
        .with_exit(ExitStatus::failed("boom"));
        let records = vec![ok, stray];

        let missing = matrix.missing(&records);
        assert_eq!(missing, vec![&matrix.cells()[1]]);

        let coverage = matrix.coverage(&records);
        assert_eq!(coverage.len(), 1);
        assert_eq!(coverage[0].expected, 2);
        assert_eq!(coverage[0].succeeded, 1);
        assert_eq!(coverage[0].failed, 0);
        assert_eq!(coverage[0].missing, 1);
    }
}
