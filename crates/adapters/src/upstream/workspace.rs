// Copyright 2025 AuditBench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Isolated per-cell working environment.
//!
//! Every cell gets a private temporary directory holding its scoped engine
//! config and every path the engine may write to (decision memory, reports,
//! findings, cost ledger). Nothing is shared between cells, so stale decision
//! memory from one run can never leak into the next. The directory is removed
//! when the [`CellWorkspace`] is dropped, on every exit path.

use crate::upstream::artifacts::CONTRACT_VERSION;
use auditbench_core::RunSpec;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// File name of the scoped engine config inside the workspace.
pub const SCOPED_CONFIG_FILE: &str = "auditbench-cell.yml";

/// Paths handed to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    /// Scoped engine config
    pub config: PathBuf,
    /// Findings artifact the engine must write
    pub findings: PathBuf,
    /// Cost ledger the engine appends to
    pub cost_ledger: PathBuf,
    /// Private decision memory
    pub decisions: PathBuf,
    /// Private report output directory
    pub reports_dir: PathBuf,
}

impl ArtifactPaths {
    fn under(root: &Path) -> Self {
        let state = root.join(".state");
        Self {
            config: root.join(SCOPED_CONFIG_FILE),
            findings: state.join("findings.json"),
            cost_ledger: state.join("cost-ledger.jsonl"),
            decisions: state.join("decisions.jsonl"),
            reports_dir: state.join("reports"),
        }
    }
}

#[derive(Debug, Serialize)]
struct ScopedRepo<'a> {
    name: &'a str,
    path: &'a Path,
}

#[derive(Debug, Serialize)]
struct ScopedBudget {
    max_per_run_usd: f64,
}

#[derive(Debug, Serialize)]
struct ScopedPrepass {
    enabled: bool,
}

#[derive(Debug, Serialize)]
struct ScopedArtifacts<'a> {
    findings: &'a Path,
    cost_ledger: &'a Path,
}

#[derive(Debug, Serialize)]
struct ScopedDecisions<'a> {
    path: &'a Path,
}

/// Scoped config: exactly one repository, model and focus tier.
#[derive(Debug, Serialize)]
struct ScopedConfig<'a> {
    contract_version: u32,
    repos: [ScopedRepo<'a>; 1],
    provider: &'a str,
    model: &'a str,
    focus: &'a str,
    focus_areas: &'a [String],
    budget: ScopedBudget,
    prepass: ScopedPrepass,
    decisions: ScopedDecisions<'a>,
    reports_dir: &'a Path,
    artifacts: ScopedArtifacts<'a>,
}

/// A private working directory for one cell.
#[derive(Debug)]
pub struct CellWorkspace {
    dir: TempDir,
    spec: RunSpec,
    repo_path: PathBuf,
    focus_areas: Vec<String>,
    paths: ArtifactPaths,
}

impl CellWorkspace {
    /// Create the directory tree and write the scoped config.
    ///
    /// The workspace lives under `work_root` when given, otherwise under the
    /// system temp directory.
    pub fn create(
        work_root: Option<&Path>,
        spec: &RunSpec,
        repo_path: &Path,
        focus_areas: &[String],
        budget_usd: f64,
    ) -> io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("auditbench-cell-");
        let dir = match work_root {
            Some(root) => {
                fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };

        let paths = ArtifactPaths::under(dir.path());
        fs::create_dir_all(&paths.reports_dir)?;

        let workspace = Self {
            dir,
            spec: spec.clone(),
            repo_path: repo_path.to_path_buf(),
            focus_areas: focus_areas.to_vec(),
            paths,
        };
        workspace.write_scoped_config(budget_usd)?;
        Ok(workspace)
    }

    fn write_scoped_config(&self, budget_usd: f64) -> io::Result<()> {
        let scoped = ScopedConfig {
            contract_version: CONTRACT_VERSION,
            repos: [ScopedRepo {
                name: &self.spec.repository,
                path: &self.repo_path,
            }],
            provider: self.spec.provider(),
            model: self.spec.model_name(),
            focus: &self.spec.focus_tier,
            focus_areas: &self.focus_areas,
            budget: ScopedBudget {
                max_per_run_usd: budget_usd,
            },
            prepass: ScopedPrepass {
                enabled: self.spec.prepass,
            },
            decisions: ScopedDecisions {
                path: &self.paths.decisions,
            },
            reports_dir: &self.paths.reports_dir,
            artifacts: ScopedArtifacts {
                findings: &self.paths.findings,
                cost_ledger: &self.paths.cost_ledger,
            },
        };
        let yaml = serde_yaml::to_string(&scoped)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        fs::write(&self.paths.config, yaml)
    }

    /// Workspace root.
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// The cell this workspace belongs to.
    pub fn spec(&self) -> &RunSpec {
        &self.spec
    }

    /// Repository checkout audited by this cell.
    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    /// Engine-facing paths.
    pub fn paths(&self) -> &ArtifactPaths {
        &self.paths
    }

    /// Environment exported to the engine process.
    pub fn env(&self) -> Vec<(&'static str, &Path)> {
        vec![
            ("AUDITBENCH_CONFIG", self.paths.config.as_path()),
            ("AUDITBENCH_FINDINGS", self.paths.findings.as_path()),
            ("AUDITBENCH_COST_LEDGER", self.paths.cost_ledger.as_path()),
            ("AUDITBENCH_DECISIONS", self.paths.decisions.as_path()),
            ("AUDITBENCH_REPORTS_DIR", self.paths.reports_dir.as_path()),
        ]
    }

    /// Substitute `{config}`, `{repo}`, `{provider}`, `{model}`, `{focus}`,
    /// `{focus_areas}` and `{workdir}` in an argument template.
    pub fn substitute(&self, template: &str) -> String {
        template
            .replace("{config}", &self.paths.config.to_string_lossy())
            .replace("{repo}", &self.repo_path.to_string_lossy())
            .replace("{provider}", self.spec.provider())
            .replace("{model}", self.spec.model_name())
            .replace("{focus_areas}", &self.focus_areas.join(","))
            .replace("{focus}", &self.spec.focus_tier)
            .replace("{workdir}", &self.dir.path().to_string_lossy())
    }

    /// Remove the workspace, surfacing any cleanup error.
    pub fn close(self) -> io::Result<()> {
        self.dir.close()
    }
}
