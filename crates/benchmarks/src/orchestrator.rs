// Copyright 2025 AuditBench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Run orchestrator.
//!
//! Executes the cells of a [`Matrix`] against an [`AuditEngine`], one
//! isolated [`CellWorkspace`] per cell, and persists one [`ResultRecord`] per
//! executed cell.
//!
//! # Guarantees
//!
//! - **Resumable**: cells that already have a record are skipped, so a second
//!   invocation over the same matrix performs no engine work.
//! - **Failure-tolerant**: engine failures, timeouts and workspace setup
//!   errors become failure records; the run moves on to the next cell.
//! - **Isolated**: every cell gets private decision memory, report output and
//!   artifact paths, removed when the cell finishes or is cancelled.
//!
//! Only failing to open the results directory aborts an invocation.

use crate::io::{ResultStore, StoreError};
use crate::matrix::Matrix;
use crate::result::{CellOutcome, RunSummary};
use auditbench_adapters::{
    read_cost_ledger, read_findings, AuditEngine, CellWorkspace, RepoProvisioner, UsageArtifact,
};
use auditbench_core::{
    ArtifactStatus, ArtifactsHealth, CostSource, ExitStatus, ExperimentConfig, ResultRecord,
    RunSpec,
};
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Drives the benchmark matrix.
pub struct Orchestrator {
    config: Arc<ExperimentConfig>,
    store: ResultStore,
    engine: Arc<dyn AuditEngine>,
    provisioner: Arc<dyn RepoProvisioner>,
    invocation_id: Uuid,
    dry_run: bool,
    jobs: usize,
}

impl Orchestrator {
    /// Create an orchestrator, opening the results directory.
    pub fn new(
        config: Arc<ExperimentConfig>,
        engine: Arc<dyn AuditEngine>,
        provisioner: Arc<dyn RepoProvisioner>,
    ) -> Result<Self, StoreError> {
        let store = ResultStore::open(&config.results_dir)?;
        Ok(Self {
            config,
            store,
            engine,
            provisioner,
            invocation_id: Uuid::new_v4(),
            dry_run: false,
            jobs: 1,
        })
    }

    /// Write zero-cost placeholders instead of invoking the engine.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Run up to `jobs` cells concurrently.
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    /// Identifier stamped on every record written by this orchestrator.
    pub fn invocation_id(&self) -> Uuid {
        self.invocation_id
    }

    /// Result store.
    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    /// Execute every cell of `matrix` that has no record yet.
    pub async fn run(&self, matrix: &Matrix) -> RunSummary {
        let cells = matrix.cells();
        let total = cells.len();
        let mut summary = RunSummary {
            scheduled: total,
            ..Default::default()
        };

        info!(
            invocation_id = %self.invocation_id,
            cells = total,
            dry_run = self.dry_run,
            jobs = self.jobs,
            results_dir = %self.store.root().display(),
            "Starting benchmark run"
        );

        let pending: Vec<&str> = {
            let mut repos: Vec<&str> = cells
                .iter()
                .filter(|c| !self.store.contains(&c.result_id()))
                .map(|c| c.repository.as_str())
                .collect();
            repos.dedup();
            repos
        };
        let checkouts = self.provision(&pending, &mut summary).await;

        let outcomes: Vec<CellOutcome> = stream::iter(cells.iter().enumerate())
            .map(|(i, spec)| {
                let checkout = checkouts.get(&spec.repository).map(PathBuf::as_path);
                self.run_cell(i + 1, total, spec, checkout)
            })
            .buffer_unordered(self.jobs)
            .collect()
            .await;

        for outcome in outcomes {
            summary.record(outcome);
        }

        info!(invocation_id = %self.invocation_id, %summary, "Benchmark run finished");
        summary
    }

    async fn provision(
        &self,
        repositories: &[&str],
        summary: &mut RunSummary,
    ) -> HashMap<String, PathBuf> {
        let mut checkouts = HashMap::new();
        for name in repositories {
            let Some(repo) = self.config.repository(name) else {
                continue;
            };
            if self.dry_run {
                checkouts.insert(repo.name.clone(), repo.checkout_path(&self.config.repos_dir));
                continue;
            }
            match self.provisioner.provision(repo, &self.config.repos_dir).await {
                Ok(path) => {
                    debug!(repo = %repo.name, path = %path.display(), "Repository ready");
                    checkouts.insert(repo.name.clone(), path);
                }
                Err(e) => {
                    error!(
                        repo = %repo.name,
                        error = %e,
                        "Repository unavailable, skipping its cells"
                    );
                    summary.unprovisioned_repositories.push(repo.name.clone());
                }
            }
        }
        checkouts
    }

    async fn run_cell(
        &self,
        index: usize,
        total: usize,
        spec: &RunSpec,
        checkout: Option<&Path>,
    ) -> CellOutcome {
        let id = spec.result_id();
        if self.store.contains(&id) {
            debug!(cell = %id, "[{}/{}] Already recorded", index, total);
            return CellOutcome::SkippedExisting;
        }
        let Some(checkout) = checkout else {
            return CellOutcome::SkippedUnprovisioned;
        };

        let ttl = Duration::from_secs(self.config.claim_ttl_secs);
        let _claim = match self.store.claim(&id, ttl) {
            Ok(Some(claim)) => claim,
            Ok(None) => {
                info!(cell = %id, "[{}/{}] Claimed by another worker", index, total);
                return CellOutcome::SkippedClaimed;
            }
            Err(e) => {
                error!(cell = %id, error = %e, "[{}/{}] Failed to claim cell", index, total);
                return CellOutcome::PersistFailed;
            }
        };
        // Another worker may have finished between the first check and the claim.
        if self.store.contains(&id) {
            return CellOutcome::SkippedExisting;
        }

        info!("[{}/{}] Running {}", index, total, spec);
        let record = if self.dry_run {
            ResultRecord::dry_run(spec.clone(), self.invocation_id)
        } else {
            self.execute(spec, checkout).await
        };

        let outcome = if record.dry_run {
            CellOutcome::DryRun
        } else if record.is_success() {
            CellOutcome::Succeeded
        } else {
            CellOutcome::Failed
        };

        match self.store.write(&record) {
            Ok(path) => {
                info!(
                    cell = %id,
                    ?outcome,
                    findings = record.findings_count,
                    cost_usd = record.cost_usd,
                    duration_seconds = record.duration_seconds,
                    path = %path.display(),
                    "[{}/{}] Recorded",
                    index,
                    total
                );
                outcome
            }
            Err(e) => {
                error!(cell = %id, error = %e, "[{}/{}] Failed to persist record", index, total);
                CellOutcome::PersistFailed
            }
        }
    }

    async fn execute(&self, spec: &RunSpec, checkout: &Path) -> ResultRecord {
        let areas = self
            .config
            .focus_areas(&spec.focus_tier)
            .map(<[String]>::to_vec)
            .unwrap_or_else(|| vec![spec.focus_tier.clone()]);

        let workspace = match CellWorkspace::create(
            self.config.work_root.as_deref(),
            spec,
            checkout,
            &areas,
            self.config.engine.budget_usd,
        ) {
            Ok(workspace) => workspace,
            Err(e) => {
                warn!(cell = %spec, error = %e, "Workspace setup failed");
                return ResultRecord::new(spec.clone(), self.invocation_id)
                    .with_exit(ExitStatus::failed(format!("workspace setup failed: {e}")));
            }
        };

        let started = Instant::now();
        let exit = match self.engine.invoke(&workspace).await {
            Ok(invocation) if invocation.success => ExitStatus::Success,
            Ok(invocation) => ExitStatus::Failure {
                code: invocation.exit_code,
                error: invocation.stderr_tail,
            },
            Err(e) => ExitStatus::failed(e.to_string()),
        };
        let elapsed = started.elapsed();

        if let ExitStatus::Failure { code, error } = &exit {
            warn!(cell = %spec, ?code, error = error.as_deref().unwrap_or(""), "Engine failed");
        }

        let findings = read_findings(&workspace.paths().findings, &spec.focus_tier);
        let usage = read_cost_ledger(&workspace.paths().cost_ledger);
        let (cost, source) = self.price(spec, &usage);

        if let Err(e) = workspace.close() {
            warn!(cell = %spec, error = %e, "Failed to remove cell workspace");
        }

        ResultRecord::new(spec.clone(), self.invocation_id)
            .with_exit(exit)
            .with_duration(elapsed)
            .with_findings(findings.findings)
            .with_cost(usage.usage, cost, source)
            .with_artifacts(ArtifactsHealth {
                findings: findings.status,
                usage: usage.status,
            })
    }

    /// Pricing table first, then the engine's own estimate, then zero.
    fn price(&self, spec: &RunSpec, usage: &UsageArtifact) -> (f64, CostSource) {
        if usage.status != ArtifactStatus::Present {
            return (0.0, CostSource::None);
        }
        if let Some(cost) = self.config.pricing.cost(spec.model_name(), &usage.usage) {
            return (cost, CostSource::PricingTable);
        }
        match usage.cost_estimate {
            Some(estimate) => (estimate, CostSource::EngineEstimate),
            None => (0.0, CostSource::None),
        }
    }
}
