// Copyright 2025 AuditBench Contributors
// SPDX-License-Identifier: Apache-2.0

//! CLI for AuditBench.
//!
//! Three subcommands:
//!
//! - `run` executes the (optionally filtered) experiment matrix
//! - `score` aggregates the recorded results into a scorecard
//! - `status` shows matrix completion per repository
//!
//! Only configuration errors and an unusable results directory end the
//! process with a non-zero status; per-cell failures are recorded instead.

#![warn(missing_docs, rust_2018_idioms)]
#![deny(unsafe_code)]

use anyhow::{bail, Context, Result};
use auditbench_adapters::{
    AuditEngine, ExistingCheckouts, GitCloneProvisioner, ProcessEngine, RepoProvisioner,
};
use auditbench_benchmarks::markdown::render_scorecard;
use auditbench_benchmarks::{AggregateView, Matrix, MatrixFilter, Orchestrator, ResultStore};
use auditbench_core::ExperimentConfig;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// AuditBench CLI.
#[derive(Parser, Debug)]
#[command(name = "auditbench")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (TOML, YAML or JSON). Defaults to ./auditbench.* when present.
    #[arg(short, long, global = true, env = "AUDITBENCH_CONFIG_FILE")]
    pub config: Option<PathBuf>,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Commands,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per event
    Json,
}

/// Scorecard output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ScoreFormat {
    /// Aggregate view as JSON
    Json,
    /// Markdown tables
    Markdown,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute the experiment matrix, skipping cells that already have a record.
    Run {
        /// Only these repositories (repeatable).
        #[arg(long = "repo")]
        repos: Vec<String>,

        /// Only these models, as `provider:model` or a bare model name (repeatable).
        #[arg(long = "model")]
        models: Vec<String>,

        /// Only these focus tiers (repeatable).
        #[arg(long = "focus")]
        focus_tiers: Vec<String>,

        /// Only this repetition index.
        #[arg(long = "run")]
        repetition: Option<u32>,

        /// Override the configured number of repetitions.
        #[arg(long)]
        runs: Option<u32>,

        /// Only this pre-pass condition.
        #[arg(long)]
        prepass: Option<bool>,

        /// Write zero-cost placeholder records without invoking the engine.
        #[arg(long)]
        dry_run: bool,

        /// Use existing checkouts only; never clone.
        #[arg(long)]
        skip_clone: bool,

        /// Cells to execute concurrently.
        #[arg(short, long, default_value_t = 1)]
        jobs: usize,
    },

    /// Aggregate recorded results into a scorecard.
    Score {
        /// Results directory override.
        #[arg(long)]
        results_dir: Option<PathBuf>,

        /// Write to this file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format.
        #[arg(short, long, value_enum, default_value_t = ScoreFormat::Markdown)]
        format: ScoreFormat,
    },

    /// Show matrix completion per repository.
    Status {
        /// Results directory override.
        #[arg(long)]
        results_dir: Option<PathBuf>,
    },
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` overrides the default `info` level.
pub fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<Arc<ExperimentConfig>> {
    let config = ExperimentConfig::load(path).context("Failed to load configuration")?;
    Ok(Arc::new(config))
}

/// Run the CLI.
pub async fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            repos,
            models,
            focus_tiers,
            repetition,
            runs,
            prepass,
            dry_run,
            skip_clone,
            jobs,
        } => {
            let filter = MatrixFilter {
                repositories: repos,
                models,
                focus_tiers,
                repetition,
                repetitions: runs,
                prepass,
            };
            let matrix = Matrix::plan(&config, &filter)?;
            if matrix.is_empty() {
                info!("Nothing to run");
                return Ok(());
            }

            let engine: Arc<dyn AuditEngine> = Arc::new(ProcessEngine::new(config.engine.clone()));
            let provisioner: Arc<dyn RepoProvisioner> = if skip_clone {
                Arc::new(ExistingCheckouts)
            } else {
                Arc::new(GitCloneProvisioner::default())
            };
            info!(program = %config.engine.program, skip_clone, "Engine configured");

            let orchestrator = Orchestrator::new(config.clone(), engine, provisioner)
                .context("Failed to open results directory")?
                .with_dry_run(dry_run)
                .with_jobs(jobs);

            // Dropping the run future tears down the in-flight workspace and kills the engine.
            tokio::select! {
                summary = orchestrator.run(&matrix) => {
                    println!("{summary}");
                    if !summary.unprovisioned_repositories.is_empty() {
                        println!(
                            "Unavailable repositories: {}",
                            summary.unprovisioned_repositories.join(", ")
                        );
                    }
                    Ok(())
                }
                _ = tokio::signal::ctrl_c() => {
                    warn!("Interrupted; recorded cells are kept, the in-flight cell is discarded");
                    bail!("interrupted")
                }
            }
        }

        Commands::Score {
            results_dir,
            output,
            format,
        } => {
            let results_dir = results_dir.unwrap_or_else(|| config.results_dir.clone());
            let snapshot = ResultStore::at(&results_dir)
                .snapshot()
                .with_context(|| format!("Failed to read {}", results_dir.display()))?;
            let matrix = Matrix::full(&config)?;
            let view = AggregateView::build(&snapshot, Some(&matrix));
            info!(
                records = view.records_loaded,
                dry_run_excluded = view.dry_run_excluded,
                unreadable = view.unreadable.len(),
                missing = view.missing.len(),
                "Scorecard built"
            );

            let rendered = match format {
                ScoreFormat::Json => serde_json::to_string_pretty(&view)?,
                ScoreFormat::Markdown => render_scorecard(&view),
            };
            match output {
                Some(path) => {
                    std::fs::write(&path, rendered)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    println!("Scorecard written to {}", path.display());
                }
                None => print!("{rendered}"),
            }
            Ok(())
        }

        Commands::Status { results_dir } => {
            let results_dir = results_dir.unwrap_or_else(|| config.results_dir.clone());
            let snapshot = ResultStore::at(&results_dir)
                .snapshot()
                .with_context(|| format!("Failed to read {}", results_dir.display()))?;
            let matrix = Matrix::full(&config)?;

            println!("AuditBench {}", env!("CARGO_PKG_VERSION"));
            println!("Results: {}", results_dir.display());
            println!();
            println!(
                "{:<16} {:>8} {:>8} {:>8} {:>8} {:>8}",
                "repository", "cells", "ok", "failed", "dry-run", "missing"
            );
            let coverage = matrix.coverage(&snapshot.records);
            for row in &coverage {
                println!(
                    "{:<16} {:>8} {:>8} {:>8} {:>8} {:>8}",
                    row.repository,
                    row.expected,
                    row.succeeded,
                    row.failed,
                    row.dry_run,
                    row.missing
                );
            }
            let missing: usize = coverage.iter().map(|r| r.missing).sum();
            println!();
            println!("{} of {} cells recorded", matrix.len() - missing, matrix.len());
            if !snapshot.unreadable.is_empty() {
                println!("{} unreadable record file(s)", snapshot.unreadable.len());
            }
            Ok(())
        }
    }
}
