// Copyright 2025 AuditBench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Benchmark execution and scoring for AuditBench.
//!
//! This crate holds both halves of the harness:
//!
//! - the **run orchestrator**, which executes every cell of the experiment
//!   matrix in an isolated workspace and persists one record per cell
//! - the **scorecard aggregator**, which reduces the persisted records into
//!   comparative metrics without re-executing anything
//!
//! # Quick Start
//!
//! ```no_run
//! use auditbench_adapters::{ExistingCheckouts, ProcessEngine};
//! use auditbench_benchmarks::{AggregateView, Matrix, Orchestrator, ResultStore};
//! use auditbench_core::ExperimentConfig;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Arc::new(ExperimentConfig::load(None)?);
//! let matrix = Matrix::full(&config)?;
//!
//! let engine = Arc::new(ProcessEngine::new(config.engine.clone()));
//! let orchestrator = Orchestrator::new(config.clone(), engine, Arc::new(ExistingCheckouts))?;
//! let summary = orchestrator.run(&matrix).await;
//! println!("{summary}");
//!
//! let snapshot = ResultStore::at(&config.results_dir).snapshot()?;
//! let view = AggregateView::build(&snapshot, Some(&matrix));
//! println!("{}", auditbench_benchmarks::markdown::render_scorecard(&view));
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`matrix`] - Matrix enumeration and axis filters
//! - [`io`] - Result store: atomic writes, claims, snapshots
//! - [`orchestrator`] - Per-cell execution with resume
//! - [`result`] - Orchestration outcome counts
//! - [`scorecard`] - Aggregated metrics
//! - [`markdown`] - Markdown scorecard rendering

#![warn(missing_docs, rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod io;
pub mod markdown;
pub mod matrix;
pub mod orchestrator;
pub mod result;
pub mod scorecard;

pub use io::{ResultStore, Snapshot, StoreError};
pub use matrix::{Matrix, MatrixFilter, RepoCoverage};
pub use orchestrator::Orchestrator;
pub use result::{CellOutcome, RunSummary};
pub use scorecard::AggregateView;
