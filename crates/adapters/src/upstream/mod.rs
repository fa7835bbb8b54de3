// Copyright 2025 AuditBench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Upstream collaborator adapters.
//!
//! This module provides thin consumption layers for everything the benchmark
//! harness depends on but does not own:
//!
//! - **Engine**: the [`AuditEngine`] seam and the process-backed engine
//! - **Workspace**: the isolated per-cell working environment
//! - **Artifacts**: the versioned findings / cost-ledger contract
//! - **Provision**: local repository checkouts
//!
//! # Example
//!
//! ```ignore
//! use auditbench_adapters::upstream::prelude::*;
//!
//! let engine = ProcessEngine::new(config.engine.clone());
//! let workspace = CellWorkspace::create(None, &spec, &repo_path, &areas, 5.0)?;
//! let invocation = engine.invoke(&workspace).await?;
//! let findings = read_findings(&workspace.paths().findings, &spec.focus_tier);
//! ```

pub mod artifacts;
pub mod engine;
pub mod provision;
pub mod workspace;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use super::artifacts::{
        read_cost_ledger, read_findings, FindingsArtifact, UsageArtifact, CONTRACT_VERSION,
    };
    pub use super::engine::{AuditEngine, EngineError, Invocation, ProcessEngine};
    pub use super::provision::{
        ExistingCheckouts, GitCloneProvisioner, ProvisionError, RepoProvisioner,
    };
    pub use super::workspace::{ArtifactPaths, CellWorkspace};
}
