// Copyright 2025 AuditBench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Core types for the AuditBench benchmark harness.
//!
//! This crate holds everything both halves of the harness agree on:
//!
//! - [`spec`] - `RunSpec`, the identity of one experiment cell, and the
//!   deterministic result identity derived from it
//! - [`finding`] - findings and their content-derived ids
//! - [`record`] - the persisted `ResultRecord` schema
//! - [`measure`] - metric values that may be explicitly not computable
//! - [`pricing`] - per-model token pricing
//! - [`config`] - the immutable `ExperimentConfig`
//!
//! The orchestrator writes [`record::ResultRecord`]s and the aggregator reads
//! them back; neither mutates the shared configuration once loaded.

#![warn(missing_docs, rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod finding;
pub mod measure;
pub mod pricing;
pub mod record;
pub mod spec;

pub use config::{EngineConfig, ExperimentConfig, FocusTier, RepositoryConfig};
pub use error::ConfigError;
pub use finding::{finding_id, Finding, Severity};
pub use measure::{Measure, Unmeasurable};
pub use pricing::{ModelPricing, PricingTable};
pub use record::{
    ArtifactStatus, ArtifactsHealth, CostSource, ExitStatus, ResultRecord, SeverityCounts,
    TokenUsage, RECORD_SCHEMA_VERSION,
};
pub use spec::{ModelRef, ResultId, RunSpec};
