// Copyright 2025 AuditBench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Configuration errors.
//!
//! These are the only errors that halt a benchmark invocation: they are
//! discovered before any cell executes.

use thiserror::Error;

/// Errors raised while loading or validating the experiment configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration source could not be read or deserialized
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// A `provider:model` string was malformed
    #[error("Invalid model reference '{0}': expected 'provider:model'")]
    InvalidModelRef(String),

    /// A matrix filter named a value the configuration does not define
    #[error("Unknown {axis} '{value}'. Available: {available}")]
    UnknownAxisValue {
        /// Axis name (repository, model, focus tier, repetition)
        axis: &'static str,
        /// Requested value
        value: String,
        /// Comma-separated list of configured values
        available: String,
    },

    /// Configuration is structurally invalid
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;
