// Copyright 2025 AuditBench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Experiment configuration.
//!
//! [`ExperimentConfig`] is built once at startup and shared read-only (behind
//! an `Arc`) by the orchestrator and the aggregator. Sources are layered:
//!
//! 1. built-in defaults (the reference corpus, models and focus tiers)
//! 2. a config file (`auditbench.toml` / `.yaml` / `.json`)
//! 3. `AUDITBENCH__*` environment variables
//!
//! # Example
//!
//! ```no_run
//! use auditbench_core::ExperimentConfig;
//!
//! let config = ExperimentConfig::load(None)?;
//! assert!(config.repetitions >= 1);
//! # Ok::<(), auditbench_core::ConfigError>(())
//! ```

use crate::error::{ConfigError, Result};
use crate::pricing::PricingTable;
use crate::spec::ModelRef;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Base name of the config file looked up when no explicit path is given.
pub const DEFAULT_CONFIG_FILE: &str = "auditbench";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "AUDITBENCH";

/// One benchmark repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Short name, also the results subdirectory
    pub name: String,
    /// Clone URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Explicit local checkout; defaults to `repos_dir/<name>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Branch or tag to clone
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    /// Corpus category (small-clean, large, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl RepositoryConfig {
    fn reference(name: &str, url: &str, category: &str) -> Self {
        Self {
            name: name.to_string(),
            url: Some(url.to_string()),
            path: None,
            branch: None,
            category: Some(category.to_string()),
        }
    }

    /// Local checkout path.
    pub fn checkout_path(&self, repos_dir: &Path) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| repos_dir.join(&self.name))
    }
}

/// A named set of focus areas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusTier {
    /// Tier name
    pub name: String,
    /// Focus areas audited in this tier
    pub areas: Vec<String>,
}

impl FocusTier {
    fn new(name: &str, areas: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            areas: areas.iter().map(|a| a.to_string()).collect(),
        }
    }
}

/// How to invoke the external audit engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Executable
    pub program: String,
    /// Arguments; `{config}`, `{repo}`, `{provider}`, `{model}`, `{focus}`
    /// and `{workdir}` are substituted per cell
    pub args: Vec<String>,
    /// Per-invocation timeout
    pub timeout_secs: u64,
    /// Budget ceiling passed to the engine, USD
    pub budget_usd: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            program: "noxaudit".to_string(),
            args: vec![
                "run".to_string(),
                "--config".to_string(),
                "{config}".to_string(),
                "--focus".to_string(),
                "{focus}".to_string(),
            ],
            timeout_secs: 1800,
            budget_usd: 5.0,
        }
    }
}

/// The immutable experiment definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Where result records are written
    pub results_dir: PathBuf,
    /// Where repositories are cloned
    pub repos_dir: PathBuf,
    /// Parent directory for isolated cell workspaces (system temp if unset)
    pub work_root: Option<PathBuf>,
    /// Benchmark corpus
    pub repositories: Vec<RepositoryConfig>,
    /// `provider:model` pairs
    pub models: Vec<String>,
    /// Focus tiers in enumeration order
    pub focus_tiers: Vec<FocusTier>,
    /// Repetitions per cell
    pub repetitions: u32,
    /// Pre-pass conditions to run (`[false]` disables the axis)
    pub prepass_variants: Vec<bool>,
    /// Engine invocation
    pub engine: EngineConfig,
    /// Model pricing
    pub pricing: PricingTable,
    /// Age after which an unfinished claim is considered abandoned
    pub claim_ttl_secs: u64,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            results_dir: PathBuf::from("benchmark/results"),
            repos_dir: PathBuf::from("benchmark/repos"),
            work_root: None,
            repositories: vec![
                RepositoryConfig::reference(
                    "requests",
                    "https://github.com/psf/requests",
                    "small-clean",
                ),
                RepositoryConfig::reference("black", "https://github.com/psf/black", "small-messy"),
                RepositoryConfig::reference("flask", "https://github.com/pallets/flask", "medium"),
                RepositoryConfig::reference("httpx", "https://github.com/encode/httpx", "large"),
                RepositoryConfig::reference(
                    "rich",
                    "https://github.com/Textualize/rich",
                    "polyglot",
                ),
            ],
            models: [
                "gemini:gemini-2.0-flash",
                "gemini:gemini-2.5-flash",
                "gemini:gemini-3-flash",
                "gemini:gemini-2.5-pro",
                "anthropic:claude-haiku-4-5",
                "anthropic:claude-sonnet-4-5",
                "anthropic:claude-sonnet-4-6",
                "anthropic:claude-opus-4-6",
                "openai:gpt-5-mini",
                "openai:gpt-5.2",
            ]
            .iter()
            .map(|m| m.to_string())
            .collect(),
            focus_tiers: vec![
                FocusTier::new("security", &["security"]),
                FocusTier::new("does_it_work", &["security", "testing"]),
                FocusTier::new(
                    "all",
                    &[
                        "security",
                        "docs",
                        "patterns",
                        "testing",
                        "hygiene",
                        "dependencies",
                        "performance",
                    ],
                ),
            ],
            repetitions: 2,
            prepass_variants: vec![false],
            engine: EngineConfig::default(),
            pricing: PricingTable::default(),
            claim_ttl_secs: 6 * 60 * 60,
        }
    }
}

impl ExperimentConfig {
    /// Load from defaults, an optional file and the environment, then validate.
    ///
    /// An explicit `path` must exist; without one, `auditbench.{toml,yaml,json}`
    /// in the working directory is used when present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let loaded: Self = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        loaded.validate()?;
        Ok(loaded)
    }

    /// Check structural invariants.
    pub fn validate(&self) -> Result<()> {
        if self.repositories.is_empty() {
            return Err(ConfigError::Invalid("no repositories configured".into()));
        }
        let mut names = HashSet::new();
        for repo in &self.repositories {
            if repo.name.trim().is_empty() {
                return Err(ConfigError::Invalid("repository with empty name".into()));
            }
            if !names.insert(repo.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate repository '{}'",
                    repo.name
                )));
            }
        }

        let models = self.model_refs()?;
        if models.is_empty() {
            return Err(ConfigError::Invalid("no models configured".into()));
        }
        let mut seen = HashSet::new();
        for model in &models {
            if !seen.insert(model) {
                return Err(ConfigError::Invalid(format!("duplicate model '{model}'")));
            }
        }

        if self.focus_tiers.is_empty() {
            return Err(ConfigError::Invalid("no focus tiers configured".into()));
        }
        let mut tiers = HashSet::new();
        for tier in &self.focus_tiers {
            if tier.areas.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "focus tier '{}' has no focus areas",
                    tier.name
                )));
            }
            if !tiers.insert(tier.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate focus tier '{}'",
                    tier.name
                )));
            }
        }

        if self.repetitions == 0 {
            return Err(ConfigError::Invalid("repetitions must be at least 1".into()));
        }
        if self.prepass_variants.is_empty() {
            return Err(ConfigError::Invalid("prepass_variants must not be empty".into()));
        }
        if self.engine.program.trim().is_empty() {
            return Err(ConfigError::Invalid("engine.program is empty".into()));
        }
        if self.engine.timeout_secs == 0 {
            return Err(ConfigError::Invalid("engine.timeout_secs must be positive".into()));
        }
        Ok(())
    }

    /// Parsed model references, in configured order.
    pub fn model_refs(&self) -> Result<Vec<ModelRef>> {
        self.models.iter().map(|m| m.parse()).collect()
    }

    /// Look up a repository by name.
    pub fn repository(&self, name: &str) -> Option<&RepositoryConfig> {
        self.repositories.iter().find(|r| r.name == name)
    }

    /// Focus areas for a tier.
    pub fn focus_areas(&self, tier: &str) -> Option<&[String]> {
        self.focus_tiers
            .iter()
            .find(|t| t.name == tier)
            .map(|t| t.areas.as_slice())
    }

    /// Distinct pre-pass conditions, in configured order.
    pub fn prepass_conditions(&self) -> Vec<bool> {
        let mut out = Vec::new();
        for variant in &self.prepass_variants {
            if !out.contains(variant) {
                out.push(*variant);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = ExperimentConfig::default();
        config.validate().unwrap();
        assert_eq!(config.repositories.len(), 5);
        assert_eq!(config.model_refs().unwrap().len(), 10);
        assert_eq!(config.repetitions, 2);
        assert_eq!(config.focus_areas("all").unwrap().len(), 7);
        assert_eq!(
            config.focus_areas("does_it_work").unwrap(),
            &["security".to_string(), "testing".to_string()]
        );
    }

    #[test]
    fn test_checkout_path() {
        let config = ExperimentConfig::default();
        let repo = config.repository("flask").unwrap();
        assert_eq!(
            repo.checkout_path(Path::new("/repos")),
            PathBuf::from("/repos/flask")
        );

        let pinned = RepositoryConfig {
            path: Some(PathBuf::from("/src/flask")),
            ..repo.clone()
        };
        assert_eq!(
            pinned.checkout_path(Path::new("/repos")),
            PathBuf::from("/src/flask")
        );
    }

    #[test]
    fn test_validate_rejects_bad_models() {
        let config = ExperimentConfig {
            models: vec!["gemini-2.0-flash".into()],
            ..ExperimentConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidModelRef(_))
        ));

        let config = ExperimentConfig {
            models: vec!["a:b".into(), "a:b".into()],
            ..ExperimentConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_zero_repetitions() {
        let config = ExperimentConfig {
            repetitions: 0,
            ..ExperimentConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
results_dir = "out/results"
repetitions = 3
models = ["gemini:gemini-2.0-flash", "openai:gpt-5-mini"]

[[repositories]]
name = "requests"
path = "/src/requests"

[[focus_tiers]]
name = "security"
areas = ["security"]

[pricing.gpt-5-mini]
input_per_million = 0.25
output_per_million = 2.0
"#
        )
        .unwrap();

        let config = ExperimentConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.results_dir, PathBuf::from("out/results"));
        assert_eq!(config.repetitions, 3);
        assert_eq!(config.repositories.len(), 1);
        assert_eq!(config.model_refs().unwrap()[1], ModelRef::new("openai", "gpt-5-mini"));
        assert_eq!(config.pricing.len(), 1);
        // Untouched sections keep their defaults.
        assert_eq!(config.engine, EngineConfig::default());
        assert_eq!(config.prepass_conditions(), vec![false]);
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let result = ExperimentConfig::load(Some(Path::new("/nonexistent/auditbench.toml")));
        assert!(matches!(result, Err(ConfigError::Load(_))));
    }
}
