// Copyright 2025 AuditBench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Experiment cell identity.
//!
//! A [`RunSpec`] names one cell of the experiment matrix. Its [`ResultId`] is
//! the relative path of the record file for that cell:
//!
//! ```text
//! <repo>/<provider>_<model>_<tier>[_prepass]_run<N>.json
//! ```
//!
//! Each component is percent-escaped so it never contains `_`, `/`, `%`,
//! uppercase letters or a leading `.`; the mapping is injective and stable on
//! case-insensitive filesystems.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// A `provider:model` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModelRef {
    /// Provider name (e.g. `gemini`)
    pub provider: String,
    /// Model name (e.g. `gemini-2.0-flash`)
    pub model: String,
}

impl ModelRef {
    /// Create a new model reference.
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
        }
    }
}

impl FromStr for ModelRef {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((provider, model)) if !provider.trim().is_empty() && !model.trim().is_empty() => {
                Ok(Self::new(provider.trim(), model.trim()))
            }
            _ => Err(ConfigError::InvalidModelRef(s.to_string())),
        }
    }
}

impl fmt::Display for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.provider, self.model)
    }
}

/// Identity of one experiment cell.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunSpec {
    /// Repository name
    pub repository: String,
    /// Provider and model
    #[serde(flatten)]
    pub model: ModelRef,
    /// Focus tier name
    pub focus_tier: String,
    /// Whether the pre-pass step is enabled for this cell
    #[serde(default)]
    pub prepass: bool,
    /// 1-based repetition index
    pub repetition: u32,
}

impl RunSpec {
    /// Create a new run spec.
    pub fn new(
        repository: impl Into<String>,
        model: ModelRef,
        focus_tier: impl Into<String>,
        prepass: bool,
        repetition: u32,
    ) -> Self {
        Self {
            repository: repository.into(),
            model,
            focus_tier: focus_tier.into(),
            prepass,
            repetition,
        }
    }

    /// Provider name.
    pub fn provider(&self) -> &str {
        &self.model.provider
    }

    /// Model name.
    pub fn model_name(&self) -> &str {
        &self.model.model
    }

    /// Deterministic result identity for this cell.
    pub fn result_id(&self) -> ResultId {
        let mut file = format!(
            "{}_{}_{}",
            escape_component(&self.model.provider),
            escape_component(&self.model.model),
            escape_component(&self.focus_tier),
        );
        if self.prepass {
            file.push_str("_prepass");
        }
        file.push_str(&format!("_run{}.json", self.repetition));
        ResultId {
            dir: escape_component(&self.repository),
            file,
        }
    }
}

impl fmt::Display for RunSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}{} run{}",
            self.repository,
            self.model,
            self.focus_tier,
            if self.prepass { " +prepass" } else { "" },
            self.repetition
        )
    }
}

/// Relative location of a cell's result record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResultId {
    dir: String,
    file: String,
}

impl ResultId {
    /// Path relative to the results directory.
    pub fn relative_path(&self) -> PathBuf {
        Path::new(&self.dir).join(&self.file)
    }

    /// Absolute record path under `results_dir`.
    pub fn record_path(&self, results_dir: &Path) -> PathBuf {
        results_dir.join(self.relative_path())
    }

    /// Path of the claim marker guarding this cell.
    pub fn claim_path(&self, results_dir: &Path) -> PathBuf {
        results_dir.join(&self.dir).join(format!("{}.claim", self.file))
    }
}

impl fmt::Display for ResultId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.dir, self.file)
    }
}

fn escape_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for (i, byte) in raw.bytes().enumerate() {
        let keep = matches!(byte, b'a'..=b'z' | b'0'..=b'9' | b'-')
            || (byte == b'.' && i > 0);
        if keep {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    if out.is_empty() {
        out.push('%');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn spec(repo: &str, provider: &str, model: &str, tier: &str, run: u32) -> RunSpec {
        RunSpec::new(repo, ModelRef::new(provider, model), tier, false, run)
    }

    #[test]
    fn test_model_ref_parse() {
        let m: ModelRef = "gemini:gemini-2.0-flash".parse().unwrap();
        assert_eq!(m.provider, "gemini");
        assert_eq!(m.model, "gemini-2.0-flash");
        assert_eq!(m.to_string(), "gemini:gemini-2.0-flash");

        assert!("gemini".parse::<ModelRef>().is_err());
        assert!(":model".parse::<ModelRef>().is_err());
        assert!("provider:".parse::<ModelRef>().is_err());
    }

    #[test]
    fn test_result_id_layout() {
        let id = spec("requests", "gemini", "gemini-2.0-flash", "security", 1).result_id();
        assert_eq!(
            id.relative_path(),
            PathBuf::from("requests/gemini_gemini-2.0-flash_security_run1.json")
        );

        let mut with_prepass = spec("httpx", "anthropic", "claude-haiku-4-5", "all", 2);
        with_prepass.prepass = true;
        assert_eq!(
            with_prepass.result_id().to_string(),
            "httpx/anthropic_claude-haiku-4-5_all_prepass_run2.json"
        );
    }

    #[test]
    fn test_result_id_equal_for_equal_specs() {
        let a = spec("flask", "openai", "gpt-5-mini", "does_it_work", 2);
        let b = a.clone();
        assert_eq!(a.result_id(), b.result_id());
    }

    #[test]
    fn test_result_id_separator_ambiguity_does_not_collide() {
        // Underscores in components must not shift the field boundaries.
        let a = spec("r", "a_b", "c", "t", 1);
        let b = spec("r", "a", "b_c", "t", 1);
        assert_ne!(a.result_id(), b.result_id());

        // A tier literally named like the pre-pass suffix stays distinct.
        let c = spec("r", "p", "m", "t_prepass", 1);
        let mut d = spec("r", "p", "m", "t", 1);
        d.prepass = true;
        assert_ne!(c.result_id(), d.result_id());
    }

    #[test]
    fn test_result_id_distinct_across_matrix() {
        let repos = ["requests", "Requests", "black", "a/b", ".."];
        let models = [("gemini", "gemini-2.0-flash"), ("openai", "gpt-5.2"), ("x", "%41")];
        let tiers = ["security", "all", "does_it_work"];
        let mut seen = HashSet::new();
        let mut count = 0;
        for repo in repos {
            for (provider, model) in models {
                for tier in tiers {
                    for prepass in [false, true] {
                        for run in 1..=3 {
                            let s = RunSpec::new(
                                repo,
                                ModelRef::new(provider, model),
                                tier,
                                prepass,
                                run,
                            );
                            seen.insert(s.result_id());
                            count += 1;
                        }
                    }
                }
            }
        }
        assert_eq!(seen.len(), count);
    }

    #[test]
    fn test_escaping_keeps_paths_inside_results_dir() {
        let id = spec("..", "p", "m", "t", 1).result_id();
        let path = id.relative_path();
        assert!(path
            .components()
            .all(|c| matches!(c, std::path::Component::Normal(_))));
        assert!(!id.to_string().contains("/../"));

        let nested = spec("a/b", "p", "m", "t", 1).result_id();
        assert_eq!(nested.relative_path().components().count(), 2);
    }

    #[test]
    fn test_claim_path_sits_beside_record() {
        let dir = Path::new("/tmp/results");
        let id = spec("black", "gemini", "gemini-2.5-pro", "all", 1).result_id();
        assert_eq!(
            id.claim_path(dir),
            PathBuf::from("/tmp/results/black/gemini_gemini-2.5-pro_all_run1.json.claim")
        );
    }
}
