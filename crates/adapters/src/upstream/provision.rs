// Copyright 2025 AuditBench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Repository provisioning.
//!
//! The harness needs a local, read-only checkout per repository. Provisioning
//! failures are scoped to one repository: the orchestrator skips that
//! repository's cells and carries on with the rest of the matrix.

use async_trait::async_trait;
use auditbench_core::RepositoryConfig;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tracing::info;

/// Errors that can occur while provisioning a repository.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// No checkout exists and cloning was skipped
    #[error("Repository '{repo}' not found at {path}")]
    Missing {
        /// Repository name
        repo: String,
        /// Expected checkout path
        path: PathBuf,
    },

    /// No checkout exists and no clone URL is configured
    #[error("Repository '{0}' has no checkout and no clone URL")]
    NoSource(String),

    /// `git clone` failed
    #[error("Cloning '{repo}' failed: {detail}")]
    CloneFailed {
        /// Repository name
        repo: String,
        /// git output or spawn error
        detail: String,
    },

    /// Filesystem error
    #[error("IO error provisioning repository: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for provisioning operations.
pub type Result<T> = std::result::Result<T, ProvisionError>;

/// Supplies local checkouts.
#[async_trait]
pub trait RepoProvisioner: Send + Sync {
    /// Return the checkout path for `repo`, provisioning it if needed.
    async fn provision(&self, repo: &RepositoryConfig, repos_dir: &Path) -> Result<PathBuf>;
}

/// Uses whatever checkout already exists; never clones.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExistingCheckouts;

#[async_trait]
impl RepoProvisioner for ExistingCheckouts {
    async fn provision(&self, repo: &RepositoryConfig, repos_dir: &Path) -> Result<PathBuf> {
        let path = repo.checkout_path(repos_dir);
        if tokio::fs::metadata(&path).await.map(|m| m.is_dir()).unwrap_or(false) {
            Ok(path)
        } else {
            Err(ProvisionError::Missing {
                repo: repo.name.clone(),
                path,
            })
        }
    }
}

/// Shallow-clones missing checkouts with `git`.
#[derive(Debug, Clone)]
pub struct GitCloneProvisioner {
    git: String,
}

impl Default for GitCloneProvisioner {
    fn default() -> Self {
        Self::new("git")
    }
}

impl GitCloneProvisioner {
    /// Use the given git executable.
    pub fn new(git: impl Into<String>) -> Self {
        Self { git: git.into() }
    }
}

#[async_trait]
impl RepoProvisioner for GitCloneProvisioner {
    async fn provision(&self, repo: &RepositoryConfig, repos_dir: &Path) -> Result<PathBuf> {
        if let Ok(path) = ExistingCheckouts.provision(repo, repos_dir).await {
            return Ok(path);
        }

        let path = repo.checkout_path(repos_dir);
        let url = repo
            .url
            .as_deref()
            .ok_or_else(|| ProvisionError::NoSource(repo.name.clone()))?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut command = tokio::process::Command::new(&self.git);
        command.args(["clone", "--depth", "1"]);
        if let Some(branch) = &repo.branch {
            command.arg("--branch").arg(branch);
        }
        command
            .arg(url)
            .arg(&path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        info!(repo = %repo.name, %url, path = %path.display(), "Cloning repository");
        let output = command
            .output()
            .await
            .map_err(|e| ProvisionError::CloneFailed {
                repo: repo.name.clone(),
                detail: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(ProvisionError::CloneFailed {
                repo: repo.name.clone(),
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn repo(name: &str, url: Option<&str>) -> RepositoryConfig {
        RepositoryConfig {
            name: name.to_string(),
            url: url.map(String::from),
            path: None,
            branch: None,
            category: None,
        }
    }

    #[tokio::test]
    async fn test_existing_checkout_found() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("requests")).unwrap();
        let path = ExistingCheckouts
            .provision(&repo("requests", None), dir.path())
            .await
            .unwrap();
        assert_eq!(path, dir.path().join("requests"));
    }

    #[tokio::test]
    async fn test_existing_checkout_missing() {
        let dir = TempDir::new().unwrap();
        let err = ExistingCheckouts
            .provision(&repo("flask", Some("https://example.invalid/flask")), dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Missing { .. }));
    }

    #[tokio::test]
    async fn test_clone_without_url_fails() {
        let dir = TempDir::new().unwrap();
        let err = GitCloneProvisioner::default()
            .provision(&repo("black", None), dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::NoSource(name) if name == "black"));
    }

    #[tokio::test]
    async fn test_clone_skips_existing_checkout() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("rich")).unwrap();
        // A bogus git binary proves no clone is attempted.
        let path = GitCloneProvisioner::new("/nonexistent/git")
            .provision(&repo("rich", Some("https://example.invalid/rich")), dir.path())
            .await
            .unwrap();
        assert_eq!(path, dir.path().join("rich"));
    }

    #[tokio::test]
    async fn test_clone_spawn_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        let err = GitCloneProvisioner::new("/nonexistent/git")
            .provision(&repo("httpx", Some("https://example.invalid/httpx")), dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::CloneFailed { .. }));
    }
}
