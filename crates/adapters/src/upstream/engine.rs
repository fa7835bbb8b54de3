// Copyright 2025 AuditBench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Audit engine adapter.
//!
//! The engine is the black-box tool that reads one repository with one
//! provider/model and emits findings. [`AuditEngine`] is the seam the
//! orchestrator drives; [`ProcessEngine`] runs the real tool as a child
//! process inside a [`CellWorkspace`].
//!
//! A non-zero exit is *not* an error here: it is reported through
//! [`Invocation`] so the orchestrator can record it. [`EngineError`] covers
//! only cases where no exit status exists (spawn failure, timeout).

use crate::upstream::workspace::CellWorkspace;
use async_trait::async_trait;
use auditbench_core::EngineConfig;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Bytes of stderr kept as failure detail.
pub const STDERR_TAIL_BYTES: usize = 2048;

/// Errors that prevent an engine invocation from producing an exit status.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The process could not be started
    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        /// Executable
        program: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Waiting on the process failed
    #[error("Failed waiting for engine: {0}")]
    Wait(#[source] std::io::Error),

    /// The process exceeded its time limit and was killed
    #[error("Engine timed out after {0:?}")]
    Timeout(Duration),
}

/// Outcome of a completed engine process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Whether the process exited successfully
    pub success: bool,
    /// Exit code (absent when killed by a signal)
    pub exit_code: Option<i32>,
    /// Tail of stderr, for failure detail
    pub stderr_tail: Option<String>,
}

impl Invocation {
    /// A successful exit.
    pub fn succeeded() -> Self {
        Self {
            success: true,
            exit_code: Some(0),
            stderr_tail: None,
        }
    }

    /// A failed exit with the given code.
    pub fn failed(exit_code: i32, stderr_tail: Option<String>) -> Self {
        Self {
            success: false,
            exit_code: Some(exit_code),
            stderr_tail,
        }
    }
}

/// The external audit tool.
#[async_trait]
pub trait AuditEngine: Send + Sync {
    /// Run one audit synchronously inside `workspace`.
    ///
    /// Implementations must only touch paths owned by the workspace.
    async fn invoke(&self, workspace: &CellWorkspace) -> Result<Invocation, EngineError>;
}

/// Runs the engine as a child process.
#[derive(Debug, Clone)]
pub struct ProcessEngine {
    config: EngineConfig,
}

impl ProcessEngine {
    /// Create a new process engine.
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

fn tail(bytes: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let mut start = text.len().saturating_sub(STDERR_TAIL_BYTES);
    while !text.is_char_boundary(start) {
        start += 1;
    }
    Some(text[start..].to_string())
}

#[async_trait]
impl AuditEngine for ProcessEngine {
    async fn invoke(&self, workspace: &CellWorkspace) -> Result<Invocation, EngineError> {
        let args: Vec<String> = self
            .config
            .args
            .iter()
            .map(|a| workspace.substitute(a))
            .collect();

        let mut command = tokio::process::Command::new(&self.config.program);
        command
            .args(&args)
            .current_dir(workspace.root())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in workspace.env() {
            command.env(key, value);
        }

        debug!(
            program = %self.config.program,
            ?args,
            cwd = %workspace.root().display(),
            "Spawning engine"
        );
        let child = command.spawn().map_err(|source| EngineError::Spawn {
            program: self.config.program.clone(),
            source,
        })?;

        let timeout = Duration::from_secs(self.config.timeout_secs);
        // Dropping the wait future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(EngineError::Wait)?,
            Err(_) => return Err(EngineError::Timeout(timeout)),
        };

        debug!(
            status = ?output.status,
            stdout_bytes = output.stdout.len(),
            stderr_bytes = output.stderr.len(),
            "Engine exited"
        );

        Ok(Invocation {
            success: output.status.success(),
            exit_code: output.status.code(),
            stderr_tail: if output.status.success() {
                None
            } else {
                tail(&output.stderr)
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use auditbench_core::{ModelRef, RunSpec};
    use std::path::Path;

    fn workspace() -> CellWorkspace {
        let spec = RunSpec::new(
            "requests",
            ModelRef::new("gemini", "gemini-2.0-flash"),
            "security",
            false,
            1,
        );
        CellWorkspace::create(None, &spec, Path::new("/r"), &["security".to_string()], 1.0)
            .unwrap()
    }

    fn shell(script: &str, timeout_secs: u64) -> ProcessEngine {
        ProcessEngine::new(EngineConfig {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            timeout_secs,
            budget_usd: 1.0,
        })
    }

    #[test]
    fn test_tail_keeps_last_bytes() {
        assert_eq!(tail(b"  \n"), None);
        assert_eq!(tail(b"boom\n"), Some("boom".to_string()));
        let long = "x".repeat(STDERR_TAIL_BYTES + 100);
        assert_eq!(tail(long.as_bytes()).unwrap().len(), STDERR_TAIL_BYTES);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_engine_writes_into_workspace() {
        let ws = workspace();
        let engine = shell(
            "echo '{\"findings\": []}' > \"$AUDITBENCH_FINDINGS\" && test -f auditbench-cell.yml",
            10,
        );
        let invocation = engine.invoke(&ws).await.unwrap();
        assert!(invocation.success);
        assert_eq!(invocation.exit_code, Some(0));
        assert!(ws.paths().findings.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_engine_reports_nonzero_exit() {
        let ws = workspace();
        let engine = shell("echo 'rate limited' >&2; exit 3", 10);
        let invocation = engine.invoke(&ws).await.unwrap();
        assert!(!invocation.success);
        assert_eq!(invocation.exit_code, Some(3));
        assert_eq!(invocation.stderr_tail.as_deref(), Some("rate limited"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_engine_timeout() {
        let ws = workspace();
        let engine = shell("sleep 5", 1);
        let err = engine.invoke(&ws).await.unwrap_err();
        assert!(matches!(err, EngineError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_process_engine_spawn_failure() {
        let ws = workspace();
        let engine = ProcessEngine::new(EngineConfig {
            program: "/nonexistent/auditbench-engine".to_string(),
            ..EngineConfig::default()
        });
        let err = engine.invoke(&ws).await.unwrap_err();
        assert!(matches!(err, EngineError::Spawn { .. }));
    }
}
