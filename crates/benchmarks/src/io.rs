// Copyright 2025 AuditBench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Result store I/O.
//!
//! Records live under the results directory at their deterministic
//! [`ResultId`] path. Writes are atomic and write-once: a record is staged in
//! a temporary file next to its destination and persisted without clobbering,
//! so a crash mid-write never leaves a truncated record behind and an existing
//! record is never replaced.
//!
//! Concurrent orchestrators coordinate through claim markers
//! (`<record>.claim`) created with `create_new`. A claim older than the
//! configured time-to-live is treated as abandoned and may be taken over.

use auditbench_core::{ResultId, ResultRecord};
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors raised by the result store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The results directory could not be created
    #[error("Cannot create results directory {path}: {source}")]
    ResultsDir {
        /// Results directory
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Reading or writing a record failed
    #[error("I/O error at {path}: {source}")]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// A record could not be encoded or decoded
    #[error("Invalid record {path}: {source}")]
    Json {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: serde_json::Error,
    },

    /// A record already exists at this identity
    #[error("Record already exists: {0}")]
    AlreadyExists(PathBuf),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// A record file that could not be loaded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnreadableRecord {
    /// File path
    pub path: PathBuf,
    /// Why it could not be loaded
    pub error: String,
}

/// Records loaded from one directory listing.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    /// Records, sorted by path
    pub records: Vec<ResultRecord>,
    /// Files that looked like records but failed to load
    pub unreadable: Vec<UnreadableRecord>,
}

/// Held while a worker executes a cell; removes the claim marker on drop.
#[derive(Debug)]
pub struct ClaimGuard {
    path: PathBuf,
}

impl ClaimGuard {
    /// Marker path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "Failed to release claim");
            }
        }
    }
}

/// Directory of persisted result records.
#[derive(Debug, Clone)]
pub struct ResultStore {
    root: PathBuf,
}

impl ResultStore {
    /// Open the store, creating the results directory.
    ///
    /// Failure here is fatal to an orchestration: nothing could be persisted.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| StoreError::ResultsDir {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root })
    }

    /// Open an existing directory for reading without creating it.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Results directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute record path for `id`.
    pub fn record_path(&self, id: &ResultId) -> PathBuf {
        id.record_path(&self.root)
    }

    /// Whether a record exists for `id`.
    pub fn contains(&self, id: &ResultId) -> bool {
        self.record_path(id).is_file()
    }

    /// Persist a record atomically at its identity path.
    pub fn write(&self, record: &ResultRecord) -> Result<PathBuf> {
        let path = self.record_path(&record.spec.result_id());
        let dir = path.parent().unwrap_or(self.root.as_path());
        fs::create_dir_all(dir).map_err(io_err(dir))?;

        let mut staged = NamedTempFile::new_in(dir).map_err(io_err(dir))?;
        serde_json::to_writer_pretty(&mut staged, record).map_err(|source| StoreError::Json {
            path: path.clone(),
            source,
        })?;
        staged.write_all(b"\n").map_err(io_err(&path))?;
        staged.as_file().sync_all().map_err(io_err(&path))?;

        match staged.persist_noclobber(&path) {
            Ok(_) => Ok(path),
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                Err(StoreError::AlreadyExists(path))
            }
            Err(e) => Err(StoreError::Io {
                path,
                source: e.error,
            }),
        }
    }

    /// Load one record.
    pub fn read(&self, path: &Path) -> Result<ResultRecord> {
        let content = fs::read_to_string(path).map_err(io_err(path))?;
        serde_json::from_str(&content).map_err(|source| StoreError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Try to claim `id` for execution.
    ///
    /// Returns `None` when another worker holds a live claim. A claim whose
    /// marker is older than `ttl` is taken over.
    pub fn claim(&self, id: &ResultId, ttl: Duration) -> Result<Option<ClaimGuard>> {
        let path = id.claim_path(&self.root);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(io_err(dir))?;
        }

        for attempt in 0..2 {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    let stamp = format!(
                        "{{\"pid\":{},\"claimed_at\":\"{}\"}}\n",
                        std::process::id(),
                        chrono::Utc::now().to_rfc3339()
                    );
                    if let Err(e) = file.write_all(stamp.as_bytes()) {
                        debug!(claim = %path.display(), error = %e, "Claim stamp not written");
                    }
                    return Ok(Some(ClaimGuard { path }));
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    if attempt == 0 && is_stale(&path, ttl) {
                        warn!(claim = %path.display(), "Taking over stale claim");
                        match fs::remove_file(&path) {
                            Ok(()) => continue,
                            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                            Err(e) => return Err(io_err(&path)(e)),
                        }
                    }
                    debug!(claim = %path.display(), "Cell claimed by another worker");
                    return Ok(None);
                }
                Err(e) => return Err(io_err(&path)(e)),
            }
        }
        Ok(None)
    }

    /// Record files under the results directory, sorted.
    ///
    /// The directory is listed exactly once; files appearing afterwards are
    /// not part of the listing.
    pub fn list(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        if self.root.is_dir() {
            collect_records(&self.root, &mut files)?;
        }
        files.sort();
        Ok(files)
    }

    /// Load every record from a single listing.
    ///
    /// Files that fail to load are reported in [`Snapshot::unreadable`]
    /// rather than aborting the load.
    pub fn snapshot(&self) -> Result<Snapshot> {
        let mut snapshot = Snapshot::default();
        for path in self.list()? {
            match self.read(&path) {
                Ok(record) => snapshot.records.push(record),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable record");
                    snapshot.unreadable.push(UnreadableRecord {
                        path,
                        error: e.to_string(),
                    });
                }
            }
        }
        Ok(snapshot)
    }
}

fn is_stale(path: &Path, ttl: Duration) -> bool {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .map(|age| age > ttl)
        .unwrap_or(false)
}

fn collect_records(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir).map_err(io_err(dir))? {
        let entry = entry.map_err(io_err(dir))?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(io_err(&path))?;
        if file_type.is_dir() {
            collect_records(&path, out)?;
        } else if file_type.is_file() && path.extension().map_or(false, |e| e == "json") {
            out.push(path);
        }
    }
    Ok(())
}
