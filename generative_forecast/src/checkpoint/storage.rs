//! Storage backends and bounded retries for checkpoint transfer

use crate::error::{ForecastError, Result};
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

const FILE_SCHEME: &str = "file://";

/// Moves checkpoint files between a descriptor namespace and the local disk
pub trait Storage: Debug {
    /// Make the object named by `descriptor` available as a local file
    fn fetch(&self, descriptor: &str) -> Result<PathBuf>;

    /// Store the local file `local` under `descriptor`, returning the final descriptor
    fn put(&self, local: &Path, descriptor: &str) -> Result<String>;
}

/// Plain filesystem storage. Descriptors are paths, optionally `file://` prefixed,
/// resolved under `root` when it is set and the path is relative.
#[derive(Debug, Clone, Default)]
pub struct LocalStorage {
    root: Option<PathBuf>,
}

impl LocalStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Local path a descriptor refers to
    pub fn resolve(&self, descriptor: &str) -> PathBuf {
        let raw = Path::new(descriptor.strip_prefix(FILE_SCHEME).unwrap_or(descriptor));
        match &self.root {
            Some(root) if raw.is_relative() => root.join(raw),
            _ => raw.to_path_buf(),
        }
    }
}

impl Storage for LocalStorage {
    fn fetch(&self, descriptor: &str) -> Result<PathBuf> {
        let path = self.resolve(descriptor);
        if !path.is_file() {
            return Err(ForecastError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no file at {}", path.display()),
            )));
        }
        Ok(path)
    }

    fn put(&self, local: &Path, descriptor: &str) -> Result<String> {
        let target = self.resolve(descriptor);
        if target == local {
            return Ok(target.display().to_string());
        }
        let dir = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        // Copy into a sibling temp file so the rename stays on one filesystem
        let staged = NamedTempFile::new_in(&dir)?;
        std::fs::copy(local, staged.path())?;
        staged.persist(&target).map_err(|e| ForecastError::Io(e.error))?;

        debug!(from = %local.display(), to = %target.display(), "file stored");
        Ok(target.display().to_string())
    }
}

/// Bounded retry with exponential backoff for transient storage errors
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(200),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            multiplier: 1.0,
        }
    }

    /// Run `op`, retrying while it fails with a transient error and attempts remain
    pub fn run<T, F>(&self, op_name: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        let attempts = self.max_attempts.max(1);
        let mut backoff = self.initial_backoff;
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < attempts => {
                    warn!(
                        op = op_name,
                        attempt,
                        max_attempts = attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "transient storage error, retrying"
                    );
                    thread::sleep(backoff);
                    backoff = backoff.mul_f64(self.multiplier.max(1.0));
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::io::{Error, ErrorKind};

    fn quick(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            multiplier: 2.0,
        }
    }

    #[test]
    fn retries_transient_errors_until_success() {
        let calls = Cell::new(0);
        let result = quick(3).run("test", || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(ForecastError::Io(Error::new(ErrorKind::TimedOut, "slow")))
            } else {
                Ok(calls.get())
            }
        });
        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let calls = Cell::new(0);
        let result: Result<()> = quick(2).run("test", || {
            calls.set(calls.get() + 1);
            Err(ForecastError::Io(Error::new(ErrorKind::Interrupted, "again")))
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn permanent_errors_are_not_retried() {
        let calls = Cell::new(0);
        let result: Result<()> = quick(5).run("test", || {
            calls.set(calls.get() + 1);
            Err(ForecastError::CorruptCheckpoint("bad".to_string()))
        });
        assert!(matches!(result, Err(ForecastError::CorruptCheckpoint(_))));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn resolves_file_scheme_under_root() {
        let storage = LocalStorage::with_root("/data");
        assert_eq!(storage.resolve("file://models/a.json"), PathBuf::from("/data/models/a.json"));
        assert_eq!(storage.resolve("/abs/a.json"), PathBuf::from("/abs/a.json"));
        assert_eq!(LocalStorage::new().resolve("a.json"), PathBuf::from("a.json"));
    }

    #[test]
    fn fetch_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = LocalStorage::with_root(dir.path()).fetch("series.csv").unwrap_err();
        match err {
            ForecastError::Io(e) => {
                assert_eq!(e.kind(), std::io::ErrorKind::NotFound);
                assert!(e.to_string().starts_with("no file at "));
            }
            other => panic!("unexpected error: {}", other),
        }
    }
}
