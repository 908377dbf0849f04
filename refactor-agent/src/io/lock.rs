//! Run lock serializing pipeline runs against one project.
//!
//! Concurrent runs against different projects are fine (the store is
//! namespaced per project); a second run against the same project must fail
//! fast rather than queue.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::PipelineError;

const LOCK_FILE: &str = "run.lock";

/// Held for the duration of a pipeline run; the lock file is removed on drop.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
    released: bool,
}

impl RunLock {
    /// Acquire the lock under `root`, failing immediately if it is held.
    pub fn acquire(root: &Path, run_id: &str) -> Result<Self, PipelineError> {
        fs::create_dir_all(root).map_err(|source| PipelineError::Io {
            key: root.display().to_string(),
            source,
        })?;
        let path = root.join(LOCK_FILE);
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(PipelineError::RunLock { path });
            }
            Err(source) => {
                return Err(PipelineError::Io {
                    key: path.display().to_string(),
                    source,
                });
            }
        };
        let body = format!("run_id={run_id}\npid={}\n", std::process::id());
        file.write_all(body.as_bytes())
            .map_err(|source| PipelineError::Io {
                key: path.display().to_string(),
                source,
            })?;
        debug!(path = %path.display(), run_id, "run lock acquired");
        Ok(Self {
            path,
            released: false,
        })
    }

    /// Explicit release; equivalent to dropping but surfaces removal errors.
    pub fn release(mut self) -> Result<(), PipelineError> {
        self.released = true;
        fs::remove_file(&self.path).map_err(|source| PipelineError::Io {
            key: self.path.display().to_string(),
            source,
        })
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(err) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), err = %err, "failed to remove run lock");
        }
    }
}
