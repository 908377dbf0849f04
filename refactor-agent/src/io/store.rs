//! Run-scoped artifact store rooted at `<project>/.refactor/`.
//!
//! Every pipeline output goes through this store; no component touches the
//! raw filesystem ad hoc. Writes are atomic per key (temp file + rename), so
//! a reader never observes a partially written artifact. Stages write
//! disjoint keys, so no cross-key transactions exist.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::error::PipelineError;

/// Stable artifact keys (relative paths under the store root).
pub mod keys {
    use crate::core::manifest::Area;

    pub const MANIFEST: &str = "manifest.json";
    pub const PLAN: &str = "refactor_plan.json";
    pub const COMPLIANCE: &str = "compliance_report.json";
    pub const BUILD_REPORT: &str = "build_report.json";
    pub const SUMMARY_JSON: &str = "summary.json";
    pub const SUMMARY_MD: &str = "summary.md";
    pub const RUN: &str = "pipeline_run.json";

    pub fn change_log(area: Area, pass: &str) -> String {
        format!("logs/{}/{}.json", area.as_str(), pass)
    }
}

/// Durable key-value record of pipeline outputs.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Store namespaced to a project's `.refactor/` directory.
    pub fn for_project(project: &Path) -> Self {
        Self::new(project.join(".refactor"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ensure_root(&self) -> Result<(), PipelineError> {
        fs::create_dir_all(&self.root).map_err(|source| PipelineError::Io {
            key: self.root.display().to_string(),
            source,
        })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    /// Non-throwing existence check.
    pub fn exists(&self, key: &str) -> bool {
        self.path_for(key).is_file()
    }

    /// Persist a JSON-serializable value under `key`, atomically.
    /// A stage re-running overwrites its own artifact.
    pub fn put_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), PipelineError> {
        let mut buf = serde_json::to_string_pretty(value).map_err(|source| {
            PipelineError::Json {
                key: key.to_string(),
                source,
            }
        })?;
        buf.push('\n');
        self.write_atomic(key, buf.as_bytes())
    }

    /// Persist raw text (e.g. `summary.md`) under `key`, atomically.
    pub fn put_text(&self, key: &str, text: &str) -> Result<(), PipelineError> {
        self.write_atomic(key, text.as_bytes())
    }

    /// Load and deserialize the artifact at `key`.
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<T, PipelineError> {
        let value = self.get_value(key)?;
        serde_json::from_value(value).map_err(|source| PipelineError::Json {
            key: key.to_string(),
            source,
        })
    }

    /// Load the artifact at `key` as a raw JSON value.
    pub fn get_value(&self, key: &str) -> Result<Value, PipelineError> {
        let path = self.path_for(key);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
                return Err(PipelineError::ArtifactNotFound {
                    key: key.to_string(),
                });
            }
            Err(source) => {
                return Err(PipelineError::Io {
                    key: key.to_string(),
                    source,
                });
            }
        };
        serde_json::from_str(&contents).map_err(|source| PipelineError::Json {
            key: key.to_string(),
            source,
        })
    }

    fn write_atomic(&self, key: &str, contents: &[u8]) -> Result<(), PipelineError> {
        let path = self.path_for(key);
        let io_err = |source| PipelineError::Io {
            key: key.to_string(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let tmp_path = path.with_extension("tmp");
        fs::write(&tmp_path, contents).map_err(io_err)?;
        fs::rename(&tmp_path, &path).map_err(io_err)?;
        debug!(key, bytes = contents.len(), "artifact written");
        Ok(())
    }
}
