//! Error taxonomy for the refactoring pipeline.
//!
//! Every failure the orchestrator can act on maps to one of these kinds.
//! Stage records and summaries carry the stable kind name so callers can
//! distinguish, say, a malformed agent payload from a dead agent backend.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Pipeline error kinds.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The agent returned a payload that does not match the stage's schema.
    #[error("agent output for stage '{stage}' failed schema validation: {detail}")]
    Schema { stage: String, detail: String },

    /// The external agent call itself failed or timed out.
    #[error("agent invocation for stage '{stage}' failed: {detail}")]
    AgentInvocation {
        stage: String,
        detail: String,
        timed_out: bool,
    },

    /// The refactor plan is malformed (duplicate/non-contiguous pass orders, etc.).
    #[error("invalid refactor plan: {0}")]
    PlanValidation(String),

    /// A declared blocking post-pass check failed.
    #[error("blocking check '{check}' failed in pass '{pass}'")]
    BlockingCheck { pass: String, check: String },

    /// A build command exceeded its timeout.
    #[error("build command '{command}' timed out after {timeout_secs}s")]
    BuildTimeout { command: String, timeout_secs: u64 },

    /// Another run already holds the lock for this project.
    #[error("run already in progress (lock held at {})", path.display())]
    RunLock { path: PathBuf },

    /// A required upstream artifact is missing from the store.
    #[error("artifact not found: {key}")]
    ArtifactNotFound { key: String },

    /// Filesystem failure while reading or writing an artifact.
    #[error("artifact i/o for '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    /// An artifact on disk is not valid JSON for its expected shape.
    #[error("artifact '{key}' is not valid JSON: {source}")]
    Json {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl PipelineError {
    /// Stable kind name recorded in run records and summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Schema { .. } => "SchemaError",
            Self::AgentInvocation { .. } => "AgentInvocationError",
            Self::PlanValidation(_) => "PlanValidationError",
            Self::BlockingCheck { .. } => "BlockingCheckFailure",
            Self::BuildTimeout { .. } => "BuildTimeoutError",
            Self::RunLock { .. } => "RunLockError",
            Self::ArtifactNotFound { .. } => "ArtifactNotFoundError",
            Self::Io { .. } => "IoError",
            Self::Json { .. } => "JsonError",
        }
    }
}

/// Serializable snapshot of a pipeline error, stored in stage records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageError {
    pub kind: String,
    pub message: String,
}

impl From<&PipelineError> for StageError {
    fn from(err: &PipelineError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_distinct_for_schema_and_invocation_failures() {
        let schema = PipelineError::Schema {
            stage: "scan".to_string(),
            detail: "missing field `files`".to_string(),
        };
        let invocation = PipelineError::AgentInvocation {
            stage: "scan".to_string(),
            detail: "process exited with status 1".to_string(),
            timed_out: false,
        };
        assert_eq!(schema.kind(), "SchemaError");
        assert_eq!(invocation.kind(), "AgentInvocationError");
        assert_ne!(schema.kind(), invocation.kind());
    }

    #[test]
    fn stage_error_snapshot_keeps_kind_and_message() {
        let err = PipelineError::BlockingCheck {
            pass: "structural-cleanup".to_string(),
            check: "lint".to_string(),
        };
        let snap = StageError::from(&err);
        assert_eq!(snap.kind, "BlockingCheckFailure");
        assert!(snap.message.contains("structural-cleanup"));
    }
}
