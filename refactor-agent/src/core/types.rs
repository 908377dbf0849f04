//! Shared deterministic types for pipeline core logic.
//!
//! These types define stable contracts between components. They must not
//! depend on external state or I/O and must serialize deterministically.

use serde::{Deserialize, Serialize};

/// Pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Scan,
    Interpret,
    Apply,
    Verify,
    Build,
    Report,
}

impl Stage {
    /// All stages in execution order.
    pub const ALL: [Stage; 6] = [
        Stage::Scan,
        Stage::Interpret,
        Stage::Apply,
        Stage::Verify,
        Stage::Build,
        Stage::Report,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Scan => "scan",
            Stage::Interpret => "interpret",
            Stage::Apply => "apply",
            Stage::Verify => "verify",
            Stage::Build => "build",
            Stage::Report => "report",
        }
    }
}

/// Orchestrator state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineState {
    Scanning,
    Interpreting,
    Applying,
    Verifying,
    Building,
    Reporting,
    Done,
    Aborted,
}

impl PipelineState {
    /// Whether the state machine can still advance.
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Aborted)
    }

    /// The state that executes `stage`.
    pub fn for_stage(stage: Stage) -> Self {
        match stage {
            Stage::Scan => PipelineState::Scanning,
            Stage::Interpret => PipelineState::Interpreting,
            Stage::Apply => PipelineState::Applying,
            Stage::Verify => PipelineState::Verifying,
            Stage::Build => PipelineState::Building,
            Stage::Report => PipelineState::Reporting,
        }
    }
}

/// Per-stage completion status recorded on the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Pending,
    Running,
    Succeeded,
    /// Completed but with recorded non-fatal failures (advisory checks, etc.).
    Partial,
    Failed,
    Skipped,
}

/// Terminal status of a whole pipeline run.
///
/// `Degraded` means the run reached reporting but something went wrong along
/// the way; `Aborted` means it could not complete. Callers map these to
/// distinct exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Degraded,
    Aborted,
}

/// Severity of a compliance finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Blocking,
}

/// Aggregated verdict of a verification run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Pass,
    Warnings,
    Fail,
}

/// Independent verification rounds within the verify stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Round {
    Coverage,
    SideEffect,
    Sampling,
}

impl Round {
    pub const ALL: [Round; 3] = [Round::Coverage, Round::SideEffect, Round::Sampling];

    pub fn as_str(self) -> &'static str {
        match self {
            Round::Coverage => "coverage",
            Round::SideEffect => "side-effect",
            Round::Sampling => "sampling",
        }
    }
}

/// A single compliance finding tagged with its round, severity, and file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Finding {
    pub round: Round,
    pub severity: Severity,
    pub file: String,
    pub message: String,
}

/// Outcome classification for one executed build command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CommandStatus {
    Passed,
    Failed,
    TimedOut,
}

/// Result of one build/test command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    /// Rendered command line, e.g. `npm run build`.
    pub command: String,
    pub exit_code: Option<i32>,
    pub status: CommandStatus,
    pub duration_ms: u64,
    /// Truncated tail of combined stdout/stderr.
    pub output_tail: String,
}

/// One build stage invocation. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildReport {
    pub passed: bool,
    pub commands: Vec<CommandResult>,
    #[serde(default)]
    pub generated_at: Option<String>,
}

// Ord on Round only exists to give findings a stable sort order.
impl PartialOrd for Round {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Round {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (*self as u8).cmp(&(*other as u8))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_serialize_to_lowercase_names() {
        let json = serde_json::to_string(&Stage::Interpret).expect("serialize");
        assert_eq!(json, "\"interpret\"");
    }

    #[test]
    fn severity_orders_blocking_highest() {
        assert!(Severity::Blocking > Severity::Warning);
        assert!(Severity::Warning > Severity::Info);
    }

    #[test]
    fn round_serializes_kebab_case() {
        let json = serde_json::to_string(&Round::SideEffect).expect("serialize");
        assert_eq!(json, "\"side-effect\"");
    }

    #[test]
    fn terminal_states_are_done_and_aborted() {
        for state in [
            PipelineState::Scanning,
            PipelineState::Interpreting,
            PipelineState::Applying,
            PipelineState::Verifying,
            PipelineState::Building,
            PipelineState::Reporting,
        ] {
            assert!(!state.is_terminal());
        }
        assert!(PipelineState::Done.is_terminal());
        assert!(PipelineState::Aborted.is_terminal());
    }
}
