//! Agent capability abstractions and their CLI-backed implementations.
//!
//! The orchestration core never talks to an LLM directly; it goes through
//! these traits. The real implementations spawn the `claude` CLI, while tests
//! use scripted stand-ins that return predetermined payloads.

use std::path::Path;
use std::process::Command;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::core::changelog::ChangeLog;
use crate::core::manifest::Area;
use crate::core::plan::PassSpec;
use crate::core::types::{Finding, Round, Severity, Stage};
use crate::error::PipelineError;
use crate::io::process::run_command_with_timeout;
use crate::io::prompt::PromptBuilder;
use crate::schemas;

/// Parameters for one external agent invocation.
#[derive(Debug, Clone)]
pub struct AgentRequest<'a> {
    /// Agent definition name, e.g. `project-scanner`.
    pub agent: &'a str,
    pub stage: Stage,
    pub workdir: &'a Path,
    pub prompt: String,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

/// Opaque agent capability: run agent X with a prompt, get back JSON.
pub trait AgentInvoker {
    fn invoke(&self, request: &AgentRequest<'_>) -> Result<Value, PipelineError>;
}

/// Parameters for one refactoring pass execution.
#[derive(Debug, Clone)]
pub struct PassRequest<'a> {
    pub pass: &'a PassSpec,
    pub area: Area,
    /// Resolved target files, already intersected with the manifest.
    pub targets: &'a [String],
    pub workdir: &'a Path,
    pub dry_run: bool,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

/// Refactorer capability: apply one pass to a target set, get a change log.
pub trait Refactorer {
    fn apply_pass(&self, request: &PassRequest<'_>) -> Result<ChangeLog, PipelineError>;
}

/// Parameters for a sampling-round deep review.
#[derive(Debug, Clone)]
pub struct ReviewRequest<'a> {
    pub files: &'a [String],
    pub workdir: &'a Path,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

/// Compliance-review capability used by the sampling round.
pub trait SampleReviewer {
    fn review(&self, request: &ReviewRequest<'_>) -> Result<Vec<Finding>, PipelineError>;
}

/// Invoker that spawns the `claude` CLI in print mode.
#[derive(Debug, Default)]
pub struct ClaudeCliInvoker;

impl AgentInvoker for ClaudeCliInvoker {
    #[instrument(skip_all, fields(agent = request.agent, stage = request.stage.as_str()))]
    fn invoke(&self, request: &AgentRequest<'_>) -> Result<Value, PipelineError> {
        info!(workdir = %request.workdir.display(), "starting agent invocation");

        let mut cmd = Command::new("claude");
        cmd.args(["--print", "--output-format", "json", "--agent", request.agent])
            .current_dir(request.workdir);

        let output = run_command_with_timeout(
            cmd,
            Some(request.prompt.as_bytes()),
            request.timeout,
            request.output_limit_bytes,
        )
        .map_err(|err| PipelineError::AgentInvocation {
            stage: request.stage.as_str().to_string(),
            detail: format!("{err:#}"),
            timed_out: false,
        })?;

        if output.timed_out {
            warn!(timeout_secs = request.timeout.as_secs(), "agent timed out");
            return Err(PipelineError::AgentInvocation {
                stage: request.stage.as_str().to_string(),
                detail: format!("agent timed out after {:?}", request.timeout),
                timed_out: true,
            });
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "agent process failed");
            return Err(PipelineError::AgentInvocation {
                stage: request.stage.as_str().to_string(),
                detail: format!(
                    "agent exited with status {:?}: {}",
                    output.status.code(),
                    output.combined_tail(2_000)
                ),
                timed_out: false,
            });
        }

        let payload = extract_payload(&String::from_utf8_lossy(&output.stdout)).map_err(
            |detail| PipelineError::Schema {
                stage: request.stage.as_str().to_string(),
                detail,
            },
        )?;
        debug!("agent payload parsed");
        Ok(payload)
    }
}

/// Unwrap the CLI's JSON envelope down to the agent's payload.
///
/// `--output-format json` wraps the agent's answer in a `result` field, which
/// may itself be a JSON document rendered as text (possibly fenced).
fn extract_payload(stdout: &str) -> Result<Value, String> {
    let value: Value = serde_json::from_str(stdout.trim())
        .map_err(|err| format!("agent output is not JSON: {err}"))?;
    match value.get("result") {
        Some(Value::String(inner)) => {
            let inner = inner
                .trim()
                .trim_start_matches("```json")
                .trim_start_matches("```")
                .trim_end_matches("```")
                .trim();
            serde_json::from_str(inner)
                .map_err(|err| format!("agent result is not JSON: {err}"))
        }
        Some(inner) => Ok(inner.clone()),
        None => Ok(value),
    }
}

/// Refactorer that delegates to an [`AgentInvoker`], selecting the agent by
/// area (frontend vs backend) the way the original pipeline routes passes.
pub struct CliRefactorer<'a, A: AgentInvoker> {
    invoker: &'a A,
    prompts: PromptBuilder,
}

impl<'a, A: AgentInvoker> CliRefactorer<'a, A> {
    pub fn new(invoker: &'a A) -> Self {
        Self {
            invoker,
            prompts: PromptBuilder::new(),
        }
    }

    fn agent_for(area: Area) -> &'static str {
        match area {
            Area::Frontend => "nextjs-refactorer",
            Area::Backend | Area::Shared => "python-refactorer",
        }
    }
}

impl<A: AgentInvoker> Refactorer for CliRefactorer<'_, A> {
    fn apply_pass(&self, request: &PassRequest<'_>) -> Result<ChangeLog, PipelineError> {
        let prompt = self
            .prompts
            .render_apply_pass(request.pass, request.area, request.targets, request.dry_run)
            .map_err(|err| PipelineError::Schema {
                stage: Stage::Apply.as_str().to_string(),
                detail: format!("render apply prompt: {err:#}"),
            })?;

        let payload = self.invoker.invoke(&AgentRequest {
            agent: Self::agent_for(request.area),
            stage: Stage::Apply,
            workdir: request.workdir,
            prompt,
            timeout: request.timeout,
            output_limit_bytes: request.output_limit_bytes,
        })?;

        schemas::validate(schemas::CHANGE_LOG, &payload).map_err(|detail| {
            PipelineError::Schema {
                stage: Stage::Apply.as_str().to_string(),
                detail,
            }
        })?;
        let mut log: ChangeLog =
            serde_json::from_value(payload).map_err(|err| PipelineError::Schema {
                stage: Stage::Apply.as_str().to_string(),
                detail: err.to_string(),
            })?;
        // The controller, not the agent, owns the log's identity fields.
        log.pass = request.pass.name.clone();
        log.area = request.area;
        log.preview = request.dry_run;
        Ok(log)
    }
}

/// Sampling reviewer backed by the compliance-checker agent.
pub struct CliSampleReviewer<'a, A: AgentInvoker> {
    invoker: &'a A,
    prompts: PromptBuilder,
}

impl<'a, A: AgentInvoker> CliSampleReviewer<'a, A> {
    pub fn new(invoker: &'a A) -> Self {
        Self {
            invoker,
            prompts: PromptBuilder::new(),
        }
    }
}

impl<A: AgentInvoker> SampleReviewer for CliSampleReviewer<'_, A> {
    fn review(&self, request: &ReviewRequest<'_>) -> Result<Vec<Finding>, PipelineError> {
        let prompt = self
            .prompts
            .render_sample_review(request.files)
            .map_err(|err| PipelineError::Schema {
                stage: Stage::Verify.as_str().to_string(),
                detail: format!("render review prompt: {err:#}"),
            })?;

        let payload = self.invoker.invoke(&AgentRequest {
            agent: "compliance-checker",
            stage: Stage::Verify,
            workdir: request.workdir,
            prompt,
            timeout: request.timeout,
            output_limit_bytes: request.output_limit_bytes,
        })?;

        schemas::validate(schemas::SAMPLE_REVIEW, &payload).map_err(|detail| {
            PipelineError::Schema {
                stage: Stage::Verify.as_str().to_string(),
                detail,
            }
        })?;

        #[derive(serde::Deserialize)]
        struct RawFinding {
            file: String,
            severity: Severity,
            message: String,
        }
        #[derive(serde::Deserialize)]
        struct RawReview {
            findings: Vec<RawFinding>,
        }
        let review: RawReview =
            serde_json::from_value(payload).map_err(|err| PipelineError::Schema {
                stage: Stage::Verify.as_str().to_string(),
                detail: err.to_string(),
            })?;
        Ok(review
            .findings
            .into_iter()
            .map(|f| Finding {
                round: Round::Sampling,
                severity: f.severity,
                file: f.file,
                message: f.message,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extract_payload_unwraps_string_result() {
        let stdout = json!({"result": "{\"files\": []}"}).to_string();
        let payload = extract_payload(&stdout).expect("extract");
        assert_eq!(payload, json!({"files": []}));
    }

    #[test]
    fn extract_payload_strips_code_fences() {
        let stdout = json!({"result": "```json\n{\"passes\": []}\n```"}).to_string();
        let payload = extract_payload(&stdout).expect("extract");
        assert_eq!(payload, json!({"passes": []}));
    }

    #[test]
    fn extract_payload_accepts_bare_json() {
        let payload = extract_payload("{\"findings\": []}").expect("extract");
        assert_eq!(payload, json!({"findings": []}));
    }

    #[test]
    fn extract_payload_rejects_non_json() {
        assert!(extract_payload("I could not produce output").is_err());
    }

    #[test]
    fn refactorer_routes_backend_and_shared_to_python_agent() {
        assert_eq!(
            CliRefactorer::<ClaudeCliInvoker>::agent_for(Area::Backend),
            "python-refactorer"
        );
        assert_eq!(
            CliRefactorer::<ClaudeCliInvoker>::agent_for(Area::Shared),
            "python-refactorer"
        );
        assert_eq!(
            CliRefactorer::<ClaudeCliInvoker>::agent_for(Area::Frontend),
            "nextjs-refactorer"
        );
    }
}
