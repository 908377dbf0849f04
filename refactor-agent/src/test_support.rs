//! Test-only fakes and fixture builders for the pipeline capabilities.
//!
//! The scripted fakes record every request they receive and replay queued
//! responses, so tests can assert on both the calls made and the pipeline's
//! reaction to any scripted outcome.

use std::cell::RefCell;
use std::collections::VecDeque;

use serde_json::{Value, json};

use crate::core::changelog::{ChangeLog, ChangeRecord};
use crate::core::manifest::{Area, FileEntry, Manifest, ManifestSummary};
use crate::core::plan::{PassSpec, RefactorPlan, resolve_targets};
use crate::core::types::Finding;
use crate::error::PipelineError;
use crate::io::agent::{
    AgentInvoker, AgentRequest, PassRequest, Refactorer, ReviewRequest, SampleReviewer,
};
use crate::core::types::{CommandResult, CommandStatus};
use crate::io::commands::{CheckOutcome, CheckRunner, CheckStatus, CommandRunner, CommandSpec};

/// Agent fake replaying a queue of scripted payloads or errors.
pub struct ScriptedAgent {
    responses: RefCell<VecDeque<Result<Value, PipelineError>>>,
    prompts: RefCell<Vec<String>>,
}

impl ScriptedAgent {
    pub fn with(responses: Vec<Result<Value, PipelineError>>) -> Self {
        Self {
            responses: RefCell::new(responses.into()),
            prompts: RefCell::new(Vec::new()),
        }
    }

    /// Prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.borrow().clone()
    }
}

impl AgentInvoker for ScriptedAgent {
    fn invoke(&self, request: &AgentRequest<'_>) -> Result<Value, PipelineError> {
        self.prompts.borrow_mut().push(request.prompt.clone());
        self.responses
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| {
                Err(PipelineError::AgentInvocation {
                    stage: request.stage.as_str().to_string(),
                    detail: "scripted agent exhausted".to_string(),
                    timed_out: false,
                })
            })
    }
}

/// One recorded refactorer call.
#[derive(Debug, Clone)]
pub struct RecordedPass {
    pub pass: String,
    pub area: Area,
    pub targets: Vec<String>,
    pub dry_run: bool,
}

/// Refactorer fake that derives a covering change log from each request.
pub struct ScriptedRefactorer {
    failing_pass: Option<String>,
    requests: RefCell<Vec<RecordedPass>>,
}

impl ScriptedRefactorer {
    /// Fake that succeeds on every pass, logging a change per target file.
    pub fn succeeding() -> Self {
        Self {
            failing_pass: None,
            requests: RefCell::new(Vec::new()),
        }
    }

    /// Fake that fails every area of the named pass and succeeds elsewhere.
    pub fn failing_on_pass(name: &str) -> Self {
        Self {
            failing_pass: Some(name.to_string()),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<RecordedPass> {
        self.requests.borrow().clone()
    }
}

impl Refactorer for ScriptedRefactorer {
    fn apply_pass(&self, request: &PassRequest<'_>) -> Result<ChangeLog, PipelineError> {
        self.requests.borrow_mut().push(RecordedPass {
            pass: request.pass.name.clone(),
            area: request.area,
            targets: request.targets.to_vec(),
            dry_run: request.dry_run,
        });
        if self.failing_pass.as_deref() == Some(request.pass.name.as_str()) {
            return Err(PipelineError::AgentInvocation {
                stage: "apply".to_string(),
                detail: format!("scripted failure for pass '{}'", request.pass.name),
                timed_out: false,
            });
        }
        Ok(covering_log(request.pass, request.area, request.targets, request.dry_run))
    }
}

/// Reviewer fake returning fixed findings or a scripted failure.
pub struct StaticReviewer {
    findings: Vec<Finding>,
    fail: bool,
    requests: RefCell<Vec<Vec<String>>>,
}

impl StaticReviewer {
    pub fn clean() -> Self {
        Self::with_findings(Vec::new())
    }

    pub fn with_findings(findings: Vec<Finding>) -> Self {
        Self {
            findings,
            fail: false,
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            findings: Vec::new(),
            fail: true,
            requests: RefCell::new(Vec::new()),
        }
    }

    /// File lists received so far, in call order.
    pub fn requests(&self) -> Vec<Vec<String>> {
        self.requests.borrow().clone()
    }
}

impl SampleReviewer for StaticReviewer {
    fn review(&self, request: &ReviewRequest<'_>) -> Result<Vec<Finding>, PipelineError> {
        self.requests.borrow_mut().push(request.files.to_vec());
        if self.fail {
            return Err(PipelineError::AgentInvocation {
                stage: "verify".to_string(),
                detail: "scripted reviewer failure".to_string(),
                timed_out: false,
            });
        }
        Ok(self.findings.clone())
    }
}

/// Check runner fake failing only the named checks.
pub struct StaticCheckRunner {
    failing: Vec<String>,
}

impl StaticCheckRunner {
    pub fn all_passing() -> Self {
        Self {
            failing: Vec::new(),
        }
    }

    pub fn failing(names: &[&str]) -> Self {
        Self {
            failing: names.iter().map(|n| n.to_string()).collect(),
        }
    }
}

impl CheckRunner for StaticCheckRunner {
    fn run_check(
        &self,
        name: &str,
        _workdir: &std::path::Path,
        _timeout: std::time::Duration,
        _output_limit_bytes: usize,
    ) -> Result<CheckOutcome, PipelineError> {
        let failed = self.failing.iter().any(|n| n == name);
        Ok(CheckOutcome {
            name: name.to_string(),
            status: if failed {
                CheckStatus::Failed
            } else {
                CheckStatus::Passed
            },
            detail: failed.then(|| "exit status 1".to_string()),
        })
    }
}

/// Command runner fake keyed on the command's first argv element.
pub struct StaticCommandRunner {
    failing: Vec<String>,
    timing_out: Vec<String>,
}

impl StaticCommandRunner {
    pub fn all_passing() -> Self {
        Self {
            failing: Vec::new(),
            timing_out: Vec::new(),
        }
    }

    pub fn failing(programs: &[&str]) -> Self {
        Self {
            failing: programs.iter().map(|p| p.to_string()).collect(),
            timing_out: Vec::new(),
        }
    }

    pub fn timing_out(programs: &[&str]) -> Self {
        Self {
            failing: Vec::new(),
            timing_out: programs.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl CommandRunner for StaticCommandRunner {
    fn run(
        &self,
        spec: &CommandSpec,
        _workdir: &std::path::Path,
        _timeout: std::time::Duration,
        _output_limit_bytes: usize,
    ) -> Result<CommandResult, PipelineError> {
        let program = spec.argv.first().cloned().unwrap_or_default();
        let (status, exit_code) = if self.timing_out.contains(&program) {
            (CommandStatus::TimedOut, None)
        } else if self.failing.contains(&program) {
            (CommandStatus::Failed, Some(1))
        } else {
            (CommandStatus::Passed, Some(0))
        };
        Ok(CommandResult {
            command: spec.rendered(),
            exit_code,
            status,
            duration_ms: 1,
            output_tail: String::new(),
        })
    }
}

/// A small two-area manifest used across tests.
pub fn sample_manifest() -> Manifest {
    let files = vec![
        entry("api/main.py", "python", Area::Backend),
        entry("api/util.py", "python", Area::Backend),
        entry("shared/types.py", "python", Area::Shared),
        entry("web/app.tsx", "typescript", Area::Frontend),
    ];
    Manifest {
        scanned_at: None,
        summary: ManifestSummary {
            total_files: files.len(),
            by_language: [
                ("python".to_string(), 3),
                ("typescript".to_string(), 1),
            ]
            .into_iter()
            .collect(),
        },
        files,
    }
}

fn entry(path: &str, language: &str, area: Area) -> FileEntry {
    FileEntry {
        path: path.to_string(),
        language: language.to_string(),
        area,
    }
}

/// A three-pass plan whose targets all resolve against [`sample_manifest`].
pub fn sample_plan() -> RefactorPlan {
    RefactorPlan {
        plan_version: "1.0".to_string(),
        source_rules: "rules.md".to_string(),
        created_at: None,
        passes: vec![
            PassSpec {
                name: "structural-cleanup".to_string(),
                order: 1,
                targets: vec!["**/*.py".to_string()],
                operations: vec![
                    "remove-dead-code".to_string(),
                    "normalize-imports".to_string(),
                ],
                checks: Vec::new(),
            },
            PassSpec {
                name: "behavioral-refactor".to_string(),
                order: 2,
                targets: vec!["web/*.tsx".to_string()],
                operations: vec!["apply-rules".to_string()],
                checks: Vec::new(),
            },
            PassSpec {
                name: "documentation-sync".to_string(),
                order: 3,
                targets: vec!["**/*.py".to_string(), "web/*.tsx".to_string()],
                operations: vec!["sync-docs".to_string()],
                checks: Vec::new(),
            },
        ],
    }
}

/// Change logs that cover every (pass, area) target of the plan exactly.
pub fn logs_covering(plan: &RefactorPlan, manifest: &Manifest) -> Vec<ChangeLog> {
    let mut logs = Vec::new();
    for pass in plan.passes_in_order() {
        let targets = resolve_targets(pass, manifest).expect("valid plan globs");
        let mut by_area: std::collections::BTreeMap<Area, Vec<String>> =
            std::collections::BTreeMap::new();
        for path in targets {
            let area = manifest.area_of(&path).expect("target from manifest");
            by_area.entry(area).or_default().push(path);
        }
        for (area, paths) in by_area {
            logs.push(covering_log(pass, area, &paths, false));
        }
    }
    logs
}

fn covering_log(pass: &PassSpec, area: Area, targets: &[String], preview: bool) -> ChangeLog {
    ChangeLog {
        pass: pass.name.clone(),
        area,
        preview,
        changes: targets
            .iter()
            .map(|path| ChangeRecord {
                path: path.clone(),
                operations: pass.operations.clone(),
                rationale: format!("applied {}", pass.name),
                public_api: false,
            })
            .collect(),
    }
}

/// Temporary project directory with a rules file, removed on drop.
pub struct TestProject {
    dir: tempfile::TempDir,
}

impl TestProject {
    pub fn new() -> std::io::Result<Self> {
        let dir = tempfile::tempdir()?;
        std::fs::write(
            dir.path().join("rules.md"),
            "Prefer pathlib over os.path.\n",
        )?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &std::path::Path {
        self.dir.path()
    }

    pub fn rules(&self) -> std::path::PathBuf {
        self.dir.path().join("rules.md")
    }
}

/// Schema-valid manifest payload as the scan agent would return it.
pub fn manifest_payload(manifest: &Manifest) -> Value {
    serde_json::to_value(manifest).expect("manifest serializes")
}

/// Schema-valid plan payload as the interpret agent would return it.
pub fn plan_payload() -> Value {
    serde_json::to_value(sample_plan()).expect("plan serializes")
}

/// Schema-valid narrative payload as the report agent would return it.
pub fn narrative_payload() -> Value {
    json!({
        "highlights": ["Normalized imports across 3 Python files"],
        "recommendations": ["Enable the lint check in CI"],
    })
}
