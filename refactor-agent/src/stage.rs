//! Stage executor: the validation boundary between the pipeline and the
//! external agent capability.
//!
//! Every agent-backed stage flows through here: assemble the input contract,
//! invoke the agent, validate the payload against the stage's schema, persist
//! it, and hand back a typed artifact. Nothing downstream ever sees an
//! unvalidated payload.

use std::path::Path;

use serde_json::Value;
use tracing::{debug, instrument};

use crate::core::manifest::Manifest;
use crate::core::plan::RefactorPlan;
use crate::core::summary::Narrative;
use crate::core::types::Stage;
use crate::error::PipelineError;
use crate::io::agent::{AgentInvoker, AgentRequest};
use crate::io::config::PipelineConfig;
use crate::io::prompt::PromptBuilder;
use crate::io::store::{ArtifactStore, keys};
use crate::schemas;

/// Declaration of one agent-backed stage.
struct StageSpec {
    stage: Stage,
    agent: &'static str,
    schema: &'static str,
    /// Store key for the validated payload; `None` when the caller persists
    /// a derived artifact itself (the report stage).
    artifact_key: Option<&'static str>,
}

const SCAN: StageSpec = StageSpec {
    stage: Stage::Scan,
    agent: "project-scanner",
    schema: schemas::MANIFEST,
    artifact_key: Some(keys::MANIFEST),
};

const INTERPRET: StageSpec = StageSpec {
    stage: Stage::Interpret,
    agent: "rules-interpreter",
    schema: schemas::PLAN,
    artifact_key: Some(keys::PLAN),
};

const REPORT: StageSpec = StageSpec {
    stage: Stage::Report,
    agent: "summary-reporter",
    schema: schemas::NARRATIVE,
    artifact_key: None,
};

/// Executes one named stage against the injected agent capability.
pub struct StageExecutor<'a, A: AgentInvoker + ?Sized> {
    store: &'a ArtifactStore,
    invoker: &'a A,
    config: &'a PipelineConfig,
    workdir: &'a Path,
    prompts: PromptBuilder,
}

impl<'a, A: AgentInvoker + ?Sized> StageExecutor<'a, A> {
    pub fn new(
        store: &'a ArtifactStore,
        invoker: &'a A,
        config: &'a PipelineConfig,
        workdir: &'a Path,
    ) -> Self {
        Self {
            store,
            invoker,
            config,
            workdir,
            prompts: PromptBuilder::new(),
        }
    }

    /// Run the scan stage: produce and persist the project manifest.
    #[instrument(skip_all)]
    pub fn run_scan(&self) -> Result<Manifest, PipelineError> {
        let prompt = self
            .prompts
            .render_scan(&self.workdir.display().to_string())
            .map_err(|err| render_error(Stage::Scan, err))?;
        let payload = self.execute(&SCAN, prompt)?;
        let manifest: Manifest = deserialize(Stage::Scan, payload)?;
        manifest.validate().map_err(|detail| PipelineError::Schema {
            stage: Stage::Scan.as_str().to_string(),
            detail,
        })?;
        debug!(files = manifest.files.len(), "manifest accepted");
        Ok(manifest)
    }

    /// Run the interpret stage: turn the rules file into a validated plan.
    ///
    /// Plan-level constraint violations (orders, duplicate names) are a
    /// `PlanValidationError`, distinct from schema mismatch, and the payload
    /// is not persisted in that case.
    #[instrument(skip_all)]
    pub fn run_interpret(
        &self,
        rules_path: &str,
        rules_text: &str,
    ) -> Result<RefactorPlan, PipelineError> {
        let prompt = self
            .prompts
            .render_interpret(rules_path, rules_text)
            .map_err(|err| render_error(Stage::Interpret, err))?;

        let payload = self.invoke(&INTERPRET, prompt)?;
        self.check_schema(&INTERPRET, &payload)?;
        let plan: RefactorPlan = deserialize(Stage::Interpret, payload)?;
        plan.validate()?;
        self.store.put_json(keys::PLAN, &plan)?;
        debug!(passes = plan.passes.len(), "plan accepted");
        Ok(plan)
    }

    /// Run the report stage's agent for narrative sections.
    #[instrument(skip_all)]
    pub fn run_report_narrative(
        &self,
        status: &str,
        files_changed: usize,
        verification: &str,
        build: &str,
        stages: &[String],
    ) -> Result<Narrative, PipelineError> {
        let prompt = self
            .prompts
            .render_report(status, files_changed, verification, build, stages)
            .map_err(|err| render_error(Stage::Report, err))?;
        let payload = self.execute(&REPORT, prompt)?;
        deserialize(Stage::Report, payload)
    }

    fn execute(&self, spec: &StageSpec, prompt: String) -> Result<Value, PipelineError> {
        let payload = self.invoke(spec, prompt)?;
        self.check_schema(spec, &payload)?;
        if let Some(key) = spec.artifact_key {
            self.store.put_json(key, &payload)?;
        }
        Ok(payload)
    }

    fn invoke(&self, spec: &StageSpec, prompt: String) -> Result<Value, PipelineError> {
        self.invoker.invoke(&AgentRequest {
            agent: spec.agent,
            stage: spec.stage,
            workdir: self.workdir,
            prompt,
            timeout: self.config.agent_timeout(),
            output_limit_bytes: self.config.output_limit_bytes,
        })
    }

    fn check_schema(&self, spec: &StageSpec, payload: &Value) -> Result<(), PipelineError> {
        schemas::validate(spec.schema, payload).map_err(|detail| PipelineError::Schema {
            stage: spec.stage.as_str().to_string(),
            detail,
        })
    }
}

fn deserialize<T: serde::de::DeserializeOwned>(
    stage: Stage,
    payload: Value,
) -> Result<T, PipelineError> {
    serde_json::from_value(payload).map_err(|err| PipelineError::Schema {
        stage: stage.as_str().to_string(),
        detail: err.to_string(),
    })
}

fn render_error(stage: Stage, err: anyhow::Error) -> PipelineError {
    PipelineError::Schema {
        stage: stage.as_str().to_string(),
        detail: format!("render prompt: {err:#}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedAgent, manifest_payload, plan_payload, sample_manifest};
    use serde_json::json;

    fn fixture() -> (tempfile::TempDir, ArtifactStore, PipelineConfig) {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = ArtifactStore::for_project(temp.path());
        store.ensure_root().expect("ensure root");
        (temp, store, PipelineConfig::default())
    }

    #[test]
    fn scan_persists_validated_manifest() {
        let (temp, store, config) = fixture();
        let agent = ScriptedAgent::with(vec![Ok(manifest_payload(&sample_manifest()))]);
        let executor = StageExecutor::new(&store, &agent, &config, temp.path());

        let manifest = executor.run_scan().expect("scan");
        assert_eq!(manifest.files.len(), sample_manifest().files.len());
        assert!(store.exists(keys::MANIFEST));
    }

    #[test]
    fn malformed_scan_payload_is_a_schema_error_and_not_persisted() {
        let (temp, store, config) = fixture();
        let agent = ScriptedAgent::with(vec![Ok(json!({"unexpected": true}))]);
        let executor = StageExecutor::new(&store, &agent, &config, temp.path());

        let err = executor.run_scan().expect_err("schema mismatch");
        assert_eq!(err.kind(), "SchemaError");
        assert!(!store.exists(keys::MANIFEST));
    }

    #[test]
    fn inconsistent_manifest_counts_are_a_schema_error() {
        let (temp, store, config) = fixture();
        let mut manifest = sample_manifest();
        manifest.summary.total_files = 99;
        let agent = ScriptedAgent::with(vec![Ok(manifest_payload(&manifest))]);
        let executor = StageExecutor::new(&store, &agent, &config, temp.path());

        let err = executor.run_scan().expect_err("inconsistent manifest");
        assert_eq!(err.kind(), "SchemaError");
    }

    #[test]
    fn agent_failure_keeps_its_invocation_kind() {
        let (temp, store, config) = fixture();
        let agent = ScriptedAgent::with(vec![Err(PipelineError::AgentInvocation {
            stage: "scan".to_string(),
            detail: "backend unreachable".to_string(),
            timed_out: false,
        })]);
        let executor = StageExecutor::new(&store, &agent, &config, temp.path());

        let err = executor.run_scan().expect_err("invocation failure");
        assert_eq!(err.kind(), "AgentInvocationError");
    }

    #[test]
    fn interpret_rejects_non_contiguous_orders_without_persisting() {
        let (temp, store, config) = fixture();
        let mut payload = plan_payload();
        payload["passes"][1]["order"] = json!(5);
        let agent = ScriptedAgent::with(vec![Ok(payload)]);
        let executor = StageExecutor::new(&store, &agent, &config, temp.path());

        let err = executor
            .run_interpret("rules.md", "be tidy")
            .expect_err("bad orders");
        assert_eq!(err.kind(), "PlanValidationError");
        assert!(!store.exists(keys::PLAN));
    }

    #[test]
    fn interpret_persists_valid_plan() {
        let (temp, store, config) = fixture();
        let agent = ScriptedAgent::with(vec![Ok(plan_payload())]);
        let executor = StageExecutor::new(&store, &agent, &config, temp.path());

        let plan = executor
            .run_interpret("rules.md", "be tidy")
            .expect("interpret");
        assert_eq!(plan.passes.len(), 3);
        assert!(store.exists(keys::PLAN));
    }
}
