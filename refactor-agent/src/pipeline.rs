//! Pipeline orchestrator: the single-threaded stage loop.
//!
//! Each stage transition is persisted to `pipeline_run.json` before the next
//! stage starts, so an interrupted run leaves an accurate record. Scanning
//! and interpreting failures abort the run; everything downstream degrades
//! instead of aborting.

use std::fs;
use std::path::PathBuf;

use chrono::Utc;
use tracing::{info, warn};

use crate::build::{BuildController, first_timeout};
use crate::core::run::PipelineRun;
use crate::core::summary::ArtifactSnapshot;
use crate::core::types::{RunStatus, Stage, StageStatus, Verdict};
use crate::error::{PipelineError, StageError};
use crate::io::agent::{AgentInvoker, Refactorer, SampleReviewer};
use crate::io::commands::{CheckRunner, CommandRunner};
use crate::io::config::PipelineConfig;
use crate::io::lock::RunLock;
use crate::io::store::{ArtifactStore, keys};
use crate::passes::PassController;
use crate::report;
use crate::stage::StageExecutor;
use crate::verify::VerificationController;

pub const TOTAL_STEPS: u32 = 6;

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub project: PathBuf,
    pub rules: PathBuf,
    pub dry_run: bool,
}

/// The injected side-effecting capabilities, one per external concern.
pub struct Capabilities<'a> {
    pub agent: &'a dyn AgentInvoker,
    pub refactorer: &'a dyn Refactorer,
    pub checks: &'a dyn CheckRunner,
    pub reviewer: &'a dyn SampleReviewer,
    pub builder: &'a dyn CommandRunner,
}

#[derive(Debug)]
pub struct PipelineOutcome {
    pub status: RunStatus,
    pub run: PipelineRun,
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

/// Run the whole pipeline. Returns `Err` only for pre-flight failures (run
/// lock, store setup); once the run record exists, failures are reported
/// through the outcome's status.
pub fn run_pipeline(
    options: &PipelineOptions,
    config: &PipelineConfig,
    caps: &Capabilities<'_>,
    mut on_progress: impl FnMut(&str, u32, u32),
) -> Result<PipelineOutcome, PipelineError> {
    let store = ArtifactStore::for_project(&options.project);
    store.ensure_root()?;

    let run_id = Utc::now().format("%Y%m%d-%H%M%S").to_string();
    let _lock = RunLock::acquire(store.root(), &run_id)?;

    let mut run = PipelineRun::new(
        &run_id,
        &options.project.display().to_string(),
        &options.rules.display().to_string(),
        options.dry_run,
        &now(),
    );
    store.put_json(keys::RUN, &run)?;
    info!(run_id = %run.run_id, dry_run = run.dry_run, "pipeline started");

    let executor = StageExecutor::new(&store, caps.agent, config, &options.project);

    // Stage 1: scan.
    on_progress("Scanning project...", 1, TOTAL_STEPS);
    run.begin_stage(Stage::Scan, &now());
    store.put_json(keys::RUN, &run)?;
    let manifest = match executor.run_scan() {
        Ok(manifest) => {
            let record = run.stage_mut(Stage::Scan);
            record.artifact_keys.push(keys::MANIFEST.to_string());
            record.notes.push(format!("{} files scanned", manifest.files.len()));
            run.finish_stage(Stage::Scan, StageStatus::Succeeded, None, &now());
            store.put_json(keys::RUN, &run)?;
            manifest
        }
        Err(err) => return abort(&store, run, Stage::Scan, err),
    };

    // Stage 2: interpret.
    on_progress("Interpreting rules...", 2, TOTAL_STEPS);
    run.begin_stage(Stage::Interpret, &now());
    store.put_json(keys::RUN, &run)?;
    let rules_text = match fs::read_to_string(&options.rules) {
        Ok(text) => text,
        Err(err) => {
            let err = PipelineError::Io {
                key: options.rules.display().to_string(),
                source: err,
            };
            return abort(&store, run, Stage::Interpret, err);
        }
    };
    let plan = match executor.run_interpret(&options.rules.display().to_string(), &rules_text) {
        Ok(plan) => {
            let record = run.stage_mut(Stage::Interpret);
            record.artifact_keys.push(keys::PLAN.to_string());
            record.notes.push(format!("{} passes planned", plan.passes.len()));
            run.finish_stage(Stage::Interpret, StageStatus::Succeeded, None, &now());
            store.put_json(keys::RUN, &run)?;
            plan
        }
        Err(err) => return abort(&store, run, Stage::Interpret, err),
    };

    // Stage 3: apply.
    on_progress("Applying refactoring passes...", 3, TOTAL_STEPS);
    run.begin_stage(Stage::Apply, &now());
    store.put_json(keys::RUN, &run)?;
    let apply = PassController::new(
        &store,
        caps.refactorer,
        caps.checks,
        config,
        &options.project,
        options.dry_run,
    )
    .run(&plan, &manifest)?;
    {
        let record = run.stage_mut(Stage::Apply);
        record.artifact_keys = apply.artifact_keys.clone();
        record.notes = apply.notes();
        let error = apply.halted.as_ref().map(|(pass, check)| {
            StageError::from(&PipelineError::BlockingCheck {
                pass: pass.clone(),
                check: check.clone(),
            })
        });
        run.finish_stage(Stage::Apply, apply.stage_status(), error, &now());
    }
    store.put_json(keys::RUN, &run)?;

    // Stage 4: verify. Runs even when apply halted, so the compliance report
    // documents what the halt left behind.
    on_progress("Verifying compliance...", 4, TOTAL_STEPS);
    run.begin_stage(Stage::Verify, &now());
    store.put_json(keys::RUN, &run)?;
    let compliance = VerificationController::new(&store, caps.reviewer, config, &options.project)
        .run(&plan, &manifest, &apply.logs, Some(now()))?;
    {
        let record = run.stage_mut(Stage::Verify);
        record.artifact_keys.push(keys::COMPLIANCE.to_string());
        record.notes.push(format!(
            "verdict: {}, {} findings",
            match compliance.verdict {
                Verdict::Pass => "pass",
                Verdict::Warnings => "warnings",
                Verdict::Fail => "fail",
            },
            compliance.findings.len()
        ));
        run.finish_stage(Stage::Verify, StageStatus::Succeeded, None, &now());
    }
    store.put_json(keys::RUN, &run)?;

    // Stage 5: build.
    on_progress("Running build and tests...", 5, TOTAL_STEPS);
    run.begin_stage(Stage::Build, &now());
    store.put_json(keys::RUN, &run)?;
    let build = BuildController::new(&store, caps.builder, config, &options.project)
        .run(Some(now()))?;
    {
        let record = run.stage_mut(Stage::Build);
        record.artifact_keys.push(keys::BUILD_REPORT.to_string());
        let (status, error) = if build.passed {
            (StageStatus::Succeeded, None)
        } else if let Some(err) = first_timeout(&build, config) {
            (StageStatus::Failed, Some(StageError::from(&err)))
        } else {
            (
                StageStatus::Failed,
                Some(StageError {
                    kind: "BuildFailure".to_string(),
                    message: "one or more build commands failed".to_string(),
                }),
            )
        };
        run.finish_stage(Stage::Build, status, error, &now());
    }
    store.put_json(keys::RUN, &run)?;

    // Stage 6: report.
    on_progress("Generating report...", 6, TOTAL_STEPS);
    run.begin_stage(Stage::Report, &now());
    store.put_json(keys::RUN, &run)?;

    let snapshot = ArtifactSnapshot {
        manifest: Some(&manifest),
        plan: Some(&plan),
        logs: &apply.logs,
        compliance: Some(&compliance),
        build: Some(&build),
    };
    let mut degraded = apply.halted.is_some()
        || apply.partial()
        || compliance.verdict != Verdict::Pass
        || !build.passed;
    let provisional = if degraded {
        RunStatus::Degraded
    } else {
        RunStatus::Success
    };

    let outcome = report::narrative(&executor, &run, snapshot, provisional);
    if outcome.agent_ok {
        run.finish_stage(Stage::Report, StageStatus::Succeeded, None, &now());
    } else {
        degraded = true;
        let record = run.stage_mut(Stage::Report);
        record
            .notes
            .push("summary reporter unavailable, deterministic fallback used".to_string());
        run.finish_stage(Stage::Report, StageStatus::Partial, None, &now());
    }

    let status = if degraded {
        RunStatus::Degraded
    } else {
        RunStatus::Success
    };
    report::write_summary(&store, &run, snapshot, outcome.narrative, status, Some(now()))?;
    {
        let record = run.stage_mut(Stage::Report);
        record.artifact_keys.push(keys::SUMMARY_JSON.to_string());
        record.artifact_keys.push(keys::SUMMARY_MD.to_string());
    }
    run.complete(status, &now());
    store.put_json(keys::RUN, &run)?;
    info!(status = ?status, "pipeline finished");

    Ok(PipelineOutcome { status, run })
}

/// Fatal-failure path: record the failing stage, mark the rest skipped, and
/// persist the terminal run record. No summary is written for aborted runs.
fn abort(
    store: &ArtifactStore,
    mut run: PipelineRun,
    stage: Stage,
    err: PipelineError,
) -> Result<PipelineOutcome, PipelineError> {
    warn!(stage = stage.as_str(), error = %err, "aborting run");
    run.finish_stage(stage, StageStatus::Failed, Some(StageError::from(&err)), &now());
    run.abort(&now());
    store.put_json(keys::RUN, &run)?;
    Ok(PipelineOutcome {
        status: RunStatus::Aborted,
        run,
    })
}
