//! Report controller: the final stage.
//!
//! The narrative sections come from the summary-reporter agent when it is
//! available; everything quantitative in `summary.json` is derived directly
//! from the run record and prior artifacts, so a reporter outage can only
//! cost prose, never numbers.

use tracing::warn;

use crate::core::run::PipelineRun;
use crate::core::summary::{ArtifactSnapshot, Narrative, Summary, fallback_narrative};
use crate::core::types::{RunStatus, Verdict};
use crate::error::PipelineError;
use crate::io::agent::AgentInvoker;
use crate::io::store::{ArtifactStore, keys};
use crate::stage::StageExecutor;

/// Narrative plus whether the agent produced it (false means fallback).
pub struct NarrativeOutcome {
    pub narrative: Narrative,
    pub agent_ok: bool,
}

/// Fetch the report narrative, falling back to a deterministic one when the
/// agent fails. Never returns an error: report-agent trouble degrades the run
/// but the summary is still written.
pub fn narrative<A: AgentInvoker + ?Sized>(
    executor: &StageExecutor<'_, A>,
    run: &PipelineRun,
    snapshot: ArtifactSnapshot<'_>,
    provisional: RunStatus,
) -> NarrativeOutcome {
    let verification = snapshot
        .compliance
        .map(|c| verdict_label(c.verdict))
        .unwrap_or("not run");
    let build = match snapshot.build {
        Some(report) if report.passed => "passed",
        Some(_) => "failed",
        None => "not run",
    };
    let stages: Vec<String> = run
        .stages
        .iter()
        .map(|record| {
            let mut line = format!("{}: {:?}", record.stage.as_str(), record.status);
            line.make_ascii_lowercase();
            line
        })
        .collect();

    match executor.run_report_narrative(
        status_label(provisional),
        crate::core::changelog::touched_files(snapshot.logs).len(),
        verification,
        build,
        &stages,
    ) {
        Ok(narrative) => NarrativeOutcome {
            narrative,
            agent_ok: true,
        },
        Err(err) => {
            warn!(error = %err, "summary reporter unavailable, using deterministic fallback");
            NarrativeOutcome {
                narrative: fallback_narrative(snapshot),
                agent_ok: false,
            }
        }
    }
}

/// Compose and persist `summary.json` and `summary.md`.
pub fn write_summary(
    store: &ArtifactStore,
    run: &PipelineRun,
    snapshot: ArtifactSnapshot<'_>,
    narrative: Narrative,
    status: RunStatus,
    generated_at: Option<String>,
) -> Result<Summary, PipelineError> {
    let summary = Summary::compose(run, snapshot, narrative, status, generated_at);
    store.put_json(keys::SUMMARY_JSON, &summary)?;
    store.put_text(keys::SUMMARY_MD, &summary.render_markdown(run))?;
    Ok(summary)
}

fn status_label(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Success => "success",
        RunStatus::Degraded => "degraded",
        RunStatus::Aborted => "aborted",
    }
}

fn verdict_label(verdict: Verdict) -> &'static str {
    match verdict {
        Verdict::Pass => "pass",
        Verdict::Warnings => "warnings",
        Verdict::Fail => "fail",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Stage, StageStatus};
    use crate::error::PipelineError;
    use crate::io::config::PipelineConfig;
    use crate::test_support::{ScriptedAgent, narrative_payload, sample_manifest, sample_plan};
    use serde_json::json;

    fn fixture() -> (tempfile::TempDir, ArtifactStore, PipelineConfig) {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = ArtifactStore::for_project(temp.path());
        store.ensure_root().expect("ensure root");
        (temp, store, PipelineConfig::default())
    }

    fn finished_run() -> PipelineRun {
        let mut run = PipelineRun::new("r1", "/p", "rules.md", false, "t0");
        for stage in Stage::ALL {
            run.begin_stage(stage, "t1");
            run.finish_stage(stage, StageStatus::Succeeded, None, "t2");
        }
        run
    }

    #[test]
    fn agent_narrative_is_used_when_valid() {
        let (temp, store, config) = fixture();
        let agent = ScriptedAgent::with(vec![Ok(narrative_payload())]);
        let executor = StageExecutor::new(&store, &agent, &config, temp.path());
        let run = finished_run();

        let outcome = narrative(
            &executor,
            &run,
            ArtifactSnapshot::default(),
            RunStatus::Success,
        );
        assert!(outcome.agent_ok);
        assert!(!outcome.narrative.highlights.is_empty());
    }

    #[test]
    fn invalid_narrative_payload_falls_back() {
        let (temp, store, config) = fixture();
        let agent = ScriptedAgent::with(vec![Ok(json!({"not": "a narrative"}))]);
        let executor = StageExecutor::new(&store, &agent, &config, temp.path());
        let run = finished_run();
        let manifest = sample_manifest();
        let plan = sample_plan();
        let snapshot = ArtifactSnapshot {
            manifest: Some(&manifest),
            plan: Some(&plan),
            ..ArtifactSnapshot::default()
        };

        let outcome = narrative(&executor, &run, snapshot, RunStatus::Success);
        assert!(!outcome.agent_ok);
        assert!(!outcome.narrative.highlights.is_empty());
    }

    #[test]
    fn agent_failure_falls_back() {
        let (temp, store, config) = fixture();
        let agent = ScriptedAgent::with(vec![Err(PipelineError::AgentInvocation {
            stage: "report".to_string(),
            detail: "timeout".to_string(),
            timed_out: true,
        })]);
        let executor = StageExecutor::new(&store, &agent, &config, temp.path());
        let run = finished_run();

        let outcome = narrative(
            &executor,
            &run,
            ArtifactSnapshot::default(),
            RunStatus::Success,
        );
        assert!(!outcome.agent_ok);
    }

    #[test]
    fn write_summary_persists_both_renditions() {
        let (_temp, store, _config) = fixture();
        let run = finished_run();

        let summary = write_summary(
            &store,
            &run,
            ArtifactSnapshot::default(),
            Narrative::default(),
            RunStatus::Success,
            None,
        )
        .expect("write");
        assert_eq!(summary.status, RunStatus::Success);
        assert!(store.exists(keys::SUMMARY_JSON));
        assert!(store.exists(keys::SUMMARY_MD));
    }
}
