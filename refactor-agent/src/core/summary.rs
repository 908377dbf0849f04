//! Final run summary: composition and markdown rendering.
//!
//! The summary is derived from the run record and all prior artifacts. It is
//! the one place that must spell out any aborted/partial/degraded outcome and
//! the stage + error kind responsible; a run is never allowed to finish
//! looking quieter than it was.

use serde::{Deserialize, Serialize};

use crate::core::changelog::{ChangeLog, touched_files};
use crate::core::manifest::Manifest;
use crate::core::plan::RefactorPlan;
use crate::core::run::PipelineRun;
use crate::core::types::{BuildReport, RunStatus, Severity, Stage, StageStatus, Verdict};
use crate::core::verdict::ComplianceReport;

/// Narrative sections supplied by the summary agent (or a deterministic
/// fallback when the agent is unavailable).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Narrative {
    #[serde(default)]
    pub highlights: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

/// Read-only view over whatever artifacts the run managed to produce.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArtifactSnapshot<'a> {
    pub manifest: Option<&'a Manifest>,
    pub plan: Option<&'a RefactorPlan>,
    pub logs: &'a [ChangeLog],
    pub compliance: Option<&'a ComplianceReport>,
    pub build: Option<&'a BuildReport>,
}

/// Per-stage line in the summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryStage {
    pub stage: Stage,
    pub status: StageStatus,
    #[serde(default)]
    pub error_kind: Option<String>,
}

/// Final aggregation written to `summary.json` (and rendered to `summary.md`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub status: RunStatus,
    pub headline: String,
    pub dry_run: bool,
    pub stages: Vec<SummaryStage>,
    pub files_scanned: usize,
    pub files_changed: usize,
    pub passes_planned: usize,
    pub verification: Option<Verdict>,
    pub blocking_findings: usize,
    pub warning_findings: usize,
    pub build_passed: Option<bool>,
    pub highlights: Vec<String>,
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub generated_at: Option<String>,
}

impl Summary {
    pub fn compose(
        run: &PipelineRun,
        snapshot: ArtifactSnapshot<'_>,
        narrative: Narrative,
        status: RunStatus,
        generated_at: Option<String>,
    ) -> Self {
        let headline = match status {
            RunStatus::Success => "Refactoring completed".to_string(),
            RunStatus::Degraded => "Refactoring completed with issues".to_string(),
            RunStatus::Aborted => match run.first_failure() {
                Some((record, err)) => format!(
                    "Refactoring aborted at {} ({})",
                    record.stage.as_str(),
                    err.kind
                ),
                None => "Refactoring aborted".to_string(),
            },
        };

        let (blocking, warning) = snapshot
            .compliance
            .map(|report| {
                let blocking = report.blocking_findings().count();
                (blocking, report.findings.len() - blocking)
            })
            .unwrap_or((0, 0));

        Self {
            status,
            headline,
            dry_run: run.dry_run,
            stages: run
                .stages
                .iter()
                .map(|r| SummaryStage {
                    stage: r.stage,
                    status: r.status,
                    error_kind: r.error.as_ref().map(|e| e.kind.clone()),
                })
                .collect(),
            files_scanned: snapshot.manifest.map(|m| m.files.len()).unwrap_or(0),
            files_changed: touched_files(snapshot.logs).len(),
            passes_planned: snapshot.plan.map(|p| p.passes.len()).unwrap_or(0),
            verification: snapshot.compliance.map(|c| c.verdict),
            blocking_findings: blocking,
            warning_findings: warning,
            build_passed: snapshot.build.map(|b| b.passed),
            highlights: narrative.highlights,
            recommendations: narrative.recommendations,
            generated_at,
        }
    }

    /// Render the human-readable `summary.md`.
    pub fn render_markdown(&self, run: &PipelineRun) -> String {
        let mut out = String::new();
        out.push_str("# Refactor Summary\n\n");
        out.push_str(&format!("- Status: **{}**\n", status_label(self.status)));
        out.push_str(&format!("- Headline: {}\n", self.headline));
        if self.dry_run {
            out.push_str("- Mode: dry run (no files were modified)\n");
        }
        if let Some(generated_at) = &self.generated_at {
            out.push_str(&format!("- Generated: {generated_at}\n"));
        }
        out.push('\n');

        out.push_str("## Stages\n\n");
        out.push_str("| Stage | Status | Error |\n|---|---|---|\n");
        for line in &self.stages {
            out.push_str(&format!(
                "| {} | {} | {} |\n",
                line.stage.as_str(),
                stage_status_label(line.status),
                line.error_kind.as_deref().unwrap_or("-"),
            ));
        }
        out.push('\n');

        // Degraded/partial/aborted outcomes are spelled out, never implied.
        let mut callouts = Vec::new();
        for record in &run.stages {
            match record.status {
                StageStatus::Failed => {
                    let kind = record
                        .error
                        .as_ref()
                        .map(|e| e.kind.as_str())
                        .unwrap_or("unknown error");
                    callouts.push(format!("{} failed ({})", record.stage.as_str(), kind));
                }
                StageStatus::Partial => {
                    callouts.push(format!(
                        "{} completed partially: {}",
                        record.stage.as_str(),
                        record.notes.join("; ")
                    ));
                }
                _ => {}
            }
        }
        if !callouts.is_empty() || self.status != RunStatus::Success {
            out.push_str("## Issues\n\n");
            if callouts.is_empty() {
                out.push_str("- Run finished degraded; see verification and build sections.\n");
            }
            for callout in &callouts {
                out.push_str(&format!("- {callout}\n"));
            }
            out.push('\n');
        }

        out.push_str("## Overview\n\n");
        out.push_str(&format!("- Files scanned: {}\n", self.files_scanned));
        out.push_str(&format!("- Files changed: {}\n", self.files_changed));
        out.push_str(&format!("- Passes planned: {}\n", self.passes_planned));
        out.push('\n');

        out.push_str("## Compliance\n\n");
        match self.verification {
            Some(verdict) => {
                out.push_str(&format!("- Verdict: {}\n", verdict_label(verdict)));
                out.push_str(&format!("- Blocking findings: {}\n", self.blocking_findings));
                out.push_str(&format!(
                    "- Warning/info findings: {}\n",
                    self.warning_findings
                ));
            }
            None => out.push_str("- Verification did not run.\n"),
        }
        out.push('\n');

        out.push_str("## Build\n\n");
        match self.build_passed {
            Some(true) => out.push_str("- Build/tests passed.\n"),
            Some(false) => out.push_str("- Build/tests **failed**; see build_report.json.\n"),
            None => out.push_str("- Build did not run.\n"),
        }
        out.push('\n');

        if !self.highlights.is_empty() {
            out.push_str("## Highlights\n\n");
            for item in &self.highlights {
                out.push_str(&format!("- {item}\n"));
            }
            out.push('\n');
        }
        if !self.recommendations.is_empty() {
            out.push_str("## Recommendations\n\n");
            for item in &self.recommendations {
                out.push_str(&format!("- {item}\n"));
            }
            out.push('\n');
        }
        out
    }
}

/// Fallback narrative when the summary agent is unavailable.
pub fn fallback_narrative(snapshot: ArtifactSnapshot<'_>) -> Narrative {
    let mut highlights = Vec::new();
    let changed = touched_files(snapshot.logs).len();
    highlights.push(format!("{changed} file(s) changed across refactoring passes"));
    if let Some(report) = snapshot.compliance {
        let blocking: Vec<&str> = report
            .blocking_findings()
            .map(|f| f.file.as_str())
            .collect();
        if !blocking.is_empty() {
            highlights.push(format!("blocking compliance findings: {}", blocking.join(", ")));
        }
    }
    let mut recommendations = Vec::new();
    if let Some(report) = snapshot.compliance
        && report.verdict != Verdict::Pass
    {
        recommendations.push("Review compliance_report.json findings.".to_string());
    }
    if let Some(build) = snapshot.build
        && !build.passed
    {
        recommendations.push("Inspect failing commands in build_report.json.".to_string());
    }
    Narrative {
        highlights,
        recommendations,
    }
}

fn status_label(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Success => "SUCCESS",
        RunStatus::Degraded => "DEGRADED",
        RunStatus::Aborted => "ABORTED",
    }
}

fn stage_status_label(status: StageStatus) -> &'static str {
    match status {
        StageStatus::Pending => "pending",
        StageStatus::Running => "running",
        StageStatus::Succeeded => "succeeded",
        StageStatus::Partial => "partial",
        StageStatus::Failed => "failed",
        StageStatus::Skipped => "skipped",
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
    use crate::core::types::{Finding, Round};
    use crate::core::verdict::RoundVerdict;
    use crate::error::StageError;

    fn degraded_run() -> PipelineRun {
        let mut run = PipelineRun::new("r1", "proj", "rules.md", false, "t0");
        run.begin_stage(Stage::Apply, "t1");
        run.stage_mut(Stage::Apply).notes.push("advisory check 'lint' failed".to_string());
        run.finish_stage(Stage::Apply, StageStatus::Partial, None, "t2");
        run
    }

    #[test]
    fn summary_names_partial_stage_in_markdown() {
        let run = degraded_run();
        let summary = Summary::compose(
            &run,
            ArtifactSnapshot::default(),
            Narrative::default(),
            RunStatus::Degraded,
            None,
        );
        let md = summary.render_markdown(&run);
        assert!(md.contains("DEGRADED"));
        assert!(md.contains("apply completed partially"));
        assert!(md.contains("advisory check 'lint' failed"));
    }

    #[test]
    fn summary_names_failed_stage_and_error_kind() {
        let mut run = PipelineRun::new("r1", "proj", "rules.md", false, "t0");
        run.begin_stage(Stage::Build, "t1");
        run.finish_stage(
            Stage::Build,
            StageStatus::Failed,
            Some(StageError {
                kind: "BuildTimeoutError".to_string(),
                message: "npm run build timed out".to_string(),
            }),
            "t2",
        );
        let summary = Summary::compose(
            &run,
            ArtifactSnapshot::default(),
            Narrative::default(),
            RunStatus::Degraded,
            None,
        );
        let md = summary.render_markdown(&run);
        assert!(md.contains("build failed (BuildTimeoutError)"));
    }

    #[test]
    fn compliance_counts_split_blocking_from_warnings() {
        let run = degraded_run();
        let report = ComplianceReport {
            verdict: Verdict::Fail,
            rounds: vec![RoundVerdict {
                round: Round::Coverage,
                verdict: Verdict::Fail,
            }],
            findings: vec![
                Finding {
                    round: Round::Coverage,
                    severity: Severity::Blocking,
                    file: "c.py".to_string(),
                    message: "not processed".to_string(),
                },
                Finding {
                    round: Round::Sampling,
                    severity: Severity::Info,
                    file: "a.py".to_string(),
                    message: "looks fine".to_string(),
                },
            ],
            generated_at: None,
        };
        let snapshot = ArtifactSnapshot {
            compliance: Some(&report),
            ..ArtifactSnapshot::default()
        };
        let summary = Summary::compose(
            &run,
            snapshot,
            Narrative::default(),
            RunStatus::Degraded,
            None,
        );
        assert_eq!(summary.blocking_findings, 1);
        assert_eq!(summary.warning_findings, 1);
        assert_eq!(summary.verification, Some(Verdict::Fail));
    }
}
