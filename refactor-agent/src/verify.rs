//! Verification controller: the three compliance rounds.
//!
//! Coverage and side-effect are pure set comparisons over the plan, manifest,
//! and change logs, so their findings are fully deterministic. Only the
//! sampling round consults an external reviewer, and a reviewer failure is
//! never fatal: it degrades to a single warning finding.

use std::path::Path;

use tracing::{info, warn};

use crate::core::changelog::{ChangeLog, alters_public_api, touched_files};
use crate::core::manifest::Manifest;
use crate::core::plan::RefactorPlan;
use crate::core::types::{Finding, Round, Severity};
use crate::core::verdict::{
    ComplianceReport, aggregate, effective_sample_size, round_verdict, sample_files,
};
use crate::error::PipelineError;
use crate::io::agent::{ReviewRequest, SampleReviewer};
use crate::io::config::PipelineConfig;
use crate::io::store::{ArtifactStore, keys};

/// Drives the verify stage against the sample-reviewer capability.
pub struct VerificationController<'a, S: SampleReviewer + ?Sized> {
    store: &'a ArtifactStore,
    reviewer: &'a S,
    config: &'a PipelineConfig,
    workdir: &'a Path,
}

impl<'a, S: SampleReviewer + ?Sized> VerificationController<'a, S> {
    pub fn new(
        store: &'a ArtifactStore,
        reviewer: &'a S,
        config: &'a PipelineConfig,
        workdir: &'a Path,
    ) -> Self {
        Self {
            store,
            reviewer,
            config,
            workdir,
        }
    }

    /// Run all three rounds and persist the compliance report.
    ///
    /// All three rounds always run, even when an earlier round already
    /// produced blocking findings, so the report is complete.
    pub fn run(
        &self,
        plan: &RefactorPlan,
        manifest: &Manifest,
        logs: &[ChangeLog],
        generated_at: Option<String>,
    ) -> Result<ComplianceReport, PipelineError> {
        let targeted = plan.targeted_files(manifest)?;
        let touched = touched_files(logs);

        let mut findings = Vec::new();

        // Round 1: every targeted file must appear in some change log.
        for path in targeted.difference(&touched) {
            findings.push(Finding {
                round: Round::Coverage,
                severity: Severity::Blocking,
                file: path.clone(),
                message: "targeted by the plan but absent from every change log".to_string(),
            });
        }

        // Round 2: changed files outside the plan's target set. A warning,
        // unless the change log marks the file as touching public API.
        for path in touched.difference(&targeted) {
            let public_api = alters_public_api(logs, path);
            findings.push(Finding {
                round: Round::SideEffect,
                severity: if public_api {
                    Severity::Blocking
                } else {
                    Severity::Warning
                },
                file: path.clone(),
                message: if public_api {
                    "changed outside the plan's targets and alters public API".to_string()
                } else {
                    "changed outside the plan's targets".to_string()
                },
            });
        }

        // Round 3: deep review of a deterministic sample of changed files.
        findings.extend(self.sampling_round(&touched));

        findings.sort();
        let rounds = Round::ALL
            .iter()
            .map(|&round| round_verdict(round, &findings))
            .collect();
        let report = ComplianceReport {
            verdict: aggregate(&findings),
            rounds,
            findings,
            generated_at,
        };
        info!(verdict = ?report.verdict, findings = report.findings.len(), "verification done");
        self.store.put_json(keys::COMPLIANCE, &report)?;
        Ok(report)
    }

    fn sampling_round(&self, touched: &std::collections::BTreeSet<String>) -> Vec<Finding> {
        let changed: Vec<String> = touched.iter().cloned().collect();
        let count = effective_sample_size(
            changed.len(),
            self.config.sample.size,
            self.config.sample.fraction,
        );
        let sample = sample_files(&changed, count);
        if sample.is_empty() {
            return Vec::new();
        }

        let request = ReviewRequest {
            files: &sample,
            workdir: self.workdir,
            timeout: self.config.agent_timeout(),
            output_limit_bytes: self.config.output_limit_bytes,
        };
        match self.reviewer.review(&request) {
            Ok(findings) => findings
                .into_iter()
                .map(|mut finding| {
                    finding.round = Round::Sampling;
                    // Sampling judgements are advisory; only the deterministic
                    // rounds may block.
                    if finding.severity == Severity::Blocking {
                        finding.severity = Severity::Warning;
                    }
                    finding
                })
                .collect(),
            Err(err) => {
                warn!(error = %err, "sample review unavailable, recording a warning");
                vec![Finding {
                    round: Round::Sampling,
                    severity: Severity::Warning,
                    file: "-".to_string(),
                    message: format!("sample review unavailable: {err}"),
                }]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Verdict;
    use crate::test_support::{
        StaticReviewer, logs_covering, sample_manifest, sample_plan,
    };

    fn fixture() -> (tempfile::TempDir, ArtifactStore, PipelineConfig) {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = ArtifactStore::for_project(temp.path());
        store.ensure_root().expect("ensure root");
        (temp, store, PipelineConfig::default())
    }

    #[test]
    fn full_coverage_and_clean_sample_pass() {
        let (temp, store, config) = fixture();
        let plan = sample_plan();
        let manifest = sample_manifest();
        let logs = logs_covering(&plan, &manifest);
        let reviewer = StaticReviewer::clean();
        let controller = VerificationController::new(&store, &reviewer, &config, temp.path());

        let report = controller.run(&plan, &manifest, &logs, None).expect("verify");
        assert_eq!(report.verdict, Verdict::Pass);
        assert!(report.findings.is_empty());
        assert_eq!(report.rounds.len(), 3);
        assert!(store.exists(keys::COMPLIANCE));
    }

    #[test]
    fn missed_target_is_a_blocking_coverage_finding_naming_the_file() {
        let (temp, store, config) = fixture();
        let plan = sample_plan();
        let manifest = sample_manifest();
        let mut logs = logs_covering(&plan, &manifest);
        let dropped = "api/main.py";
        for log in &mut logs {
            log.changes.retain(|c| c.path != dropped);
        }
        let reviewer = StaticReviewer::clean();
        let controller = VerificationController::new(&store, &reviewer, &config, temp.path());

        let report = controller.run(&plan, &manifest, &logs, None).expect("verify");
        assert_eq!(report.verdict, Verdict::Fail);
        let finding = report
            .findings
            .iter()
            .find(|f| f.round == Round::Coverage)
            .expect("coverage finding");
        assert_eq!(finding.severity, Severity::Blocking);
        assert_eq!(finding.file, dropped);
    }

    #[test]
    fn out_of_target_change_is_a_warning() {
        let (temp, store, config) = fixture();
        let plan = sample_plan();
        let manifest = sample_manifest();
        let mut logs = logs_covering(&plan, &manifest);
        logs[0].changes.push(crate::core::changelog::ChangeRecord {
            path: "README.md".to_string(),
            operations: vec!["reformat".to_string()],
            rationale: "drive-by".to_string(),
            public_api: false,
        });
        let reviewer = StaticReviewer::clean();
        let controller = VerificationController::new(&store, &reviewer, &config, temp.path());

        let report = controller.run(&plan, &manifest, &logs, None).expect("verify");
        assert_eq!(report.verdict, Verdict::Warnings);
        let finding = report
            .findings
            .iter()
            .find(|f| f.round == Round::SideEffect)
            .expect("side-effect finding");
        assert_eq!(finding.severity, Severity::Warning);
        assert_eq!(finding.file, "README.md");
    }

    #[test]
    fn out_of_target_public_api_change_escalates_to_blocking() {
        let (temp, store, config) = fixture();
        let plan = sample_plan();
        let manifest = sample_manifest();
        let mut logs = logs_covering(&plan, &manifest);
        logs[0].changes.push(crate::core::changelog::ChangeRecord {
            path: "lib/exports.ts".to_string(),
            operations: vec!["rename-symbol".to_string()],
            rationale: "rename".to_string(),
            public_api: true,
        });
        let reviewer = StaticReviewer::clean();
        let controller = VerificationController::new(&store, &reviewer, &config, temp.path());

        let report = controller.run(&plan, &manifest, &logs, None).expect("verify");
        assert_eq!(report.verdict, Verdict::Fail);
        let finding = report
            .findings
            .iter()
            .find(|f| f.round == Round::SideEffect)
            .expect("side-effect finding");
        assert_eq!(finding.severity, Severity::Blocking);
    }

    #[test]
    fn sampling_findings_are_clamped_to_warning() {
        let (temp, store, config) = fixture();
        let plan = sample_plan();
        let manifest = sample_manifest();
        let logs = logs_covering(&plan, &manifest);
        let reviewer = StaticReviewer::with_findings(vec![Finding {
            round: Round::Sampling,
            severity: Severity::Blocking,
            file: "api/main.py".to_string(),
            message: "rule drift in sampled file".to_string(),
        }]);
        let controller = VerificationController::new(&store, &reviewer, &config, temp.path());

        let report = controller.run(&plan, &manifest, &logs, None).expect("verify");
        assert_eq!(report.verdict, Verdict::Warnings);
        assert!(
            report
                .findings
                .iter()
                .filter(|f| f.round == Round::Sampling)
                .all(|f| f.severity == Severity::Warning)
        );
    }

    #[test]
    fn reviewer_failure_degrades_to_a_single_warning() {
        let (temp, store, config) = fixture();
        let plan = sample_plan();
        let manifest = sample_manifest();
        let logs = logs_covering(&plan, &manifest);
        let reviewer = StaticReviewer::failing();
        let controller = VerificationController::new(&store, &reviewer, &config, temp.path());

        let report = controller.run(&plan, &manifest, &logs, None).expect("verify");
        assert_eq!(report.verdict, Verdict::Warnings);
        let sampling: Vec<_> = report
            .findings
            .iter()
            .filter(|f| f.round == Round::Sampling)
            .collect();
        assert_eq!(sampling.len(), 1);
        assert!(sampling[0].message.contains("sample review unavailable"));
    }

    #[test]
    fn verification_is_idempotent_over_unchanged_artifacts() {
        let (temp, store, config) = fixture();
        let plan = sample_plan();
        let manifest = sample_manifest();
        let logs = logs_covering(&plan, &manifest);
        let reviewer = StaticReviewer::clean();
        let controller = VerificationController::new(&store, &reviewer, &config, temp.path());

        let first = controller.run(&plan, &manifest, &logs, None).expect("verify");
        let second = controller.run(&plan, &manifest, &logs, None).expect("verify");
        assert_eq!(first, second);
    }
}
