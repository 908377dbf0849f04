//! Pass controller: runs the plan's refactoring passes in order.
//!
//! Each pass resolves its target set against the manifest, splits the targets
//! by area, delegates each area to the refactorer capability, persists the
//! returned change log, and then runs the pass's post-pass checks. A failed
//! blocking check halts the stage; everything else is recorded and the next
//! pass proceeds.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{info, warn};

use crate::core::changelog::ChangeLog;
use crate::core::manifest::{Area, Manifest};
use crate::core::plan::{CheckSeverity, RefactorPlan, resolve_targets};
use crate::core::types::StageStatus;
use crate::error::{PipelineError, StageError};
use crate::io::agent::{PassRequest, Refactorer};
use crate::io::commands::{CheckRunner, CheckStatus};
use crate::io::config::PipelineConfig;
use crate::io::store::{ArtifactStore, keys};

/// Outcome of one planned pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassStatus {
    Applied,
    /// No manifest file matched the pass's targets.
    Skipped,
    /// The refactorer failed for at least one area; the pipeline continues.
    Failed,
}

#[derive(Debug)]
pub struct CheckFailure {
    pub check: String,
    pub severity: CheckSeverity,
    pub detail: Option<String>,
}

#[derive(Debug)]
pub struct PassResult {
    pub name: String,
    pub status: PassStatus,
    pub files_targeted: usize,
    pub check_failures: Vec<CheckFailure>,
    pub agent_errors: Vec<StageError>,
}

/// Aggregate outcome of the apply stage.
#[derive(Debug, Default)]
pub struct ApplyOutcome {
    pub results: Vec<PassResult>,
    pub logs: Vec<ChangeLog>,
    pub artifact_keys: Vec<String>,
    /// Set when a blocking check failed: (pass name, check name).
    pub halted: Option<(String, String)>,
}

impl ApplyOutcome {
    /// True when any pass failed or any non-blocking check failed; the run
    /// carries this forward as a degraded-result marker.
    pub fn partial(&self) -> bool {
        self.results.iter().any(|r| {
            r.status == PassStatus::Failed
                || !r.check_failures.is_empty()
                || !r.agent_errors.is_empty()
        })
    }

    pub fn stage_status(&self) -> StageStatus {
        if self.halted.is_some() {
            StageStatus::Failed
        } else if self.partial() {
            StageStatus::Partial
        } else {
            StageStatus::Succeeded
        }
    }

    /// Per-pass notes for the run record.
    pub fn notes(&self) -> Vec<String> {
        let mut notes = Vec::new();
        for result in &self.results {
            match result.status {
                PassStatus::Skipped => {
                    notes.push(format!("pass '{}': no matching targets, skipped", result.name));
                }
                PassStatus::Failed => {
                    notes.push(format!("pass '{}': refactorer failed", result.name));
                }
                PassStatus::Applied => {}
            }
            for failure in &result.check_failures {
                notes.push(format!(
                    "pass '{}': check '{}' failed ({})",
                    result.name,
                    failure.check,
                    match failure.severity {
                        CheckSeverity::Blocking => "blocking",
                        CheckSeverity::Advisory => "advisory",
                    }
                ));
            }
        }
        notes
    }
}

/// Drives the apply stage against the refactorer and check capabilities.
pub struct PassController<'a, R: Refactorer + ?Sized, C: CheckRunner + ?Sized> {
    store: &'a ArtifactStore,
    refactorer: &'a R,
    checks: &'a C,
    config: &'a PipelineConfig,
    workdir: &'a Path,
    dry_run: bool,
}

impl<'a, R: Refactorer + ?Sized, C: CheckRunner + ?Sized> PassController<'a, R, C> {
    pub fn new(
        store: &'a ArtifactStore,
        refactorer: &'a R,
        checks: &'a C,
        config: &'a PipelineConfig,
        workdir: &'a Path,
        dry_run: bool,
    ) -> Self {
        Self {
            store,
            refactorer,
            checks,
            config,
            workdir,
            dry_run,
        }
    }

    /// Run every pass in plan order. Only store failures abort; refactorer
    /// and check failures are folded into the outcome.
    pub fn run(
        &self,
        plan: &RefactorPlan,
        manifest: &Manifest,
    ) -> Result<ApplyOutcome, PipelineError> {
        let mut outcome = ApplyOutcome::default();

        for pass in plan.passes_in_order() {
            let targets = resolve_targets(pass, manifest)?;
            if targets.is_empty() {
                info!(pass = %pass.name, "no matching targets, skipping pass");
                outcome.results.push(PassResult {
                    name: pass.name.clone(),
                    status: PassStatus::Skipped,
                    files_targeted: 0,
                    check_failures: Vec::new(),
                    agent_errors: Vec::new(),
                });
                continue;
            }

            let mut result = PassResult {
                name: pass.name.clone(),
                status: PassStatus::Applied,
                files_targeted: targets.len(),
                check_failures: Vec::new(),
                agent_errors: Vec::new(),
            };

            for (area, area_targets) in split_by_area(&targets, manifest) {
                info!(
                    pass = %pass.name,
                    area = area.as_str(),
                    files = area_targets.len(),
                    "applying pass"
                );
                let request = PassRequest {
                    pass,
                    area,
                    targets: &area_targets,
                    workdir: self.workdir,
                    dry_run: self.dry_run,
                    timeout: self.config.agent_timeout(),
                    output_limit_bytes: self.config.output_limit_bytes,
                };
                match self.refactorer.apply_pass(&request) {
                    Ok(log) => {
                        let key = keys::change_log(area, &pass.name);
                        self.store.put_json(&key, &log)?;
                        outcome.artifact_keys.push(key);
                        outcome.logs.push(log);
                    }
                    Err(err) => {
                        warn!(
                            pass = %pass.name,
                            area = area.as_str(),
                            error = %err,
                            "refactorer failed, continuing with next pass"
                        );
                        result.status = PassStatus::Failed;
                        result.agent_errors.push(StageError::from(&err));
                    }
                }
            }

            let halted = self.run_checks(pass.name.as_str(), &pass.checks, &mut result)?;
            outcome.results.push(result);
            if let Some(check) = halted {
                outcome.halted = Some((pass.name.clone(), check));
                break;
            }
        }

        Ok(outcome)
    }

    /// Run the pass's checks. Returns the name of the first failing blocking
    /// check, if any.
    fn run_checks(
        &self,
        pass: &str,
        checks: &[crate::core::plan::CheckSpec],
        result: &mut PassResult,
    ) -> Result<Option<String>, PipelineError> {
        for check in checks {
            let outcome = self.checks.run_check(
                &check.name,
                self.workdir,
                self.config.check_timeout(),
                self.config.output_limit_bytes,
            )?;
            match outcome.status {
                CheckStatus::Passed | CheckStatus::Skipped => {}
                CheckStatus::Failed => {
                    result.check_failures.push(CheckFailure {
                        check: check.name.clone(),
                        severity: check.severity,
                        detail: outcome.detail,
                    });
                    if check.severity == CheckSeverity::Blocking {
                        warn!(pass, check = %check.name, "blocking check failed, halting passes");
                        return Ok(Some(check.name.clone()));
                    }
                    warn!(pass, check = %check.name, "advisory check failed");
                }
            }
        }
        Ok(None)
    }
}

/// Split a resolved target list into per-area lists, preserving sort order.
fn split_by_area(targets: &[String], manifest: &Manifest) -> BTreeMap<Area, Vec<String>> {
    let mut by_area: BTreeMap<Area, Vec<String>> = BTreeMap::new();
    for path in targets {
        // Targets came from the manifest, so the lookup cannot miss.
        if let Some(area) = manifest.area_of(path) {
            by_area.entry(area).or_default().push(path.clone());
        }
    }
    by_area
}
