//! Refactor plan model and load-time validation.
//!
//! The interpret stage produces a plan of ordered passes. Pass order must be
//! contiguous and start at 1; anything else is rejected before any pass runs.

use std::collections::BTreeSet;

use glob::Pattern;
use serde::{Deserialize, Serialize};

use crate::core::manifest::Manifest;
use crate::error::PipelineError;

/// Whether a failing check halts the apply stage.
///
/// This is an explicit declaration on the plan, never inferred from the
/// check's name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckSeverity {
    Blocking,
    Advisory,
}

/// A post-pass check declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckSpec {
    pub name: String,
    pub severity: CheckSeverity,
}

/// A single ordered pass in the refactoring plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassSpec {
    pub name: String,
    /// 1-indexed execution order; must be contiguous across the plan.
    pub order: u32,
    /// Glob patterns selecting target files from the manifest.
    pub targets: Vec<String>,
    /// Operations the refactorer is allowed to apply in this pass.
    pub operations: Vec<String>,
    #[serde(default)]
    pub checks: Vec<CheckSpec>,
}

/// Complete refactoring plan. Immutable once written by the interpret stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefactorPlan {
    #[serde(default = "default_plan_version")]
    pub plan_version: String,
    #[serde(default)]
    pub source_rules: String,
    #[serde(default)]
    pub created_at: Option<String>,
    pub passes: Vec<PassSpec>,
}

fn default_plan_version() -> String {
    "1.0".to_string()
}

impl RefactorPlan {
    /// Reject malformed plans at load time.
    ///
    /// Orders must be exactly `1..=n` with no duplicates; pass names must be
    /// unique; every pass needs at least one target pattern.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.passes.is_empty() {
            return Err(PipelineError::PlanValidation(
                "plan declares no passes".to_string(),
            ));
        }

        let mut orders: Vec<u32> = self.passes.iter().map(|p| p.order).collect();
        orders.sort_unstable();
        for (idx, order) in orders.iter().enumerate() {
            let expected = (idx + 1) as u32;
            if *order != expected {
                return Err(PipelineError::PlanValidation(format!(
                    "pass orders must be contiguous starting at 1, got {orders:?}"
                )));
            }
        }

        let mut names = BTreeSet::new();
        for pass in &self.passes {
            if pass.name.trim().is_empty() {
                return Err(PipelineError::PlanValidation(
                    "pass with empty name".to_string(),
                ));
            }
            if !names.insert(pass.name.as_str()) {
                return Err(PipelineError::PlanValidation(format!(
                    "duplicate pass name '{}'",
                    pass.name
                )));
            }
            if pass.targets.is_empty() {
                return Err(PipelineError::PlanValidation(format!(
                    "pass '{}' declares no target patterns",
                    pass.name
                )));
            }
        }
        Ok(())
    }

    /// Passes sorted by ascending order.
    pub fn passes_in_order(&self) -> Vec<&PassSpec> {
        let mut passes: Vec<&PassSpec> = self.passes.iter().collect();
        passes.sort_by_key(|p| p.order);
        passes
    }

    /// Union of all files any pass targets, resolved against the manifest.
    pub fn targeted_files(&self, manifest: &Manifest) -> Result<BTreeSet<String>, PipelineError> {
        let mut all = BTreeSet::new();
        for pass in &self.passes {
            all.extend(resolve_targets(pass, manifest)?);
        }
        Ok(all)
    }
}

/// Resolve a pass's target file set: its glob patterns intersected with the
/// manifest's file list. Returned sorted for deterministic downstream use.
pub fn resolve_targets(
    pass: &PassSpec,
    manifest: &Manifest,
) -> Result<Vec<String>, PipelineError> {
    let mut patterns = Vec::with_capacity(pass.targets.len());
    for raw in &pass.targets {
        let pattern = Pattern::new(raw).map_err(|err| {
            PipelineError::PlanValidation(format!(
                "pass '{}' has invalid glob '{}': {}",
                pass.name, raw, err
            ))
        })?;
        patterns.push(pattern);
    }

    let mut matched = BTreeSet::new();
    for entry in &manifest.files {
        if patterns.iter().any(|p| p.matches(&entry.path)) {
            matched.insert(entry.path.clone());
        }
    }
    Ok(matched.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::manifest::{Area, FileEntry, ManifestSummary};

    fn pass(name: &str, order: u32, targets: &[&str]) -> PassSpec {
        PassSpec {
            name: name.to_string(),
            order,
            targets: targets.iter().map(|t| (*t).to_string()).collect(),
            operations: vec!["normalize-imports".to_string()],
            checks: Vec::new(),
        }
    }

    fn plan(passes: Vec<PassSpec>) -> RefactorPlan {
        RefactorPlan {
            plan_version: "1.0".to_string(),
            source_rules: "rules.md".to_string(),
            created_at: None,
            passes,
        }
    }

    fn manifest(paths: &[&str]) -> Manifest {
        Manifest {
            scanned_at: None,
            files: paths
                .iter()
                .map(|path| FileEntry {
                    path: (*path).to_string(),
                    language: "python".to_string(),
                    area: Area::Backend,
                })
                .collect(),
            summary: ManifestSummary {
                total_files: paths.len(),
                ..ManifestSummary::default()
            },
        }
    }

    #[test]
    fn contiguous_orders_validate() {
        let p = plan(vec![
            pass("structural-cleanup", 1, &["**/*.py"]),
            pass("local-refactors", 2, &["**/*.py"]),
            pass("cross-file-consistency", 3, &["**/*.py"]),
        ]);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn duplicate_orders_are_rejected() {
        let p = plan(vec![pass("a", 1, &["*.py"]), pass("b", 1, &["*.py"])]);
        let err = p.validate().expect_err("duplicate order");
        assert_eq!(err.kind(), "PlanValidationError");
    }

    #[test]
    fn non_contiguous_orders_are_rejected() {
        let p = plan(vec![pass("a", 1, &["*.py"]), pass("b", 3, &["*.py"])]);
        let err = p.validate().expect_err("gap in orders");
        assert_eq!(err.kind(), "PlanValidationError");
    }

    #[test]
    fn empty_plan_is_rejected() {
        let err = plan(Vec::new()).validate().expect_err("empty plan");
        assert_eq!(err.kind(), "PlanValidationError");
    }

    #[test]
    fn targets_resolve_to_manifest_intersection() {
        let m = manifest(&["api/main.py", "api/util.py", "web/app.tsx"]);
        let p = pass("backend", 1, &["api/*.py"]);
        let resolved = resolve_targets(&p, &m).expect("resolve");
        assert_eq!(resolved, vec!["api/main.py", "api/util.py"]);
    }

    #[test]
    fn patterns_never_match_outside_manifest() {
        let m = manifest(&["api/main.py"]);
        let p = pass("backend", 1, &["**/*.py"]);
        let resolved = resolve_targets(&p, &m).expect("resolve");
        assert_eq!(resolved, vec!["api/main.py"]);
    }

    #[test]
    fn invalid_glob_is_a_plan_error() {
        let m = manifest(&["api/main.py"]);
        let p = pass("backend", 1, &["[bad"]);
        let err = resolve_targets(&p, &m).expect_err("bad glob");
        assert_eq!(err.kind(), "PlanValidationError");
    }

    #[test]
    fn passes_in_order_sorts_by_order_field() {
        let p = plan(vec![pass("second", 2, &["*.py"]), pass("first", 1, &["*.py"])]);
        let ordered: Vec<&str> = p.passes_in_order().iter().map(|x| x.name.as_str()).collect();
        assert_eq!(ordered, vec!["first", "second"]);
    }
}
