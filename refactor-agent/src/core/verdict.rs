//! Compliance report model, verdict aggregation, and deterministic sampling.

use serde::{Deserialize, Serialize};

use crate::core::types::{Finding, Round, Severity, Verdict};

/// Verdict for one verification round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundVerdict {
    pub round: Round,
    pub verdict: Verdict,
}

/// One verification run: per-round verdicts plus a flat finding list.
/// Immutable once written by the verify stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub verdict: Verdict,
    pub rounds: Vec<RoundVerdict>,
    pub findings: Vec<Finding>,
    #[serde(default)]
    pub generated_at: Option<String>,
}

impl ComplianceReport {
    pub fn blocking_findings(&self) -> impl Iterator<Item = &Finding> {
        self.findings
            .iter()
            .filter(|f| f.severity == Severity::Blocking)
    }
}

/// Aggregate findings into a verdict: any blocking finding fails, any finding
/// at all downgrades to warnings, otherwise pass.
pub fn aggregate(findings: &[Finding]) -> Verdict {
    if findings.iter().any(|f| f.severity == Severity::Blocking) {
        Verdict::Fail
    } else if findings.is_empty() {
        Verdict::Pass
    } else {
        Verdict::Warnings
    }
}

/// Verdict for a single round's findings.
pub fn round_verdict(round: Round, findings: &[Finding]) -> RoundVerdict {
    let of_round: Vec<Finding> = findings
        .iter()
        .filter(|f| f.round == round)
        .cloned()
        .collect();
    RoundVerdict {
        round,
        verdict: aggregate(&of_round),
    }
}

/// Deterministic bounded sample of `sorted` (even stride over the sorted
/// list). Sampling the same inputs twice always selects the same files, so a
/// re-run of verification over unchanged artifacts is idempotent.
pub fn sample_files(sorted: &[String], count: usize) -> Vec<String> {
    if sorted.is_empty() || count == 0 {
        return Vec::new();
    }
    if sorted.len() <= count {
        return sorted.to_vec();
    }
    (0..count)
        .map(|i| sorted[i * sorted.len() / count].clone())
        .collect()
}

/// Effective sample size from a fixed size and optional fraction override.
pub fn effective_sample_size(total: usize, size: usize, fraction: Option<f64>) -> usize {
    match fraction {
        Some(f) => ((total as f64 * f).ceil() as usize).max(1).min(total),
        None => size.min(total),
    }
}
