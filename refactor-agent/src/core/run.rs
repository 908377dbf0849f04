//! Persisted bookkeeping for one pipeline run (`.refactor/pipeline_run.json`).

use serde::{Deserialize, Serialize};

use crate::core::types::{PipelineState, RunStatus, Stage, StageStatus};
use crate::error::StageError;

/// Record for one stage of the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: Stage,
    pub status: StageStatus,
    #[serde(default)]
    pub error: Option<StageError>,
    /// Artifact store keys this stage wrote.
    #[serde(default)]
    pub artifact_keys: Vec<String>,
    /// Non-fatal observations (advisory check failures, fallbacks taken).
    #[serde(default)]
    pub notes: Vec<String>,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub ended_at: Option<String>,
}

impl StageRecord {
    fn pending(stage: Stage) -> Self {
        Self {
            stage,
            status: StageStatus::Pending,
            error: None,
            artifact_keys: Vec::new(),
            notes: Vec::new(),
            started_at: None,
            ended_at: None,
        }
    }
}

/// The overarching entity tying one invocation together. Mutated in place by
/// the orchestrator as stages complete; terminal once reporting finishes or
/// the run aborts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineRun {
    pub run_id: String,
    pub project: String,
    pub rules: String,
    pub dry_run: bool,
    pub state: PipelineState,
    /// Terminal status; `None` while the run is in flight.
    pub status: Option<RunStatus>,
    pub stages: Vec<StageRecord>,
    pub started_at: String,
    #[serde(default)]
    pub ended_at: Option<String>,
}

impl PipelineRun {
    pub fn new(run_id: &str, project: &str, rules: &str, dry_run: bool, now: &str) -> Self {
        Self {
            run_id: run_id.to_string(),
            project: project.to_string(),
            rules: rules.to_string(),
            dry_run,
            state: PipelineState::Scanning,
            status: None,
            stages: Stage::ALL.iter().map(|s| StageRecord::pending(*s)).collect(),
            started_at: now.to_string(),
            ended_at: None,
        }
    }

    pub fn stage(&self, stage: Stage) -> &StageRecord {
        self.stages
            .iter()
            .find(|r| r.stage == stage)
            .expect("all stages present by construction")
    }

    pub fn stage_mut(&mut self, stage: Stage) -> &mut StageRecord {
        self.stages
            .iter_mut()
            .find(|r| r.stage == stage)
            .expect("all stages present by construction")
    }

    /// Move the state machine into `stage` and mark it running.
    pub fn begin_stage(&mut self, stage: Stage, now: &str) {
        debug_assert!(!self.state.is_terminal(), "cannot advance a terminal run");
        self.state = PipelineState::for_stage(stage);
        let record = self.stage_mut(stage);
        record.status = StageStatus::Running;
        record.started_at = Some(now.to_string());
    }

    pub fn finish_stage(
        &mut self,
        stage: Stage,
        status: StageStatus,
        error: Option<StageError>,
        now: &str,
    ) {
        let record = self.stage_mut(stage);
        record.status = status;
        record.error = error;
        record.ended_at = Some(now.to_string());
    }

    /// Terminal transition on fatal failure. Stages that never ran are marked
    /// skipped so the record reads unambiguously.
    pub fn abort(&mut self, now: &str) {
        self.state = PipelineState::Aborted;
        self.status = Some(RunStatus::Aborted);
        self.ended_at = Some(now.to_string());
        for record in &mut self.stages {
            if record.status == StageStatus::Pending {
                record.status = StageStatus::Skipped;
            }
        }
    }

    /// Terminal transition after reporting completes.
    pub fn complete(&mut self, status: RunStatus, now: &str) {
        debug_assert_ne!(status, RunStatus::Aborted, "use abort() for fatal exits");
        self.state = PipelineState::Done;
        self.status = Some(status);
        self.ended_at = Some(now.to_string());
    }

    /// First stage that failed outright, with its recorded error.
    pub fn first_failure(&self) -> Option<(&StageRecord, &StageError)> {
        self.stages.iter().find_map(|r| {
            if r.status == StageStatus::Failed {
                r.error.as_ref().map(|e| (r, e))
            } else {
                None
            }
        })
    }

    /// Whether any stage completed only partially.
    pub fn any_partial(&self) -> bool {
        self.stages.iter().any(|r| r.status == StageStatus::Partial)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_run_starts_scanning_with_all_stages_pending() {
        let run = PipelineRun::new("r1", "proj", "rules.md", false, "t0");
        assert_eq!(run.state, PipelineState::Scanning);
        assert!(run.status.is_none());
        assert!(run
            .stages
            .iter()
            .all(|r| r.status == StageStatus::Pending));
        assert_eq!(run.stages.len(), Stage::ALL.len());
    }

    #[test]
    fn abort_skips_unstarted_stages() {
        let mut run = PipelineRun::new("r1", "proj", "rules.md", false, "t0");
        run.begin_stage(Stage::Scan, "t1");
        run.finish_stage(
            Stage::Scan,
            StageStatus::Failed,
            Some(StageError {
                kind: "AgentInvocationError".to_string(),
                message: "agent died".to_string(),
            }),
            "t2",
        );
        run.abort("t3");

        assert_eq!(run.state, PipelineState::Aborted);
        assert_eq!(run.status, Some(RunStatus::Aborted));
        assert_eq!(run.stage(Stage::Interpret).status, StageStatus::Skipped);
        assert_eq!(run.stage(Stage::Report).status, StageStatus::Skipped);
        let (record, err) = run.first_failure().expect("failure recorded");
        assert_eq!(record.stage, Stage::Scan);
        assert_eq!(err.kind, "AgentInvocationError");
    }

    #[test]
    fn begin_stage_tracks_state_machine() {
        let mut run = PipelineRun::new("r1", "proj", "rules.md", false, "t0");
        run.begin_stage(Stage::Verify, "t1");
        assert_eq!(run.state, PipelineState::Verifying);
        assert_eq!(run.stage(Stage::Verify).status, StageStatus::Running);
    }

    #[test]
    fn run_record_round_trips_through_json() {
        let mut run = PipelineRun::new("r1", "proj", "rules.md", true, "t0");
        run.begin_stage(Stage::Scan, "t1");
        run.finish_stage(Stage::Scan, StageStatus::Succeeded, None, "t2");
        let json = serde_json::to_string(&run).expect("serialize");
        let back: PipelineRun = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, run);
    }
}
