//! Build controller: runs the configured build/test commands.
//!
//! Every configured command runs even after a failure, so the report shows
//! the full picture. A build failure never halts the pipeline; it feeds the
//! final status instead.

use std::path::Path;

use tracing::{info, warn};

use crate::core::types::{BuildReport, CommandStatus};
use crate::error::PipelineError;
use crate::io::commands::{CommandRunner, CommandSpec};
use crate::io::config::PipelineConfig;
use crate::io::store::{ArtifactStore, keys};

pub struct BuildController<'a, B: CommandRunner + ?Sized> {
    store: &'a ArtifactStore,
    runner: &'a B,
    config: &'a PipelineConfig,
    workdir: &'a Path,
}

impl<'a, B: CommandRunner + ?Sized> BuildController<'a, B> {
    pub fn new(
        store: &'a ArtifactStore,
        runner: &'a B,
        config: &'a PipelineConfig,
        workdir: &'a Path,
    ) -> Self {
        Self {
            store,
            runner,
            config,
            workdir,
        }
    }

    /// Run all configured commands and persist the build report.
    ///
    /// No configured commands means a passing (vacuous) build.
    pub fn run(&self, generated_at: Option<String>) -> Result<BuildReport, PipelineError> {
        let mut commands = Vec::with_capacity(self.config.build.commands.len());
        for argv in &self.config.build.commands {
            let spec = CommandSpec::new(argv.clone());
            let result = self.runner.run(
                &spec,
                self.workdir,
                self.config.build_command_timeout(),
                self.config.output_limit_bytes,
            )?;
            match result.status {
                CommandStatus::Passed => {
                    info!(command = %result.command, "build command passed");
                }
                CommandStatus::Failed => {
                    warn!(command = %result.command, code = ?result.exit_code, "build command failed");
                }
                CommandStatus::TimedOut => {
                    warn!(command = %result.command, "build command timed out");
                }
            }
            commands.push(result);
        }

        let report = BuildReport {
            passed: commands.iter().all(|c| c.status == CommandStatus::Passed),
            commands,
            generated_at,
        };
        self.store.put_json(keys::BUILD_REPORT, &report)?;
        Ok(report)
    }
}

/// First timed-out command, if any; the run record surfaces this as a
/// `BuildTimeoutError`.
pub fn first_timeout(report: &BuildReport, config: &PipelineConfig) -> Option<PipelineError> {
    report
        .commands
        .iter()
        .find(|c| c.status == CommandStatus::TimedOut)
        .map(|c| PipelineError::BuildTimeout {
            command: c.command.clone(),
            timeout_secs: config.build.command_timeout_secs,
        })
}
