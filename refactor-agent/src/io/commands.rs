//! Shell-backed capabilities: build command runner and post-pass checks.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::types::{CommandResult, CommandStatus};
use crate::error::PipelineError;
use crate::io::process::run_command_with_timeout;

/// One build/test command to execute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub argv: Vec<String>,
}

impl CommandSpec {
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }

    pub fn rendered(&self) -> String {
        self.argv.join(" ")
    }
}

/// Build command runner capability.
pub trait CommandRunner {
    fn run(
        &self,
        spec: &CommandSpec,
        workdir: &Path,
        timeout: Duration,
        output_limit_bytes: usize,
    ) -> Result<CommandResult, PipelineError>;
}

/// Runner that spawns the command directly.
#[derive(Debug, Default)]
pub struct ShellCommandRunner;

impl CommandRunner for ShellCommandRunner {
    fn run(
        &self,
        spec: &CommandSpec,
        workdir: &Path,
        timeout: Duration,
        output_limit_bytes: usize,
    ) -> Result<CommandResult, PipelineError> {
        let rendered = spec.rendered();
        info!(command = %rendered, "running build command");
        let mut cmd = Command::new(&spec.argv[0]);
        cmd.args(&spec.argv[1..]).current_dir(workdir);

        let output = match run_command_with_timeout(cmd, None, timeout, output_limit_bytes) {
            Ok(output) => output,
            Err(err) => {
                // Spawn failures (missing binary, etc.) are a failed command,
                // not a pipeline error.
                warn!(command = %rendered, err = %err, "command could not run");
                return Ok(CommandResult {
                    command: rendered,
                    exit_code: None,
                    status: CommandStatus::Failed,
                    duration_ms: 0,
                    output_tail: format!("{err:#}"),
                });
            }
        };

        let status = if output.timed_out {
            CommandStatus::TimedOut
        } else if output.status.success() {
            CommandStatus::Passed
        } else {
            CommandStatus::Failed
        };
        debug!(command = %rendered, ?status, "build command finished");
        Ok(CommandResult {
            command: rendered,
            exit_code: output.status.code(),
            status,
            duration_ms: output.duration.as_millis() as u64,
            output_tail: output.combined_tail(4_000),
        })
    }
}

/// Outcome of one post-pass check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Passed,
    Failed,
    /// No command is configured for this check name.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    pub name: String,
    pub status: CheckStatus,
    pub detail: Option<String>,
}

/// Post-pass check capability.
pub trait CheckRunner {
    fn run_check(
        &self,
        name: &str,
        workdir: &Path,
        timeout: Duration,
        output_limit_bytes: usize,
    ) -> Result<CheckOutcome, PipelineError>;
}

/// Check runner mapping configured check names to shell commands.
#[derive(Debug, Default)]
pub struct ShellCheckRunner {
    commands: BTreeMap<String, Vec<String>>,
}

impl ShellCheckRunner {
    pub fn new(commands: BTreeMap<String, Vec<String>>) -> Self {
        Self { commands }
    }
}

impl CheckRunner for ShellCheckRunner {
    fn run_check(
        &self,
        name: &str,
        workdir: &Path,
        timeout: Duration,
        output_limit_bytes: usize,
    ) -> Result<CheckOutcome, PipelineError> {
        let Some(argv) = self.commands.get(name) else {
            warn!(check = name, "no command configured for check, skipping");
            return Ok(CheckOutcome {
                name: name.to_string(),
                status: CheckStatus::Skipped,
                detail: Some("no command configured".to_string()),
            });
        };
        let result = ShellCommandRunner.run(
            &CommandSpec::new(argv.clone()),
            workdir,
            timeout,
            output_limit_bytes,
        )?;
        let status = match result.status {
            CommandStatus::Passed => CheckStatus::Passed,
            CommandStatus::Failed | CommandStatus::TimedOut => CheckStatus::Failed,
        };
        Ok(CheckOutcome {
            name: name.to_string(),
            status,
            detail: (status == CheckStatus::Failed).then(|| result.output_tail.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passing_command_is_recorded_as_passed() {
        let result = ShellCommandRunner
            .run(
                &CommandSpec::new(vec!["true".to_string()]),
                Path::new("."),
                Duration::from_secs(5),
                1024,
            )
            .expect("run");
        assert_eq!(result.status, CommandStatus::Passed);
        assert_eq!(result.exit_code, Some(0));
    }

    #[test]
    fn failing_command_keeps_its_exit_code() {
        let result = ShellCommandRunner
            .run(
                &CommandSpec::new(vec!["sh".to_string(), "-c".to_string(), "exit 3".to_string()]),
                Path::new("."),
                Duration::from_secs(5),
                1024,
            )
            .expect("run");
        assert_eq!(result.status, CommandStatus::Failed);
        assert_eq!(result.exit_code, Some(3));
    }

    #[test]
    fn missing_binary_is_a_failed_result_not_an_error() {
        let result = ShellCommandRunner
            .run(
                &CommandSpec::new(vec!["definitely-not-a-real-binary".to_string()]),
                Path::new("."),
                Duration::from_secs(5),
                1024,
            )
            .expect("run");
        assert_eq!(result.status, CommandStatus::Failed);
        assert_eq!(result.exit_code, None);
    }

    #[test]
    fn timed_out_command_is_marked_timed_out() {
        let result = ShellCommandRunner
            .run(
                &CommandSpec::new(vec!["sleep".to_string(), "5".to_string()]),
                Path::new("."),
                Duration::from_millis(100),
                1024,
            )
            .expect("run");
        assert_eq!(result.status, CommandStatus::TimedOut);
    }

    #[test]
    fn unconfigured_check_is_skipped() {
        let runner = ShellCheckRunner::default();
        let outcome = runner
            .run_check("lint", Path::new("."), Duration::from_secs(5), 1024)
            .expect("run");
        assert_eq!(outcome.status, CheckStatus::Skipped);
    }

    #[test]
    fn configured_check_runs_its_command() {
        let mut commands = BTreeMap::new();
        commands.insert("lint".to_string(), vec!["false".to_string()]);
        let runner = ShellCheckRunner::new(commands);
        let outcome = runner
            .run_check("lint", Path::new("."), Duration::from_secs(5), 1024)
            .expect("run");
        assert_eq!(outcome.status, CheckStatus::Failed);
    }
}
