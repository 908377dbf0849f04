//! Rule-driven refactoring pipeline CLI.
//!
//! `refactor-agent run <project> <rules>` drives the six-stage pipeline and
//! leaves its artifacts under `<project>/.refactor/`. All diagnostics go to
//! stderr; stdout carries only progress lines and the final outcome.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use refactor_agent::core::run::PipelineRun;
use refactor_agent::core::types::RunStatus;
use refactor_agent::error::PipelineError;
use refactor_agent::exit_codes;
use refactor_agent::io::agent::{ClaudeCliInvoker, CliRefactorer, CliSampleReviewer};
use refactor_agent::io::commands::{ShellCheckRunner, ShellCommandRunner};
use refactor_agent::io::config::load_config;
use refactor_agent::io::store::{ArtifactStore, keys};
use refactor_agent::logging;
use refactor_agent::pipeline::{Capabilities, PipelineOptions, run_pipeline};

#[derive(Parser)]
#[command(
    name = "refactor-agent",
    version,
    about = "Rule-driven refactoring pipeline orchestrator"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full pipeline against a project.
    Run {
        /// Path to the project to refactor.
        project: PathBuf,
        /// Path to the refactoring rules file.
        rules: PathBuf,
        /// Plan and verify without modifying project files.
        #[arg(short = 'n', long)]
        dry_run: bool,
        /// Suppress progress output on stdout.
        #[arg(short, long)]
        quiet: bool,
    },
    /// Print the most recent run record for a project.
    Status {
        /// Path to the project.
        project: PathBuf,
    },
    /// Remove the project's `.refactor` artifact directory.
    Clean {
        /// Path to the project.
        project: PathBuf,
    },
}

fn main() -> ExitCode {
    logging::init();
    let cli = Cli::parse();
    let code = match cli.command {
        Command::Run {
            project,
            rules,
            dry_run,
            quiet,
        } => cmd_run(project, rules, dry_run, quiet),
        Command::Status { project } => cmd_status(project).map(|()| exit_codes::OK),
        Command::Clean { project } => cmd_clean(project).map(|()| exit_codes::OK),
    };
    match code {
        Ok(code) => ExitCode::from(code as u8),
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::from(exit_codes::INVALID as u8)
        }
    }
}

fn cmd_run(project: PathBuf, rules: PathBuf, dry_run: bool, quiet: bool) -> Result<i32> {
    if !project.is_dir() {
        bail!("project directory not found: {}", project.display());
    }
    if !rules.is_file() {
        bail!("rules file not found: {}", rules.display());
    }
    let config = load_config(&project.join(".refactor").join("config.toml"))?;

    let invoker = ClaudeCliInvoker;
    let refactorer = CliRefactorer::new(&invoker);
    let reviewer = CliSampleReviewer::new(&invoker);
    let checks = ShellCheckRunner::new(config.checks.clone());
    let builder = ShellCommandRunner;
    let caps = Capabilities {
        agent: &invoker,
        refactorer: &refactorer,
        checks: &checks,
        reviewer: &reviewer,
        builder: &builder,
    };

    let options = PipelineOptions {
        project,
        rules,
        dry_run,
    };
    let on_progress = |message: &str, step: u32, total: u32| {
        if !quiet {
            println!("[{step}/{total}] {message}");
        }
    };

    let outcome = match run_pipeline(&options, &config, &caps, on_progress) {
        Ok(outcome) => outcome,
        Err(err @ PipelineError::RunLock { .. }) => {
            eprintln!("{err}");
            return Ok(exit_codes::ABORTED);
        }
        Err(err) => return Err(err.into()),
    };

    match outcome.status {
        RunStatus::Success => {
            println!("Refactoring completed: see .refactor/summary.md");
            Ok(exit_codes::OK)
        }
        RunStatus::Degraded => {
            println!("Refactoring completed with issues: see .refactor/summary.md");
            Ok(exit_codes::DEGRADED)
        }
        RunStatus::Aborted => {
            if let Some((record, err)) = outcome.run.first_failure() {
                eprintln!(
                    "Refactoring aborted at {}: {} ({})",
                    record.stage.as_str(),
                    err.message,
                    err.kind
                );
            } else {
                eprintln!("Refactoring aborted");
            }
            Ok(exit_codes::ABORTED)
        }
    }
}

fn cmd_status(project: PathBuf) -> Result<()> {
    let store = ArtifactStore::for_project(&project);
    let run: PipelineRun = store
        .get_json(keys::RUN)
        .with_context(|| format!("no run recorded under {}", store.root().display()))?;

    println!("run:     {}", run.run_id);
    println!("state:   {:?}", run.state);
    match run.status {
        Some(status) => println!("status:  {status:?}"),
        None => println!("status:  in progress"),
    }
    if run.dry_run {
        println!("mode:    dry run");
    }
    for record in &run.stages {
        let error = record
            .error
            .as_ref()
            .map(|e| format!(" ({})", e.kind))
            .unwrap_or_default();
        println!("  {:<10} {:?}{}", record.stage.as_str(), record.status, error);
    }
    Ok(())
}

fn cmd_clean(project: PathBuf) -> Result<()> {
    let store = ArtifactStore::for_project(&project);
    if !store.root().exists() {
        return Ok(());
    }
    if store.exists("run.lock") {
        bail!(
            "a run appears to be in progress (lock file present); not removing {}",
            store.root().display()
        );
    }
    fs::remove_dir_all(store.root())
        .with_context(|| format!("remove {}", store.root().display()))?;
    println!("removed {}", store.root().display());
    Ok(())
}
