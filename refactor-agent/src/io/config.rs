//! Pipeline configuration stored under `<project>/.refactor/config.toml`.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Pipeline configuration (TOML).
///
/// This file is intended to be edited by humans and must remain stable and
/// automatable. Missing fields default to sensible values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Wall-clock budget for one external agent invocation, in seconds.
    pub agent_timeout_secs: u64,

    /// Wall-clock budget for one post-pass check command, in seconds.
    pub check_timeout_secs: u64,

    /// Truncate captured agent/check/build output beyond this many bytes.
    pub output_limit_bytes: usize,

    pub sample: SampleConfig,

    pub build: BuildConfig,

    /// Post-pass check name -> command argv (e.g. `lint = ["npm","run","lint"]`).
    /// Checks without a configured command are recorded as skipped.
    pub checks: BTreeMap<String, Vec<String>>,
}

/// Sampling-round bounds, surfaced to the caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SampleConfig {
    /// Fixed number of changed files to sample for deep review.
    pub size: usize,
    /// Optional fraction of changed files, overriding `size` when set.
    pub fraction: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BuildConfig {
    /// Commands to run in the build stage, each as an argv vector.
    pub commands: Vec<Vec<String>>,
    /// Per-command timeout in seconds.
    pub command_timeout_secs: u64,
}

impl Default for SampleConfig {
    fn default() -> Self {
        Self {
            size: 5,
            fraction: None,
        }
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            commands: Vec::new(),
            command_timeout_secs: 5 * 60,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            agent_timeout_secs: 10 * 60,
            check_timeout_secs: 5 * 60,
            output_limit_bytes: 100_000,
            sample: SampleConfig::default(),
            build: BuildConfig::default(),
            checks: BTreeMap::new(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.agent_timeout_secs == 0 {
            return Err(anyhow!("agent_timeout_secs must be > 0"));
        }
        if self.check_timeout_secs == 0 {
            return Err(anyhow!("check_timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.sample.size == 0 {
            return Err(anyhow!("sample.size must be > 0"));
        }
        if let Some(fraction) = self.sample.fraction
            && !(fraction > 0.0 && fraction <= 1.0)
        {
            return Err(anyhow!("sample.fraction must be in (0, 1]"));
        }
        if self.build.command_timeout_secs == 0 {
            return Err(anyhow!("build.command_timeout_secs must be > 0"));
        }
        for argv in &self.build.commands {
            if argv.is_empty() || argv[0].trim().is_empty() {
                return Err(anyhow!("build.commands entries must be non-empty argv arrays"));
            }
        }
        for (name, argv) in &self.checks {
            if argv.is_empty() || argv[0].trim().is_empty() {
                return Err(anyhow!("checks.{name} must be a non-empty argv array"));
            }
        }
        Ok(())
    }

    pub fn agent_timeout(&self) -> Duration {
        Duration::from_secs(self.agent_timeout_secs)
    }

    pub fn check_timeout(&self) -> Duration {
        Duration::from_secs(self.check_timeout_secs)
    }

    pub fn build_command_timeout(&self) -> Duration {
        Duration::from_secs(self.build.command_timeout_secs)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `PipelineConfig::default()`.
pub fn load_config(path: &Path) -> Result<PipelineConfig> {
    if !path.exists() {
        let cfg = PipelineConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: PipelineConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}
