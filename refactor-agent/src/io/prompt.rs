//! Prompt builders for the external agent capabilities.
//!
//! All agent-facing prompts are deterministic minijinja renders of embedded
//! templates, so a given set of artifacts always produces the same prompt.

use anyhow::Result;
use minijinja::{Environment, context};

use crate::core::manifest::Area;
use crate::core::plan::PassSpec;

const SCAN_TEMPLATE: &str = include_str!("prompts/scan.md");
const INTERPRET_TEMPLATE: &str = include_str!("prompts/interpret.md");
const APPLY_PASS_TEMPLATE: &str = include_str!("prompts/apply_pass.md");
const SAMPLE_REVIEW_TEMPLATE: &str = include_str!("prompts/sample_review.md");
const REPORT_TEMPLATE: &str = include_str!("prompts/report.md");

/// Template engine wrapper around minijinja.
pub struct PromptBuilder {
    env: Environment<'static>,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptBuilder {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("scan", SCAN_TEMPLATE)
            .expect("scan template should be valid");
        env.add_template("interpret", INTERPRET_TEMPLATE)
            .expect("interpret template should be valid");
        env.add_template("apply_pass", APPLY_PASS_TEMPLATE)
            .expect("apply_pass template should be valid");
        env.add_template("sample_review", SAMPLE_REVIEW_TEMPLATE)
            .expect("sample_review template should be valid");
        env.add_template("report", REPORT_TEMPLATE)
            .expect("report template should be valid");
        Self { env }
    }

    pub fn render_scan(&self, project: &str) -> Result<String> {
        let rendered = self
            .env
            .get_template("scan")?
            .render(context! { project })?;
        Ok(rendered)
    }

    pub fn render_interpret(&self, rules_path: &str, rules_text: &str) -> Result<String> {
        let rendered = self.env.get_template("interpret")?.render(context! {
            rules_path,
            rules_text => rules_text.trim(),
        })?;
        Ok(rendered)
    }

    pub fn render_apply_pass(
        &self,
        pass: &PassSpec,
        area: Area,
        targets: &[String],
        preview: bool,
    ) -> Result<String> {
        let rendered = self.env.get_template("apply_pass")?.render(context! {
            pass_name => pass.name,
            mode => if preview { "PLAN ONLY (dry run)" } else { "APPLY CHANGES" },
            preview,
            area => area.as_str(),
            targets,
            operations => pass.operations,
        })?;
        Ok(rendered)
    }

    pub fn render_sample_review(&self, files: &[String]) -> Result<String> {
        let rendered = self
            .env
            .get_template("sample_review")?
            .render(context! { files })?;
        Ok(rendered)
    }

    pub fn render_report(
        &self,
        status: &str,
        files_changed: usize,
        verification: &str,
        build: &str,
        stages: &[String],
    ) -> Result<String> {
        let rendered = self.env.get_template("report")?.render(context! {
            status,
            files_changed,
            verification,
            build,
            stages,
        })?;
        Ok(rendered)
    }
}
