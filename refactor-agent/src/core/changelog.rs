//! Change logs produced by refactoring passes.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::core::manifest::Area;

/// One file change applied (or previewed) by a refactorer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub path: String,
    pub operations: Vec<String>,
    pub rationale: String,
    /// Whether the refactorer judged this change to alter a public API surface.
    #[serde(default)]
    pub public_api: bool,
}

/// Ordered change records for one (pass, area) execution.
/// Append-only while the pass runs, never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeLog {
    pub pass: String,
    pub area: Area,
    /// True when produced under dry-run; no file was actually modified.
    #[serde(default)]
    pub preview: bool,
    pub changes: Vec<ChangeRecord>,
}

impl ChangeLog {
    pub fn files(&self) -> BTreeSet<&str> {
        self.changes.iter().map(|c| c.path.as_str()).collect()
    }
}

/// Union of files touched across a set of change logs.
pub fn touched_files(logs: &[ChangeLog]) -> BTreeSet<String> {
    logs.iter()
        .flat_map(|log| log.changes.iter().map(|c| c.path.clone()))
        .collect()
}

/// Whether any record for `path` declares a public API change.
pub fn alters_public_api(logs: &[ChangeLog], path: &str) -> bool {
    logs.iter()
        .flat_map(|log| &log.changes)
        .any(|c| c.path == path && c.public_api)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log(pass: &str, paths: &[&str]) -> ChangeLog {
        ChangeLog {
            pass: pass.to_string(),
            area: Area::Backend,
            preview: false,
            changes: paths
                .iter()
                .map(|p| ChangeRecord {
                    path: (*p).to_string(),
                    operations: vec!["normalize-imports".to_string()],
                    rationale: "tidy imports".to_string(),
                    public_api: false,
                })
                .collect(),
        }
    }

    #[test]
    fn touched_files_unions_across_logs() {
        let logs = vec![log("a", &["x.py", "y.py"]), log("b", &["y.py", "z.py"])];
        let touched = touched_files(&logs);
        assert_eq!(
            touched,
            ["x.py", "y.py", "z.py"].iter().map(|s| s.to_string()).collect()
        );
    }

    #[test]
    fn public_api_flag_is_per_file() {
        let mut logs = vec![log("a", &["x.py"])];
        logs[0].changes[0].public_api = true;
        assert!(alters_public_api(&logs, "x.py"));
        assert!(!alters_public_api(&logs, "y.py"));
    }
}
