//! Project manifest produced by the scan stage.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Logical area a file belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Area {
    Frontend,
    Backend,
    Shared,
}

impl Area {
    pub fn as_str(self) -> &'static str {
        match self {
            Area::Frontend => "frontend",
            Area::Backend => "backend",
            Area::Shared => "shared",
        }
    }
}

/// One scanned file with its classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Path relative to the project root.
    pub path: String,
    /// Language classification (e.g. "python", "typescript").
    pub language: String,
    pub area: Area,
}

/// Aggregate counts over the scanned files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestSummary {
    pub total_files: usize,
    #[serde(default)]
    pub by_language: BTreeMap<String, usize>,
}

/// Snapshot of the target project. Immutable once written by the scan stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub scanned_at: Option<String>,
    pub files: Vec<FileEntry>,
    pub summary: ManifestSummary,
}

impl Manifest {
    /// Consistency checks beyond what the JSON schema can express.
    /// Returns a human-readable description of the first violation.
    pub fn validate(&self) -> Result<(), String> {
        if self.summary.total_files != self.files.len() {
            return Err(format!(
                "summary.total_files is {} but manifest lists {} files",
                self.summary.total_files,
                self.files.len()
            ));
        }
        let mut seen = BTreeSet::new();
        for entry in &self.files {
            if entry.path.trim().is_empty() {
                return Err("manifest contains an empty file path".to_string());
            }
            if !seen.insert(entry.path.as_str()) {
                return Err(format!("duplicate manifest entry for '{}'", entry.path));
            }
        }
        Ok(())
    }

    /// Set of all file paths in the manifest.
    pub fn file_set(&self) -> BTreeSet<&str> {
        self.files.iter().map(|f| f.path.as_str()).collect()
    }

    /// Area classification for a path, if the manifest knows it.
    pub fn area_of(&self, path: &str) -> Option<Area> {
        self.files.iter().find(|f| f.path == path).map(|f| f.area)
    }
}
