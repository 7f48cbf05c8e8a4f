use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SkwError};

/// One unit of work in the build plan, typically one package.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct BuildEntry {
    pub source_book: String,
    pub chapter_id: String,
    pub section_id: String,
    pub package_name: String,
    pub package_version: String,
    #[serde(default)]
    pub sources: Sources,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub build_instructions: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct Sources {
    #[serde(default)]
    pub titles: Vec<String>,
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default)]
    pub checksums: Vec<String>,
}

impl BuildEntry {
    /// Base name shared by the generated script and per-entry work dirs.
    pub fn slug(&self) -> String {
        format!("{}_{}", self.chapter_id, self.section_id)
    }

    pub fn script_name(&self, index: usize) -> String {
        format!("{:04}_{}.sh", index, self.slug())
    }
}

/// The ordered build plan. Order is execution order, fixed at generation time.
#[derive(Debug, Clone, Default)]
pub struct BuildPlan {
    pub entries: Vec<BuildEntry>,
}

impl BuildPlan {
    pub fn new(entries: Vec<BuildEntry>) -> Self {
        Self { entries }
    }

    /// Check the entry invariants the rest of the pipeline relies on.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for entry in &self.entries {
            if entry.chapter_id.is_empty() {
                return Err(SkwError::PlanInvalid(format!(
                    "entry '{}' has an empty chapter_id",
                    entry.section_id
                )));
            }
            if !seen.insert((entry.chapter_id.clone(), entry.section_id.clone())) {
                return Err(SkwError::PlanInvalid(format!(
                    "duplicate entry ({}, {})",
                    entry.chapter_id, entry.section_id
                )));
            }
            if !entry.sources.urls.is_empty()
                && !entry.sources.checksums.is_empty()
                && entry.sources.urls.len() != entry.sources.checksums.len()
            {
                return Err(SkwError::PlanInvalid(format!(
                    "entry ({}, {}): {} source urls but {} checksums",
                    entry.chapter_id,
                    entry.section_id,
                    entry.sources.urls.len(),
                    entry.sources.checksums.len()
                )));
            }
        }
        Ok(())
    }

    /// Write the plan as an indented UTF-8 JSON array.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.entries)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SkwError::ConfigInvalid(format!("failed to read plan {}: {}", path.display(), e))
        })?;
        let entries: Vec<BuildEntry> = serde_json::from_str(&content)?;
        Ok(Self { entries })
    }
}
