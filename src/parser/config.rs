use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::config::load_profile_toml;
use crate::error::Result;
use crate::lookup::first_defined;

/// `parser.toml`: global XPaths, chapter/section filters, per-id override
/// tables, custom-package config files, and ordered build groups.
#[derive(Debug, Deserialize, Clone)]
pub struct ParserConfig {
    pub main: MainConfig,
    #[serde(default)]
    pub xpaths: HashMap<String, String>,
    #[serde(default)]
    pub chapter_filters: Filter,
    #[serde(default)]
    pub section_filters: Filter,
    #[serde(default)]
    pub custom_code: CustomCode,
    #[serde(default)]
    pub ordered_build_groups: Vec<OrderedBuildGroup>,
    /// Arbitrary `[<id>.xpaths]` override tables, keyed by chapter or
    /// section id.
    #[serde(flatten)]
    pub overrides: HashMap<String, ScopeOverride>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MainConfig {
    pub xml_path: String,
    #[serde(default = "default_output_file")]
    pub output_file: String,
}

fn default_output_file() -> String {
    "parser_output.json".to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Filter {
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl Filter {
    /// An id is processed iff (`include` is empty OR id ∈ `include`) AND
    /// id ∉ `exclude`. Exclude dominates.
    pub fn keeps(&self, id: &str) -> bool {
        (self.include.is_empty() || self.include.iter().any(|i| i == id))
            && !self.exclude.iter().any(|e| e == id)
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct CustomCode {
    #[serde(default)]
    pub configs: Vec<String>,
}

/// Explicit member order for a dependency cycle, with an optional anchor
/// (a package name, or the positional markers `first`/`last`) that places
/// the group among unrelated entries.
#[derive(Debug, Deserialize, Clone)]
pub struct OrderedBuildGroup {
    pub packages: Vec<String>,
    #[serde(default)]
    pub anchor: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ScopeOverride {
    #[serde(default)]
    pub xpaths: HashMap<String, String>,
}

impl ParserConfig {
    pub fn load(path: &Path) -> Result<Self> {
        load_profile_toml(path)
    }

    /// Hierarchical XPath lookup: section override, then chapter override,
    /// then global. None defined yields the empty value.
    pub fn xpath_for(&self, key: &str, chapter_id: &str, section_id: &str) -> Option<&String> {
        first_defined([
            self.overrides.get(section_id).and_then(|o| o.xpaths.get(key)),
            self.overrides.get(chapter_id).and_then(|o| o.xpaths.get(key)),
            self.xpaths.get(key),
        ])
    }
}
