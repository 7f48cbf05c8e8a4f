use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::config::load_profile_toml;
use crate::error::Result;
use crate::lookup::first_defined;
use crate::plan::BuildEntry;

/// `scripter.toml`: the default template plus per-id scope tables carrying
/// a template override and/or rewrite rule patterns.
#[derive(Debug, Deserialize, Clone)]
pub struct ScripterConfig {
    pub main: MainConfig,
    #[serde(flatten)]
    pub scopes: HashMap<String, ScopeRules>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MainConfig {
    pub default_template: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ScopeRules {
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub regex: Option<RegexRules>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RegexRules {
    #[serde(default)]
    pub patterns: Vec<String>,
}

impl ScripterConfig {
    pub fn load(path: &Path) -> Result<Self> {
        load_profile_toml(path)
    }

    /// Template selection: package, then section, then chapter override,
    /// falling back to the default template.
    pub fn template_for(&self, entry: &BuildEntry) -> &str {
        first_defined([
            self.scope_template(&entry.package_name),
            self.scope_template(&entry.section_id),
            self.scope_template(&entry.chapter_id),
        ])
        .map(String::as_str)
        .unwrap_or(&self.main.default_template)
    }

    fn scope_template(&self, id: &str) -> Option<&String> {
        self.scopes.get(id).and_then(|s| s.template.as_ref())
    }

    /// Rewrite rules in application order: global, chapter, section,
    /// package. Later rules apply on top of earlier output. A section and
    /// package sharing one id contribute their scope once.
    pub fn rules_for(&self, entry: &BuildEntry) -> Vec<&str> {
        let mut ids: Vec<&str> =
            vec!["global", &entry.chapter_id, &entry.section_id, &entry.package_name];
        ids.dedup();
        ids.into_iter()
            .filter_map(|id| self.scopes.get(id))
            .filter_map(|s| s.regex.as_ref())
            .flat_map(|r| r.patterns.iter().map(String::as_str))
            .collect()
    }
}
