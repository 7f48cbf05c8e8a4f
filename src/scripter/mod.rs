pub mod config;
pub mod rewrite;

use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use tracing::{info, warn};

use crate::config::BuilderConfig;
use crate::error::{Result, SkwError};
use crate::plan::{BuildEntry, BuildPlan};
use crate::util::substitute::{context_variables, substitute};
use self::config::ScripterConfig;
use self::rewrite::RewriteRule;

/// Run the scripter stage: compile every plan entry into an executable
/// shell script. Returns the scripts directory.
pub fn run(builder: &BuilderConfig, book: &str, profile: &str) -> Result<PathBuf> {
    let profile_dir = builder.profile_dir(book, profile);
    let cfg = ScripterConfig::load(&profile_dir.join("scripter.toml"))?;

    // The plan location comes from parser.toml, which the scripter reads
    // read-only to find its input.
    let parser_cfg = super::parser::config::ParserConfig::load(&profile_dir.join("parser.toml"))?;
    let base_vars = context_variables(book, profile, &builder.build_dir.to_string_lossy());
    let plan_path = builder
        .parser_out_dir(book, profile)
        .join(substitute(&parser_cfg.main.output_file, &base_vars));
    let plan = BuildPlan::load(&plan_path)?;

    let default_template_path = profile_dir.join(&cfg.main.default_template);
    if !default_template_path.exists() {
        return Err(SkwError::ConfigMissing(default_template_path));
    }
    let default_template = std::fs::read_to_string(&default_template_path)?;

    let scripts_dir = builder.scripts_dir(book, profile);
    std::fs::create_dir_all(&scripts_dir)?;

    for (index, entry) in plan.entries.iter().enumerate() {
        let template = load_template(&cfg, &profile_dir, entry, &default_template)?;
        let script = render(&cfg, entry, &template)?;

        let script_path = scripts_dir.join(entry.script_name(index));
        std::fs::write(&script_path, script)?;
        std::fs::set_permissions(&script_path, std::fs::Permissions::from_mode(0o755))?;
        info!("wrote {}", script_path.display());
    }

    Ok(scripts_dir)
}

fn load_template(
    cfg: &ScripterConfig,
    profile_dir: &std::path::Path,
    entry: &BuildEntry,
    default_template: &str,
) -> Result<String> {
    let name = cfg.template_for(entry);
    if name == cfg.main.default_template {
        return Ok(default_template.to_string());
    }
    let path = profile_dir.join(name);
    if !path.exists() {
        warn!(
            "template {} for entry ({}, {}) not found, using default",
            path.display(),
            entry.chapter_id,
            entry.section_id
        );
        return Ok(default_template.to_string());
    }
    Ok(std::fs::read_to_string(&path)?)
}

/// Expand `{{path}}` placeholders, then apply the entry's rewrite rules.
fn render(cfg: &ScripterConfig, entry: &BuildEntry, template: &str) -> Result<String> {
    let value = serde_json::to_value(entry)?;
    let mut script = expand_placeholders(template, &value);

    for rule_str in cfg.rules_for(entry) {
        match RewriteRule::parse(rule_str) {
            Ok(rule) => script = rule.apply(&script),
            // A bad rule never halts the stage.
            Err(e) => warn!("skipping rewrite rule: {}", e),
        }
    }

    Ok(script)
}

fn expand_placeholders(template: &str, entry: &serde_json::Value) -> String {
    let placeholder = regex::Regex::new(r"\{\{([A-Za-z0-9_]+(?:\.[A-Za-z0-9_]+)*)\}\}")
        .expect("placeholder pattern is valid");
    placeholder
        .replace_all(template, |caps: &regex::Captures| {
            let path = &caps[1];
            match resolve_path(entry, path) {
                Some(v) => value_to_string(v, path),
                None => {
                    warn!("placeholder '{{{{{}}}}}' not found in entry, expanding empty", path);
                    String::new()
                }
            }
        })
        .into_owned()
}

fn resolve_path<'a>(value: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    let mut current = value;
    for component in path.split('.') {
        current = current.get(component)?;
    }
    Some(current)
}

fn value_to_string(value: &serde_json::Value, path: &str) -> String {
    use serde_json::Value;
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => {
            let rendered: Vec<String> = items
                .iter()
                .map(|item| value_to_string(item, path))
                .collect();
            // Command sequences keep one command per line; every other
            // list collapses to a single space-separated word list.
            if path == "build_instructions" {
                rendered.join("\n")
            } else {
                rendered.join(" ")
            }
        }
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Object(_) => String::new(),
    }
}
