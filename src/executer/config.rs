use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::config::load_profile_toml;
use crate::error::{Result, SkwError};
use crate::plan::BuildEntry;
use crate::util::archive::PackageFormat;

/// `executer.toml`: repos, package naming, execution-mode and packaging
/// membership lists, and extraction targets.
#[derive(Debug, Deserialize, Clone)]
pub struct ExecuterConfig {
    pub main: MainConfig,
    #[serde(default)]
    pub chroot: IdSets,
    #[serde(default)]
    pub host: IdSets,
    #[serde(default)]
    pub package: IdSets,
    #[serde(default)]
    pub packages: PackagesConfig,
    #[serde(default)]
    pub extract: ExtractConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MainConfig {
    #[serde(default = "default_chroot_dir")]
    pub chroot_dir: PathBuf,
    #[serde(default)]
    pub upload_repo: Option<String>,
    #[serde(default)]
    pub download_repos: Vec<String>,
    #[serde(default = "default_package_format")]
    pub package_format: String,
    pub package_name_template: String,
    #[serde(default = "default_extract_dir")]
    pub default_extract_dir: PathBuf,
    #[serde(default = "default_true")]
    pub require_confirm_root: bool,
    /// Per-request HTTP timeout in seconds for cache probes and downloads.
    #[serde(default = "default_http_timeout")]
    pub http_timeout: u64,
}

fn default_chroot_dir() -> PathBuf {
    PathBuf::from("/mnt/scratch")
}
fn default_package_format() -> String {
    "tar.xz".to_string()
}
fn default_extract_dir() -> PathBuf {
    PathBuf::from("/")
}
fn default_true() -> bool {
    true
}
fn default_http_timeout() -> u64 {
    30
}

/// Membership list addressing entries by package name, section id, or
/// chapter id.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct IdSets {
    #[serde(default)]
    pub packages: Vec<String>,
    #[serde(default)]
    pub sections: Vec<String>,
    #[serde(default)]
    pub chapters: Vec<String>,
}

impl IdSets {
    pub fn contains(&self, entry: &BuildEntry) -> bool {
        (!entry.package_name.is_empty() && self.packages.iter().any(|p| *p == entry.package_name))
            || self.sections.iter().any(|s| *s == entry.section_id)
            || self.chapters.iter().any(|c| *c == entry.chapter_id)
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct PackagesConfig {
    #[serde(default)]
    pub exclude: IdSets,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ExtractConfig {
    #[serde(default)]
    pub targets: ExtractTargets,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ExtractTargets {
    #[serde(default)]
    pub packages: HashMap<String, PathBuf>,
    #[serde(default)]
    pub sections: HashMap<String, PathBuf>,
    #[serde(default)]
    pub chapters: HashMap<String, PathBuf>,
}

impl ExtractTargets {
    /// Package override beats section beats chapter.
    pub fn lookup(&self, entry: &BuildEntry) -> Option<&PathBuf> {
        crate::lookup::first_defined([
            self.packages.get(&entry.package_name),
            self.sections.get(&entry.section_id),
            self.chapters.get(&entry.chapter_id),
        ])
    }
}

/// Where a script runs: the host environment, or chrooted into the
/// profile's target tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecMode {
    Host,
    Chroot,
}

const NAME_PLACEHOLDERS: &[&str] = &[
    "book",
    "profile",
    "chapter_id",
    "section_id",
    "package_name",
    "package_version",
];

impl ExecuterConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let cfg: Self = load_profile_toml(path)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Schema checks that must fail at load time, not mid-pipeline: the
    /// package format and the name template's placeholder set.
    fn validate(&self) -> Result<()> {
        if PackageFormat::from_name(&self.main.package_format).is_none() {
            return Err(SkwError::ConfigInvalid(format!(
                "unknown package_format '{}' (expected tar, tar.gz, or tar.xz)",
                self.main.package_format
            )));
        }

        let placeholder = regex::Regex::new(r"\{([a-z_]+)\}").expect("placeholder pattern is valid");
        for caps in placeholder.captures_iter(&self.main.package_name_template) {
            let name = &caps[1];
            if !NAME_PLACEHOLDERS.contains(&name) {
                return Err(SkwError::ConfigInvalid(format!(
                    "unknown placeholder '{{{}}}' in package_name_template",
                    name
                )));
            }
        }
        Ok(())
    }

    pub fn package_format(&self) -> PackageFormat {
        PackageFormat::from_name(&self.main.package_format).expect("validated at load")
    }

    /// Render the package filename for an entry, extension included.
    pub fn package_file_name(&self, book: &str, profile: &str, entry: &BuildEntry) -> String {
        let base = self
            .main
            .package_name_template
            .replace("{book}", book)
            .replace("{profile}", profile)
            .replace("{chapter_id}", &entry.chapter_id)
            .replace("{section_id}", &entry.section_id)
            .replace("{package_name}", &entry.package_name)
            .replace("{package_version}", &entry.package_version);
        format!("{}.{}", base, self.package_format().extension())
    }

    /// Chroot membership wins over host; matching both is a config error,
    /// matching neither defaults to host.
    pub fn exec_mode(&self, entry: &BuildEntry) -> Result<ExecMode> {
        let in_chroot = self.chroot.contains(entry);
        let in_host = self.host.contains(entry);
        match (in_chroot, in_host) {
            (true, true) => Err(SkwError::ConfigInvalid(format!(
                "entry ({}, {}) is listed in both [chroot] and [host]",
                entry.chapter_id, entry.section_id
            ))),
            (true, false) => Ok(ExecMode::Chroot),
            _ => Ok(ExecMode::Host),
        }
    }

    /// Packaged iff listed in [package] and not in [packages.exclude].
    pub fn is_packaged(&self, entry: &BuildEntry) -> bool {
        self.package.contains(entry) && !self.packages.exclude.contains(entry)
    }
}
