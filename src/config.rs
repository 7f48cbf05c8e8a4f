use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{Result, SkwError};

/// Top-level `builder.toml`: the four roots everything else hangs off.
#[derive(Debug, Deserialize, Clone)]
pub struct BuilderConfig {
    #[serde(default = "default_build_dir")]
    pub build_dir: PathBuf,
    #[serde(default = "default_package_dir")]
    pub package_dir: PathBuf,
    #[serde(default = "default_profiles_dir")]
    pub profiles_dir: PathBuf,
    #[serde(default = "default_skel_dir")]
    pub skel_dir: PathBuf,
}

fn default_build_dir() -> PathBuf {
    PathBuf::from("build")
}
fn default_package_dir() -> PathBuf {
    PathBuf::from("packages")
}
fn default_profiles_dir() -> PathBuf {
    PathBuf::from("profiles")
}
fn default_skel_dir() -> PathBuf {
    PathBuf::from("skel")
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            build_dir: default_build_dir(),
            package_dir: default_package_dir(),
            profiles_dir: default_profiles_dir(),
            skel_dir: default_skel_dir(),
        }
    }
}

fn get_xdg_config() -> Option<PathBuf> {
    let uid = unsafe { libc::getuid() };
    if uid == 0 {
        return None;
    }

    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .ok()
        .or_else(|| {
            std::env::var("HOME")
                .map(|h| PathBuf::from(h).join(".config"))
                .ok()
        })
        .map(|p| p.join("skw/builder.toml"))
}

/// Recursively merge two TOML values. For tables, overlay keys win;
/// missing keys are inherited from base. All other types (scalars, arrays)
/// are replaced wholesale by the overlay value.
fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    use toml::Value;
    match (base, overlay) {
        (Value::Table(mut base_map), Value::Table(overlay_map)) => {
            for (k, v) in overlay_map {
                let merged = if let Some(base_v) = base_map.remove(&k) {
                    merge_toml(base_v, v)
                } else {
                    v
                };
                base_map.insert(k, merged);
            }
            Value::Table(base_map)
        }
        (_, overlay) => overlay,
    }
}

fn load_toml_file(path: &Path) -> Result<toml::Value> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| SkwError::ConfigInvalid(format!("failed to read {}: {}", path.display(), e)))?;
    Ok(toml::from_str(&content)?)
}

impl BuilderConfig {
    /// Load configuration with layered merging.
    ///
    /// When an explicit `path` is supplied (via `--config`), that single file
    /// is loaded as-is with no layering, and it must exist.
    ///
    /// Otherwise configs are merged in ascending priority order so that
    /// higher-priority files only need to specify the keys they want to
    /// override:
    ///
    ///   1. `/etc/skw/builder.toml`              (system-wide, lowest priority)
    ///   2. `$XDG_CONFIG_HOME/skw/builder.toml`  (per-user, non-root only)
    ///   3. `./builder.toml`                     (project-local, highest priority)
    ///
    /// A layer that does not exist is silently skipped. If no file is found
    /// at any location, built-in defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(p) = path {
            if !p.exists() {
                return Err(SkwError::ConfigMissing(p.to_path_buf()));
            }
            return Ok(toml::from_str(&std::fs::read_to_string(p).map_err(|e| {
                SkwError::ConfigInvalid(format!("failed to read {}: {}", p.display(), e))
            })?)?);
        }

        let mut layers: Vec<PathBuf> = vec![PathBuf::from("/etc/skw/builder.toml")];
        if let Some(xdg) = get_xdg_config() {
            layers.push(xdg);
        }
        layers.push(PathBuf::from("./builder.toml"));

        let mut merged: Option<toml::Value> = None;
        for layer_path in &layers {
            if layer_path.exists() {
                let val = load_toml_file(layer_path)?;
                merged = Some(match merged {
                    Some(base) => merge_toml(base, val),
                    None => val,
                });
            }
        }

        match merged {
            None => Ok(Self::default()),
            Some(val) => Ok(BuilderConfig::deserialize(val).map_err(|e| {
                SkwError::ConfigInvalid(format!("builder.toml: {}", e))
            })?),
        }
    }

    pub fn profile_dir(&self, book: &str, profile: &str) -> PathBuf {
        self.profiles_dir.join(book).join(profile)
    }

    pub fn book_dir(&self, book: &str) -> PathBuf {
        self.profiles_dir.join(book)
    }

    pub fn parser_out_dir(&self, book: &str, profile: &str) -> PathBuf {
        self.build_dir.join("parser").join(book).join(profile)
    }

    pub fn scripts_dir(&self, book: &str, profile: &str) -> PathBuf {
        self.build_dir
            .join("scripter")
            .join(book)
            .join(profile)
            .join("scripts")
    }

    pub fn executer_dir(&self, book: &str, profile: &str) -> PathBuf {
        self.build_dir.join("executer").join(book).join(profile)
    }
}

/// Load one per-profile TOML config, failing fast on schema violations.
pub fn load_profile_toml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Err(SkwError::ConfigMissing(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| SkwError::ConfigInvalid(format!("failed to read {}: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| SkwError::ConfigInvalid(format!("{}: {}", path.display(), e)))
}
