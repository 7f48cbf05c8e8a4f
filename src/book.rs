use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Deserialize;
use tracing::info;

use crate::config::{load_profile_toml, BuilderConfig};
use crate::error::{Result, SkwError};

/// `profiles_dir/<book>/book.toml`: where the book sources come from and
/// how they are rendered into the XML the parser reads.
#[derive(Debug, Deserialize, Clone)]
pub struct BookConfig {
    pub repo_url: String,
    #[serde(default)]
    pub revision: Option<String>,
    pub target_dir: PathBuf,
    #[serde(default)]
    pub make_command: Option<String>,
}

/// Clone or update the book repository, then run its make command.
///
/// An existing `target_dir` that is a git checkout is updated in place
/// (fetch + checkout + pull); an existing directory that is not a git
/// checkout is an error and is never overwritten.
pub fn install(builder: &BuilderConfig, book: &str) -> Result<()> {
    let cfg: BookConfig = load_profile_toml(&builder.book_dir(book).join("book.toml"))?;

    if cfg.target_dir.join(".git").exists() {
        info!("updating existing checkout in {}", cfg.target_dir.display());
        run_git(&cfg.target_dir, &["fetch", "--all", "--tags"])?;
        if let Some(revision) = &cfg.revision {
            run_git(&cfg.target_dir, &["checkout", revision])?;
        }
        run_git(&cfg.target_dir, &["pull", "--ff-only"])?;
    } else if cfg.target_dir.exists() {
        return Err(SkwError::ConfigInvalid(format!(
            "{} exists but is not a git checkout; refusing to overwrite",
            cfg.target_dir.display()
        )));
    } else {
        info!("cloning {} into {}", cfg.repo_url, cfg.target_dir.display());
        if let Some(parent) = cfg.target_dir.parent() {
            std::fs::create_dir_all(parent)?;
        }
        run_tool(
            "git",
            Command::new("git")
                .arg("clone")
                .arg(&cfg.repo_url)
                .arg(&cfg.target_dir),
        )?;
        if let Some(revision) = &cfg.revision {
            run_git(&cfg.target_dir, &["checkout", revision])?;
        }
    }

    if let Some(make_command) = &cfg.make_command {
        info!("running '{}' in {}", make_command, cfg.target_dir.display());
        run_tool(
            "make",
            Command::new("sh")
                .arg("-c")
                .arg(make_command)
                .current_dir(&cfg.target_dir),
        )?;
    }

    Ok(())
}

fn run_git(dir: &Path, args: &[&str]) -> Result<()> {
    run_tool("git", Command::new("git").arg("-C").arg(dir).args(args))
}

fn run_tool(tool: &str, cmd: &mut Command) -> Result<()> {
    let status = cmd
        .status()
        .map_err(|e| SkwError::ConfigInvalid(format!("failed to spawn {}: {}", tool, e)))?;
    if !status.success() {
        return Err(SkwError::ExternalToolFailed {
            tool: tool.to_string(),
            code: status.code().unwrap_or(-1),
        });
    }
    Ok(())
}
