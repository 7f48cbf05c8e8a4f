use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info};

use crate::error::{Result, SkwError};
use crate::util::download;

fn is_http(uri: &str) -> bool {
    uri.starts_with("http://") || uri.starts_with("https://")
}

fn join_uri(repo: &str, name: &str) -> String {
    format!("{}/{}", repo.trim_end_matches('/'), name)
}

/// Probe the tiered cache: the first repo carrying `<pkg_file>.meta.json`
/// wins. HTTP failures of any kind count as a miss.
pub fn probe<'a>(download_repos: &'a [String], pkg_file: &str, timeout: u64) -> Option<&'a str> {
    let meta_name = format!("{}.meta.json", pkg_file);
    for repo in download_repos {
        let hit = if is_http(repo) {
            download::head_ok(&join_uri(repo, &meta_name), timeout)
        } else {
            Path::new(repo).join(&meta_name).exists()
        };
        if hit {
            info!("cache hit for {} in {}", pkg_file, repo);
            return Some(repo.as_str());
        }
        debug!("cache miss for {} in {}", pkg_file, repo);
    }
    None
}

/// Fetch archive and metadata from a repo that answered the probe. Any
/// failure here is fatal: the repo said it had the package.
pub fn fetch(repo: &str, pkg_file: &str, dest_dir: &Path, timeout: u64) -> Result<(PathBuf, PathBuf)> {
    std::fs::create_dir_all(dest_dir)?;
    let meta_name = format!("{}.meta.json", pkg_file);
    let archive_dest = dest_dir.join(pkg_file);
    let meta_dest = dest_dir.join(&meta_name);

    if is_http(repo) {
        download::download_file(&join_uri(repo, pkg_file), &archive_dest, timeout)?;
        download::download_file(&join_uri(repo, &meta_name), &meta_dest, timeout)?;
    } else {
        let base = Path::new(repo);
        copy_from_repo(&base.join(pkg_file), &archive_dest)?;
        copy_from_repo(&base.join(&meta_name), &meta_dest)?;
    }

    Ok((archive_dest, meta_dest))
}

fn copy_from_repo(src: &Path, dest: &Path) -> Result<()> {
    std::fs::copy(src, dest)
        .map_err(|e| SkwError::RepoUnreachable(format!("copy {} failed: {}", src.display(), e)))?;
    Ok(())
}

/// Publish archive + metadata to the upload repo.
///
/// A target containing `:` without a URL scheme is an SCP destination;
/// HTTP(S) targets are rejected outright; anything else is a local
/// directory.
pub fn publish(upload_repo: &str, archive: &Path, meta: &Path) -> Result<()> {
    if is_http(upload_repo) {
        return Err(SkwError::UploadRejected(upload_repo.to_string()));
    }

    if upload_repo.contains(':') {
        info!("publishing {} via scp to {}", archive.display(), upload_repo);
        let status = Command::new("scp")
            .arg(archive)
            .arg(meta)
            .arg(upload_repo)
            .status()
            .map_err(|e| SkwError::ConfigInvalid(format!("failed to spawn scp: {}", e)))?;
        if !status.success() {
            return Err(SkwError::ExternalToolFailed {
                tool: "scp".to_string(),
                code: status.code().unwrap_or(-1),
            });
        }
        return Ok(());
    }

    let dest = Path::new(upload_repo);
    std::fs::create_dir_all(dest)?;
    for file in [archive, meta] {
        let name = file
            .file_name()
            .ok_or_else(|| SkwError::ConfigInvalid(format!("bad artifact path {}", file.display())))?;
        std::fs::copy(file, dest.join(name))?;
    }
    info!("published {} to {}", archive.display(), upload_repo);
    Ok(())
}
