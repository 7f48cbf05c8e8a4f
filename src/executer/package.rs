use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, SkwError};
use crate::plan::BuildEntry;
use crate::util::archive::{pack_dir, PackageFormat};
use crate::util::checksum;

/// The `.meta.json` record written next to every package archive.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PackageMeta {
    pub package_name: String,
    pub package_version: String,
    pub book: String,
    pub profile: String,
    pub chapter_id: String,
    pub section_id: String,
    pub sha256: String,
    pub created_at: String,
    pub hostname: String,
    pub platform: String,
    pub files: Vec<String>,
}

impl PackageMeta {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SkwError::ArchiveError(format!("failed to read {}: {}", path.display(), e))
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

fn hostname() -> String {
    nix::unistd::gethostname()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Archive a staging tree and write its metadata record.
/// Returns (archive path, metadata path).
pub fn create(
    entry: &BuildEntry,
    book: &str,
    profile: &str,
    stage_dir: &Path,
    package_dir: &Path,
    pkg_file: &str,
    format: PackageFormat,
) -> Result<(PathBuf, PathBuf)> {
    std::fs::create_dir_all(package_dir)?;
    let archive_path = package_dir.join(pkg_file);

    let files = pack_dir(stage_dir, &archive_path, format)?;
    let sha256 = checksum::sha256_file(&archive_path)?;

    let meta = PackageMeta {
        package_name: entry.package_name.clone(),
        package_version: entry.package_version.clone(),
        book: book.to_string(),
        profile: profile.to_string(),
        chapter_id: entry.chapter_id.clone(),
        section_id: entry.section_id.clone(),
        sha256,
        created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        hostname: hostname(),
        platform: format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH),
        files,
    };

    let meta_path = package_dir.join(format!("{}.meta.json", pkg_file));
    meta.save(&meta_path)?;

    info!(
        "packaged {} ({} files, sha256 {})",
        archive_path.display(),
        meta.files.len(),
        &meta.sha256[..12]
    );

    Ok((archive_path, meta_path))
}

/// Recompute the archive digest and compare against its metadata.
pub fn verify(archive: &Path, meta: &PackageMeta) -> Result<()> {
    let actual = checksum::sha256_file(archive)?;
    if actual != meta.sha256 {
        return Err(SkwError::IntegrityError {
            file: archive.display().to_string(),
            expected: meta.sha256.clone(),
            actual,
        });
    }
    Ok(())
}
