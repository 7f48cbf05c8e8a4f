use std::io::Write;
use std::path::{Component, Path, PathBuf};

use crate::error::{Result, SkwError};

/// Tar compression variants a package archive may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageFormat {
    Tar,
    TarGz,
    TarXz,
}

impl PackageFormat {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "tar" => Some(Self::Tar),
            "tar.gz" => Some(Self::TarGz),
            "tar.xz" => Some(Self::TarXz),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Tar => "tar",
            Self::TarGz => "tar.gz",
            Self::TarXz => "tar.xz",
        }
    }
}

/// Create a package archive from a staging directory.
///
/// Members are relative to `source_dir`, walked in sorted order so the
/// archive bytes are reproducible for identical input trees. Symlinks are
/// archived as links, never followed. Returns the member list used for
/// the metadata `files` manifest.
pub fn pack_dir(source_dir: &Path, output_path: &Path, format: PackageFormat) -> Result<Vec<String>> {
    let file = std::fs::File::create(output_path).map_err(|e| {
        SkwError::ArchiveError(format!("failed to create {}: {}", output_path.display(), e))
    })?;

    match format {
        PackageFormat::Tar => {
            let mut builder = tar::Builder::new(file);
            let files = append_tree(&mut builder, source_dir)?;
            builder
                .into_inner()
                .map_err(|e| SkwError::ArchiveError(format!("tar finalize failed: {}", e)))?;
            Ok(files)
        }
        PackageFormat::TarGz => {
            let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
            let mut builder = tar::Builder::new(encoder);
            let files = append_tree(&mut builder, source_dir)?;
            let encoder = builder
                .into_inner()
                .map_err(|e| SkwError::ArchiveError(format!("tar finalize failed: {}", e)))?;
            encoder
                .finish()
                .map_err(|e| SkwError::ArchiveError(format!("gzip finish failed: {}", e)))?;
            Ok(files)
        }
        PackageFormat::TarXz => {
            let encoder = xz2::write::XzEncoder::new(file, 6);
            let mut builder = tar::Builder::new(encoder);
            let files = append_tree(&mut builder, source_dir)?;
            let encoder = builder
                .into_inner()
                .map_err(|e| SkwError::ArchiveError(format!("tar finalize failed: {}", e)))?;
            encoder
                .finish()
                .map_err(|e| SkwError::ArchiveError(format!("xz finish failed: {}", e)))?;
            Ok(files)
        }
    }
}

fn append_tree<W: Write>(builder: &mut tar::Builder<W>, source_dir: &Path) -> Result<Vec<String>> {
    builder.follow_symlinks(false);

    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(source_dir).sort_by_file_name() {
        let entry =
            entry.map_err(|e| SkwError::ArchiveError(format!("failed to walk directory: {}", e)))?;
        let full_path = entry.path();
        let rel_path = full_path.strip_prefix(source_dir).unwrap_or(full_path);
        if rel_path == Path::new("") {
            continue;
        }

        let metadata = full_path.symlink_metadata().map_err(|e| {
            SkwError::ArchiveError(format!(
                "failed to read metadata for {}: {}",
                full_path.display(),
                e
            ))
        })?;

        if metadata.is_symlink() {
            let target = std::fs::read_link(full_path).map_err(|e| {
                SkwError::ArchiveError(format!(
                    "failed to read symlink {}: {}",
                    full_path.display(),
                    e
                ))
            })?;
            let mut header = tar::Header::new_gnu();
            header.set_entry_type(tar::EntryType::Symlink);
            header.set_size(0);
            header.set_mode(0o777);
            header.set_mtime(
                metadata
                    .modified()
                    .map(|t| {
                        t.duration_since(std::time::UNIX_EPOCH)
                            .unwrap_or_default()
                            .as_secs()
                    })
                    .unwrap_or(0),
            );
            builder
                .append_link(&mut header, rel_path, &target)
                .map_err(|e| SkwError::ArchiveError(format!("tar append symlink failed: {}", e)))?;
        } else if metadata.is_dir() {
            builder
                .append_dir(rel_path, full_path)
                .map_err(|e| SkwError::ArchiveError(format!("tar append dir failed: {}", e)))?;
        } else {
            builder
                .append_path_with_name(full_path, rel_path)
                .map_err(|e| SkwError::ArchiveError(format!("tar append file failed: {}", e)))?;
        }

        if !metadata.is_dir() {
            files.push(rel_path.to_string_lossy().to_string());
        }
    }

    Ok(files)
}

/// Extract a package archive into `dest_dir`, preserving symlinks and
/// permissions. Members whose normalized path escapes `dest_dir` abort the
/// extraction.
pub fn unpack(archive_path: &Path, dest_dir: &Path, format: PackageFormat) -> Result<()> {
    let file = std::fs::File::open(archive_path).map_err(|e| {
        SkwError::ArchiveError(format!("failed to open {}: {}", archive_path.display(), e))
    })?;

    match format {
        PackageFormat::Tar => unpack_entries(tar::Archive::new(file), dest_dir),
        PackageFormat::TarGz => {
            unpack_entries(tar::Archive::new(flate2::read::GzDecoder::new(file)), dest_dir)
        }
        PackageFormat::TarXz => {
            unpack_entries(tar::Archive::new(xz2::read::XzDecoder::new(file)), dest_dir)
        }
    }
}

fn unpack_entries<R: std::io::Read>(mut archive: tar::Archive<R>, dest_dir: &Path) -> Result<()> {
    archive.set_preserve_permissions(true);

    std::fs::create_dir_all(dest_dir)?;

    for entry in archive
        .entries()
        .map_err(|e| SkwError::ArchiveError(format!("failed to read archive entries: {}", e)))?
    {
        let mut entry =
            entry.map_err(|e| SkwError::ArchiveError(format!("failed to read entry: {}", e)))?;

        let path: PathBuf = entry
            .path()
            .map_err(|e| SkwError::ArchiveError(format!("failed to read entry path: {}", e)))?
            .into_owned();

        reject_escaping_path(&path)?;

        let unpacked = entry.unpack_in(dest_dir).map_err(|e| {
            SkwError::ArchiveError(format!("failed to extract {}: {}", path.display(), e))
        })?;
        if !unpacked {
            return Err(SkwError::PathEscape(path.display().to_string()));
        }
    }

    Ok(())
}

fn reject_escaping_path(path: &Path) -> Result<()> {
    let mut depth: i32 = 0;
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => {
                return Err(SkwError::PathEscape(path.display().to_string()));
            }
            Component::ParentDir => {
                depth -= 1;
                if depth < 0 {
                    return Err(SkwError::PathEscape(path.display().to_string()));
                }
            }
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage_tree(root: &Path) {
        std::fs::create_dir_all(root.join("usr/bin")).unwrap();
        std::fs::write(root.join("usr/bin/tool"), b"#!/bin/sh\n").unwrap();
        std::fs::write(root.join("usr/readme"), b"hi").unwrap();
        std::os::unix::fs::symlink("tool", root.join("usr/bin/tool-link")).unwrap();
    }

    #[test]
    fn test_pack_and_unpack_roundtrip() {
        let stage = tempfile::tempdir().unwrap();
        stage_tree(stage.path());

        let out = tempfile::tempdir().unwrap();
        let archive = out.path().join("pkg.tar.gz");
        let files = pack_dir(stage.path(), &archive, PackageFormat::TarGz).unwrap();

        assert!(files.contains(&"usr/bin/tool".to_string()));
        assert!(files.contains(&"usr/bin/tool-link".to_string()));
        assert!(!files.iter().any(|f| f == "usr/bin"));

        let dest = tempfile::tempdir().unwrap();
        unpack(&archive, dest.path(), PackageFormat::TarGz).unwrap();
        assert!(dest.path().join("usr/bin/tool").exists());
        assert!(dest.path().join("usr/bin/tool-link").symlink_metadata().unwrap().is_symlink());
    }

    #[test]
    fn test_pack_member_list_is_sorted() {
        let stage = tempfile::tempdir().unwrap();
        stage_tree(stage.path());

        let out = tempfile::tempdir().unwrap();
        let archive = out.path().join("pkg.tar");
        let files = pack_dir(stage.path(), &archive, PackageFormat::Tar).unwrap();

        let mut sorted = files.clone();
        sorted.sort();
        assert_eq!(files, sorted);
    }

    #[test]
    fn test_reject_parent_dir_escape() {
        assert!(matches!(
            reject_escaping_path(Path::new("../evil")),
            Err(SkwError::PathEscape(_))
        ));
        assert!(matches!(
            reject_escaping_path(Path::new("a/../../evil")),
            Err(SkwError::PathEscape(_))
        ));
        assert!(reject_escaping_path(Path::new("a/../b")).is_ok());
    }

    #[test]
    fn test_format_from_name() {
        assert_eq!(PackageFormat::from_name("tar.xz"), Some(PackageFormat::TarXz));
        assert_eq!(PackageFormat::from_name("zip"), None);
    }
}
