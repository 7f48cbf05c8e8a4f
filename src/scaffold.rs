use std::path::Path;

use tracing::info;

use crate::config::BuilderConfig;
use crate::error::{Result, SkwError};

fn subdirectories(dir: &Path) -> Result<Vec<String>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

pub fn list_books(builder: &BuilderConfig) -> Result<Vec<String>> {
    subdirectories(&builder.profiles_dir)
}

pub fn list_profiles(builder: &BuilderConfig, book: &str) -> Result<Vec<String>> {
    let dir = builder.book_dir(book);
    if !dir.exists() {
        return Err(SkwError::ConfigInvalid(format!("unknown book '{}'", book)));
    }
    subdirectories(&dir)
}

/// Create a book directory seeded with `book.toml` from the skeleton.
pub fn add_book(builder: &BuilderConfig, name: &str) -> Result<()> {
    let dir = builder.book_dir(name);
    if dir.exists() {
        return Err(SkwError::ConfigInvalid(format!("book '{}' already exists", name)));
    }

    let skel = builder.skel_dir.join("book.toml.skel");
    if !skel.exists() {
        return Err(SkwError::ConfigMissing(skel));
    }

    std::fs::create_dir_all(&dir)?;
    std::fs::copy(&skel, dir.join("book.toml"))?;
    info!("created book {}", dir.display());
    Ok(())
}

/// Create a profile directory seeded with every skeleton file except the
/// book-level `book.toml.skel`; a `.skel` suffix is dropped on copy.
pub fn add_profile(builder: &BuilderConfig, book: &str, name: &str) -> Result<()> {
    let book_dir = builder.book_dir(book);
    if !book_dir.exists() {
        return Err(SkwError::ConfigInvalid(format!("unknown book '{}'", book)));
    }

    let dir = builder.profile_dir(book, name);
    if dir.exists() {
        return Err(SkwError::ConfigInvalid(format!(
            "profile '{}/{}' already exists",
            book, name
        )));
    }

    if !builder.skel_dir.exists() {
        return Err(SkwError::ConfigMissing(builder.skel_dir.clone()));
    }

    std::fs::create_dir_all(&dir)?;
    for entry in std::fs::read_dir(&builder.skel_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy().into_owned();
        if file_name == "book.toml.skel" {
            continue;
        }
        let dest_name = file_name.strip_suffix(".skel").unwrap_or(&file_name);
        std::fs::copy(entry.path(), dir.join(dest_name))?;
    }
    info!("created profile {}", dir.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder(root: &Path) -> BuilderConfig {
        BuilderConfig {
            build_dir: root.join("build"),
            package_dir: root.join("packages"),
            profiles_dir: root.join("profiles"),
            skel_dir: root.join("skel"),
        }
    }

    fn seed_skel(root: &Path) {
        std::fs::create_dir_all(root.join("skel")).unwrap();
        for name in [
            "book.toml.skel",
            "parser.toml.skel",
            "scripter.toml.skel",
            "executer.toml.skel",
            "default.script",
        ] {
            std::fs::write(root.join("skel").join(name), "# skeleton\n").unwrap();
        }
    }

    #[test]
    fn test_add_and_list_books_and_profiles() {
        let tmp = tempfile::tempdir().unwrap();
        seed_skel(tmp.path());
        let cfg = builder(tmp.path());

        add_book(&cfg, "lfs").unwrap();
        assert_eq!(list_books(&cfg).unwrap(), vec!["lfs"]);
        assert!(cfg.book_dir("lfs").join("book.toml").exists());

        add_profile(&cfg, "lfs", "systemd").unwrap();
        assert_eq!(list_profiles(&cfg, "lfs").unwrap(), vec!["systemd"]);

        let profile = cfg.profile_dir("lfs", "systemd");
        assert!(profile.join("parser.toml").exists());
        assert!(profile.join("default.script").exists());
        assert!(!profile.join("book.toml").exists());
    }

    #[test]
    fn test_add_existing_book_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        seed_skel(tmp.path());
        let cfg = builder(tmp.path());

        add_book(&cfg, "lfs").unwrap();
        assert!(add_book(&cfg, "lfs").is_err());
    }
}
