use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use super::xpath::XPath;
use crate::config::load_profile_toml;
use crate::error::Result;
use crate::plan::{BuildEntry, Sources};
use crate::util::substitute::substitute;

/// A `custom-*.toml` file: synthetic build steps injected into the plan
/// alongside the entries extracted from the book.
#[derive(Debug, Deserialize)]
struct CustomPackagesFile {
    #[serde(default)]
    custom_packages: Vec<CustomPackage>,
}

#[derive(Debug, Deserialize)]
struct CustomPackage {
    name: String,
    #[serde(default)]
    version: String,
    chapter_id: String,
    section_id: String,
    #[serde(default)]
    dependencies: Vec<String>,
    /// Inline commands, emitted first.
    #[serde(default)]
    commands: Vec<String>,
    /// XPath expressions evaluated against the main book XML; each matched
    /// node contributes one command string, after the inline commands.
    #[serde(default)]
    xpath_commands: Vec<String>,
}

/// Load every configured custom-package file and produce its entries.
pub fn inject(
    config_files: &[String],
    profile_dir: &Path,
    book_root: roxmltree::Node<'_, '_>,
    book: &str,
    base_vars: &HashMap<String, String>,
) -> Result<Vec<BuildEntry>> {
    let mut entries = Vec::new();

    for file in config_files {
        let path = profile_dir.join(file);
        let parsed: CustomPackagesFile = load_profile_toml(&path)?;
        debug!(
            "loaded {} custom packages from {}",
            parsed.custom_packages.len(),
            path.display()
        );

        for custom in parsed.custom_packages {
            let mut vars = base_vars.clone();
            vars.insert("package_name".to_string(), custom.name.clone());
            vars.insert("package_version".to_string(), custom.version.clone());
            vars.insert("chapter_id".to_string(), custom.chapter_id.clone());
            vars.insert("section_id".to_string(), custom.section_id.clone());

            let mut build_instructions = custom.commands.clone();
            for expr in &custom.xpath_commands {
                let xpath = XPath::parse(&substitute(expr, &vars))?;
                build_instructions.extend(xpath.strings(book_root));
            }

            entries.push(BuildEntry {
                source_book: book.to_string(),
                chapter_id: custom.chapter_id,
                section_id: custom.section_id,
                package_name: custom.name,
                package_version: custom.version,
                sources: Sources::default(),
                dependencies: custom.dependencies,
                build_instructions,
            });
        }
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::substitute::context_variables;

    #[test]
    fn test_inject_inline_and_xpath_commands() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("custom-packages.toml"),
            r#"
[[custom_packages]]
name = "gcc-pass1"
version = "13.2"
chapter_id = "ch-05"
section_id = "gcc-pass1"
dependencies = ["binutils"]
commands = ["mkdir -v build", "cd build"]
xpath_commands = ["//sect1[@id='${package_name}']/screen/userinput"]
"#,
        )
        .unwrap();

        let xml = r#"<book><sect1 id="gcc-pass1">
            <screen><userinput>../configure --target=$LFS_TGT</userinput></screen>
            <screen><userinput>make install</userinput></screen>
        </sect1></book>"#;
        let doc = roxmltree::Document::parse(xml).unwrap();

        let vars = context_variables("lfs", "systemd", "/b");
        let entries = inject(
            &["custom-packages.toml".to_string()],
            dir.path(),
            doc.root(),
            "lfs",
            &vars,
        )
        .unwrap();

        assert_eq!(entries.len(), 1);
        let e = &entries[0];
        assert_eq!(e.package_name, "gcc-pass1");
        assert_eq!(e.dependencies, vec!["binutils"]);
        assert_eq!(
            e.build_instructions,
            vec![
                "mkdir -v build",
                "cd build",
                "../configure --target=$LFS_TGT",
                "make install",
            ]
        );
    }

    #[test]
    fn test_missing_custom_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let doc = roxmltree::Document::parse("<book/>").unwrap();
        let vars = context_variables("lfs", "systemd", "/b");
        let err = inject(
            &["custom-nope.toml".to_string()],
            dir.path(),
            doc.root(),
            "lfs",
            &vars,
        )
        .unwrap_err();
        assert_eq!(err.category(), "config-missing");
    }
}
