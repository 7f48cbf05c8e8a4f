use std::path::Path;

use skw::config::BuilderConfig;
use skw::error::SkwError;
use skw::plan::BuildPlan;
use skw::{parser, scripter};

const BOOK_XML: &str = r#"<book>
  <chapter id="ch-05">
    <sect1 id="binutils">
      <package><name>binutils</name><version>2.41</version></package>
      <altversion>2.41-alt</altversion>
      <address url="https://example.org/binutils-2.41.tar.xz" sha="aaa"/>
      <screen><userinput>mkdir -p "$DESTDIR/usr/bin"</userinput></screen>
      <screen><userinput>echo binutils &gt; "$DESTDIR/usr/bin/ld"</userinput></screen>
    </sect1>
    <sect1 id="ch-05-test">
      <package><name>test-suite</name><version>1.0</version></package>
      <screen><userinput>make check</userinput></screen>
    </sect1>
    <sect1 id="gcc">
      <package><name>gcc</name><version>13.2</version></package>
      <deps>binutils</deps>
      <screen><userinput>./configure --prefix=/usr</userinput></screen>
      <screen><userinput>make</userinput></screen>
    </sect1>
  </chapter>
</book>"#;

const PARSER_TOML: &str = r#"
[main]
xml_path = "${build_dir}/../books/${book}/index.xml"
output_file = "parser_output.json"

[xpaths]
chapters = "//chapter"
chapter_id = "./@id"
sections = "./sect1"
section_id = "./@id"
package_name = "./package/name"
package_version = "./package/version"
source_urls = "./address/@url"
source_checksums = "./address/@sha"
dependencies = "./deps"
build_instructions = "./screen/userinput"

[section_filters]
exclude = ["ch-05-test"]
"#;

const SCRIPTER_TOML: &str = r#"
[main]
default_template = "default.script"

[global.regex]
patterns = ["s|--prefix=/usr|--prefix=/usr --disable-nls|"]
"#;

const DEFAULT_TEMPLATE: &str = "#!/bin/sh\nset -e\n# {{package_name}} {{package_version}}\n{{build_instructions}}\n";

fn setup(root: &Path) -> BuilderConfig {
    let config = BuilderConfig {
        build_dir: root.join("build"),
        package_dir: root.join("packages"),
        profiles_dir: root.join("profiles"),
        skel_dir: root.join("skel"),
    };

    // xml_path resolves relative to build_dir, which must exist for the
    // `..` component to stat.
    std::fs::create_dir_all(config.build_dir.as_path()).unwrap();

    let profile = config.profile_dir("lfs", "systemd");
    std::fs::create_dir_all(&profile).unwrap();
    std::fs::write(profile.join("parser.toml"), PARSER_TOML).unwrap();
    std::fs::write(profile.join("scripter.toml"), SCRIPTER_TOML).unwrap();
    std::fs::write(profile.join("default.script"), DEFAULT_TEMPLATE).unwrap();

    let book_dir = root.join("books/lfs");
    std::fs::create_dir_all(&book_dir).unwrap();
    std::fs::write(book_dir.join("index.xml"), BOOK_XML).unwrap();

    config
}

#[test]
fn test_parse_happy_path() {
    let tmp = tempfile::tempdir().unwrap();
    let config = setup(tmp.path());

    let plan_path = parser::run(&config, "lfs", "systemd").unwrap();
    let plan = BuildPlan::load(&plan_path).unwrap();

    // The excluded test section is gone; binutils precedes its dependent.
    let names: Vec<&str> = plan.entries.iter().map(|e| e.package_name.as_str()).collect();
    assert_eq!(names, vec!["binutils", "gcc"]);

    let binutils = &plan.entries[0];
    assert_eq!(binutils.chapter_id, "ch-05");
    assert_eq!(binutils.section_id, "binutils");
    assert_eq!(binutils.package_version, "2.41");
    assert_eq!(binutils.sources.urls, vec!["https://example.org/binutils-2.41.tar.xz"]);
    assert_eq!(binutils.sources.checksums, vec!["aaa"]);
    assert_eq!(
        binutils.build_instructions,
        vec![
            "mkdir -p \"$DESTDIR/usr/bin\"",
            "echo binutils > \"$DESTDIR/usr/bin/ld\"",
        ]
    );

    let gcc = &plan.entries[1];
    assert_eq!(gcc.dependencies, vec!["binutils"]);
}

#[test]
fn test_parse_section_override_only_affects_its_section() {
    let tmp = tempfile::tempdir().unwrap();
    let config = setup(tmp.path());

    let profile = config.profile_dir("lfs", "systemd");
    let mut parser_toml = std::fs::read_to_string(profile.join("parser.toml")).unwrap();
    parser_toml.push_str("\n[binutils.xpaths]\npackage_version = \"./altversion\"\n");
    std::fs::write(profile.join("parser.toml"), parser_toml).unwrap();

    let plan_path = parser::run(&config, "lfs", "systemd").unwrap();
    let plan = BuildPlan::load(&plan_path).unwrap();

    assert_eq!(plan.entries[0].package_version, "2.41-alt");
    assert_eq!(plan.entries[1].package_version, "13.2");
}

#[test]
fn test_parse_is_deterministic() {
    let tmp = tempfile::tempdir().unwrap();
    let config = setup(tmp.path());

    let plan_path = parser::run(&config, "lfs", "systemd").unwrap();
    let first = std::fs::read(&plan_path).unwrap();
    let plan_path = parser::run(&config, "lfs", "systemd").unwrap();
    let second = std::fs::read(&plan_path).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_parse_missing_xml_is_distinct_error() {
    let tmp = tempfile::tempdir().unwrap();
    let config = setup(tmp.path());
    std::fs::remove_file(tmp.path().join("books/lfs/index.xml")).unwrap();

    let err = parser::run(&config, "lfs", "systemd").unwrap_err();
    assert!(matches!(err, SkwError::XmlMissing(_)));
}

#[test]
fn test_parse_malformed_xml_is_distinct_error() {
    let tmp = tempfile::tempdir().unwrap();
    let config = setup(tmp.path());
    std::fs::write(tmp.path().join("books/lfs/index.xml"), "<book><unclosed>").unwrap();

    let err = parser::run(&config, "lfs", "systemd").unwrap_err();
    assert!(matches!(err, SkwError::XmlMalformed(_)));
}

#[test]
fn test_script_output_names_modes_and_content() {
    use std::os::unix::fs::PermissionsExt;

    let tmp = tempfile::tempdir().unwrap();
    let config = setup(tmp.path());

    parser::run(&config, "lfs", "systemd").unwrap();
    let scripts_dir = scripter::run(&config, "lfs", "systemd").unwrap();

    let binutils = scripts_dir.join("0000_ch-05_binutils.sh");
    let gcc = scripts_dir.join("0001_ch-05_gcc.sh");
    assert!(binutils.exists());
    assert!(gcc.exists());

    let mode = std::fs::metadata(&gcc).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o755);

    let content = std::fs::read_to_string(&gcc).unwrap();
    assert!(content.starts_with("#!/bin/sh\n"));
    assert!(content.contains("# gcc 13.2\n"));
    // The global rewrite rule applied on top of the expanded template.
    assert!(content.contains("./configure --prefix=/usr --disable-nls\n"));
    assert!(content.contains("\nmake\n"));
}

#[test]
fn test_script_is_deterministic() {
    let tmp = tempfile::tempdir().unwrap();
    let config = setup(tmp.path());

    parser::run(&config, "lfs", "systemd").unwrap();
    let scripts_dir = scripter::run(&config, "lfs", "systemd").unwrap();
    let first = std::fs::read(scripts_dir.join("0000_ch-05_binutils.sh")).unwrap();
    let scripts_dir = scripter::run(&config, "lfs", "systemd").unwrap();
    let second = std::fs::read(scripts_dir.join("0000_ch-05_binutils.sh")).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_script_template_hierarchy_and_missing_template_fallback() {
    let tmp = tempfile::tempdir().unwrap();
    let config = setup(tmp.path());

    let profile = config.profile_dir("lfs", "systemd");
    std::fs::write(
        profile.join("scripter.toml"),
        r#"
[main]
default_template = "default.script"

[gcc]
template = "gcc.script"

[binutils]
template = "missing.script"
"#,
    )
    .unwrap();
    std::fs::write(profile.join("gcc.script"), "#!/bin/sh\n# custom {{package_name}}\n").unwrap();

    parser::run(&config, "lfs", "systemd").unwrap();
    let scripts_dir = scripter::run(&config, "lfs", "systemd").unwrap();

    let gcc = std::fs::read_to_string(scripts_dir.join("0001_ch-05_gcc.sh")).unwrap();
    assert_eq!(gcc, "#!/bin/sh\n# custom gcc\n");

    // Missing override falls back to the preloaded default, non-fatally.
    let binutils = std::fs::read_to_string(scripts_dir.join("0000_ch-05_binutils.sh")).unwrap();
    assert!(binutils.contains("# binutils 2.41\n"));
}

#[test]
fn test_missing_default_template_is_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    let config = setup(tmp.path());

    parser::run(&config, "lfs", "systemd").unwrap();
    std::fs::remove_file(config.profile_dir("lfs", "systemd").join("default.script")).unwrap();

    let err = scripter::run(&config, "lfs", "systemd").unwrap_err();
    assert!(matches!(err, SkwError::ConfigMissing(_)));
}

#[test]
fn test_cycle_resolved_by_ordered_build_group() {
    let tmp = tempfile::tempdir().unwrap();
    let config = setup(tmp.path());

    let profile = config.profile_dir("lfs", "systemd");
    let mut parser_toml = std::fs::read_to_string(profile.join("parser.toml")).unwrap();
    parser_toml.push_str(
        r#"
[custom_code]
configs = ["custom-packages.toml"]

[[ordered_build_groups]]
packages = ["gcc-pass1", "glibc", "gcc-pass2"]
"#,
    );
    std::fs::write(profile.join("parser.toml"), parser_toml).unwrap();
    std::fs::write(
        profile.join("custom-packages.toml"),
        r#"
[[custom_packages]]
name = "gcc-pass1"
version = "13.2"
chapter_id = "ch-06"
section_id = "gcc-pass1"
commands = ["echo pass1"]

[[custom_packages]]
name = "glibc"
version = "2.38"
chapter_id = "ch-06"
section_id = "glibc"
dependencies = ["gcc-pass2"]
commands = ["echo glibc"]

[[custom_packages]]
name = "gcc-pass2"
version = "13.2"
chapter_id = "ch-06"
section_id = "gcc-pass2"
dependencies = ["glibc"]
commands = ["echo pass2"]
"#,
    )
    .unwrap();

    let plan_path = parser::run(&config, "lfs", "systemd").unwrap();
    let plan = BuildPlan::load(&plan_path).unwrap();
    let names: Vec<&str> = plan.entries.iter().map(|e| e.package_name.as_str()).collect();

    let pass1 = names.iter().position(|n| *n == "gcc-pass1").unwrap();
    let glibc = names.iter().position(|n| *n == "glibc").unwrap();
    let pass2 = names.iter().position(|n| *n == "gcc-pass2").unwrap();
    assert!(pass1 < glibc && glibc < pass2);
}

#[test]
fn test_unresolved_cycle_names_both_packages() {
    let tmp = tempfile::tempdir().unwrap();
    let config = setup(tmp.path());

    let profile = config.profile_dir("lfs", "systemd");
    let mut parser_toml = std::fs::read_to_string(profile.join("parser.toml")).unwrap();
    parser_toml.push_str(
        r#"
[custom_code]
configs = ["custom-packages.toml"]
"#,
    );
    std::fs::write(profile.join("parser.toml"), parser_toml).unwrap();
    std::fs::write(
        profile.join("custom-packages.toml"),
        r#"
[[custom_packages]]
name = "glibc"
version = "2.38"
chapter_id = "ch-06"
section_id = "glibc"
dependencies = ["gcc2"]

[[custom_packages]]
name = "gcc2"
version = "13.2"
chapter_id = "ch-06"
section_id = "gcc2"
dependencies = ["glibc"]
"#,
    )
    .unwrap();

    let err = parser::run(&config, "lfs", "systemd").unwrap_err();
    match err {
        SkwError::UnhandledCycle(members) => {
            assert_eq!(members, vec!["gcc2".to_string(), "glibc".to_string()]);
        }
        other => panic!("expected UnhandledCycle, got {:?}", other),
    }
}
