use std::path::Path;

use skw::config::BuilderConfig;
use skw::error::SkwError;
use skw::executer::{self, ExecuteOptions};
use skw::{parser, scripter};

const BOOK_XML: &str = r#"<book>
  <chapter id="ch-01">
    <sect1 id="foo">
      <package><name>foo</name><version>1.0</version></package>
      <screen><userinput>mkdir -p "$DESTDIR/usr/share"</userinput></screen>
      <screen><userinput>echo hello &gt; "$DESTDIR/usr/share/foo.txt"</userinput></screen>
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
build_instructions = "./screen/userinput"
"#;

const SCRIPTER_TOML: &str = r#"
[main]
default_template = "default.script"
"#;

const DEFAULT_TEMPLATE: &str = "#!/bin/sh\nset -e\n{{build_instructions}}\n";

fn setup(root: &Path) -> BuilderConfig {
    let config = BuilderConfig {
        build_dir: root.join("build"),
        package_dir: root.join("packages"),
        profiles_dir: root.join("profiles"),
        skel_dir: root.join("skel"),
    };
    std::fs::create_dir_all(config.build_dir.as_path()).unwrap();

    let profile = config.profile_dir("lfs", "systemd");
    std::fs::create_dir_all(&profile).unwrap();
    std::fs::write(profile.join("parser.toml"), PARSER_TOML).unwrap();
    std::fs::write(profile.join("scripter.toml"), SCRIPTER_TOML).unwrap();
    std::fs::write(profile.join("default.script"), DEFAULT_TEMPLATE).unwrap();

    let executer_toml = format!(
        r#"
[main]
package_name_template = "{{book}}-{{profile}}-{{chapter_id}}-{{package_name}}-{{package_version}}"
package_format = "tar.xz"
default_extract_dir = "{root}/rootfs"
upload_repo = "{root}/repo"
download_repos = ["{root}/repo"]

[package]
packages = ["foo"]
"#,
        root = root.display()
    );
    std::fs::write(profile.join("executer.toml"), executer_toml).unwrap();

    let book_dir = root.join("books/lfs");
    std::fs::create_dir_all(&book_dir).unwrap();
    std::fs::write(book_dir.join("index.xml"), BOOK_XML).unwrap();

    config
}

fn execute(config: &BuilderConfig) -> skw::error::Result<()> {
    executer::run(config, "lfs", "systemd", ExecuteOptions { auto_confirm: true })
}

#[test]
fn test_build_package_install_publish() {
    let tmp = tempfile::tempdir().unwrap();
    let config = setup(tmp.path());

    parser::run(&config, "lfs", "systemd").unwrap();
    scripter::run(&config, "lfs", "systemd").unwrap();
    execute(&config).unwrap();

    let pkg = "lfs-systemd-ch-01-foo-1.0.tar.xz";

    // Archive and metadata in package_dir.
    assert!(config.package_dir.join(pkg).exists());
    let meta_path = config.package_dir.join(format!("{}.meta.json", pkg));
    let meta = skw::executer::package::PackageMeta::load(&meta_path).unwrap();
    assert_eq!(meta.package_name, "foo");
    assert_eq!(meta.book, "lfs");
    assert_eq!(meta.files, vec!["usr/share/foo.txt".to_string()]);

    // Installed into the default extract dir.
    let installed = tmp.path().join("rootfs/usr/share/foo.txt");
    assert_eq!(std::fs::read_to_string(installed).unwrap().trim(), "hello");

    // Published to the upload repo.
    assert!(tmp.path().join("repo").join(pkg).exists());
    assert!(tmp
        .path()
        .join("repo")
        .join(format!("{}.meta.json", pkg))
        .exists());

    // A log captured the script output.
    let log = config
        .executer_dir("lfs", "systemd")
        .join("logs/0000_ch-01_foo.sh.log");
    assert!(log.exists());
}

#[test]
fn test_second_run_hits_cache_and_skips_the_build() {
    let tmp = tempfile::tempdir().unwrap();
    let config = setup(tmp.path());

    parser::run(&config, "lfs", "systemd").unwrap();
    let scripts_dir = scripter::run(&config, "lfs", "systemd").unwrap();
    execute(&config).unwrap();

    // Remove the installed tree and sabotage the script: a cache hit must
    // install from the repo without ever running it.
    std::fs::remove_dir_all(tmp.path().join("rootfs")).unwrap();
    std::fs::write(scripts_dir.join("0000_ch-01_foo.sh"), "#!/bin/sh\nexit 1\n").unwrap();

    execute(&config).unwrap();
    assert!(tmp.path().join("rootfs/usr/share/foo.txt").exists());
}

#[test]
fn test_corrupt_cached_archive_fails_integrity() {
    let tmp = tempfile::tempdir().unwrap();
    let config = setup(tmp.path());

    parser::run(&config, "lfs", "systemd").unwrap();
    scripter::run(&config, "lfs", "systemd").unwrap();
    execute(&config).unwrap();

    std::fs::write(
        tmp.path().join("repo/lfs-systemd-ch-01-foo-1.0.tar.xz"),
        "corrupted",
    )
    .unwrap();

    let err = execute(&config).unwrap_err();
    assert!(matches!(err, SkwError::IntegrityError { .. }));
}

#[test]
fn test_failing_script_halts_with_script_failed() {
    let tmp = tempfile::tempdir().unwrap();
    let config = setup(tmp.path());

    parser::run(&config, "lfs", "systemd").unwrap();
    let scripts_dir = scripter::run(&config, "lfs", "systemd").unwrap();
    std::fs::write(
        scripts_dir.join("0000_ch-01_foo.sh"),
        "#!/bin/sh\necho doomed\nexit 7\n",
    )
    .unwrap();

    let err = execute(&config).unwrap_err();
    match err {
        SkwError::ScriptFailed { code, log, .. } => {
            assert_eq!(code, 7);
            assert!(std::fs::read_to_string(log).unwrap().contains("doomed"));
        }
        other => panic!("expected ScriptFailed, got {:?}", other),
    }
}

#[test]
fn test_unpackaged_entry_builds_but_produces_no_archive() {
    let tmp = tempfile::tempdir().unwrap();
    let config = setup(tmp.path());

    // Exclude foo from packaging; the script still runs.
    let profile = config.profile_dir("lfs", "systemd");
    let executer_toml = std::fs::read_to_string(profile.join("executer.toml")).unwrap();
    let executer_toml = format!("{}\n[packages.exclude]\npackages = [\"foo\"]\n", executer_toml);
    std::fs::write(profile.join("executer.toml"), executer_toml).unwrap();

    parser::run(&config, "lfs", "systemd").unwrap();
    scripter::run(&config, "lfs", "systemd").unwrap();
    execute(&config).unwrap();

    assert!(!config.package_dir.join("lfs-systemd-ch-01-foo-1.0.tar.xz").exists());
    // The staging tree was still populated by the script.
    let stage = config
        .executer_dir("lfs", "systemd")
        .join("stage/ch-01_foo/usr/share/foo.txt");
    assert!(stage.exists());
}

#[test]
fn test_upload_to_http_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let config = setup(tmp.path());

    let profile = config.profile_dir("lfs", "systemd");
    let executer_toml = std::fs::read_to_string(profile.join("executer.toml")).unwrap();
    let executer_toml = executer_toml.replace(
        &format!("upload_repo = \"{}/repo\"", tmp.path().display()),
        "upload_repo = \"https://cache.example.org/up\"",
    );
    let executer_toml = executer_toml.replace(
        &format!("download_repos = [\"{}/repo\"]", tmp.path().display()),
        "download_repos = []",
    );
    std::fs::write(profile.join("executer.toml"), executer_toml).unwrap();

    parser::run(&config, "lfs", "systemd").unwrap();
    scripter::run(&config, "lfs", "systemd").unwrap();

    let err = execute(&config).unwrap_err();
    assert!(matches!(err, SkwError::UploadRejected(_)));
}
