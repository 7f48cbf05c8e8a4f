pub mod config;
pub mod package;
pub mod repo;
pub mod runner;

use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::config::BuilderConfig;
use crate::error::{Result, SkwError};
use crate::plan::{BuildEntry, BuildPlan};
use crate::util::archive;
use crate::util::substitute::{context_variables, substitute};
use self::config::{ExecMode, ExecuterConfig};
use self::package::PackageMeta;

pub struct ExecuteOptions {
    /// Skip the interactive prompt before installing into `/` (`--yes`).
    pub auto_confirm: bool,
}

/// Per-script lifecycle. Every state may transition to `Failed`, which
/// halts the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScriptState {
    Pending,
    CacheHit,
    Building,
    Packaging,
    Skipped,
    Installing,
    Publishing,
    Done,
    Failed,
}

/// Run the executer stage over every script of the plan, in plan order
/// (identical to script filename order by construction).
pub fn run(builder: &BuilderConfig, book: &str, profile: &str, opts: ExecuteOptions) -> Result<()> {
    let profile_dir = builder.profile_dir(book, profile);
    let cfg = ExecuterConfig::load(&profile_dir.join("executer.toml"))?;

    let parser_cfg = super::parser::config::ParserConfig::load(&profile_dir.join("parser.toml"))?;
    let base_vars = context_variables(book, profile, &builder.build_dir.to_string_lossy());
    let plan_path = builder
        .parser_out_dir(book, profile)
        .join(substitute(&parser_cfg.main.output_file, &base_vars));
    let plan = BuildPlan::load(&plan_path)?;

    let executer = Executer {
        builder,
        book,
        profile,
        cfg,
        opts,
        scripts_dir: builder.scripts_dir(book, profile),
        exec_dir: builder.executer_dir(book, profile),
    };

    runner::install_cancel_handler();

    for (index, entry) in plan.entries.iter().enumerate() {
        if runner::cancelled() {
            warn!("cancellation requested, stopping before {}", entry.script_name(index));
            break;
        }
        let script = entry.script_name(index);
        let mut state = ScriptState::Pending;
        if let Err(e) = executer.process_entry(index, entry, &mut state) {
            executer.transition(&script, &mut state, ScriptState::Failed);
            return Err(e);
        }
    }

    Ok(())
}

struct Executer<'a> {
    builder: &'a BuilderConfig,
    book: &'a str,
    profile: &'a str,
    cfg: ExecuterConfig,
    opts: ExecuteOptions,
    scripts_dir: PathBuf,
    exec_dir: PathBuf,
}

impl Executer<'_> {
    fn process_entry(
        &self,
        index: usize,
        entry: &BuildEntry,
        state: &mut ScriptState,
    ) -> Result<()> {
        let script_name = entry.script_name(index);

        let script_path = self.scripts_dir.join(&script_name);
        if !script_path.exists() {
            return Err(SkwError::ConfigInvalid(format!(
                "script {} not found; run the script stage first",
                script_path.display()
            )));
        }

        let pkg_file = self.cfg.package_file_name(self.book, self.profile, entry);
        let mode = self.cfg.exec_mode(entry)?;
        let timeout = self.cfg.main.http_timeout;

        if let Some(hit) = repo::probe(&self.cfg.main.download_repos, &pkg_file, timeout) {
            self.transition(&script_name, state, ScriptState::CacheHit);
            let downloads = self.exec_dir.join("downloads");
            let (archive_path, meta_path) = repo::fetch(hit, &pkg_file, &downloads, timeout)?;
            let meta = PackageMeta::load(&meta_path)?;

            self.transition(&script_name, state, ScriptState::Installing);
            self.install(entry, &archive_path, Some(&meta), mode)?;
            self.transition(&script_name, state, ScriptState::Done);
            return Ok(());
        }

        self.transition(&script_name, state, ScriptState::Building);

        let work_dir = self.exec_dir.join("work").join(entry.slug());
        let (destdir_env, stage_dir) = self.staging_dirs(entry, mode);
        for dir in [&work_dir, &stage_dir] {
            if dir.exists() {
                std::fs::remove_dir_all(dir).ok();
            }
            std::fs::create_dir_all(dir)?;
        }

        let log_path = self.exec_dir.join("logs").join(format!("{}.log", script_name));
        let code = runner::run_script(&runner::ScriptJob {
            script_path: &script_path,
            mode,
            work_dir: &work_dir,
            destdir: &destdir_env,
            chroot_dir: &self.cfg.main.chroot_dir,
            log_path: &log_path,
        })?;
        if code != 0 {
            return Err(SkwError::ScriptFailed {
                script: script_name,
                code,
                log: log_path,
            });
        }

        if !self.cfg.is_packaged(entry) {
            self.transition(&script_name, state, ScriptState::Skipped);
            self.transition(&script_name, state, ScriptState::Done);
            return Ok(());
        }

        if entry.package_name.is_empty() {
            return Err(SkwError::PlanInvalid(format!(
                "entry ({}, {}) is marked for packaging but has no package_name",
                entry.chapter_id, entry.section_id
            )));
        }

        self.transition(&script_name, state, ScriptState::Packaging);
        let (archive_path, meta_path) = package::create(
            entry,
            self.book,
            self.profile,
            &stage_dir,
            &self.builder.package_dir,
            &pkg_file,
            self.cfg.package_format(),
        )?;

        self.transition(&script_name, state, ScriptState::Installing);
        self.install(entry, &archive_path, None, mode)?;

        if let Some(upload) = &self.cfg.main.upload_repo {
            self.transition(&script_name, state, ScriptState::Publishing);
            repo::publish(upload, &archive_path, &meta_path)?;
        }

        self.transition(&script_name, state, ScriptState::Done);
        Ok(())
    }

    /// (DESTDIR as the script sees it, staging dir as the host sees it).
    /// In chroot mode the staging tree must live inside the chroot to be
    /// reachable by the script.
    fn staging_dirs(&self, entry: &BuildEntry, mode: ExecMode) -> (PathBuf, PathBuf) {
        match mode {
            ExecMode::Host => {
                let stage = self.exec_dir.join("stage").join(entry.slug());
                (stage.clone(), stage)
            }
            ExecMode::Chroot => {
                let inside = Path::new("/tmp/stage").join(entry.slug());
                let host = self
                    .cfg
                    .main
                    .chroot_dir
                    .join("tmp/stage")
                    .join(entry.slug());
                (inside, host)
            }
        }
    }

    /// Extract a package archive into its resolved target. Cached archives
    /// carry metadata and are re-verified first.
    fn install(
        &self,
        entry: &BuildEntry,
        archive_path: &Path,
        meta: Option<&PackageMeta>,
        mode: ExecMode,
    ) -> Result<()> {
        let target = self.extract_target(entry, mode);

        if target == Path::new("/")
            && self.cfg.main.require_confirm_root
            && !self.opts.auto_confirm
            && !confirm_root_install(entry)?
        {
            return Err(SkwError::InstallDeclined);
        }

        if let Some(meta) = meta {
            package::verify(archive_path, meta)?;
        }

        info!("installing {} into {}", archive_path.display(), target.display());
        archive::unpack(archive_path, &target, self.cfg.package_format())
    }

    fn extract_target(&self, entry: &BuildEntry, mode: ExecMode) -> PathBuf {
        let override_target = self.cfg.extract.targets.lookup(entry);
        match mode {
            ExecMode::Chroot => match override_target {
                // Overrides are chroot-relative.
                Some(t) => {
                    let rel = t.strip_prefix("/").unwrap_or(t);
                    self.cfg.main.chroot_dir.join(rel)
                }
                None => self.cfg.main.chroot_dir.clone(),
            },
            ExecMode::Host => override_target
                .cloned()
                .unwrap_or_else(|| self.cfg.main.default_extract_dir.clone()),
        }
    }

    fn transition(&self, script: &str, state: &mut ScriptState, next: ScriptState) {
        debug!("{}: {:?} -> {:?}", script, state, next);
        *state = next;
    }
}

/// The one interactive point of the pipeline: installing into the live
/// root requires an explicit yes.
fn confirm_root_install(entry: &BuildEntry) -> Result<bool> {
    eprint!(
        "install target for ({}, {}) is /, continue? [y/N] ",
        entry.chapter_id, entry.section_id
    );
    std::io::stderr().flush()?;

    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    let answer = answer.trim().to_lowercase();
    Ok(answer == "y" || answer == "yes")
}
