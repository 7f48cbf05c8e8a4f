use std::io::{Read, Write};
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use super::config::ExecMode;
use crate::error::{Result, SkwError};

static CANCELLED: AtomicBool = AtomicBool::new(false);
static CHILD_PGID: AtomicI32 = AtomicI32::new(0);

extern "C" fn handle_sigint(_: libc::c_int) {
    CANCELLED.store(true, Ordering::SeqCst);
    // Forward to the running script's process group, best-effort.
    let pgid = CHILD_PGID.load(Ordering::SeqCst);
    if pgid > 0 {
        unsafe {
            libc::kill(-pgid, libc::SIGINT);
        }
    }
}

/// Install the SIGINT handler that requests a clean stop between scripts.
pub fn install_cancel_handler() {
    let handler = handle_sigint as extern "C" fn(libc::c_int);
    unsafe {
        libc::signal(libc::SIGINT, handler as usize as libc::sighandler_t);
    }
}

pub fn cancelled() -> bool {
    CANCELLED.load(Ordering::SeqCst)
}

/// One script execution: where it runs, where it stages, where it logs.
pub struct ScriptJob<'a> {
    pub script_path: &'a Path,
    pub mode: ExecMode,
    /// Working directory (host mode); chroot mode always starts at `/`.
    pub work_dir: &'a Path,
    /// Value exported as `DESTDIR`, as seen by the script.
    pub destdir: &'a Path,
    pub chroot_dir: &'a Path,
    pub log_path: &'a Path,
}

/// Run a generated script, teeing stdout and stderr to the log file and
/// the parent console. Returns the exit code.
pub fn run_script(job: &ScriptJob) -> Result<i32> {
    let mut cmd = match job.mode {
        ExecMode::Host => {
            let mut cmd = Command::new(
                job.script_path
                    .canonicalize()
                    .unwrap_or_else(|_| job.script_path.to_path_buf()),
            );
            cmd.current_dir(job.work_dir);
            cmd
        }
        ExecMode::Chroot => {
            // The script must be visible inside the chroot; /tmp is the
            // conventional spot.
            let name = job
                .script_path
                .file_name()
                .ok_or_else(|| SkwError::ConfigInvalid("script path has no file name".to_string()))?;
            let tmp_dir = job.chroot_dir.join("tmp");
            std::fs::create_dir_all(&tmp_dir)?;
            std::fs::copy(job.script_path, tmp_dir.join(name))?;

            let inside = Path::new("/tmp").join(name);
            debug!("chroot {} exec {}", job.chroot_dir.display(), inside.display());

            let mut cmd = Command::new("/bin/sh");
            cmd.arg(inside);
            cmd.env_clear();
            cmd.env("PATH", "/usr/bin:/usr/sbin:/bin:/sbin");
            cmd.env("HOME", "/root");
            cmd.env("TERM", std::env::var("TERM").unwrap_or_else(|_| "xterm".to_string()));

            let chroot_dir = job.chroot_dir.to_path_buf();
            unsafe {
                cmd.pre_exec(move || {
                    nix::unistd::chroot(chroot_dir.as_path()).map_err(std::io::Error::other)?;
                    nix::unistd::chdir("/").map_err(std::io::Error::other)
                });
            }
            cmd
        }
    };

    cmd.env("DESTDIR", job.destdir);
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    // New process group so a cancellation can reach every descendant.
    unsafe {
        cmd.pre_exec(|| {
            libc::setpgid(0, 0);
            Ok(())
        });
    }

    info!("running {}", job.script_path.display());
    let mut child = cmd.spawn().map_err(|e| {
        SkwError::ConfigInvalid(format!(
            "failed to spawn {}: {}",
            job.script_path.display(),
            e
        ))
    })?;
    CHILD_PGID.store(child.id() as i32, Ordering::SeqCst);

    if let Some(parent) = job.log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let log = Arc::new(Mutex::new(std::fs::File::create(job.log_path)?));

    let stdout_handle = spawn_tee(child.stdout.take().unwrap(), std::io::stdout(), log.clone());
    let stderr_handle = spawn_tee(child.stderr.take().unwrap(), std::io::stderr(), log.clone());

    let status = child.wait()?;
    CHILD_PGID.store(0, Ordering::SeqCst);

    let _ = stdout_handle.join();
    let _ = stderr_handle.join();
    if let Ok(mut f) = log.lock() {
        let _ = f.flush();
    }

    Ok(status.code().unwrap_or(-1))
}

/// Copy a child stream to both the console and the shared log file.
fn spawn_tee<R, W>(
    mut source: R,
    mut console: W,
    log: Arc<Mutex<std::fs::File>>,
) -> std::thread::JoinHandle<()>
where
    R: Read + Send + 'static,
    W: Write + Send + 'static,
{
    std::thread::spawn(move || {
        let mut buffer = [0u8; 8192];
        loop {
            match source.read(&mut buffer) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    let _ = console.write_all(&buffer[..n]);
                    let _ = console.flush();
                    if let Ok(mut f) = log.lock() {
                        let _ = f.write_all(&buffer[..n]);
                    }
                }
            }
        }
    })
}
