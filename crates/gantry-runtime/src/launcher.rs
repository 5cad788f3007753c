//! Isolated command launch.
//!
//! Stages the image into a fresh root, unshares the PID namespace, and
//! spawns the command chrooted into the staged tree with stdio passed
//! through untouched. The parent waits for the child and translates
//! its wait status into an exit code.

use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::Path;
use std::process::Command;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::time::Duration;

use gantry_common::config::RunnerConfig;
use gantry_core::namespace::create_pid_namespace;
use gantry_core::rootfs::RootDir;

use crate::error::{LaunchError, SpawnError};
use crate::stage::{self, StagedRoot};

/// How long a signalled child gets to exit before SIGKILL.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Outcome of a completed command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionResult {
    /// The child's exit code; signal death maps to `128 + signo`.
    pub exit_code: i32,
}

/// Pid of the child currently being supervised, 0 when none.
static ACTIVE_CHILD: AtomicI32 = AtomicI32::new(0);
/// Set when a shutdown signal has been observed.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);
static HANDLER: OnceLock<()> = OnceLock::new();

/// Runs `command` with `args` inside an ephemeral copy of `image_root`,
/// confined by `chroot(2)` and a fresh PID namespace, and waits for it.
///
/// The staged copy is removed on every exit path. Stdin, stdout, and
/// stderr are inherited unmodified, so the child's output reaches the
/// caller's streams byte for byte.
///
/// # Errors
///
/// Returns [`LaunchError`] naming the first failing step: staging,
/// signal handler installation, namespace creation, spawn, or wait.
pub fn launch(
    command: &str,
    args: &[String],
    image_root: &Path,
    config: &RunnerConfig,
) -> Result<ExecutionResult, LaunchError> {
    install_shutdown_handler()?;

    let staged = StagedRoot::create(&config.staging_dir)?;
    stage::stage(image_root, staged.path())?;
    tracing::debug!(path = %staged.path().display(), "root staged");

    if INTERRUPTED.load(Ordering::SeqCst) {
        return Err(LaunchError::Interrupted);
    }

    let root = RootDir::new(staged.path())?;
    create_pid_namespace()?;

    let mut child = spawn_confined(command, args, root)?;
    #[allow(clippy::cast_possible_wrap)]
    ACTIVE_CHILD.store(child.id() as i32, Ordering::SeqCst);
    tracing::info!(pid = child.id(), command, "command started as pid 1");

    let waited = child
        .wait()
        .map_err(|source| LaunchError::Wait { source });
    ACTIVE_CHILD.store(0, Ordering::SeqCst);
    let status = waited?;

    let exit_code = exit_code_from(status);
    tracing::info!(exit_code, "command exited");
    Ok(ExecutionResult { exit_code })
}

fn spawn_confined(
    command: &str,
    args: &[String],
    root: RootDir,
) -> Result<std::process::Child, SpawnError> {
    let mut cmd = Command::new(command);
    let _ = cmd.args(args);
    // SAFETY: the hook runs between fork and exec, where only
    // async-signal-safe calls are permitted. RootDir::enter only issues
    // chroot(2) and chdir(2) on C strings built before the fork.
    unsafe {
        let _ = cmd.pre_exec(move || root.enter());
    }
    cmd.spawn().map_err(|e| classify_spawn(command, e))
}

fn classify_spawn(command: &str, source: std::io::Error) -> SpawnError {
    match source.kind() {
        std::io::ErrorKind::NotFound => SpawnError::CommandNotFound {
            command: command.to_string(),
        },
        std::io::ErrorKind::PermissionDenied => SpawnError::PermissionDenied {
            command: command.to_string(),
        },
        _ => SpawnError::Io {
            command: command.to_string(),
            source,
        },
    }
}

/// Maps a wait status to an exit code: the child's own code, or
/// `128 + signo` when a signal terminated it.
#[must_use]
pub fn exit_code_from(status: std::process::ExitStatus) -> i32 {
    status
        .code()
        .unwrap_or_else(|| 128 + status.signal().unwrap_or(0))
}

/// Installs the process-wide shutdown handler once.
///
/// On SIGINT or SIGTERM the handler forwards SIGTERM to the active
/// child and escalates to SIGKILL after a grace period, so the staged
/// root still gets torn down by the waiting parent.
fn install_shutdown_handler() -> Result<(), LaunchError> {
    if HANDLER.get().is_some() {
        return Ok(());
    }
    ctrlc::set_handler(forward_shutdown).map_err(|source| LaunchError::Signals { source })?;
    let _ = HANDLER.set(());
    Ok(())
}

fn forward_shutdown() {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    INTERRUPTED.store(true, Ordering::SeqCst);
    let pid = ACTIVE_CHILD.load(Ordering::SeqCst);
    if pid <= 0 {
        return;
    }

    let child = Pid::from_raw(pid);
    if kill(child, Signal::SIGTERM).is_ok() {
        tracing::info!(pid, "sent SIGTERM");
        std::thread::sleep(SHUTDOWN_GRACE);

        if kill(child, None).is_ok() {
            let _ = kill(child, Signal::SIGKILL);
            tracing::info!(pid, "sent SIGKILL");
        }
    }
}
