//! PID namespace isolation.
//!
//! Gives the next spawned child its own process ID space, where it sees
//! itself as PID 1.

use crate::error::{IsolationError, Result};

/// Creates a new PID namespace for the calling process.
///
/// The caller itself stays in its original namespace; the namespace takes
/// effect for children, so the very next `fork(2)` child becomes PID 1
/// inside it. Call this immediately before spawning the confined command.
///
/// # Errors
///
/// Returns [`IsolationError::PidNamespace`] if `unshare(CLONE_NEWPID)`
/// fails, typically with `EPERM` when the caller lacks `CAP_SYS_ADMIN`.
#[cfg(target_os = "linux")]
pub fn create_pid_namespace() -> Result<()> {
    use nix::sched::{CloneFlags, unshare};

    unshare(CloneFlags::CLONE_NEWPID).map_err(|source| IsolationError::PidNamespace { source })?;
    tracing::debug!("PID namespace created");
    Ok(())
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns [`IsolationError::Unsupported`].
#[cfg(not(target_os = "linux"))]
pub fn create_pid_namespace() -> Result<()> {
    Err(IsolationError::Unsupported {
        operation: "PID namespace creation",
    })
}
