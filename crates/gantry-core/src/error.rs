//! Error types for the isolation primitives.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while setting up process isolation.
#[derive(Debug, Error)]
pub enum IsolationError {
    /// `unshare(CLONE_NEWPID)` was rejected by the kernel.
    #[error("cannot create PID namespace: {source}")]
    PidNamespace {
        /// Errno reported by the kernel, typically `EPERM` without
        /// sufficient privileges.
        source: nix::errno::Errno,
    },

    /// The directory cannot serve as a process root.
    #[error("cannot use {path} as a root directory: {message}")]
    EnterRoot {
        /// The rejected root path.
        path: PathBuf,
        /// Why it was rejected.
        message: String,
    },

    /// The requested isolation is not available on this platform.
    #[error("{operation} is only supported on Linux")]
    Unsupported {
        /// Operation that was attempted.
        operation: &'static str,
    },
}

/// Convenience alias for fallible operations in this crate.
pub type Result<T> = std::result::Result<T, IsolationError>;
