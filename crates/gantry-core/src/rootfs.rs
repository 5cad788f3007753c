//! Root confinement via `chroot(2)`.
//!
//! The confinement call runs in the child between `fork` and `exec`, where
//! only async-signal-safe operations are allowed. [`RootDir`] therefore
//! prepares the C path string up front; [`RootDir::enter`] performs no
//! allocation.

use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use crate::error::{IsolationError, Result};

/// A directory prepared to become a child process's root.
#[derive(Debug)]
pub struct RootDir {
    path: PathBuf,
    c_path: CString,
}

impl RootDir {
    /// Prepares a directory for use as a process root.
    ///
    /// # Errors
    ///
    /// Returns [`IsolationError::EnterRoot`] if the path is not an existing
    /// directory or cannot be represented as a C string.
    pub fn new(path: &Path) -> Result<Self> {
        if !path.is_dir() {
            return Err(IsolationError::EnterRoot {
                path: path.to_path_buf(),
                message: "not an existing directory".to_string(),
            });
        }
        let c_path = CString::new(path.as_os_str().as_bytes()).map_err(|_| {
            IsolationError::EnterRoot {
                path: path.to_path_buf(),
                message: "path contains an interior NUL byte".to_string(),
            }
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            c_path,
        })
    }

    /// Returns the prepared directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Changes the calling process's root to this directory and moves its
    /// working directory to the new `/`.
    ///
    /// Safe to call between `fork` and `exec`: both syscalls take the
    /// pre-built C string and nothing here allocates. The caller needs
    /// `CAP_SYS_CHROOT` (in practice, root).
    ///
    /// # Errors
    ///
    /// Returns the errno from `chroot(2)` or `chdir(2)` as an I/O error,
    /// making this directly usable from a pre-exec hook.
    pub fn enter(&self) -> std::io::Result<()> {
        nix::unistd::chroot(self.c_path.as_c_str()).map_err(std::io::Error::from)?;
        nix::unistd::chdir(c"/").map_err(std::io::Error::from)?;
        Ok(())
    }
}
