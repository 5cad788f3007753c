//! Ephemeral root staging.
//!
//! Every invocation runs in a private copy of the cached image, so the
//! command can scribble over its root without poisoning the cache. The
//! copy lives under the staging directory, keyed by the invoking
//! process id, and is removed when the invocation ends.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::StageError;

/// A per-invocation root directory, removed on drop.
#[derive(Debug)]
pub struct StagedRoot {
    path: PathBuf,
}

impl StagedRoot {
    /// Creates `<staging_root>/root-<pid>` for this process.
    ///
    /// A leftover tree under the same name, abandoned by an earlier
    /// process whose pid was recycled, is removed first.
    ///
    /// # Errors
    ///
    /// Returns [`StageError`] if the directory cannot be created or a
    /// stale tree cannot be removed.
    pub fn create(staging_root: &Path) -> Result<Self, StageError> {
        let path = invocation_path(staging_root, std::process::id());
        if path.exists() {
            tracing::debug!(path = %path.display(), "removing stale staged root");
            fs::remove_dir_all(&path).map_err(|e| stage_io(&path, e))?;
        }
        fs::create_dir_all(&path).map_err(|e| stage_io(&path, e))?;
        Ok(Self { path })
    }

    /// Returns the root path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagedRoot {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "staged root not removed");
        }
    }
}

/// Returns the staging path used by an invocation with the given pid.
/// Concurrent invocations are distinct processes, so their paths never
/// collide.
#[must_use]
pub fn invocation_path(staging_root: &Path, pid: u32) -> PathBuf {
    staging_root.join(format!("root-{pid}"))
}

/// Copies the image tree rooted at `source` into `dest`.
///
/// Directories and regular files keep their permission bits; symlinks
/// are recreated with their original target string, never dereferenced.
/// Irregular entries (fifos, sockets, devices) are skipped.
///
/// # Errors
///
/// Returns [`StageError`] naming the first entry that failed; staging
/// stops there.
pub fn stage(source: &Path, dest: &Path) -> Result<(), StageError> {
    fs::create_dir_all(dest).map_err(|e| stage_io(dest, e))?;
    copy_permissions(source, dest)?;
    copy_tree(source, dest)
}

fn copy_tree(source: &Path, dest: &Path) -> Result<(), StageError> {
    for entry in fs::read_dir(source).map_err(|e| stage_io(source, e))? {
        let entry = entry.map_err(|e| stage_io(source, e))?;
        let from = entry.path();
        let to = dest.join(entry.file_name());
        let kind = entry.file_type().map_err(|e| stage_io(&from, e))?;

        if kind.is_symlink() {
            let target = fs::read_link(&from).map_err(|e| stage_io(&from, e))?;
            std::os::unix::fs::symlink(&target, &to).map_err(|e| stage_io(&to, e))?;
        } else if kind.is_dir() {
            fs::create_dir(&to).map_err(|e| stage_io(&to, e))?;
            copy_permissions(&from, &to)?;
            copy_tree(&from, &to)?;
        } else if kind.is_file() {
            // fs::copy carries the permission bits along.
            let _ = fs::copy(&from, &to).map_err(|e| stage_io(&to, e))?;
        } else {
            tracing::debug!(path = %from.display(), "skipping irregular entry");
        }
    }
    Ok(())
}

fn copy_permissions(from: &Path, to: &Path) -> Result<(), StageError> {
    let metadata = fs::metadata(from).map_err(|e| stage_io(from, e))?;
    fs::set_permissions(to, metadata.permissions()).map_err(|e| stage_io(to, e))
}

fn stage_io(path: &Path, source: std::io::Error) -> StageError {
    StageError {
        path: path.to_path_buf(),
        source,
    }
}
