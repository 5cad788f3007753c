//! Layer extraction.
//!
//! A layer blob is a gzip-compressed tar archive. It is applied to the
//! destination entry by entry in stream order: directories, regular files,
//! and symlinks materialize; whiteout markers remove lower-layer paths;
//! every other entry type is skipped. Applying layers in manifest order
//! yields last-writer-wins composition.

use std::fs::{self, File};
use std::io::{self, Read};
use std::os::unix::fs::PermissionsExt;
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tar::{Archive, Entry, EntryType};

use crate::error::ExtractError;

/// Marker prefix: `.wh.<name>` deletes `<name>` from lower layers.
const WHITEOUT_PREFIX: &str = ".wh.";

/// Marker name: clears the containing directory's lower-layer contents.
const OPAQUE_WHITEOUT: &str = ".wh..wh..opq";

/// What one layer application did to the destination.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LayerSummary {
    /// Regular files written.
    pub files: u64,
    /// Directories created or updated.
    pub directories: u64,
    /// Symlinks recreated.
    pub symlinks: u64,
    /// Whiteout markers applied.
    pub whiteouts: u64,
    /// Entries skipped (unsupported types, unsafe paths).
    pub skipped: u64,
}

/// Applies one gzip tar layer stream onto `dest`.
///
/// `dest` must already exist. A failed application leaves `dest` partially
/// populated; callers that need all-or-nothing behavior stage into a
/// scratch directory and publish by rename.
///
/// # Errors
///
/// Returns [`ExtractError::Corrupt`] for any decode or framing failure,
/// including a stream that ends before the archive terminator, and
/// [`ExtractError::Io`] when writing an entry to `dest` fails.
pub fn apply_layer<R: Read>(stream: R, dest: &Path) -> Result<LayerSummary, ExtractError> {
    let mut archive = Archive::new(GzDecoder::new(stream));
    let mut summary = LayerSummary::default();

    let entries = archive
        .entries()
        .map_err(|source| ExtractError::Corrupt { source })?;
    for entry in entries {
        // Framing errors always propagate; a truncated stream is corrupt,
        // not complete.
        let mut entry = entry.map_err(|source| ExtractError::Corrupt { source })?;
        apply_entry(&mut entry, dest, &mut summary)?;
    }
    Ok(summary)
}

fn apply_entry<R: Read>(
    entry: &mut Entry<'_, R>,
    dest: &Path,
    summary: &mut LayerSummary,
) -> Result<(), ExtractError> {
    let raw_path = entry
        .path()
        .map_err(|source| ExtractError::Corrupt { source })?
        .into_owned();
    let Some(rel) = sanitize_entry_path(&raw_path) else {
        tracing::warn!(path = %raw_path.display(), "skipping entry that escapes the destination");
        summary.skipped += 1;
        return Ok(());
    };
    if rel.as_os_str().is_empty() {
        // The archive's own `./` root entry; nothing to materialize.
        return Ok(());
    }

    if let Some(name) = rel.file_name().and_then(|n| n.to_str()) {
        let parent = rel.parent().unwrap_or_else(|| Path::new(""));
        if name == OPAQUE_WHITEOUT {
            clear_directory(&dest.join(parent))?;
            summary.whiteouts += 1;
            return Ok(());
        }
        if let Some(victim) = name.strip_prefix(WHITEOUT_PREFIX) {
            if victim.is_empty() {
                summary.skipped += 1;
            } else {
                remove_path(&dest.join(parent).join(victim))?;
                summary.whiteouts += 1;
            }
            return Ok(());
        }
    }

    let target = dest.join(&rel);
    let kind = entry.header().entry_type();
    if kind.is_dir() {
        write_directory(entry, &target)?;
        summary.directories += 1;
    } else if kind.is_symlink() {
        write_symlink(entry, &target)?;
        summary.symlinks += 1;
    } else if kind.is_file() {
        write_file(entry, &target)?;
        summary.files += 1;
    } else {
        // Hard links, devices, and fifos are outside the composition model.
        summary.skipped += 1;
    }
    Ok(())
}

/// Normalizes an archive path to a relative path confined to the
/// destination. Absolute paths and `..` components would escape it, so
/// entries carrying them are rejected.
fn sanitize_entry_path(raw: &Path) -> Option<PathBuf> {
    let mut clean = PathBuf::new();
    for component in raw.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(clean)
}

fn write_directory<R: Read>(entry: &Entry<'_, R>, target: &Path) -> Result<(), ExtractError> {
    // A file or link from a lower layer may occupy the path.
    if target.is_symlink() || target.is_file() {
        fs::remove_file(target).map_err(|e| entry_io(target, e))?;
    }
    fs::create_dir_all(target).map_err(|e| entry_io(target, e))?;
    set_mode(entry, target)
}

fn write_file<R: Read>(entry: &mut Entry<'_, R>, target: &Path) -> Result<(), ExtractError> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| entry_io(parent, e))?;
    }
    // Never write through a symlink left by a lower layer.
    remove_path(target)?;
    let mut file = File::create(target).map_err(|e| entry_io(target, e))?;
    let _ = io::copy(entry, &mut file).map_err(|e| classify_copy_error(target, e))?;
    set_mode(entry, target)
}

fn write_symlink<R: Read>(entry: &Entry<'_, R>, target: &Path) -> Result<(), ExtractError> {
    let link = entry
        .link_name()
        .map_err(|source| ExtractError::Corrupt { source })?
        .ok_or_else(|| ExtractError::Corrupt {
            source: io::Error::other("symlink entry without a target"),
        })?;
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| entry_io(parent, e))?;
    }
    remove_path(target)?;
    // The link target is reproduced verbatim, wherever it points.
    std::os::unix::fs::symlink(&link, target).map_err(|e| entry_io(target, e))
}

/// Removes whatever occupies `path`, directory trees included. A missing
/// path is fine.
fn remove_path(path: &Path) -> Result<(), ExtractError> {
    let result = if !path.is_symlink() && path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(entry_io(path, e)),
    }
}

/// Removes the contents of `path` without removing `path` itself.
fn clear_directory(path: &Path) -> Result<(), ExtractError> {
    let entries = match fs::read_dir(path) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(entry_io(path, e)),
    };
    for child in entries {
        let child = child.map_err(|e| entry_io(path, e))?;
        remove_path(&child.path())?;
    }
    Ok(())
}

fn set_mode<R: Read>(entry: &Entry<'_, R>, target: &Path) -> Result<(), ExtractError> {
    let mode = entry
        .header()
        .mode()
        .map_err(|source| ExtractError::Corrupt { source })?;
    fs::set_permissions(target, fs::Permissions::from_mode(mode & 0o7777))
        .map_err(|e| entry_io(target, e))
}

fn entry_io(path: &Path, source: io::Error) -> ExtractError {
    ExtractError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// `io::copy` interleaves decoder reads with destination writes; the error
/// kind tells which side gave out.
fn classify_copy_error(target: &Path, source: io::Error) -> ExtractError {
    match source.kind() {
        io::ErrorKind::UnexpectedEof | io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData => {
            ExtractError::Corrupt { source }
        }
        _ => entry_io(target, source),
    }
}
