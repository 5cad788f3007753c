//! Image cache.
//!
//! Extracted images live under one root, keyed by image reference. A pull
//! extracts into a scratch sibling and publishes it with a single rename,
//! so a partially extracted tree is never visible under the published
//! path. Concurrent invocations pulling the same repository serialize on
//! an exclusive advisory lock file.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use gantry_common::types::ImageReference;
use nix::fcntl::{Flock, FlockArg};

use crate::client::RegistryClient;
use crate::error::PullError;
use crate::extract;
use crate::manifest::{LayerDescriptor, Manifest};

/// Cache of materialized images under a single root directory.
#[derive(Debug)]
pub struct ImageCache {
    root: PathBuf,
}

impl ImageCache {
    /// Opens the cache, creating the root directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`PullError::Cache`] if the root cannot be created.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, PullError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| cache_io(&root, e))?;
        tracing::debug!(path = %root.display(), "image cache open");
        Ok(Self { root })
    }

    /// Returns the cache root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the published path for an image, whether or not it exists.
    #[must_use]
    pub fn image_path(&self, image: &ImageReference) -> PathBuf {
        self.root.join(image.cache_key())
    }

    /// Returns whether the image is already materialized.
    #[must_use]
    pub fn is_cached(&self, image: &ImageReference) -> bool {
        self.image_path(image).is_dir()
    }

    /// Ensures the image is materialized and returns its published path.
    ///
    /// Pulls authenticate, resolve the manifest, then fetch and apply every
    /// layer in manifest order. An image already published is returned
    /// without touching the network. With `prefetch_layers`, blobs download
    /// concurrently into spool files while application still proceeds
    /// strictly in manifest order.
    ///
    /// # Errors
    ///
    /// Returns the first failing pipeline step as a [`PullError`].
    pub fn materialize(
        &self,
        client: &mut RegistryClient,
        image: &ImageReference,
        prefetch_layers: bool,
    ) -> Result<PathBuf, PullError> {
        let published = self.image_path(image);
        if published.is_dir() {
            tracing::debug!(image = %image, "image already cached");
            return Ok(published);
        }

        let _lock = self.lock_repository(image)?;
        // Another invocation may have published while this one waited.
        if published.is_dir() {
            tracing::debug!(image = %image, "image published while waiting for lock");
            return Ok(published);
        }

        let repository = image.repository();
        client.authenticate(&repository)?;
        let manifest = client.resolve_manifest(image)?;
        tracing::info!(
            image = %image,
            layers = manifest.layers.len(),
            platform = %client.platform(),
            "pulling image"
        );

        let scratch = ScratchDir::create(self.scratch_path(".tmp", image))?;
        if prefetch_layers {
            self.apply_layers_prefetched(client, image, &manifest, scratch.path())?;
        } else {
            apply_layers_streaming(client, image, &manifest, scratch.path())?;
        }

        fs::rename(scratch.path(), &published).map_err(|e| cache_io(&published, e))?;
        scratch.disarm();
        tracing::info!(image = %image, path = %published.display(), "image materialized");
        Ok(published)
    }

    /// Takes the per-repository advisory lock, blocking until it is free.
    fn lock_repository(&self, image: &ImageReference) -> Result<Flock<File>, PullError> {
        let lock_path = self.root.join(format!("{}.lock", image.cache_key()));
        let file = File::create(&lock_path).map_err(|e| cache_io(&lock_path, e))?;
        tracing::debug!(path = %lock_path.display(), "acquiring repository lock");
        Flock::lock(file, FlockArg::LockExclusive)
            .map_err(|(_, errno)| cache_io(&lock_path, errno.into()))
    }

    fn scratch_path(&self, prefix: &str, image: &ImageReference) -> PathBuf {
        self.root
            .join(format!("{prefix}-{}-{}", std::process::id(), image.cache_key()))
    }

    /// Downloads all blobs concurrently into digest-named spool files,
    /// then applies them in manifest order.
    fn apply_layers_prefetched(
        &self,
        client: &RegistryClient,
        image: &ImageReference,
        manifest: &Manifest,
        dest: &Path,
    ) -> Result<(), PullError> {
        let spool = ScratchDir::create(self.scratch_path(".spool", image))?;
        let spool_path = spool.path();

        std::thread::scope(|scope| {
            let mut downloads = Vec::with_capacity(manifest.layers.len());
            for layer in &manifest.layers {
                let path = spool_path.join(layer.digest.path_component());
                downloads.push((
                    layer,
                    scope.spawn(move || spool_layer(client, image, layer, &path)),
                ));
            }

            for (layer, handle) in downloads {
                let spooled = handle.join().map_err(|_| PullError::Cache {
                    path: spool_path.to_path_buf(),
                    source: io::Error::other("layer download thread panicked"),
                })??;
                let file = File::open(&spooled).map_err(|e| cache_io(&spooled, e))?;
                let summary = extract::apply_layer(file, dest).map_err(|source| {
                    PullError::Extract {
                        digest: layer.digest.clone(),
                        source,
                    }
                })?;
                tracing::debug!(
                    digest = %layer.digest,
                    files = summary.files,
                    whiteouts = summary.whiteouts,
                    "layer applied"
                );
            }
            Ok(())
        })
    }
}

/// Fetches and applies each layer as one streamed pass.
fn apply_layers_streaming(
    client: &RegistryClient,
    image: &ImageReference,
    manifest: &Manifest,
    dest: &Path,
) -> Result<(), PullError> {
    for layer in &manifest.layers {
        let stream = client.fetch_layer(image, layer)?;
        let summary =
            extract::apply_layer(stream, dest).map_err(|source| PullError::Extract {
                digest: layer.digest.clone(),
                source,
            })?;
        tracing::debug!(
            digest = %layer.digest,
            files = summary.files,
            whiteouts = summary.whiteouts,
            "layer applied"
        );
    }
    Ok(())
}

/// Downloads one blob into its spool file.
fn spool_layer(
    client: &RegistryClient,
    image: &ImageReference,
    layer: &LayerDescriptor,
    path: &Path,
) -> Result<PathBuf, PullError> {
    let mut stream = client.fetch_layer(image, layer)?;
    let mut file = File::create(path).map_err(|e| cache_io(path, e))?;
    let _ = io::copy(&mut stream, &mut file).map_err(|e| cache_io(path, e))?;
    Ok(path.to_path_buf())
}

fn cache_io(path: &Path, source: io::Error) -> PullError {
    PullError::Cache {
        path: path.to_path_buf(),
        source,
    }
}

/// A directory removed on drop unless disarmed, so failed pulls leave no
/// debris behind.
#[derive(Debug)]
struct ScratchDir {
    path: PathBuf,
    armed: bool,
}

impl ScratchDir {
    fn create(path: PathBuf) -> Result<Self, PullError> {
        // A leftover tree from a crashed run with a recycled pid.
        if path.exists() {
            fs::remove_dir_all(&path).map_err(|e| cache_io(&path, e))?;
        }
        fs::create_dir_all(&path).map_err(|e| cache_io(&path, e))?;
        Ok(Self { path, armed: true })
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(e) = fs::remove_dir_all(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "cannot remove scratch directory"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(reference: &str) -> ImageReference {
        ImageReference::parse(reference).expect("parse failed")
    }

    #[test]
    fn open_creates_missing_root() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let root = dir.path().join("nested/cache");
        let cache = ImageCache::open(&root).expect("open failed");
        assert!(cache.root().is_dir());
    }

    #[test]
    fn image_path_uses_sanitized_key() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let cache = ImageCache::open(dir.path()).expect("open failed");
        let path = cache.image_path(&image("myorg/tool:1.0"));
        assert!(path.ends_with("myorg-tool-1.0"));
    }

    #[test]
    fn is_cached_reflects_published_directory() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let cache = ImageCache::open(dir.path()).expect("open failed");
        let alpine = image("alpine:3.19");

        assert!(!cache.is_cached(&alpine));
        fs::create_dir_all(cache.image_path(&alpine)).expect("mkdir failed");
        assert!(cache.is_cached(&alpine));
    }

    #[test]
    fn scratch_dir_removed_on_drop() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let path = dir.path().join("scratch");
        let scratch = ScratchDir::create(path.clone()).expect("create failed");
        assert!(path.is_dir());
        drop(scratch);
        assert!(!path.exists());
    }

    #[test]
    fn disarmed_scratch_dir_survives_drop() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let path = dir.path().join("scratch");
        let scratch = ScratchDir::create(path.clone()).expect("create failed");
        scratch.disarm();
        assert!(path.is_dir());
    }

    #[test]
    fn scratch_create_replaces_stale_tree() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let path = dir.path().join("scratch");
        fs::create_dir_all(path.join("stale")).expect("mkdir failed");

        let scratch = ScratchDir::create(path.clone()).expect("create failed");
        assert!(!scratch.path().join("stale").exists());
    }
}
