//! System-wide constants and default paths.

use std::path::PathBuf;

/// Registry host serving manifests and blobs.
pub const DEFAULT_REGISTRY_HOST: &str = "registry.hub.docker.com";

/// Host issuing pull tokens.
pub const DEFAULT_AUTH_HOST: &str = "auth.docker.io";

/// Service name presented when requesting a token.
pub const DEFAULT_AUTH_SERVICE: &str = "registry.docker.io";

/// Namespace for official images referenced by bare name.
pub const OFFICIAL_NAMESPACE: &str = "library";

/// Tag assumed when a reference names none.
pub const DEFAULT_TAG: &str = "latest";

/// Docker schema 2 image manifest.
pub const MEDIA_TYPE_DOCKER_MANIFEST: &str =
    "application/vnd.docker.distribution.manifest.v2+json";

/// Docker schema 2 manifest list (multi-platform index).
pub const MEDIA_TYPE_DOCKER_MANIFEST_LIST: &str =
    "application/vnd.docker.distribution.manifest.list.v2+json";

/// OCI image manifest.
pub const MEDIA_TYPE_OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";

/// OCI image index (multi-platform).
pub const MEDIA_TYPE_OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";

/// Application name used in path layout.
pub const APP_NAME: &str = "gantry";

/// Returns the base directory for all Gantry scratch data.
///
/// Everything Gantry writes is disposable, so it lives under the platform
/// temp directory rather than a system data dir.
#[must_use]
pub fn base_dir() -> PathBuf {
    std::env::temp_dir().join(APP_NAME)
}

/// Returns the default image cache directory.
#[must_use]
pub fn default_image_dir() -> PathBuf {
    base_dir().join("images")
}

/// Returns the default directory holding per-invocation staged roots.
#[must_use]
pub fn default_staging_dir() -> PathBuf {
    base_dir().join("rootfs")
}
