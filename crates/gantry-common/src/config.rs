//! Configuration models for the registry client and the run pipeline.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::types::Digest;

/// Endpoints and identity used when talking to a registry.
///
/// All session state lives here or in values derived from it; nothing about
/// the registry is held in globals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Host serving `/v2/` manifests and blobs.
    pub registry_host: String,
    /// Host serving the token endpoint.
    pub auth_host: String,
    /// Service name sent in the token request.
    pub auth_service: String,
}

impl RegistryConfig {
    /// Returns the token endpoint URL for a repository pull scope.
    #[must_use]
    pub fn token_url(&self, repository: &str) -> String {
        format!(
            "https://{}/token?service={}&scope=repository:{repository}:pull",
            self.auth_host, self.auth_service
        )
    }

    /// Returns the manifest endpoint URL for a tag or digest.
    #[must_use]
    pub fn manifest_url(&self, repository: &str, reference: &str) -> String {
        format!(
            "https://{}/v2/{repository}/manifests/{reference}",
            self.registry_host
        )
    }

    /// Returns the blob endpoint URL for a layer digest.
    #[must_use]
    pub fn blob_url(&self, repository: &str, digest: &Digest) -> String {
        format!(
            "https://{}/v2/{repository}/blobs/{digest}",
            self.registry_host
        )
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            registry_host: crate::constants::DEFAULT_REGISTRY_HOST.to_string(),
            auth_host: crate::constants::DEFAULT_AUTH_HOST.to_string(),
            auth_service: crate::constants::DEFAULT_AUTH_SERVICE.to_string(),
        }
    }
}

/// Settings for one `run`/`pull` invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Registry endpoints to pull from.
    pub registry: RegistryConfig,
    /// Directory holding extracted images, keyed by image cache key.
    pub image_dir: PathBuf,
    /// Directory holding per-invocation staged roots.
    pub staging_dir: PathBuf,
    /// Download layer blobs concurrently before extraction.
    pub prefetch_layers: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            registry: RegistryConfig::default(),
            image_dir: crate::constants::default_image_dir(),
            staging_dir: crate::constants::default_staging_dir(),
            prefetch_layers: false,
        }
    }
}
