//! Registry pull-session client.
//!
//! One [`RegistryClient`] represents one pull session: it holds the bearer
//! token obtained for the session and reuses it for every request, never
//! mixing tokens across sessions.

use std::io::Read;

use gantry_common::config::RegistryConfig;
use gantry_common::constants::{
    MEDIA_TYPE_DOCKER_MANIFEST, MEDIA_TYPE_DOCKER_MANIFEST_LIST, MEDIA_TYPE_OCI_INDEX,
    MEDIA_TYPE_OCI_MANIFEST,
};
use gantry_common::types::{ImageReference, Platform};

use crate::auth::{AuthToken, obtain_token};
use crate::error::{AuthError, FetchError, ResolveError, TransportError};
use crate::manifest::{LayerDescriptor, Manifest, ManifestBody, select_platform};
use crate::transport::HttpTransport;

/// A live byte stream of one layer blob. The caller pulls bytes
/// incrementally; nothing is buffered beyond the transport's own window.
pub type LayerStream = Box<dyn Read + Send>;

/// Client for one registry pull session.
pub struct RegistryClient {
    transport: Box<dyn HttpTransport>,
    config: RegistryConfig,
    platform: Platform,
    token: Option<AuthToken>,
}

impl RegistryClient {
    /// Creates a client targeting the host platform.
    #[must_use]
    pub fn new(transport: Box<dyn HttpTransport>, config: RegistryConfig) -> Self {
        Self {
            transport,
            config,
            platform: Platform::host(),
            token: None,
        }
    }

    /// Overrides the platform used for index matching.
    #[must_use]
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Returns the platform index entries are matched against.
    #[must_use]
    pub const fn platform(&self) -> &Platform {
        &self.platform
    }

    /// Ensures a pull token scoped to the repository is held.
    ///
    /// A token already held for the same repository is reused; a token for
    /// a different repository is replaced.
    ///
    /// # Errors
    ///
    /// Returns an [`AuthError`] if the token service refuses or cannot be
    /// reached.
    pub fn authenticate(&mut self, repository: &str) -> Result<(), AuthError> {
        let held = self
            .token
            .as_ref()
            .is_some_and(|token| token.scope() == repository);
        if !held {
            let token = obtain_token(self.transport.as_ref(), &self.config, repository)?;
            self.token = Some(token);
        }
        Ok(())
    }

    /// Resolves a reference down to a platform-specific manifest.
    ///
    /// Fetches the manifest for the tag or digest; when the registry
    /// answers with a multi-platform index, selects the entry matching
    /// this client's platform and fetches the concrete manifest by digest.
    ///
    /// # Errors
    ///
    /// See [`ResolveError`] for the per-outcome mapping. Notably an index
    /// with no matching platform fails with
    /// [`ResolveError::NoMatchingPlatform`] before any blob is requested.
    pub fn resolve_manifest(&self, image: &ImageReference) -> Result<Manifest, ResolveError> {
        let repository = image.repository();
        let reference = image.reference().as_str();

        let accept = [
            MEDIA_TYPE_DOCKER_MANIFEST,
            MEDIA_TYPE_DOCKER_MANIFEST_LIST,
            MEDIA_TYPE_OCI_MANIFEST,
            MEDIA_TYPE_OCI_INDEX,
        ]
        .join(", ");
        match self.fetch_manifest_body(&repository, reference, &accept)? {
            ManifestBody::Manifest(manifest) => Ok(manifest),
            ManifestBody::Index(index) => {
                let entry = select_platform(&index, &self.platform).ok_or_else(|| {
                    ResolveError::NoMatchingPlatform {
                        reference: image.to_string(),
                        platform: self.platform.clone(),
                    }
                })?;
                tracing::debug!(
                    digest = %entry.digest,
                    platform = %self.platform,
                    "selected platform manifest from index"
                );

                let accept = [MEDIA_TYPE_DOCKER_MANIFEST, MEDIA_TYPE_OCI_MANIFEST].join(", ");
                match self.fetch_manifest_body(&repository, entry.digest.as_str(), &accept)? {
                    ManifestBody::Manifest(manifest) => Ok(manifest),
                    ManifestBody::Index(_) => Err(ResolveError::Malformed {
                        reference: entry.digest.to_string(),
                        message: "index entry resolved to another index".to_string(),
                    }),
                }
            }
        }
    }

    /// Requests one layer blob, returning its live byte stream.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::NotFound`] for a 404, [`FetchError::Status`]
    /// for other non-2xx statuses, and [`FetchError::Transport`] when no
    /// response was obtained.
    pub fn fetch_layer(
        &self,
        image: &ImageReference,
        layer: &LayerDescriptor,
    ) -> Result<LayerStream, FetchError> {
        let url = self.config.blob_url(&image.repository(), &layer.digest);
        let mut headers = Vec::new();
        if let Some(media_type) = &layer.media_type {
            headers.push(("Accept", media_type.clone()));
        }
        if let Some(token) = &self.token {
            headers.push(("Authorization", token.bearer()));
        }

        let response = self
            .transport
            .get(&url, &headers)
            .map_err(|source| FetchError::Transport { source })?;
        match response.status() {
            status if response.is_success() => {
                tracing::debug!(digest = %layer.digest, status, "layer stream open");
                Ok(response.into_body())
            }
            404 => Err(FetchError::NotFound {
                digest: layer.digest.clone(),
            }),
            status => Err(FetchError::Status {
                digest: layer.digest.clone(),
                status,
            }),
        }
    }

    fn fetch_manifest_body(
        &self,
        repository: &str,
        reference: &str,
        accept: &str,
    ) -> Result<ManifestBody, ResolveError> {
        let url = self.config.manifest_url(repository, reference);
        let mut headers = vec![("Accept", accept.to_string())];
        if let Some(token) = &self.token {
            headers.push(("Authorization", token.bearer()));
        }

        let response = self
            .transport
            .get(&url, &headers)
            .map_err(|source| ResolveError::Transport { source })?;
        match response.status() {
            _ if response.is_success() => {}
            status @ (401 | 403) => {
                return Err(ResolveError::Unauthorized {
                    repository: repository.to_string(),
                    status,
                });
            }
            404 => {
                return Err(ResolveError::NotFound {
                    reference: reference.to_string(),
                });
            }
            status => {
                return Err(ResolveError::Transport {
                    source: TransportError::Request {
                        url,
                        source: Box::new(std::io::Error::other(format!(
                            "unexpected HTTP status {status}"
                        ))),
                    },
                });
            }
        }

        let body = response.read_text().map_err(|e| ResolveError::Transport {
            source: TransportError::Request {
                url,
                source: Box::new(e),
            },
        })?;
        serde_json::from_str(&body).map_err(|e| ResolveError::Malformed {
            reference: reference.to_string(),
            message: e.to_string(),
        })
    }
}

impl std::fmt::Debug for RegistryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryClient")
            .field("config", &self.config)
            .field("platform", &self.platform)
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}
