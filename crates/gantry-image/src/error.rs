//! Error types for the registry client and layer pipeline.
//!
//! Each pipeline step has its own error enum so callers can tell where a
//! pull failed without string matching; [`PullError`] aggregates them for
//! the end-to-end path.

use std::path::PathBuf;

use gantry_common::types::{Digest, Platform};
use thiserror::Error;

/// Errors raised by the HTTP transport layer.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The HTTP client itself could not be constructed.
    #[error("cannot build HTTP client: {source}")]
    Client {
        /// Underlying client error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A request could not be completed.
    #[error("GET {url} failed: {source}")]
    Request {
        /// URL of the failed request.
        url: String,
        /// Underlying client or connection error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Errors obtaining a pull token.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The token endpoint could not be reached.
    #[error("token request failed: {source}")]
    Request {
        /// Transport failure detail.
        source: TransportError,
    },

    /// The registry refused to issue a token.
    #[error("token request denied with HTTP status {status}")]
    Denied {
        /// HTTP status returned by the token endpoint.
        status: u16,
    },

    /// The token response could not be understood.
    #[error("malformed token response: {message}")]
    Malformed {
        /// What was wrong with the response.
        message: String,
    },
}

/// Errors resolving a reference to a platform manifest.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The registry rejected the request token.
    #[error("registry denied access to {repository} (HTTP {status})")]
    Unauthorized {
        /// Repository the request was scoped to.
        repository: String,
        /// HTTP status returned.
        status: u16,
    },

    /// No manifest is published under the reference.
    #[error("manifest not found for {reference}")]
    NotFound {
        /// The tag or digest requested.
        reference: String,
    },

    /// The index listed no manifest for the host platform.
    #[error("no manifest for platform {platform} in index for {reference}")]
    NoMatchingPlatform {
        /// The reference whose index was searched.
        reference: String,
        /// The platform that had no entry.
        platform: Platform,
    },

    /// The manifest body could not be parsed.
    #[error("malformed manifest for {reference}: {message}")]
    Malformed {
        /// The tag or digest requested.
        reference: String,
        /// Parse failure detail.
        message: String,
    },

    /// The registry could not be reached or answered outside the protocol.
    #[error("manifest request failed: {source}")]
    Transport {
        /// Transport failure detail.
        source: TransportError,
    },
}

/// Errors fetching a layer blob.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The registry has no blob under the digest.
    #[error("blob {digest} not found")]
    NotFound {
        /// Digest of the missing blob.
        digest: Digest,
    },

    /// The registry returned an unexpected status for the blob.
    #[error("blob {digest} request returned HTTP {status}")]
    Status {
        /// Digest of the requested blob.
        digest: Digest,
        /// HTTP status returned.
        status: u16,
    },

    /// The registry could not be reached.
    #[error("blob request failed: {source}")]
    Transport {
        /// Transport failure detail.
        source: TransportError,
    },
}

/// Errors applying a layer stream to a directory.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The stream was not a well-formed gzip tar archive. This includes a
    /// stream that ends before the archive terminator.
    #[error("corrupt layer archive: {source}")]
    Corrupt {
        /// Decode or framing failure detail.
        source: std::io::Error,
    },

    /// Writing an entry to the destination failed.
    #[error("cannot write layer entry at {path}: {source}")]
    Io {
        /// Destination path of the failed entry.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Errors materializing an image into the cache. Aggregates the per-step
/// errors of the pull pipeline.
#[derive(Debug, Error)]
pub enum PullError {
    /// The HTTP transport could not be constructed.
    #[error("transport setup failed: {source}")]
    Client {
        /// The failing step's error.
        #[from]
        source: TransportError,
    },

    /// Authentication against the token service failed.
    #[error("authentication failed: {source}")]
    Auth {
        /// The failing step's error.
        #[from]
        source: AuthError,
    },

    /// Manifest resolution failed.
    #[error("manifest resolution failed: {source}")]
    Resolve {
        /// The failing step's error.
        #[from]
        source: ResolveError,
    },

    /// A layer blob could not be fetched.
    #[error("layer fetch failed: {source}")]
    Fetch {
        /// The failing step's error.
        #[from]
        source: FetchError,
    },

    /// A layer could not be applied.
    #[error("cannot apply layer {digest}: {source}")]
    Extract {
        /// Digest of the layer that failed.
        digest: Digest,
        /// The failing step's error.
        source: ExtractError,
    },

    /// Cache bookkeeping (locks, scratch trees, publish rename) failed.
    #[error("image cache I/O failed at {path}: {source}")]
    Cache {
        /// Path of the failed operation.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}
