//! Manifest data model.
//!
//! A manifest endpoint can answer with either a platform-specific image
//! manifest or a multi-platform index (Docker "manifest list" / OCI
//! "image index"); both Docker schema 2 and OCI shapes share the field
//! names this model cares about.

use gantry_common::types::{Digest, Platform};
use serde::Deserialize;

/// Descriptor for the image configuration blob.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    /// Media type of the referenced blob.
    #[serde(default)]
    pub media_type: Option<String>,
    /// Size of the blob in bytes.
    #[serde(default)]
    pub size: u64,
    /// Content digest of the blob.
    pub digest: Digest,
}

/// Descriptor for one filesystem layer blob.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerDescriptor {
    /// Media type of the layer, typically a gzip tar.
    #[serde(default)]
    pub media_type: Option<String>,
    /// Compressed size of the layer in bytes.
    #[serde(default)]
    pub size: u64,
    /// Content digest used to fetch the blob.
    pub digest: Digest,
}

/// A platform-specific image manifest.
///
/// The layer order is the stacking order, bottom to top, and is preserved
/// exactly as the registry reports it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Manifest schema version; 2 for everything this client supports.
    pub schema_version: u32,
    /// Media type of the manifest itself, when self-described.
    #[serde(default)]
    pub media_type: Option<String>,
    /// The image configuration descriptor.
    pub config: Descriptor,
    /// Ordered layer descriptors.
    pub layers: Vec<LayerDescriptor>,
}

/// Platform fields of an index entry.
#[derive(Debug, Clone, Deserialize)]
pub struct IndexPlatform {
    /// Operating system, e.g. `linux`.
    pub os: String,
    /// CPU architecture in registry vocabulary, e.g. `amd64`.
    pub architecture: String,
    /// Architecture variant, e.g. `v8`. Not used for matching.
    #[serde(default)]
    pub variant: Option<String>,
}

/// One candidate manifest in a multi-platform index.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexEntry {
    /// Media type of the referenced manifest.
    #[serde(default)]
    pub media_type: Option<String>,
    /// Digest of the referenced manifest.
    pub digest: Digest,
    /// Target platform; absent on attestation entries.
    #[serde(default)]
    pub platform: Option<IndexPlatform>,
}

/// A multi-platform index manifest.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestIndex {
    /// Manifest schema version.
    pub schema_version: u32,
    /// Media type of the index itself, when self-described.
    #[serde(default)]
    pub media_type: Option<String>,
    /// Candidate manifests.
    pub manifests: Vec<IndexEntry>,
}

/// Either shape a manifest endpoint may return.
///
/// Discriminated structurally: an index carries `manifests`, an image
/// manifest carries `config` and `layers`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ManifestBody {
    /// A multi-platform index to pick a platform entry from.
    Index(ManifestIndex),
    /// A concrete platform manifest.
    Manifest(Manifest),
}

/// Selects the first index entry whose platform matches, comparing OS and
/// architecture only. Entries without platform fields (attestations) never
/// match.
#[must_use]
pub fn select_platform<'a>(
    index: &'a ManifestIndex,
    platform: &Platform,
) -> Option<&'a IndexEntry> {
    index.manifests.iter().find(|entry| {
        entry
            .platform
            .as_ref()
            .is_some_and(|p| platform.matches(&p.os, &p.architecture))
    })
}
