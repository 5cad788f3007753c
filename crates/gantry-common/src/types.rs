//! Domain primitive types shared across the Gantry workspace.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_TAG, OFFICIAL_NAMESPACE};
use crate::error::{CommonError, Result};

/// Opaque content identifier in `algorithm:hex` form, as reported by the
/// registry (for example `sha256:4abcf20661432fb...`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Digest(String);

impl Digest {
    /// Creates a digest from its registry string form.
    #[must_use]
    pub fn new(digest: impl Into<String>) -> Self {
        Self(digest.into())
    }

    /// Returns the `algorithm:hex` string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a form of the digest safe to use as a single path component.
    ///
    /// The `:` separating algorithm from hex is meaningful to some tools and
    /// filesystems, so it is replaced with `-` before any on-disk use.
    #[must_use]
    pub fn path_component(&self) -> String {
        self.0.replace(':', "-")
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What part of an image reference names the manifest to fetch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reference {
    /// A mutable tag such as `latest` or `3.19`.
    Tag(String),
    /// An immutable content digest.
    Digest(Digest),
}

impl Reference {
    /// Returns the string to place in the manifest request path; the
    /// registry accepts tags and digests in the same position.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Tag(tag) => tag,
            Self::Digest(digest) => digest.as_str(),
        }
    }
}

/// A parsed image reference such as `alpine`, `alpine:3.19`, or
/// `alpine@sha256:4abcf...`. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageReference {
    name: String,
    reference: Reference,
}

impl ImageReference {
    /// Parses a reference from user input. The tag defaults to `latest`
    /// when neither a tag nor a digest is given.
    ///
    /// # Errors
    ///
    /// Returns [`CommonError::InvalidReference`] if the name, tag, or
    /// digest portion is empty.
    pub fn parse(input: &str) -> Result<Self> {
        let invalid = |reason| CommonError::InvalidReference {
            input: input.to_string(),
            reason,
        };

        if input.is_empty() {
            return Err(invalid("reference is empty"));
        }

        if let Some((name, digest)) = input.split_once('@') {
            if name.is_empty() {
                return Err(invalid("image name is empty"));
            }
            if digest.is_empty() {
                return Err(invalid("digest is empty"));
            }
            return Ok(Self {
                name: name.to_string(),
                reference: Reference::Digest(Digest::new(digest)),
            });
        }

        // A ':' only separates a tag when it comes after the final '/';
        // otherwise it belongs to a registry host:port in the name.
        match input.rsplit_once(':') {
            Some((name, tag)) if !tag.contains('/') => {
                if name.is_empty() {
                    return Err(invalid("image name is empty"));
                }
                if tag.is_empty() {
                    return Err(invalid("tag is empty"));
                }
                Ok(Self {
                    name: name.to_string(),
                    reference: Reference::Tag(tag.to_string()),
                })
            }
            _ => Ok(Self {
                name: input.to_string(),
                reference: Reference::Tag(DEFAULT_TAG.to_string()),
            }),
        }
    }

    /// Returns the image name exactly as the user wrote it.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the tag or digest portion.
    #[must_use]
    pub fn reference(&self) -> &Reference {
        &self.reference
    }

    /// Returns the repository path used in registry request URLs.
    ///
    /// Bare names refer to official images and live under the `library`
    /// namespace; names that already carry a namespace are used verbatim.
    #[must_use]
    pub fn repository(&self) -> String {
        if self.name.contains('/') {
            self.name.clone()
        } else {
            format!("{OFFICIAL_NAMESPACE}/{}", self.name)
        }
    }

    /// Returns a filesystem-safe key identifying this image in the cache.
    #[must_use]
    pub fn cache_key(&self) -> String {
        let raw = format!("{}-{}", self.name, self.reference.as_str());
        raw.replace(['/', ':'], "-")
    }
}

impl std::str::FromStr for ImageReference {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reference {
            Reference::Tag(tag) => write!(f, "{}:{tag}", self.name),
            Reference::Digest(digest) => write!(f, "{}@{digest}", self.name),
        }
    }
}

/// An operating system / CPU architecture pair in registry vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    /// Operating system, e.g. `linux`.
    pub os: String,
    /// CPU architecture, e.g. `amd64` or `arm64`.
    pub architecture: String,
}

impl Platform {
    /// Returns the platform of the running host, translated into the
    /// vocabulary registries use.
    #[must_use]
    pub fn host() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            architecture: registry_architecture(std::env::consts::ARCH).to_string(),
        }
    }

    /// Checks whether an index entry's platform fields match this one.
    /// Variant is deliberately not considered.
    #[must_use]
    pub fn matches(&self, os: &str, architecture: &str) -> bool {
        self.os == os && self.architecture == architecture
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.architecture)
    }
}

/// Translates a Rust architecture name into the registry's vocabulary.
fn registry_architecture(arch: &str) -> &str {
    match arch {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        other => other,
    }
}
