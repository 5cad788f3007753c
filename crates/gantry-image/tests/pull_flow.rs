//! End-to-end pull pipeline tests against an in-memory registry.
//!
//! These tests exercise the full materialization path without a network:
//! 1. Token acquisition and session reuse
//! 2. Manifest resolution (flat manifests and multi-platform indexes)
//! 3. Layer streaming and extraction
//! 4. Cache publication, skip-if-exists, and failure cleanup

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{Arc, Mutex};

use flate2::Compression;
use flate2::write::GzEncoder;
use gantry_common::config::RegistryConfig;
use gantry_common::types::{ImageReference, Platform};
use gantry_image::cache::ImageCache;
use gantry_image::client::RegistryClient;
use gantry_image::error::{PullError, ResolveError, TransportError};
use gantry_image::transport::{HttpResponse, HttpTransport};

// ── Test registry ────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct RecordedCall {
    url: String,
    authorization: Option<String>,
    accept: Option<String>,
}

/// In-memory registry answering from a route table and recording every
/// request it sees. Unrouted URLs answer 404.
#[derive(Clone)]
struct StubRegistry {
    routes: HashMap<String, (u16, Vec<u8>)>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl StubRegistry {
    fn new() -> Self {
        Self {
            routes: HashMap::new(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn route(mut self, url: impl Into<String>, status: u16, body: impl Into<Vec<u8>>) -> Self {
        let _ = self.routes.insert(url.into(), (status, body.into()));
        self
    }

    fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().expect("call log poisoned").clone()
    }

    fn blob_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.url.contains("/blobs/"))
            .count()
    }
}

impl HttpTransport for StubRegistry {
    fn get(&self, url: &str, headers: &[(&str, String)]) -> Result<HttpResponse, TransportError> {
        let header = |name: &str| {
            headers
                .iter()
                .find(|(n, _)| n.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.clone())
        };
        self.calls.lock().expect("call log poisoned").push(RecordedCall {
            url: url.to_string(),
            authorization: header("Authorization"),
            accept: header("Accept"),
        });
        match self.routes.get(url) {
            Some((status, body)) => Ok(HttpResponse::new(*status, Cursor::new(body.clone()))),
            None => Ok(HttpResponse::new(404, std::io::empty())),
        }
    }
}

// ── Fixtures ─────────────────────────────────────────────────────────

fn gz_layer(files: &[(&str, &str)]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (path, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, path, content.as_bytes())
            .expect("failed to append file");
    }
    builder
        .into_inner()
        .expect("failed to finish tar")
        .finish()
        .expect("failed to finish gzip")
}

fn manifest_json(layer_digests: &[&str]) -> String {
    let layers = layer_digests
        .iter()
        .map(|d| {
            format!(
                r#"{{"mediaType":"application/vnd.docker.image.rootfs.diff.tar.gzip","size":0,"digest":"{d}"}}"#
            )
        })
        .collect::<Vec<_>>()
        .join(",");
    format!(
        r#"{{"schemaVersion":2,"mediaType":"application/vnd.docker.distribution.manifest.v2+json","config":{{"mediaType":"application/vnd.docker.container.image.v1+json","size":0,"digest":"sha256:config"}},"layers":[{layers}]}}"#
    )
}

fn index_json(entries: &[(&str, &str, &str)]) -> String {
    let manifests = entries
        .iter()
        .map(|(digest, os, arch)| {
            format!(
                r#"{{"mediaType":"application/vnd.oci.image.manifest.v1+json","size":0,"digest":"{digest}","platform":{{"os":"{os}","architecture":"{arch}"}}}}"#
            )
        })
        .collect::<Vec<_>>()
        .join(",");
    format!(r#"{{"schemaVersion":2,"mediaType":"application/vnd.oci.image.index.v1+json","manifests":[{manifests}]}}"#)
}

const TOKEN_BODY: &str = r#"{"token":"stub-pull-token"}"#;

fn linux(arch: &str) -> Platform {
    Platform {
        os: "linux".to_string(),
        architecture: arch.to_string(),
    }
}

fn alpine() -> ImageReference {
    ImageReference::parse("alpine:latest").expect("parse failed")
}

fn client_for(stub: &StubRegistry, arch: &str) -> RegistryClient {
    RegistryClient::new(Box::new(stub.clone()), RegistryConfig::default())
        .with_platform(linux(arch))
}

/// Routes a complete happy-path pull: token, flat manifest, two layers.
fn flat_registry(config: &RegistryConfig) -> StubRegistry {
    StubRegistry::new()
        .route(config.token_url("library/alpine"), 200, TOKEN_BODY)
        .route(
            config.manifest_url("library/alpine", "latest"),
            200,
            manifest_json(&["sha256:base", "sha256:top"]),
        )
        .route(
            "https://registry.hub.docker.com/v2/library/alpine/blobs/sha256:base",
            200,
            gz_layer(&[("etc/os-release", "lower"), ("bin/tool", "v1")]),
        )
        .route(
            "https://registry.hub.docker.com/v2/library/alpine/blobs/sha256:top",
            200,
            gz_layer(&[("bin/tool", "v2")]),
        )
}

// ── Token acquisition ────────────────────────────────────────────────

#[test]
fn pull_obtains_one_token_and_attaches_it_everywhere() {
    let config = RegistryConfig::default();
    let stub = flat_registry(&config);
    let dir = tempfile::tempdir().expect("tempdir");
    let cache = ImageCache::open(dir.path()).expect("open cache");
    let mut client = client_for(&stub, "amd64");

    cache
        .materialize(&mut client, &alpine(), false)
        .expect("pull failed");

    let calls = stub.calls();
    let token_calls = calls.iter().filter(|c| c.url.contains("/token")).count();
    assert_eq!(token_calls, 1, "exactly one token request per session");

    for call in calls.iter().filter(|c| !c.url.contains("/token")) {
        assert_eq!(
            call.authorization.as_deref(),
            Some("Bearer stub-pull-token"),
            "bearer token missing on {}",
            call.url
        );
    }
}

#[test]
fn manifest_request_accepts_index_media_types() {
    let config = RegistryConfig::default();
    let stub = flat_registry(&config);
    let dir = tempfile::tempdir().expect("tempdir");
    let cache = ImageCache::open(dir.path()).expect("open cache");
    let mut client = client_for(&stub, "amd64");

    cache
        .materialize(&mut client, &alpine(), false)
        .expect("pull failed");

    let manifest_call = stub
        .calls()
        .into_iter()
        .find(|c| c.url.contains("/manifests/latest"))
        .expect("manifest request missing");
    let accept = manifest_call.accept.expect("accept header missing");
    assert!(accept.contains("manifest.list.v2+json"));
    assert!(accept.contains("image.index.v1+json"));
    assert!(accept.contains("manifest.v2+json"));
}

// ── Manifest resolution ──────────────────────────────────────────────

#[test]
fn pull_materializes_flat_manifest_with_layer_order() {
    let config = RegistryConfig::default();
    let stub = flat_registry(&config);
    let dir = tempfile::tempdir().expect("tempdir");
    let cache = ImageCache::open(dir.path()).expect("open cache");
    let mut client = client_for(&stub, "amd64");

    let path = cache
        .materialize(&mut client, &alpine(), false)
        .expect("pull failed");

    assert_eq!(
        std::fs::read_to_string(path.join("etc/os-release")).expect("read failed"),
        "lower"
    );
    // The second layer overwrote the first.
    assert_eq!(
        std::fs::read_to_string(path.join("bin/tool")).expect("read failed"),
        "v2"
    );
}

#[test]
fn pull_resolves_index_to_matching_platform() {
    let config = RegistryConfig::default();
    let stub = StubRegistry::new()
        .route(config.token_url("library/alpine"), 200, TOKEN_BODY)
        .route(
            config.manifest_url("library/alpine", "latest"),
            200,
            index_json(&[
                ("sha256:amd", "linux", "amd64"),
                ("sha256:arm", "linux", "arm64"),
            ]),
        )
        .route(
            config.manifest_url("library/alpine", "sha256:arm"),
            200,
            manifest_json(&["sha256:only"]),
        )
        .route(
            "https://registry.hub.docker.com/v2/library/alpine/blobs/sha256:only",
            200,
            gz_layer(&[("arch", "arm64")]),
        );
    let dir = tempfile::tempdir().expect("tempdir");
    let cache = ImageCache::open(dir.path()).expect("open cache");
    let mut client = client_for(&stub, "arm64");

    let path = cache
        .materialize(&mut client, &alpine(), false)
        .expect("pull failed");

    assert_eq!(
        std::fs::read_to_string(path.join("arch")).expect("read failed"),
        "arm64"
    );
    let urls: Vec<String> = stub.calls().into_iter().map(|c| c.url).collect();
    assert!(urls.iter().any(|u| u.ends_with("/manifests/sha256:arm")));
    assert!(!urls.iter().any(|u| u.ends_with("/manifests/sha256:amd")));
}

#[test]
fn index_without_host_platform_fetches_no_blobs() {
    let config = RegistryConfig::default();
    let stub = StubRegistry::new()
        .route(config.token_url("library/alpine"), 200, TOKEN_BODY)
        .route(
            config.manifest_url("library/alpine", "latest"),
            200,
            index_json(&[("sha256:s390", "linux", "s390x")]),
        );
    let dir = tempfile::tempdir().expect("tempdir");
    let cache = ImageCache::open(dir.path()).expect("open cache");
    let mut client = client_for(&stub, "amd64");

    let err = cache
        .materialize(&mut client, &alpine(), false)
        .expect_err("should fail");

    assert!(matches!(
        err,
        PullError::Resolve {
            source: ResolveError::NoMatchingPlatform { .. }
        }
    ));
    assert_eq!(stub.blob_calls(), 0, "no blob may be requested");
    assert!(!cache.is_cached(&alpine()));
}

#[test]
fn unauthorized_manifest_maps_to_unauthorized() {
    let config = RegistryConfig::default();
    let stub = StubRegistry::new()
        .route(config.token_url("library/alpine"), 200, TOKEN_BODY)
        .route(config.manifest_url("library/alpine", "latest"), 401, "{}");
    let dir = tempfile::tempdir().expect("tempdir");
    let cache = ImageCache::open(dir.path()).expect("open cache");
    let mut client = client_for(&stub, "amd64");

    let err = cache
        .materialize(&mut client, &alpine(), false)
        .expect_err("should fail");
    assert!(matches!(
        err,
        PullError::Resolve {
            source: ResolveError::Unauthorized { status: 401, .. }
        }
    ));
}

#[test]
fn missing_manifest_maps_to_not_found() {
    let config = RegistryConfig::default();
    let stub =
        StubRegistry::new().route(config.token_url("library/alpine"), 200, TOKEN_BODY);
    let dir = tempfile::tempdir().expect("tempdir");
    let cache = ImageCache::open(dir.path()).expect("open cache");
    let mut client = client_for(&stub, "amd64");

    let err = cache
        .materialize(&mut client, &alpine(), false)
        .expect_err("should fail");
    assert!(matches!(
        err,
        PullError::Resolve {
            source: ResolveError::NotFound { .. }
        }
    ));
}

#[test]
fn pull_by_digest_requests_manifest_by_digest() {
    let config = RegistryConfig::default();
    let pinned = ImageReference::parse("alpine@sha256:pinned").expect("parse failed");
    let stub = StubRegistry::new()
        .route(config.token_url("library/alpine"), 200, TOKEN_BODY)
        .route(
            config.manifest_url("library/alpine", "sha256:pinned"),
            200,
            manifest_json(&["sha256:only"]),
        )
        .route(
            "https://registry.hub.docker.com/v2/library/alpine/blobs/sha256:only",
            200,
            gz_layer(&[("pinned", "yes")]),
        );
    let dir = tempfile::tempdir().expect("tempdir");
    let cache = ImageCache::open(dir.path()).expect("open cache");
    let mut client = client_for(&stub, "amd64");

    let path = cache
        .materialize(&mut client, &pinned, false)
        .expect("pull failed");

    // The digest separator never reaches the filesystem.
    let dir_name = path.file_name().expect("file name").to_string_lossy();
    assert!(!dir_name.contains(':'));
    assert_eq!(
        std::fs::read_to_string(path.join("pinned")).expect("read failed"),
        "yes"
    );
}

// ── Cache behavior ───────────────────────────────────────────────────

#[test]
fn cached_image_performs_no_network_calls() {
    let config = RegistryConfig::default();
    let stub = flat_registry(&config);
    let dir = tempfile::tempdir().expect("tempdir");
    let cache = ImageCache::open(dir.path()).expect("open cache");
    let alpine = alpine();
    std::fs::create_dir_all(cache.image_path(&alpine)).expect("mkdir failed");
    let mut client = client_for(&stub, "amd64");

    let path = cache
        .materialize(&mut client, &alpine, false)
        .expect("materialize failed");

    assert_eq!(path, cache.image_path(&alpine));
    assert!(stub.calls().is_empty(), "cached image must not hit the network");
}

#[test]
fn second_pull_reuses_published_image() {
    let config = RegistryConfig::default();
    let stub = flat_registry(&config);
    let dir = tempfile::tempdir().expect("tempdir");
    let cache = ImageCache::open(dir.path()).expect("open cache");
    let mut client = client_for(&stub, "amd64");

    let first = cache
        .materialize(&mut client, &alpine(), false)
        .expect("first pull failed");
    let calls_after_first = stub.calls().len();
    let second = cache
        .materialize(&mut client, &alpine(), false)
        .expect("second pull failed");

    assert_eq!(first, second);
    assert_eq!(stub.calls().len(), calls_after_first);
}

#[test]
fn zero_layer_manifest_publishes_empty_directory() {
    let config = RegistryConfig::default();
    let stub = StubRegistry::new()
        .route(config.token_url("library/alpine"), 200, TOKEN_BODY)
        .route(
            config.manifest_url("library/alpine", "latest"),
            200,
            manifest_json(&[]),
        );
    let dir = tempfile::tempdir().expect("tempdir");
    let cache = ImageCache::open(dir.path()).expect("open cache");
    let mut client = client_for(&stub, "amd64");

    let path = cache
        .materialize(&mut client, &alpine(), false)
        .expect("pull failed");

    assert!(path.is_dir());
    assert_eq!(
        std::fs::read_dir(&path).expect("read_dir failed").count(),
        0
    );
}

#[test]
fn failed_pull_publishes_nothing_and_leaves_no_scratch() {
    let config = RegistryConfig::default();
    let stub = StubRegistry::new()
        .route(config.token_url("library/alpine"), 200, TOKEN_BODY)
        .route(
            config.manifest_url("library/alpine", "latest"),
            200,
            manifest_json(&["sha256:absent"]),
        );
    let dir = tempfile::tempdir().expect("tempdir");
    let cache = ImageCache::open(dir.path()).expect("open cache");
    let mut client = client_for(&stub, "amd64");

    let err = cache
        .materialize(&mut client, &alpine(), false)
        .expect_err("should fail");
    assert!(matches!(err, PullError::Fetch { .. }));
    assert!(!cache.is_cached(&alpine()));

    let leftovers: Vec<String> = std::fs::read_dir(dir.path())
        .expect("read_dir failed")
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with(".tmp") || name.starts_with(".spool"))
        .collect();
    assert!(leftovers.is_empty(), "scratch debris left: {leftovers:?}");
}

#[test]
fn corrupt_layer_stream_maps_to_extract_error() {
    let config = RegistryConfig::default();
    let stub = StubRegistry::new()
        .route(config.token_url("library/alpine"), 200, TOKEN_BODY)
        .route(
            config.manifest_url("library/alpine", "latest"),
            200,
            manifest_json(&["sha256:junk"]),
        )
        .route(
            "https://registry.hub.docker.com/v2/library/alpine/blobs/sha256:junk",
            200,
            b"this is not a gzip stream".to_vec(),
        );
    let dir = tempfile::tempdir().expect("tempdir");
    let cache = ImageCache::open(dir.path()).expect("open cache");
    let mut client = client_for(&stub, "amd64");

    let err = cache
        .materialize(&mut client, &alpine(), false)
        .expect_err("should fail");
    assert!(
        matches!(&err, PullError::Extract { digest, .. } if digest.as_str() == "sha256:junk"),
        "expected extract error, got {err}"
    );
    assert!(!cache.is_cached(&alpine()));
}

// ── Concurrent prefetch ──────────────────────────────────────────────

#[test]
fn prefetch_still_applies_layers_in_manifest_order() {
    let config = RegistryConfig::default();
    let stub = flat_registry(&config);
    let dir = tempfile::tempdir().expect("tempdir");
    let cache = ImageCache::open(dir.path()).expect("open cache");
    let mut client = client_for(&stub, "amd64");

    let path = cache
        .materialize(&mut client, &alpine(), true)
        .expect("pull failed");

    assert_eq!(
        std::fs::read_to_string(path.join("bin/tool")).expect("read failed"),
        "v2",
        "later layer must win even with concurrent downloads"
    );
    assert_eq!(stub.blob_calls(), 2);
}
