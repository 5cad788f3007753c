//! # gantry-image
//!
//! Registry protocol client and layer pipeline for the Gantry runtime.
//!
//! Handles:
//! - **Auth**: pull-scoped bearer tokens from the registry's token service.
//! - **Manifests**: tag and index resolution down to a platform manifest.
//! - **Blobs**: streamed layer downloads.
//! - **Extraction**: gzip tar application with whiteout handling.
//! - **Cache**: materialized images keyed by reference, serialized by
//!   per-repository locks.
//!
//! All network access goes through the [`transport::HttpTransport`] trait so
//! the protocol logic can be exercised against an in-memory registry.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod auth;
pub mod cache;
pub mod client;
pub mod error;
pub mod extract;
pub mod manifest;
pub mod transport;
