//! End-to-end run pipeline.
//!
//! Wires the registry client, image cache, stager, and launcher into
//! the two operations the CLI exposes: pull an image, and run a
//! command inside one.

use std::path::PathBuf;

use gantry_common::config::RunnerConfig;
use gantry_common::types::ImageReference;
use gantry_image::cache::ImageCache;
use gantry_image::client::RegistryClient;
use gantry_image::error::PullError;
use gantry_image::transport::ReqwestTransport;

use crate::error::RunError;
use crate::launcher::{self, ExecutionResult};

/// Materializes the image into the cache and returns its root path.
///
/// A cached image comes back without network traffic.
///
/// # Errors
///
/// Returns [`PullError`] naming the failing pipeline step.
pub fn pull_image(config: &RunnerConfig, image: &ImageReference) -> Result<PathBuf, PullError> {
    let transport = ReqwestTransport::new()?;
    let mut client = RegistryClient::new(Box::new(transport), config.registry.clone());
    let cache = ImageCache::open(&config.image_dir)?;
    cache.materialize(&mut client, image, config.prefetch_layers)
}

/// Pulls the image and runs `command` inside it, isolated in a fresh
/// PID namespace, returning the child's exit status.
///
/// # Errors
///
/// Returns [`RunError::Pull`] if materialization fails and
/// [`RunError::Launch`] if staging or execution fails. A command that
/// ran and exited non-zero is not an error; its code is in the result.
pub fn run_image(
    config: &RunnerConfig,
    image: &ImageReference,
    command: &str,
    args: &[String],
) -> Result<ExecutionResult, RunError> {
    let image_root = pull_image(config, image)?;
    tracing::debug!(image = %image, root = %image_root.display(), "image ready");
    Ok(launcher::launch(command, args, &image_root, config)?)
}
