//! `gantry pull` — Pull an image into the local cache.

use std::time::Instant;

use clap::Args;
use gantry_common::config::RunnerConfig;
use gantry_common::types::ImageReference;

/// Arguments for the `pull` command.
#[derive(Args, Debug)]
pub struct PullArgs {
    /// Image reference, e.g. `alpine:3.20` or `library/alpine@sha256:...`.
    pub image: String,
}

/// Executes the `pull` command, printing the cache path on success.
///
/// # Errors
///
/// Returns an error if the reference does not parse or the pull fails.
pub fn execute(args: &PullArgs, config: &RunnerConfig) -> anyhow::Result<()> {
    let image: ImageReference = args.image.parse()?;
    let start = Instant::now();

    let path = gantry_runtime::runner::pull_image(config, &image)
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    #[allow(clippy::print_stderr)]
    {
        eprintln!(
            "Pulled {image} in {:.1}s",
            start.elapsed().as_secs_f64()
        );
    }
    #[allow(clippy::print_stdout)]
    {
        println!("{}", path.display());
    }
    Ok(())
}
