//! `gantry run` — Pull an image and run a command inside it.

use clap::Args;
use gantry_common::config::RunnerConfig;
use gantry_common::types::ImageReference;

/// Arguments for the `run` command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Image reference, e.g. `alpine:3.20` or `library/alpine@sha256:...`.
    pub image: String,

    /// Command to run inside the image, with its arguments.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
    pub command: Vec<String>,
}

/// Executes the `run` command.
///
/// Exits with the child's own exit code when the command ran, and with
/// 125/126/127/130 when the pipeline failed; see
/// [`gantry_runtime::error::RunError::exit_code`]. Never returns.
///
/// # Errors
///
/// Diverges instead of returning an error.
pub fn execute(args: &RunArgs, config: &RunnerConfig) -> anyhow::Result<()> {
    let image: ImageReference = match args.image.parse() {
        Ok(image) => image,
        Err(e) => super::fail(125, &e),
    };
    let Some((command, command_args)) = args.command.split_first() else {
        super::fail(125, &"no command given");
    };

    match gantry_runtime::runner::run_image(config, &image, command, command_args) {
        Ok(result) => std::process::exit(result.exit_code),
        Err(e) => super::fail(e.exit_code(), &e),
    }
}
