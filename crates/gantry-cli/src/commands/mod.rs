//! CLI command definitions and dispatch.

pub mod pull;
pub mod run;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use gantry_common::config::RunnerConfig;

/// Gantry — pull container images and run commands inside them.
#[derive(Parser, Debug)]
#[command(name = "gantry", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Registry host serving manifests and blobs.
    #[arg(long, global = true, value_name = "HOST")]
    pub registry: Option<String>,

    /// Host serving the token endpoint.
    #[arg(long, global = true, value_name = "HOST")]
    pub auth_host: Option<String>,

    /// Service name sent in token requests.
    #[arg(long, global = true, value_name = "NAME")]
    pub service: Option<String>,

    /// Directory holding extracted images.
    #[arg(long, global = true, value_name = "PATH")]
    pub cache_dir: Option<PathBuf>,

    /// Directory holding per-invocation roots.
    #[arg(long, global = true, value_name = "PATH")]
    pub staging_dir: Option<PathBuf>,

    /// Download layer blobs concurrently before extraction.
    #[arg(long, global = true)]
    pub prefetch: bool,
}

impl Cli {
    /// Merges the global flags over the default configuration.
    #[must_use]
    pub fn runner_config(&self) -> RunnerConfig {
        let mut config = RunnerConfig::default();
        if let Some(host) = &self.registry {
            config.registry.registry_host = host.clone();
        }
        if let Some(host) = &self.auth_host {
            config.registry.auth_host = host.clone();
        }
        if let Some(service) = &self.service {
            config.registry.auth_service = service.clone();
        }
        if let Some(dir) = &self.cache_dir {
            config.image_dir = dir.clone();
        }
        if let Some(dir) = &self.staging_dir {
            config.staging_dir = dir.clone();
        }
        config.prefetch_layers = self.prefetch;
        config
    }
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Pull an image and run a command inside it.
    Run(run::RunArgs),
    /// Pull an image into the local cache.
    Pull(pull::PullArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    let config = cli.runner_config();
    match cli.command {
        Command::Run(args) => run::execute(&args, &config),
        Command::Pull(args) => pull::execute(&args, &config),
    }
}

/// Prints the failure and exits with the given code.
pub(crate) fn fail(code: i32, message: &dyn std::fmt::Display) -> ! {
    #[allow(clippy::print_stderr)]
    {
        eprintln!("gantry: {message}");
    }
    std::process::exit(code);
}
