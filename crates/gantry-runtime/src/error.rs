//! Error types for staging, launching, and the end-to-end run pipeline.

use std::path::PathBuf;

use gantry_core::error::IsolationError;
use gantry_image::error::PullError;
use thiserror::Error;

/// Building the ephemeral root copy failed.
#[derive(Debug, Error)]
#[error("cannot stage {path}: {source}")]
pub struct StageError {
    /// Path of the entry that failed to copy.
    pub path: PathBuf,
    /// Underlying I/O error.
    pub source: std::io::Error,
}

/// The command could not be started.
#[derive(Debug, Error)]
pub enum SpawnError {
    /// No executable exists under the command path inside the root.
    #[error("command not found: {command}")]
    CommandNotFound {
        /// The command that was looked up.
        command: String,
    },

    /// The command exists but is not executable by this user.
    #[error("permission denied running {command}")]
    PermissionDenied {
        /// The command that was refused.
        command: String,
    },

    /// Any other spawn failure.
    #[error("cannot spawn {command}: {source}")]
    Io {
        /// The command that failed to start.
        command: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Errors launching a command inside a staged root.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// The ephemeral root could not be built.
    #[error("staging failed: {source}")]
    Stage {
        /// The failing step's error.
        #[from]
        source: StageError,
    },

    /// Namespace creation or root confinement failed.
    #[error("isolation failed: {source}")]
    Isolation {
        /// The failing step's error.
        #[from]
        source: IsolationError,
    },

    /// The shutdown signal handler could not be installed.
    #[error("cannot install signal handler: {source}")]
    Signals {
        /// Underlying handler registration error.
        source: ctrlc::Error,
    },

    /// A shutdown signal arrived before the command was spawned.
    #[error("interrupted before the command started")]
    Interrupted,

    /// The command could not be spawned.
    #[error("spawn failed: {source}")]
    Spawn {
        /// The failing step's error.
        #[from]
        source: SpawnError,
    },

    /// Waiting on the child process failed.
    #[error("cannot wait for child: {source}")]
    Wait {
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Errors from the end-to-end run pipeline.
#[derive(Debug, Error)]
pub enum RunError {
    /// Materializing the image failed.
    #[error("pull failed: {source}")]
    Pull {
        /// The failing step's error.
        #[from]
        source: PullError,
    },

    /// Launching the command failed.
    #[error("launch failed: {source}")]
    Launch {
        /// The failing step's error.
        #[from]
        source: LaunchError,
    },
}

impl RunError {
    /// Maps the failure to a process exit code.
    ///
    /// A missing command is 127 and a non-executable one 126, matching
    /// shell conventions. Interruption before the command started is
    /// 130. Every other pipeline failure is 125; the child's own exit
    /// code never flows through here.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Launch {
                source: LaunchError::Spawn { source },
            } => match source {
                SpawnError::CommandNotFound { .. } => 127,
                SpawnError::PermissionDenied { .. } => 126,
                SpawnError::Io { .. } => 125,
            },
            Self::Launch {
                source: LaunchError::Interrupted,
            } => 130,
            _ => 125,
        }
    }
}
