//! Error types for qtb-harness.

use crate::process::ProcessKind;

/// Errors from the network condition controller and its backends.
#[derive(Debug, thiserror::Error)]
pub enum ShapingError {
    /// `apply` was called while another experiment's shaping is installed.
    #[error("shaping already applied (state: {state})")]
    AlreadyShaped {
        /// Name of the state the controller was in.
        state: &'static str,
    },

    /// Neither running as root nor able to elevate non-interactively.
    #[error("insufficient privilege to modify traffic control: {detail}")]
    InsufficientPrivilege {
        /// What was tried.
        detail: String,
    },

    /// `tc` ran and returned non-zero.
    #[error("command failed: {command}: exit={exit_code}, stderr={stderr}")]
    CommandFailed {
        /// The command line that failed.
        command: String,
        /// Exit code.
        exit_code: i32,
        /// Standard error output.
        stderr: String,
    },

    /// `tc` (or the elevation helper) could not be executed at all.
    #[error("failed to execute tc: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Errors from the process lifecycle manager.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// The process exited or could not be spawned during startup.
    #[error("{kind} failed to start: {detail}")]
    StartFailure {
        /// Which process.
        kind: ProcessKind,
        /// Why.
        detail: String,
    },

    /// I/O error while waiting on or signalling a process.
    #[error("process I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that fail a single experiment.
#[derive(Debug, thiserror::Error)]
pub enum ExperimentError {
    /// Shaping could not be applied or inspected.
    #[error(transparent)]
    Shaping(#[from] ShapingError),

    /// Server or client could not be run.
    #[error(transparent)]
    Process(#[from] ProcessError),

    /// The artifact path could not be prepared.
    #[error("artifact error: {0}")]
    Artifact(std::io::Error),
}

/// Top-level harness errors.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Shaping error outside any single experiment (session reconcile).
    #[error("shaping error: {0}")]
    Shaping(#[from] ShapingError),

    /// Process error outside any single experiment (load mode).
    #[error("process error: {0}")]
    Process(#[from] ProcessError),

    /// Status file could not be encoded or decoded.
    #[error("status file error: {0}")]
    Status(#[from] serde_json::Error),

    /// The run was interrupted before it finished.
    #[error("interrupted")]
    Interrupted,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for harness operations.
pub type Result<T> = std::result::Result<T, HarnessError>;
