//! Classification of finished client runs.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a client run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClientOutcome {
    /// Process exited on its own with this exit code.
    Completed {
        /// Exit code reported by the process.
        exit_code: i32,
    },
    /// Process exceeded its time allowance and was terminated by the harness.
    TimedOut,
    /// Process was terminated by a signal it did not ask for.
    Crashed {
        /// Terminating signal number.
        signal: i32,
    },
}

impl ClientOutcome {
    /// Classify a wait status split into its exit code and terminating signal.
    ///
    /// A status carries one or the other; a status with neither (not
    /// observable on Unix) is reported as a crash with signal 0.
    pub fn from_exit(code: Option<i32>, signal: Option<i32>) -> Self {
        match (code, signal) {
            (Some(exit_code), _) => Self::Completed { exit_code },
            (None, Some(signal)) => Self::Crashed { signal },
            (None, None) => Self::Crashed { signal: 0 },
        }
    }

    /// True only for a zero exit code.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed { exit_code: 0 })
    }
}

impl fmt::Display for ClientOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed { exit_code } => write!(f, "completed (exit {})", exit_code),
            Self::TimedOut => write!(f, "timed out"),
            Self::Crashed { signal } => write!(f, "crashed (signal {})", signal),
        }
    }
}
