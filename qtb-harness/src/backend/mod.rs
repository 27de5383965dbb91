//! Shaping backends: who actually executes `tc` commands.
//!
//! The network controller decides which commands to run; a
//! [`ShapingBackend`] runs them and reports what `tc` said. Two backends
//! exist:
//! - [`SystemTc`] runs the real `tc` binary, prefixed by whatever the
//!   injected [`PrivilegeProvider`](crate::privilege::PrivilegeProvider)
//!   requires
//! - [`SimulatedShaper`] keeps an in-memory qdisc table (dry runs and tests)

mod simulated;
mod system;

pub use simulated::SimulatedShaper;
pub use system::SystemTc;

use crate::config::{NetworkConfig, NetworkMode};
use crate::error::ShapingError;
use crate::privilege::EscalationChain;
use async_trait::async_trait;
use qtb_core::TcCommand;
use std::sync::Arc;

/// What one `tc` invocation produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcOutput {
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
    /// Exit code (0 = success).
    pub exit_code: i32,
}

impl TcOutput {
    /// Returns true if the command succeeded (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Executes traffic-control commands.
///
/// A non-zero `tc` exit is *not* an `Err`: it comes back as a [`TcOutput`]
/// so the caller can tell "nothing to delete" apart from real failures.
/// `Err` is reserved for not being able to run `tc` at all.
#[async_trait]
pub trait ShapingBackend: Send + Sync {
    /// Run one command.
    async fn run(&self, command: &TcCommand) -> Result<TcOutput, ShapingError>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// Backend selected by the `[network]` section.
pub fn from_config(network: &NetworkConfig) -> Arc<dyn ShapingBackend> {
    match network.mode {
        NetworkMode::System => Arc::new(SystemTc::new(Arc::new(EscalationChain::new(
            network.elevate_with.clone(),
        )))),
        NetworkMode::DryRun => Arc::new(SimulatedShaper::new()),
    }
}
