//! Network condition controller.
//!
//! Owns the shaping state of one interface and is the only thing that
//! changes it. [`apply`] moves `Clean -> Applying` before its first `tc`
//! command and to `Shaped` once all of them succeeded; a successful
//! [`reset`] moves any non-clean state back to `Clean`. A failed apply
//! removes whatever was partially installed and is `Clean` again once that
//! removal succeeds.
//!
//! If an apply future is dropped midway the state stays `Applying`, so a
//! later reset still deletes the partial rules.
//!
//! [`apply`]: NetworkController::apply
//! [`reset`]: NetworkController::reset

use crate::backend::{ShapingBackend, TcOutput};
use crate::error::ShapingError;
use qtb_core::netem::{is_absent_qdisc_error, is_permission_error};
use qtb_core::{ShapingState, TcCommand, TcPlan};
use qtb_types::ShapingParams;
use std::sync::Arc;

/// Installs and removes shaping rules on one interface.
pub struct NetworkController {
    interface: String,
    backend: Arc<dyn ShapingBackend>,
    state: ShapingState,
}

impl NetworkController {
    /// Controller for `interface`, starting `Clean`.
    pub fn new(interface: impl Into<String>, backend: Arc<dyn ShapingBackend>) -> Self {
        Self {
            interface: interface.into(),
            backend,
            state: ShapingState::Clean,
        }
    }

    /// Managed interface.
    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// Current shaping state.
    pub fn current_state(&self) -> &ShapingState {
        &self.state
    }

    /// Install `params`.
    ///
    /// Fails with [`ShapingError::AlreadyShaped`] without touching the
    /// interface unless the state is `Clean`. Empty params install nothing
    /// but still move the state to `Shaped`. If a command fails and the
    /// rollback fails too, the state stays `Applying`.
    pub async fn apply(&mut self, params: &ShapingParams) -> Result<(), ShapingError> {
        if !self.state.is_clean() {
            return Err(ShapingError::AlreadyShaped {
                state: self.state.as_str(),
            });
        }

        let plan = TcPlan::install(&self.interface, params);
        self.state = ShapingState::Applying {
            params: params.clone(),
        };
        for command in plan.commands() {
            if let Err(e) = self.exec(command).await {
                tracing::error!(interface = %self.interface, error = %e, "failed to apply shaping");
                self.remove_partial().await;
                return Err(e);
            }
        }

        tracing::info!(interface = %self.interface, shaping = %params, "shaping applied");
        self.state = ShapingState::Shaped {
            params: params.clone(),
        };
        Ok(())
    }

    /// Remove shaping. Idempotent: a `Clean` controller does nothing.
    pub async fn reset(&mut self) -> Result<(), ShapingError> {
        if self.state.is_clean() {
            tracing::debug!(interface = %self.interface, "reset: already clean");
            return Ok(());
        }

        self.delete_root().await?;
        tracing::info!(interface = %self.interface, "shaping removed");
        self.state = ShapingState::Clean;
        Ok(())
    }

    /// Remove any rules on the interface regardless of tracked state.
    ///
    /// Run once at session start so rules left by a crashed session do not
    /// leak into the first experiment.
    pub async fn reconcile(&mut self) -> Result<(), ShapingError> {
        self.delete_root().await?;
        tracing::debug!(interface = %self.interface, "interface reconciled to clean");
        self.state = ShapingState::Clean;
        Ok(())
    }

    /// Installed rules as reported by `tc qdisc show`.
    pub async fn show(&self) -> Result<String, ShapingError> {
        let output = self.exec(&TcCommand::show(&self.interface)).await?;
        Ok(output.stdout)
    }

    async fn delete_root(&self) -> Result<(), ShapingError> {
        let command = TcCommand::delete_root(&self.interface);
        let output = self.run_logged(&command).await?;

        if output.success() || is_absent_qdisc_error(&output.stderr) {
            Ok(())
        } else {
            Err(command_error(&command, output))
        }
    }

    async fn remove_partial(&mut self) {
        match self.delete_root().await {
            Ok(()) => self.state = ShapingState::Clean,
            Err(e) => {
                tracing::warn!(interface = %self.interface, error = %e, "best-effort removal failed")
            }
        }
    }

    async fn exec(&self, command: &TcCommand) -> Result<TcOutput, ShapingError> {
        let output = self.run_logged(command).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(command_error(command, output))
        }
    }

    async fn run_logged(&self, command: &TcCommand) -> Result<TcOutput, ShapingError> {
        tracing::debug!(backend = self.backend.name(), command = %command, "tc");
        self.backend.run(command).await
    }
}

fn command_error(command: &TcCommand, output: TcOutput) -> ShapingError {
    if is_permission_error(&output.stderr) {
        ShapingError::InsufficientPrivilege {
            detail: format!("{}: {}", command, output.stderr.trim()),
        }
    } else {
        ShapingError::CommandFailed {
            command: command.to_string(),
            exit_code: output.exit_code,
            stderr: output.stderr.trim().to_string(),
        }
    }
}
