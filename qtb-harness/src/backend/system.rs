//! Backend that runs the host's `tc` binary.

use super::{ShapingBackend, TcOutput};
use crate::error::ShapingError;
use crate::privilege::PrivilegeProvider;
use async_trait::async_trait;
use qtb_core::TcCommand;
use std::process::Stdio;
use std::sync::Arc;

/// Runs `tc` through `tokio::process`, prefixed as the privilege provider says.
pub struct SystemTc {
    program: String,
    privilege: Arc<dyn PrivilegeProvider>,
}

impl SystemTc {
    /// Backend running `tc` from `PATH`.
    pub fn new(privilege: Arc<dyn PrivilegeProvider>) -> Self {
        Self::with_program("tc", privilege)
    }

    /// Backend running a specific `tc` binary.
    pub fn with_program(program: impl Into<String>, privilege: Arc<dyn PrivilegeProvider>) -> Self {
        Self {
            program: program.into(),
            privilege,
        }
    }
}

impl std::fmt::Debug for SystemTc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemTc")
            .field("program", &self.program)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ShapingBackend for SystemTc {
    async fn run(&self, command: &TcCommand) -> Result<TcOutput, ShapingError> {
        let prefix = self.privilege.command_prefix().await?;

        let mut cmd = match prefix.split_first() {
            Some((helper, helper_args)) => {
                let mut cmd = tokio::process::Command::new(helper);
                cmd.args(helper_args).arg(&self.program);
                cmd
            }
            None => tokio::process::Command::new(&self.program),
        };

        let output = cmd
            .args(command.args())
            .stdin(Stdio::null())
            .output()
            .await?;

        Ok(TcOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }

    fn name(&self) -> &'static str {
        "system"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::privilege::Direct;

    #[tokio::test]
    async fn captures_output_and_exit_code() {
        // `echo` stands in for tc: prints its arguments and exits 0.
        let backend = SystemTc::with_program("echo", Arc::new(Direct));
        let out = backend.run(&TcCommand::show("lo")).await.unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "qdisc show dev lo");
    }

    #[tokio::test]
    async fn non_zero_exit_is_not_an_error() {
        let backend = SystemTc::with_program("false", Arc::new(Direct));
        let out = backend.run(&TcCommand::delete_root("lo")).await.unwrap();
        assert!(!out.success());
    }

    #[tokio::test]
    async fn missing_binary_is_spawn_error() {
        let backend = SystemTc::with_program("/nonexistent/tc", Arc::new(Direct));
        let err = backend.run(&TcCommand::show("lo")).await.unwrap_err();
        assert!(matches!(err, ShapingError::Spawn(_)));
    }

    struct Prefixed;

    #[async_trait]
    impl PrivilegeProvider for Prefixed {
        async fn command_prefix(&self) -> Result<Vec<String>, ShapingError> {
            Ok(vec!["env".into()])
        }
    }

    #[tokio::test]
    async fn prefix_is_prepended() {
        let backend = SystemTc::with_program("echo", Arc::new(Prefixed));
        let out = backend.run(&TcCommand::show("eth0")).await.unwrap();
        assert_eq!(out.stdout.trim(), "qdisc show dev eth0");
    }
}
