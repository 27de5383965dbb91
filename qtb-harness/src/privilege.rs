//! Privilege acquisition for traffic-control commands.
//!
//! Installing qdiscs needs `CAP_NET_ADMIN`. Rather than assuming the harness
//! is run under `sudo`, the system backend asks a [`PrivilegeProvider`] for
//! a command prefix to put in front of every `tc` invocation.
//!
//! The default [`EscalationChain`] tries, in order:
//! 1. run directly when the effective uid is 0,
//! 2. run through a non-interactive elevation helper (`sudo -n`) if the
//!    helper succeeds on a no-op probe,
//! 3. otherwise report [`ShapingError::InsufficientPrivilege`].

use crate::error::ShapingError;
use async_trait::async_trait;
use std::process::Stdio;
use tokio::sync::OnceCell;

/// Supplies the prefix under which privileged commands are run.
#[async_trait]
pub trait PrivilegeProvider: Send + Sync {
    /// Command prefix (empty for direct execution).
    async fn command_prefix(&self) -> Result<Vec<String>, ShapingError>;
}

/// Runs commands directly, assuming the process already holds the capability.
#[derive(Debug, Clone, Copy, Default)]
pub struct Direct;

#[async_trait]
impl PrivilegeProvider for Direct {
    async fn command_prefix(&self) -> Result<Vec<String>, ShapingError> {
        Ok(Vec::new())
    }
}

#[derive(Debug, Clone)]
enum Escalation {
    Direct,
    Helper(Vec<String>),
    Denied(String),
}

/// Root, then elevation helper, then failure. Resolved once and cached.
#[derive(Debug)]
pub struct EscalationChain {
    helper: Vec<String>,
    resolved: OnceCell<Escalation>,
}

impl EscalationChain {
    /// Chain using `helper` (e.g. `["sudo", "-n"]`) as the fallback.
    ///
    /// An empty helper disables the fallback.
    pub fn new(helper: Vec<String>) -> Self {
        Self {
            helper,
            resolved: OnceCell::new(),
        }
    }

    async fn resolve(&self) -> Escalation {
        if effective_uid_is_root() {
            tracing::debug!("running tc directly (effective uid 0)");
            return Escalation::Direct;
        }

        let Some((program, args)) = self.helper.split_first() else {
            return Escalation::Denied("not root and no elevation helper configured".into());
        };

        let probe = tokio::process::Command::new(program)
            .args(args)
            .arg("true")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        match probe {
            Ok(status) if status.success() => {
                tracing::warn!(helper = %self.helper.join(" "), "not root, elevating tc through helper");
                Escalation::Helper(self.helper.clone())
            }
            Ok(status) => Escalation::Denied(format!(
                "not root and '{} true' failed ({})",
                self.helper.join(" "),
                status
            )),
            Err(e) => Escalation::Denied(format!(
                "not root and '{}' could not be executed: {}",
                program, e
            )),
        }
    }
}

impl Default for EscalationChain {
    fn default() -> Self {
        Self::new(vec!["sudo".into(), "-n".into()])
    }
}

#[async_trait]
impl PrivilegeProvider for EscalationChain {
    async fn command_prefix(&self) -> Result<Vec<String>, ShapingError> {
        match self.resolved.get_or_init(|| self.resolve()).await {
            Escalation::Direct => Ok(Vec::new()),
            Escalation::Helper(prefix) => Ok(prefix.clone()),
            Escalation::Denied(detail) => Err(ShapingError::InsufficientPrivilege {
                detail: detail.clone(),
            }),
        }
    }
}

fn effective_uid_is_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() == 0 }
}
