//! Process lifecycle manager.
//!
//! Starts the protocol server (at most one per session) and the client
//! (one run at a time), bounds the client's runtime, and guarantees nothing
//! it started outlives the session.
//!
//! Every child is registered as live *before* the first await that follows
//! its spawn, so a run future dropped mid-wait still leaves the child where
//! [`ProcessManager::shutdown`] can find it. Children are also spawned with
//! `kill_on_drop`, so dropping the manager kills them.

use crate::error::ProcessError;
use chrono::{DateTime, Utc};
use qtb_core::ClientOutcome;
use std::fmt;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::time::Instant;

/// Role of a managed process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessKind {
    /// The protocol server.
    Server,
    /// The load-generating client.
    Client,
}

impl fmt::Display for ProcessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Server => write!(f, "server"),
            Self::Client => write!(f, "client"),
        }
    }
}

/// Snapshot of a managed process, safe to hand out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessHandle {
    /// OS process id.
    pub pid: u32,
    /// Role.
    pub kind: ProcessKind,
    /// Spawn time.
    pub started_at: DateTime<Utc>,
}

/// A child process owned by the manager.
#[derive(Debug)]
pub struct ManagedProcess {
    handle: ProcessHandle,
    child: Child,
}

impl ManagedProcess {
    fn spawn(kind: ProcessKind, command: &mut Command) -> Result<Self, ProcessError> {
        let child = command
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ProcessError::StartFailure {
                kind,
                detail: e.to_string(),
            })?;

        let pid = child.id().ok_or_else(|| ProcessError::StartFailure {
            kind,
            detail: "exited before its pid could be read".into(),
        })?;

        tracing::debug!(pid, %kind, "spawned");
        Ok(Self {
            handle: ProcessHandle {
                pid,
                kind,
                started_at: Utc::now(),
            },
            child,
        })
    }

    /// Snapshot of this process.
    pub fn handle(&self) -> &ProcessHandle {
        &self.handle
    }

    /// Exit status if the process has already exited.
    fn exited(&mut self) -> Result<Option<ExitStatus>, ProcessError> {
        Ok(self.child.try_wait()?)
    }

    /// Reap check, then a signal-zero probe.
    fn is_alive(&mut self) -> Result<bool, ProcessError> {
        if self.exited()?.is_some() {
            return Ok(false);
        }
        Ok(signal(self.handle.pid, 0))
    }

    /// SIGTERM, wait until `deadline`, then SIGKILL.
    async fn terminate(&mut self, deadline: Instant) -> Result<(), ProcessError> {
        if self.exited()?.is_some() {
            return Ok(());
        }

        signal(self.handle.pid, libc::SIGTERM);
        match tokio::time::timeout_at(deadline, self.child.wait()).await {
            Ok(status) => {
                let status = status?;
                tracing::debug!(pid = self.handle.pid, kind = %self.handle.kind, %status, "stopped");
            }
            Err(_) => {
                tracing::warn!(pid = self.handle.pid, kind = %self.handle.kind, "did not stop after SIGTERM, killing");
                self.child.kill().await?;
            }
        }
        Ok(())
    }
}

/// Send `sig` to `pid`. True if the process exists (for signal 0) or the
/// signal was delivered.
fn signal(pid: u32, sig: libc::c_int) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    // SAFETY: kill has no memory-safety preconditions; pid is one of our children.
    let rc = unsafe { libc::kill(pid, sig) };
    rc == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

/// How to start the server.
#[derive(Debug, Clone)]
pub struct ServerLaunch {
    /// Executable.
    pub program: String,
    /// Arguments.
    pub args: Vec<String>,
    /// File receiving stdout and stderr (discarded when `None`).
    pub log_path: Option<PathBuf>,
    /// Time the server must survive before it counts as started.
    pub startup_grace: Duration,
}

/// How to start one client run.
#[derive(Debug, Clone)]
pub struct ClientLaunch {
    /// Executable.
    pub program: String,
    /// Arguments.
    pub args: Vec<String>,
    /// File receiving stdout and stderr (discarded when `None`).
    pub log_path: Option<PathBuf>,
}

async fn command(program: &str, args: &[String], log_path: Option<&Path>) -> Result<Command, ProcessError> {
    let mut cmd = Command::new(program);
    cmd.args(args).stdin(Stdio::null());

    match log_path {
        Some(path) => {
            let log = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await?
                .into_std()
                .await;
            cmd.stdout(Stdio::from(log.try_clone()?))
                .stderr(Stdio::from(log));
        }
        None => {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
        }
    }
    Ok(cmd)
}

/// Owns the server and the running client.
#[derive(Debug)]
pub struct ProcessManager {
    server: Option<ManagedProcess>,
    client: Option<ManagedProcess>,
    stop_grace: Duration,
}

impl ProcessManager {
    /// Manager allowing `stop_grace` between SIGTERM and SIGKILL.
    pub fn new(stop_grace: Duration) -> Self {
        Self {
            server: None,
            client: None,
            stop_grace,
        }
    }

    /// Handles of every process currently managed.
    pub fn live(&self) -> Vec<ProcessHandle> {
        self.server
            .iter()
            .chain(self.client.iter())
            .map(|p| p.handle.clone())
            .collect()
    }

    /// Start the server unless one is already running.
    ///
    /// A server that has died since the last call is replaced. A new
    /// server that exits within `startup_grace` is a start failure.
    pub async fn ensure_server(&mut self, launch: &ServerLaunch) -> Result<ProcessHandle, ProcessError> {
        if let Some(server) = self.server.as_mut() {
            if server.is_alive()? {
                return Ok(server.handle.clone());
            }
            tracing::warn!(pid = server.handle.pid, "server exited, restarting");
            self.server = None;
        }

        let mut cmd = command(&launch.program, &launch.args, launch.log_path.as_deref()).await?;
        let server = self
            .server
            .insert(ManagedProcess::spawn(ProcessKind::Server, &mut cmd)?);

        tokio::time::sleep(launch.startup_grace).await;

        if let Some(status) = server.exited()? {
            self.server = None;
            return Err(ProcessError::StartFailure {
                kind: ProcessKind::Server,
                detail: format!("exited during startup ({})", status),
            });
        }
        if !server.is_alive()? {
            self.server = None;
            return Err(ProcessError::StartFailure {
                kind: ProcessKind::Server,
                detail: "not running after startup grace".into(),
            });
        }

        tracing::info!(pid = server.handle.pid, program = %launch.program, "server started");
        Ok(server.handle.clone())
    }

    /// Run one client to completion or until `timeout`.
    ///
    /// On timeout the client gets SIGTERM, then SIGKILL after the stop
    /// grace, and the outcome is [`ClientOutcome::TimedOut`].
    pub async fn run_client(&mut self, launch: &ClientLaunch, timeout: Duration) -> Result<ClientOutcome, ProcessError> {
        if let Some(mut stale) = self.client.take() {
            tracing::warn!(pid = stale.handle.pid, "stopping leftover client");
            stale.terminate(Instant::now() + self.stop_grace).await?;
        }

        let mut cmd = command(&launch.program, &launch.args, launch.log_path.as_deref()).await?;
        let stop_grace = self.stop_grace;
        let client = self
            .client
            .insert(ManagedProcess::spawn(ProcessKind::Client, &mut cmd)?);
        let pid = client.handle.pid;

        let outcome = match tokio::time::timeout(timeout, client.child.wait()).await {
            Ok(status) => {
                let status = status?;
                ClientOutcome::from_exit(status.code(), status.signal())
            }
            Err(_) => {
                tracing::warn!(pid, timeout_secs = timeout.as_secs_f64(), "client timed out");
                client.terminate(Instant::now() + stop_grace).await?;
                ClientOutcome::TimedOut
            }
        };

        self.client = None;
        tracing::debug!(pid, %outcome, "client finished");
        Ok(outcome)
    }

    /// Stop every managed process: SIGTERM all, wait the stop grace, SIGKILL
    /// stragglers.
    pub async fn shutdown(&mut self) {
        let mut processes: Vec<ManagedProcess> =
            self.client.take().into_iter().chain(self.server.take()).collect();
        if processes.is_empty() {
            return;
        }

        let deadline = Instant::now() + self.stop_grace;
        for process in &mut processes {
            if let Err(e) = process.terminate(deadline).await {
                tracing::error!(pid = process.handle.pid, error = %e, "failed to stop process");
            }
        }
        tracing::info!(count = processes.len(), "managed processes stopped");
    }
}
