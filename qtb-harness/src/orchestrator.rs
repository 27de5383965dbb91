//! Experiment orchestrator.
//!
//! Drives an ordered list of experiments one at a time. For each one:
//!
//! 1. verify the path is clean
//! 2. apply the experiment's shaping
//! 3. name the artifact, make sure the server is up, record the rules in
//!    force, run the client to completion or timeout
//! 4. reset shaping, whatever happened in 1-3
//!
//! Teardown actions are registered on a [`CleanupStack`] before anything
//! is acquired and unwound exactly once on every exit path: normal
//! completion, abort, a shutdown signal, or a panic inside the sequence.

use crate::backend::{self, ShapingBackend};
use crate::cleanup::{CleanupAction, CleanupStack};
use crate::config::{validate_experiments, Config, LoadPlan};
use crate::controller::NetworkController;
use crate::error::{ExperimentError, HarnessError, Result, ShapingError};
use crate::namer::ArtifactNamer;
use crate::process::{ClientLaunch, ProcessManager, ServerLaunch};
use crate::status::StatusFile;
use chrono::Utc;
use futures_util::FutureExt;
use qtb_core::{ClientOutcome, ExperimentStatus, FailurePolicy, SessionReport};
use qtb_types::ExperimentSpec;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Server output file inside the session directory.
pub const SERVER_LOG: &str = "server.log";

/// Client output file inside the session directory.
pub const CLIENT_LOG: &str = "client.log";

/// A single unshaped load run.
#[derive(Debug, Clone)]
pub struct LoadRequest {
    /// Client run duration.
    pub duration: Duration,
    /// Requests per second.
    pub rate: u32,
    /// Where the client writes its output.
    pub output: PathBuf,
}

enum Completion {
    Finished,
    Interrupted(&'static str),
    Failed(HarnessError),
}

/// Runs experiment sequences against one session directory.
pub struct Orchestrator {
    config: Config,
    controller: NetworkController,
    processes: ProcessManager,
    namer: ArtifactNamer,
    status: StatusFile,
    cleanup: CleanupStack,
    report: SessionReport,
}

impl Orchestrator {
    /// Orchestrator using the backend selected by `config.network.mode`.
    pub fn new(config: Config) -> Result<Self> {
        let backend = backend::from_config(&config.network);
        Self::with_backend(config, backend)
    }

    /// Orchestrator using an explicit shaping backend.
    ///
    /// Creates the session directory immediately.
    pub fn with_backend(config: Config, backend: Arc<dyn ShapingBackend>) -> Result<Self> {
        let namer = ArtifactNamer::create_session(
            &config.output.root,
            Utc::now(),
            config.output.extension.clone(),
        )?;
        let status = StatusFile::in_session(namer.session_dir());
        let controller = NetworkController::new(config.network.interface.clone(), backend);
        let processes = ProcessManager::new(config.server.stop_grace());
        let report = SessionReport::planned(&config.suite.name, config.suite.on_failure, &[]);

        Ok(Self {
            config,
            controller,
            processes,
            namer,
            status,
            cleanup: CleanupStack::new(),
            report,
        })
    }

    /// Directory holding this session's artifacts, logs and status file.
    pub fn session_dir(&self) -> &Path {
        self.namer.session_dir()
    }

    /// Run `experiments` in order until done or until `shutdown` resolves.
    ///
    /// Always tears down before returning. An `Err` means the session could
    /// not start (invalid experiments, shaping could not be reconciled);
    /// per-experiment failures are reported in the returned report.
    pub async fn run<F>(mut self, experiments: &[ExperimentSpec], shutdown: F) -> Result<SessionReport>
    where
        F: Future<Output = ()>,
    {
        validate_experiments(experiments)?;

        self.report = SessionReport::planned(
            &self.config.suite.name,
            self.config.suite.on_failure,
            experiments,
        );
        self.cleanup.push(CleanupAction::ResetShaping);
        self.cleanup.push(CleanupAction::TerminateProcesses);

        tracing::info!(
            suite = %self.config.suite.name,
            experiments = experiments.len(),
            policy = %self.config.suite.on_failure,
            session = %self.session_dir().display(),
            "session starting"
        );
        self.write_status().await;

        let completion = {
            let sequence = AssertUnwindSafe(self.run_sequence(experiments)).catch_unwind();
            tokio::select! {
                result = sequence => match result {
                    Ok(Ok(())) => Completion::Finished,
                    Ok(Err(e)) => Completion::Failed(e),
                    Err(_) => Completion::Interrupted("harness panicked"),
                },
                () = shutdown => Completion::Interrupted("interrupted by signal"),
            }
        };

        let setup_error = match completion {
            Completion::Finished => None,
            Completion::Interrupted(reason) => {
                tracing::warn!(reason, "session interrupted, cleaning up");
                self.mark_interrupted(reason);
                None
            }
            Completion::Failed(e) => {
                tracing::error!(error = %e, "session could not start");
                self.report.aborted = true;
                self.report.skip_from(0);
                Some(e)
            }
        };

        self.teardown().await;
        self.write_status().await;

        if let Some(e) = setup_error {
            return Err(e);
        }

        let counts = self.report.counts();
        tracing::info!(
            succeeded = counts.succeeded,
            unsuccessful = counts.unsuccessful_runs,
            failed = counts.failed,
            skipped = counts.skipped,
            interrupted = self.report.interrupted,
            "session finished"
        );
        Ok(self.report)
    }

    /// Start the server, run one unshaped client, tear down.
    pub async fn run_load<F>(mut self, request: &LoadRequest, shutdown: F) -> Result<ClientOutcome>
    where
        F: Future<Output = ()>,
    {
        self.cleanup.push(CleanupAction::TerminateProcesses);

        let result = {
            let load = AssertUnwindSafe(self.load_once(request)).catch_unwind();
            tokio::select! {
                result = load => result.unwrap_or(Err(HarnessError::Interrupted)),
                () = shutdown => Err(HarnessError::Interrupted),
            }
        };

        self.teardown().await;
        result
    }

    async fn load_once(&mut self, request: &LoadRequest) -> Result<ClientOutcome> {
        if let Some(parent) = request.output.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let server = self.server_launch();
        self.processes.ensure_server(&server).await?;

        let plan = LoadPlan {
            rate: request.rate,
            duration: request.duration,
            timeout: request.duration + Duration::from_secs(self.config.client.timeout_grace_secs),
        };
        let client = self.client_launch(&plan, &request.output, &[]);
        tracing::info!(
            rate = plan.rate,
            duration_secs = plan.duration.as_secs(),
            output = %request.output.display(),
            "load run starting"
        );

        let outcome = self.processes.run_client(&client, plan.timeout).await?;
        tracing::info!(%outcome, "load run finished");
        Ok(outcome)
    }

    async fn run_sequence(&mut self, experiments: &[ExperimentSpec]) -> Result<()> {
        self.controller.reconcile().await?;

        let policy = self.config.suite.on_failure;
        for (index, spec) in experiments.iter().enumerate() {
            let (status, reset) = self.run_experiment(index, spec).await;

            if let Err(e) = reset {
                tracing::error!(
                    experiment = %spec.id(),
                    error = %e,
                    "shaping could not be removed, stopping sequence"
                );
                self.stop_after(index).await;
                break;
            }

            if status.is_fatal() && policy == FailurePolicy::Abort {
                tracing::warn!(experiment = %spec.id(), "aborting remaining experiments");
                self.stop_after(index).await;
                break;
            }
        }
        Ok(())
    }

    async fn run_experiment(
        &mut self,
        index: usize,
        spec: &ExperimentSpec,
    ) -> (ExperimentStatus, std::result::Result<(), ShapingError>) {
        if let Some(entry) = self.report.entry_mut(index) {
            entry.start();
        }
        self.write_status().await;
        tracing::info!(
            experiment = %spec.id(),
            label = spec.label(),
            shaping = %spec.shaping(),
            "experiment starting"
        );

        let result = self.execute(index, spec).await;
        let reset = self.controller.reset().await;

        let mut status = match result {
            Ok(outcome) => {
                tracing::info!(experiment = %spec.id(), %outcome, "experiment finished");
                ExperimentStatus::from(outcome)
            }
            Err(e) => {
                tracing::error!(experiment = %spec.id(), error = %e, "experiment failed");
                ExperimentStatus::Failed {
                    reason: e.to_string(),
                }
            }
        };
        if let Err(e) = &reset {
            if !status.is_fatal() {
                status = ExperimentStatus::Failed {
                    reason: format!("shaping reset failed: {}", e),
                };
            }
        }

        if let Some(entry) = self.report.entry_mut(index) {
            entry.finish(status.clone());
        }
        self.write_status().await;
        (status, reset)
    }

    async fn execute(
        &mut self,
        index: usize,
        spec: &ExperimentSpec,
    ) -> std::result::Result<ClientOutcome, ExperimentError> {
        if !self.controller.current_state().is_clean() {
            return Err(ShapingError::AlreadyShaped {
                state: self.controller.current_state().as_str(),
            }
            .into());
        }
        self.controller.apply(spec.shaping()).await?;

        let artifact = self
            .namer
            .next_artifact_path(spec.id(), spec.label())
            .await
            .map_err(ExperimentError::Artifact)?;
        if let Some(entry) = self.report.entry_mut(index) {
            entry.artifact = Some(artifact.path.clone());
        }

        let server = self.server_launch();
        self.processes.ensure_server(&server).await?;

        let rules = self.controller.show().await?;
        if let Some(entry) = self.report.entry_mut(index) {
            entry.rules_at_launch = Some(rules);
        }
        self.write_status().await;

        let plan = self.config.client.resolve(spec.load());
        let client = self.client_launch(&plan, &artifact.path, spec.client_args());
        tracing::debug!(experiment = %spec.id(), args = ?client.args, "launching client");

        Ok(self.processes.run_client(&client, plan.timeout).await?)
    }

    async fn stop_after(&mut self, index: usize) {
        self.report.aborted = true;
        self.report.skip_from(index + 1);
        self.write_status().await;
    }

    fn mark_interrupted(&mut self, reason: &str) {
        self.report.interrupted = true;
        for entry in &mut self.report.experiments {
            if entry.status == ExperimentStatus::Running {
                entry.finish(ExperimentStatus::Failed {
                    reason: reason.to_string(),
                });
            }
        }
        self.report.skip_from(0);
    }

    async fn teardown(&mut self) {
        for action in self.cleanup.unwind() {
            match action {
                CleanupAction::TerminateProcesses => self.processes.shutdown().await,
                CleanupAction::ResetShaping => {
                    if let Err(e) = self.controller.reset().await {
                        tracing::error!(
                            interface = %self.controller.interface(),
                            error = %e,
                            "could not remove shaping during cleanup"
                        );
                        self.report.cleanup_error = Some(e.to_string());
                    }
                }
            }
        }
    }

    async fn write_status(&self) {
        if let Err(e) = self.status.write(&self.report).await {
            tracing::warn!(path = %self.status.path().display(), error = %e, "failed to write status file");
        }
    }

    fn server_launch(&self) -> ServerLaunch {
        ServerLaunch {
            program: self.config.server.program.clone(),
            args: self.config.server.launch_args(),
            log_path: Some(self.session_dir().join(SERVER_LOG)),
            startup_grace: self.config.server.startup_grace(),
        }
    }

    fn client_launch(&self, plan: &LoadPlan, output: &Path, extra: &[String]) -> ClientLaunch {
        let url = self.config.client.url_for(&self.config.server);
        ClientLaunch {
            program: self.config.client.program.clone(),
            args: self.config.client.launch_args(&url, plan, output, extra),
            log_path: Some(self.session_dir().join(CLIENT_LOG)),
        }
    }
}
