//! Run a suite of experiments.

use super::show::format_report;
use anyhow::{Context, Result};
use qtb_core::FailurePolicy;
use qtb_harness::{Config, NetworkMode, Orchestrator};
use qtb_types::ExperimentSpec;
use std::future::Future;
use std::path::PathBuf;

/// Arguments for the run command.
#[derive(Debug)]
pub struct RunArgs {
    /// Suite file.
    pub suite: PathBuf,
    /// Experiments replacing the suite's list when non-empty.
    pub experiments: Vec<ExperimentSpec>,
    /// Failure policy override.
    pub on_failure: Option<FailurePolicy>,
    /// Output root override.
    pub output_dir: Option<PathBuf>,
    /// Force the dry-run backend.
    pub dry_run: bool,
}

/// Run the suite. Returns whether the session succeeded.
pub async fn run<F>(args: RunArgs, shutdown: F) -> Result<bool>
where
    F: Future<Output = ()>,
{
    let mut config = Config::from_file(&args.suite)
        .with_context(|| format!("Failed to load suite {}", args.suite.display()))?;
    apply_overrides(&mut config, &args);

    let experiments = if args.experiments.is_empty() {
        std::mem::take(&mut config.experiments)
    } else {
        args.experiments
    };
    if experiments.is_empty() {
        anyhow::bail!(
            "No experiments to run. Add [[experiments]] to {} or pass --experiment.",
            args.suite.display()
        );
    }

    let orchestrator = Orchestrator::new(config).context("Failed to create session")?;
    println!("Session: {}", orchestrator.session_dir().display());

    let report = orchestrator
        .run(&experiments, shutdown)
        .await
        .context("Session failed")?;

    println!();
    print!("{}", format_report(&report));
    Ok(report.is_success())
}

fn apply_overrides(config: &mut Config, args: &RunArgs) {
    if let Some(policy) = args.on_failure {
        config.suite.on_failure = policy;
    }
    if let Some(dir) = &args.output_dir {
        config.output.root = dir.clone();
    }
    if args.dry_run {
        config.network.mode = NetworkMode::DryRun;
    }
}
