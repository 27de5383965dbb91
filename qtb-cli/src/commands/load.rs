//! Run one unshaped load test.

use anyhow::{Context, Result};
use qtb_harness::{Config, LoadRequest, Orchestrator};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Run the load command. Returns whether the client exited cleanly.
pub async fn run<F>(
    config_path: &Path,
    duration: u64,
    rate: u32,
    output: PathBuf,
    shutdown: F,
) -> Result<bool>
where
    F: Future<Output = ()>,
{
    if duration == 0 {
        anyhow::bail!("--duration must be at least 1 second");
    }
    if rate == 0 {
        anyhow::bail!("--rate must be at least 1");
    }

    let config = Config::from_file(config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    let orchestrator = Orchestrator::new(config).context("Failed to create session")?;
    let logs = orchestrator.session_dir().to_path_buf();

    let request = LoadRequest {
        duration: Duration::from_secs(duration),
        rate,
        output: output.clone(),
    };
    let outcome = orchestrator
        .run_load(&request, shutdown)
        .await
        .context("Load run failed")?;

    println!("Load run {}", outcome);
    println!("Output: {}", output.display());
    println!("Logs:   {}", logs.display());
    Ok(outcome.is_success())
}
