//! # qtb
//!
//! Runs a protocol client/server pair under a sequence of emulated network
//! conditions and collects one artifact per run.
//!
//! ## Commands
//!
//! - `run`: Run a suite of experiments
//! - `load`: Run a single unshaped load test
//! - `show`: Print the status of a session
//! - `init`: Write a starter suite file
//!
//! ## Example
//!
//! ```bash
//! # Write a starter suite and edit it
//! qtb init qtb.toml
//!
//! # Check what would happen without touching tc
//! qtb run qtb.toml --dry-run
//!
//! # Run two ad-hoc experiments, stopping at the first failure
//! qtb run qtb.toml -e 0:baseline -e 1:lossy:delay=25ms,loss=2 --on-failure abort
//!
//! # Inspect the result
//! qtb show runs/20260114-093012
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use qtb_core::FailurePolicy;
use qtb_types::ExperimentSpec;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{init, load, run, show};

/// Network experiment harness for protocol implementations.
#[derive(Parser, Debug)]
#[command(name = "qtb")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Log at debug level (RUST_LOG overrides)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a suite of experiments
    Run {
        /// Suite file
        suite: PathBuf,

        /// Experiment to run instead of the suite's list (repeatable)
        #[arg(long = "experiment", short = 'e', value_name = "ID:LABEL[:delay=..,loss=..,rate=..]")]
        experiments: Vec<ExperimentSpec>,

        /// What to do after a failed experiment
        #[arg(long, value_name = "continue|abort")]
        on_failure: Option<FailurePolicy>,

        /// Directory to create the session directory in
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Log tc commands instead of running them
        #[arg(long)]
        dry_run: bool,
    },

    /// Run one unshaped load test
    Load {
        /// Client run duration in seconds
        #[arg(long)]
        duration: u64,

        /// Requests per second
        #[arg(long)]
        rate: u32,

        /// Client output file
        #[arg(long)]
        output: PathBuf,

        /// Suite file providing the server and client settings
        #[arg(long, default_value = "qtb.toml")]
        config: PathBuf,
    },

    /// Print the status of a session
    Show {
        /// Session directory
        session_dir: PathBuf,
    },

    /// Write a starter suite file
    Init {
        /// Where to write it
        #[arg(default_value = "qtb.toml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let success = match cli.command {
        Commands::Run {
            suite,
            experiments,
            on_failure,
            output_dir,
            dry_run,
        } => {
            let args = run::RunArgs {
                suite,
                experiments,
                on_failure,
                output_dir,
                dry_run,
            };
            run::run(args, shutdown_signal()).await?
        }
        Commands::Load {
            duration,
            rate,
            output,
            config,
        } => load::run(&config, duration, rate, output, shutdown_signal()).await?,
        Commands::Show { session_dir } => {
            show::run(&session_dir).await?;
            true
        }
        Commands::Init { path, force } => {
            init::run(&path, force).await?;
            true
        }
    };

    Ok(if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Logs go to stderr so stdout carries only the human-readable summary.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "cannot listen for SIGTERM, only Ctrl+C will interrupt");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => tracing::info!("received SIGINT, cleaning up"),
        _ = terminate.recv() => tracing::info!("received SIGTERM, cleaning up"),
    }
}
