//! Print the status of a session.

use anyhow::{Context, Result};
use qtb_core::SessionReport;
use qtb_harness::StatusFile;
use std::fmt::Write;
use std::path::Path;

/// Run the show command.
pub async fn run(session_dir: &Path) -> Result<()> {
    let status = StatusFile::in_session(session_dir);
    let report = status
        .read()
        .await
        .with_context(|| format!("Failed to read {}", status.path().display()))?;

    print!("{}", format_report(&report));
    Ok(())
}

/// Render a report as a table with a summary line.
pub fn format_report(report: &SessionReport) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "Suite:   {}", report.suite);
    let _ = writeln!(out, "Started: {}", report.started_at.format("%Y-%m-%d %H:%M:%S UTC"));
    let _ = writeln!(out, "Policy:  {}", report.policy);
    let _ = writeln!(out);
    let _ = writeln!(out, "  {:>4}  {:<20}  {:<24}  ARTIFACT", "ID", "LABEL", "STATUS");

    for entry in &report.experiments {
        let artifact = entry
            .artifact
            .as_ref()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "-".to_string());
        let _ = writeln!(
            out,
            "  {:>4}  {:<20}  {:<24}  {}",
            entry.id.to_string(),
            entry.label,
            entry.status.to_string(),
            artifact
        );
    }

    let counts = report.counts();
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "{} succeeded, {} unsuccessful, {} failed, {} skipped",
        counts.succeeded, counts.unsuccessful_runs, counts.failed, counts.skipped
    );
    if report.aborted {
        let _ = writeln!(out, "Sequence stopped early after a failure.");
    }
    if report.interrupted {
        let _ = writeln!(out, "Session was interrupted.");
    }
    if let Some(error) = &report.cleanup_error {
        let _ = writeln!(out, "WARNING: cleanup failed, shaping may still be installed: {}", error);
    }
    out
}
