//! Write a starter suite file.

use anyhow::{Context, Result};
use qtb_harness::config::STARTER_SUITE;
use std::path::Path;

/// Run the init command.
pub async fn run(path: &Path, force: bool) -> Result<()> {
    if !force && tokio::fs::try_exists(path).await.unwrap_or(false) {
        anyhow::bail!(
            "{} already exists. Use --force to overwrite it.",
            path.display()
        );
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .context("Failed to create parent directory")?;
    }
    tokio::fs::write(path, STARTER_SUITE)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!("Suite written to {}", path.display());
    println!();
    println!("Next steps:");
    println!("  1. Point [server] and [client] at your implementation");
    println!("  2. Check the plan:  qtb run {} --dry-run", path.display());
    println!("  3. Run it for real: qtb run {}", path.display());

    Ok(())
}
