//! Session status file (`status.json`).
//!
//! Rewritten after every experiment transition so an interrupted session
//! still leaves an accurate record behind. Writes go through a temporary
//! file and a rename, so readers never see a half-written file.

use crate::error::Result;
use qtb_core::SessionReport;
use std::path::{Path, PathBuf};

/// File name inside the session directory.
pub const STATUS_FILE_NAME: &str = "status.json";

/// Status file of one session.
#[derive(Debug, Clone)]
pub struct StatusFile {
    path: PathBuf,
}

impl StatusFile {
    /// Status file inside `session_dir`.
    pub fn in_session(session_dir: &Path) -> Self {
        Self {
            path: session_dir.join(STATUS_FILE_NAME),
        }
    }

    /// Path of the file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the file's content with `report`.
    pub async fn write(&self, report: &SessionReport) -> Result<()> {
        let json = serde_json::to_vec_pretty(report)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Read a report back.
    pub async fn read(&self) -> Result<SessionReport> {
        let bytes = tokio::fs::read(&self.path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qtb_core::{ExperimentStatus, FailurePolicy};
    use qtb_types::{ExperimentSpec, ShapingParams};
    use tempfile::tempdir;

    #[tokio::test]
    async fn write_then_read() {
        let dir = tempdir().unwrap();
        let status = StatusFile::in_session(dir.path());
        let specs = vec![ExperimentSpec::new(0, "baseline", ShapingParams::none())];
        let mut report = SessionReport::planned("suite", FailurePolicy::Continue, &specs);

        status.write(&report).await.unwrap();
        report.experiments[0].finish(ExperimentStatus::TimedOut);
        status.write(&report).await.unwrap();

        let back = status.read().await.unwrap();
        assert_eq!(back.experiments[0].status, ExperimentStatus::TimedOut);
        assert!(!dir.path().join("status.json.tmp").exists());
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let dir = tempdir().unwrap();
        let status = StatusFile::in_session(&dir.path().join("nope"));
        assert!(matches!(
            status.read().await,
            Err(crate::error::HarnessError::Io(_))
        ));
    }
}
