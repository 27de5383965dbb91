//! Run artifact namer.
//!
//! One namer per session: it owns the session directory and hands out
//! artifact paths that cannot collide within the process lifetime, even for
//! requests landing in the same millisecond.
//!
//! [`ArtifactNamer::create_session`] is synchronous: it runs once while the
//! orchestrator is constructed, before any experiment is driven.

use chrono::{DateTime, Utc};
use qtb_core::{artifact_file_name, session_dir_name};
use qtb_types::ExperimentId;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// A named output location for one experiment run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunArtifact {
    /// Experiment the artifact belongs to.
    pub experiment_id: ExperimentId,
    /// Time the name was issued.
    pub timestamp: DateTime<Utc>,
    /// Full path inside the session directory.
    pub path: PathBuf,
}

/// Issues artifact paths inside one session directory.
#[derive(Debug)]
pub struct ArtifactNamer {
    session_dir: PathBuf,
    extension: String,
    seq: AtomicU64,
}

impl ArtifactNamer {
    /// Namer writing into an existing (or to-be-created) `session_dir`.
    pub fn new(session_dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            session_dir: session_dir.into(),
            extension: extension.into(),
            seq: AtomicU64::new(0),
        }
    }

    /// Create a fresh session directory under `root` and a namer for it.
    ///
    /// The directory is named after `started_at`; if that name is taken a
    /// numeric suffix is added (`-1`, `-2`, ...).
    pub fn create_session(
        root: &Path,
        started_at: DateTime<Utc>,
        extension: impl Into<String>,
    ) -> io::Result<Self> {
        std::fs::create_dir_all(root)?;
        let base = session_dir_name(started_at);

        let mut attempt = 0u32;
        loop {
            let name = if attempt == 0 {
                base.clone()
            } else {
                format!("{}-{}", base, attempt)
            };
            let candidate = root.join(name);
            match std::fs::create_dir(&candidate) {
                Ok(()) => {
                    tracing::info!(dir = %candidate.display(), "session directory created");
                    return Ok(Self::new(candidate, extension));
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(e),
            }
        }
    }

    /// Session directory.
    pub fn session_dir(&self) -> &Path {
        &self.session_dir
    }

    /// Issue the next artifact path for an experiment.
    ///
    /// Ensures the session directory exists; the file itself is left for the
    /// client to create.
    pub async fn next_artifact_path(
        &self,
        experiment_id: ExperimentId,
        label: &str,
    ) -> io::Result<RunArtifact> {
        tokio::fs::create_dir_all(&self.session_dir).await?;

        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let timestamp = Utc::now();
        let path = self
            .session_dir
            .join(artifact_file_name(experiment_id, label, timestamp, seq, &self.extension));

        tracing::debug!(experiment = %experiment_id, path = %path.display(), "artifact named");
        Ok(RunArtifact {
            experiment_id,
            timestamp,
            path,
        })
    }
}
