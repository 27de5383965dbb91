//! Naming rules for session directories and run artifacts.
//!
//! Artifact file names embed the experiment id, a sanitized label, a
//! millisecond timestamp and a per-session sequence number:
//!
//! ```text
//! 001-lossy-20260114T093012.417Z-0002.qlog
//! ```
//!
//! The sequence number is what guarantees uniqueness; the timestamp keeps
//! names sortable and human-correlatable.

use chrono::{DateTime, Utc};
use qtb_types::ExperimentId;

/// Longest sanitized label kept in a file name.
pub const MAX_LABEL_LEN: usize = 48;

/// Label used when sanitization leaves nothing.
const EMPTY_LABEL: &str = "unlabeled";

/// Reduce a free-form label to a file-name-safe token.
///
/// Keeps ASCII alphanumerics, `-` and `_`; every run of other characters
/// becomes a single `_`. Leading/trailing separators are trimmed.
pub fn sanitize_label(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    let mut pending_sep = false;

    for c in label.chars() {
        if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(c);
        } else {
            pending_sep = true;
        }
    }

    let trimmed = out.trim_matches(|c| c == '_' || c == '-');
    let truncated: String = trimmed.chars().take(MAX_LABEL_LEN).collect();
    let truncated = truncated.trim_end_matches(|c| c == '_' || c == '-');

    if truncated.is_empty() {
        EMPTY_LABEL.to_string()
    } else {
        truncated.to_string()
    }
}

/// File name for one run artifact.
pub fn artifact_file_name(
    experiment_id: ExperimentId,
    label: &str,
    timestamp: DateTime<Utc>,
    seq: u64,
    extension: &str,
) -> String {
    format!(
        "{:03}-{}-{}-{:04}.{}",
        experiment_id.value(),
        sanitize_label(label),
        timestamp.format("%Y%m%dT%H%M%S%.3fZ"),
        seq,
        extension.trim_start_matches('.')
    )
}

/// Directory name for one harness session.
pub fn session_dir_name(started_at: DateTime<Utc>) -> String {
    started_at.format("%Y%m%d-%H%M%S").to_string()
}
