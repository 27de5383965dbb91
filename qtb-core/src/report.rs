//! Session bookkeeping: per-experiment status, failure policy, final verdict.
//!
//! A [`SessionReport`] is created up front with every experiment `Pending`
//! and is updated in place as the orchestrator works through the sequence.
//! The same value is what gets persisted as the session's status file.

use crate::outcome::ClientOutcome;
use chrono::{DateTime, Utc};
use qtb_types::{ExperimentId, ExperimentSpec};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// What the orchestrator does after an experiment fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Record the failure and move on to the next experiment.
    #[default]
    Continue,
    /// Record the failure and skip every remaining experiment.
    Abort,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "continue" => Ok(Self::Continue),
            "abort" => Ok(Self::Abort),
            other => Err(format!(
                "unknown failure policy '{}' (expected 'continue' or 'abort')",
                other
            )),
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Continue => write!(f, "continue"),
            Self::Abort => write!(f, "abort"),
        }
    }
}

/// Lifecycle status of one experiment within a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExperimentStatus {
    /// Not started yet.
    Pending,
    /// Shaping applied or client running.
    Running,
    /// Client exited on its own.
    Completed {
        /// Client exit code.
        exit_code: i32,
    },
    /// Client exceeded its timeout and was terminated.
    TimedOut,
    /// Client died from a signal.
    Crashed {
        /// Terminating signal number.
        signal: i32,
    },
    /// A harness step failed (shaping, privilege, process start, artifact I/O).
    Failed {
        /// Error description.
        reason: String,
    },
    /// Not attempted because an earlier failure aborted the sequence.
    Skipped,
}

impl ExperimentStatus {
    /// Short name for tables and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed { .. } => "completed",
            Self::TimedOut => "timed_out",
            Self::Crashed { .. } => "crashed",
            Self::Failed { .. } => "failed",
            Self::Skipped => "skipped",
        }
    }

    /// True for failures that make the whole session unsuccessful.
    ///
    /// Timeouts, crashes and non-zero client exits are measurements, not
    /// harness failures, and are recorded without failing the session.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

impl From<ClientOutcome> for ExperimentStatus {
    fn from(outcome: ClientOutcome) -> Self {
        match outcome {
            ClientOutcome::Completed { exit_code } => Self::Completed { exit_code },
            ClientOutcome::TimedOut => Self::TimedOut,
            ClientOutcome::Crashed { signal } => Self::Crashed { signal },
        }
    }
}

impl fmt::Display for ExperimentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed { exit_code } => write!(f, "completed (exit {})", exit_code),
            Self::Crashed { signal } => write!(f, "crashed (signal {})", signal),
            Self::Failed { reason } => write!(f, "failed: {}", reason),
            other => write!(f, "{}", other.as_str()),
        }
    }
}

/// Result record for one experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentReport {
    /// Experiment id.
    pub id: ExperimentId,
    /// Experiment label (as given, not sanitized).
    pub label: String,
    /// Current status.
    #[serde(flatten)]
    pub status: ExperimentStatus,
    /// Artifact path, once named.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<PathBuf>,
    /// `tc qdisc show` output captured just before the client launched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules_at_launch: Option<String>,
    /// When the experiment started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the experiment reached a terminal status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl ExperimentReport {
    /// A pending report for `spec`.
    pub fn pending(spec: &ExperimentSpec) -> Self {
        Self {
            id: spec.id(),
            label: spec.label().to_string(),
            status: ExperimentStatus::Pending,
            artifact: None,
            rules_at_launch: None,
            started_at: None,
            finished_at: None,
        }
    }

    /// Mark as running now.
    pub fn start(&mut self) {
        self.status = ExperimentStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Set a terminal status now.
    pub fn finish(&mut self, status: ExperimentStatus) {
        self.status = status;
        self.finished_at = Some(Utc::now());
    }
}

/// Tally of experiment statuses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    /// Completed with exit code 0.
    pub succeeded: usize,
    /// Completed with a non-zero exit code, timed out or crashed.
    pub unsuccessful_runs: usize,
    /// Harness failures.
    pub failed: usize,
    /// Skipped after an abort.
    pub skipped: usize,
    /// Never reached a terminal status (interrupted session).
    pub unfinished: usize,
}

/// Everything known about one harness session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    /// Suite name.
    pub suite: String,
    /// Session start time.
    pub started_at: DateTime<Utc>,
    /// Failure policy in force.
    pub policy: FailurePolicy,
    /// One report per experiment, in execution order.
    pub experiments: Vec<ExperimentReport>,
    /// The sequence was stopped early after a failure.
    #[serde(default)]
    pub aborted: bool,
    /// The session was interrupted (signal or panic) before finishing.
    #[serde(default)]
    pub interrupted: bool,
    /// Teardown could not restore a clean baseline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleanup_error: Option<String>,
}

impl SessionReport {
    /// A report with every experiment pending.
    pub fn planned(suite: &str, policy: FailurePolicy, experiments: &[ExperimentSpec]) -> Self {
        Self {
            suite: suite.to_string(),
            started_at: Utc::now(),
            policy,
            experiments: experiments.iter().map(ExperimentReport::pending).collect(),
            aborted: false,
            interrupted: false,
            cleanup_error: None,
        }
    }

    /// Mutable report for the experiment at `index`.
    pub fn entry_mut(&mut self, index: usize) -> Option<&mut ExperimentReport> {
        self.experiments.get_mut(index)
    }

    /// Mark every pending experiment from `index` on as skipped.
    pub fn skip_from(&mut self, index: usize) {
        for report in self.experiments.iter_mut().skip(index) {
            if report.status == ExperimentStatus::Pending {
                report.finish(ExperimentStatus::Skipped);
            }
        }
    }

    /// Tally statuses.
    pub fn counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for report in &self.experiments {
            match &report.status {
                ExperimentStatus::Completed { exit_code: 0 } => counts.succeeded += 1,
                ExperimentStatus::Completed { .. }
                | ExperimentStatus::TimedOut
                | ExperimentStatus::Crashed { .. } => counts.unsuccessful_runs += 1,
                ExperimentStatus::Failed { .. } => counts.failed += 1,
                ExperimentStatus::Skipped => counts.skipped += 1,
                ExperimentStatus::Pending | ExperimentStatus::Running => counts.unfinished += 1,
            }
        }
        counts
    }

    /// True when no experiment failed fatally, the session ran to the end
    /// and teardown left the host clean.
    pub fn is_success(&self) -> bool {
        !self.interrupted
            && self.cleanup_error.is_none()
            && !self.experiments.iter().any(|r| r.status.is_fatal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qtb_types::ShapingParams;

    fn specs() -> Vec<ExperimentSpec> {
        vec![
            ExperimentSpec::new(0, "baseline", ShapingParams::none()),
            ExperimentSpec::new(1, "lossy", ShapingParams::none().loss(2.0)),
            ExperimentSpec::new(2, "slow", ShapingParams::none()),
        ]
    }

    #[test]
    fn planned_report_is_all_pending() {
        let report = SessionReport::planned("suite", FailurePolicy::Continue, &specs());
        assert_eq!(report.experiments.len(), 3);
        assert!(report
            .experiments
            .iter()
            .all(|r| r.status == ExperimentStatus::Pending));
        assert_eq!(report.counts().unfinished, 3);
    }

    #[test]
    fn skip_from_only_touches_pending() {
        let mut report = SessionReport::planned("suite", FailurePolicy::Abort, &specs());
        report.entry_mut(0).unwrap().finish(ExperimentStatus::Failed {
            reason: "boom".into(),
        });
        report.skip_from(0);

        assert!(report.experiments[0].status.is_fatal());
        assert_eq!(report.experiments[1].status, ExperimentStatus::Skipped);
        assert_eq!(report.experiments[2].status, ExperimentStatus::Skipped);
    }

    #[test]
    fn timeouts_and_crashes_do_not_fail_session() {
        let mut report = SessionReport::planned("suite", FailurePolicy::Continue, &specs());
        report.entry_mut(0).unwrap().finish(ClientOutcome::TimedOut.into());
        report
            .entry_mut(1)
            .unwrap()
            .finish(ClientOutcome::Crashed { signal: 9 }.into());
        report
            .entry_mut(2)
            .unwrap()
            .finish(ClientOutcome::Completed { exit_code: 0 }.into());

        assert!(report.is_success());
        let counts = report.counts();
        assert_eq!(counts.succeeded, 1);
        assert_eq!(counts.unsuccessful_runs, 2);
    }

    #[test]
    fn failed_experiment_fails_session() {
        let mut report = SessionReport::planned("suite", FailurePolicy::Continue, &specs());
        report.entry_mut(1).unwrap().finish(ExperimentStatus::Failed {
            reason: "insufficient privilege".into(),
        });
        assert!(!report.is_success());
    }

    #[test]
    fn interrupted_session_fails() {
        let mut report = SessionReport::planned("suite", FailurePolicy::Continue, &specs());
        report.interrupted = true;
        assert!(!report.is_success());
    }

    #[test]
    fn cleanup_error_fails_session() {
        let mut report = SessionReport::planned("suite", FailurePolicy::Continue, &specs());
        report.cleanup_error = Some("tc qdisc del failed".into());
        assert!(!report.is_success());
    }

    #[test]
    fn failure_policy_parses() {
        assert_eq!("continue".parse::<FailurePolicy>(), Ok(FailurePolicy::Continue));
        assert_eq!("abort".parse::<FailurePolicy>(), Ok(FailurePolicy::Abort));
        assert!("retry".parse::<FailurePolicy>().is_err());
        assert_eq!(FailurePolicy::default(), FailurePolicy::Continue);
    }

    #[test]
    fn report_round_trips_through_json() {
        let mut report = SessionReport::planned("suite", FailurePolicy::Abort, &specs());
        report.entry_mut(0).unwrap().start();
        report
            .entry_mut(0)
            .unwrap()
            .finish(ExperimentStatus::Completed { exit_code: 0 });

        let json = serde_json::to_string_pretty(&report).unwrap();
        assert!(json.contains("\"status\": \"completed\""));
        let back: SessionReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
    }
}
