//! # qtb-core
//!
//! Pure logic for qtb (no I/O, instant tests).
//!
//! This crate decides *what* the harness does without doing any of it:
//! which `tc` commands realise a set of shaping parameters, which state the
//! managed network path is in, how run artifacts are named, how a finished
//! client process is classified, and how a session's results add up.
//!
//! The actual I/O (running `tc`, spawning processes, touching the
//! filesystem) is performed by `qtb-harness`, which interprets these
//! values.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod naming;
pub mod netem;
pub mod outcome;
pub mod report;
pub mod state;

pub use naming::{artifact_file_name, sanitize_label, session_dir_name, MAX_LABEL_LEN};
pub use netem::{TcCommand, TcPlan, ROOT_HANDLE, LIMITER_HANDLE};
pub use outcome::ClientOutcome;
pub use report::{ExperimentReport, ExperimentStatus, FailurePolicy, SessionReport, StatusCounts};
pub use state::ShapingState;
