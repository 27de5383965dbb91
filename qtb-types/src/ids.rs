//! Identity types for qtb experiments.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Caller-assigned identifier of an experiment within a suite.
///
/// Unique within one suite; used to correlate reports with artifact files.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExperimentId(u32);

impl ExperimentId {
    /// Create an ExperimentId from its numeric value.
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Get the numeric value.
    pub const fn value(&self) -> u32 {
        self.0
    }
}

impl From<u32> for ExperimentId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl fmt::Display for ExperimentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for ExperimentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExperimentId({})", self.0)
    }
}
