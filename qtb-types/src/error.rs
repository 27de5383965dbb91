//! Error types for qtb data parsing.

use thiserror::Error;

/// Errors produced when parsing experiment or shaping values from text.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    /// Delay expression could not be parsed (expected e.g. `25ms`).
    #[error("invalid delay: {0}")]
    InvalidDelay(String),

    /// Bandwidth expression could not be parsed (expected e.g. `10mbit`).
    #[error("invalid bandwidth: {0}")]
    InvalidBandwidth(String),

    /// Loss percentage outside `[0, 100]` or not a number.
    #[error("invalid loss percentage: {0}")]
    InvalidLoss(String),

    /// Inline experiment definition is malformed.
    #[error("invalid experiment definition: {0}")]
    InvalidExperiment(String),
}
