//! # qtb-types
//!
//! Data model for the qtb network experiment harness.
//!
//! This crate provides the types shared by every qtb crate:
//! - [`ExperimentId`], [`ExperimentSpec`], [`LoadOverrides`] - What to run
//! - [`ShapingParams`], [`Bandwidth`] - Which network conditions to emulate
//! - [`ParseError`] - Errors from the textual forms of the above

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod experiment;
mod ids;
mod shaping;

pub use error::ParseError;
pub use experiment::{ExperimentSpec, LoadOverrides};
pub use ids::ExperimentId;
pub use shaping::{format_delay, parse_delay, Bandwidth, ShapingParams};
