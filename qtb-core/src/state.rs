//! Shaping state of the managed network path.
//!
//! The controller owns exactly one of these per harness instance. It leaves
//! `Clean` before the first mutating `tc` command and returns to it only
//! after a successful delete, so a non-clean value always means rules may be
//! installed and a reset has work to do.

use qtb_types::ShapingParams;

/// Whether shaping rules from an experiment are installed on the path.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ShapingState {
    /// No constraints installed.
    #[default]
    Clean,
    /// Constraints from exactly one experiment installed.
    ///
    /// `params` may be empty: a baseline run is still a shaped state, with
    /// zero effective constraints.
    Shaped {
        /// The installed parameters.
        params: ShapingParams,
    },
    /// An install of `params` started and has not completed; any prefix of
    /// its commands may have taken effect.
    Applying {
        /// The parameters being installed.
        params: ShapingParams,
    },
}

impl ShapingState {
    /// True when no experiment's shaping is active.
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Clean)
    }

    /// Installed parameters, if any.
    pub fn params(&self) -> Option<&ShapingParams> {
        match self {
            Self::Clean => None,
            Self::Shaped { params } | Self::Applying { params } => Some(params),
        }
    }

    /// Short name for logs and reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Clean => "clean",
            Self::Shaped { .. } => "shaped",
            Self::Applying { .. } => "applying",
        }
    }
}
