//! Experiment definitions.

use crate::error::ParseError;
use crate::ids::ExperimentId;
use crate::shaping::{parse_delay, parse_loss, ShapingParams};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Per-experiment overrides of the suite's client load defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoadOverrides {
    /// Load-generation rate (requests per second).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate: Option<u32>,
    /// Client run duration in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<u64>,
    /// Hard timeout for the client run in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

/// One experiment: a labelled set of network conditions plus client arguments.
///
/// Immutable once constructed. The ordered list of these is the only input
/// the orchestrator needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExperimentSpec {
    id: ExperimentId,
    label: String,
    #[serde(default)]
    shaping: ShapingParams,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    client_args: Vec<String>,
    #[serde(default)]
    load: LoadOverrides,
}

impl ExperimentSpec {
    /// Create an experiment with no extra client arguments or overrides.
    pub fn new(id: u32, label: impl Into<String>, shaping: ShapingParams) -> Self {
        Self {
            id: ExperimentId::new(id),
            label: label.into(),
            shaping,
            client_args: Vec::new(),
            load: LoadOverrides::default(),
        }
    }

    /// Attach extra arguments passed to the client for this experiment only.
    pub fn with_client_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.client_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Attach load overrides.
    pub fn with_load(mut self, load: LoadOverrides) -> Self {
        self.load = load;
        self
    }

    /// Experiment identifier.
    pub fn id(&self) -> ExperimentId {
        self.id
    }

    /// Human-readable label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Network conditions for this experiment.
    pub fn shaping(&self) -> &ShapingParams {
        &self.shaping
    }

    /// Extra client arguments.
    pub fn client_args(&self) -> &[String] {
        &self.client_args
    }

    /// Load overrides.
    pub fn load(&self) -> &LoadOverrides {
        &self.load
    }
}

/// Parses the inline form `ID:LABEL[:KEY=VALUE,...]`.
///
/// Keys are `delay`, `loss` and `rate`, e.g. `1:lossy:delay=25ms,loss=2,rate=10mbit`.
impl FromStr for ExperimentSpec {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseError::InvalidExperiment(s.to_string());

        let mut parts = s.splitn(3, ':');
        let id: u32 = parts
            .next()
            .and_then(|p| p.trim().parse().ok())
            .ok_or_else(invalid)?;
        let label = parts
            .next()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .ok_or_else(invalid)?;

        let mut shaping = ShapingParams::none();
        if let Some(params) = parts.next() {
            for pair in params.split(',').map(str::trim).filter(|p| !p.is_empty()) {
                let (key, value) = pair.split_once('=').ok_or_else(invalid)?;
                match key.trim() {
                    "delay" => shaping.delay = Some(parse_delay(value)?),
                    "loss" => shaping.loss_percent = Some(parse_loss(value)?),
                    "rate" => shaping.rate_limit = Some(value.parse()?),
                    _ => return Err(invalid()),
                }
            }
        }

        Ok(Self::new(id, label, shaping))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shaping::Bandwidth;
    use std::time::Duration;

    #[test]
    fn inline_baseline() {
        let spec: ExperimentSpec = "0:baseline".parse().unwrap();
        assert_eq!(spec.id(), ExperimentId::new(0));
        assert_eq!(spec.label(), "baseline");
        assert!(spec.shaping().is_empty());
    }

    #[test]
    fn inline_with_all_shaping_keys() {
        let spec: ExperimentSpec = "1:lossy:delay=25ms,loss=2.0,rate=10mbit".parse().unwrap();
        assert_eq!(spec.shaping().delay, Some(Duration::from_millis(25)));
        assert_eq!(spec.shaping().loss_percent, Some(2.0));
        assert_eq!(spec.shaping().rate_limit, Some(Bandwidth::from_mbit(10)));
    }

    #[test]
    fn inline_rejects_malformed() {
        assert!("x:label".parse::<ExperimentSpec>().is_err());
        assert!("3".parse::<ExperimentSpec>().is_err());
        assert!("3:".parse::<ExperimentSpec>().is_err());
        assert!("3:l:jitter=5ms".parse::<ExperimentSpec>().is_err());
        assert!("3:l:delay".parse::<ExperimentSpec>().is_err());
        assert!("3:l:loss=200".parse::<ExperimentSpec>().is_err());
    }

    #[test]
    fn experiment_from_toml() {
        let spec: ExperimentSpec = toml::from_str(
            r#"
id = 2
label = "slow"
client_args = ["--max-streams", "4"]

[shaping]
rate_limit = "1mbit"

[load]
rate = 50
"#,
        )
        .unwrap();
        assert_eq!(spec.id().value(), 2);
        assert_eq!(spec.client_args(), ["--max-streams", "4"]);
        assert_eq!(spec.shaping().rate_limit, Some(Bandwidth::from_mbit(1)));
        assert_eq!(spec.load().rate, Some(50));
        assert_eq!(spec.load().duration_secs, None);
    }

    #[test]
    fn experiment_rejects_unknown_fields() {
        let result: Result<ExperimentSpec, _> = toml::from_str(
            r#"
id = 2
label = "slow"
jitter = "5ms"
"#,
        );
        assert!(result.is_err());
    }
}
