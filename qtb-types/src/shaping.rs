//! Network shaping parameters.
//!
//! Values use the same textual units as `tc` so a suite file reads like the
//! commands it produces: delays are `500us`, `25ms`, `1s`; bandwidths are
//! `56kbit`, `10mbit`, `1gbit` (or `*bps` for bytes per second).

use crate::error::ParseError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Emulated network conditions for one experiment.
///
/// Every field is optional and an absent field means "no constraint of that
/// kind", which is not the same as a zero value: `delay: None` installs no
/// delay emulation at all, while `delay: Some(0ms)` installs a zero-delay
/// netem node.
///
/// When `rate_limit` is set it is realised downstream of the delay/loss
/// emulation, as a child of the netem node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShapingParams {
    /// Added one-way delay.
    #[serde(default, with = "delay_serde", skip_serializing_if = "Option::is_none")]
    pub delay: Option<Duration>,
    /// Random packet loss percentage in `[0, 100]`.
    #[serde(
        default,
        deserialize_with = "deserialize_loss",
        skip_serializing_if = "Option::is_none"
    )]
    pub loss_percent: Option<f32>,
    /// Bandwidth ceiling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<Bandwidth>,
}

impl ShapingParams {
    /// Baseline parameters: no constraints of any kind.
    pub fn none() -> Self {
        Self::default()
    }

    /// Add fixed delay.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Add packet loss.
    pub fn loss(mut self, percent: f32) -> Self {
        self.loss_percent = Some(percent);
        self
    }

    /// Add a bandwidth ceiling.
    pub fn rate(mut self, rate: Bandwidth) -> Self {
        self.rate_limit = Some(rate);
        self
    }

    /// True when no constraint is set (a baseline run).
    pub fn is_empty(&self) -> bool {
        self.delay.is_none() && self.loss_percent.is_none() && self.rate_limit.is_none()
    }

    /// Check value ranges that the builder methods do not enforce.
    pub fn validate(&self) -> Result<(), ParseError> {
        if let Some(loss) = self.loss_percent {
            check_loss(loss)?;
        }
        Ok(())
    }
}

impl fmt::Display for ShapingParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "unshaped");
        }
        let mut parts = Vec::new();
        if let Some(delay) = self.delay {
            parts.push(format!("delay={}", format_delay(delay)));
        }
        if let Some(loss) = self.loss_percent {
            parts.push(format!("loss={}%", loss));
        }
        if let Some(rate) = self.rate_limit {
            parts.push(format!("rate={}", rate));
        }
        write!(f, "{}", parts.join(","))
    }
}

fn check_loss(loss: f32) -> Result<f32, ParseError> {
    if loss.is_finite() && (0.0..=100.0).contains(&loss) {
        Ok(loss)
    } else {
        Err(ParseError::InvalidLoss(loss.to_string()))
    }
}

pub(crate) fn parse_loss(s: &str) -> Result<f32, ParseError> {
    let trimmed = s.trim().trim_end_matches('%');
    let value: f32 = trimmed
        .parse()
        .map_err(|_| ParseError::InvalidLoss(s.to_string()))?;
    check_loss(value)
}

fn deserialize_loss<'de, D>(deserializer: D) -> Result<Option<f32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<f32>::deserialize(deserializer)?;
    match value {
        Some(loss) => check_loss(loss)
            .map(Some)
            .map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

/// Parse a delay expression such as `25ms`, `1.5ms`, `500us` or `1s`.
pub fn parse_delay(s: &str) -> Result<Duration, ParseError> {
    let s = s.trim();
    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .ok_or_else(|| ParseError::InvalidDelay(s.to_string()))?;
    let (number, unit) = s.split_at(split);
    let value: f64 = number
        .parse()
        .map_err(|_| ParseError::InvalidDelay(s.to_string()))?;
    let micros_per_unit = match unit {
        "us" => 1.0,
        "ms" => 1_000.0,
        "s" => 1_000_000.0,
        _ => return Err(ParseError::InvalidDelay(s.to_string())),
    };
    let micros = (value * micros_per_unit).round();
    if !micros.is_finite() || micros < 0.0 {
        return Err(ParseError::InvalidDelay(s.to_string()));
    }
    Ok(Duration::from_micros(micros as u64))
}

/// Format a delay in the largest whole `tc` unit (`s`, `ms` or `us`).
pub fn format_delay(delay: Duration) -> String {
    let micros = delay.as_micros();
    if micros != 0 && micros % 1_000_000 == 0 {
        format!("{}s", micros / 1_000_000)
    } else if micros % 1_000 == 0 {
        format!("{}ms", micros / 1_000)
    } else {
        format!("{}us", micros)
    }
}

mod delay_serde {
    use super::{format_delay, parse_delay};
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(delay) => serializer.serialize_str(&format_delay(*delay)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<String>::deserialize(deserializer)?;
        value
            .map(|s| parse_delay(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

/// A bandwidth value, stored in bits per second.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Bandwidth(u64);

impl Bandwidth {
    /// Create a bandwidth from bits per second.
    pub const fn from_bits_per_sec(bits: u64) -> Self {
        Self(bits)
    }

    /// Create a bandwidth from kilobits per second.
    pub const fn from_kbit(kbit: u64) -> Self {
        Self(kbit * 1_000)
    }

    /// Create a bandwidth from megabits per second.
    pub const fn from_mbit(mbit: u64) -> Self {
        Self(mbit * 1_000_000)
    }

    /// Bits per second.
    pub const fn bits_per_sec(&self) -> u64 {
        self.0
    }

    /// Bytes per second (rounded down).
    pub const fn bytes_per_sec(&self) -> u64 {
        self.0 / 8
    }
}

impl FromStr for Bandwidth {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let lower = s.to_ascii_lowercase();
        let split = lower
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(|| ParseError::InvalidBandwidth(s.to_string()))?;
        let (number, unit) = lower.split_at(split);
        let value: f64 = number
            .parse()
            .map_err(|_| ParseError::InvalidBandwidth(s.to_string()))?;
        let bits_per_unit = match unit {
            "bit" => 1.0,
            "kbit" => 1e3,
            "mbit" => 1e6,
            "gbit" => 1e9,
            "bps" => 8.0,
            "kbps" => 8e3,
            "mbps" => 8e6,
            "gbps" => 8e9,
            _ => return Err(ParseError::InvalidBandwidth(s.to_string())),
        };
        let bits = (value * bits_per_unit).round();
        if !bits.is_finite() || bits < 1.0 {
            return Err(ParseError::InvalidBandwidth(s.to_string()));
        }
        Ok(Self(bits as u64))
    }
}

impl fmt::Display for Bandwidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bits = self.0;
        if bits % 1_000_000_000 == 0 {
            write!(f, "{}gbit", bits / 1_000_000_000)
        } else if bits % 1_000_000 == 0 {
            write!(f, "{}mbit", bits / 1_000_000)
        } else if bits % 1_000 == 0 {
            write!(f, "{}kbit", bits / 1_000)
        } else {
            write!(f, "{}bit", bits)
        }
    }
}

impl fmt::Debug for Bandwidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bandwidth({})", self)
    }
}

impl Serialize for Bandwidth {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Bandwidth {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_delay_units() {
        assert_eq!(parse_delay("25ms").unwrap(), Duration::from_millis(25));
        assert_eq!(parse_delay("500us").unwrap(), Duration::from_micros(500));
        assert_eq!(parse_delay("1s").unwrap(), Duration::from_secs(1));
        assert_eq!(parse_delay("1.5ms").unwrap(), Duration::from_micros(1500));
        assert_eq!(parse_delay("0ms").unwrap(), Duration::ZERO);
    }

    #[test]
    fn parse_delay_rejects_garbage() {
        assert!(parse_delay("25").is_err());
        assert!(parse_delay("ms").is_err());
        assert!(parse_delay("25 minutes").is_err());
        assert!(parse_delay("").is_err());
    }

    #[test]
    fn format_delay_picks_largest_whole_unit() {
        assert_eq!(format_delay(Duration::from_millis(25)), "25ms");
        assert_eq!(format_delay(Duration::from_micros(1500)), "1500us");
        assert_eq!(format_delay(Duration::from_secs(2)), "2s");
        assert_eq!(format_delay(Duration::ZERO), "0ms");
    }

    #[test]
    fn bandwidth_parses_tc_units() {
        assert_eq!("10mbit".parse::<Bandwidth>().unwrap(), Bandwidth::from_mbit(10));
        assert_eq!("56kbit".parse::<Bandwidth>().unwrap(), Bandwidth::from_kbit(56));
        assert_eq!(
            "1Gbit".parse::<Bandwidth>().unwrap().bits_per_sec(),
            1_000_000_000
        );
        assert_eq!("1mbps".parse::<Bandwidth>().unwrap().bits_per_sec(), 8_000_000);
        assert_eq!("1.5mbit".parse::<Bandwidth>().unwrap().bits_per_sec(), 1_500_000);
    }

    #[test]
    fn bandwidth_rejects_unitless_and_zero() {
        assert!("1000".parse::<Bandwidth>().is_err());
        assert!("0mbit".parse::<Bandwidth>().is_err());
        assert!("10furlongs".parse::<Bandwidth>().is_err());
    }

    #[test]
    fn bandwidth_display_normalizes() {
        assert_eq!(Bandwidth::from_kbit(10_000).to_string(), "10mbit");
        assert_eq!(Bandwidth::from_kbit(1500).to_string(), "1500kbit");
        assert_eq!(Bandwidth::from_bits_per_sec(12_345).to_string(), "12345bit");
    }

    #[test]
    fn absent_fields_are_not_zero() {
        let baseline = ShapingParams::none();
        assert!(baseline.is_empty());

        let zero_delay = ShapingParams::none().delay(Duration::ZERO);
        assert!(!zero_delay.is_empty());
        assert_ne!(baseline, zero_delay);
    }

    #[test]
    fn shaping_params_from_toml() {
        let params: ShapingParams = toml::from_str(
            r#"
delay = "25ms"
loss_percent = 2.0
rate_limit = "10mbit"
"#,
        )
        .unwrap();
        assert_eq!(params.delay, Some(Duration::from_millis(25)));
        assert_eq!(params.loss_percent, Some(2.0));
        assert_eq!(params.rate_limit, Some(Bandwidth::from_mbit(10)));
    }

    #[test]
    fn shaping_params_empty_toml_is_baseline() {
        let params: ShapingParams = toml::from_str("").unwrap();
        assert!(params.is_empty());
    }

    #[test]
    fn shaping_params_rejects_out_of_range_loss() {
        let result: Result<ShapingParams, _> = toml::from_str("loss_percent = 101.0");
        assert!(result.is_err());

        let params = ShapingParams::none().loss(-1.0);
        assert!(params.validate().is_err());
    }

    #[test]
    fn shaping_params_display() {
        let params = ShapingParams::none()
            .delay(Duration::from_millis(25))
            .loss(2.0)
            .rate(Bandwidth::from_mbit(10));
        assert_eq!(params.to_string(), "delay=25ms,loss=2%,rate=10mbit");
        assert_eq!(ShapingParams::none().to_string(), "unshaped");
    }

    #[test]
    fn parse_loss_accepts_percent_sign() {
        assert_eq!(parse_loss("2.5%").unwrap(), 2.5);
        assert_eq!(parse_loss("0").unwrap(), 0.0);
        assert!(parse_loss("150").is_err());
        assert!(parse_loss("lots").is_err());
    }
}
