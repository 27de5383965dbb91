//! Configuration loading for qtb.
//!
//! A suite is described by one TOML file (default: `qtb.toml`): the network
//! interface to shape, how to launch the server and client, where artifacts
//! go, and the ordered list of experiments.

use qtb_core::FailurePolicy;
use qtb_types::{ExperimentSpec, LoadOverrides};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Suite settings.
    #[serde(default)]
    pub suite: SuiteConfig,
    /// Network shaping settings.
    #[serde(default)]
    pub network: NetworkConfig,
    /// Server launch settings.
    pub server: ServerConfig,
    /// Client launch settings.
    pub client: ClientConfig,
    /// Artifact output settings.
    #[serde(default)]
    pub output: OutputConfig,
    /// Experiments, run in file order.
    #[serde(default)]
    pub experiments: Vec<ExperimentSpec>,
}

/// Suite settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SuiteConfig {
    /// Suite name, recorded in the status file (default: `qtb`).
    #[serde(default = "default_suite_name")]
    pub name: String,
    /// What to do after a failed experiment (default: continue).
    #[serde(default)]
    pub on_failure: FailurePolicy,
}

/// How shaping commands are executed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NetworkMode {
    /// Run the host's `tc`.
    #[default]
    System,
    /// Log commands against a simulated qdisc table; touch nothing.
    DryRun,
}

/// Network shaping settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkConfig {
    /// Interface carrying client-server traffic (default: `lo`).
    #[serde(default = "default_interface")]
    pub interface: String,
    /// Execution mode (default: system).
    #[serde(default)]
    pub mode: NetworkMode,
    /// Non-interactive elevation helper used when not root
    /// (default: `["sudo", "-n"]`; empty disables elevation).
    #[serde(default = "default_elevate_with")]
    pub elevate_with: Vec<String>,
}

/// Server launch settings.
///
/// `args` may contain `{bind}`, `{port}`, `{cert}` and `{key}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Server executable.
    pub program: String,
    /// Server arguments.
    #[serde(default)]
    pub args: Vec<String>,
    /// Address the server listens on (default: 127.0.0.1).
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Port the server listens on (default: 4433).
    #[serde(default = "default_port")]
    pub port: u16,
    /// TLS certificate path (default: `cert.pem`).
    #[serde(default = "default_cert")]
    pub cert: PathBuf,
    /// TLS private key path (default: `key.pem`).
    #[serde(default = "default_key")]
    pub key: PathBuf,
    /// Time the server must stay up to count as started (default: 2000ms).
    #[serde(default = "default_startup_grace_ms")]
    pub startup_grace_ms: u64,
    /// Time between SIGTERM and SIGKILL when stopping processes (default: 5000ms).
    #[serde(default = "default_stop_grace_ms")]
    pub stop_grace_ms: u64,
}

/// Client launch settings.
///
/// `args` may contain `{url}`, `{rate}`, `{duration}` and `{output}`. If no
/// argument mentions `{output}`, the artifact path is appended last.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Client executable.
    pub program: String,
    /// Client arguments.
    #[serde(default)]
    pub args: Vec<String>,
    /// URL template; `{bind}` and `{port}` come from the server section
    /// (default: `https://{bind}:{port}/`).
    #[serde(default = "default_url")]
    pub url: String,
    /// Requests per second (default: 100).
    #[serde(default = "default_rate")]
    pub rate: u32,
    /// Run duration in seconds (default: 30).
    #[serde(default = "default_duration_secs")]
    pub duration_secs: u64,
    /// Slack added to the duration to form the timeout (default: 15s).
    #[serde(default = "default_timeout_grace_secs")]
    pub timeout_grace_secs: u64,
}

/// Artifact output settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    /// Directory holding session directories (default: `runs`).
    #[serde(default = "default_output_root")]
    pub root: PathBuf,
    /// Artifact file extension (default: `qlog`).
    #[serde(default = "default_extension")]
    pub extension: String,
}

// Default value functions
fn default_suite_name() -> String {
    "qtb".to_string()
}

fn default_interface() -> String {
    "lo".to_string()
}

fn default_elevate_with() -> Vec<String> {
    vec!["sudo".to_string(), "-n".to_string()]
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    4433
}

fn default_cert() -> PathBuf {
    PathBuf::from("cert.pem")
}

fn default_key() -> PathBuf {
    PathBuf::from("key.pem")
}

fn default_startup_grace_ms() -> u64 {
    2000
}

fn default_stop_grace_ms() -> u64 {
    5000
}

fn default_url() -> String {
    "https://{bind}:{port}/".to_string()
}

fn default_rate() -> u32 {
    100
}

fn default_duration_secs() -> u64 {
    30
}

fn default_timeout_grace_secs() -> u64 {
    15
}

fn default_output_root() -> PathBuf {
    PathBuf::from("runs")
}

fn default_extension() -> String {
    "qlog".to_string()
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            name: default_suite_name(),
            on_failure: FailurePolicy::default(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            interface: default_interface(),
            mode: NetworkMode::default(),
            elevate_with: default_elevate_with(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            root: default_output_root(),
            extension: default_extension(),
        }
    }
}

fn substitute(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(template.to_string(), |acc, (name, value)| {
        acc.replace(&format!("{{{}}}", name), value)
    })
}

impl ServerConfig {
    /// Arguments with placeholders filled in.
    pub fn launch_args(&self) -> Vec<String> {
        let port = self.port.to_string();
        let cert = self.cert.to_string_lossy();
        let key = self.key.to_string_lossy();
        let vars = [
            ("bind", self.bind_address.as_str()),
            ("port", port.as_str()),
            ("cert", cert.as_ref()),
            ("key", key.as_ref()),
        ];
        self.args.iter().map(|a| substitute(a, &vars)).collect()
    }

    /// Startup grace as a duration.
    pub fn startup_grace(&self) -> Duration {
        Duration::from_millis(self.startup_grace_ms)
    }

    /// Stop grace as a duration.
    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }
}

/// Effective load parameters for one client run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadPlan {
    /// Requests per second.
    pub rate: u32,
    /// Intended run duration.
    pub duration: Duration,
    /// Hard limit after which the client is terminated.
    pub timeout: Duration,
}

impl ClientConfig {
    /// Layer an experiment's overrides over the suite defaults.
    pub fn resolve(&self, overrides: &LoadOverrides) -> LoadPlan {
        let duration_secs = overrides.duration_secs.unwrap_or(self.duration_secs);
        let timeout_secs = overrides
            .timeout_secs
            .unwrap_or(duration_secs + self.timeout_grace_secs);
        LoadPlan {
            rate: overrides.rate.unwrap_or(self.rate),
            duration: Duration::from_secs(duration_secs),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// Client URL with the server's address filled in.
    pub fn url_for(&self, server: &ServerConfig) -> String {
        let port = server.port.to_string();
        substitute(
            &self.url,
            &[("bind", server.bind_address.as_str()), ("port", port.as_str())],
        )
    }

    /// Full argument list for one run.
    ///
    /// Configured arguments come first, then the experiment's extra
    /// arguments, then the artifact path unless `{output}` already placed it.
    pub fn launch_args(&self, url: &str, plan: &LoadPlan, output: &Path, extra: &[String]) -> Vec<String> {
        let rate = plan.rate.to_string();
        let duration = plan.duration.as_secs().to_string();
        let output_str = output.to_string_lossy();
        let vars = [
            ("url", url),
            ("rate", rate.as_str()),
            ("duration", duration.as_str()),
            ("output", output_str.as_ref()),
        ];

        let mut args: Vec<String> = self.args.iter().map(|a| substitute(a, &vars)).collect();
        args.extend(extra.iter().cloned());
        if !self.args.iter().any(|a| a.contains("{output}")) {
            args.push(output_str.into_owned());
        }
        args
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&content, path)
    }

    /// Parse configuration text; `origin` is only used in error messages.
    pub fn parse(content: &str, origin: &Path) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content).map_err(|e| ConfigError::ParseError {
            path: origin.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.program.trim().is_empty() {
            return Err(ConfigError::Invalid("server.program is empty".into()));
        }
        if self.client.program.trim().is_empty() {
            return Err(ConfigError::Invalid("client.program is empty".into()));
        }
        if self.network.interface.trim().is_empty() {
            return Err(ConfigError::Invalid("network.interface is empty".into()));
        }
        validate_experiments(&self.experiments)
    }
}

/// Reject duplicate ids and out-of-range shaping values.
pub fn validate_experiments(experiments: &[ExperimentSpec]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for spec in experiments {
        if !seen.insert(spec.id()) {
            return Err(ConfigError::Invalid(format!(
                "duplicate experiment id {}",
                spec.id()
            )));
        }
        spec.shaping().validate().map_err(|e| {
            ConfigError::Invalid(format!("experiment {}: {}", spec.id(), e))
        })?;
    }
    Ok(())
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// Parsed but inconsistent.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Starter suite written by `qtb init`.
pub const STARTER_SUITE: &str = r#"# qtb suite file

[suite]
name = "aioquic-baseline"
on_failure = "continue"        # or "abort"

[network]
interface = "lo"
mode = "system"                # or "dry-run"
elevate_with = ["sudo", "-n"]

[server]
program = "python3"
args = ["examples/http3_server.py", "--host", "{bind}", "--port", "{port}",
        "--certificate", "{cert}", "--private-key", "{key}"]
cert = "tests/ssl_cert.pem"
key = "tests/ssl_key.pem"
startup_grace_ms = 2000
stop_grace_ms = 5000

[client]
program = "python3"
args = ["examples/http3_client.py", "--ca-certs", "tests/pycacert.pem",
        "--quic-log", "{output}", "{url}"]
rate = 100
duration_secs = 30
timeout_grace_secs = 15

[output]
root = "runs"
extension = "qlog"

[[experiments]]
id = 0
label = "baseline"

[[experiments]]
id = 1
label = "lossy"
shaping = { delay = "25ms", loss_percent = 2.0 }

[[experiments]]
id = 2
label = "constrained"
shaping = { delay = "50ms", rate_limit = "10mbit" }
load = { duration_secs = 60 }
"#;
