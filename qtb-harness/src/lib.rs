//! # qtb-harness
//!
//! I/O side of qtb: runs `tc`, spawns and supervises the protocol server
//! and client, names artifacts, and sequences experiments.
//!
//! ## Components
//!
//! - [`NetworkController`] - installs/removes shaping on one interface
//! - [`ShapingBackend`] - executes `tc` ([`SystemTc`] or [`SimulatedShaper`])
//! - [`PrivilegeProvider`] - decides how `tc` gets `CAP_NET_ADMIN`
//! - [`ProcessManager`] - server/client lifecycle with timeouts
//! - [`ArtifactNamer`] - session directories and collision-free artifact paths
//! - [`Orchestrator`] - the experiment loop, with guaranteed teardown
//!
//! ## Example
//!
//! ```ignore
//! let config = Config::from_file(Path::new("qtb.toml"))?;
//! let experiments = config.experiments.clone();
//! let report = Orchestrator::new(config)?
//!     .run(&experiments, tokio::signal::ctrl_c().map(|_| ()))
//!     .await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod cleanup;
pub mod config;
pub mod controller;
pub mod error;
pub mod namer;
pub mod orchestrator;
pub mod privilege;
pub mod process;
pub mod status;

pub use backend::{ShapingBackend, SimulatedShaper, SystemTc, TcOutput};
pub use cleanup::{CleanupAction, CleanupStack};
pub use config::{Config, ConfigError, NetworkMode};
pub use controller::NetworkController;
pub use error::{ExperimentError, HarnessError, ProcessError, Result, ShapingError};
pub use namer::{ArtifactNamer, RunArtifact};
pub use orchestrator::{LoadRequest, Orchestrator};
pub use privilege::{Direct, EscalationChain, PrivilegeProvider};
pub use process::{ClientLaunch, ManagedProcess, ProcessHandle, ProcessKind, ProcessManager, ServerLaunch};
pub use status::{StatusFile, STATUS_FILE_NAME};
