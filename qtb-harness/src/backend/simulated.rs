//! In-memory shaping backend.
//!
//! Interprets `tc qdisc add/del/show` against a simulated qdisc table
//! instead of the kernel. Used for `dry-run` network mode and in tests,
//! where it also records every command and can be told to fail.

use super::{ShapingBackend, TcOutput};
use crate::error::ShapingError;
use async_trait::async_trait;
use qtb_core::TcCommand;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// What the real `tc` prints when the only qdisc is the kernel default.
const DEFAULT_QDISC: &str = "qdisc noqueue 0: root refcnt 2";

/// stderr of deleting a root qdisc that does not exist.
const NOTHING_TO_DELETE: &str = "Error: Cannot delete qdisc with handle of zero.";

/// stderr of adding a root qdisc over an existing one.
const ROOT_EXISTS: &str = "Error: Exclusivity flag on, cannot modify.";

/// stderr of a command run without `CAP_NET_ADMIN`.
const NOT_PERMITTED: &str = "RTNETLINK answers: Operation not permitted";

/// Simulated traffic control.
///
/// Clones share state, so a test can keep one handle for inspection while
/// the controller owns another.
#[derive(Debug, Default)]
pub struct SimulatedShaper {
    inner: Arc<Mutex<SimulatedInner>>,
}

#[derive(Debug, Default)]
struct SimulatedInner {
    qdiscs: Vec<String>,
    commands: Vec<TcCommand>,
    fail_add: Option<(usize, String)>,
    fail_delete: Option<(usize, String)>,
    fail_next_show: Option<String>,
    deny_privilege: bool,
}

impl SimulatedShaper {
    /// Create a backend with only the default qdisc installed.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SimulatedInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every command run so far, in order.
    pub fn commands(&self) -> Vec<TcCommand> {
        self.lock().commands.clone()
    }

    /// Installed qdisc lines (empty when only the default is present).
    pub fn installed(&self) -> Vec<String> {
        self.lock().qdiscs.clone()
    }

    /// True when no simulated rules are installed.
    pub fn is_clean(&self) -> bool {
        self.lock().qdiscs.is_empty()
    }

    /// Pretend a previous session left a rule behind.
    pub fn preinstall(&self, line: &str) {
        self.lock().qdiscs.push(line.to_string());
    }

    /// Fail the `add` that follows `successes` successful adds.
    pub fn fail_add_after(&self, successes: usize, stderr: &str) {
        self.lock().fail_add = Some((successes, stderr.to_string()));
    }

    /// Fail the `del` that follows `skipped` other deletes.
    pub fn fail_delete_after(&self, skipped: usize, stderr: &str) {
        self.lock().fail_delete = Some((skipped, stderr.to_string()));
    }

    /// Cause the next `show` to fail with the given stderr.
    pub fn fail_next_show(&self, stderr: &str) {
        self.lock().fail_next_show = Some(stderr.to_string());
    }

    /// Answer every command as `tc` does without `CAP_NET_ADMIN`.
    pub fn deny_privilege(&self) {
        self.lock().deny_privilege = true;
    }
}

impl Clone for SimulatedShaper {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

fn ok(stdout: String) -> TcOutput {
    TcOutput {
        stdout,
        stderr: String::new(),
        exit_code: 0,
    }
}

fn failed(stderr: String) -> TcOutput {
    TcOutput {
        stdout: String::new(),
        stderr,
        exit_code: 2,
    }
}

/// `qdisc add dev IF root handle 1: netem delay 25ms`
///   -> `qdisc netem 1: root delay 25ms`
fn render_qdisc(args: &[String]) -> String {
    let position = |word: &str| args.iter().position(|a| a == word);
    let value_after = |word: &str| position(word).and_then(|i| args.get(i + 1)).cloned();

    let kind_at = position("netem")
        .or_else(|| position("tbf"))
        .unwrap_or(args.len());
    let kind = args.get(kind_at).cloned().unwrap_or_else(|| "unknown".into());
    let handle = value_after("handle").unwrap_or_else(|| "0:".into());
    let attach = match value_after("parent") {
        Some(parent) => format!("parent {}", parent),
        None => "root".to_string(),
    };

    let mut line = format!("qdisc {} {} {}", kind, handle, attach);
    for arg in args.iter().skip(kind_at + 1) {
        line.push(' ');
        line.push_str(arg);
    }
    line
}

#[async_trait]
impl ShapingBackend for SimulatedShaper {
    async fn run(&self, command: &TcCommand) -> Result<TcOutput, ShapingError> {
        let mut inner = self.lock();
        inner.commands.push(command.clone());
        tracing::info!(command = %command, "dry-run: would run");

        if inner.deny_privilege {
            return Ok(failed(NOT_PERMITTED.into()));
        }

        let args = command.args();
        let verb = args.get(1).map(String::as_str).unwrap_or_default();

        let output = match verb {
            "add" => {
                if let Some((remaining, stderr)) = inner.fail_add.take() {
                    if remaining == 0 {
                        return Ok(failed(stderr));
                    }
                    inner.fail_add = Some((remaining - 1, stderr));
                }
                let is_root = args.iter().any(|a| a == "root");
                if is_root && !inner.qdiscs.is_empty() {
                    failed(ROOT_EXISTS.into())
                } else {
                    inner.qdiscs.push(render_qdisc(args));
                    ok(String::new())
                }
            }
            "del" => {
                if let Some((remaining, stderr)) = inner.fail_delete.take() {
                    if remaining == 0 {
                        return Ok(failed(stderr));
                    }
                    inner.fail_delete = Some((remaining - 1, stderr));
                }
                if inner.qdiscs.is_empty() {
                    failed(NOTHING_TO_DELETE.into())
                } else {
                    inner.qdiscs.clear();
                    ok(String::new())
                }
            }
            "show" => {
                if let Some(stderr) = inner.fail_next_show.take() {
                    failed(stderr)
                } else if inner.qdiscs.is_empty() {
                    ok(format!("{}\n", DEFAULT_QDISC))
                } else {
                    ok(format!("{}\n", inner.qdiscs.join("\n")))
                }
            }
            other => failed(format!("Command \"{}\" is unknown, try \"tc qdisc help\".", other)),
        };

        Ok(output)
    }

    fn name(&self) -> &'static str {
        "dry-run"
    }
}
