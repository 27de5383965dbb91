//! `tc` command planning for network shaping.
//!
//! Translates [`ShapingParams`] into the `tc qdisc` commands that realise
//! them on one interface. Delay and loss are emulated by a `netem` qdisc
//! installed at the root; a bandwidth ceiling is a `tbf` qdisc attached as
//! the netem node's child, so packets are delayed/dropped first and paced
//! second.
//!
//! ```text
//! dev <iface>
//!   └── root 1: netem [delay D] [loss L%]
//!         └── parent 1:1 10: tbf rate R burst B latency 50ms
//! ```

use qtb_types::{format_delay, Bandwidth, ShapingParams};
use std::fmt;

/// Handle of the root netem qdisc.
pub const ROOT_HANDLE: &str = "1:";

/// Handle of the child rate limiter.
pub const LIMITER_HANDLE: &str = "10:";

/// Parent class the rate limiter hangs under.
const LIMITER_PARENT: &str = "1:1";

/// Maximum queueing latency allowed by the rate limiter.
const LIMITER_LATENCY: &str = "50ms";

/// Smallest token bucket the limiter is given (one full-size frame plus slack).
const MIN_BURST_BYTES: u64 = 1600;

/// One `tc` invocation, held as its argument vector (without the `tc` itself).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcCommand {
    args: Vec<String>,
}

impl TcCommand {
    fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// `tc qdisc del dev <iface> root` - remove every shaping rule.
    pub fn delete_root(interface: &str) -> Self {
        Self::new(["qdisc", "del", "dev", interface, "root"])
    }

    /// `tc qdisc show dev <iface>` - list installed rules.
    pub fn show(interface: &str) -> Self {
        Self::new(["qdisc", "show", "dev", interface])
    }

    /// Arguments passed to `tc`.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// True for commands that remove rules.
    pub fn is_delete(&self) -> bool {
        self.args.get(1).map(String::as_str) == Some("del")
    }
}

impl fmt::Display for TcCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tc {}", self.args.join(" "))
    }
}

/// Ordered list of commands that install one set of shaping parameters.
///
/// An empty plan means the parameters impose no constraint (a baseline run).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcPlan {
    commands: Vec<TcCommand>,
}

impl TcPlan {
    /// Build the install plan for `params` on `interface`.
    pub fn install(interface: &str, params: &ShapingParams) -> Self {
        if params.is_empty() {
            return Self {
                commands: Vec::new(),
            };
        }

        let mut netem: Vec<String> = vec![
            "qdisc".into(),
            "add".into(),
            "dev".into(),
            interface.into(),
            "root".into(),
            "handle".into(),
            ROOT_HANDLE.into(),
            "netem".into(),
        ];

        if let Some(delay) = params.delay {
            netem.push("delay".into());
            netem.push(format_delay(delay));
        }

        if let Some(loss) = params.loss_percent {
            netem.push("loss".into());
            netem.push(format!("{}%", loss));
        }

        let mut commands = vec![TcCommand::new(netem)];

        if let Some(rate) = params.rate_limit {
            commands.push(TcCommand::new([
                "qdisc".to_string(),
                "add".into(),
                "dev".into(),
                interface.into(),
                "parent".into(),
                LIMITER_PARENT.into(),
                "handle".into(),
                LIMITER_HANDLE.into(),
                "tbf".into(),
                "rate".into(),
                rate.to_string(),
                "burst".into(),
                burst_bytes(rate).to_string(),
                "latency".into(),
                LIMITER_LATENCY.into(),
            ]));
        }

        Self { commands }
    }

    /// Commands in execution order.
    pub fn commands(&self) -> &[TcCommand] {
        &self.commands
    }
}

/// Token bucket size: 10ms worth of traffic at `rate`, never below one frame.
fn burst_bytes(rate: Bandwidth) -> u64 {
    std::cmp::max(rate.bytes_per_sec() / 100, MIN_BURST_BYTES)
}

/// True if `tc` stderr says there was nothing to delete.
///
/// Deleting the root qdisc of an interface that only has the kernel default
/// fails with one of these messages; for a reset that is success.
pub fn is_absent_qdisc_error(stderr: &str) -> bool {
    const ABSENT: [&str; 4] = [
        "Cannot delete qdisc with handle of zero",
        "No such file or directory",
        "Invalid handle",
        "Cannot find specified qdisc",
    ];
    ABSENT.iter().any(|needle| stderr.contains(needle))
}

/// True if `tc` stderr reports missing `CAP_NET_ADMIN`.
pub fn is_permission_error(stderr: &str) -> bool {
    stderr.contains("Operation not permitted") || stderr.contains("Permission denied")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn args(cmd: &TcCommand) -> Vec<&str> {
        cmd.args().iter().map(String::as_str).collect()
    }

    #[test]
    fn baseline_plan_is_empty() {
        let plan = TcPlan::install("lo", &ShapingParams::none());
        assert!(plan.commands().is_empty());
    }

    #[test]
    fn delay_only_builds_root_netem() {
        let params = ShapingParams::none().delay(Duration::from_millis(50));
        let plan = TcPlan::install("lo", &params);

        assert_eq!(plan.commands().len(), 1);
        assert_eq!(
            args(&plan.commands()[0]),
            vec!["qdisc", "add", "dev", "lo", "root", "handle", "1:", "netem", "delay", "50ms"]
        );
    }

    #[test]
    fn delay_and_loss_share_the_netem_node() {
        let params = ShapingParams::none()
            .delay(Duration::from_millis(25))
            .loss(2.0);
        let plan = TcPlan::install("eth0", &params);

        assert_eq!(
            plan.commands()[0].to_string(),
            "tc qdisc add dev eth0 root handle 1: netem delay 25ms loss 2%"
        );
    }

    #[test]
    fn rate_limiter_is_child_of_netem() {
        let params = ShapingParams::none()
            .delay(Duration::from_millis(25))
            .loss(2.0)
            .rate(Bandwidth::from_mbit(10));
        let plan = TcPlan::install("lo", &params);

        assert_eq!(plan.commands().len(), 2);
        assert!(args(&plan.commands()[0]).contains(&"root"));
        assert_eq!(
            args(&plan.commands()[1]),
            vec![
                "qdisc", "add", "dev", "lo", "parent", "1:1", "handle", "10:", "tbf", "rate",
                "10mbit", "burst", "12500", "latency", "50ms"
            ]
        );
    }

    #[test]
    fn rate_only_still_installs_netem_root() {
        let params = ShapingParams::none().rate(Bandwidth::from_kbit(56));
        let plan = TcPlan::install("lo", &params);

        assert_eq!(plan.commands().len(), 2);
        assert_eq!(
            plan.commands()[0].to_string(),
            "tc qdisc add dev lo root handle 1: netem"
        );
        // 56kbit is 7000 B/s; 10ms of that is below one frame
        assert!(plan.commands()[1].to_string().contains("burst 1600"));
    }

    #[test]
    fn zero_delay_is_installed_explicitly() {
        let params = ShapingParams::none().delay(Duration::ZERO);
        let plan = TcPlan::install("lo", &params);
        assert!(plan.commands()[0].to_string().ends_with("netem delay 0ms"));
    }

    #[test]
    fn delete_and_show_commands() {
        assert_eq!(TcCommand::delete_root("lo").to_string(), "tc qdisc del dev lo root");
        assert!(TcCommand::delete_root("lo").is_delete());
        assert_eq!(TcCommand::show("lo").to_string(), "tc qdisc show dev lo");
        assert!(!TcCommand::show("lo").is_delete());
    }

    #[test]
    fn absent_qdisc_messages_are_recognised() {
        assert!(is_absent_qdisc_error(
            "Error: Cannot delete qdisc with handle of zero."
        ));
        assert!(is_absent_qdisc_error("RTNETLINK answers: No such file or directory"));
        assert!(!is_absent_qdisc_error("RTNETLINK answers: Operation not permitted"));
    }

    #[test]
    fn permission_messages_are_recognised() {
        assert!(is_permission_error("RTNETLINK answers: Operation not permitted"));
        assert!(!is_permission_error("Error: Invalid handle."));
    }
}
