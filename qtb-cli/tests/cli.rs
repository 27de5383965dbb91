//! Command-line tests for the `qtb` binary.
//!
//! Suites run in dry-run mode with `/bin/sh` standing in for the server and
//! client, so no privileges are needed.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn qtb() -> Command {
    Command::cargo_bin("qtb").unwrap()
}

/// Write a dry-run suite whose client runs `client_script` with the
/// artifact path as `$0`.
fn write_suite(dir: &Path, server_script: &str, client_script: &str, experiments: &str) -> PathBuf {
    let suite = format!(
        r#"
[suite]
name = "cli-test"

[network]
mode = "dry-run"

[server]
program = "/bin/sh"
args = ['-c', '{server}']
startup_grace_ms = 100
stop_grace_ms = 300

[client]
program = "/bin/sh"
args = ['-c', '{client}', '{{output}}']
duration_secs = 1
timeout_grace_secs = 10

[output]
root = '{root}'
{experiments}
"#,
        server = server_script,
        client = client_script,
        root = dir.join("runs").display(),
        experiments = experiments,
    );
    let path = dir.join("suite.toml");
    std::fs::write(&path, suite).unwrap();
    path
}

const TWO_EXPERIMENTS: &str = r#"
[[experiments]]
id = 0
label = "baseline"

[[experiments]]
id = 1
label = "lossy"
shaping = { delay = "25ms", loss_percent = 2.0 }
"#;

fn only_session(dir: &Path) -> PathBuf {
    let mut sessions: Vec<_> = std::fs::read_dir(dir.join("runs"))
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(sessions.len(), 1, "expected one session dir");
    sessions.remove(0)
}

fn artifact_count(session: &Path) -> usize {
    std::fs::read_dir(session)
        .unwrap()
        .filter(|e| {
            e.as_ref()
                .unwrap()
                .path()
                .extension()
                .is_some_and(|ext| ext == "qlog")
        })
        .count()
}

#[test]
fn help_lists_commands() {
    qtb()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("load"))
        .stdout(predicate::str::contains("show"))
        .stdout(predicate::str::contains("init"));
}

#[test]
fn init_creates_suite_and_refuses_overwrite() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("qtb.toml");

    qtb()
        .arg("init")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Suite written"));
    assert!(path.exists());

    qtb()
        .arg("init")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    qtb().arg("init").arg(&path).arg("--force").assert().success();
}

#[test]
fn dry_run_suite_succeeds_and_writes_status() {
    let dir = TempDir::new().unwrap();
    let suite = write_suite(
        dir.path(),
        "exec sleep 30",
        r#"echo qlog-data > "$0""#,
        TWO_EXPERIMENTS,
    );

    qtb()
        .arg("run")
        .arg(&suite)
        .assert()
        .success()
        .stdout(predicate::str::contains("Session:"))
        .stdout(predicate::str::contains("baseline"))
        .stdout(predicate::str::contains("lossy"))
        .stdout(predicate::str::contains("2 succeeded"));

    let session = only_session(dir.path());
    assert!(session.join("status.json").exists());
    assert_eq!(artifact_count(&session), 2);
}

#[test]
fn inline_experiments_replace_suite_list() {
    let dir = TempDir::new().unwrap();
    let suite = write_suite(
        dir.path(),
        "exec sleep 30",
        r#"echo qlog-data > "$0""#,
        TWO_EXPERIMENTS,
    );

    qtb()
        .arg("run")
        .arg(&suite)
        .args(["-e", "7:adhoc:delay=10ms,rate=5mbit"])
        .assert()
        .success()
        .stdout(predicate::str::contains("adhoc"))
        .stdout(predicate::str::contains("lossy").not());

    assert_eq!(artifact_count(&only_session(dir.path())), 1);
}

#[test]
fn output_dir_override_is_used() {
    let dir = TempDir::new().unwrap();
    let suite = write_suite(
        dir.path(),
        "exec sleep 30",
        r#"echo qlog-data > "$0""#,
        TWO_EXPERIMENTS,
    );
    let elsewhere = dir.path().join("elsewhere");

    qtb()
        .arg("run")
        .arg(&suite)
        .arg("--output-dir")
        .arg(&elsewhere)
        .args(["-e", "0:baseline"])
        .assert()
        .success();

    assert_eq!(std::fs::read_dir(&elsewhere).unwrap().count(), 1);
    assert!(!dir.path().join("runs").exists());
}

#[test]
fn server_that_exits_fails_the_session() {
    let dir = TempDir::new().unwrap();
    let suite = write_suite(dir.path(), "exit 1", r#"echo qlog-data > "$0""#, TWO_EXPERIMENTS);

    qtb()
        .arg("run")
        .arg(&suite)
        .assert()
        .failure()
        .stdout(predicate::str::contains("failed"));
}

#[test]
fn abort_policy_skips_remaining() {
    let dir = TempDir::new().unwrap();
    let suite = write_suite(dir.path(), "exit 1", r#"echo qlog-data > "$0""#, TWO_EXPERIMENTS);

    qtb()
        .arg("run")
        .arg(&suite)
        .args(["--on-failure", "abort"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("1 skipped"))
        .stdout(predicate::str::contains("stopped early"));
}

#[test]
fn empty_suite_is_rejected() {
    let dir = TempDir::new().unwrap();
    let suite = write_suite(dir.path(), "exec sleep 30", "true", "");

    qtb()
        .arg("run")
        .arg(&suite)
        .assert()
        .failure()
        .stderr(predicate::str::contains("No experiments"));
}

#[test]
fn malformed_inline_experiment_is_rejected() {
    let dir = TempDir::new().unwrap();
    let suite = write_suite(dir.path(), "exec sleep 30", "true", TWO_EXPERIMENTS);

    qtb()
        .arg("run")
        .arg(&suite)
        .args(["-e", "not-an-experiment"])
        .assert()
        .failure();
}

/// Wait until `status.json` in the only session under `dir/runs` contains `needle`.
fn wait_for_status(dir: &Path, needle: &str) -> PathBuf {
    let deadline = Instant::now() + Duration::from_secs(15);
    while Instant::now() < deadline {
        if let Some(session) = std::fs::read_dir(dir.join("runs"))
            .ok()
            .and_then(|mut entries| entries.next())
            .and_then(|entry| entry.ok())
            .map(|entry| entry.path())
        {
            let status = std::fs::read_to_string(session.join("status.json")).unwrap_or_default();
            if status.contains(needle) {
                return session;
            }
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    panic!("status never contained {:?}", needle);
}

#[test]
fn sigint_interrupts_run_and_records_it() {
    let dir = TempDir::new().unwrap();
    let suite = write_suite(dir.path(), "exec sleep 30", "exec sleep 30", TWO_EXPERIMENTS);

    let mut child = std::process::Command::new(assert_cmd::cargo::cargo_bin("qtb"))
        .arg("run")
        .arg(&suite)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();

    let session = wait_for_status(dir.path(), r#""status": "running""#);
    std::thread::sleep(Duration::from_millis(200));
    let sent = std::process::Command::new("kill")
        .args(["-INT", &child.id().to_string()])
        .status()
        .unwrap();
    assert!(sent.success());

    let started = Instant::now();
    let exit = loop {
        if let Some(exit) = child.try_wait().unwrap() {
            break exit;
        }
        if started.elapsed() > Duration::from_secs(15) {
            let _ = child.kill();
            panic!("qtb did not exit after SIGINT");
        }
        std::thread::sleep(Duration::from_millis(50));
    };
    assert!(!exit.success());

    let status = std::fs::read_to_string(session.join("status.json")).unwrap();
    assert!(status.contains(r#""interrupted": true"#));
    assert!(status.contains(r#""status": "skipped""#));
}

#[test]
fn show_prints_finished_session() {
    let dir = TempDir::new().unwrap();
    let suite = write_suite(
        dir.path(),
        "exec sleep 30",
        r#"echo qlog-data > "$0""#,
        TWO_EXPERIMENTS,
    );
    qtb().arg("run").arg(&suite).assert().success();

    qtb()
        .arg("show")
        .arg(only_session(dir.path()))
        .assert()
        .success()
        .stdout(predicate::str::contains("Suite:   cli-test"))
        .stdout(predicate::str::contains("completed (exit 0)"));
}

#[test]
fn show_missing_session_fails() {
    let dir = TempDir::new().unwrap();
    qtb()
        .arg("show")
        .arg(dir.path().join("nope"))
        .assert()
        .failure();
}

#[test]
fn load_writes_client_output() {
    let dir = TempDir::new().unwrap();
    let suite = write_suite(dir.path(), "exec sleep 30", r#"echo load > "$0""#, "");
    let output = dir.path().join("load").join("out.qlog");

    qtb()
        .arg("load")
        .args(["--duration", "1", "--rate", "50"])
        .arg("--output")
        .arg(&output)
        .arg("--config")
        .arg(&suite)
        .assert()
        .success()
        .stdout(predicate::str::contains("completed (exit 0)"));

    assert_eq!(std::fs::read_to_string(&output).unwrap().trim(), "load");
}

#[test]
fn load_rejects_zero_rate() {
    let dir = TempDir::new().unwrap();
    let suite = write_suite(dir.path(), "exec sleep 30", "true", "");

    qtb()
        .arg("load")
        .args(["--duration", "1", "--rate", "0", "--output", "out"])
        .arg("--config")
        .arg(&suite)
        .assert()
        .failure()
        .stderr(predicate::str::contains("--rate"));
}
