//! Integration tests for the `dot8021x-authd` binary's command-line surface.

use assert_cmd::Command;
use predicates::prelude::*;

fn authd() -> Command {
    Command::cargo_bin("dot8021x-authd").unwrap()
}

#[test]
fn help_lists_the_run_subcommand() {
    authd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("802.1X"));
}

#[test]
fn version_reports_the_crate_version() {
    authd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn run_rejects_a_malformed_port_id() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config.toml");
    std::fs::write(
        &config_path,
        r#"
            interface = "eth0"

            [radius]
            server_ip = "127.0.0.1"
            secret = "s3cret"
        "#,
    )
    .unwrap();

    authd()
        .args(["--config", config_path.to_str().unwrap(), "run", "--foreground", "--port-id", "not-a-mac"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("MAC-shaped"));
}

#[test]
fn missing_config_file_fails_with_a_clear_message() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("does-not-exist.toml");

    authd()
        .args(["--config", config_path.to_str().unwrap(), "status"])
        .assert()
        .failure();
}

#[test]
fn status_reports_not_running_for_a_fresh_pid_file_path() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config.toml");
    std::fs::write(
        &config_path,
        format!(
            r#"
                interface = "eth0"

                [radius]
                server_ip = "127.0.0.1"
                secret = "s3cret"

                [general]
                pid_file = "{pid}"
            "#,
            pid = dir.path().join("authd.pid").display()
        ),
    )
    .unwrap();

    authd()
        .args(["--config", config_path.to_str().unwrap(), "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("not running"));
}
