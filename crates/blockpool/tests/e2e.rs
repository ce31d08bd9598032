//! End-to-end CLI integration tests.

use assert_cmd::Command;
use predicates::prelude::*;

fn blockpool() -> Command {
    Command::cargo_bin("blockpool").expect("binary not found")
}

#[test]
fn help_flag() {
    blockpool()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("block pool"));
}

#[test]
fn version_flag() {
    blockpool()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("blockpool"));
}

#[test]
fn default_stress_run_is_disjoint() {
    blockpool()
        .arg("--json")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"unique_addresses\":20000"));
}

#[test]
fn stress_json_report_parses() {
    let output = blockpool()
        .args([
            "--capacity",
            "400",
            "--threads",
            "4",
            "--allocs-per-thread",
            "100",
            "--json",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["scenario"], "stress");
    assert_eq!(report["unique_addresses"], 400);
    assert_eq!(report["stats"]["in_use"], 0);
}

#[test]
fn reuse_scenario_text_report() {
    blockpool()
        .args(["--scenario", "reuse", "--capacity", "100"])
        .assert()
        .success()
        .stdout(predicate::str::contains("scenario:         reuse"))
        .stdout(predicate::str::contains("unique addresses: 100"));
}

#[test]
fn over_subscription_exits_with_pool_empty() {
    blockpool()
        .args(["--capacity", "10", "--threads", "2", "--allocs-per-thread", "10"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("pool is empty"));
}

#[test]
fn zero_block_size_is_invalid() {
    blockpool()
        .args(["--block-size", "0"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("block_size"));
}

#[test]
fn shrinking_grow_is_invalid() {
    blockpool()
        .args(["--capacity", "100", "--grow-to", "50"])
        .assert()
        .code(2);
}

#[test]
fn capacity_from_environment() {
    blockpool()
        .env("BLOCKPOOL_CAPACITY", "40")
        .args(["--threads", "2", "--allocs-per-thread", "20", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"capacity\":40"));
}
