//! CLI smoke tests
//!
//! Serial: every `et` invocation writes the same user-level log file.

use assert_cmd::Command;
use predicates::prelude::*;
use serial_test::serial;
use tempfile::tempdir;

#[test]
#[serial]
fn test_help_lists_subcommands() {
    Command::cargo_bin("et")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("clone"))
        .stdout(predicate::str::contains("feature"))
        .stdout(predicate::str::contains("status"));
}

#[test]
#[serial]
fn test_status_reports_needs_clone() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("envtree.yml");
    std::fs::write(
        &config,
        format!(
            "storage:\n  clones-dir: {root}/clones\n  scratch-dir: {root}/scratch\nprojects:\n  - name: demo\n    environments:\n      - name: main\n        directory: {root}/worktrees\n        repositories:\n          - id: core\n            url: {root}/nowhere\n            branch: main\n",
            root = dir.path().display()
        ),
    )
    .unwrap();

    Command::cargo_bin("et")
        .unwrap()
        .current_dir(dir.path())
        .args(["--config", config.to_str().unwrap(), "status", "demo/main"])
        .assert()
        .success()
        .stdout(predicate::str::contains("NeedsClone"))
        .stdout(predicate::str::contains("core  not cloned"));
}

#[test]
#[serial]
fn test_unknown_environment_fails() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("envtree.yml");
    std::fs::write(&config, "projects: []\n").unwrap();

    Command::cargo_bin("et")
        .unwrap()
        .current_dir(dir.path())
        .args(["--config", config.to_str().unwrap(), "status", "no/such"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown environment"));
}
