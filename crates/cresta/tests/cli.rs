//! CLI smoke tests.

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn version_subcommand_prints_version() {
    Command::cargo_bin("cresta")
        .unwrap()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("cresta "));
}

#[test]
fn run_requires_an_image() {
    Command::cargo_bin("cresta")
        .unwrap()
        .arg("run")
        .assert()
        .failure()
        .stderr(predicate::str::contains("IMAGE"));
}
