use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn prints_version() {
    Command::cargo_bin("telex")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")))
        .stdout(predicate::str::starts_with("Telex "));
}

#[test]
fn prints_help() {
    Command::cargo_bin("telex")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Telex"))
        .stdout(predicate::str::contains("--version"))
        .stdout(predicate::str::contains("--offline"));
}

#[test]
fn rejects_unknown_arguments() {
    Command::cargo_bin("telex")
        .unwrap()
        .arg("--frobnicate")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unknown argument: --frobnicate"));
}

#[test]
fn config_flag_requires_a_path() {
    Command::cargo_bin("telex")
        .unwrap()
        .arg("--config")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--config needs a path"));
}
