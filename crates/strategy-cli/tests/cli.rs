use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn version_flag_prints_the_binary_name() {
    let mut cmd = Command::cargo_bin("strategy").unwrap();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("strategy"));
}

#[test]
fn help_lists_the_run_subcommand() {
    let mut cmd = Command::cargo_bin("strategy").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"));
}

#[test]
fn run_reports_two_created_tasks_and_a_combine() {
    let mut cmd = Command::cargo_bin("strategy").unwrap();
    cmd.arg("run")
        .arg("genes linked to both diabetes and obesity")
        .assert()
        .success()
        .stdout(predicate::str::contains("left"))
        .stdout(predicate::str::contains("right"))
        .stdout(predicate::str::contains("combined"));
}

#[test]
fn run_with_json_format_emits_a_results_array() {
    let mut cmd = Command::cargo_bin("strategy").unwrap();
    cmd.arg("--format")
        .arg("json")
        .arg("run")
        .arg("genes linked to both diabetes and obesity")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"results\""));
}
