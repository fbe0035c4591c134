//! Integration tests for the `wisp` binary, run against the stub guest.

#![cfg(test)]
#![allow(deprecated)]

use assert_cmd::Command;
use predicates::prelude::*;
use predicates::str::contains;
use serde_json::Value;
use tempfile::tempdir;

const STUB_GUEST: &str = concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../wisp-bridge/tests/fixtures/stub_guest.wat"
);

fn wisp() -> Command {
    let mut cmd = Command::cargo_bin("wisp").expect("wisp bin");
    cmd.env("NO_COLOR", "1")
        .env_remove("RUST_LOG")
        .env_remove("WISP_GUEST");
    cmd
}

#[test]
fn help_lists_subcommands() {
    wisp()
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("repl"))
        .stdout(contains("eval"))
        .stdout(contains("inspect"));
}

#[test]
fn missing_guest_is_reported() {
    let dir = tempdir().expect("tempdir");
    wisp()
        .arg("--guest")
        .arg(dir.path().join("absent.wasm"))
        .args(["eval", "1"])
        .assert()
        .failure()
        .stderr(contains("Failed to read guest"));
}

#[test]
fn eval_prints_rendered_value() {
    wisp()
        .args(["--guest", STUB_GUEST, "eval", "42"])
        .assert()
        .success()
        .stdout(contains("42"));
}

#[test]
fn eval_json_output() {
    let output = wisp()
        .args(["--guest", STUB_GUEST, "-o", "json", "eval", "42"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let json: Value = serde_json::from_slice(&output).expect("valid json");
    assert_eq!(json["source"], "42");
    assert_eq!(json["expression"]["kind"], "int");
    assert_eq!(json["raw"], 42);
    assert_eq!(json["value"]["kind"], "int");
    assert_eq!(json["value"]["value"], 42);
}

#[test]
fn eval_guest_output_goes_to_log() {
    wisp()
        .args(["--guest", STUB_GUEST, "eval", "t"])
        .assert()
        .success()
        .stdout(contains("T"))
        .stderr(contains("ABCD"));
}

#[test]
fn inspect_decodes_raw_words() {
    wisp()
        .args(["--guest", STUB_GUEST, "inspect", "0x20000000"])
        .assert()
        .success()
        .stdout(contains("NIL"));

    wisp()
        .args(["--guest", STUB_GUEST, "inspect", "0x70000001"])
        .assert()
        .success()
        .stdout(contains("#<unknown:7 0x70000001>"));
}

#[test]
fn inspect_rejects_bad_word() {
    wisp()
        .args(["--guest", STUB_GUEST, "inspect", "nil"])
        .assert()
        .failure()
        .stderr(contains("Invalid raw value"));
}

#[test]
fn repl_numbers_turns() {
    wisp()
        .args(["--guest", STUB_GUEST, "repl"])
        .write_stdin("42\n\nhello\n:history\n:quit\n7\n")
        .assert()
        .success()
        .stdout(contains("0  42 ↦ 42"))
        .stdout(contains("1  foo ↦ foo"))
        .stdout(contains("hello").not())
        .stdout(contains("7 ↦").not());
}

#[test]
fn repl_json_reports_decoded_expression() {
    let output = wisp()
        .args(["--guest", STUB_GUEST, "-o", "json", "repl"])
        .write_stdin("hello\n")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let line = String::from_utf8(output).expect("utf8");
    let json: Value = serde_json::from_str(line.trim()).expect("valid json");
    assert_eq!(json["source"], "hello");
    assert_eq!(json["expression"]["kind"], "sym");
    assert_eq!(json["expression"]["name"], "foo");
    assert_eq!(json["value"]["name"], "foo");
}

#[test]
fn guest_path_from_config_file() {
    let dir = tempdir().expect("tempdir");
    let config = dir.path().join("wisp.yaml");
    std::fs::write(&config, format!("guest: {}\n", STUB_GUEST)).expect("write config");

    wisp()
        .arg("-c")
        .arg(&config)
        .args(["eval", "5"])
        .assert()
        .success()
        .stdout(contains("5"));
}
