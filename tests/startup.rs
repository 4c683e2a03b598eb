use assert_cmd::prelude::*;
use std::process::Command;

#[test]
fn exits_with_startup_failure_without_configuration() {
    let bin = assert_cmd::cargo::cargo_bin!("spinwatch");
    let assert = Command::new(bin)
        .env_clear()
        .env("RUST_LOG", "info")
        .assert()
        .code(1);

    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).into_owned();
    assert!(stdout.contains("PHONE"), "stdout: {stdout}");
}
