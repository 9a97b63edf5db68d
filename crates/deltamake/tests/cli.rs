//! End-to-end runs of the deltamake binary against a scratch solution.
//!
//! The compile/link tools are stubbed with `echo`/`true` so the scenarios
//! exercise planning, scheduling, and persistence without a real toolchain.

use std::fs;
use std::path::Path;
use std::process::Command;

use serde_json::json;

fn deltamake(dir: &Path, args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_deltamake"))
        .args(args)
        .current_dir(dir)
        .output()
        .expect("deltamake binary runs")
}

fn write_solution(dir: &Path) {
    let document = json!({
        "version": "1.0",
        "paths": { "scan": "src", "build": "build", "tmp": "build/tmp" },
        "files": ["a.c"],
        "builds": {
            "default": { "compiler": "echo", "linker": "true" },
        },
    });
    fs::write(
        dir.join("solution.json"),
        serde_json::to_string_pretty(&document).unwrap(),
    )
    .unwrap();
}

#[test]
fn fresh_build_then_up_to_date() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.c"), "int main(){}").unwrap();
    write_solution(dir.path());

    // First run compiles, links, and persists the record.
    let output = deltamake(dir.path(), &["-w", "2"]);
    assert!(output.status.success(), "first run failed: {output:?}");

    let record = fs::read_to_string(dir.path().join("deltamake.json")).unwrap();
    let record: serde_json::Value = serde_json::from_str(&record).unwrap();
    assert!(record["diff"]["default"]["a.c"].is_i64());

    // Second run sees nothing to do, still exits cleanly, and rewrites the
    // record unchanged.
    let before = fs::read_to_string(dir.path().join("deltamake.json")).unwrap();
    let output = deltamake(dir.path(), &["-w", "2"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Nothing to do."), "stdout: {stdout}");
    let after = fs::read_to_string(dir.path().join("deltamake.json")).unwrap();
    assert_eq!(before, after);
}

#[test]
fn force_ignores_the_record() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.c"), "int main(){}").unwrap();
    write_solution(dir.path());

    assert!(deltamake(dir.path(), &[]).status.success());
    // With --force the same source compiles again.
    let output = deltamake(dir.path(), &["--force"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(!stdout.contains("Nothing to do."), "stdout: {stdout}");
}

#[test]
fn dont_save_diff_suppresses_persistence() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.c"), "int main(){}").unwrap();
    write_solution(dir.path());

    assert!(deltamake(dir.path(), &["-d"]).status.success());
    assert!(!dir.path().join("deltamake.json").exists());
}

#[test]
fn missing_solution_is_a_failure() {
    let dir = tempfile::tempdir().unwrap();
    let output = deltamake(dir.path(), &[]);
    assert!(!output.status.success());
}

#[test]
fn unknown_build_is_a_failure() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.c"), "int main(){}").unwrap();
    write_solution(dir.path());

    let output = deltamake(dir.path(), &["release"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("release"), "stderr: {stderr}");
}

#[test]
fn help_and_unknown_flags_exit_successfully() {
    let dir = tempfile::tempdir().unwrap();
    assert!(deltamake(dir.path(), &["--help"]).status.success());
    assert!(deltamake(dir.path(), &["--frobnicate"]).status.success());

    let output = deltamake(dir.path(), &["-h"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Usage:"));
}

#[test]
fn no_build_stops_after_loading() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.c"), "int main(){}").unwrap();
    write_solution(dir.path());

    assert!(deltamake(dir.path(), &["--no-build"]).status.success());
    assert!(!dir.path().join("build").exists());
    assert!(!dir.path().join("deltamake.json").exists());
}
