//! Integration tests for the command-line interface

use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn forkpatch(cwd: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_forkpatch"))
        .current_dir(cwd)
        .args(args)
        .env("RUST_LOG", "warn")
        .env("NO_COLOR", "1")
        .output()
        .expect("failed to run forkpatch")
}

fn write(path: &Path, text: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, text).unwrap();
}

/// Base and working trees with one edited class carrying an inline marker.
fn setup_trees() -> TempDir {
    let dir = TempDir::new().unwrap();
    write(
        &dir.path().join("base/a/A.java"),
        "package a;\n\nclass A {\n    void m() {}\n}\n",
    );
    write(
        &dir.path().join("working/a/A.java"),
        "package a;\n\nclass A {\n    // Paper-AT: public m()V\n    public void m() { return; }\n}\n",
    );
    dir
}

#[test]
fn test_rebuild_then_apply() {
    let dir = setup_trees();
    let root = dir.path();

    let output = forkpatch(
        root,
        &["rebuild", "--base", "base", "--working", "working", "--patches", "patches", "--at-table", "fork.at"],
    );
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Rebuilt 1 patches"), "{stdout}");

    let patch = fs::read_to_string(root.join("patches/a/A.java.patch")).unwrap();
    assert!(patch.starts_with("AT: public m()V\n===="));
    assert_eq!(fs::read_to_string(root.join("fork.at")).unwrap(), "public a.A m()V\n");

    let output = forkpatch(root, &["apply", "--source", "base", "--patches", "patches", "--output", "out"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(
        fs::read_to_string(root.join("out/a/A.java")).unwrap(),
        fs::read_to_string(root.join("working/a/A.java")).unwrap()
    );
}

#[test]
fn test_apply_failure_exits_nonzero_with_json_report() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(&root.join("src/A.java"), "class A {\n}\n");
    write(
        &root.join("patches/A.java.patch"),
        "--- a/A.java\n+++ b/A.java\n@@ -1,2 +1,3 @@\n class B {\n+    int x;\n }\n",
    );

    let output = forkpatch(root, &["--json", "apply", "--source", "src", "--patches", "patches"]);
    assert_eq!(output.status.code(), Some(1));

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let results = report["patches"]["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["status"], "per_file_failure");
    assert_eq!(results[0]["failure"]["kind"], "hunk_apply_failure");
    // in place, failed patch leaves the file alone
    assert_eq!(fs::read_to_string(root.join("src/A.java")).unwrap(), "class A {\n}\n");
}

#[test]
fn test_collect_ats_reports_malformed_tokens() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(
        &root.join("patches/p/Q.java.patch"),
        "AT: pub x\nAT: private-f y\n====\n--- a/p/Q.java\n+++ b/p/Q.java\n",
    );

    let output = forkpatch(root, &["collect-ats", "--patches", "patches"]);
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(String::from_utf8_lossy(&output.stdout), "private-f p.Q y\n");
    assert!(String::from_utf8_lossy(&output.stderr).contains("pub"));
}

#[test]
fn test_config_file_is_validated() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    fs::create_dir_all(root.join("patches")).unwrap();
    fs::create_dir_all(root.join("src")).unwrap();
    fs::write(root.join("forkpatch.toml"), "[apply]\ntimeout_secs = 0\n").unwrap();

    let output = forkpatch(root, &["apply", "--source", "src", "--patches", "patches"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("timeout_secs"));
}

#[test]
fn test_setup_apply_and_reset() {
    if Command::new("git").arg("--version").output().is_err() {
        eprintln!("git not found, skipping");
        return;
    }
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(&root.join("vanilla/A.java"), "class A {\n}\n");
    write(
        &root.join("patches/A.java.patch"),
        "--- a/A.java\n+++ b/A.java\n@@ -1,2 +1,3 @@\n class A {\n+    int x;\n }\n",
    );

    let output = forkpatch(root, &["setup", "--vanilla", "vanilla", "--tree", "tree"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let output = forkpatch(root, &["apply", "--source", "tree", "--patches", "patches", "--checkpoint"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(String::from_utf8_lossy(&output.stdout).contains("Tagged patched"));
    assert_eq!(fs::read_to_string(root.join("tree/A.java")).unwrap(), "class A {\n    int x;\n}\n");

    let output = forkpatch(root, &["reset", "--tree", "tree"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(fs::read_to_string(root.join("tree/A.java")).unwrap(), "class A {\n}\n");
}
