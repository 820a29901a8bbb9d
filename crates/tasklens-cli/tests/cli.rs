use std::fs;
use std::path::Path;
use std::process::Command;

use serde_json::Value;
use tempfile::TempDir;

const STORE: &str = "# Active Tasks

## [TASK-001] Build login form
**Status**: completed
**Priority**: high
**Category**: feature
**Epic**: Auth Revamp
**Depends On**: (none)

---

## [TASK-002] Session cache
**Status**: pending
**Priority**: medium
**Category**: feature
**Depends On**: TASK-001, TASK-404

---

## [TASK-003] Cache eviction metrics
**Status**: blocked
**Priority**: low
**Depends On**: (none)

---
";

fn bin() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_tasklens"));
    cmd.env_remove("RUST_LOG").env("TASKLENS_HOME", "/nonexistent-tasklens-home");
    cmd
}

fn write_store(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("tasks.md");
    fs::write(&path, STORE).expect("write store");
    path
}

#[test]
fn analyze_prints_analysis_json() {
    let temp = TempDir::new().expect("temp");
    let path = write_store(temp.path());

    let output = bin()
        .current_dir(temp.path())
        .arg("analyze")
        .arg("--file")
        .arg(&path)
        .arg("[BLOCKER] fix session cache after TASK-002")
        .output()
        .expect("analyze");
    assert!(output.status.success());
    let value: Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(value["priority"], "critical");
    assert_eq!(value["category"], "bug");
    assert_eq!(value["depends_on"][0], "TASK-002");
    assert!(value["reasoning"].as_array().map(|r| !r.is_empty()).unwrap_or(false));
}

#[test]
fn sanitize_fix_rewrites_store() {
    let temp = TempDir::new().expect("temp");
    let path = write_store(temp.path());

    let output = bin()
        .current_dir(temp.path())
        .args(["sanitize", "--fix", "--file"])
        .arg(&path)
        .output()
        .expect("sanitize");
    assert!(output.status.success());
    let report: Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(report["total_tasks"], 3);
    assert_eq!(report["critical_count"], 1);
    assert_eq!(report["issues"][0]["type"], "orphaned_dependency");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Fixed 1 auto-fixable issues"));

    let text = fs::read_to_string(&path).expect("read");
    assert!(text.contains("**Depends On**: TASK-001\n"));
    assert!(!text.contains("TASK-404"));
    assert!(!text.contains("**Related**"));
}

#[test]
fn search_uses_configured_tasks_file() {
    let temp = TempDir::new().expect("temp");
    write_store(temp.path());
    fs::write(temp.path().join(".tasklens.toml"), "tasks_file = \"tasks.md\"\n").expect("config");

    let output = bin()
        .current_dir(temp.path())
        .args(["search", "cache", "--scores"])
        .output()
        .expect("search");
    assert!(output.status.success());
    let value: Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(value["query"], "cache");
    assert_eq!(value["total_results"], 2);
    assert_eq!(value["results"][0]["option"], "A");
    assert_eq!(value["results"][0]["task_id"], "TASK-002");
    let table = value["table"].as_str().unwrap_or("");
    assert!(table.contains("| A | [ACTIVE] | [*] | Session cache |"));
    assert!(table.contains("(Relevance scores: A=102, B=100)"));
}

#[test]
fn validate_reports_missing_file() {
    let temp = TempDir::new().expect("temp");
    let output = bin()
        .current_dir(temp.path())
        .args(["validate", "--file", "missing.md"])
        .output()
        .expect("validate");
    assert!(!output.status.success());
    let value: Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(value["valid"], false);
    assert!(value["error"]
        .as_str()
        .unwrap_or("")
        .starts_with("Tasks file not found"));
}

#[test]
fn show_prints_section_or_fails() {
    let temp = TempDir::new().expect("temp");
    let path = write_store(temp.path());

    let output = bin()
        .current_dir(temp.path())
        .args(["show", "TASK-003", "--file"])
        .arg(&path)
        .output()
        .expect("show");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("## [TASK-003] Cache eviction metrics\n"));
    assert!(!stdout.contains("---"));

    let missing = bin()
        .current_dir(temp.path())
        .args(["show", "TASK-999", "--file"])
        .arg(&path)
        .output()
        .expect("show missing");
    assert!(!missing.status.success());
    let err: Value = serde_json::from_slice(&missing.stderr).expect("json error");
    assert!(err["error"].as_str().unwrap_or("").contains("TASK-999"));
}

#[test]
fn missing_tasks_file_is_a_json_error() {
    let temp = TempDir::new().expect("temp");
    let output = bin()
        .current_dir(temp.path())
        .args(["analyze", "add export button"])
        .output()
        .expect("analyze");
    assert!(!output.status.success());
    let err: Value = serde_json::from_slice(&output.stderr).expect("json error");
    assert!(err["error"].as_str().unwrap_or("").contains("--file"));
}

#[test]
fn version_prints_package_version() {
    let output = bin().arg("version").output().expect("version");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with(&format!("tasklens {}", env!("CARGO_PKG_VERSION"))));
}
