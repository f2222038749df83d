//! End-to-end tests for the kiln binary against a temporary project

use serde_json::{json, Value};
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

fn kiln_bin() -> String {
    env!("CARGO_BIN_EXE_kiln").to_string()
}

/// Run `kiln` in `dir` and return (stdout, stderr, exit code)
fn run_kiln(dir: &Path, args: &[&str]) -> (String, String, i32) {
    let output = Command::new(kiln_bin())
        .arg("--project-dir")
        .arg(dir)
        .args(args)
        .env_remove("KILN_TARGET")
        .output()
        .unwrap_or_else(|e| panic!("Failed to execute kiln with args {:?}: {}", args, e));
    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.code().unwrap_or(-1),
    )
}

fn write_project(manifest: Value) -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("kiln.yml"),
        "name: demo\ndatabase:\n  path: warehouse.duckdb\n",
    )
    .unwrap();
    std::fs::create_dir_all(dir.path().join("seeds")).unwrap();
    std::fs::write(dir.path().join("seeds/users.csv"), "id,name\n1,ada\n2,grace\n").unwrap();
    std::fs::create_dir_all(dir.path().join("target")).unwrap();
    std::fs::write(
        dir.path().join("target/manifest.json"),
        manifest.to_string(),
    )
    .unwrap();
    dir
}

fn healthy_project() -> TempDir {
    write_project(json!({
        "dependencies": {"user_count": [], "user_report": ["user_count"]},
        "execution_order": ["user_count", "user_report"],
        "models": {
            "user_count": {"resolved_sql": "SELECT count(*) AS n FROM users"},
            "user_report": {
                "resolved_sql": "SELECT n * 10 AS score FROM user_count",
                "materialization": "view"
            }
        }
    }))
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn test_execute_writes_results_and_state() {
    let dir = healthy_project();
    let (stdout, stderr, code) = run_kiln(dir.path(), &["execute", "--quiet"]);
    assert_eq!(code, 0, "stdout: {}\nstderr: {}", stdout, stderr);
    assert!(stdout.contains("Completed: 2 succeeded, 0 failed, 0 skipped"));
    assert!(stdout.contains("Seeds: 1 loaded, 0 failed"));

    let results = read_json(&dir.path().join("target/run_results.json"));
    assert_eq!(results["mode"], "execute");
    assert_eq!(results["executed_tables"], json!(["user_count", "user_report"]));

    let state = read_json(&dir.path().join("target/state.json"));
    assert!(state.to_string().contains("user_report"));
}

#[test]
fn test_state_command_lists_models() {
    let dir = healthy_project();
    let (_, _, code) = run_kiln(dir.path(), &["execute", "--quiet"]);
    assert_eq!(code, 0);

    let (stdout, _, code) = run_kiln(dir.path(), &["state", "--output", "json"]);
    assert_eq!(code, 0);
    let records: Value = serde_json::from_str(&stdout).unwrap();
    let names: Vec<&str> = records
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["user_count", "user_report"]);
}

#[test]
fn test_json_output_on_stdout() {
    let dir = healthy_project();
    let (stdout, _, code) = run_kiln(dir.path(), &["build", "--output", "json", "--no-seeds"]);
    // user_count reads the seed table, which was never loaded
    assert_eq!(code, 1);
    let result: Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(result["mode"], "build");
    assert_eq!(result["failed_tables"][0]["table"], "user_count");
    assert_eq!(result["skipped_tables"], json!(["user_report"]));
    assert!(result["aborted"].as_str().unwrap().starts_with("user_count failed"));
}

#[test]
fn test_execute_failure_exits_with_1() {
    let dir = write_project(json!({
        "dependencies": {"broken": [], "fine": []},
        "execution_order": ["broken", "fine"],
        "models": {
            "broken": {"resolved_sql": "SELEC 1"},
            "fine": {"resolved_sql": "SELECT 1 AS id"}
        }
    }));
    let (stdout, _, code) = run_kiln(dir.path(), &["execute", "--quiet"]);
    assert_eq!(code, 1);
    assert!(stdout.contains("Completed: 1 succeeded, 1 failed, 0 skipped"));
}

#[test]
fn test_missing_project_exits_with_2() {
    let dir = TempDir::new().unwrap();
    let (_, stderr, code) = run_kiln(dir.path(), &["execute"]);
    assert_eq!(code, 2);
    assert!(stderr.contains("Error:"));
}

#[test]
fn test_missing_manifest_exits_with_2() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("kiln.yml"), "name: demo\n").unwrap();
    let (_, stderr, code) = run_kiln(dir.path(), &["build"]);
    assert_eq!(code, 2);
    assert!(stderr.contains("manifest"));
}
