//! CLI contract tests
//!
//! Runs the real binary in isolated temp directories. Nothing here needs
//! network access, an API key or `node`.

use std::path::Path;
use std::process::{Command, Output};

const LEGACY: &str = "function load(items) {
  var out = [];
  for (var i = 0; i < items.length; i++) {
    out.push(items[i] * 2);
  }
  return out;
}

function add(a, b) { return a + b; }
";

fn codevolve(dir: &Path, args: &[&str]) -> Output {
    codevolve_with_env(dir, args, &[])
}

fn codevolve_with_env(dir: &Path, args: &[&str], vars: &[(&str, &str)]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_codevolve"))
        .args(args)
        .current_dir(dir)
        // Keep the developer's own config and keys out of the run
        .env("XDG_CONFIG_HOME", dir.join(".config-home"))
        .env("HOME", dir)
        .env_remove("GROQ_API_KEY")
        .env_remove("RUST_LOG")
        .env_remove("CODEVOLVE_REPORT_URL")
        .envs(vars.iter().copied())
        .output()
        .expect("failed to run codevolve")
}

fn setup_project() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("app/src")).unwrap();
    std::fs::create_dir_all(dir.path().join("app/node_modules/dep")).unwrap();
    std::fs::write(dir.path().join("app/src/legacy.js"), LEGACY).unwrap();
    std::fs::write(dir.path().join("app/node_modules/dep/index.js"), LEGACY).unwrap();
    dir
}

#[test]
fn test_scan_reports_candidates_without_writing() {
    let dir = setup_project();
    let out = codevolve(dir.path(), &["scan", "app"]);
    let stdout = String::from_utf8_lossy(&out.stdout);

    assert!(out.status.success(), "scan failed: {}", String::from_utf8_lossy(&out.stderr));
    assert!(stdout.contains("legacy.js"));
    assert!(stdout.contains("load"));
    assert!(stdout.contains("uses 'var'"));
    assert!(stdout.contains("too simple"));
    assert!(!stdout.contains("node_modules"));
    assert!(stdout.contains("Nothing was modified"));

    let source = std::fs::read_to_string(dir.path().join("app/src/legacy.js")).unwrap();
    assert_eq!(source, LEGACY);
    assert!(!dir.path().join("app/src/legacy.js.bak").exists());
}

#[test]
fn test_scan_missing_target_fails() {
    let dir = tempfile::tempdir().unwrap();
    let out = codevolve(dir.path(), &["scan", "does-not-exist"]);
    assert!(!out.status.success());
}

#[test]
fn test_init_writes_config_once() {
    let dir = tempfile::tempdir().unwrap();

    let first = codevolve(dir.path(), &["init"]);
    assert!(first.status.success());
    let config = std::fs::read_to_string(dir.path().join("codevolve.toml")).unwrap();
    assert!(config.contains("llm_concurrency"));
    assert!(config.contains("[ai]"));

    std::fs::write(dir.path().join("codevolve.toml"), "file_concurrency = 1\n").unwrap();
    let second = codevolve(dir.path(), &["init"]);
    assert!(second.status.success());
    assert!(String::from_utf8_lossy(&second.stdout).contains("already exists"));
    assert_eq!(
        std::fs::read_to_string(dir.path().join("codevolve.toml")).unwrap(),
        "file_concurrency = 1\n"
    );
}

#[test]
fn test_evolve_without_api_key_aborts_and_reports_error() {
    let dir = setup_project();
    let out = codevolve(dir.path(), &["evolve", "app", "--run-id", "test-run"]);

    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("GROQ_API_KEY"));

    let status: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join("run_status.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(status["status"], "error");
    assert_eq!(status["target"], "app");
    assert!(status["errorMessage"].as_str().unwrap().contains("GROQ_API_KEY"));

    // Nothing was touched
    let source = std::fs::read_to_string(dir.path().join("app/src/legacy.js")).unwrap();
    assert_eq!(source, LEGACY);
    assert!(!dir.path().join("dashboard_data.json").exists());
}

#[test]
fn test_unwritable_summary_still_reports_done() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("empty")).unwrap();
    std::fs::write(
        dir.path().join("codevolve.toml"),
        "summary_file = \"no-such-dir/dashboard.json\"\n",
    )
    .unwrap();

    // No .js files, so the key is never sent anywhere
    let out = codevolve_with_env(
        dir.path(),
        &["evolve", "empty"],
        &[("GROQ_API_KEY", "test-key")],
    );
    assert!(out.status.success(), "evolve failed: {}", String::from_utf8_lossy(&out.stderr));
    assert!(String::from_utf8_lossy(&out.stderr).contains("dashboard.json"));

    let status: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join("run_status.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(status["status"], "done");
    assert!(!dir.path().join("no-such-dir").exists());
}

#[test]
fn test_invalid_project_config_is_rejected() {
    let dir = setup_project();
    std::fs::write(dir.path().join("codevolve.toml"), "file_concurrency = \"lots\"\n").unwrap();
    let out = codevolve(dir.path(), &["scan", "app"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("codevolve.toml"));
}
