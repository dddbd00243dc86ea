//! Integration tests for Prism
//!
//! These drive the built binary end to end over a temporary repository.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use prism_core::{load_model, model_path};

const APP: &str = "import os\nimport sys\n\n\ndef f():\n    return g()\n\n\ndef g():\n    return 1\n";
const APP_PROJECTED: &str = "import os\nimport sys\n\ndef g():\n    return 1\n\n\ndef f():\n    return g()\n";
const CYCLE: &str = "def a():\n    return b()\n\n\ndef b():\n    return a()\n";

fn prism(root: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_prism"))
        .arg("--root")
        .arg(root)
        .args(args)
        .env("RUST_LOG", "off")
        .output()
        .expect("Failed to execute prism")
}

fn exit_code(output: &Output) -> i32 {
    output.status.code().expect("prism was killed by a signal")
}

fn repository() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("pkg")).unwrap();
    fs::write(dir.path().join("pkg/app.py"), APP).unwrap();
    fs::write(dir.path().join("pkg/cycle.py"), CYCLE).unwrap();
    fs::write(dir.path().join("README.md"), "# Demo\n\nA demo.\n").unwrap();
    dir
}

#[test]
fn test_cli_invocation() {
    let dir = tempfile::tempdir().unwrap();
    let output = prism(dir.path(), &["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("prism"));
    assert!(stdout.contains("extract"));

    let output = prism(dir.path(), &["version"]);
    assert_eq!(exit_code(&output), 0);
    assert!(String::from_utf8_lossy(&output.stdout).starts_with("prism v"));
}

#[test]
fn test_extract_then_project() {
    let repo = repository();
    let root = repo.path();

    let output = prism(root, &["extract"]);
    assert_eq!(exit_code(&output), 0, "{}", String::from_utf8_lossy(&output.stderr));

    let store = load_model(&model_path(root)).unwrap().unwrap();
    assert_eq!(store.file_count(), 3);
    assert_eq!(store.get_file_index("pkg/app.py").map(|ids| ids.len()), Some(4));

    let output = prism(root, &["project", "pkg/app.py"]);
    assert_eq!(exit_code(&output), 0);
    assert_eq!(String::from_utf8_lossy(&output.stdout), APP_PROJECTED);

    let out_file = root.join("out.py");
    let output = prism(root, &["project", "pkg/app.py", "--output", out_file.to_str().unwrap()]);
    assert_eq!(exit_code(&output), 0);
    assert_eq!(fs::read_to_string(out_file).unwrap(), APP_PROJECTED);
}

#[test]
fn test_extract_twice_is_stable() {
    let repo = repository();
    let root = repo.path();

    assert_eq!(exit_code(&prism(root, &["extract"])), 0);
    let first = load_model(&model_path(root)).unwrap().unwrap();
    assert_eq!(exit_code(&prism(root, &["extract"])), 0);
    let second = load_model(&model_path(root)).unwrap().unwrap();

    assert_eq!(first.node_count(), second.node_count());
    let first_ids: Vec<_> = first.nodes().map(|n| n.id.clone()).collect();
    let second_ids: Vec<_> = second.nodes().map(|n| n.id.clone()).collect();
    assert_eq!(first_ids, second_ids);
}

#[test]
fn test_cycle_exits_with_warning_code() {
    let repo = repository();
    let root = repo.path();
    assert_eq!(exit_code(&prism(root, &["extract"])), 0);

    let output = prism(root, &["project", "pkg/cycle.py"]);
    assert_eq!(exit_code(&output), 2);
    assert_eq!(String::from_utf8_lossy(&output.stdout), CYCLE);
}

#[test]
fn test_parse_error_exits_one_and_keeps_other_files() {
    let repo = repository();
    let root = repo.path();
    fs::write(root.join("pkg/broken.py"), "def broken(:\n    pass\n").unwrap();

    let output = prism(root, &["extract"]);
    assert_eq!(exit_code(&output), 1);
    assert!(String::from_utf8_lossy(&output.stderr).contains("pkg/broken.py"));

    let store = load_model(&model_path(root)).unwrap().unwrap();
    assert!(store.get_file_index("pkg/app.py").is_some());
    assert!(store.get_file_index("pkg/broken.py").is_none());
}

#[test]
fn test_validate_writes_report() {
    let repo = repository();
    let root = repo.path();
    assert_eq!(exit_code(&prism(root, &["extract"])), 0);

    let report_file = root.join("report.json");
    let output = prism(root, &["validate", "pkg/app.py", "--report", report_file.to_str().unwrap()]);
    assert_eq!(exit_code(&output), 0);

    let report: serde_json::Value = serde_json::from_str(&fs::read_to_string(report_file).unwrap()).unwrap();
    assert_eq!(report["verdict"], "structurally_equivalent");
    assert_eq!(report["identical"], false);
    assert_eq!(report["structural_counts"]["original"]["functions"], 2);

    let output = prism(root, &["validate", "README.md"]);
    assert_eq!(exit_code(&output), 0);
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["verdict"], "identical");
}

#[test]
fn test_invalid_projection_exits_three() {
    let repo = repository();
    let root = repo.path();
    fs::write(
        root.join("prism.toml"),
        "[[projection.rules]]\nname = \"bad-footer\"\nwhen = { language = \"python\" }\nfooter = \"def broken(:\"\n",
    )
    .unwrap();
    assert_eq!(exit_code(&prism(root, &["extract"])), 0);

    let output = prism(root, &["project", "pkg/app.py"]);
    assert_eq!(exit_code(&output), 3);
    assert!(output.stdout.is_empty());

    let output = prism(root, &["validate", "pkg/app.py"]);
    assert_eq!(exit_code(&output), 3);
}

#[test]
fn test_project_finds_model_of_extracted_subdirectory() {
    let repo = repository();
    let root = repo.path();

    let output = prism(root, &["extract", root.join("pkg").to_str().unwrap()]);
    assert_eq!(exit_code(&output), 0, "{}", String::from_utf8_lossy(&output.stderr));
    assert!(model_path(&root.join("pkg")).exists());
    assert!(!model_path(root).exists());

    let output = prism(root, &["project", "pkg/app.py"]);
    assert_eq!(exit_code(&output), 0, "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(String::from_utf8_lossy(&output.stdout), APP_PROJECTED);

    let output = prism(root, &["validate", "pkg/app.py"]);
    assert_eq!(exit_code(&output), 0);
}

#[test]
fn test_project_without_model_fails() {
    let repo = repository();
    let output = prism(repo.path(), &["project", "pkg/app.py"]);
    assert_eq!(exit_code(&output), 1);
    assert!(String::from_utf8_lossy(&output.stderr).contains("prism extract"));
}

#[test]
fn test_clear_removes_model() {
    let repo = repository();
    let root = repo.path();
    assert_eq!(exit_code(&prism(root, &["extract"])), 0);
    assert!(model_path(root).exists());

    assert_eq!(exit_code(&prism(root, &["clear"])), 0);
    assert!(!model_path(root).exists());
}
