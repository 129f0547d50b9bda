use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use serde_json::{Value, json};

fn bin() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_testfmt"));
    command.env_remove("RUST_LOG");
    command
}

fn run(args: &[&str]) -> Output {
    bin().args(args).output().expect("failed to run testfmt")
}

fn write_doc(dir: &Path, name: &str, value: &Value) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, serde_json::to_string_pretty(value).unwrap()).expect("failed to write doc");
    path
}

fn xray_doc() -> Value {
    json!({"xrayInfo": {}, "testExecutions": []})
}

fn stdout_json(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout should be JSON")
}

// ---------------------------------------------------------------------------
// classify
// ---------------------------------------------------------------------------

#[test]
fn classify_file_reports_winner() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_doc(dir.path(), "xray.json", &xray_doc());

    let output = run(&["classify", path.to_str().unwrap()]);
    assert!(output.status.success());

    let report = stdout_json(&output);
    assert_eq!(report["winner"], "JIRA_XRAY");
    assert_eq!(report["gate"]["passed"], true);
    assert!(report["confidence"].as_f64().unwrap() >= 0.8);
}

#[test]
fn classify_reads_stdin() {
    let mut child = bin()
        .args(["classify", "-", "--format", "table"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .expect("failed to spawn testfmt");
    child
        .stdin
        .take()
        .unwrap()
        .write_all(br#"{"invoice": {"total": 10}}"#)
        .unwrap();
    let output = child.wait_with_output().unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("REJECT"), "stdout: {stdout}");
}

#[test]
fn classify_rejects_oversized_input() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_doc(dir.path(), "xray.json", &xray_doc());

    let output = run(&["classify", path.to_str().unwrap(), "--max-bytes", "8"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("input too large"), "stderr: {stderr}");
}

#[test]
fn classify_rejects_invalid_gate_threshold() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_doc(dir.path(), "xray.json", &xray_doc());

    let output = run(&["classify", path.to_str().unwrap(), "--gate-threshold", "1.5"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("gate_threshold"), "stderr: {stderr}");
}

#[test]
fn classify_markdown_without_fast_paths() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_doc(
        dir.path(),
        "xray.json",
        &json!({"xrayInfo": {}, "testExecutions": [], "testPlanKey": "CALC-12"}),
    );

    let output = run(&[
        "classify",
        path.to_str().unwrap(),
        "--format",
        "markdown",
        "--no-fast-paths",
    ]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("**Verdict:** JIRA_XRAY"));
    assert!(stdout.contains("full_computation"));
    assert!(!stdout.contains("unique_indicator_match"));
}

#[test]
fn classify_with_calibration_profile() {
    let dir = tempfile::tempdir().unwrap();
    let doc = write_doc(dir.path(), "xray.json", &xray_doc());
    let profile = dir.path().join("calibration.yaml");
    fs::write(
        &profile,
        "version: \"1.0\"\nclassifier:\n  gate_threshold: 0.99\npriors:\n  JIRA_XRAY: 2.0\n",
    )
    .unwrap();

    let output = run(&[
        "classify",
        doc.to_str().unwrap(),
        "--calibration",
        profile.to_str().unwrap(),
    ]);
    assert!(output.status.success());
    let report = stdout_json(&output);
    // Two indicators no longer clear the stricter gate.
    assert_eq!(report["gate"]["passed"], false);
}

// ---------------------------------------------------------------------------
// batch
// ---------------------------------------------------------------------------

#[test]
fn batch_writes_report_file() {
    let dir = tempfile::tempdir().unwrap();
    let docs = dir.path().join("docs");
    fs::create_dir_all(&docs).unwrap();
    write_doc(&docs, "xray.json", &xray_doc());
    write_doc(&docs, "invoice.json", &json!({"invoice": 1}));
    fs::write(docs.join("broken.json"), "{").unwrap();
    let out = dir.path().join("reports").join("batch.json");

    let output = run(&[
        "batch",
        docs.to_str().unwrap(),
        "--no-cache",
        "--jobs",
        "2",
        "--output",
        out.to_str().unwrap(),
    ]);
    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("1 document(s) could not be classified"));

    let report: Value = serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(report["total"], 3);
    assert_eq!(report["classified"], 1);
    assert_eq!(report["rejected"], 1);
    assert_eq!(report["failures"][0]["code"], "parse_failed");
}

#[test]
fn batch_populates_cache_dir() {
    let dir = tempfile::tempdir().unwrap();
    let doc = write_doc(dir.path(), "xray.json", &xray_doc());
    let cache = dir.path().join("cache");

    for _ in 0..2 {
        let output = run(&[
            "batch",
            doc.to_str().unwrap(),
            "--cache-dir",
            cache.to_str().unwrap(),
            "--format",
            "table",
        ]);
        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("1 documents: 1 classified"), "stdout: {stdout}");
    }
    assert_eq!(fs::read_dir(&cache).unwrap().count(), 1);
}

#[test]
fn batch_rejects_missing_input() {
    let output = run(&["batch", "/nonexistent/docs", "--no-cache"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("does not exist"), "stderr: {stderr}");
}

// ---------------------------------------------------------------------------
// registry commands
// ---------------------------------------------------------------------------

const ACME_SPEC: &str = "\
id: ACME_QA
name: Acme QA
required_fields:
  - acme_case
  - acme_run
patterns:
  - name: acme_key
    regex: 'ACME-\\d+'
";

#[test]
fn formats_lists_builtin_and_layered_specs() {
    let dir = tempfile::tempdir().unwrap();
    let spec = dir.path().join("acme.yaml");
    fs::write(&spec, ACME_SPEC).unwrap();

    let output = run(&["formats", "--format", "table"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("JIRA_XRAY"));
    assert!(stdout.contains("GENERIC"));
    assert!(!stdout.contains("ACME_QA"));

    let output = run(&["formats", "--registry", spec.to_str().unwrap()]);
    assert!(output.status.success());
    let specs = stdout_json(&output);
    let ids: Vec<&str> = specs
        .as_array()
        .unwrap()
        .iter()
        .map(|spec| spec["id"].as_str().unwrap())
        .collect();
    assert!(ids.contains(&"ACME_QA"));
    assert_eq!(ids.len(), 10);
}

#[test]
fn validate_registry_accepts_valid_specs() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("acme.yaml"), ACME_SPEC).unwrap();

    let output = run(&["validate-registry", dir.path().to_str().unwrap()]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Validated 1 format spec(s)"), "stdout: {stdout}");
}

#[test]
fn validate_registry_reports_every_problem() {
    let dir = tempfile::tempdir().unwrap();
    let spec = dir.path().join("broken.yaml");
    fs::write(
        &spec,
        "- id: A\n  name: A\n  depth: { min: 4, max: 2 }\n- id: A\n  name: Again\n  required_fields: [x]\n",
    )
    .unwrap();

    let output = run(&["validate-registry", spec.to_str().unwrap()]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("spec problem(s) found"), "stderr: {stderr}");
}
