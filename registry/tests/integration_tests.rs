use std::io::Write;
use std::path::{Path, PathBuf};

use testfmt_core::{ErrorKind, Hypothesis};
use testfmt_registry::{
    CalibrationProfile, FormatRegistry, RegistrySource, builtin_files, is_test_token_key,
    load_specs_from_dir,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(content.as_bytes()).unwrap();
    f.flush().unwrap();
    path
}

const CUSTOM_TOOL: &str = r#"
id: KIWI_TCMS
name: Kiwi TCMS
required_fields:
  - name: case_run_id
    kind: number
  - name: tested_by
    kind: string
optional_fields: [build, plan, testrun]
patterns:
  - name: kiwi_status
    regex: '\b(IDLE|RUNNING|PAUSED|WAIVED)\b'
"#;

// ---------------------------------------------------------------------------
// Built-in registry
// ---------------------------------------------------------------------------

#[test]
fn test_builtin_registry_contents() {
    let registry = FormatRegistry::builtin().unwrap();
    let ids: Vec<&str> = registry.hypotheses().map(Hypothesis::as_str).collect();
    assert_eq!(
        ids,
        vec![
            "AZURE_DEVOPS",
            "GENERIC",
            "JIRA_XRAY",
            "PRACTITEST",
            "QTEST",
            "TESTLINK",
            "TESTRAIL",
            "ZEPHYR_SCALE",
            "ZEPHYR_SQUAD",
        ]
    );
    assert_eq!(builtin_files().count(), registry.len());

    let priors = registry.priors();
    for prior in priors.values() {
        assert!((prior - 1.0 / 9.0).abs() < 1e-12);
    }
}

#[test]
fn test_builtin_vocabulary_covers_aliases() {
    let registry = FormatRegistry::builtin().unwrap();
    assert!(registry.is_vocabulary("xrayinfo"));
    assert!(registry.is_vocabulary("systemworkitemtype"));
    assert!(registry.is_vocabulary("tm4j"));
    assert!(registry.is_vocabulary("steps"));
    assert!(!registry.is_vocabulary("invoicetotal"));
}

#[test]
fn test_shared_fields_are_not_exclusive() {
    let registry = FormatRegistry::builtin().unwrap();
    // Listed by both Zephyr flavours.
    assert_eq!(registry.exclusive_owner("projectkey"), None);
    // Generic vocabulary never counts as exclusive evidence.
    assert_eq!(registry.exclusive_owner("status"), None);
    assert_eq!(
        registry.exclusive_owner("customstepsseparated"),
        Some(&Hypothesis::new("TESTRAIL"))
    );
}

#[test]
fn test_test_tokens() {
    assert!(is_test_token_key("preconditions"));
    assert!(is_test_token_key("testcycle"));
    assert!(!is_test_token_key("priority"));
}

// ---------------------------------------------------------------------------
// Layered loading
// ---------------------------------------------------------------------------

#[test]
fn test_custom_format_layered_over_builtin() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "kiwi.yaml", CUSTOM_TOOL);

    let builder = FormatRegistry::builder().with_builtin().from_path(dir.path());
    assert_eq!(
        builder.sources(),
        &[
            RegistrySource::Builtin,
            RegistrySource::Directory(dir.path().to_path_buf())
        ]
    );
    let registry = builder.build().unwrap();

    assert_eq!(registry.len(), 10);
    let kiwi = registry.get(&Hypothesis::new("KIWI_TCMS")).unwrap();
    assert_eq!(kiwi.exclusive_fields().count(), 5);
    assert!(kiwi.patterns()[0].regex.is_match("status: WAIVED"));
    assert_ne!(
        registry.fingerprint(),
        FormatRegistry::builtin().unwrap().fingerprint()
    );
}

#[test]
fn test_invalid_spec_in_directory_rejected() {
    let dir = tempfile::tempdir().unwrap();
    write_file(
        dir.path(),
        "broken.yaml",
        "id: BROKEN\nname: Broken\noptional_fields: [a]\ndepth: { min: 5, max: 1 }\n",
    );

    assert_eq!(load_specs_from_dir(dir.path()).unwrap().len(), 1);
    let err = FormatRegistry::builder()
        .from_dir(dir.path())
        .build()
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidRegistry);
    assert!(err.to_string().contains("BROKEN"));
}

#[test]
fn test_malformed_yaml_is_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "bad.yaml", "id: [unterminated\n");
    let err = FormatRegistry::builder().from_file(path).build().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Parse);
}

// ---------------------------------------------------------------------------
// Calibration profiles
// ---------------------------------------------------------------------------

#[test]
fn test_calibration_profile_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(
        dir.path(),
        "calibration.yaml",
        "version: \"1.0\"\nclassifier:\n  ratio_cap_low: 1.2\npriors:\n  GENERIC: 0.5\n",
    );

    let profile = CalibrationProfile::load(&path).unwrap();
    let (registry, config) = profile.apply(&FormatRegistry::builtin().unwrap()).unwrap();

    assert_eq!(config.ratio_cap_low, 1.2);
    assert_eq!(config.ratio_cap_high, 3.0);
    let priors = registry.priors();
    let generic = priors[&Hypothesis::new("GENERIC")];
    let xray = priors[&Hypothesis::new("JIRA_XRAY")];
    assert!((xray / generic - 2.0).abs() < 1e-9);
    assert!((priors.values().sum::<f64>() - 1.0).abs() < 1e-12);
}
