//! Format specs embedded in the binary.

use testfmt_core::{FormatSpec, Result};

/// `(file name, YAML source)` of every built-in spec.
const BUILTIN_FORMATS: &[(&str, &str)] = &[
    ("azure_devops.yaml", include_str!("../formats/azure_devops.yaml")),
    ("generic.yaml", include_str!("../formats/generic.yaml")),
    ("jira_xray.yaml", include_str!("../formats/jira_xray.yaml")),
    ("practitest.yaml", include_str!("../formats/practitest.yaml")),
    ("qtest.yaml", include_str!("../formats/qtest.yaml")),
    ("testlink.yaml", include_str!("../formats/testlink.yaml")),
    ("testrail.yaml", include_str!("../formats/testrail.yaml")),
    ("zephyr_scale.yaml", include_str!("../formats/zephyr_scale.yaml")),
    ("zephyr_squad.yaml", include_str!("../formats/zephyr_squad.yaml")),
];

/// Parses the embedded specs.
///
/// # Errors
///
/// Returns a YAML error if an embedded file is malformed.
pub fn builtin_specs() -> Result<Vec<FormatSpec>> {
    BUILTIN_FORMATS
        .iter()
        .map(|(_, source)| serde_yaml::from_str(source).map_err(Into::into))
        .collect()
}

/// Names of the embedded spec files.
pub fn builtin_files() -> impl Iterator<Item = &'static str> {
    BUILTIN_FORMATS.iter().map(|(name, _)| *name)
}

#[cfg(test)]
mod tests {
    use testfmt_core::{Hypothesis, validate_specs};

    use super::*;
    use crate::FormatRegistry;

    #[test]
    fn test_builtin_specs_parse_and_validate() {
        let specs = builtin_specs().unwrap();
        assert_eq!(specs.len(), builtin_files().count());
        let errors = validate_specs(&specs);
        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn test_builtin_has_one_sentinel() {
        let specs = builtin_specs().unwrap();
        let sentinels: Vec<&str> = specs
            .iter()
            .filter(|s| s.sentinel)
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(sentinels, vec!["GENERIC"]);
    }

    #[test]
    fn test_every_builtin_tool_owns_exclusive_fields() {
        let registry = FormatRegistry::builtin().unwrap();
        for format in registry.formats() {
            let exclusive = format.exclusive_fields().count();
            if format.is_sentinel() {
                assert_eq!(exclusive, 0);
            } else {
                assert!(
                    exclusive >= 3,
                    "{} has only {exclusive} exclusive fields",
                    format.id()
                );
            }
        }
    }

    #[test]
    fn test_shared_jira_key_pattern() {
        let registry = FormatRegistry::builtin().unwrap();
        let xray = registry.get(&Hypothesis::new("JIRA_XRAY")).unwrap();
        let jira_key = xray
            .patterns()
            .iter()
            .find(|p| p.name == "jira_issue_key")
            .unwrap();
        assert!(jira_key.shared);
        let status = xray
            .patterns()
            .iter()
            .find(|p| p.name == "xray_status")
            .unwrap();
        assert!(!status.shared);
    }

    #[test]
    fn test_builtin_file_names_match_ids() {
        for ((name, _), spec) in BUILTIN_FORMATS.iter().zip(builtin_specs().unwrap()) {
            let expected = format!("{}.yaml", spec.id.as_str().to_ascii_lowercase());
            assert_eq!(*name, expected);
        }
    }
}
