//! Format spec validation.
//!
//! Catches structural problems in a set of [`FormatSpec`]s, such as duplicate
//! identifiers, empty field names, inverted depth ranges and invalid priors,
//! before the registry compiles them.
//!
//! # Examples
//!
//! ```
//! use testfmt_core::*;
//!
//! let specs = vec![
//!     FormatSpec::new("TESTRAIL", "TestRail").with_required(FieldRule::named("suite_id")),
//!     FormatSpec::new("GENERIC", "Generic")
//!         .with_optional(FieldRule::named("name"))
//!         .as_sentinel(),
//! ];
//! assert!(validate_specs(&specs).is_empty());
//!
//! let bad = vec![FormatSpec::new("", "Nameless")];
//! assert!(!validate_specs(&bad).is_empty());
//! ```

use std::collections::HashSet;

use thiserror::Error;

use crate::{FormatSpec, normalize_field_name};

/// Format spec validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpecError {
    /// No specs were supplied.
    #[error("registry contains no format specs")]
    Empty,
    /// Spec identifier is empty or whitespace-only.
    #[error("format spec id cannot be empty")]
    EmptyId,
    /// Two specs share an identifier.
    #[error("duplicate format spec id: {0}")]
    DuplicateId(String),
    /// More than one spec is marked as the sentinel.
    #[error("more than one sentinel spec: {0}")]
    MultipleSentinels(String),
    /// Spec lists no fields at all.
    #[error("{0}: format spec must list at least one field")]
    NoFields(String),
    /// A field name normalizes to the empty string.
    #[error("{0}: field name '{1}' has no alphanumeric characters")]
    EmptyFieldName(String, String),
    /// A spec lists the same (normalized) field twice.
    #[error("{0}: duplicate field '{1}'")]
    DuplicateField(String, String),
    /// Depth range has `min > max`.
    #[error("{0}: depth range min {1} exceeds max {2}")]
    InvertedDepth(String, usize, usize),
    /// Prior weight is not a positive finite number.
    #[error("{0}: prior must be positive and finite")]
    InvalidPrior(String),
    /// Pattern weight is not a positive finite number.
    #[error("{0}: pattern '{1}' weight must be positive and finite")]
    InvalidPatternWeight(String, String),
}

/// Validates a set of format specs.
///
/// Returns every problem found; an empty vector means the set is usable.
pub fn validate_specs(specs: &[FormatSpec]) -> Vec<SpecError> {
    let mut errors = Vec::new();

    if specs.is_empty() {
        errors.push(SpecError::Empty);
        return errors;
    }

    let mut seen_ids: HashSet<&str> = HashSet::new();
    let mut sentinel: Option<&str> = None;
    for spec in specs {
        let id = spec.id.as_str();
        if id.trim().is_empty() {
            errors.push(SpecError::EmptyId);
            continue;
        }
        if !seen_ids.insert(id) {
            errors.push(SpecError::DuplicateId(id.to_string()));
        }
        if spec.sentinel {
            if let Some(first) = sentinel {
                errors.push(SpecError::MultipleSentinels(format!("{first}, {id}")));
            } else {
                sentinel = Some(id);
            }
        }
        errors.extend(validate_spec(spec));
    }

    errors
}

/// Validates a single format spec.
pub fn validate_spec(spec: &FormatSpec) -> Vec<SpecError> {
    let mut errors = Vec::new();
    let id = spec.id.as_str();

    if spec.fields().next().is_none() {
        errors.push(SpecError::NoFields(id.to_string()));
    }

    let mut seen_fields = HashSet::new();
    for field in spec.fields() {
        let normalized = normalize_field_name(field.name());
        if normalized.is_empty() {
            errors.push(SpecError::EmptyFieldName(
                id.to_string(),
                field.name().to_string(),
            ));
            continue;
        }
        if !seen_fields.insert(normalized) {
            errors.push(SpecError::DuplicateField(
                id.to_string(),
                field.name().to_string(),
            ));
        }
    }

    if spec.depth.min > spec.depth.max {
        errors.push(SpecError::InvertedDepth(
            id.to_string(),
            spec.depth.min,
            spec.depth.max,
        ));
    }

    if let Some(prior) = spec.prior {
        if !(prior.is_finite() && prior > 0.0) {
            errors.push(SpecError::InvalidPrior(id.to_string()));
        }
    }

    for pattern in &spec.patterns {
        if !(pattern.weight.is_finite() && pattern.weight > 0.0) {
            errors.push(SpecError::InvalidPatternWeight(
                id.to_string(),
                pattern.name.clone(),
            ));
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use crate::{DepthRange, FieldRule, PatternRule};

    use super::*;

    fn spec(id: &str) -> FormatSpec {
        FormatSpec::new(id, id).with_optional(FieldRule::named("id"))
    }

    #[test]
    fn test_validate_specs_rejects_empty_set() {
        assert_eq!(validate_specs(&[]), vec![SpecError::Empty]);
    }

    #[test]
    fn test_validate_specs_rejects_duplicate_ids() {
        let specs = vec![spec("QTEST"), spec("QTEST")];
        assert_eq!(
            validate_specs(&specs),
            vec![SpecError::DuplicateId("QTEST".to_string())]
        );
    }

    #[test]
    fn test_validate_specs_rejects_second_sentinel() {
        let specs = vec![spec("GENERIC").as_sentinel(), spec("OTHER").as_sentinel()];
        assert_eq!(
            validate_specs(&specs),
            vec![SpecError::MultipleSentinels("GENERIC, OTHER".to_string())]
        );
    }

    #[test]
    fn test_validate_spec_rejects_fields_equal_after_normalization() {
        let spec = FormatSpec::new("TESTRAIL", "TestRail")
            .with_required(FieldRule::named("suite_id"))
            .with_optional(FieldRule::named("suiteId"));
        assert_eq!(
            validate_spec(&spec),
            vec![SpecError::DuplicateField(
                "TESTRAIL".to_string(),
                "suiteId".to_string()
            )]
        );
    }

    #[test]
    fn test_validate_spec_rejects_symbol_only_field() {
        let spec = FormatSpec::new("X", "X").with_optional(FieldRule::named("__"));
        assert!(matches!(
            validate_spec(&spec).as_slice(),
            [SpecError::EmptyFieldName(_, _)]
        ));
    }

    #[test]
    fn test_validate_spec_rejects_bad_numbers() {
        let mut spec = spec("X").with_prior(-1.0);
        spec.depth = DepthRange { min: 4, max: 2 };
        let mut pattern = PatternRule::new("p", "x");
        pattern.weight = f64::INFINITY;
        spec.patterns.push(pattern);

        let errors = validate_spec(&spec);
        assert_eq!(errors.len(), 3);
        assert!(errors.contains(&SpecError::InvertedDepth("X".to_string(), 4, 2)));
        assert!(errors.contains(&SpecError::InvalidPrior("X".to_string())));
    }

    #[test]
    fn test_validate_spec_rejects_fieldless_spec() {
        let errors = validate_spec(&FormatSpec::new("EMPTY", "Empty"));
        assert_eq!(errors, vec![SpecError::NoFields("EMPTY".to_string())]);
    }
}
