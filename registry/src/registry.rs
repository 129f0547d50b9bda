//! Compiled format registry.
//!
//! [`FormatRegistry`] turns a set of [`FormatSpec`]s into the lookup
//! structures the classifier needs: normalized field names, compiled
//! patterns, cross-hypothesis exclusivity, the shared vocabulary and
//! normalized priors. Everything is computed once at construction; the
//! registry is immutable afterwards and can be shared across threads.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use regex::Regex;
use sha2::{Digest, Sha256};
use testfmt_core::{
    ClassifyError, FormatSpec, Hypothesis, Result, ValueKind, normalize_field_name,
    validate_specs,
};
use tracing::debug;

use crate::loader::RegistryBuilder;

/// Substrings that mark a key as test-related, independent of any format.
pub const TEST_TOKENS: &[&str] = &[
    "test",
    "step",
    "expected",
    "execution",
    "suite",
    "precondition",
    "assert",
    "verdict",
    "scenario",
    "cycle",
];

/// Returns `true` if a normalized key contains any of the [`TEST_TOKENS`].
///
/// ```
/// use testfmt_registry::is_test_token_key;
///
/// assert!(is_test_token_key("teststeps"));
/// assert!(is_test_token_key("expectedresult"));
/// assert!(!is_test_token_key("invoiceid"));
/// ```
pub fn is_test_token_key(normalized: &str) -> bool {
    TEST_TOKENS.iter().any(|token| normalized.contains(token))
}

/// A field of a compiled format.
#[derive(Debug, Clone)]
pub struct CompiledField {
    /// Name as written in the spec.
    pub name: String,
    pub normalized: String,
    pub kind: Option<ValueKind>,
    pub required: bool,
    /// No other spec lists this field and the owner is not the sentinel.
    pub exclusive: bool,
}

/// A compiled detection pattern.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    pub name: String,
    pub regex: Regex,
    pub weight: f64,
    /// Another spec carries the same regex, or the owner is the sentinel.
    pub shared: bool,
}

/// One format spec with its derived lookup data.
#[derive(Debug, Clone)]
pub struct CompiledFormat {
    spec: FormatSpec,
    fields: Vec<CompiledField>,
    patterns: Vec<CompiledPattern>,
    vocabulary: BTreeSet<String>,
    prior: f64,
}

impl CompiledFormat {
    pub fn id(&self) -> &Hypothesis {
        &self.spec.id
    }

    pub fn spec(&self) -> &FormatSpec {
        &self.spec
    }

    pub fn is_sentinel(&self) -> bool {
        self.spec.sentinel
    }

    /// Required fields first, then optional fields, in spec order.
    pub fn fields(&self) -> &[CompiledField] {
        &self.fields
    }

    /// Fields that completeness is measured against: the required fields, or
    /// every field when none is required.
    pub fn expected_fields(&self) -> impl Iterator<Item = &CompiledField> {
        let has_required = self.fields.iter().any(|f| f.required);
        self.fields
            .iter()
            .filter(move |f| f.required || !has_required)
    }

    pub fn exclusive_fields(&self) -> impl Iterator<Item = &CompiledField> {
        self.fields.iter().filter(|f| f.exclusive)
    }

    pub fn patterns(&self) -> &[CompiledPattern] {
        &self.patterns
    }

    /// Normalized field names and aliases.
    pub fn vocabulary(&self) -> &BTreeSet<String> {
        &self.vocabulary
    }

    /// Normalized prior (priors of a registry sum to 1).
    pub fn prior(&self) -> f64 {
        self.prior
    }

    /// Number of fields with a declared value kind.
    pub fn declared_kinds(&self) -> usize {
        self.fields.iter().filter(|f| f.kind.is_some()).count()
    }

    pub fn total_pattern_weight(&self) -> f64 {
        self.patterns.iter().map(|p| p.weight).sum()
    }
}

/// Immutable, validated set of compiled formats.
///
/// Formats are kept in hypothesis-id order, which makes every iteration over
/// the registry deterministic.
///
/// # Examples
///
/// ```
/// use testfmt_core::Hypothesis;
/// use testfmt_registry::FormatRegistry;
///
/// let registry = FormatRegistry::builtin().unwrap();
/// assert!(registry.contains(&Hypothesis::new("JIRA_XRAY")));
/// assert_eq!(
///     registry.exclusive_owner("xrayinfo"),
///     Some(&Hypothesis::new("JIRA_XRAY"))
/// );
/// let total: f64 = registry.priors().values().sum();
/// assert!((total - 1.0).abs() < 1e-12);
/// ```
#[derive(Debug, Clone)]
pub struct FormatRegistry {
    formats: Vec<CompiledFormat>,
    index: HashMap<Hypothesis, usize>,
    vocabulary: BTreeSet<String>,
    exclusive: HashMap<String, usize>,
    fingerprint: String,
}

impl FormatRegistry {
    /// Returns a new [`RegistryBuilder`] for layering spec sources.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Builds the registry from the embedded built-in specs.
    ///
    /// # Errors
    ///
    /// Returns an error only if an embedded spec fails to parse or validate.
    pub fn builtin() -> Result<Self> {
        Self::from_specs(crate::builtin::builtin_specs()?)
    }

    /// Validates and compiles a set of specs.
    ///
    /// # Errors
    ///
    /// Returns [`ClassifyError::InvalidRegistry`] if the set is empty, any
    /// spec is structurally invalid, or a pattern does not compile.
    pub fn from_specs(mut specs: Vec<FormatSpec>) -> Result<Self> {
        let errors = validate_specs(&specs);
        if !errors.is_empty() {
            let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
            return Err(ClassifyError::InvalidRegistry(messages.join("; ")));
        }

        specs.sort_by(|a, b| a.id.cmp(&b.id));

        let mut field_owners: HashMap<String, usize> = HashMap::new();
        let mut regex_owners: HashMap<&str, usize> = HashMap::new();
        for spec in &specs {
            for field in spec.fields() {
                *field_owners
                    .entry(normalize_field_name(field.name()))
                    .or_default() += 1;
            }
            let sources: BTreeSet<&str> =
                spec.patterns.iter().map(|p| p.regex.as_str()).collect();
            for source in sources {
                *regex_owners.entry(source).or_default() += 1;
            }
        }

        let weight_total: f64 = specs.iter().map(|s| s.prior.unwrap_or(1.0)).sum();

        let mut formats = Vec::with_capacity(specs.len());
        for spec in &specs {
            let fields = spec
                .required_fields
                .iter()
                .map(|rule| (rule, true))
                .chain(spec.optional_fields.iter().map(|rule| (rule, false)))
                .map(|(rule, required)| {
                    let normalized = normalize_field_name(rule.name());
                    let exclusive = !spec.sentinel
                        && field_owners.get(&normalized).copied().unwrap_or(0) == 1;
                    CompiledField {
                        name: rule.name().to_string(),
                        normalized,
                        kind: rule.kind(),
                        required,
                        exclusive,
                    }
                })
                .collect::<Vec<_>>();

            let mut patterns = Vec::with_capacity(spec.patterns.len());
            for rule in &spec.patterns {
                let regex = Regex::new(&rule.regex).map_err(|err| {
                    ClassifyError::InvalidRegistry(format!(
                        "{}: pattern '{}' does not compile: {err}",
                        spec.id, rule.name
                    ))
                })?;
                let shared = spec.sentinel
                    || regex_owners.get(rule.regex.as_str()).copied().unwrap_or(0) > 1;
                patterns.push(CompiledPattern {
                    name: rule.name.clone(),
                    regex,
                    weight: rule.weight,
                    shared,
                });
            }

            let vocabulary = fields
                .iter()
                .map(|f| f.normalized.clone())
                .chain(spec.aliases.iter().map(|a| normalize_field_name(a)))
                .filter(|name| !name.is_empty())
                .collect();

            formats.push(CompiledFormat {
                spec: spec.clone(),
                fields,
                patterns,
                vocabulary,
                prior: spec.prior.unwrap_or(1.0) / weight_total,
            });
        }

        let index = formats
            .iter()
            .enumerate()
            .map(|(i, f)| (f.id().clone(), i))
            .collect();
        let vocabulary = formats
            .iter()
            .flat_map(|f| f.vocabulary.iter().cloned())
            .collect();
        let mut exclusive = HashMap::new();
        for (i, format) in formats.iter().enumerate() {
            for field in format.exclusive_fields() {
                exclusive.insert(field.normalized.clone(), i);
            }
        }
        let fingerprint = fingerprint_specs(&specs)?;

        debug!(
            formats = formats.len(),
            exclusive_fields = exclusive.len(),
            fingerprint = %&fingerprint[..12],
            "compiled format registry"
        );

        Ok(Self {
            formats,
            index,
            vocabulary,
            exclusive,
            fingerprint,
        })
    }

    /// Returns a copy of this registry with prior weights replaced.
    ///
    /// Hypotheses absent from `priors` keep their current spec weight.
    ///
    /// # Errors
    ///
    /// Returns [`ClassifyError::InvalidRegistry`] if `priors` names an unknown
    /// hypothesis or carries a non-positive weight.
    pub fn with_priors(&self, priors: &BTreeMap<Hypothesis, f64>) -> Result<Self> {
        if let Some(unknown) = priors.keys().find(|h| !self.contains(h)) {
            return Err(ClassifyError::InvalidRegistry(format!(
                "prior given for unknown hypothesis {unknown}"
            )));
        }
        let specs = self
            .formats
            .iter()
            .map(|format| {
                let mut spec = format.spec.clone();
                if let Some(weight) = priors.get(&spec.id) {
                    spec.prior = Some(*weight);
                }
                spec
            })
            .collect();
        Self::from_specs(specs)
    }

    pub fn len(&self) -> usize {
        self.formats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }

    pub fn contains(&self, hypothesis: &Hypothesis) -> bool {
        self.index.contains_key(hypothesis)
    }

    /// Looks up a compiled format by hypothesis.
    pub fn get(&self, hypothesis: &Hypothesis) -> Option<&CompiledFormat> {
        self.index.get(hypothesis).map(|&i| &self.formats[i])
    }

    /// Compiled formats in hypothesis-id order.
    pub fn formats(&self) -> &[CompiledFormat] {
        &self.formats
    }

    pub fn hypotheses(&self) -> impl Iterator<Item = &Hypothesis> {
        self.formats.iter().map(CompiledFormat::id)
    }

    /// Normalized priors by hypothesis.
    pub fn priors(&self) -> BTreeMap<Hypothesis, f64> {
        self.formats
            .iter()
            .map(|f| (f.id().clone(), f.prior))
            .collect()
    }

    /// Every normalized field name and alias of every format.
    pub fn vocabulary(&self) -> &BTreeSet<String> {
        &self.vocabulary
    }

    pub fn is_vocabulary(&self, normalized: &str) -> bool {
        self.vocabulary.contains(normalized)
    }

    /// The hypothesis owning `normalized` exclusively, if any.
    pub fn exclusive_owner(&self, normalized: &str) -> Option<&Hypothesis> {
        self.exclusive
            .get(normalized)
            .map(|&i| self.formats[i].id())
    }

    /// Hex SHA-256 of the canonical JSON of all specs.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Specs in hypothesis-id order.
    pub fn specs(&self) -> impl Iterator<Item = &FormatSpec> {
        self.formats.iter().map(CompiledFormat::spec)
    }
}

fn fingerprint_specs(specs: &[FormatSpec]) -> Result<String> {
    let canonical = serde_json::to_vec(specs)?;
    Ok(format!("{:x}", Sha256::digest(&canonical)))
}

#[cfg(test)]
mod tests {
    use testfmt_core::{ErrorKind, FieldRule, PatternRule};

    use super::*;

    fn small_specs() -> Vec<FormatSpec> {
        vec![
            FormatSpec::new("ALPHA", "Alpha")
                .with_required(FieldRule::typed("alphaRuns", ValueKind::Array))
                .with_optional(FieldRule::named("status"))
                .with_pattern(PatternRule::new("key", r"\b[A-Z]+-\d+\b")),
            FormatSpec::new("BETA", "Beta")
                .with_required(FieldRule::named("beta_suite"))
                .with_optional(FieldRule::named("Status"))
                .with_pattern(PatternRule::new("issue", r"\b[A-Z]+-\d+\b"))
                .with_pattern(PatternRule::new("run", r"\bR\d+\b"))
                .with_prior(3.0),
            FormatSpec::new("GENERIC", "Generic")
                .with_optional(FieldRule::named("name"))
                .with_pattern(PatternRule::new("word", r"\w+"))
                .as_sentinel(),
        ]
    }

    #[test]
    fn test_exclusivity_ignores_naming_convention() {
        let registry = FormatRegistry::from_specs(small_specs()).unwrap();
        let alpha = registry.get(&Hypothesis::new("ALPHA")).unwrap();

        let alpha_runs = &alpha.fields()[0];
        assert!(alpha_runs.exclusive);
        assert!(alpha_runs.required);

        // "status" and "Status" normalize to the same name.
        assert!(!alpha.fields()[1].exclusive);
        assert_eq!(registry.exclusive_owner("status"), None);
        assert_eq!(
            registry.exclusive_owner("betasuite"),
            Some(&Hypothesis::new("BETA"))
        );
    }

    #[test]
    fn test_sentinel_owns_nothing_exclusively() {
        let registry = FormatRegistry::from_specs(small_specs()).unwrap();
        let generic = registry.get(&Hypothesis::new("GENERIC")).unwrap();
        assert!(generic.is_sentinel());
        assert_eq!(generic.exclusive_fields().count(), 0);
        assert!(generic.patterns().iter().all(|p| p.shared));
        assert_eq!(registry.exclusive_owner("name"), None);
    }

    #[test]
    fn test_shared_patterns_detected_by_source() {
        let registry = FormatRegistry::from_specs(small_specs()).unwrap();
        let beta = registry.get(&Hypothesis::new("BETA")).unwrap();
        let shared: Vec<bool> = beta.patterns().iter().map(|p| p.shared).collect();
        assert_eq!(shared, vec![true, false]);
    }

    #[test]
    fn test_priors_normalized() {
        let registry = FormatRegistry::from_specs(small_specs()).unwrap();
        let priors = registry.priors();
        assert!((priors[&Hypothesis::new("BETA")] - 0.6).abs() < 1e-12);
        assert!((priors[&Hypothesis::new("ALPHA")] - 0.2).abs() < 1e-12);
        assert!((priors.values().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_with_priors_overrides_and_rejects_unknown() {
        let registry = FormatRegistry::from_specs(small_specs()).unwrap();
        let mut priors = BTreeMap::new();
        priors.insert(Hypothesis::new("ALPHA"), 3.0);
        let reweighted = registry.with_priors(&priors).unwrap();
        assert!((reweighted.priors()[&Hypothesis::new("ALPHA")] - 3.0 / 7.0).abs() < 1e-12);
        assert_ne!(reweighted.fingerprint(), registry.fingerprint());

        priors.insert(Hypothesis::new("NOPE"), 1.0);
        let err = registry.with_priors(&priors).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRegistry);
    }

    #[test]
    fn test_formats_sorted_by_id() {
        let mut specs = small_specs();
        specs.reverse();
        let registry = FormatRegistry::from_specs(specs).unwrap();
        let ids: Vec<&str> = registry.hypotheses().map(Hypothesis::as_str).collect();
        assert_eq!(ids, vec!["ALPHA", "BETA", "GENERIC"]);
    }

    #[test]
    fn test_fingerprint_independent_of_input_order() {
        let a = FormatRegistry::from_specs(small_specs()).unwrap();
        let mut reversed = small_specs();
        reversed.reverse();
        let b = FormatRegistry::from_specs(reversed).unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
    }

    #[test]
    fn test_rejects_empty_and_bad_regex() {
        let err = FormatRegistry::from_specs(Vec::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRegistry);

        let bad = vec![
            FormatSpec::new("BAD", "Bad")
                .with_optional(FieldRule::named("x"))
                .with_pattern(PatternRule::new("broken", "([unclosed")),
        ];
        let err = FormatRegistry::from_specs(bad).unwrap_err();
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn test_expected_fields_fall_back_to_all() {
        let registry = FormatRegistry::from_specs(small_specs()).unwrap();
        let generic = registry.get(&Hypothesis::new("GENERIC")).unwrap();
        assert_eq!(generic.expected_fields().count(), 1);
        let alpha = registry.get(&Hypothesis::new("ALPHA")).unwrap();
        let expected: Vec<&str> = alpha.expected_fields().map(|f| f.name.as_str()).collect();
        assert_eq!(expected, vec!["alphaRuns"]);
    }
}
