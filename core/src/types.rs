//! Value types shared by the registry and the classifier.
//!
//! This module defines the data model used to describe candidate source
//! formats and the outcome of classifying a document against them. The types
//! are plain values designed for serialization with [`serde`]; none of them
//! carries shared mutable state.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Version of the format-spec contract (semver).
///
/// Embedded in reports so downstream consumers can detect registry format
/// changes.
pub const SPEC_CONTRACT_VERSION: &str = "1.0.0";

/// Identifier of a candidate source format.
///
/// The classifier treats hypotheses as opaque, comparable keys supplied by the
/// format registry. Ordering is lexicographic on the identifier, which gives
/// every map keyed by `Hypothesis` a deterministic iteration order.
///
/// # Examples
///
/// ```
/// use testfmt_core::Hypothesis;
///
/// let xray = Hypothesis::new("JIRA_XRAY");
/// assert_eq!(xray.as_str(), "JIRA_XRAY");
/// assert_eq!(xray.to_string(), "JIRA_XRAY");
/// assert!(Hypothesis::new("AZURE_DEVOPS") < xray);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Hypothesis(String);

impl Hypothesis {
    /// Creates a hypothesis identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Hypothesis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Hypothesis {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// JSON value kind observed for (or expected of) a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Object,
    Array,
    String,
    Number,
    Bool,
    Null,
}

impl ValueKind {
    /// Returns the kind of a JSON value.
    pub fn of(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Object(_) => Self::Object,
            serde_json::Value::Array(_) => Self::Array,
            serde_json::Value::String(_) => Self::String,
            serde_json::Value::Number(_) => Self::Number,
            serde_json::Value::Bool(_) => Self::Bool,
            serde_json::Value::Null => Self::Null,
        }
    }

    /// Bit used by compact kind sets.
    pub fn bit(self) -> u8 {
        match self {
            Self::Object => 1,
            Self::Array => 1 << 1,
            Self::String => 1 << 2,
            Self::Number => 1 << 3,
            Self::Bool => 1 << 4,
            Self::Null => 1 << 5,
        }
    }
}

/// A field a format is expected to carry.
///
/// Deserializes either from a bare field name or from a `{ name, kind }`
/// mapping, so registry files can stay terse:
///
/// ```
/// use testfmt_core::{FieldRule, ValueKind};
///
/// let bare: FieldRule = serde_json::from_str(r#""testKey""#).unwrap();
/// assert_eq!(bare.name(), "testKey");
/// assert_eq!(bare.kind(), None);
///
/// let typed: FieldRule =
///     serde_json::from_str(r#"{"name": "testExecutions", "kind": "array"}"#).unwrap();
/// assert_eq!(typed.kind(), Some(ValueKind::Array));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldRule {
    /// A field identified by name only.
    Name(String),
    /// A field whose value is expected to be of a given kind.
    Typed {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        kind: Option<ValueKind>,
    },
}

impl FieldRule {
    /// Creates an untyped field rule.
    pub fn named(name: &str) -> Self {
        Self::Name(name.to_string())
    }

    /// Creates a field rule with an expected value kind.
    pub fn typed(name: &str, kind: ValueKind) -> Self {
        Self::Typed {
            name: name.to_string(),
            kind: Some(kind),
        }
    }

    /// Field name as written in the spec.
    pub fn name(&self) -> &str {
        match self {
            Self::Name(name) | Self::Typed { name, .. } => name,
        }
    }

    /// Expected value kind, if declared.
    pub fn kind(&self) -> Option<ValueKind> {
        match self {
            Self::Name(_) => None,
            Self::Typed { kind, .. } => *kind,
        }
    }
}

/// A content detection pattern, matched against the document's string values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternRule {
    /// Short label used in diagnostics.
    pub name: String,
    /// Regular expression source (compiled once by the registry).
    pub regex: String,
    /// Relative weight in the content-shape score.
    #[serde(default = "default_weight")]
    pub weight: f64,
}

impl PatternRule {
    /// Creates a pattern rule with unit weight.
    pub fn new(name: &str, regex: &str) -> Self {
        Self {
            name: name.to_string(),
            regex: regex.to_string(),
            weight: 1.0,
        }
    }
}

fn default_weight() -> f64 {
    1.0
}

/// Inclusive range of key depths where a format's fields normally live.
///
/// Keys of the root object are at depth 1; arrays do not add depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthRange {
    pub min: usize,
    pub max: usize,
}

impl Default for DepthRange {
    fn default() -> Self {
        Self { min: 1, max: 6 }
    }
}

impl DepthRange {
    /// Returns `true` if `[lo, hi]` overlaps this range.
    pub fn overlaps(&self, lo: usize, hi: usize) -> bool {
        lo <= self.max && hi >= self.min
    }
}

/// Description of one candidate source format.
///
/// Specs are authored as YAML or JSON and compiled by the registry. Adding a
/// format means adding a spec; nothing in the classifier refers to a format
/// by name.
///
/// # Examples
///
/// ```
/// use testfmt_core::{FieldRule, FormatSpec, ValueKind};
///
/// let spec = FormatSpec::new("JIRA_XRAY", "Jira Xray")
///     .with_required(FieldRule::typed("xrayInfo", ValueKind::Object))
///     .with_required(FieldRule::typed("testExecutions", ValueKind::Array))
///     .with_optional(FieldRule::named("testPlanKey"));
///
/// assert_eq!(spec.id.as_str(), "JIRA_XRAY");
/// assert_eq!(spec.fields().count(), 3);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormatSpec {
    /// Hypothesis identifier (e.g. `"JIRA_XRAY"`).
    pub id: Hypothesis,
    /// Human-readable tool name.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Marks the generic/unknown member. Its evidence is never exclusive.
    #[serde(default)]
    pub sentinel: bool,
    #[serde(default)]
    pub required_fields: Vec<FieldRule>,
    #[serde(default)]
    pub optional_fields: Vec<FieldRule>,
    /// Extra names counted for field-name relevance only.
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub patterns: Vec<PatternRule>,
    #[serde(default)]
    pub depth: DepthRange,
    /// Prior weight; normalized across the registry. Defaults to 1.0.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prior: Option<f64>,
}

impl FormatSpec {
    /// Creates an empty spec.
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: Hypothesis::new(id),
            name: name.to_string(),
            description: None,
            sentinel: false,
            required_fields: Vec::new(),
            optional_fields: Vec::new(),
            aliases: Vec::new(),
            patterns: Vec::new(),
            depth: DepthRange::default(),
            prior: None,
        }
    }

    /// Adds a required field.
    pub fn with_required(mut self, field: FieldRule) -> Self {
        self.required_fields.push(field);
        self
    }

    /// Adds an optional field.
    pub fn with_optional(mut self, field: FieldRule) -> Self {
        self.optional_fields.push(field);
        self
    }

    /// Adds a detection pattern.
    pub fn with_pattern(mut self, pattern: PatternRule) -> Self {
        self.patterns.push(pattern);
        self
    }

    /// Marks this spec as the generic/unknown sentinel.
    pub fn as_sentinel(mut self) -> Self {
        self.sentinel = true;
        self
    }

    /// Sets the prior weight.
    pub fn with_prior(mut self, prior: f64) -> Self {
        self.prior = Some(prior);
        self
    }

    /// Iterates required fields followed by optional fields.
    pub fn fields(&self) -> impl Iterator<Item = &FieldRule> {
        self.required_fields.iter().chain(self.optional_fields.iter())
    }
}

/// Normalizes a field name for comparison.
///
/// Lowercases and keeps ASCII alphanumerics only, so naming conventions do not
/// matter.
///
/// # Examples
///
/// ```
/// use testfmt_core::normalize_field_name;
///
/// assert_eq!(normalize_field_name("testKey"), "testkey");
/// assert_eq!(normalize_field_name("test_key"), "testkey");
/// assert_eq!(normalize_field_name("System.WorkItemType"), "systemworkitemtype");
/// ```
pub fn normalize_field_name(name: &str) -> String {
    name.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|ch| ch.to_ascii_lowercase())
        .collect()
}

/// Bounded evidence scalars for one hypothesis.
///
/// All three terms are clamped to `[0, 1]`; `NaN` collapses to `0`.
///
/// # Examples
///
/// ```
/// use testfmt_core::EvidenceMetrics;
///
/// let metrics = EvidenceMetrics::new(1.4, f64::NAN, 0.5);
/// assert_eq!(metrics.completeness, 1.0);
/// assert_eq!(metrics.quality, 0.0);
/// assert_eq!(metrics.uniqueness, 0.5);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EvidenceMetrics {
    /// Fraction of the hypothesis's expected fields present.
    pub completeness: f64,
    /// Name relevance and content-shape validity of what is present.
    pub quality: f64,
    /// Share of the evidence specific to this hypothesis.
    pub uniqueness: f64,
}

impl EvidenceMetrics {
    /// All-zero evidence.
    pub const ZERO: Self = Self {
        completeness: 0.0,
        quality: 0.0,
        uniqueness: 0.0,
    };

    /// Creates clamped metrics.
    pub fn new(completeness: f64, quality: f64, uniqueness: f64) -> Self {
        Self {
            completeness: unit(completeness),
            quality: unit(quality),
            uniqueness: unit(uniqueness),
        }
    }
}

/// Clamps to `[0, 1]`, mapping `NaN` to `0`.
pub fn unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Which computation path produced a stage's outcome.
///
/// Shortcuts are recorded explicitly so each can be checked against the full
/// computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FastPath {
    /// Gate passed on hypothesis-exclusive indicators without likelihood math.
    UniqueIndicatorMatch,
    /// Calibration pass skipped because the ratio cap cannot bind.
    HighConfidenceSkip,
    /// No shortcut taken.
    #[default]
    FullComputation,
}

impl fmt::Display for FastPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UniqueIndicatorMatch => write!(f, "unique_indicator_match"),
            Self::HighConfidenceSkip => write!(f, "high_confidence_skip"),
            Self::FullComputation => write!(f, "full_computation"),
        }
    }
}

/// Outcome of one classification call.
///
/// When the gate rejects the document, `winning_hypothesis` is `None`,
/// `confidence` is the gate posterior and the per-hypothesis maps are empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub winning_hypothesis: Option<Hypothesis>,
    /// Winning posterior, or the gate posterior when the gate failed.
    pub confidence: f64,
    /// Posterior over every registered hypothesis; sums to 1.
    pub posterior_distribution: BTreeMap<Hypothesis, f64>,
    pub evidence_breakdown: BTreeMap<Hypothesis, EvidenceMetrics>,
    /// P(evidence | hypothesis) per hypothesis.
    pub likelihoods: BTreeMap<Hypothesis, f64>,
    pub gate_passed: bool,
    /// Posterior that the document is test data at all.
    pub gate_confidence: f64,
    pub gate_path: FastPath,
    pub calibration_path: FastPath,
}

impl ClassificationResult {
    /// Builds the terminal result of a failed gate.
    pub fn rejected(gate_confidence: f64) -> Self {
        Self {
            winning_hypothesis: None,
            confidence: gate_confidence,
            posterior_distribution: BTreeMap::new(),
            evidence_breakdown: BTreeMap::new(),
            likelihoods: BTreeMap::new(),
            gate_passed: false,
            gate_confidence,
            gate_path: FastPath::FullComputation,
            calibration_path: FastPath::FullComputation,
        }
    }

    /// Returns the posterior of `hypothesis` (0 when absent).
    pub fn posterior(&self, hypothesis: &Hypothesis) -> f64 {
        self.posterior_distribution
            .get(hypothesis)
            .copied()
            .unwrap_or(0.0)
    }

    /// Posterior entries sorted by descending probability, ties by id.
    pub fn ranked(&self) -> Vec<(&Hypothesis, f64)> {
        let mut entries: Vec<(&Hypothesis, f64)> = self
            .posterior_distribution
            .iter()
            .map(|(h, p)| (h, *p))
            .collect();
        entries.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        entries
    }

    /// Ratio between the two largest posteriors.
    ///
    /// `None` when fewer than two hypotheses were scored or the runner-up is 0.
    pub fn top_two_ratio(&self) -> Option<f64> {
        let ranked = self.ranked();
        match ranked.as_slice() {
            [(_, first), (_, second), ..] if *second > 0.0 => Some(first / second),
            _ => None,
        }
    }
}
