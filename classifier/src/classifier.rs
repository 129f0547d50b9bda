//! Two-stage classifier façade.
//!
//! Stage one ([`Gate`]) decides whether the document is test data at all and
//! terminates early when it is not. Stage two scores every registered
//! hypothesis, normalizes the posteriors over the whole registry and runs the
//! calibration guard.

use std::collections::BTreeMap;

use serde_json::Value;
use testfmt_core::{
    ClassificationResult, ClassifierConfig, ClassifyError, Hypothesis, Result, unit,
};
use testfmt_registry::FormatRegistry;
use tracing::{debug, warn};

use crate::cache::{CacheKey, ResultCache};
use crate::calibration::{calibrate, renormalize};
use crate::evidence::{RawSignals, check_size};
use crate::gate::{Gate, GateEvidence};
use crate::likelihood::likelihood;
use crate::metrics;
use crate::posterior::{posterior, uniform, winner};

/// Tolerance for the sum-to-one invariant.
const NORMALIZATION_TOLERANCE: f64 = 1e-9;

/// Classifies one document.
///
/// Validates `config` and `registry` on every call; prefer [`Classifier`]
/// when classifying many documents with the same settings.
///
/// # Errors
///
/// - [`ClassifyError::InvalidConfig`] for an out-of-range tunable.
/// - [`ClassifyError::InvalidRegistry`] for an empty registry.
/// - [`ClassifyError::InputTooLarge`] when the document crosses a size
///   ceiling.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use testfmt_classifier::classify;
/// use testfmt_core::{ClassifierConfig, Hypothesis};
/// use testfmt_registry::FormatRegistry;
///
/// let registry = FormatRegistry::builtin().unwrap();
/// let doc = json!({"xrayInfo": {}, "testExecutions": []});
///
/// let result = classify(&doc, &registry, &ClassifierConfig::default()).unwrap();
/// assert!(result.gate_passed);
/// assert_eq!(result.winning_hypothesis, Some(Hypothesis::new("JIRA_XRAY")));
/// assert!(result.confidence >= 0.8);
/// ```
pub fn classify(
    document: &Value,
    registry: &FormatRegistry,
    config: &ClassifierConfig,
) -> Result<ClassificationResult> {
    config.validate()?;
    ensure_registry(registry)?;
    run(document, registry, config, &Gate::new(config))
}

/// A validated registry and configuration, ready to classify documents.
///
/// `Classifier` is immutable and `Send + Sync`; share one instance across
/// worker threads.
#[derive(Debug, Clone)]
pub struct Classifier {
    registry: FormatRegistry,
    config: ClassifierConfig,
    gate: Gate,
}

impl Classifier {
    /// Builds a classifier.
    ///
    /// # Errors
    ///
    /// Returns [`ClassifyError::InvalidConfig`] if `config` fails validation,
    /// or [`ClassifyError::InvalidRegistry`] if `registry` is empty.
    pub fn new(registry: FormatRegistry, config: ClassifierConfig) -> Result<Self> {
        config.validate()?;
        ensure_registry(&registry)?;
        let gate = Gate::new(&config);
        debug!(
            hypotheses = registry.len(),
            gate_fast_path = gate.fast_path_enabled(),
            "classifier ready"
        );
        Ok(Self {
            registry,
            config,
            gate,
        })
    }

    /// Classifier over the built-in registry with default settings.
    ///
    /// # Errors
    ///
    /// Returns an error only if the embedded registry fails to load.
    pub fn builtin() -> Result<Self> {
        Self::new(FormatRegistry::builtin()?, ClassifierConfig::default())
    }

    pub fn registry(&self) -> &FormatRegistry {
        &self.registry
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Classifies a parsed document.
    ///
    /// # Errors
    ///
    /// Returns [`ClassifyError::InputTooLarge`] when the document crosses a
    /// size ceiling.
    pub fn classify(&self, document: &Value) -> Result<ClassificationResult> {
        run(document, &self.registry, &self.config, &self.gate)
    }

    /// Parses and classifies raw JSON bytes.
    ///
    /// The byte ceiling is checked before parsing.
    ///
    /// # Errors
    ///
    /// Returns [`ClassifyError::InputTooLarge`] for oversized input or
    /// [`ClassifyError::Json`] if the bytes are not valid JSON.
    pub fn classify_slice(&self, bytes: &[u8]) -> Result<ClassificationResult> {
        let max = self.config.limits.max_bytes;
        if bytes.len() > max {
            return Err(ClassifyError::InputTooLarge {
                limit: "bytes",
                observed: bytes.len(),
                max,
            });
        }
        let document: Value = serde_json::from_slice(bytes)?;
        self.classify(&document)
    }

    /// Classifies through a read-through cache.
    ///
    /// Oversized documents are rejected before the cache is consulted.
    ///
    /// # Errors
    ///
    /// Same as [`classify`](Self::classify).
    pub fn classify_cached(
        &self,
        document: &Value,
        cache: &dyn ResultCache,
    ) -> Result<ClassificationResult> {
        check_size(document, &self.config.limits)?;
        let key = CacheKey::new(document, &self.registry, &self.config)?;
        if let Some(hit) = cache.get(&key) {
            debug!(document = %&key.document_sha256[..12], "cache hit");
            return Ok(hit);
        }
        let result = self.classify(document)?;
        cache.put(&key, &result);
        Ok(result)
    }
}

fn ensure_registry(registry: &FormatRegistry) -> Result<()> {
    if registry.is_empty() {
        return Err(ClassifyError::InvalidRegistry(
            "registry contains no hypotheses".to_string(),
        ));
    }
    Ok(())
}

fn run(
    document: &Value,
    registry: &FormatRegistry,
    config: &ClassifierConfig,
    gate: &Gate,
) -> Result<ClassificationResult> {
    let signals = RawSignals::extract(document, &config.limits)?;

    let evidence = GateEvidence::collect(&signals, registry);
    let outcome = gate.evaluate(&evidence);
    if !outcome.passed {
        debug!(
            confidence = outcome.confidence,
            keys = signals.distinct_keys(),
            "gate rejected document"
        );
        return Ok(ClassificationResult::rejected(outcome.confidence));
    }

    let mut evidence_breakdown = BTreeMap::new();
    let mut likelihoods = BTreeMap::new();
    for format in registry.formats() {
        let metrics = metrics::score(&signals, format, registry);
        likelihoods.insert(format.id().clone(), likelihood(&metrics, config));
        evidence_breakdown.insert(format.id().clone(), metrics);
    }

    let mut posteriors = posterior(&likelihoods, &registry.priors(), config.numerical_epsilon);

    let leader: Option<Hypothesis> = winner(&posteriors).map(|(h, _)| h.clone());
    let winning_likelihood = leader
        .as_ref()
        .and_then(|h| likelihoods.get(h))
        .copied()
        .unwrap_or(config.numerical_epsilon);
    let uncontested = leader.as_ref().is_some_and(|h| evidence.is_uncontested(h));
    let calibration_path = calibrate(&mut posteriors, winning_likelihood, uncontested, config);

    enforce_distribution(&mut posteriors);

    let (winning_hypothesis, confidence) = match winner(&posteriors) {
        Some((h, p)) => (Some(h.clone()), p),
        None => (None, 0.0),
    };
    debug!(
        winner = ?winning_hypothesis,
        confidence,
        gate_path = %outcome.path,
        calibration_path = %calibration_path,
        "classified document"
    );

    Ok(ClassificationResult {
        winning_hypothesis,
        confidence,
        posterior_distribution: posteriors,
        evidence_breakdown,
        likelihoods,
        gate_passed: true,
        gate_confidence: outcome.confidence,
        gate_path: outcome.path,
        calibration_path,
    })
}

/// Asserts the posterior invariants in debug builds and repairs the vector
/// in release builds.
fn enforce_distribution(posteriors: &mut BTreeMap<Hypothesis, f64>) {
    let total: f64 = posteriors.values().sum();
    let in_range = posteriors
        .values()
        .all(|p| p.is_finite() && (0.0..=1.0).contains(p));
    let valid = in_range && (total - 1.0).abs() <= NORMALIZATION_TOLERANCE;
    debug_assert!(valid, "posterior vector violates invariants (total = {total})");
    if valid {
        return;
    }

    warn!(total, "posterior vector clamped and renormalized");
    for p in posteriors.values_mut() {
        *p = unit(*p);
    }
    if posteriors.values().sum::<f64>() > 0.0 {
        renormalize(posteriors);
    } else {
        let flat = uniform(posteriors.keys());
        *posteriors = flat;
    }
}
