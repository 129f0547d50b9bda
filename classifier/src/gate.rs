//! First-stage gate: is this document test data at all?
//!
//! The gate looks only at coarse evidence measured against the whole
//! registry (vocabulary hits, exclusive indicators, test-token keys). A
//! document made only of registry vocabulary reaches the second stage even
//! without exclusive indicators; unrelated keys do not. It
//! folds them into an [`EvidenceMetrics`] triple, runs the triple through the
//! same likelihood engine as the per-format stage, and compares the binary
//! posterior against `gate_threshold`.

use std::collections::BTreeMap;

use serde::Serialize;
use testfmt_core::{ClassifierConfig, EvidenceMetrics, FastPath, Hypothesis};
use testfmt_registry::{FormatRegistry, is_test_token_key};
use tracing::debug;

use crate::evidence::RawSignals;
use crate::likelihood::likelihood;
use crate::posterior::binary_posterior;

/// Registry-wide evidence used by the gate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GateEvidence {
    pub distinct_keys: usize,
    /// Distinct keys found in the registry vocabulary.
    pub vocabulary_hits: usize,
    /// Distinct keys owned exclusively by one hypothesis.
    pub exclusive_hits: usize,
    /// Distinct keys containing a test token.
    pub test_token_hits: usize,
    /// Distinct keys in the vocabulary or containing a test token.
    pub signal_hits: usize,
    /// Exclusive keys present, by owning hypothesis.
    pub indicator_owners: BTreeMap<Hypothesis, usize>,
}

impl GateEvidence {
    pub fn collect(signals: &RawSignals, registry: &FormatRegistry) -> Self {
        let mut evidence = Self {
            distinct_keys: signals.distinct_keys(),
            ..Self::default()
        };
        for key in signals.keys.keys() {
            let in_vocabulary = registry.is_vocabulary(key);
            let test_token = is_test_token_key(key);
            if in_vocabulary {
                evidence.vocabulary_hits += 1;
            }
            if let Some(owner) = registry.exclusive_owner(key) {
                evidence.exclusive_hits += 1;
                *evidence.indicator_owners.entry(owner.clone()).or_default() += 1;
            }
            if test_token {
                evidence.test_token_hits += 1;
            }
            if in_vocabulary || test_token {
                evidence.signal_hits += 1;
            }
        }
        evidence
    }

    /// Coarse metrics fed to the likelihood engine.
    ///
    /// - completeness = min(1, vocabulary hits / 2)
    /// - quality = max(vocabulary hits / distinct keys, min(1, exclusive hits / 3))
    /// - uniqueness = min(1, exclusive hits / 2 + signal hits / 4)
    pub fn metrics(&self) -> EvidenceMetrics {
        let vocab = self.vocabulary_hits as f64;
        let exclusive = self.exclusive_hits as f64;
        let density = if self.distinct_keys == 0 {
            0.0
        } else {
            vocab / self.distinct_keys as f64
        };
        EvidenceMetrics::new(
            (vocab / 2.0).min(1.0),
            density.max((exclusive / 3.0).min(1.0)),
            (exclusive / 2.0 + self.signal_hits as f64 / 4.0).min(1.0),
        )
    }

    /// The single hypothesis owning at least `min` exclusive keys, when no
    /// other hypothesis owns any.
    pub fn unique_indicator(&self, min: usize) -> Option<&Hypothesis> {
        match self.indicator_owners.iter().next() {
            Some((owner, &count)) if self.indicator_owners.len() == 1 && count >= min => {
                Some(owner)
            }
            _ => None,
        }
    }

    /// `true` if `hypothesis` owns exclusive keys and no other hypothesis
    /// does.
    pub fn is_uncontested(&self, hypothesis: &Hypothesis) -> bool {
        self.indicator_owners.len() == 1 && self.indicator_owners.contains_key(hypothesis)
    }
}

/// Gate verdict.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GateOutcome {
    pub passed: bool,
    /// Posterior that the document is test data.
    pub confidence: f64,
    pub path: FastPath,
}

/// The configured gate.
#[derive(Debug, Clone)]
pub struct Gate {
    config: ClassifierConfig,
    /// Exclusive-indicator count that short-circuits the gate, when the
    /// shortcut was proven sound for this configuration.
    fast_path_min: Option<usize>,
}

impl Gate {
    /// Builds a gate for `config`.
    ///
    /// The unique-indicator shortcut is enabled only if the full computation
    /// is guaranteed to pass whenever it would fire. Exclusive keys are both
    /// vocabulary and signal hits, so with `n` of them from one owner the
    /// metrics are bounded below by
    /// `(min(1, n/2), min(1, n/3), min(1, 3n/4))`; bands, the likelihood and
    /// the binary posterior are all monotone, so checking that bound
    /// suffices.
    pub fn new(config: &ClassifierConfig) -> Self {
        let min = config.fast_paths.unique_indicator_min;
        let fast_path_min = if config.fast_paths.enabled {
            let n = min as f64;
            let bound = EvidenceMetrics::new(
                (n / 2.0).min(1.0),
                (n / 3.0).min(1.0),
                (n * 0.75).min(1.0),
            );
            let confidence =
                binary_posterior(likelihood(&bound, config), config.test_data_prior, config);
            if confidence >= config.gate_threshold {
                Some(min)
            } else {
                debug!(
                    unique_indicator_min = min,
                    confidence, "unique-indicator gate shortcut disabled"
                );
                None
            }
        } else {
            None
        };
        Self {
            config: config.clone(),
            fast_path_min,
        }
    }

    /// Returns `true` if the unique-indicator shortcut can fire.
    pub fn fast_path_enabled(&self) -> bool {
        self.fast_path_min.is_some()
    }

    pub fn evaluate(&self, evidence: &GateEvidence) -> GateOutcome {
        if let Some(owner) = self
            .fast_path_min
            .and_then(|min| evidence.unique_indicator(min))
        {
            debug!(
                %owner,
                indicators = evidence.exclusive_hits,
                "gate passed on unique indicators"
            );
            return GateOutcome {
                passed: true,
                confidence: 1.0,
                path: FastPath::UniqueIndicatorMatch,
            };
        }
        self.evaluate_full(evidence)
    }

    /// Full gate computation, never taking the shortcut.
    pub fn evaluate_full(&self, evidence: &GateEvidence) -> GateOutcome {
        let config = &self.config;
        let l = likelihood(&evidence.metrics(), config);
        let confidence = binary_posterior(l, config.test_data_prior, config);
        GateOutcome {
            passed: confidence >= config.gate_threshold,
            confidence,
            path: FastPath::FullComputation,
        }
    }
}
