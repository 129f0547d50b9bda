//! Structured classification reporting.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use testfmt_core::{
    ClassificationResult, ErrorKind, EvidenceMetrics, FastPath, Hypothesis,
    SPEC_CONTRACT_VERSION,
};
use testfmt_registry::FormatRegistry;

/// Structured failure code for documents that could not be classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCode {
    /// The document could not be read.
    ReadFailed,
    /// The document is not valid JSON.
    ParseFailed,
    /// The document crossed a size ceiling.
    InputTooLarge,
    /// Configuration or registry problem surfaced while classifying.
    Misconfigured,
}

impl std::fmt::Display for FailureCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ReadFailed => write!(f, "read_failed"),
            Self::ParseFailed => write!(f, "parse_failed"),
            Self::InputTooLarge => write!(f, "input_too_large"),
            Self::Misconfigured => write!(f, "misconfigured"),
        }
    }
}

impl From<ErrorKind> for FailureCode {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::Io => Self::ReadFailed,
            ErrorKind::Parse => Self::ParseFailed,
            ErrorKind::InputTooLarge => Self::InputTooLarge,
            ErrorKind::InvalidConfig | ErrorKind::InvalidRegistry => Self::Misconfigured,
        }
    }
}

/// Gate verdict for one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateReport {
    pub passed: bool,
    pub confidence: f64,
    pub path: FastPath,
}

/// One ranked hypothesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HypothesisReport {
    pub hypothesis: Hypothesis,
    /// Tool name from the registry.
    pub name: String,
    pub posterior: f64,
    pub likelihood: f64,
    pub metrics: EvidenceMetrics,
}

/// Per-document classification report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationReport {
    /// File path or `-` for stdin.
    pub source: String,
    pub contract_version: String,
    pub classified_at: String,
    pub gate: GateReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<Hypothesis>,
    pub confidence: f64,
    pub calibration_path: FastPath,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_two_ratio: Option<f64>,
    /// Hypotheses by descending posterior; empty when the gate failed.
    pub ranked: Vec<HypothesisReport>,
}

impl ClassificationReport {
    pub fn new(
        source: impl Into<String>,
        result: &ClassificationResult,
        registry: &FormatRegistry,
    ) -> Self {
        let ranked = result
            .ranked()
            .into_iter()
            .map(|(hypothesis, posterior)| HypothesisReport {
                hypothesis: hypothesis.clone(),
                name: registry
                    .get(hypothesis)
                    .map_or_else(|| hypothesis.to_string(), |f| f.spec().name.clone()),
                posterior,
                likelihood: result.likelihoods.get(hypothesis).copied().unwrap_or(0.0),
                metrics: result
                    .evidence_breakdown
                    .get(hypothesis)
                    .copied()
                    .unwrap_or_default(),
            })
            .collect();

        Self {
            source: source.into(),
            contract_version: SPEC_CONTRACT_VERSION.to_string(),
            classified_at: Utc::now().to_rfc3339(),
            gate: GateReport {
                passed: result.gate_passed,
                confidence: result.gate_confidence,
                path: result.gate_path,
            },
            winner: result.winning_hypothesis.clone(),
            confidence: result.confidence,
            calibration_path: result.calibration_path,
            top_two_ratio: result.top_two_ratio(),
            ranked,
        }
    }

    /// Tool name of the winner, if any.
    pub fn winner_name(&self) -> Option<&str> {
        self.ranked.first().filter(|_| self.winner.is_some()).map(|r| r.name.as_str())
    }
}

/// A document that could not be classified.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchFailure {
    pub source: String,
    pub code: FailureCode,
    pub detail: String,
}

/// Serializable report of a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub contract_version: String,
    pub generated_at: String,
    pub registry_fingerprint: String,
    pub total: usize,
    /// Documents that passed the gate.
    pub classified: usize,
    /// Documents rejected by the gate.
    pub rejected: usize,
    pub reports: Vec<ClassificationReport>,
    pub failures: Vec<BatchFailure>,
}

impl BatchReport {
    pub fn new(
        registry: &FormatRegistry,
        reports: Vec<ClassificationReport>,
        failures: Vec<BatchFailure>,
    ) -> Self {
        let classified = reports.iter().filter(|r| r.gate.passed).count();
        Self {
            contract_version: SPEC_CONTRACT_VERSION.to_string(),
            generated_at: Utc::now().to_rfc3339(),
            registry_fingerprint: registry.fingerprint().to_string(),
            total: reports.len() + failures.len(),
            classified,
            rejected: reports.len() - classified,
            reports,
            failures,
        }
    }

    /// Count of winners by hypothesis, in id order.
    pub fn winner_counts(&self) -> Vec<(Hypothesis, usize)> {
        let mut counts = std::collections::BTreeMap::new();
        for report in &self.reports {
            if let Some(winner) = &report.winner {
                *counts.entry(winner.clone()).or_insert(0) += 1;
            }
        }
        counts.into_iter().collect()
    }
}
