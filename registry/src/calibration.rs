//! Calibration profiles.
//!
//! A profile bundles classifier tunables and per-hypothesis prior weights in
//! one YAML file, so a deployment can be recalibrated without code changes.
//!
//! # Example YAML
//!
//! ```yaml
//! version: "1.0"
//! classifier:
//!   gate_threshold: 0.55
//!   ratio_cap_high: 2.5
//! priors:
//!   JIRA_XRAY: 2.0
//!   GENERIC: 0.5
//! ```

use std::collections::BTreeMap;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};
use testfmt_core::{ClassifierConfig, Hypothesis, Result};

use crate::registry::FormatRegistry;

/// Classifier tunables plus prior weights, loaded from YAML.
///
/// # Examples
///
/// ```
/// use testfmt_core::Hypothesis;
/// use testfmt_registry::{CalibrationProfile, FormatRegistry};
///
/// let profile: CalibrationProfile =
///     serde_yaml::from_str("priors:\n  JIRA_XRAY: 3.0\n").unwrap();
/// let (registry, config) = profile.apply(&FormatRegistry::builtin().unwrap()).unwrap();
///
/// let priors = registry.priors();
/// assert!(priors[&Hypothesis::new("JIRA_XRAY")] > priors[&Hypothesis::new("TESTRAIL")]);
/// assert_eq!(config.gate_threshold, 0.5);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationProfile {
    /// Profile format version (e.g. `"1.0"`).
    pub version: String,
    /// Overrides for the classifier configuration; unset fields keep their
    /// defaults.
    pub classifier: ClassifierConfig,
    /// Prior weights by hypothesis. Weights are relative; the registry
    /// renormalizes them.
    pub priors: BTreeMap<Hypothesis, f64>,
}

impl Default for CalibrationProfile {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            classifier: ClassifierConfig::default(),
            priors: BTreeMap::new(),
        }
    }
}

impl CalibrationProfile {
    /// Loads a profile from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`Io`](testfmt_core::ClassifyError::Io) if the file cannot be
    /// read, or [`Yaml`](testfmt_core::ClassifyError::Yaml) if parsing fails.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let profile = serde_yaml::from_reader(reader)?;
        Ok(profile)
    }

    /// Saves the profile as YAML.
    ///
    /// # Errors
    ///
    /// Returns [`Io`](testfmt_core::ClassifyError::Io) if the file cannot be
    /// written, or [`Yaml`](testfmt_core::ClassifyError::Yaml) if
    /// serialization fails.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = BufWriter::new(file);
        serde_yaml::to_writer(writer, self)?;
        Ok(())
    }

    /// Applies the profile to a registry.
    ///
    /// Returns the reweighted registry and the validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidConfig`](testfmt_core::ClassifyError::InvalidConfig)
    /// for an out-of-range tunable, or
    /// [`InvalidRegistry`](testfmt_core::ClassifyError::InvalidRegistry) when
    /// a prior names an unknown hypothesis or is not positive.
    pub fn apply(&self, registry: &FormatRegistry) -> Result<(FormatRegistry, ClassifierConfig)> {
        let config = self.classifier.clone().validated()?;
        let registry = if self.priors.is_empty() {
            registry.clone()
        } else {
            registry.with_priors(&self.priors)?
        };
        Ok((registry, config))
    }
}
