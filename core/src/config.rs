//! Classifier tunables.
//!
//! Every empirically tuned constant lives here as a named, overridable
//! default. A configuration is validated once, when a classifier is built;
//! out-of-range values fail fast instead of being clamped.
//!
//! # Example YAML
//!
//! ```yaml
//! gate_threshold: 0.5
//! test_data_prior: 0.3
//! numerical_epsilon: 1.0e-15
//! ratio_cap_low: 1.5
//! ratio_cap_high: 3.0
//! ratio_cap_breakpoint: 0.3
//! limits:
//!   max_bytes: 33554432
//!   max_nodes: 2000000
//! fast_paths:
//!   enabled: true
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{ClassifyError, Result};

/// Ceilings enforced before any evidence is extracted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SizeLimits {
    /// Maximum raw (or estimated serialized) document size in bytes.
    pub max_bytes: usize,
    /// Maximum number of nodes (objects, arrays and scalars).
    pub max_nodes: usize,
    /// Maximum amount of string content kept for pattern matching.
    pub max_text_bytes: usize,
}

impl Default for SizeLimits {
    fn default() -> Self {
        Self {
            max_bytes: 32 * 1024 * 1024,
            max_nodes: 2_000_000,
            max_text_bytes: 256 * 1024,
        }
    }
}

/// Controls the two shortcut paths.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FastPathPolicy {
    pub enabled: bool,
    /// Exclusive indicators of a single hypothesis needed to pass the gate
    /// without computing its likelihood.
    pub unique_indicator_min: usize,
    /// Winning posterior above which an uncontested verdict skips calibration.
    pub high_confidence_skip: f64,
}

impl Default for FastPathPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            unique_indicator_min: 3,
            high_confidence_skip: 0.90,
        }
    }
}

/// Validated classifier configuration.
///
/// # Examples
///
/// ```
/// use testfmt_core::{ClassifierConfig, ErrorKind};
///
/// let config = ClassifierConfig::default();
/// assert!(config.validate().is_ok());
/// assert_eq!(config.gate_threshold, 0.5);
///
/// let bad = ClassifierConfig { numerical_epsilon: 1e-5, ..ClassifierConfig::default() };
/// assert_eq!(bad.validate().unwrap_err().kind(), ErrorKind::InvalidConfig);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Minimum gate posterior for a document to count as test data.
    pub gate_threshold: f64,
    /// Prior probability that an arbitrary document is test data.
    pub test_data_prior: f64,
    /// Floor used before logarithms and as the normalization underflow bound.
    pub numerical_epsilon: f64,
    /// Maximum top-two posterior ratio under weak evidence.
    pub ratio_cap_low: f64,
    /// Maximum top-two posterior ratio under strong evidence.
    pub ratio_cap_high: f64,
    /// Winning likelihood at or below which the low cap applies.
    pub ratio_cap_breakpoint: f64,
    /// Upper bound on any likelihood; finite evidence is never certain.
    pub likelihood_cap: f64,
    /// Lower bound of P(evidence | not hypothesis).
    pub alt_likelihood_floor: f64,
    /// Range of P(evidence | not hypothesis) above its floor.
    pub alt_likelihood_span: f64,
    pub limits: SizeLimits,
    pub fast_paths: FastPathPolicy,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            gate_threshold: 0.50,
            test_data_prior: 0.30,
            numerical_epsilon: 1e-15,
            ratio_cap_low: 1.5,
            ratio_cap_high: 3.0,
            ratio_cap_breakpoint: 0.30,
            likelihood_cap: 0.95,
            alt_likelihood_floor: 0.01,
            alt_likelihood_span: 0.49,
            limits: SizeLimits::default(),
            fast_paths: FastPathPolicy::default(),
        }
    }
}

impl ClassifierConfig {
    /// Checks every field against its allowed range.
    ///
    /// # Errors
    ///
    /// Returns [`ClassifyError::InvalidConfig`] naming the first offending
    /// field.
    pub fn validate(&self) -> Result<()> {
        open_unit("gate_threshold", self.gate_threshold)?;
        open_unit("test_data_prior", self.test_data_prior)?;
        if !(self.numerical_epsilon > 1e-20 && self.numerical_epsilon < 1e-10) {
            return Err(invalid(
                "numerical_epsilon",
                self.numerical_epsilon,
                "must be in (1e-20, 1e-10)",
            ));
        }
        if !(self.ratio_cap_low.is_finite() && self.ratio_cap_low >= 1.0) {
            return Err(invalid("ratio_cap_low", self.ratio_cap_low, "must be >= 1.0"));
        }
        if !(self.ratio_cap_high.is_finite() && self.ratio_cap_high >= self.ratio_cap_low) {
            return Err(invalid(
                "ratio_cap_high",
                self.ratio_cap_high,
                "must be finite and >= ratio_cap_low",
            ));
        }
        open_unit("ratio_cap_breakpoint", self.ratio_cap_breakpoint)?;
        open_unit("likelihood_cap", self.likelihood_cap)?;
        open_unit("alt_likelihood_floor", self.alt_likelihood_floor)?;
        if !(self.alt_likelihood_span >= 0.0
            && self.alt_likelihood_floor + self.alt_likelihood_span <= 1.0)
        {
            return Err(invalid(
                "alt_likelihood_span",
                self.alt_likelihood_span,
                "must be >= 0 with floor + span <= 1",
            ));
        }
        if self.limits.max_bytes == 0 {
            return Err(ClassifyError::InvalidConfig(
                "limits.max_bytes must be positive".to_string(),
            ));
        }
        if self.limits.max_nodes == 0 {
            return Err(ClassifyError::InvalidConfig(
                "limits.max_nodes must be positive".to_string(),
            ));
        }
        if self.fast_paths.unique_indicator_min == 0 {
            return Err(ClassifyError::InvalidConfig(
                "fast_paths.unique_indicator_min must be at least 1".to_string(),
            ));
        }
        let skip = self.fast_paths.high_confidence_skip;
        if !(skip > 0.5 && skip < 1.0) {
            return Err(invalid(
                "fast_paths.high_confidence_skip",
                skip,
                "must be in (0.5, 1)",
            ));
        }
        Ok(())
    }

    /// Returns a validated copy.
    ///
    /// # Errors
    ///
    /// Same as [`validate`](Self::validate).
    pub fn validated(self) -> Result<Self> {
        self.validate()?;
        Ok(self)
    }

    /// Ratio cap for a given winning likelihood.
    ///
    /// ```
    /// use testfmt_core::ClassifierConfig;
    ///
    /// let config = ClassifierConfig::default();
    /// assert_eq!(config.ratio_cap_for(0.30), 1.5);
    /// assert_eq!(config.ratio_cap_for(0.31), 3.0);
    /// ```
    pub fn ratio_cap_for(&self, winning_likelihood: f64) -> f64 {
        if winning_likelihood <= self.ratio_cap_breakpoint {
            self.ratio_cap_low
        } else {
            self.ratio_cap_high
        }
    }
}

fn open_unit(field: &str, value: f64) -> Result<()> {
    if value > 0.0 && value < 1.0 {
        Ok(())
    } else {
        Err(invalid(field, value, "must be in (0, 1)"))
    }
}

fn invalid(field: &str, value: f64, rule: &str) -> ClassifyError {
    ClassifyError::InvalidConfig(format!("{field} = {value} {rule}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    fn assert_rejected(config: ClassifierConfig, field: &str) {
        let err = config.validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);
        assert!(
            err.to_string().contains(field),
            "expected '{field}' in '{err}'"
        );
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(ClassifierConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_out_of_range_epsilon() {
        for eps in [0.0, 1e-20, 1e-10, 1e-3, f64::NAN] {
            let config = ClassifierConfig {
                numerical_epsilon: eps,
                ..ClassifierConfig::default()
            };
            assert_rejected(config, "numerical_epsilon");
        }
    }

    #[test]
    fn test_rejects_negative_prior() {
        let config = ClassifierConfig {
            test_data_prior: -0.2,
            ..ClassifierConfig::default()
        };
        assert_rejected(config, "test_data_prior");
    }

    #[test]
    fn test_rejects_inverted_ratio_caps() {
        let config = ClassifierConfig {
            ratio_cap_low: 2.0,
            ratio_cap_high: 1.5,
            ..ClassifierConfig::default()
        };
        assert_rejected(config, "ratio_cap_high");

        let config = ClassifierConfig {
            ratio_cap_low: 0.9,
            ..ClassifierConfig::default()
        };
        assert_rejected(config, "ratio_cap_low");
    }

    #[test]
    fn test_rejects_alt_likelihood_above_one() {
        let config = ClassifierConfig {
            alt_likelihood_floor: 0.6,
            alt_likelihood_span: 0.5,
            ..ClassifierConfig::default()
        };
        assert_rejected(config, "alt_likelihood_span");
    }

    #[test]
    fn test_rejects_zero_limits() {
        let mut config = ClassifierConfig::default();
        config.limits.max_nodes = 0;
        assert_rejected(config, "limits.max_nodes");
    }

    #[test]
    fn test_rejects_bad_fast_path_policy() {
        let mut config = ClassifierConfig::default();
        config.fast_paths.high_confidence_skip = 0.4;
        assert_rejected(config, "high_confidence_skip");

        let mut config = ClassifierConfig::default();
        config.fast_paths.unique_indicator_min = 0;
        assert_rejected(config, "unique_indicator_min");
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config: ClassifierConfig =
            serde_yaml::from_str("gate_threshold: 0.6\nlimits:\n  max_nodes: 10\n").unwrap();
        assert_eq!(config.gate_threshold, 0.6);
        assert_eq!(config.limits.max_nodes, 10);
        assert_eq!(config.limits.max_bytes, SizeLimits::default().max_bytes);
        assert_eq!(config.ratio_cap_high, 3.0);
        assert!(config.validate().is_ok());
    }
}
