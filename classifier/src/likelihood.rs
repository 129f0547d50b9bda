//! Likelihood engine.
//!
//! Maps each evidence scalar through a monotone step function and combines
//! the three mapped values in log space under the conditional-independence
//! assumption:
//!
//! ```text
//! log L = ln band(completeness) + ln band(quality) + ln band(uniqueness)
//! L     = exp(log L), clamped to [ε, likelihood_cap]
//! ```

use testfmt_core::{ClassifierConfig, EvidenceMetrics};
use tracing::warn;

/// Mapped value for a metric of exactly 0. Absence of evidence is weak, not
/// conclusive, evidence against a hypothesis.
pub const BAND_FLOOR: f64 = 0.15;

/// Step function approximating a sigmoid over `[0, 1]`.
///
/// | metric       | mapped |
/// |--------------|--------|
/// | ≥ 0.95       | 0.95   |
/// | ≥ 0.80       | 0.85   |
/// | ≥ 0.65       | 0.70   |
/// | ≥ 0.50       | 0.55   |
/// | ≥ 0.35       | 0.40   |
/// | > 0.20       | 0.25   |
/// | otherwise    | 0.15   |
///
/// ```
/// use testfmt_classifier::likelihood::band;
///
/// assert_eq!(band(1.0), 0.95);
/// assert_eq!(band(0.5), 0.55);
/// assert_eq!(band(0.2), 0.15);
/// assert_eq!(band(0.0), 0.15);
/// ```
pub fn band(metric: f64) -> f64 {
    match metric {
        m if m >= 0.95 => 0.95,
        m if m >= 0.80 => 0.85,
        m if m >= 0.65 => 0.70,
        m if m >= 0.50 => 0.55,
        m if m >= 0.35 => 0.40,
        m if m > 0.20 => 0.25,
        _ => BAND_FLOOR,
    }
}

/// Sum of the floored log-bands of the three metrics.
pub fn log_likelihood(metrics: &EvidenceMetrics, epsilon: f64) -> f64 {
    [metrics.completeness, metrics.quality, metrics.uniqueness]
        .into_iter()
        .map(|metric| band(metric).max(epsilon).ln())
        .sum()
}

/// `P(evidence | hypothesis)` in `[ε, likelihood_cap]`.
///
/// A product outside `(0, 1]` is an invariant violation: it asserts in debug
/// builds and is clamped with a warning in release builds.
///
/// ```
/// use testfmt_classifier::likelihood::likelihood;
/// use testfmt_core::{ClassifierConfig, EvidenceMetrics};
///
/// let config = ClassifierConfig::default();
/// let l = likelihood(&EvidenceMetrics::new(1.0, 0.7, 1.0), &config);
/// assert!((l - 0.95 * 0.70 * 0.95).abs() < 1e-12);
/// ```
pub fn likelihood(metrics: &EvidenceMetrics, config: &ClassifierConfig) -> f64 {
    let epsilon = config.numerical_epsilon;
    let value = log_likelihood(metrics, epsilon).exp();
    let in_range = value.is_finite() && value > 0.0 && value <= 1.0;
    debug_assert!(in_range, "likelihood {value} outside (0, 1]");
    if !in_range {
        warn!(value, "likelihood outside (0, 1] clamped");
    }
    if value.is_finite() {
        value.clamp(epsilon, config.likelihood_cap)
    } else {
        epsilon
    }
}

/// `P(evidence | ¬hypothesis)`: quadratic decay from `floor + span` at
/// `L = 0` down to `floor` at `L = 1`.
///
/// ```
/// use testfmt_classifier::likelihood::alt_likelihood;
/// use testfmt_core::ClassifierConfig;
///
/// let config = ClassifierConfig::default();
/// assert!((alt_likelihood(0.0, &config) - 0.50).abs() < 1e-12);
/// assert!((alt_likelihood(1.0, &config) - 0.01).abs() < 1e-12);
/// ```
pub fn alt_likelihood(likelihood: f64, config: &ClassifierConfig) -> f64 {
    let l = testfmt_core::unit(likelihood);
    config.alt_likelihood_floor + config.alt_likelihood_span * (1.0 - l).powi(2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_boundaries() {
        let cases = [
            (0.95, 0.95),
            (0.9499, 0.85),
            (0.80, 0.85),
            (0.65, 0.70),
            (0.64, 0.55),
            (0.35, 0.40),
            (0.21, 0.25),
            (0.20, 0.15),
            (f64::NAN, 0.15),
        ];
        for (metric, expected) in cases {
            assert_eq!(band(metric), expected, "band({metric})");
        }
    }

    #[test]
    fn test_band_is_monotone() {
        let mut previous = 0.0;
        for i in 0..=1000 {
            let mapped = band(i as f64 / 1000.0);
            assert!(mapped >= previous);
            previous = mapped;
        }
    }

    #[test]
    fn test_zero_evidence_floors_instead_of_zeroing() {
        let config = ClassifierConfig::default();
        let l = likelihood(&EvidenceMetrics::ZERO, &config);
        assert!((l - BAND_FLOOR.powi(3)).abs() < 1e-12);
    }

    #[test]
    fn test_likelihood_respects_cap() {
        let mut config = ClassifierConfig::default();
        let strongest = EvidenceMetrics::new(1.0, 1.0, 1.0);
        assert!((likelihood(&strongest, &config) - 0.95f64.powi(3)).abs() < 1e-12);

        config.likelihood_cap = 0.5;
        assert_eq!(likelihood(&strongest, &config), 0.5);
    }

    #[test]
    fn test_every_band_combination_stays_in_range() {
        let levels = [0.0, 0.21, 0.35, 0.5, 0.65, 0.8, 0.95];
        for epsilon in [1e-19, 1e-15, 1e-11] {
            let config = ClassifierConfig {
                numerical_epsilon: epsilon,
                ..ClassifierConfig::default()
            };
            for c in levels {
                for q in levels {
                    for u in levels {
                        let l = likelihood(&EvidenceMetrics::new(c, q, u), &config);
                        assert!(l > 0.0 && l <= config.likelihood_cap, "{c} {q} {u}: {l}");
                    }
                }
            }
        }
    }

    #[test]
    fn test_log_likelihood_matches_product() {
        let metrics = EvidenceMetrics::new(0.4, 0.8, 0.1);
        let log_l = log_likelihood(&metrics, 1e-15);
        assert!((log_l.exp() - 0.40 * 0.85 * 0.15).abs() < 1e-12);
    }

    #[test]
    fn test_alt_likelihood_range_and_decay() {
        let config = ClassifierConfig::default();
        let mut previous = f64::INFINITY;
        for i in 0..=100 {
            let alt = alt_likelihood(i as f64 / 100.0, &config);
            assert!((0.01..=0.50).contains(&alt));
            assert!(alt <= previous);
            previous = alt;
        }
        // Out-of-range input is clamped, not extrapolated.
        assert_eq!(alt_likelihood(2.0, &config), alt_likelihood(1.0, &config));
    }
}
