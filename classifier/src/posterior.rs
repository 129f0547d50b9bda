//! Posterior computation and multi-class normalization.
//!
//! The denominator always spans every registered hypothesis. Weights are
//! combined in log space with a log-sum-exp shift so that vectors of tiny
//! likelihoods normalize without underflow.

use std::collections::BTreeMap;

use testfmt_core::{ClassifierConfig, Hypothesis, unit};
use tracing::debug;

use crate::likelihood::alt_likelihood;

/// `P(hypothesis | evidence)` for every hypothesis in `likelihoods`.
///
/// A hypothesis without a prior gets `1 / n`. Non-finite or non-positive
/// likelihoods and priors contribute zero weight. When the raw denominator
/// `Σ L·prior` falls below `epsilon`, the result is uniform.
///
/// ```
/// use std::collections::BTreeMap;
/// use testfmt_classifier::posterior::posterior;
/// use testfmt_core::Hypothesis;
///
/// let likelihoods = BTreeMap::from([
///     (Hypothesis::new("A"), 0.6),
///     (Hypothesis::new("B"), 0.2),
/// ]);
/// let priors = BTreeMap::from([
///     (Hypothesis::new("A"), 0.5),
///     (Hypothesis::new("B"), 0.5),
/// ]);
/// let posteriors = posterior(&likelihoods, &priors, 1e-15);
/// assert!((posteriors[&Hypothesis::new("A")] - 0.75).abs() < 1e-12);
/// ```
pub fn posterior(
    likelihoods: &BTreeMap<Hypothesis, f64>,
    priors: &BTreeMap<Hypothesis, f64>,
    epsilon: f64,
) -> BTreeMap<Hypothesis, f64> {
    if likelihoods.is_empty() {
        return BTreeMap::new();
    }
    let default_prior = 1.0 / likelihoods.len() as f64;

    let mut raw_total = 0.0;
    let log_weights: Vec<(&Hypothesis, Option<f64>)> = likelihoods
        .iter()
        .map(|(hypothesis, &l)| {
            let prior = priors.get(hypothesis).copied().unwrap_or(default_prior);
            let weight = if l.is_finite() && l > 0.0 && prior.is_finite() && prior > 0.0 {
                raw_total += l * prior;
                Some(l.ln() + prior.ln())
            } else {
                None
            };
            (hypothesis, weight)
        })
        .collect();

    let shift = log_weights
        .iter()
        .filter_map(|(_, w)| *w)
        .fold(f64::NEG_INFINITY, f64::max);
    if raw_total < epsilon || !shift.is_finite() {
        debug!(raw_total, "posterior denominator underflow, using uniform");
        return uniform(likelihoods.keys());
    }

    let scaled: Vec<(&Hypothesis, f64)> = log_weights
        .into_iter()
        .map(|(h, w)| (h, w.map_or(0.0, |w| (w - shift).exp())))
        .collect();
    let total: f64 = scaled.iter().map(|(_, w)| w).sum();

    scaled
        .into_iter()
        .map(|(h, w)| (h.clone(), w / total))
        .collect()
}

/// Uniform distribution over `hypotheses`.
pub fn uniform<'a>(
    hypotheses: impl ExactSizeIterator<Item = &'a Hypothesis>,
) -> BTreeMap<Hypothesis, f64> {
    let share = 1.0 / hypotheses.len() as f64;
    hypotheses.map(|h| (h.clone(), share)).collect()
}

/// Two-class Bayes posterior `L·p / (L·p + alt(L)·(1−p))`.
///
/// Returns the prior unchanged when the denominator underflows.
///
/// ```
/// use testfmt_classifier::posterior::binary_posterior;
/// use testfmt_core::ClassifierConfig;
///
/// let config = ClassifierConfig::default();
/// let weak = binary_posterior(0.003375, 0.3, &config);
/// let strong = binary_posterior(0.857375, 0.3, &config);
/// assert!(weak < 0.01);
/// assert!(strong > 0.9);
/// ```
pub fn binary_posterior(likelihood: f64, prior: f64, config: &ClassifierConfig) -> f64 {
    let alt = alt_likelihood(likelihood, config);
    let numerator = likelihood * prior;
    let denominator = numerator + alt * (1.0 - prior);
    if !(denominator >= config.numerical_epsilon) {
        return prior;
    }
    unit(numerator / denominator)
}

/// Hypothesis with the largest posterior; ties go to the smallest id.
pub fn winner(posteriors: &BTreeMap<Hypothesis, f64>) -> Option<(&Hypothesis, f64)> {
    let mut best: Option<(&Hypothesis, f64)> = None;
    for (hypothesis, &p) in posteriors {
        if best.is_none_or(|(_, top)| p > top) {
            best = Some((hypothesis, p));
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, f64)]) -> BTreeMap<Hypothesis, f64> {
        entries
            .iter()
            .map(|(id, v)| (Hypothesis::new(*id), *v))
            .collect()
    }

    #[test]
    fn test_posterior_sums_to_one() {
        let likelihoods = map(&[("A", 0.5), ("B", 0.05), ("C", 0.003375)]);
        let priors = map(&[("A", 0.2), ("B", 0.5), ("C", 0.3)]);
        let posteriors = posterior(&likelihoods, &priors, 1e-15);
        let total: f64 = posteriors.values().sum();
        assert!((total - 1.0).abs() < 1e-12);
        assert_eq!(posteriors.len(), 3);
    }

    #[test]
    fn test_missing_prior_defaults_to_uniform_share() {
        let likelihoods = map(&[("A", 0.4), ("B", 0.4)]);
        let posteriors = posterior(&likelihoods, &BTreeMap::new(), 1e-15);
        assert!((posteriors[&Hypothesis::new("A")] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_underflowing_denominator_is_uniform() {
        let likelihoods = map(&[("A", 1e-17), ("B", 1e-18), ("C", 1e-19), ("D", 1e-20)]);
        let posteriors = posterior(&likelihoods, &BTreeMap::new(), 1e-15);
        for p in posteriors.values() {
            assert_eq!(*p, 0.25);
        }
    }

    #[test]
    fn test_invalid_likelihoods_get_no_mass() {
        let likelihoods = map(&[("A", 0.5), ("B", f64::NAN), ("C", 0.0)]);
        let posteriors = posterior(&likelihoods, &BTreeMap::new(), 1e-15);
        assert_eq!(posteriors[&Hypothesis::new("A")], 1.0);
        assert_eq!(posteriors[&Hypothesis::new("B")], 0.0);
        assert_eq!(posteriors[&Hypothesis::new("C")], 0.0);
    }

    #[test]
    fn test_all_invalid_is_uniform() {
        let likelihoods = map(&[("A", f64::NAN), ("B", -1.0)]);
        let posteriors = posterior(&likelihoods, &BTreeMap::new(), 1e-15);
        assert_eq!(posteriors[&Hypothesis::new("A")], 0.5);
        assert_eq!(posteriors[&Hypothesis::new("B")], 0.5);
    }

    #[test]
    fn test_empty_input() {
        assert!(posterior(&BTreeMap::new(), &BTreeMap::new(), 1e-15).is_empty());
    }

    #[test]
    fn test_binary_posterior_is_monotone_in_likelihood() {
        let config = ClassifierConfig::default();
        let mut previous = 0.0;
        for i in 1..=100 {
            let p = binary_posterior(i as f64 / 100.0, 0.3, &config);
            assert!(p >= previous);
            previous = p;
        }
    }

    #[test]
    fn test_binary_posterior_degenerate_denominator() {
        let config = ClassifierConfig::default();
        // Both terms vanish for L = 0 and p = 1.
        assert_eq!(binary_posterior(0.0, 1.0, &config), 1.0);
    }

    #[test]
    fn test_winner_ties_break_by_id() {
        let posteriors = map(&[("B", 0.4), ("A", 0.4), ("C", 0.2)]);
        let (id, p) = winner(&posteriors).unwrap();
        assert_eq!(id.as_str(), "A");
        assert_eq!(p, 0.4);
        assert!(winner(&BTreeMap::new()).is_none());
    }
}
