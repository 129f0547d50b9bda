//! Stability and calibration guard.
//!
//! Bounds the confidence ratio between the top two posteriors so weak
//! evidence cannot produce an overconfident verdict, then renormalizes the
//! full vector.

use std::collections::BTreeMap;

use testfmt_core::{ClassifierConfig, FastPath, Hypothesis};
use tracing::debug;

use crate::posterior::winner;

/// Clamps `top / runner_up` to at most `cap`.
///
/// Mass is moved between the top two entries only; their combined mass is
/// preserved so every other posterior keeps its value. Returns `true` if the
/// cap was applied. A zero runner-up has no finite ratio and is left alone.
///
/// ```
/// use std::collections::BTreeMap;
/// use testfmt_classifier::calibration::apply_ratio_cap;
/// use testfmt_core::Hypothesis;
///
/// let mut posteriors = BTreeMap::from([
///     (Hypothesis::new("A"), 0.8),
///     (Hypothesis::new("B"), 0.1),
///     (Hypothesis::new("C"), 0.1),
/// ]);
/// assert!(apply_ratio_cap(&mut posteriors, 1.5));
/// assert!((posteriors[&Hypothesis::new("A")] - 0.54).abs() < 1e-12);
/// assert!((posteriors[&Hypothesis::new("B")] - 0.36).abs() < 1e-12);
/// ```
pub fn apply_ratio_cap(posteriors: &mut BTreeMap<Hypothesis, f64>, cap: f64) -> bool {
    let (first, second) = {
        let mut ranked: Vec<(&Hypothesis, f64)> =
            posteriors.iter().map(|(h, p)| (h, *p)).collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        match ranked.as_slice() {
            [first, second, ..] => ((first.0.clone(), first.1), (second.0.clone(), second.1)),
            _ => return false,
        }
    };

    let (p1, p2) = (first.1, second.1);
    if p2 <= 0.0 || p1 / p2 <= cap {
        return false;
    }

    let pair = p1 + p2;
    posteriors.insert(first.0, pair * cap / (1.0 + cap));
    posteriors.insert(second.0, pair / (1.0 + cap));
    renormalize(posteriors);
    true
}

/// Rescales `posteriors` to sum to 1. A zero or non-finite total is left
/// untouched.
pub fn renormalize(posteriors: &mut BTreeMap<Hypothesis, f64>) {
    let total: f64 = posteriors.values().sum();
    if total > 0.0 && total.is_finite() {
        for p in posteriors.values_mut() {
            *p /= total;
        }
    }
}

/// Runs the calibration pass over a normalized posterior vector.
///
/// The cap for `winning_likelihood` always binds at or below
/// `ratio_cap_breakpoint`. Above it, the cap is lifted when `uncontested` is
/// `true`, meaning the current winner owns exclusive evidence and no other
/// hypothesis does. With fast paths enabled, a lifted winner above
/// `high_confidence_skip` returns immediately without renormalizing.
pub fn calibrate(
    posteriors: &mut BTreeMap<Hypothesis, f64>,
    winning_likelihood: f64,
    uncontested: bool,
    config: &ClassifierConfig,
) -> FastPath {
    let top = winner(posteriors).map_or(0.0, |(_, p)| p);
    let lifted = uncontested && winning_likelihood > config.ratio_cap_breakpoint;

    if config.fast_paths.enabled && lifted && top > config.fast_paths.high_confidence_skip {
        debug!(posterior = top, "calibration skipped for uncontested winner");
        return FastPath::HighConfidenceSkip;
    }

    if !lifted {
        let cap = config.ratio_cap_for(winning_likelihood);
        if apply_ratio_cap(posteriors, cap) {
            debug!(cap, winning_likelihood, "ambiguity ratio cap applied");
        }
    }
    renormalize(posteriors);
    FastPath::FullComputation
}
