//! Evidence metrics model.
//!
//! Scores the [`RawSignals`] of a document against one compiled format and
//! returns the bounded completeness/quality/uniqueness triple. Scoring never
//! fails: missing fields or patterns simply contribute `0`. Keys owned
//! exclusively by another format are left out of this format's relevance,
//! so another format's indicator never moves its score.

use std::collections::BTreeSet;

use testfmt_core::EvidenceMetrics;
use testfmt_registry::{CompiledField, CompiledFormat, CompiledPattern, FormatRegistry};

use crate::evidence::{KeyStats, RawSignals};

const PRESENCE_WEIGHT: f64 = 0.6;
const DEPTH_WEIGHT: f64 = 0.3;
const BREADTH_WEIGHT: f64 = 0.1;

const RELEVANCE_WEIGHT: f64 = 0.7;
const SHAPE_WEIGHT: f64 = 0.3;

const DIVERSITY_WEIGHT: f64 = 0.8;
const PATTERN_UNIQUENESS_WEIGHT: f64 = 0.2;

const CONTAINMENT_SCORE: f64 = 0.8;
const MIN_CONTAINMENT_LEN: usize = 5;
const MIN_CONTAINMENT_RATIO: f64 = 0.6;
const DICE_THRESHOLD: f64 = 0.75;
const DICE_SCALE: f64 = 0.7;

/// Similarity of two normalized field names in `[0, 1]`.
///
/// - identical names score 1.0;
/// - containment scores 0.8 when the shorter name has at least five
///   characters and covers at least 60% of the longer one;
/// - otherwise a bigram Dice coefficient of at least 0.75 scores `0.7 × dice`;
/// - anything else scores 0.
///
/// # Examples
///
/// ```
/// use testfmt_classifier::metrics::name_similarity;
///
/// assert_eq!(name_similarity("testkey", "testkey"), 1.0);
/// assert_eq!(name_similarity("testcase", "testcases"), 0.8);
/// assert_eq!(name_similarity("id", "testrunid"), 0.0);
/// ```
pub fn name_similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    let (shorter, longer) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    if shorter.len() >= MIN_CONTAINMENT_LEN
        && longer.contains(shorter)
        && shorter.len() as f64 / longer.len() as f64 >= MIN_CONTAINMENT_RATIO
    {
        return CONTAINMENT_SCORE;
    }
    let dice = bigram_dice(a, b);
    if dice >= DICE_THRESHOLD {
        DICE_SCALE * dice
    } else {
        0.0
    }
}

/// Sørensen-Dice coefficient over character bigrams (multiset).
pub fn bigram_dice(a: &str, b: &str) -> f64 {
    let x = bigrams(a);
    let y = bigrams(b);
    if x.is_empty() || y.is_empty() {
        return 0.0;
    }

    let (mut i, mut j, mut common) = (0, 0, 0usize);
    while i < x.len() && j < y.len() {
        match x[i].cmp(&y[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                common += 1;
                i += 1;
                j += 1;
            }
        }
    }
    2.0 * common as f64 / (x.len() + y.len()) as f64
}

fn bigrams(s: &str) -> Vec<[u8; 2]> {
    let mut grams: Vec<[u8; 2]> = s.as_bytes().windows(2).map(|w| [w[0], w[1]]).collect();
    grams.sort_unstable();
    grams
}

/// Best similarity of `key` to any name in `vocabulary`.
pub fn best_similarity(key: &str, vocabulary: &BTreeSet<String>) -> f64 {
    if vocabulary.contains(key) {
        return 1.0;
    }
    vocabulary
        .iter()
        .map(|name| name_similarity(key, name))
        .fold(0.0, f64::max)
}

/// Fields and patterns of one format found in a document.
struct Matches<'a> {
    fields: Vec<(&'a CompiledField, &'a KeyStats)>,
    patterns: Vec<&'a CompiledPattern>,
}

impl<'a> Matches<'a> {
    fn find(format: &'a CompiledFormat, signals: &'a RawSignals) -> Self {
        let fields = format
            .fields()
            .iter()
            .filter_map(|field| signals.key(&field.normalized).map(|stats| (field, stats)))
            .collect();
        let patterns = if signals.text.is_empty() {
            Vec::new()
        } else {
            format
                .patterns()
                .iter()
                .filter(|p| p.regex.is_match(&signals.text))
                .collect()
        };
        Self { fields, patterns }
    }

    fn pattern_weight(&self) -> f64 {
        self.patterns.iter().map(|p| p.weight).sum()
    }
}

/// Scores a document against one format.
///
/// ```
/// use serde_json::json;
/// use testfmt_classifier::evidence::RawSignals;
/// use testfmt_classifier::metrics::score;
/// use testfmt_core::{Hypothesis, SizeLimits};
/// use testfmt_registry::FormatRegistry;
///
/// let registry = FormatRegistry::builtin().unwrap();
/// let xray = registry.get(&Hypothesis::new("JIRA_XRAY")).unwrap();
/// let doc = json!({"xrayInfo": {}, "testExecutions": []});
/// let signals = RawSignals::extract(&doc, &SizeLimits::default()).unwrap();
///
/// let metrics = score(&signals, xray, &registry);
/// assert!(metrics.completeness > 0.9);
/// assert_eq!(metrics.uniqueness, 0.8);
/// ```
pub fn score(
    signals: &RawSignals,
    format: &CompiledFormat,
    registry: &FormatRegistry,
) -> EvidenceMetrics {
    let matches = Matches::find(format, signals);
    EvidenceMetrics::new(
        completeness(format, signals, &matches),
        quality(format, signals, registry, &matches),
        uniqueness(&matches),
    )
}

fn completeness(format: &CompiledFormat, signals: &RawSignals, matches: &Matches<'_>) -> f64 {
    let total_fields = format.fields().len();
    let depth = format.spec().depth;

    let (mut expected, mut present, mut in_range) = (0usize, 0usize, 0usize);
    for field in format.expected_fields() {
        expected += 1;
        if let Some(stats) = signals.key(&field.normalized) {
            present += 1;
            if depth.overlaps(stats.min_depth, stats.max_depth) {
                in_range += 1;
            }
        }
    }
    if expected == 0 || total_fields == 0 {
        return 0.0;
    }

    let expected = expected as f64;
    PRESENCE_WEIGHT * present as f64 / expected
        + DEPTH_WEIGHT * in_range as f64 / expected
        + BREADTH_WEIGHT * matches.fields.len() as f64 / total_fields as f64
}

fn quality(
    format: &CompiledFormat,
    signals: &RawSignals,
    registry: &FormatRegistry,
    matches: &Matches<'_>,
) -> f64 {
    let (mut total, mut counted) = (0.0, 0usize);
    for key in signals.keys.keys() {
        match registry.exclusive_owner(key) {
            Some(owner) if owner != format.id() => {}
            _ => {
                total += best_similarity(key, format.vocabulary());
                counted += 1;
            }
        }
    }
    let relevance = if counted == 0 {
        0.0
    } else {
        total / counted as f64
    };

    // Fixed denominator: more matching evidence never lowers the score.
    let capacity = format.declared_kinds() as f64 + format.total_pattern_weight();
    let shape = if capacity > 0.0 {
        let kinds_ok = matches
            .fields
            .iter()
            .filter(|(field, stats)| field.kind.is_some_and(|kind| stats.has_kind(kind)))
            .count();
        (kinds_ok as f64 + matches.pattern_weight()) / capacity
    } else {
        0.0
    };

    RELEVANCE_WEIGHT * relevance + SHAPE_WEIGHT * shape
}

fn uniqueness(matches: &Matches<'_>) -> f64 {
    let value_diversity = if matches.fields.is_empty() {
        0.0
    } else {
        let exclusive = matches.fields.iter().filter(|(f, _)| f.exclusive).count();
        exclusive as f64 / matches.fields.len() as f64
    };

    let matched_weight = matches.pattern_weight();
    let pattern_uniqueness = if matched_weight > 0.0 {
        let unshared: f64 = matches
            .patterns
            .iter()
            .filter(|p| !p.shared)
            .map(|p| p.weight)
            .sum();
        unshared / matched_weight
    } else {
        0.0
    };

    DIVERSITY_WEIGHT * value_diversity + PATTERN_UNIQUENESS_WEIGHT * pattern_uniqueness
}
