//! Hypothesis-agnostic signal gathering.
//!
//! [`RawSignals::extract`] walks a JSON document once and records which keys
//! are present (normalized and exact), at which depths and with which value
//! kinds, a histogram of value kinds, and the concatenated string content
//! used for pattern matching. No format-specific logic lives here.
//!
//! Depth convention: the root value is depth 0, keys of the root object are
//! depth 1, and arrays do not add depth (elements inherit the depth of the
//! array).

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use testfmt_core::{ClassifyError, Result, SizeLimits, ValueKind, normalize_field_name};

/// Occurrence statistics for one normalized key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct KeyStats {
    pub count: usize,
    pub min_depth: usize,
    pub max_depth: usize,
    kinds: u8,
}

impl KeyStats {
    fn new(depth: usize, kind: ValueKind) -> Self {
        Self {
            count: 1,
            min_depth: depth,
            max_depth: depth,
            kinds: kind.bit(),
        }
    }

    fn record(&mut self, depth: usize, kind: ValueKind) {
        self.count += 1;
        self.min_depth = self.min_depth.min(depth);
        self.max_depth = self.max_depth.max(depth);
        self.kinds |= kind.bit();
    }

    /// Returns `true` if the key was seen with a value of `kind`.
    pub fn has_kind(&self, kind: ValueKind) -> bool {
        self.kinds & kind.bit() != 0
    }
}

/// Count of values by kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TypeHistogram {
    pub objects: usize,
    pub arrays: usize,
    pub strings: usize,
    pub numbers: usize,
    pub bools: usize,
    pub nulls: usize,
}

impl TypeHistogram {
    fn record(&mut self, kind: ValueKind) {
        match kind {
            ValueKind::Object => self.objects += 1,
            ValueKind::Array => self.arrays += 1,
            ValueKind::String => self.strings += 1,
            ValueKind::Number => self.numbers += 1,
            ValueKind::Bool => self.bools += 1,
            ValueKind::Null => self.nulls += 1,
        }
    }

    /// Scalar (leaf) values.
    pub fn leaves(&self) -> usize {
        self.strings + self.numbers + self.bools + self.nulls
    }

    pub fn total(&self) -> usize {
        self.objects + self.arrays + self.leaves()
    }
}

/// Structural and textual signals of one document.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RawSignals {
    /// Statistics by normalized key.
    pub keys: BTreeMap<String, KeyStats>,
    /// Occurrences by key exactly as written.
    pub exact_keys: BTreeMap<String, usize>,
    /// Deepest key depth seen (0 when the document has no keys).
    pub max_depth: usize,
    pub node_count: usize,
    pub histogram: TypeHistogram,
    /// String values joined by `\n`, capped at the configured text limit.
    pub text: String,
    pub text_truncated: bool,
}

impl RawSignals {
    /// Extracts signals from `document` after checking it against `limits`.
    ///
    /// # Errors
    ///
    /// Returns [`ClassifyError::InputTooLarge`] if the document crosses the
    /// node or byte ceiling. Nothing is extracted in that case.
    ///
    /// # Examples
    ///
    /// ```
    /// use serde_json::json;
    /// use testfmt_classifier::evidence::RawSignals;
    /// use testfmt_core::SizeLimits;
    ///
    /// let doc = json!({"testKey": "CALC-1", "variants": [{"test_key": "CALC-2"}]});
    /// let signals = RawSignals::extract(&doc, &SizeLimits::default()).unwrap();
    ///
    /// let stats = signals.key("testkey").unwrap();
    /// assert_eq!(stats.count, 2);
    /// assert_eq!((stats.min_depth, stats.max_depth), (1, 2));
    /// assert_eq!(signals.text, "CALC-1\nCALC-2");
    /// ```
    pub fn extract(document: &Value, limits: &SizeLimits) -> Result<Self> {
        check_size(document, limits)?;

        let mut signals = Self::default();
        let mut stack: Vec<(&Value, usize)> = vec![(document, 0)];

        while let Some((value, depth)) = stack.pop() {
            signals.node_count += 1;
            signals.histogram.record(ValueKind::of(value));
            match value {
                Value::Object(map) => {
                    let key_depth = depth + 1;
                    for (key, child) in map {
                        signals.record_key(key, key_depth, ValueKind::of(child));
                    }
                    // Reverse so children are visited in map order.
                    for child in map.values().rev() {
                        stack.push((child, key_depth));
                    }
                }
                Value::Array(items) => {
                    for item in items.iter().rev() {
                        stack.push((item, depth));
                    }
                }
                Value::String(s) => signals.push_text(s, limits.max_text_bytes),
                Value::Number(_) | Value::Bool(_) | Value::Null => {}
            }
        }

        Ok(signals)
    }

    fn record_key(&mut self, key: &str, depth: usize, kind: ValueKind) {
        *self.exact_keys.entry(key.to_string()).or_default() += 1;
        self.max_depth = self.max_depth.max(depth);

        let normalized = normalize_field_name(key);
        if normalized.is_empty() {
            return;
        }
        self.keys
            .entry(normalized)
            .and_modify(|stats| stats.record(depth, kind))
            .or_insert_with(|| KeyStats::new(depth, kind));
    }

    fn push_text(&mut self, s: &str, max_bytes: usize) {
        if self.text_truncated {
            return;
        }
        let separator = usize::from(!self.text.is_empty());
        let room = max_bytes.saturating_sub(self.text.len() + separator);
        if room == 0 {
            self.text_truncated = !s.is_empty();
            return;
        }
        if separator == 1 {
            self.text.push('\n');
        }
        if s.len() <= room {
            self.text.push_str(s);
        } else {
            let mut end = room;
            while !s.is_char_boundary(end) {
                end -= 1;
            }
            self.text.push_str(&s[..end]);
            self.text_truncated = true;
        }
    }

    /// Statistics for a normalized key.
    pub fn key(&self, normalized: &str) -> Option<&KeyStats> {
        self.keys.get(normalized)
    }

    pub fn has_key(&self, normalized: &str) -> bool {
        self.keys.contains_key(normalized)
    }

    /// Distinct normalized keys.
    pub fn distinct_keys(&self) -> usize {
        self.keys.len()
    }

    /// `true` when the document has no keys at all (empty object, array of
    /// scalars, bare scalar).
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Bounded pre-pass that rejects oversized documents.
///
/// Counts nodes and an estimate of the serialized size, stopping as soon as
/// either ceiling is crossed.
///
/// # Errors
///
/// Returns [`ClassifyError::InputTooLarge`] naming the crossed ceiling.
pub fn check_size(document: &Value, limits: &SizeLimits) -> Result<()> {
    let mut nodes = 0usize;
    let mut bytes = 0usize;
    let mut stack = vec![document];

    while let Some(value) = stack.pop() {
        nodes += 1;
        if nodes > limits.max_nodes {
            return Err(ClassifyError::InputTooLarge {
                limit: "nodes",
                observed: nodes,
                max: limits.max_nodes,
            });
        }
        bytes += match value {
            Value::Object(map) => {
                stack.extend(map.values());
                2 + map.keys().map(|k| k.len() + 4).sum::<usize>()
            }
            Value::Array(items) => {
                stack.extend(items.iter());
                2 + items.len()
            }
            Value::String(s) => s.len() + 2,
            Value::Number(_) => 8,
            Value::Bool(_) => 5,
            Value::Null => 4,
        };
        if bytes > limits.max_bytes {
            return Err(ClassifyError::InputTooLarge {
                limit: "bytes",
                observed: bytes,
                max: limits.max_bytes,
            });
        }
    }

    Ok(())
}
