//! Classification result cache with fingerprint-based invalidation.
//!
//! The classifier core never caches on its own; [`Classifier::classify_cached`]
//! consults a caller-owned [`ResultCache`] keyed on the document content, the
//! registry fingerprint and every tunable that can change a result.
//!
//! [`Classifier::classify_cached`]: crate::Classifier::classify_cached

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use testfmt_core::{ClassificationResult, ClassifierConfig, Result};
use testfmt_registry::FormatRegistry;
use tracing::warn;

/// Everything a cached result depends on.
///
/// Floating-point tunables are stored as their IEEE-754 bit patterns, so two
/// configs share a key only when every tunable is identical.
#[derive(Debug, Clone, Serialize, Deserialize, Hash, PartialEq, Eq)]
pub struct CacheKey {
    /// Hex SHA-256 of the canonical JSON of the document.
    pub document_sha256: String,
    pub registry_fingerprint: String,
    pub gate_threshold_bits: u64,
    pub test_data_prior_bits: u64,
    pub ratio_cap_low_bits: u64,
    pub ratio_cap_high_bits: u64,
    pub ratio_cap_breakpoint_bits: u64,
    pub likelihood_cap_bits: u64,
    pub alt_likelihood_floor_bits: u64,
    pub alt_likelihood_span_bits: u64,
    pub numerical_epsilon_bits: u64,
    pub fast_paths_enabled: bool,
    pub unique_indicator_min: usize,
    pub high_confidence_skip_bits: u64,
    pub max_bytes: usize,
    pub max_nodes: usize,
    pub max_text_bytes: usize,
}

impl CacheKey {
    /// Builds the key for classifying `document` under `registry` and
    /// `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Json`](testfmt_core::ClassifyError::Json) if the document
    /// cannot be serialized.
    pub fn new(
        document: &Value,
        registry: &FormatRegistry,
        config: &ClassifierConfig,
    ) -> Result<Self> {
        let canonical = serde_json::to_vec(document)?;
        Ok(Self {
            document_sha256: format!("{:x}", Sha256::digest(&canonical)),
            registry_fingerprint: registry.fingerprint().to_string(),
            gate_threshold_bits: config.gate_threshold.to_bits(),
            test_data_prior_bits: config.test_data_prior.to_bits(),
            ratio_cap_low_bits: config.ratio_cap_low.to_bits(),
            ratio_cap_high_bits: config.ratio_cap_high.to_bits(),
            ratio_cap_breakpoint_bits: config.ratio_cap_breakpoint.to_bits(),
            likelihood_cap_bits: config.likelihood_cap.to_bits(),
            alt_likelihood_floor_bits: config.alt_likelihood_floor.to_bits(),
            alt_likelihood_span_bits: config.alt_likelihood_span.to_bits(),
            numerical_epsilon_bits: config.numerical_epsilon.to_bits(),
            fast_paths_enabled: config.fast_paths.enabled,
            unique_indicator_min: config.fast_paths.unique_indicator_min,
            high_confidence_skip_bits: config.fast_paths.high_confidence_skip.to_bits(),
            max_bytes: config.limits.max_bytes,
            max_nodes: config.limits.max_nodes,
            max_text_bytes: config.limits.max_text_bytes,
        })
    }

    /// Content fingerprint of the whole key.
    ///
    /// # Errors
    ///
    /// Returns [`Json`](testfmt_core::ClassifyError::Json) if the key cannot
    /// be serialized.
    pub fn fingerprint(&self) -> Result<DocumentFingerprint> {
        let canonical = serde_json::to_vec(self)?;
        Ok(DocumentFingerprint(format!(
            "{:x}",
            Sha256::digest(&canonical)
        )))
    }
}

/// Hex SHA-256 identifying one cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentFingerprint(String);

impl DocumentFingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Get/put contract for a shared result cache.
///
/// Implementations synchronize internally; the classifier calls them from
/// any thread.
pub trait ResultCache: Send + Sync {
    /// Returns the cached result for `key`, if present and still valid.
    fn get(&self, key: &CacheKey) -> Option<ClassificationResult>;

    /// Stores a result. Failures are the implementation's concern and never
    /// surface to the caller.
    fn put(&self, key: &CacheKey, result: &ClassificationResult);
}

/// In-process cache behind a mutex.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<CacheKey, ClassificationResult>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResultCache for MemoryCache {
    fn get(&self, key: &CacheKey) -> Option<ClassificationResult> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    fn put(&self, key: &CacheKey, result: &ClassificationResult) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.clone(), result.clone());
        }
    }
}

/// Cached classification result as stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub result: ClassificationResult,
    pub cached_at: String,
}

/// File-backed cache: one JSON file per fingerprint.
#[derive(Debug, Clone)]
pub struct FileCache {
    cache_dir: PathBuf,
}

impl FileCache {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    /// Default cache directory (`~/.cache/testfmt/`).
    pub fn default_dir() -> PathBuf {
        dirs_cache_dir().join("testfmt")
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn entry_path(&self, key: &CacheKey) -> Option<PathBuf> {
        let fingerprint = key.fingerprint().ok()?;
        Some(self.cache_dir.join(format!("{fingerprint}.json")))
    }
}

impl ResultCache for FileCache {
    /// Returns `Some` only if the stored key matches `key` exactly.
    fn get(&self, key: &CacheKey) -> Option<ClassificationResult> {
        let path = self.entry_path(key)?;
        let raw = fs::read_to_string(&path).ok()?;
        let entry: CacheEntry = serde_json::from_str(&raw).ok()?;
        if entry.key == *key {
            Some(entry.result)
        } else {
            None
        }
    }

    fn put(&self, key: &CacheKey, result: &ClassificationResult) {
        if let Err(err) = fs::create_dir_all(&self.cache_dir) {
            warn!(dir = %self.cache_dir.display(), %err, "cannot create cache directory");
            return;
        }
        let Some(path) = self.entry_path(key) else {
            return;
        };

        let entry = CacheEntry {
            key: key.clone(),
            result: result.clone(),
            cached_at: chrono::Utc::now().to_rfc3339(),
        };
        match serde_json::to_string_pretty(&entry) {
            Ok(json) => {
                if let Err(err) = fs::write(&path, json) {
                    warn!(path = %path.display(), %err, "cache write failed");
                }
            }
            Err(err) => warn!(%err, "cache entry serialization failed"),
        }
    }
}

fn dirs_cache_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CACHE_HOME") {
        return PathBuf::from(xdg);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".cache");
    }
    std::env::temp_dir()
}
