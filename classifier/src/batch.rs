//! Parallel batch classification over JSON files.

use std::collections::BTreeSet;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde_json::Value;
use testfmt_core::{ClassificationResult, ClassifyError, Result};
use tracing::{debug, info};

use crate::Classifier;
use crate::cache::ResultCache;
use crate::report::{BatchFailure, BatchReport, ClassificationReport, FailureCode};

/// Typed error for batch file operations.
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    /// Filesystem I/O failure while collecting inputs.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or missing input (e.g. non-existent path, wrong extension).
    #[error("{0}")]
    InvalidInput(String),

    /// The worker pool could not be started.
    #[error("thread pool error: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// Batch run settings.
#[derive(Default, Clone, Copy)]
pub struct BatchOptions<'a> {
    /// Number of parallel jobs (`None` = adaptive default).
    pub jobs: Option<usize>,
    /// Read-through cache shared by all workers.
    pub cache: Option<&'a dyn ResultCache>,
}

impl std::fmt::Debug for BatchOptions<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchOptions")
            .field("jobs", &self.jobs)
            .field("cache", &self.cache.is_some())
            .finish()
    }
}

/// Collects JSON document paths from input files and/or directories.
///
/// Directories are scanned one level deep for `*.json` files. The result is
/// sorted and deduplicated.
///
/// # Errors
///
/// Returns [`BatchError::InvalidInput`] when no inputs are given, a file does
/// not end in `.json`, a path does not exist, or nothing was found.
pub fn collect_document_paths(
    inputs: &[PathBuf],
) -> std::result::Result<Vec<PathBuf>, BatchError> {
    if inputs.is_empty() {
        return Err(BatchError::InvalidInput(
            "No document paths were provided".to_string(),
        ));
    }

    let mut paths = BTreeSet::new();

    for input in inputs {
        if input.is_dir() {
            for entry in fs::read_dir(input)? {
                let path = entry?.path();
                if path.is_file() && path.extension() == Some(OsStr::new("json")) {
                    paths.insert(path);
                }
            }
            continue;
        }

        if input.is_file() {
            if input.extension() != Some(OsStr::new("json")) {
                return Err(BatchError::InvalidInput(format!(
                    "Document '{}' must end in .json",
                    input.display()
                )));
            }
            paths.insert(input.clone());
            continue;
        }

        return Err(BatchError::InvalidInput(format!(
            "Document path '{}' does not exist",
            input.display(),
        )));
    }

    if paths.is_empty() {
        return Err(BatchError::InvalidInput(
            "No JSON documents found in provided paths".to_string(),
        ));
    }

    Ok(paths.into_iter().collect())
}

/// Classifies every file in `paths` on a dedicated worker pool.
///
/// Per-file read, parse and size failures are recorded in the report rather
/// than aborting the run. Reports are ordered by path.
///
/// # Errors
///
/// Returns [`BatchError::Pool`] if the worker pool cannot be built.
pub fn classify_batch(
    classifier: &Classifier,
    paths: &[PathBuf],
    options: BatchOptions<'_>,
) -> std::result::Result<BatchReport, BatchError> {
    let jobs = options
        .jobs
        .filter(|jobs| *jobs > 0)
        .unwrap_or_else(|| default_parallel_jobs(paths.len()));
    let pool = rayon::ThreadPoolBuilder::new().num_threads(jobs).build()?;
    debug!(jobs, documents = paths.len(), "starting batch");

    let mut outcomes: Vec<(&PathBuf, Result<ClassificationResult>)> = pool.install(|| {
        paths
            .par_iter()
            .map(|path| (path, classify_file(classifier, path, options.cache)))
            .collect()
    });
    outcomes.sort_by(|(a, _), (b, _)| a.cmp(b));

    let mut reports = Vec::new();
    let mut failures = Vec::new();
    for (path, outcome) in outcomes {
        let source = path.display().to_string();
        match outcome {
            Ok(result) => {
                reports.push(ClassificationReport::new(source, &result, classifier.registry()));
            }
            Err(err) => {
                debug!(%source, %err, "document failed");
                failures.push(BatchFailure {
                    source,
                    code: FailureCode::from(err.kind()),
                    detail: err.to_string(),
                });
            }
        }
    }

    let batch = BatchReport::new(classifier.registry(), reports, failures);
    info!(
        total = batch.total,
        classified = batch.classified,
        rejected = batch.rejected,
        failed = batch.failures.len(),
        "batch complete"
    );
    Ok(batch)
}

/// Reads, parses and classifies one file.
///
/// # Errors
///
/// Returns [`ClassifyError::Io`], [`ClassifyError::Json`] or
/// [`ClassifyError::InputTooLarge`].
pub fn classify_file(
    classifier: &Classifier,
    path: &Path,
    cache: Option<&dyn ResultCache>,
) -> Result<ClassificationResult> {
    let bytes = fs::read(path)?;
    match cache {
        None => classifier.classify_slice(&bytes),
        Some(cache) => {
            let max = classifier.config().limits.max_bytes;
            if bytes.len() > max {
                return Err(ClassifyError::InputTooLarge {
                    limit: "bytes",
                    observed: bytes.len(),
                    max,
                });
            }
            let document: Value = serde_json::from_slice(&bytes)?;
            classifier.classify_cached(&document, cache)
        }
    }
}

fn default_parallel_jobs(document_count: usize) -> usize {
    let cpu_count = std::thread::available_parallelism()
        .map(|parallelism| parallelism.get())
        .unwrap_or(4);
    cpu_count.max(1).min(document_count.max(1))
}
