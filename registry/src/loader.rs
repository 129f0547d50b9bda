//! Loading format specs from files and directories.
//!
//! Spec files are YAML (`.yaml`, `.yml`) or JSON (`.json`) and hold either a
//! single [`FormatSpec`] or a list of them. [`RegistryBuilder`] layers
//! sources on top of each other; a later spec replaces an earlier one with the
//! same id.
//!
//! ```no_run
//! use testfmt_registry::FormatRegistry;
//!
//! let registry = FormatRegistry::builder()
//!     .with_builtin()
//!     .from_dir("formats.d/")
//!     .from_file("overrides.yaml")
//!     .build()
//!     .unwrap();
//! println!("{} formats", registry.len());
//! ```

use std::collections::BTreeMap;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use testfmt_core::{ClassifyError, FormatSpec, Hypothesis, Result};
use tracing::debug;

use crate::registry::FormatRegistry;

/// Where specs are loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrySource {
    /// The embedded built-in specs.
    Builtin,
    /// A single YAML or JSON spec file.
    File(PathBuf),
    /// Every spec file directly inside a directory.
    Directory(PathBuf),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SpecFile {
    Many(Vec<FormatSpec>),
    One(Box<FormatSpec>),
}

impl SpecFile {
    fn into_vec(self) -> Vec<FormatSpec> {
        match self {
            Self::Many(specs) => specs,
            Self::One(spec) => vec![*spec],
        }
    }
}

fn is_spec_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml" | "yml" | "json")
    )
}

/// Loads the specs of one YAML or JSON file.
///
/// # Errors
///
/// Returns [`ClassifyError::Io`] if the file cannot be read, a parse error if
/// its content is not a spec or list of specs, or
/// [`ClassifyError::InvalidRegistry`] for an unsupported extension.
pub fn load_specs_from_file(path: impl AsRef<Path>) -> Result<Vec<FormatSpec>> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)?;
    let reader = BufReader::new(file);
    let parsed: SpecFile = match path.extension().and_then(|e| e.to_str()) {
        Some("yaml" | "yml") => serde_yaml::from_reader(reader)?,
        Some("json") => serde_json::from_reader(reader)?,
        _ => {
            return Err(ClassifyError::InvalidRegistry(format!(
                "unsupported spec file extension: {}",
                path.display()
            )));
        }
    };
    Ok(parsed.into_vec())
}

/// Loads every spec file directly inside `dir`, in path order.
///
/// # Errors
///
/// Returns the first read or parse error encountered.
pub fn load_specs_from_dir(dir: impl AsRef<Path>) -> Result<Vec<FormatSpec>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir.as_ref())? {
        let path = entry?.path();
        if path.is_file() && is_spec_file(&path) {
            paths.push(path);
        }
    }
    paths.sort();

    let mut specs = Vec::new();
    for path in paths {
        specs.extend(load_specs_from_file(&path)?);
    }
    Ok(specs)
}

/// Builder that layers spec sources into a [`FormatRegistry`].
///
/// Sources are applied in the order they are added. Unlike a fallback chain,
/// every source must load; the first failure aborts the build.
pub struct RegistryBuilder {
    sources: Vec<RegistrySource>,
}

impl RegistryBuilder {
    /// Creates a builder with no sources.
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
        }
    }

    /// Adds the embedded built-in specs.
    pub fn with_builtin(mut self) -> Self {
        self.sources.push(RegistrySource::Builtin);
        self
    }

    /// Adds a YAML or JSON spec file.
    pub fn from_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.sources.push(RegistrySource::File(path.into()));
        self
    }

    /// Adds a directory of spec files.
    pub fn from_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.sources.push(RegistrySource::Directory(path.into()));
        self
    }

    /// Adds a file or directory, whichever `path` is.
    pub fn from_path(self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if path.is_dir() {
            self.from_dir(path)
        } else {
            self.from_file(path)
        }
    }

    /// Configured sources, in layering order.
    pub fn sources(&self) -> &[RegistrySource] {
        &self.sources
    }

    /// Loads every source and compiles the merged spec set.
    ///
    /// # Errors
    ///
    /// Returns [`ClassifyError::InvalidRegistry`] if no source was added or
    /// the merged set is invalid, and any load error of a source.
    pub fn build(self) -> Result<FormatRegistry> {
        if self.sources.is_empty() {
            return Err(ClassifyError::InvalidRegistry(
                "no registry sources configured".to_string(),
            ));
        }

        let mut merged: BTreeMap<Hypothesis, FormatSpec> = BTreeMap::new();
        for source in &self.sources {
            let specs = match source {
                RegistrySource::Builtin => crate::builtin::builtin_specs()?,
                RegistrySource::File(path) => load_specs_from_file(path)?,
                RegistrySource::Directory(path) => load_specs_from_dir(path)?,
            };
            debug!(?source, specs = specs.len(), "loaded registry source");
            for spec in specs {
                if merged.contains_key(&spec.id) {
                    debug!(id = %spec.id, ?source, "spec replaced by later source");
                }
                merged.insert(spec.id.clone(), spec);
            }
        }

        FormatRegistry::from_specs(merged.into_values().collect())
    }
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}
