//! Format registry for test-export classification.
//!
//! This crate loads [`FormatSpec`](testfmt_core::FormatSpec)s from the
//! embedded built-in bundle, YAML/JSON files or directories, and compiles
//! them into an immutable [`FormatRegistry`]: normalized field names,
//! compiled detection patterns, cross-hypothesis exclusivity, shared
//! vocabulary and normalized priors.
//!
//! # Quick start
//!
//! ```no_run
//! use testfmt_registry::{CalibrationProfile, FormatRegistry};
//!
//! // Built-in formats only
//! let registry = FormatRegistry::builtin().unwrap();
//! println!("{} formats", registry.len());
//!
//! // Layer local specs over the built-ins
//! let registry = FormatRegistry::builder()
//!     .with_builtin()
//!     .from_dir("formats.d/")
//!     .build()
//!     .unwrap();
//!
//! // Recalibrate priors and tunables
//! let profile = CalibrationProfile::load("calibration.yaml").unwrap();
//! let (registry, config) = profile.apply(&registry).unwrap();
//! ```

mod builtin;
mod calibration;
mod loader;
mod registry;

pub use builtin::{builtin_files, builtin_specs};
pub use calibration::CalibrationProfile;
pub use loader::{RegistryBuilder, RegistrySource, load_specs_from_dir, load_specs_from_file};
pub use registry::{
    CompiledField, CompiledFormat, CompiledPattern, FormatRegistry, TEST_TOKENS,
    is_test_token_key,
};
