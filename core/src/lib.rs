//! Core types for test-export format classification.
//!
//! This crate defines the vocabulary shared by the registry, the classifier
//! and the CLI:
//!
//! - [`Hypothesis`]: opaque identifier of a candidate source format.
//! - [`FormatSpec`]: declarative description of one format (fields,
//!   aliases, content patterns, depth range, prior).
//! - [`EvidenceMetrics`]: the bounded completeness/quality/uniqueness triple
//!   computed for each hypothesis.
//! - [`ClassificationResult`]: outcome of one classification call.
//! - [`ClassifierConfig`]: every tunable constant, validated up front.
//! - [`ClassifyError`]: the error type returned by fallible operations.
//!
//! Validation ([`validate_specs`]) catches structural problems in format specs
//! such as duplicate identifiers and inverted depth ranges.
//!
//! # Example
//!
//! ```
//! use testfmt_core::*;
//!
//! let spec = FormatSpec::new("TESTRAIL", "TestRail")
//!     .with_required(FieldRule::typed("suite_id", ValueKind::Number))
//!     .with_optional(FieldRule::named("custom_steps_separated"));
//!
//! assert!(validate_specs(&[spec]).is_empty());
//! assert!(ClassifierConfig::default().validate().is_ok());
//! ```

mod config;
mod error;
mod types;
mod validate;

pub use config::{ClassifierConfig, FastPathPolicy, SizeLimits};
pub use error::{ClassifyError, ErrorKind, Result};
pub use types::*;
pub use validate::{SpecError, validate_spec, validate_specs};
