//! Two-stage Bayesian classification of test-management exports.
//!
//! Given a parsed JSON document, the classifier first decides whether it is
//! test data at all (the gate), then scores every hypothesis in a
//! [`FormatRegistry`] and returns a normalized posterior distribution with a
//! calibrated winner.
//!
//! # Main entry points
//!
//! - [`classify`]: one-shot classification with explicit registry and config.
//! - [`Classifier`]: a validated registry and config, shareable across threads.
//! - [`batch::classify_batch`]: parallel classification of JSON files.
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use testfmt_classifier::Classifier;
//!
//! let classifier = Classifier::builtin().unwrap();
//!
//! let invoice = json!({"invoice": {"total": 120, "currency": "EUR"}});
//! let result = classifier.classify(&invoice).unwrap();
//! assert!(!result.gate_passed);
//! assert!(result.posterior_distribution.is_empty());
//!
//! let export = json!({"xrayInfo": {}, "testExecutions": []});
//! let result = classifier.classify(&export).unwrap();
//! assert_eq!(result.winning_hypothesis.unwrap().as_str(), "JIRA_XRAY");
//! ```
//!
//! [`FormatRegistry`]: testfmt_registry::FormatRegistry

pub mod batch;
pub mod cache;
pub mod calibration;
mod classifier;
pub mod evidence;
pub mod gate;
pub mod likelihood;
pub mod metrics;
pub mod output;
pub mod posterior;
pub mod report;

pub use classifier::{Classifier, classify};
