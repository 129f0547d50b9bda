//! Error types for classification, registry and configuration failures.
//!
//! Every failure mode the classifier reports is a local, recoverable
//! condition. Degenerate-but-valid inputs (empty documents, underflowing
//! normalization) are not errors and never reach this type.

use thiserror::Error;

/// Broad category of a [`ClassifyError`], for callers that branch on kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Document exceeds the configured size or node-count ceiling.
    InputTooLarge,
    /// A configuration value is out of range.
    InvalidConfig,
    /// The format registry is empty or contains an invalid spec.
    InvalidRegistry,
    /// File I/O failure while loading inputs.
    Io,
    /// JSON or YAML input could not be parsed.
    Parse,
}

/// Errors that can occur while configuring or running classification.
#[derive(Debug, Error)]
pub enum ClassifyError {
    /// Document rejected by the size guard before extraction.
    #[error("input too large: {limit} exceeded ({observed} > {max})")]
    InputTooLarge {
        /// Which ceiling was crossed (`"bytes"` or `"nodes"`).
        limit: &'static str,
        observed: usize,
        max: usize,
    },

    /// Configuration value outside its allowed range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Registry cannot be used for classification.
    #[error("invalid registry: {0}")]
    InvalidRegistry(String),

    /// File I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing or serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing or serialization failure.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl ClassifyError {
    /// Returns the error category.
    ///
    /// # Examples
    ///
    /// ```
    /// use testfmt_core::{ClassifyError, ErrorKind};
    ///
    /// let err = ClassifyError::InvalidConfig("gate_threshold".into());
    /// assert_eq!(err.kind(), ErrorKind::InvalidConfig);
    /// ```
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InputTooLarge { .. } => ErrorKind::InputTooLarge,
            Self::InvalidConfig(_) => ErrorKind::InvalidConfig,
            Self::InvalidRegistry(_) => ErrorKind::InvalidRegistry,
            Self::Io(_) => ErrorKind::Io,
            Self::Json(_) | Self::Yaml(_) => ErrorKind::Parse,
        }
    }
}

/// Convenience alias for results with [`ClassifyError`].
pub type Result<T> = std::result::Result<T, ClassifyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_too_large_message() {
        let err = ClassifyError::InputTooLarge {
            limit: "nodes",
            observed: 11,
            max: 10,
        };
        assert_eq!(err.kind(), ErrorKind::InputTooLarge);
        assert_eq!(err.to_string(), "input too large: nodes exceeded (11 > 10)");
    }

    #[test]
    fn test_parse_errors_share_kind() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert_eq!(ClassifyError::from(json_err).kind(), ErrorKind::Parse);

        let yaml_err = serde_yaml::from_str::<Vec<u8>>("[1, 2").unwrap_err();
        assert_eq!(ClassifyError::from(yaml_err).kind(), ErrorKind::Parse);
    }
}
