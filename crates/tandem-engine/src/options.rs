//! Engine configuration (`tandem.toml`)
//!
//! ```toml
//! gc_threshold = 5000
//! exception_strategy = "report"
//! typed_arrays = true
//! max_conversion_depth = 64
//! max_call_depth = 512
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::defaults::{DEFAULT_GC_THRESHOLD, DEFAULT_MAX_CALL_DEPTH, DEFAULT_MAX_CONVERSION_DEPTH};

/// Errors that can occur while loading options
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the options file
    #[error("Failed to read options file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse options: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Failed to serialize TOML
    #[error("Failed to serialize options: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// Validation error
    #[error("Invalid options: {0}")]
    ValidationError(String),
}

/// What happens to a script exception that reaches native code
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExceptionStrategy {
    /// Return it to the native caller as an error
    #[default]
    Rethrow,
    /// Hand it to the process-wide reporter and return an empty value
    Report,
}

/// Engine and bridge options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeOptions {
    /// Allocations that trigger a collection when the outermost scoped
    /// region closes
    pub gc_threshold: usize,

    /// Script exception handling at the native boundary
    pub exception_strategy: ExceptionStrategy,

    /// Convert byte buffers to and from `ArrayBuffer`
    pub typed_arrays: bool,

    /// Recursion bound of the value conversion engine
    pub max_conversion_depth: usize,

    /// Nested call depth before a `RangeError`
    pub max_call_depth: usize,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            gc_threshold: DEFAULT_GC_THRESHOLD,
            exception_strategy: ExceptionStrategy::Rethrow,
            typed_arrays: true,
            max_conversion_depth: DEFAULT_MAX_CONVERSION_DEPTH,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

impl BridgeOptions {
    /// Parse options from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let options: BridgeOptions = toml::from_str(content)?;
        options.validate()?;
        Ok(options)
    }

    /// Parse options from a file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Serialize to TOML
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string(self)?)
    }

    /// Validate the options
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_conversion_depth == 0 {
            return Err(ConfigError::ValidationError(
                "max_conversion_depth must be at least 1".to_string(),
            ));
        }
        if self.max_call_depth == 0 {
            return Err(ConfigError::ValidationError(
                "max_call_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = BridgeOptions::default();
        assert_eq!(options.exception_strategy, ExceptionStrategy::Rethrow);
        assert!(options.typed_arrays);
        assert_eq!(options.max_conversion_depth, 64);
    }

    #[test]
    fn test_parse_partial() {
        let options = BridgeOptions::from_toml_str(
            r#"
            exception_strategy = "report"
            max_call_depth = 32
            "#,
        )
        .unwrap();
        assert_eq!(options.exception_strategy, ExceptionStrategy::Report);
        assert_eq!(options.max_call_depth, 32);
        assert_eq!(options.gc_threshold, DEFAULT_GC_THRESHOLD);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            BridgeOptions::from_toml_str("exception_strategy = \"ignore\""),
            Err(ConfigError::ParseError(_))
        ));
        assert!(matches!(
            BridgeOptions::from_toml_str("max_call_depth = 0"),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_toml_roundtrip() {
        let options = BridgeOptions {
            typed_arrays: false,
            ..BridgeOptions::default()
        };
        let text = options.to_toml_string().unwrap();
        assert_eq!(BridgeOptions::from_toml_str(&text).unwrap(), options);
    }
}
