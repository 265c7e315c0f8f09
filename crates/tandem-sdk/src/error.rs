//! Error types for the native object model

use std::any::Any;

/// An exception raised by native code.
///
/// Method and closure bodies return this on their `Err` side. The bridge
/// catches it at the dispatch boundary and re-throws it into the script as an
/// error object, so it never unwinds through VM frames.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{name}: {reason}")]
pub struct NativeException {
    /// Exception name (e.g. `RangeException`)
    pub name: String,
    /// Human readable reason
    pub reason: String,
}

impl NativeException {
    /// Create a new exception
    pub fn new(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create an exception for an argument that has the wrong shape
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::new("InvalidArgumentException", reason)
    }

    /// Create an exception for an out of range index or value
    pub fn range(reason: impl Into<String>) -> Self {
        Self::new("RangeException", reason)
    }

    /// Build an exception from a caught panic payload
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let reason = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "native code panicked".to_string()
        };
        Self::new("Panic", reason)
    }
}

/// Errors raised while declaring protocols, classes and closures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeclarationError {
    /// A rename that cannot be applied to its selector
    #[error("Invalid rename '{property}' for selector '{selector}': {reason}")]
    InvalidRename {
        /// Script-visible name requested
        property: String,
        /// Selector being renamed
        selector: String,
        /// Why the rename was rejected
        reason: String,
    },

    /// Malformed type encoding string
    #[error("Invalid type encoding '{encoding}': {reason}")]
    InvalidEncoding {
        /// The offending encoding
        encoding: String,
        /// Parser message
        reason: String,
    },

    /// Selector arity disagrees with its encoded argument list
    #[error("Selector '{selector}' takes {declared} arguments but its encoding lists {encoded}")]
    ArityMismatch {
        /// Selector name
        selector: String,
        /// Arity implied by the selector
        declared: usize,
        /// Arity implied by the encoding
        encoded: usize,
    },
}
