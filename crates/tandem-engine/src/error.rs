//! Error types for the engine and the bridge

use tandem_sdk::{DeclarationError, NativeException};
use thiserror::Error;

use crate::bridge::BridgeException;
use crate::options::ConfigError;

/// A value could not be converted across the boundary
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionError {
    /// A collection was expected but the value is a primitive
    #[error("Cannot convert {found} to {target}")]
    NotAnObject {
        /// Requested native kind
        target: &'static str,
        /// Kind of the script value
        found: String,
    },

    /// Nested values deeper than the configured limit
    #[error("Maximum conversion depth of {0} exceeded")]
    DepthExceeded(usize),

    /// An array-like object reports more elements than an array may hold
    #[error("Array length {length} exceeds the maximum of {max}")]
    LengthExceeded {
        /// Reported `length`
        length: u32,
        /// Largest supported length
        max: usize,
    },

    /// Byte buffer conversion is turned off
    #[error("Byte buffer conversion is disabled")]
    TypedArraysDisabled,

    /// A script token that does not carry a script value
    #[error("Script token does not hold a script value")]
    ForeignToken,

    /// A value does not match the declared argument type
    #[error("Expected {expected}, got {found}")]
    Mismatch {
        /// Declared type
        expected: String,
        /// Kind of the script value
        found: String,
    },
}

/// A call could not be routed to native code
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// Wrong number of arguments
    #[error("{name} expects {expected} arguments but got {got}")]
    ArityMismatch {
        /// Script-visible name
        name: String,
        /// Declared arity
        expected: usize,
        /// Supplied arity
        got: usize,
    },

    /// The class does not implement a declared selector
    #[error("{class} does not implement {selector}")]
    MissingImplementation {
        /// Class name
        class: String,
        /// Selector
        selector: String,
    },

    /// No initializer takes the supplied number of arguments
    #[error("{class} has no initializer taking {arity} arguments")]
    NoInitializer {
        /// Class name
        class: String,
        /// Supplied arity
        arity: usize,
    },

    /// An initializer returned nothing
    #[error("Initializer {selector} of {class} returned no object")]
    InitializerFailed {
        /// Class name
        class: String,
        /// Selector
        selector: String,
    },

    /// A signature contains types the bridge cannot convert
    #[error("{name} has an unsupported signature {signature}")]
    UnsupportedSignature {
        /// Method or closure name
        name: String,
        /// Encoded signature
        signature: String,
    },

    /// Two selectors claim the same script-visible name
    #[error("{class}: '{name}' is claimed by both {first} and {second}")]
    AmbiguousRename {
        /// Class name
        class: String,
        /// Script-visible name
        name: String,
        /// First selector
        first: String,
        /// Second selector
        second: String,
    },

    /// A protocol declaration was rejected
    #[error(transparent)]
    InvalidDeclaration(#[from] DeclarationError),

    /// The receiver of a method call is not a bridged object
    #[error("{selector} called on an incompatible receiver")]
    InvalidReceiver {
        /// Selector
        selector: String,
    },

    /// A class constructor was called without `new`
    #[error("Class constructor {0} cannot be invoked without 'new'")]
    ConstructorWithoutNew(String),

    /// The value is not a function
    #[error("{0} is not a function")]
    NotCallable(String),

    /// The value cannot be used with `new`
    #[error("{0} is not a constructor")]
    NotAConstructor(String),
}

/// A bridged value outlived its counterpart
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifetimeError {
    /// The wrapper's native object was released
    #[error("Native object behind {class} wrapper was released")]
    Released {
        /// Class name recorded on the wrapper
        class: String,
    },

    /// The script value was collected
    #[error("Script value was collected")]
    Collected,
}

/// Top-level error of the bridge API
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Conversion failure
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    /// Dispatch failure
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// Lifetime failure
    #[error(transparent)]
    Lifetime(#[from] LifetimeError),

    /// A script exception that reached native code
    #[error("{0}")]
    Script(BridgeException),

    /// A native exception that was not turned into a script exception
    #[error(transparent)]
    Native(#[from] NativeException),

    /// A virtual machine already exists on this thread
    #[error("A virtual machine is already running on this thread")]
    VmAlreadyRunning,

    /// Invalid configuration
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl BridgeError {
    /// The script exception, if this error carries one
    pub fn exception(&self) -> Option<&BridgeException> {
        match self {
            BridgeError::Script(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DeclarationError> for BridgeError {
    fn from(e: DeclarationError) -> Self {
        BridgeError::Dispatch(DispatchError::InvalidDeclaration(e))
    }
}

/// Result type of the bridge API
pub type BridgeResult<T> = Result<T, BridgeError>;
