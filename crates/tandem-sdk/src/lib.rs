//! Tandem SDK
//!
//! The native side of the Tandem bridge: a small refcounted object system
//! with runtime reflection. Classes carry method tables and adopt protocols
//! (capability declarations); protocols marked exported describe what a
//! script may call. The engine crate reflects on these descriptions to build
//! script constructors, prototypes and callbacks.
//!
//! # Example
//!
//! ```ignore
//! use tandem_sdk::{ClassBuilder, Instance, NativeValue, ProtocolBuilder};
//!
//! let exports = ProtocolBuilder::new("CounterExports")
//!     .exported()
//!     .method("increment", "v@:")
//!     .readonly_property("count", "d")
//!     .build()?;
//!
//! let counter = ClassBuilder::new("Counter")
//!     .adopt(&exports)
//!     .instance_method("increment", |recv, _| { /* ... */ Ok(NativeValue::Nil) })
//!     .build();
//! ```

#![warn(missing_docs)]

pub mod class;
pub mod closure;
pub mod convert;
pub mod encoding;
pub mod error;
pub mod object;
pub mod protocol;
pub mod selector;
pub mod value;

pub use class::{ClassBuilder, ClassDescriptor, ClassId, Factory, MethodImpl};
pub use closure::NativeClosure;
pub use convert::{arg, FromNative, IntoNative};
pub use encoding::{MethodSignature, TypeEncoding};
pub use error::{DeclarationError, NativeException};
pub use object::{downcast, native_id, Instance, NativeHandle, NativeObject, Receiver, WeakNativeHandle};
pub use protocol::{
    MethodDeclaration, MethodKind, PropertyDeclaration, Protocol, ProtocolBuilder, Rename,
};
pub use selector::Selector;
pub use value::{NativeValue, ScriptToken};
