//! The object/value bridge
//!
//! Connects the VM to the native object system:
//!
//! - `convert`: native values to script values and back
//! - `wrapper_map`: one script wrapper per native object and context
//! - `template`: per-class constructor, prototype and export table
//! - `callback`: script functions that dispatch into native methods,
//!   initializers and closures
//! - `interceptor`: exported properties and subscripts on wrappers
//! - `managed`: native-owned roots for script values
//! - `exception` and `reporter`: exceptions crossing the boundary
//! - `api`: the typed surface used by native callers

mod api;
mod callback;
mod convert;
mod exception;
mod interceptor;
mod managed;
mod reporter;
mod template;
mod wrapper_map;

pub use convert::ExpectedKind;
pub use exception::{BridgeException, ExceptionOrigin};
pub use managed::ManagedValue;
pub use reporter::{ExceptionHandler, Reporter};

use tandem_sdk::NativeException;

use crate::error::{BridgeError, ConversionError, DispatchError, LifetimeError};
use crate::vm::gc::{Heap, RootSet};
use crate::vm::Thrown;

pub(crate) use template::TemplateCache;
pub(crate) use wrapper_map::{RegistryHolds, WrapperMap};

/// Per-context bridge state
pub(crate) struct BridgeTables {
    pub wrappers: WrapperMap,
    pub templates: TemplateCache,
}

impl BridgeTables {
    pub fn new() -> Self {
        Self {
            wrappers: WrapperMap::new(),
            templates: TemplateCache::new(),
        }
    }

    /// Roots held by the bridge: class templates, and wrappers that carry
    /// script-side state while their native object is alive elsewhere
    pub fn trace(&self, heap: &Heap, holds: &RegistryHolds, roots: &mut RootSet) {
        self.templates.trace(roots);
        self.wrappers.trace(heap, holds, roots);
    }
}

/// Failure inside a bridge operation, before it is settled at the boundary
#[derive(Debug)]
pub(crate) enum Fault {
    /// Script code threw
    Thrown(Thrown),
    /// The bridge itself failed
    Error(BridgeError),
}

impl From<Thrown> for Fault {
    fn from(thrown: Thrown) -> Self {
        Fault::Thrown(thrown)
    }
}

impl From<BridgeError> for Fault {
    fn from(e: BridgeError) -> Self {
        Fault::Error(e)
    }
}

impl From<ConversionError> for Fault {
    fn from(e: ConversionError) -> Self {
        Fault::Error(e.into())
    }
}

impl From<DispatchError> for Fault {
    fn from(e: DispatchError) -> Self {
        Fault::Error(e.into())
    }
}

impl From<LifetimeError> for Fault {
    fn from(e: LifetimeError) -> Self {
        Fault::Error(e.into())
    }
}

impl From<NativeException> for Fault {
    fn from(e: NativeException) -> Self {
        Fault::Error(e.into())
    }
}
