//! Tandem engine
//!
//! A single-threaded script VM with a tracing collector, and the bridge that
//! connects it to the refcounted native object system of `tandem-sdk`.
//!
//! Native objects appear in script as wrapper objects, one per object and
//! context. Classes appear as constructors whose prototypes carry the methods
//! of the class's exported protocols. Script values can be held from native
//! code through [`ManagedValue`], kept alive by native owners.
//!
//! # Example
//!
//! ```ignore
//! use tandem_engine::VirtualMachine;
//!
//! let vm = VirtualMachine::new()?;
//! let context = vm.new_context();
//! context.set_class("Counter", &counter_class)?;
//! let value = context.execute(|scope| {
//!     let counter = scope.construct_with_arguments(&scope.property(&scope.global(), "Counter")?, &[])?;
//!     scope.invoke_method(&counter, "increment", &[])
//! })?;
//! ```

#![warn(missing_docs)]

pub mod bridge;
pub mod defaults;
pub mod error;
pub mod options;
pub mod vm;

pub use bridge::{
    BridgeException, ExceptionHandler, ExceptionOrigin, ExpectedKind, ManagedValue, Reporter,
};
pub use error::{BridgeError, BridgeResult, ConversionError, DispatchError, LifetimeError};
pub use options::{BridgeOptions, ConfigError, ExceptionStrategy};
pub use vm::{
    Context, ErrorKind, GcCycle, GcStats, HeapStats, HostCallable, HostFunction, Invocation,
    ObjectRef, PropertyDescriptor, PropertyInterceptor, Scope, ScriptEvaluator, ScriptResult,
    StackFrame, StackTrace, Thrown, Value, VirtualMachine,
};
