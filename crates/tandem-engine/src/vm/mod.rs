//! The script virtual machine
//!
//! A single-threaded object model with a tracing collector. Source text is
//! run by an embedder-supplied [`ScriptEvaluator`]; everything else (heap,
//! properties, calls, errors, stack traces) lives here.

pub mod coerce;
mod context;
mod evaluator;
mod function;
pub mod gc;
mod interceptor;
mod intrinsics;
mod machine;
mod object;
mod scope;
mod stack_trace;
mod value;

pub use context::Context;
pub use evaluator::ScriptEvaluator;
pub use function::{HostCallable, HostFunction, Invocation, ScriptResult, Thrown};
pub use gc::{GcCycle, GcStats, HeapStats};
pub use interceptor::PropertyInterceptor;
pub use machine::VirtualMachine;
pub use object::{ErrorKind, PropertyDescriptor};
pub use scope::Scope;
pub use stack_trace::{StackFrame, StackTrace};
pub use value::{ObjectRef, Value};

pub(crate) use machine::VmState;
pub(crate) use object::{HeapObject, ObjectKind, Property, WrapperData};
