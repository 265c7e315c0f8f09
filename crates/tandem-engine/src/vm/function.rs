//! Host-implemented functions

use std::any::Any;

use super::scope::Scope;
use super::value::{ObjectRef, Value};

/// A value thrown by script or host code
#[derive(Debug, Clone, PartialEq)]
pub struct Thrown(pub Value);

impl Thrown {
    /// The thrown value
    pub fn value(&self) -> &Value {
        &self.0
    }
}

/// Result of an operation that may throw
pub type ScriptResult<T> = Result<T, Thrown>;

/// One call of a function
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Receiver
    pub this: Value,
    /// Function being called
    pub callee: ObjectRef,
    /// Arguments
    pub args: Vec<Value>,
    /// Whether the call came from `new`
    pub is_construct: bool,
}

impl Invocation {
    /// Argument `index`, `undefined` when missing
    pub fn arg(&self, index: usize) -> Value {
        self.args.get(index).cloned().unwrap_or_default()
    }
}

/// Behavior of a function object.
///
/// Implementations must not keep script values of their own; values that
/// need to outlive a call belong in a managed value.
pub trait HostCallable: Any {
    /// Run the function
    fn call(&self, scope: &Scope, invocation: &Invocation) -> ScriptResult<Value>;

    /// Whether `new` may be applied
    fn is_constructor(&self) -> bool {
        false
    }

    /// Upcast for downcasting to the concrete callable
    fn as_any(&self) -> &dyn Any;
}

/// Host function backed by a Rust closure
pub struct HostFunction<F> {
    body: F,
    constructor: bool,
}

impl<F> HostFunction<F>
where
    F: Fn(&Scope, &Invocation) -> ScriptResult<Value> + 'static,
{
    /// Plain function
    pub fn new(body: F) -> Self {
        Self {
            body,
            constructor: false,
        }
    }

    /// Function that may be called with `new`
    pub fn constructor(body: F) -> Self {
        Self {
            body,
            constructor: true,
        }
    }
}

impl<F> HostCallable for HostFunction<F>
where
    F: Fn(&Scope, &Invocation) -> ScriptResult<Value> + 'static,
{
    fn call(&self, scope: &Scope, invocation: &Invocation) -> ScriptResult<Value> {
        (self.body)(scope, invocation)
    }

    fn is_constructor(&self) -> bool {
        self.constructor
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
