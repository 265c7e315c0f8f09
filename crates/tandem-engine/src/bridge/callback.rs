//! Callback dispatch
//!
//! Script functions that route calls into native code: exported methods,
//! class constructors and native closures. Every native call is guarded by
//! `catch_unwind`, and every failure becomes a thrown script error before
//! it leaves the callback.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use tandem_sdk::{ClassDescriptor, MethodKind, NativeClosure, NativeException, NativeValue, Receiver};
use tracing::warn;

use super::convert::Converter;
use super::exception::raise;
use super::template::{class_for_constructor, ExportTable, ExportedMethod};
use super::wrapper_map::{wrapper_for_native, wrapper_state, WrapperState};
use super::Fault;
use crate::error::DispatchError;
use crate::vm::{HostCallable, Invocation, Scope, ScriptResult, Value};

/// Run a bridge operation inside a callback, throwing its failure
pub(crate) fn run<T>(scope: &Scope, f: impl FnOnce() -> Result<T, Fault>) -> ScriptResult<T> {
    f().map_err(|fault| raise(scope, fault))
}

/// Call into native code, turning a panic into a native exception
pub(crate) fn call_native<F>(f: F) -> Result<NativeValue, NativeException>
where
    F: FnOnce() -> Result<NativeValue, NativeException>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(NativeException::from_panic(payload)),
    }
}

fn check_arity(name: &str, expected: usize, got: usize) -> Result<(), DispatchError> {
    if expected != got {
        return Err(DispatchError::ArityMismatch {
            name: name.to_string(),
            expected,
            got,
        });
    }
    Ok(())
}

// ============================================================================
// Methods
// ============================================================================

/// An exported instance or class method
pub(crate) struct MethodCallback {
    method: Rc<ExportedMethod>,
    kind: MethodKind,
    class: Rc<ClassDescriptor>,
}

impl MethodCallback {
    pub fn new(method: Rc<ExportedMethod>, kind: MethodKind, class: Rc<ClassDescriptor>) -> Self {
        Self { method, kind, class }
    }

    fn receiver(&self, scope: &Scope, this: &Value) -> Result<Option<Receiver>, Fault> {
        let selector = &self.method.selector;
        if self.kind != MethodKind::Instance {
            // Class methods inherited by a subclass constructor see the subclass
            let class = class_for_constructor(scope, this)
                .filter(|c| c.is_subclass_of(&self.class))
                .unwrap_or_else(|| Rc::clone(&self.class));
            return Ok(Some(Receiver::Class(class)));
        }
        match wrapper_state(scope, this) {
            WrapperState::Live(native) if native.class().is_subclass_of(&self.class) => {
                Ok(Some(Receiver::Instance(native)))
            }
            WrapperState::Released(class) => {
                warn!(class = %class, selector = %selector, "method called on a released native object");
                Ok(None)
            }
            _ => Err(DispatchError::InvalidReceiver {
                selector: selector.name().to_string(),
            }
            .into()),
        }
    }
}

impl HostCallable for MethodCallback {
    fn call(&self, scope: &Scope, invocation: &Invocation) -> ScriptResult<Value> {
        run(scope, || {
            let method = &self.method;
            check_arity(&method.name, method.signature.arity(), invocation.args.len())?;
            method.check_signature()?;
            let Some(receiver) = self.receiver(scope, &invocation.this)? else {
                return Ok(Value::Undefined);
            };

            let class = receiver.class();
            let implementation = match self.kind {
                MethodKind::Instance => class.instance_method(&method.selector),
                _ => class.class_method(&method.selector),
            };
            let implementation = implementation.ok_or_else(|| DispatchError::MissingImplementation {
                class: class.name().to_string(),
                selector: method.selector.name().to_string(),
            })?;

            let converter = Converter::new(scope);
            let args = converter.arguments(&method.signature, &invocation.args)?;
            let result = call_native(|| implementation(&receiver, &args))?;
            converter.result_for(&method.signature.ret, &result)
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// Constructors
// ============================================================================

/// `new Class(...)`: picks the initializer by argument count
pub(crate) struct ConstructorCallback {
    class: Rc<ClassDescriptor>,
    table: Rc<ExportTable>,
}

impl ConstructorCallback {
    pub fn new(class: Rc<ClassDescriptor>, table: Rc<ExportTable>) -> Self {
        Self { class, table }
    }

    pub fn class(&self) -> Rc<ClassDescriptor> {
        Rc::clone(&self.class)
    }

    fn instantiate(&self, scope: &Scope, args: &[Value]) -> Result<NativeValue, Fault> {
        let class_name = self.class.name();
        let Some(initializer) = self.table.initializer(args.len()) else {
            if args.is_empty() {
                if let Some(native) = self.class.instantiate() {
                    return Ok(NativeValue::Object(native));
                }
            }
            return Err(DispatchError::NoInitializer {
                class: class_name.to_string(),
                arity: args.len(),
            }
            .into());
        };
        initializer.check_signature()?;

        let implementation = self
            .class
            .class_method(&initializer.selector)
            .ok_or_else(|| DispatchError::MissingImplementation {
                class: class_name.to_string(),
                selector: initializer.selector.name().to_string(),
            })?;
        let args = Converter::new(scope).arguments(&initializer.signature, args)?;
        let receiver = Receiver::Class(Rc::clone(&self.class));
        Ok(call_native(|| implementation(&receiver, &args))?)
    }
}

impl HostCallable for ConstructorCallback {
    fn call(&self, scope: &Scope, invocation: &Invocation) -> ScriptResult<Value> {
        run(scope, || {
            if !invocation.is_construct {
                return Err(DispatchError::ConstructorWithoutNew(self.class.name().to_string()).into());
            }
            match self.instantiate(scope, &invocation.args)? {
                // An initializer may hand back an object that is already
                // bridged; its existing wrapper is reused
                NativeValue::Object(native) => wrapper_for_native(scope, &native),
                _ => Err(DispatchError::InitializerFailed {
                    class: self.class.name().to_string(),
                    selector: self
                        .table
                        .initializer(invocation.args.len())
                        .map_or("new", |m| m.selector.name())
                        .to_string(),
                }
                .into()),
            }
        })
    }

    fn is_constructor(&self) -> bool {
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// Closures
// ============================================================================

/// A native closure called from script
pub(crate) struct BlockCallback {
    closure: NativeClosure,
}

impl BlockCallback {
    pub fn new(closure: NativeClosure) -> Self {
        Self { closure }
    }

    pub fn closure(&self) -> &NativeClosure {
        &self.closure
    }
}

impl HostCallable for BlockCallback {
    fn call(&self, scope: &Scope, invocation: &Invocation) -> ScriptResult<Value> {
        run(scope, || {
            let signature = self.closure.signature();
            check_arity("closure", signature.arity(), invocation.args.len())?;
            let converter = Converter::new(scope);
            let args = converter.arguments(signature, &invocation.args)?;
            let result = call_native(|| self.closure.invoke(&args))?;
            converter.result_for(&signature.ret, &result)
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
