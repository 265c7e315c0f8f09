//! Exceptions crossing the boundary
//!
//! Native failures are raised into the script as error objects. Script
//! exceptions that reach a native caller become a [`BridgeException`],
//! which is either returned as an error or handed to the [`Reporter`],
//! depending on the VM's exception strategy.

use std::fmt;

use tandem_sdk::NativeException;

use super::reporter::Reporter;
use super::Fault;
use crate::error::{BridgeError, BridgeResult};
use crate::options::ExceptionStrategy;
use crate::vm::{ErrorKind, ObjectKind, Property, Scope, StackFrame, StackTrace, Thrown, Value};

/// Where an exception started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionOrigin {
    /// Thrown by script code or the VM
    Script,
    /// Raised by a native method or closure
    Native,
}

/// A script exception as seen from native code
#[derive(Debug, Clone)]
pub struct BridgeException {
    /// Error name (`TypeError`, or the native exception name)
    pub name: String,
    /// Error message, or the string form of a thrown non-error value
    pub message: String,
    /// Resource the exception was thrown from
    pub resource_name: Option<String>,
    /// Line, 1-based; 0 when unknown
    pub line: u32,
    /// First column of the offending range
    pub start_column: u32,
    /// Column after the offending range
    pub end_column: u32,
    /// Text of the offending source line
    pub source_line: Option<String>,
    /// Where the exception started
    pub origin: ExceptionOrigin,
    native: Option<NativeException>,
    frames: Vec<StackFrame>,
}

impl BridgeException {
    /// Capture a thrown value
    pub fn from_thrown(scope: &Scope, thrown: &Thrown) -> Self {
        let value = thrown.value();
        let error_data = value
            .as_object()
            .and_then(|r| {
                scope.read(r, |o| match &o.kind {
                    ObjectKind::Error(data) => Some(data.clone()),
                    _ => None,
                })
            })
            .flatten();

        let (name, message, frames, native) = match error_data {
            Some(data) => {
                let field = |key: &str| match scope.get(value, key) {
                    Ok(v) if !v.is_undefined() => scope.to_string(&v),
                    _ => String::new(),
                };
                (field("name"), field("message"), data.stack, data.native)
            }
            None => (String::new(), scope.to_string(value), scope.capture_frames(), None),
        };

        let frame = frames.iter().find(|f| f.script_name.is_some()).cloned();
        let (resource_name, line, start_column) = match frame {
            Some(frame) => (frame.script_name, frame.line, frame.column),
            None => (None, 0, 0),
        };
        let source_line = resource_name
            .as_deref()
            .and_then(|name| scope.source(name))
            .zip(line.checked_sub(1))
            .and_then(|(source, index)| source.lines().nth(index as usize).map(str::to_string));

        Self {
            name,
            message,
            resource_name,
            line,
            start_column,
            end_column: if line > 0 { start_column + 1 } else { 0 },
            source_line,
            origin: if native.is_some() {
                ExceptionOrigin::Native
            } else {
                ExceptionOrigin::Script
            },
            native,
            frames,
        }
    }

    /// Stack captured when the exception was created
    pub fn backtrace(&self) -> StackTrace {
        StackTrace::new(self.frames.clone())
    }

    /// The native exception this started as
    pub fn native_exception(&self) -> Option<&NativeException> {
        self.native.as_ref()
    }
}

impl fmt::Display for BridgeException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(resource) = &self.resource_name {
            write!(f, "{}:{}:{}: ", resource, self.line, self.start_column)?;
        }
        if self.name.is_empty() {
            f.write_str(&self.message)
        } else if self.message.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{}: {}", self.name, self.message)
        }
    }
}

impl std::error::Error for BridgeException {}

/// A bridge error handed back to native code.
///
/// Script exceptions that started as native exceptions give back the
/// original.
impl From<BridgeError> for NativeException {
    fn from(e: BridgeError) -> Self {
        match e {
            BridgeError::Native(native) => native,
            BridgeError::Script(exception) => match exception.native {
                Some(native) => native,
                None if exception.name.is_empty() => {
                    NativeException::new("ScriptException", exception.message)
                }
                None => NativeException::new(exception.name, exception.message),
            },
            other => NativeException::new("BridgeError", other.to_string()),
        }
    }
}

/// Turn a bridge failure into a thrown script value
pub(crate) fn raise(scope: &Scope, fault: Fault) -> Thrown {
    match fault {
        Fault::Thrown(thrown) => thrown,
        Fault::Error(BridgeError::Native(native)) => throw_native(scope, native),
        Fault::Error(BridgeError::Script(exception)) => match exception.native {
            Some(native) => throw_native(scope, native),
            None => {
                let kind = match exception.name.as_str() {
                    "TypeError" => ErrorKind::TypeError,
                    "RangeError" => ErrorKind::RangeError,
                    _ => ErrorKind::Error,
                };
                scope.throw_error(kind, &exception.message)
            }
        },
        Fault::Error(other) => scope.throw_type_error(&other.to_string()),
    }
}

fn throw_native(scope: &Scope, native: NativeException) -> Thrown {
    let error = scope.new_error(ErrorKind::Error, &native.reason);
    if let Value::Object(r) = &error {
        scope.write(*r, |o| {
            o.properties
                .insert("name", Property::hidden(Value::string(&native.name)));
            if let ObjectKind::Error(data) = &mut o.kind {
                data.native = Some(native);
            }
        });
    }
    Thrown(error)
}

/// Settle a bridge result at the native boundary
pub(crate) fn settle<T>(scope: &Scope, result: Result<T, Fault>, empty: T) -> BridgeResult<T> {
    match result {
        Ok(value) => Ok(value),
        Err(Fault::Thrown(thrown)) => {
            let exception = BridgeException::from_thrown(scope, &thrown);
            match scope.vm().exception_strategy() {
                ExceptionStrategy::Rethrow => Err(BridgeError::Script(exception)),
                ExceptionStrategy::Report => {
                    Reporter::shared().report(&exception);
                    Ok(empty)
                }
            }
        }
        Err(Fault::Error(e)) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::VirtualMachine;

    #[test]
    fn test_native_exception_is_raised_as_error() {
        let vm = VirtualMachine::new().unwrap();
        let context = vm.new_context();
        context.execute(|scope| {
            let native = NativeException::range("index 9 beyond bounds");
            let thrown = raise(scope, Fault::from(native.clone()));
            assert!(scope.is_error(thrown.value()));
            assert_eq!(
                scope.to_string(thrown.value()),
                "RangeException: index 9 beyond bounds"
            );

            let exception = BridgeException::from_thrown(scope, &thrown);
            assert_eq!(exception.origin, ExceptionOrigin::Native);
            assert_eq!(exception.native_exception(), Some(&native));
            assert_eq!(NativeException::from(BridgeError::Script(exception)), native);
        });
    }

    #[test]
    fn test_dispatch_errors_become_type_errors() {
        let vm = VirtualMachine::new().unwrap();
        let context = vm.new_context();
        context.execute(|scope| {
            let fault = Fault::from(crate::error::DispatchError::ConstructorWithoutNew(
                "Counter".into(),
            ));
            let thrown = raise(scope, fault);
            let exception = BridgeException::from_thrown(scope, &thrown);
            assert_eq!(exception.name, "TypeError");
            assert_eq!(
                exception.message,
                "Class constructor Counter cannot be invoked without 'new'"
            );
            assert_eq!(exception.origin, ExceptionOrigin::Script);
        });
    }

    #[test]
    fn test_thrown_primitive() {
        let vm = VirtualMachine::new().unwrap();
        let context = vm.new_context();
        context.execute(|scope| {
            let thrown = scope.throw(Value::Number(42.0));
            let exception = BridgeException::from_thrown(scope, &thrown);
            assert_eq!(exception.name, "");
            assert_eq!(exception.message, "42");
            assert_eq!(exception.to_string(), "42");
            assert_eq!(exception.line, 0);
        });
    }

    #[test]
    fn test_display_with_position() {
        let exception = BridgeException {
            name: "TypeError".into(),
            message: "x is not a function".into(),
            resource_name: Some("main.js".into()),
            line: 3,
            start_column: 7,
            end_column: 8,
            source_line: None,
            origin: ExceptionOrigin::Script,
            native: None,
            frames: Vec::new(),
        };
        assert_eq!(exception.to_string(), "main.js:3:7: TypeError: x is not a function");
    }
}
