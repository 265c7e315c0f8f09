//! Property interception for wrappers
//!
//! Exported accessor properties and subscripts are answered by the native
//! object. Everything else falls through to the wrapper's own storage and
//! the class prototype, where exported methods live.

use std::rc::Rc;

use tandem_sdk::{NativeHandle, NativeValue, Receiver, Selector};
use tracing::warn;

use super::callback::{call_native, run};
use super::convert::Converter;
use super::template::{ExportTable, ExportedMethod};
use super::wrapper_map::{wrapper_state, WrapperState};
use super::Fault;
use crate::error::DispatchError;
use crate::vm::{ObjectRef, PropertyInterceptor, Scope, ScriptResult, Value};

/// Interceptor shared by the wrappers of one class
pub(crate) struct WrapperInterceptor {
    table: Rc<ExportTable>,
}

impl WrapperInterceptor {
    pub fn new(table: Rc<ExportTable>) -> Self {
        Self { table }
    }

    /// The live native object behind `holder`. `None` when the holder is
    /// not a wrapper or its object was released.
    fn native(&self, scope: &Scope, holder: ObjectRef, key: &str) -> Option<NativeHandle> {
        match wrapper_state(scope, &Value::Object(holder)) {
            WrapperState::Live(native) => Some(native),
            WrapperState::Released(class) => {
                warn!(class = %class, key, "property access on a released native object");
                None
            }
            WrapperState::NotAWrapper => None,
        }
    }

    fn send(
        &self,
        native: NativeHandle,
        selector: &Selector,
        args: &[NativeValue],
    ) -> Result<NativeValue, Fault> {
        let class = native.class();
        let implementation = class.instance_method(selector).ok_or_else(|| {
            DispatchError::MissingImplementation {
                class: class.name().to_string(),
                selector: selector.name().to_string(),
            }
        })?;
        let receiver = Receiver::Instance(native);
        Ok(call_native(|| implementation(&receiver, args))?)
    }

    fn subscript(
        &self,
        scope: &Scope,
        holder: ObjectRef,
        method: &ExportedMethod,
        index: u32,
        value: Option<&Value>,
    ) -> Result<Option<Value>, Fault> {
        method.check_signature()?;
        let Some(native) = self.native(scope, holder, method.selector.name()) else {
            return Ok(Some(Value::Undefined));
        };
        let converter = Converter::new(scope);
        let mut args = Vec::with_capacity(2);
        let mut encodings = method.signature.args.iter();
        if let Some(value) = value {
            if let Some(encoding) = encodings.next() {
                args.push(converter.argument_for(encoding, value)?);
            }
        }
        if let Some(encoding) = encodings.next() {
            args.push(converter.argument_for(encoding, &Value::Number(index as f64))?);
        }
        let result = self.send(native, &method.selector, &args)?;
        Ok(Some(converter.result_for(&method.signature.ret, &result)?))
    }
}

impl PropertyInterceptor for WrapperInterceptor {
    fn get(&self, scope: &Scope, holder: ObjectRef, key: &str) -> ScriptResult<Option<Value>> {
        let Some(property) = self.table.properties.get(key) else {
            return Ok(None);
        };
        run(scope, || {
            property.check_encoding()?;
            let Some(native) = self.native(scope, holder, key) else {
                return Ok(Some(Value::Undefined));
            };
            let result = self.send(native, &property.getter, &[])?;
            Ok(Some(Converter::new(scope).result_for(&property.encoding, &result)?))
        })
    }

    fn set(&self, scope: &Scope, holder: ObjectRef, key: &str, value: &Value) -> ScriptResult<bool> {
        let Some(property) = self.table.properties.get(key) else {
            return Ok(false);
        };
        // Writes to readonly properties are ignored, as for frozen data
        let Some(setter) = &property.setter else {
            return Ok(true);
        };
        run(scope, || {
            property.check_encoding()?;
            let Some(native) = self.native(scope, holder, key) else {
                return Ok(true);
            };
            let arg = Converter::new(scope).argument_for(&property.encoding, value)?;
            self.send(native, setter, &[arg])?;
            Ok(true)
        })
    }

    fn query(&self, _scope: &Scope, _holder: ObjectRef, key: &str) -> Option<bool> {
        self.table.properties.contains_key(key).then_some(true)
    }

    fn delete(&self, _scope: &Scope, _holder: ObjectRef, key: &str) -> Option<bool> {
        self.table.properties.contains_key(key).then_some(false)
    }

    fn get_index(&self, scope: &Scope, holder: ObjectRef, index: u32) -> ScriptResult<Option<Value>> {
        let Some(getter) = &self.table.index_getter else {
            return Ok(None);
        };
        run(scope, || self.subscript(scope, holder, getter, index, None))
    }

    fn set_index(
        &self,
        scope: &Scope,
        holder: ObjectRef,
        index: u32,
        value: &Value,
    ) -> ScriptResult<bool> {
        let Some(setter) = &self.table.index_setter else {
            return Ok(false);
        };
        run(scope, || {
            self.subscript(scope, holder, setter, index, Some(value))
                .map(|_| true)
        })
    }
}
