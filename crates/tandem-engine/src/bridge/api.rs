//! Native-facing bridge API
//!
//! Typed operations on [`Scope`] and [`Context`] that convert native values
//! on the way in and settle script exceptions on the way out, following the
//! VM's exception strategy.

use std::rc::Rc;

use chrono::{DateTime, TimeZone, Utc};
use tandem_sdk::{ClassDescriptor, NativeClosure, NativeValue};

use super::convert::{Converter, ExpectedKind};
use super::exception::settle;
use super::managed::ManagedValue;
use super::template::{class_for_constructor, template_for};
use super::wrapper_map::native_for_wrapper;
use super::Fault;
use crate::error::BridgeResult;
use crate::options::ConfigError;
use crate::vm::{Context, ObjectKind, PropertyDescriptor, Property, Scope, Value};

impl Scope {
    // ========================================================================
    // Conversion
    // ========================================================================

    /// Convert a native value into this context
    pub fn wrap(&self, value: &NativeValue) -> BridgeResult<Value> {
        settle(self, Converter::new(self).to_script(value), Value::Undefined)
    }

    /// Convert a script value to native, optionally as a requested kind
    pub fn unwrap(&self, value: &Value, expected: Option<ExpectedKind>) -> BridgeResult<NativeValue> {
        let converter = Converter::new(self);
        let result = converter.to_native_as(value, expected.unwrap_or(ExpectedKind::Any));
        settle(self, result, NativeValue::Nil)
    }

    /// The native representation of any value
    pub fn to_object(&self, value: &Value) -> BridgeResult<NativeValue> {
        self.unwrap(value, Some(ExpectedKind::Object))
    }

    /// The native object behind `value` if it is an instance of `class`,
    /// `Nil` otherwise
    pub fn to_object_of_class(&self, value: &Value, class: &ClassDescriptor) -> NativeValue {
        match native_for_wrapper(self, value) {
            Some(native) if native.class().is_subclass_of(class) => NativeValue::Object(native),
            _ => NativeValue::Nil,
        }
    }

    /// The native closure behind a function created from one
    pub fn to_closure(&self, value: &Value) -> Option<NativeClosure> {
        Converter::new(self)
            .to_native_as(value, ExpectedKind::Closure)
            .ok()
            .and_then(|v| match v {
                NativeValue::Closure(closure) => Some(closure),
                _ => None,
            })
    }

    /// Booleans stay booleans, everything else becomes a number
    pub fn to_number(&self, value: &Value) -> NativeValue {
        match value {
            Value::Bool(b) => NativeValue::Bool(*b),
            other => NativeValue::Number(self.to_double(other)),
        }
    }

    /// Dates and numbers (milliseconds since the epoch) as a timestamp
    pub fn to_date(&self, value: &Value) -> Option<DateTime<Utc>> {
        if self.is_date(value) {
            return match Converter::new(self).to_native(value) {
                Ok(NativeValue::Date(date)) => Some(date),
                _ => None,
            };
        }
        if !value.is_number() {
            return None;
        }
        let millis = self.to_double(value);
        if !millis.is_finite() {
            return None;
        }
        Utc.timestamp_millis_opt(millis as i64).single()
    }

    /// Ordered collection read through `length` and indices. `Nil` for
    /// `null` and `undefined`.
    pub fn to_array(&self, value: &Value) -> BridgeResult<NativeValue> {
        self.unwrap(value, Some(ExpectedKind::Array))
    }

    /// Own enumerable properties. `Nil` for `null` and `undefined`.
    pub fn to_dictionary(&self, value: &Value) -> BridgeResult<NativeValue> {
        self.unwrap(value, Some(ExpectedKind::Dictionary))
    }

    /// Bytes of an `ArrayBuffer`
    pub fn to_array_buffer(&self, value: &Value) -> Option<Vec<u8>> {
        let r = value.as_object()?;
        self.read(r, |o| match &o.kind {
            ObjectKind::ArrayBuffer(bytes) => Some(bytes.clone()),
            _ => None,
        })
        .flatten()
    }

    /// New `ArrayBuffer` of `length` zeroed bytes
    pub fn new_array_buffer_with_length(&self, length: usize) -> Value {
        self.new_array_buffer(vec![0; length])
    }

    // ========================================================================
    // Comparison
    // ========================================================================

    /// `a === b`
    pub fn is_equal(&self, a: &Value, b: &Value) -> bool {
        self.strict_equals(a, b)
    }

    /// `a == b`
    pub fn is_equal_with_coercion(&self, a: &Value, b: &Value) -> bool {
        self.loose_equals(a, b)
    }

    /// `value instanceof constructor`. Wrappers are checked against the
    /// class hierarchy of their native object.
    pub fn is_instance_of(&self, value: &Value, constructor: &Value) -> BridgeResult<bool> {
        if let Some(class) = class_for_constructor(self, constructor) {
            if let Some(native) = native_for_wrapper(self, value) {
                return Ok(native.class().is_subclass_of(&class));
            }
        }
        let result = self.instance_of(value, constructor).map_err(Fault::from);
        settle(self, result, false)
    }

    // ========================================================================
    // Properties
    // ========================================================================

    /// `value[key]`
    pub fn property(&self, value: &Value, key: &str) -> BridgeResult<Value> {
        settle(self, self.get(value, key).map_err(Fault::from), Value::Undefined)
    }

    /// `value[key] = native`
    pub fn set_property(&self, value: &Value, key: &str, native: &NativeValue) -> BridgeResult<()> {
        let result = Converter::new(self)
            .to_script(native)
            .and_then(|v| Ok(self.set(value, key, v)?));
        settle(self, result, ())
    }

    /// `delete value[key]`
    pub fn delete_property(&self, value: &Value, key: &str) -> BridgeResult<bool> {
        settle(self, self.delete(value, key).map_err(Fault::from), false)
    }

    /// `key in value`
    pub fn has_property(&self, value: &Value, key: &str) -> BridgeResult<bool> {
        settle(self, self.has(value, key).map_err(Fault::from), false)
    }

    /// `value[index]`
    pub fn value_at_index(&self, value: &Value, index: u32) -> BridgeResult<Value> {
        settle(self, self.get_index(value, index).map_err(Fault::from), Value::Undefined)
    }

    /// `value[index] = native`
    pub fn set_value_at_index(&self, value: &Value, index: u32, native: &NativeValue) -> BridgeResult<()> {
        let result = Converter::new(self)
            .to_script(native)
            .and_then(|v| Ok(self.set_index(value, index, v)?));
        settle(self, result, ())
    }

    /// Define a property from a descriptor dictionary with the keys
    /// `value`, `writable`, `get`, `set`, `enumerable` and `configurable`.
    /// Missing flags default to false.
    pub fn define_property_with(&self, value: &Value, key: &str, descriptor: &NativeValue) -> BridgeResult<()> {
        let result = (|| -> Result<(), Fault> {
            let converter = Converter::new(self);
            let flag = |name: &str| descriptor.get(name).and_then(NativeValue::as_bool).unwrap_or(false);
            let enumerable = flag("enumerable");
            let configurable = flag("configurable");
            let getter = descriptor.get("get");
            let setter = descriptor.get("set");
            let property = if getter.is_some() || setter.is_some() {
                PropertyDescriptor::Accessor {
                    getter: getter.map(|g| converter.to_script(g)).transpose()?,
                    setter: setter.map(|s| converter.to_script(s)).transpose()?,
                    enumerable,
                    configurable,
                }
            } else {
                PropertyDescriptor::Data {
                    value: descriptor
                        .get("value")
                        .map(|v| converter.to_script(v))
                        .transpose()?
                        .unwrap_or_default(),
                    writable: flag("writable"),
                    enumerable,
                    configurable,
                }
            };
            Ok(self.define_property(value, key, property)?)
        })();
        settle(self, result, ())
    }

    // ========================================================================
    // Invocation
    // ========================================================================

    fn convert_arguments(&self, args: &[NativeValue]) -> Result<Vec<Value>, Fault> {
        let converter = Converter::new(self);
        args.iter().map(|arg| converter.to_script(arg)).collect()
    }

    /// Call `function` with `this` undefined
    pub fn call_with_arguments(&self, function: &Value, args: &[NativeValue]) -> BridgeResult<Value> {
        let result = self
            .convert_arguments(args)
            .and_then(|args| Ok(self.call(function, &Value::Undefined, &args)?));
        settle(self, result, Value::Undefined)
    }

    /// `new constructor(...args)`
    pub fn construct_with_arguments(&self, constructor: &Value, args: &[NativeValue]) -> BridgeResult<Value> {
        let result = self
            .convert_arguments(args)
            .and_then(|args| Ok(self.construct(constructor, &args)?));
        settle(self, result, Value::Undefined)
    }

    /// `value[name](...args)`
    pub fn invoke_method(&self, value: &Value, name: &str, args: &[NativeValue]) -> BridgeResult<Value> {
        let result = self.convert_arguments(args).and_then(|args| {
            let method = self.get(value, name)?;
            Ok(self.call(&method, value, &args)?)
        });
        settle(self, result, Value::Undefined)
    }

    // ========================================================================
    // Evaluation
    // ========================================================================

    /// Evaluate source text with the installed evaluator
    pub fn evaluate_script(&self, source: &str, resource_name: &str) -> BridgeResult<Value> {
        if !self.virtual_machine().has_evaluator() {
            return Err(ConfigError::ValidationError("no script evaluator installed".to_string()).into());
        }
        settle(
            self,
            self.evaluate(source, resource_name).map_err(Fault::from),
            Value::Undefined,
        )
    }
}

impl Context {
    /// `globalThis[key]`, converted to native
    pub fn get(&self, key: &str) -> BridgeResult<NativeValue> {
        self.execute(|scope| {
            let value = scope.property(&scope.global(), key)?;
            scope.unwrap(&value, None)
        })
    }

    /// `globalThis[key] = value`
    pub fn set(&self, key: &str, value: &NativeValue) -> BridgeResult<()> {
        self.execute(|scope| scope.set_property(&scope.global(), key, value))
    }

    /// The global object
    pub fn global_object(&self) -> ManagedValue {
        self.execute(|scope| ManagedValue::new(scope, &scope.global()))
    }

    /// Evaluate source text and convert the completion value to native
    pub fn evaluate_script(&self, source: &str, resource_name: &str) -> BridgeResult<NativeValue> {
        self.execute(|scope| {
            let value = scope.evaluate_script(source, resource_name)?;
            scope.unwrap(&value, None)
        })
    }

    /// Expose `class` as a constructor on the global object
    pub fn set_class(&self, name: &str, class: &Rc<ClassDescriptor>) -> BridgeResult<()> {
        self.execute(|scope| {
            let result = template_for(scope, class).map(|template| {
                let constructor = Value::Object(template.constructor);
                scope.write(scope.state().global, |o| {
                    o.properties.insert(name, Property::hidden(constructor))
                });
            });
            settle(scope, result, ())
        })
    }
}
