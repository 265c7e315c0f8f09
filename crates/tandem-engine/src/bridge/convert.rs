//! Value conversion
//!
//! Native values become script values and back. Collections convert
//! recursively up to the configured depth. Native objects become wrappers,
//! native closures become functions, and both come back as the original
//! native reference.

use std::cell::RefCell;
use std::rc::Rc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use tandem_sdk::{
    ClassDescriptor, MethodSignature, NativeClosure, NativeValue, ScriptToken, Selector,
    TypeEncoding,
};
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use super::callback::{BlockCallback, ConstructorCallback};
use super::managed::ManagedValue;
use super::template::template_for;
use super::wrapper_map::{function_for_closure, wrapper_for_native, wrapper_state, WrapperState};
use super::Fault;
use crate::defaults::MAX_ARRAY_LENGTH;
use crate::error::{ConversionError, DispatchError};
use crate::vm::{ObjectKind, ObjectRef, Scope, Value};

/// Requested shape of a native value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedKind {
    /// Whatever the script value naturally maps to
    Any,
    /// Boolean by truthiness
    Bool,
    /// Number by numeric coercion
    Number,
    /// Number truncated to a signed 32-bit integer
    Int32,
    /// Number truncated to an unsigned 32-bit integer
    UInt32,
    /// Same as `Number`
    Double,
    /// String by string coercion
    String,
    /// Date
    Date,
    /// Ordered collection read through `length` and indices
    Array,
    /// Own enumerable properties
    Dictionary,
    /// Bytes of an `ArrayBuffer`
    Data,
    /// Any object
    Object,
    /// A function made from a native closure
    Closure,
}

impl ExpectedKind {
    fn name(self) -> &'static str {
        match self {
            ExpectedKind::Any => "any",
            ExpectedKind::Bool => "boolean",
            ExpectedKind::Number | ExpectedKind::Double => "number",
            ExpectedKind::Int32 => "int32",
            ExpectedKind::UInt32 => "uint32",
            ExpectedKind::String => "string",
            ExpectedKind::Date => "date",
            ExpectedKind::Array => "array",
            ExpectedKind::Dictionary => "dictionary",
            ExpectedKind::Data => "data",
            ExpectedKind::Object => "object",
            ExpectedKind::Closure => "closure",
        }
    }
}

/// The native counterpart of a bridged function
enum Callable {
    Closure(NativeClosure),
    Class(Rc<ClassDescriptor>),
    Script,
}

/// Converts values in one scope
pub(crate) struct Converter<'a> {
    scope: &'a Scope,
    max_depth: usize,
    typed_arrays: bool,
    /// Containers seen by the current script-to-native conversion. `None`
    /// while the container is still being converted.
    visited: RefCell<FxHashMap<ObjectRef, Option<NativeValue>>>,
}

impl<'a> Converter<'a> {
    pub fn new(scope: &'a Scope) -> Self {
        let options = scope.vm().options();
        Self {
            scope,
            max_depth: options.max_conversion_depth,
            typed_arrays: options.typed_arrays,
            visited: RefCell::new(FxHashMap::default()),
        }
    }

    // ========================================================================
    // Native to script
    // ========================================================================

    pub fn to_script(&self, value: &NativeValue) -> Result<Value, Fault> {
        self.to_script_at(value, 0)
    }

    fn to_script_at(&self, value: &NativeValue, depth: usize) -> Result<Value, Fault> {
        if depth > self.max_depth {
            return Err(ConversionError::DepthExceeded(self.max_depth).into());
        }
        let scope = self.scope;
        let value = match value {
            NativeValue::Nil => Value::Undefined,
            NativeValue::Null => Value::Null,
            NativeValue::Bool(b) => Value::Bool(*b),
            NativeValue::Number(n) => Value::Number(*n),
            NativeValue::String(s) => Value::string(s),
            NativeValue::Array(items) => {
                let mut converted = Vec::with_capacity(items.len());
                for item in items {
                    converted.push(self.to_script_at(item, depth + 1)?);
                }
                scope.new_array(converted)
            }
            NativeValue::Dictionary(entries) => {
                let object = scope.new_object();
                for (key, item) in entries {
                    let Some(key) = key.as_str() else {
                        warn!(key = key.kind_name(), "dropping non-string dictionary key");
                        continue;
                    };
                    let item = self.to_script_at(item, depth + 1)?;
                    scope.set(&object, key, item)?;
                }
                object
            }
            NativeValue::Date(date) => scope.new_date_with_nanos(
                date.timestamp_millis() as f64,
                date.timestamp_subsec_nanos() % 1_000_000,
            ),
            NativeValue::Data(bytes) => {
                if !self.typed_arrays {
                    return Err(ConversionError::TypedArraysDisabled.into());
                }
                scope.new_array_buffer(bytes.clone())
            }
            NativeValue::Closure(closure) => function_for_closure(scope, closure)?,
            NativeValue::Object(native) => wrapper_for_native(scope, native)?,
            NativeValue::Class(class) => {
                let constructor = Value::Object(template_for(scope, class)?.constructor);
                scope.track(&constructor);
                constructor
            }
            NativeValue::Selector(selector) => Value::string(selector.name()),
            NativeValue::Script(token) => {
                let managed = token
                    .downcast_ref::<ManagedValue>()
                    .ok_or(ConversionError::ForeignToken)?;
                match managed.value(scope) {
                    Some(value) => value,
                    None => {
                        warn!("script value behind a token was collected");
                        Value::Undefined
                    }
                }
            }
        };
        Ok(value)
    }

    /// Convert a native return value declared as `encoding`
    pub fn result_for(&self, encoding: &TypeEncoding, value: &NativeValue) -> Result<Value, Fault> {
        match (encoding, value) {
            (TypeEncoding::Void, _) => Ok(Value::Undefined),
            (TypeEncoding::Bool, NativeValue::Number(n)) => Ok(Value::Bool(*n != 0.0 && !n.is_nan())),
            (e, NativeValue::Bool(b)) if e.is_numeric() => Ok(Value::Number(if *b { 1.0 } else { 0.0 })),
            _ => self.to_script(value),
        }
    }

    // ========================================================================
    // Script to native
    // ========================================================================

    pub fn to_native(&self, value: &Value) -> Result<NativeValue, Fault> {
        self.visited.borrow_mut().clear();
        self.to_native_at(value, 0)
    }

    fn to_native_at(&self, value: &Value, depth: usize) -> Result<NativeValue, Fault> {
        if depth > self.max_depth {
            return Err(ConversionError::DepthExceeded(self.max_depth).into());
        }
        let scope = self.scope;
        let r = match value {
            Value::Undefined => return Ok(NativeValue::Nil),
            Value::Null => return Ok(NativeValue::Null),
            Value::Bool(b) => return Ok(NativeValue::Bool(*b)),
            Value::Number(n) => return Ok(NativeValue::Number(*n)),
            Value::String(s) => return Ok(NativeValue::String(s.to_string())),
            Value::Object(r) => *r,
        };

        enum Shape {
            Array,
            Date(f64, u32),
            Bytes(Vec<u8>),
            Function,
            Wrapper,
            Plain,
        }
        let shape = scope.read(r, |o| match &o.kind {
            ObjectKind::Array(_) => Shape::Array,
            ObjectKind::Date { millis, nanos } => Shape::Date(*millis, *nanos),
            ObjectKind::ArrayBuffer(bytes) => Shape::Bytes(bytes.clone()),
            ObjectKind::Function(_) => Shape::Function,
            ObjectKind::Wrapper(_) => Shape::Wrapper,
            ObjectKind::Ordinary | ObjectKind::Error(_) | ObjectKind::RegExp { .. } => Shape::Plain,
        });
        let Some(shape) = shape else {
            return Ok(NativeValue::Nil);
        };

        match shape {
            Shape::Array => self.array_at(value, depth),
            Shape::Date(millis, nanos) => Ok(date_from_millis(millis)
                .map(|date| date + Duration::nanoseconds(i64::from(nanos)))
                .map_or(NativeValue::Nil, NativeValue::Date)),
            Shape::Bytes(bytes) => {
                if !self.typed_arrays {
                    return Err(ConversionError::TypedArraysDisabled.into());
                }
                Ok(NativeValue::Data(bytes))
            }
            Shape::Function => match self.callable(value) {
                Callable::Closure(closure) => Ok(NativeValue::Closure(closure)),
                Callable::Class(class) => Ok(NativeValue::Class(class)),
                Callable::Script => self.dictionary_at(value, depth),
            },
            Shape::Wrapper => match wrapper_state(scope, value) {
                WrapperState::Live(native) => Ok(NativeValue::Object(native)),
                WrapperState::Released(class) => {
                    warn!(class = %class, "converting a wrapper whose native object was released");
                    Ok(NativeValue::Nil)
                }
                WrapperState::NotAWrapper => Ok(NativeValue::Nil),
            },
            Shape::Plain => self.dictionary_at(value, depth),
        }
    }

    /// Convert with a requested shape
    pub fn to_native_as(&self, value: &Value, expected: ExpectedKind) -> Result<NativeValue, Fault> {
        self.visited.borrow_mut().clear();
        let scope = self.scope;
        let converted = match expected {
            ExpectedKind::Any | ExpectedKind::Object => self.to_native(value)?,
            ExpectedKind::Bool => NativeValue::Bool(scope.to_bool(value)),
            ExpectedKind::Number | ExpectedKind::Double => NativeValue::Number(scope.to_double(value)),
            ExpectedKind::Int32 => NativeValue::Number(scope.to_int32(value) as f64),
            ExpectedKind::UInt32 => NativeValue::Number(scope.to_uint32(value) as f64),
            ExpectedKind::String => {
                if value.is_nullish() {
                    NativeValue::Nil
                } else {
                    NativeValue::String(scope.to_string(value))
                }
            }
            ExpectedKind::Date => {
                if value.is_nullish() {
                    NativeValue::Nil
                } else if scope.is_date(value) {
                    self.to_native(value)?
                } else if value.is_number() {
                    date_from_millis(scope.to_double(value)).map_or(NativeValue::Nil, NativeValue::Date)
                } else {
                    return Err(self.mismatch(expected.name(), value));
                }
            }
            ExpectedKind::Array => {
                if value.is_nullish() {
                    NativeValue::Nil
                } else if value.is_object() {
                    self.array_at(value, 0)?
                } else {
                    return Err(self.not_an_object("array", value));
                }
            }
            ExpectedKind::Dictionary => {
                if value.is_nullish() {
                    NativeValue::Nil
                } else if value.is_object() {
                    self.dictionary_at(value, 0)?
                } else {
                    return Err(self.not_an_object("dictionary", value));
                }
            }
            ExpectedKind::Data => {
                if value.is_nullish() {
                    NativeValue::Nil
                } else if scope.is_array_buffer(value) {
                    self.to_native(value)?
                } else {
                    return Err(self.mismatch(expected.name(), value));
                }
            }
            ExpectedKind::Closure => {
                if value.is_nullish() {
                    NativeValue::Nil
                } else if let Callable::Closure(closure) = self.callable(value) {
                    NativeValue::Closure(closure)
                } else {
                    return Err(self.mismatch(expected.name(), value));
                }
            }
        };
        Ok(converted)
    }

    /// Convert a script argument declared as `encoding`
    pub fn argument_for(&self, encoding: &TypeEncoding, value: &Value) -> Result<NativeValue, Fault> {
        let scope = self.scope;
        let converted = match encoding {
            TypeEncoding::Void => NativeValue::Nil,
            TypeEncoding::Bool => NativeValue::Bool(scope.to_bool(value)),
            TypeEncoding::Float | TypeEncoding::Double => NativeValue::Number(scope.to_double(value)),
            TypeEncoding::LongLong | TypeEncoding::ULongLong => {
                let n = scope.to_double(value);
                let n = if n.is_finite() { n.trunc() } else { 0.0 };
                if encoding.is_unsigned() && n < 0.0 {
                    return Err(self.mismatch(&encoding.to_string(), value));
                }
                NativeValue::Number(n)
            }
            e if e.is_unsigned() => NativeValue::Number(scope.to_uint32(value) as f64),
            e if e.is_integer() => NativeValue::Number(scope.to_int32(value) as f64),
            TypeEncoding::CString => self.to_native_as(value, ExpectedKind::String)?,
            TypeEncoding::Object(None) => self.to_native(value)?,
            TypeEncoding::Object(Some(class)) => self.object_argument(class, value)?,
            TypeEncoding::Closure => self.to_native_as(value, ExpectedKind::Closure)?,
            TypeEncoding::Class => match self.callable(value) {
                Callable::Class(class) => NativeValue::Class(class),
                _ if value.is_nullish() => NativeValue::Nil,
                _ => return Err(self.mismatch("class", value)),
            },
            TypeEncoding::Selector => {
                if value.is_nullish() {
                    NativeValue::Nil
                } else {
                    NativeValue::Selector(Selector::new(&scope.to_string(value)))
                }
            }
            TypeEncoding::ScriptValue => {
                NativeValue::Script(ScriptToken::new(ManagedValue::new(scope, value)))
            }
            other => {
                return Err(DispatchError::UnsupportedSignature {
                    name: "argument".to_string(),
                    signature: other.to_string(),
                }
                .into())
            }
        };
        Ok(converted)
    }

    /// Convert every argument of a call
    pub fn arguments(&self, signature: &MethodSignature, args: &[Value]) -> Result<Vec<NativeValue>, Fault> {
        signature
            .args
            .iter()
            .zip(args)
            .map(|(encoding, value)| self.argument_for(encoding, value))
            .collect()
    }

    fn object_argument(&self, class: &str, value: &Value) -> Result<NativeValue, Fault> {
        let expected = match class {
            "String" => Some(ExpectedKind::String),
            "Number" => Some(ExpectedKind::Number),
            "Array" => Some(ExpectedKind::Array),
            "Dictionary" => Some(ExpectedKind::Dictionary),
            "Date" => Some(ExpectedKind::Date),
            "Data" => Some(ExpectedKind::Data),
            _ => None,
        };
        if let Some(expected) = expected {
            return self.to_native_as(value, expected);
        }
        let converted = self.to_native(value)?;
        match &converted {
            NativeValue::Object(native) if !native.class().ancestors().any(|c| c.name() == class) => {
                Err(self.mismatch(class, value))
            }
            _ => Ok(converted),
        }
    }

    // ========================================================================
    // Collections
    // ========================================================================

    fn array_at(&self, value: &Value, depth: usize) -> Result<NativeValue, Fault> {
        self.container(value, || {
            let scope = self.scope;
            let length = scope.get(value, "length")?;
            let length = scope.to_uint32(&length);
            if (length as usize) > MAX_ARRAY_LENGTH {
                return Err(ConversionError::LengthExceeded {
                    length,
                    max: MAX_ARRAY_LENGTH,
                }
                .into());
            }
            let mut items = Vec::with_capacity(length.min(1024) as usize);
            for index in 0..length {
                let item = scope.get_index(value, index)?;
                items.push(self.to_native_at(&item, depth + 1)?);
            }
            Ok(NativeValue::Array(items))
        })
    }

    fn dictionary_at(&self, value: &Value, depth: usize) -> Result<NativeValue, Fault> {
        self.container(value, || {
            let scope = self.scope;
            let mut entries = Vec::new();
            for key in scope.own_keys(value) {
                let item = scope.get(value, &key)?;
                let item = self.to_native_at(&item, depth + 1)?;
                entries.push((NativeValue::String(key), item));
            }
            Ok(NativeValue::Dictionary(entries))
        })
    }

    /// Converts a container once per conversion. A container reached again
    /// while it is still being converted becomes `Nil`.
    fn container<F>(&self, value: &Value, convert: F) -> Result<NativeValue, Fault>
    where
        F: FnOnce() -> Result<NativeValue, Fault>,
    {
        let Some(r) = value.as_object() else {
            return convert();
        };
        let seen = self.visited.borrow().get(&r).cloned();
        match seen {
            Some(Some(converted)) => return Ok(converted),
            Some(None) => {
                debug!("cyclic reference converted to nil");
                return Ok(NativeValue::Nil);
            }
            None => {}
        }
        self.visited.borrow_mut().insert(r, None);
        let result = convert();
        match &result {
            Ok(converted) => {
                self.visited.borrow_mut().insert(r, Some(converted.clone()));
            }
            Err(_) => {
                self.visited.borrow_mut().remove(&r);
            }
        }
        result
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn callable(&self, value: &Value) -> Callable {
        let Some(r) = value.as_object() else {
            return Callable::Script;
        };
        let callable = self
            .scope
            .read(r, |o| match &o.kind {
                ObjectKind::Function(f) => Some(Rc::clone(&f.callable)),
                _ => None,
            })
            .flatten();
        let Some(callable) = callable else {
            return Callable::Script;
        };
        let any = callable.as_any();
        if let Some(block) = any.downcast_ref::<BlockCallback>() {
            Callable::Closure(block.closure().clone())
        } else if let Some(constructor) = any.downcast_ref::<ConstructorCallback>() {
            Callable::Class(constructor.class())
        } else {
            Callable::Script
        }
    }

    fn describe(&self, value: &Value) -> String {
        match value {
            Value::Object(r) => self
                .scope
                .read(*r, |o| o.kind_name())
                .unwrap_or("collected object")
                .to_string(),
            other => self.scope.type_of(other).to_string(),
        }
    }

    fn mismatch(&self, expected: &str, value: &Value) -> Fault {
        ConversionError::Mismatch {
            expected: expected.to_string(),
            found: self.describe(value),
        }
        .into()
    }

    fn not_an_object(&self, target: &'static str, value: &Value) -> Fault {
        ConversionError::NotAnObject {
            target,
            found: self.describe(value),
        }
        .into()
    }
}

fn date_from_millis(ms: f64) -> Option<DateTime<Utc>> {
    if !ms.is_finite() {
        return None;
    }
    Utc.timestamp_millis_opt(ms as i64).single()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::VirtualMachine;

    #[test]
    fn test_primitive_round_trip() {
        let vm = VirtualMachine::new().unwrap();
        let context = vm.new_context();
        context.execute(|scope| {
            let converter = Converter::new(scope);
            for value in [
                NativeValue::Nil,
                NativeValue::Null,
                NativeValue::Bool(true),
                NativeValue::Number(2.5),
                NativeValue::String("hello".into()),
            ] {
                let script = converter.to_script(&value).unwrap();
                assert_eq!(converter.to_native(&script).unwrap(), value);
            }
        });
    }

    #[test]
    fn test_dictionary_drops_non_string_keys() {
        let vm = VirtualMachine::new().unwrap();
        let context = vm.new_context();
        context.execute(|scope| {
            let converter = Converter::new(scope);
            let dict = NativeValue::Dictionary(vec![
                (NativeValue::String("a".into()), NativeValue::Number(1.0)),
                (NativeValue::Number(2.0), NativeValue::Number(2.0)),
            ]);
            let object = converter.to_script(&dict).unwrap();
            assert_eq!(scope.own_keys(&object), vec!["a".to_string()]);
        });
    }

    #[test]
    fn test_collections_need_objects() {
        let vm = VirtualMachine::new().unwrap();
        let context = vm.new_context();
        context.execute(|scope| {
            let converter = Converter::new(scope);
            assert_eq!(
                converter.to_native_as(&Value::Null, ExpectedKind::Array).unwrap(),
                NativeValue::Nil
            );
            let err = converter
                .to_native_as(&Value::Number(3.0), ExpectedKind::Dictionary)
                .unwrap_err();
            assert!(matches!(
                err,
                Fault::Error(crate::error::BridgeError::Conversion(
                    ConversionError::NotAnObject { target: "dictionary", .. }
                ))
            ));
        });
    }

    #[test]
    fn test_depth_limit() {
        let options = crate::options::BridgeOptions {
            max_conversion_depth: 2,
            ..Default::default()
        };
        let vm = VirtualMachine::with_options(options).unwrap();
        let context = vm.new_context();
        context.execute(|scope| {
            let nested = NativeValue::Array(vec![NativeValue::Array(vec![NativeValue::Array(
                vec![NativeValue::Number(1.0)],
            )])]);
            let err = Converter::new(scope).to_script(&nested).unwrap_err();
            assert!(matches!(
                err,
                Fault::Error(crate::error::BridgeError::Conversion(
                    ConversionError::DepthExceeded(2)
                ))
            ));
        });
    }

    #[test]
    fn test_cyclic_object() {
        let vm = VirtualMachine::new().unwrap();
        let context = vm.new_context();
        context.execute(|scope| {
            let object = scope.new_object();
            scope.set(&object, "name", Value::string("loop")).unwrap();
            scope.set(&object, "self", object.clone()).unwrap();
            let converted = Converter::new(scope).to_native(&object).unwrap();
            assert_eq!(
                converted,
                NativeValue::dictionary([
                    ("name", NativeValue::String("loop".into())),
                    ("self", NativeValue::Nil),
                ])
            );
        });
    }

    #[test]
    fn test_shared_object_converted_twice() {
        let vm = VirtualMachine::new().unwrap();
        let context = vm.new_context();
        context.execute(|scope| {
            let shared = scope.new_array(vec![Value::Number(1.0)]);
            let outer = scope.new_array(vec![shared.clone(), shared]);
            let item = NativeValue::Array(vec![NativeValue::Number(1.0)]);
            assert_eq!(
                Converter::new(scope).to_native(&outer).unwrap(),
                NativeValue::Array(vec![item.clone(), item])
            );
        });
    }

    #[test]
    fn test_array_like_length_limit() {
        let vm = VirtualMachine::new().unwrap();
        let context = vm.new_context();
        context.execute(|scope| {
            let object = scope.new_object();
            scope
                .set(&object, "length", Value::Number(4294967295.0))
                .unwrap();
            let err = Converter::new(scope)
                .to_native_as(&object, ExpectedKind::Array)
                .unwrap_err();
            assert!(matches!(
                err,
                Fault::Error(crate::error::BridgeError::Conversion(
                    ConversionError::LengthExceeded { length: 4294967295, .. }
                ))
            ));
        });
    }

    #[test]
    fn test_integer_arguments() {
        let vm = VirtualMachine::new().unwrap();
        let context = vm.new_context();
        context.execute(|scope| {
            let converter = Converter::new(scope);
            let int = converter
                .argument_for(&TypeEncoding::Int, &Value::Number(f64::NAN))
                .unwrap();
            assert_eq!(int, NativeValue::Number(0.0));
            let uint = converter
                .argument_for(&TypeEncoding::UInt, &Value::Number(-1.0))
                .unwrap();
            assert_eq!(uint, NativeValue::Number(4294967295.0));
            let flag = converter
                .argument_for(&TypeEncoding::Bool, &Value::string(""))
                .unwrap();
            assert_eq!(flag, NativeValue::Bool(false));
        });
    }
}
