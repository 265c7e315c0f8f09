//! Scoped access to a context
//!
//! A [`Scope`] is handed out by [`Context::execute`] and to every host
//! function. All script values are created, read and called through it.
//! Objects it returns are recorded in the current handle frame, so they
//! survive collections until the region or call ends.

use std::rc::Rc;

use chrono::DateTime;
use tracing::trace;

use super::coerce::{
    primitive_to_number, primitive_to_string, primitive_type_of,
    string_to_number, to_boolean, to_int32, to_uint32,
};
use super::context::{Context, ContextState, Region};
use super::function::{HostCallable, HostFunction, Invocation, ScriptResult, Thrown};
use super::gc::GcCycle;
use super::interceptor::PropertyInterceptor;
use super::intrinsics::Intrinsics;
use super::machine::{CallRecord, VirtualMachine, VmState};
use super::object::{
    array_index, ErrorData, ErrorKind, FunctionData, HeapObject, ObjectKind, Property,
    PropertyDescriptor, PropertySlot,
};
use super::stack_trace::{StackFrame, StackTrace};
use super::value::{ObjectRef, Value};
use crate::defaults::{MAX_ARRAY_LENGTH, MAX_PROTOTYPE_CHAIN};

/// Nesting bound for `toString` of arrays containing themselves
const MAX_STRINGIFY_DEPTH: usize = 32;

/// Access to a context inside a scoped region
pub struct Scope {
    context: Context,
}

enum Lookup {
    Value(Value),
    Getter(Option<ObjectRef>),
    Next(Option<ObjectRef>),
}

enum SetTarget {
    Own,
    Setter(Option<ObjectRef>),
    ReadOnly,
    Absent,
}

/// Pops the call bookkeeping when a call ends, also during unwinding
struct CallGuard<'a> {
    vm: &'a VmState,
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        self.vm.frames.borrow_mut().pop();
        self.vm.calls.borrow_mut().pop();
    }
}

struct FrameGuard<'a> {
    vm: &'a VmState,
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        self.vm.frames.borrow_mut().pop();
    }
}

impl Scope {
    pub(crate) fn new(context: Context) -> Self {
        Self { context }
    }

    /// The context this scope runs in
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// The owning virtual machine
    pub fn virtual_machine(&self) -> VirtualMachine {
        self.context.virtual_machine()
    }

    pub(crate) fn state(&self) -> &Rc<ContextState> {
        &self.context.state
    }

    pub(crate) fn vm(&self) -> &VmState {
        &self.context.state.vm
    }

    pub(crate) fn intrinsics(&self) -> &Intrinsics {
        &self.context.state.intrinsics
    }

    /// The global object
    pub fn global(&self) -> Value {
        let global = Value::Object(self.context.state.global);
        self.track(&global);
        global
    }

    // ========================================================================
    // Heap access
    // ========================================================================

    pub(crate) fn alloc(&self, object: HeapObject) -> Value {
        Value::Object(self.vm().allocate(object))
    }

    pub(crate) fn track(&self, value: &Value) {
        self.vm().track(value);
    }

    /// Read an object; `None` when it was collected
    pub(crate) fn read<R>(&self, r: ObjectRef, f: impl FnOnce(&HeapObject) -> R) -> Option<R> {
        let heap = self.vm().heap.borrow();
        heap.get(r).map(f)
    }

    /// Modify an object; `None` when it was collected
    pub(crate) fn write<R>(&self, r: ObjectRef, f: impl FnOnce(&mut HeapObject) -> R) -> Option<R> {
        let mut heap = self.vm().heap.borrow_mut();
        heap.get_mut(r).map(f)
    }

    /// Whether `value` refers to a live object, or is a primitive
    pub fn is_live(&self, value: &Value) -> bool {
        match value {
            Value::Object(r) => self.vm().is_live(*r),
            _ => true,
        }
    }

    fn kind_matches(&self, value: &Value, f: impl FnOnce(&ObjectKind) -> bool) -> bool {
        match value {
            Value::Object(r) => self.read(*r, |o| f(&o.kind)).unwrap_or(false),
            _ => false,
        }
    }

    pub(crate) fn interceptor_of(&self, r: ObjectRef) -> Option<Rc<dyn PropertyInterceptor>> {
        self.read(r, |o| match &o.kind {
            ObjectKind::Wrapper(w) => Some(Rc::clone(&w.interceptor)),
            _ => None,
        })
        .flatten()
    }

    // ========================================================================
    // Factories
    // ========================================================================

    /// New empty object
    pub fn new_object(&self) -> Value {
        let proto = self.intrinsics().object_prototype;
        self.alloc(HeapObject::new(ObjectKind::Ordinary, Some(proto)))
    }

    /// New array holding `items`
    pub fn new_array(&self, items: Vec<Value>) -> Value {
        let proto = self.intrinsics().array_prototype;
        self.alloc(HeapObject::new(ObjectKind::Array(items), Some(proto)))
    }

    /// New error object; the current stack is captured into it
    pub fn new_error(&self, kind: ErrorKind, message: &str) -> Value {
        let stack = self.capture_frames();
        let proto = self.intrinsics().error_prototype(kind);
        let mut object = HeapObject::new(
            ObjectKind::Error(ErrorData {
                stack,
                native: None,
            }),
            Some(proto),
        );
        object
            .properties
            .insert("message", Property::hidden(Value::string(message)));
        self.alloc(object)
    }

    /// New date from milliseconds since the epoch
    pub fn new_date(&self, millis: f64) -> Value {
        self.new_date_with_nanos(millis, 0)
    }

    /// New date keeping a sub-millisecond remainder for the native side
    pub(crate) fn new_date_with_nanos(&self, millis: f64, nanos: u32) -> Value {
        let proto = self.intrinsics().date_prototype;
        let (millis, nanos) = if millis.is_finite() && millis.abs() <= 8.64e15 {
            (millis.trunc(), nanos % 1_000_000)
        } else {
            (f64::NAN, 0)
        };
        self.alloc(HeapObject::new(ObjectKind::Date { millis, nanos }, Some(proto)))
    }

    /// New regular expression object
    pub fn new_regexp(&self, pattern: &str, flags: &str) -> Value {
        let proto = self.intrinsics().regexp_prototype;
        self.alloc(HeapObject::new(
            ObjectKind::RegExp {
                pattern: Rc::from(pattern),
                flags: Rc::from(flags),
            },
            Some(proto),
        ))
    }

    /// New byte buffer
    pub fn new_array_buffer(&self, bytes: Vec<u8>) -> Value {
        let proto = self.intrinsics().array_buffer_prototype;
        self.alloc(HeapObject::new(ObjectKind::ArrayBuffer(bytes), Some(proto)))
    }

    /// New function backed by `callable`. Constructors get a fresh
    /// `prototype` object.
    pub fn new_function(&self, name: &str, callable: Rc<dyn HostCallable>) -> Value {
        let prototype = if callable.is_constructor() {
            let proto = self.intrinsics().object_prototype;
            Some(self.vm().allocate(HeapObject::new(ObjectKind::Ordinary, Some(proto))))
        } else {
            None
        };
        Value::Object(self.new_function_with_prototype(name, callable, prototype))
    }

    /// New function from a Rust closure
    pub fn new_host_function<F>(&self, name: &str, body: F) -> Value
    where
        F: Fn(&Scope, &Invocation) -> ScriptResult<Value> + 'static,
    {
        self.new_function(name, Rc::new(HostFunction::new(body)))
    }

    /// Function whose `prototype` property is `prototype`, linked back
    /// through `constructor`
    pub(crate) fn new_function_with_prototype(
        &self,
        name: &str,
        callable: Rc<dyn HostCallable>,
        prototype: Option<ObjectRef>,
    ) -> ObjectRef {
        let mut object = HeapObject::new(
            ObjectKind::Function(FunctionData {
                name: Rc::from(name),
                callable,
                context: Rc::downgrade(self.state()),
            }),
            Some(self.intrinsics().function_prototype),
        );
        object.properties.insert(
            "name",
            Property {
                slot: PropertySlot::Data {
                    value: Value::string(name),
                    writable: false,
                },
                enumerable: false,
                configurable: true,
            },
        );
        if let Some(proto) = prototype {
            object.properties.insert(
                "prototype",
                Property {
                    slot: PropertySlot::Data {
                        value: Value::Object(proto),
                        writable: false,
                    },
                    enumerable: false,
                    configurable: false,
                },
            );
        }
        let function = self.vm().allocate(object);
        if let Some(proto) = prototype {
            self.write(proto, |o| {
                o.properties
                    .insert("constructor", Property::hidden(Value::Object(function)))
            });
        }
        function
    }

    // ========================================================================
    // Throwing
    // ========================================================================

    /// Throw an arbitrary value
    pub fn throw(&self, value: Value) -> Thrown {
        self.track(&value);
        Thrown(value)
    }

    /// Throw a new error of `kind`
    pub fn throw_error(&self, kind: ErrorKind, message: &str) -> Thrown {
        Thrown(self.new_error(kind, message))
    }

    /// Throw a `TypeError`
    pub fn throw_type_error(&self, message: &str) -> Thrown {
        self.throw_error(ErrorKind::TypeError, message)
    }

    /// Throw a `RangeError`
    pub fn throw_range_error(&self, message: &str) -> Thrown {
        self.throw_error(ErrorKind::RangeError, message)
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    /// Whether the value is an array
    pub fn is_array(&self, value: &Value) -> bool {
        self.kind_matches(value, |k| matches!(k, ObjectKind::Array(_)))
    }

    /// Whether the value is callable
    pub fn is_function(&self, value: &Value) -> bool {
        self.kind_matches(value, |k| matches!(k, ObjectKind::Function(_)))
    }

    /// Whether the value is an error object
    pub fn is_error(&self, value: &Value) -> bool {
        self.kind_matches(value, |k| matches!(k, ObjectKind::Error(_)))
    }

    /// Whether the value is a date
    pub fn is_date(&self, value: &Value) -> bool {
        self.kind_matches(value, |k| matches!(k, ObjectKind::Date { .. }))
    }

    /// Whether the value is a regular expression
    pub fn is_regexp(&self, value: &Value) -> bool {
        self.kind_matches(value, |k| matches!(k, ObjectKind::RegExp { .. }))
    }

    /// Whether the value is a byte buffer
    pub fn is_array_buffer(&self, value: &Value) -> bool {
        self.kind_matches(value, |k| matches!(k, ObjectKind::ArrayBuffer(_)))
    }

    /// Whether the value wraps a native object
    pub fn is_wrapper(&self, value: &Value) -> bool {
        self.kind_matches(value, |k| matches!(k, ObjectKind::Wrapper(_)))
    }

    /// `typeof value`
    pub fn type_of(&self, value: &Value) -> &'static str {
        primitive_type_of(value).unwrap_or_else(|| {
            if self.is_function(value) {
                "function"
            } else {
                "object"
            }
        })
    }

    // ========================================================================
    // Coercion
    // ========================================================================

    /// ToBoolean
    pub fn to_bool(&self, value: &Value) -> bool {
        to_boolean(value)
    }

    /// ToNumber. Dates give their time value.
    pub fn to_double(&self, value: &Value) -> f64 {
        if let Some(n) = primitive_to_number(value) {
            return n;
        }
        if let Value::Object(r) = value {
            if let Some(Some(millis)) = self.read(*r, |o| match o.kind {
                ObjectKind::Date { millis, .. } => Some(millis),
                _ => None,
            }) {
                return millis;
            }
        }
        string_to_number(&self.to_string(value))
    }

    /// ToInt32
    pub fn to_int32(&self, value: &Value) -> i32 {
        to_int32(self.to_double(value))
    }

    /// ToUint32
    pub fn to_uint32(&self, value: &Value) -> u32 {
        to_uint32(self.to_double(value))
    }

    /// ToString
    pub fn to_string(&self, value: &Value) -> String {
        self.stringify(value, 0)
    }

    fn stringify(&self, value: &Value, depth: usize) -> String {
        if let Some(s) = primitive_to_string(value) {
            return s;
        }
        let Value::Object(r) = value else {
            return String::new();
        };
        enum Repr {
            Text(String),
            Items(Vec<Value>),
            Error,
        }
        let repr = self.read(*r, |o| match &o.kind {
            ObjectKind::Ordinary => Repr::Text("[object Object]".to_string()),
            ObjectKind::Array(items) => Repr::Items(items.clone()),
            ObjectKind::Function(f) => {
                Repr::Text(format!("function {}() {{ [native code] }}", f.name))
            }
            ObjectKind::Error(_) => Repr::Error,
            ObjectKind::Date { millis, .. } => Repr::Text(format_date(*millis)),
            ObjectKind::RegExp { pattern, flags } => Repr::Text(format!("/{}/{}", pattern, flags)),
            ObjectKind::ArrayBuffer(_) => Repr::Text("[object ArrayBuffer]".to_string()),
            ObjectKind::Wrapper(w) => Repr::Text(format!("[object {}]", w.class_name)),
        });
        match repr {
            None => "undefined".to_string(),
            Some(Repr::Text(text)) => text,
            Some(Repr::Items(items)) => {
                if depth >= MAX_STRINGIFY_DEPTH {
                    return String::new();
                }
                items
                    .iter()
                    .map(|item| {
                        if item.is_nullish() {
                            String::new()
                        } else {
                            self.stringify(item, depth + 1)
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(",")
            }
            Some(Repr::Error) => {
                let field = |key: &str| {
                    self.get(value, key)
                        .ok()
                        .and_then(|v| primitive_to_string(&v))
                        .unwrap_or_default()
                };
                let name = field("name");
                let message = field("message");
                match (name.is_empty(), message.is_empty()) {
                    (_, true) => name,
                    (true, false) => message,
                    (false, false) => format!("{}: {}", name, message),
                }
            }
        }
    }

    /// `a === b`
    pub fn strict_equals(&self, a: &Value, b: &Value) -> bool {
        a.strict_equals(b)
    }

    /// `a == b`
    pub fn loose_equals(&self, a: &Value, b: &Value) -> bool {
        use std::mem::discriminant;
        if discriminant(a) == discriminant(b) {
            return a.strict_equals(b);
        }
        match (a, b) {
            (x, y) if x.is_nullish() || y.is_nullish() => x.is_nullish() && y.is_nullish(),
            (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
                *n == string_to_number(s)
            }
            (Value::Bool(x), other) | (other, Value::Bool(x)) => {
                let n = Value::Number(if *x { 1.0 } else { 0.0 });
                self.loose_equals(&n, other)
            }
            (Value::Object(_), other) | (other, Value::Object(_)) => {
                let object = if a.is_object() { a } else { b };
                let primitive = if self.is_date(object) {
                    Value::Number(self.to_double(object))
                } else {
                    Value::string(&self.to_string(object))
                };
                self.loose_equals(&primitive, other)
            }
            _ => false,
        }
    }

    /// `value instanceof constructor`
    pub fn instance_of(&self, value: &Value, constructor: &Value) -> ScriptResult<bool> {
        if !self.is_function(constructor) {
            return Err(self.throw_type_error("Right-hand side of 'instanceof' is not callable"));
        }
        let Value::Object(target) = self.get(constructor, "prototype")? else {
            return Err(self.throw_type_error("Function has non-object prototype in instanceof check"));
        };
        let Value::Object(mut current) = value else {
            return Ok(false);
        };
        for _ in 0..MAX_PROTOTYPE_CHAIN {
            match self.read(current, |o| o.prototype).flatten() {
                Some(proto) if proto == target => return Ok(true),
                Some(proto) => current = proto,
                None => return Ok(false),
            }
        }
        Ok(false)
    }

    // ========================================================================
    // Properties
    // ========================================================================

    /// `target[key]`
    pub fn get(&self, target: &Value, key: &str) -> ScriptResult<Value> {
        let holder = match target {
            Value::Object(r) => *r,
            Value::Undefined | Value::Null => {
                return Err(self.throw_type_error(&format!(
                    "Cannot read properties of {} (reading '{}')",
                    self.to_string(target),
                    key
                )))
            }
            Value::String(s) => {
                if key == "length" {
                    return Ok(Value::Number(s.encode_utf16().count() as f64));
                }
                if let Some(i) = array_index(key) {
                    return Ok(string_char_at(s, i));
                }
                self.intrinsics().object_prototype
            }
            _ => self.intrinsics().object_prototype,
        };
        if let Some(interceptor) = self.interceptor_of(holder) {
            if let Some(value) = interceptor.get(self, holder, key)? {
                self.track(&value);
                return Ok(value);
            }
        }
        self.get_from_chain(holder, target, key)
    }

    fn get_from_chain(&self, start: ObjectRef, receiver: &Value, key: &str) -> ScriptResult<Value> {
        let mut current = Some(start);
        let mut hops = 0;
        while let Some(r) = current {
            let lookup = self.read(r, |o| {
                if let ObjectKind::Array(items) = &o.kind {
                    if key == "length" {
                        return Lookup::Value(Value::Number(items.len() as f64));
                    }
                    if let Some(i) = array_index(key) {
                        if let Some(item) = items.get(i as usize) {
                            return Lookup::Value(item.clone());
                        }
                    }
                }
                match o.properties.get(key).map(|p| &p.slot) {
                    Some(PropertySlot::Data { value, .. }) => Lookup::Value(value.clone()),
                    Some(PropertySlot::Accessor { getter, .. }) => Lookup::Getter(*getter),
                    None => Lookup::Next(o.prototype),
                }
            });
            match lookup {
                None => {
                    trace!(key, "property read on a collected object");
                    return Ok(Value::Undefined);
                }
                Some(Lookup::Value(value)) => {
                    self.track(&value);
                    return Ok(value);
                }
                Some(Lookup::Getter(Some(getter))) => {
                    return self.call(&Value::Object(getter), receiver, &[]);
                }
                Some(Lookup::Getter(None)) => return Ok(Value::Undefined),
                Some(Lookup::Next(next)) => current = next,
            }
            hops += 1;
            if hops > MAX_PROTOTYPE_CHAIN {
                break;
            }
        }
        Ok(Value::Undefined)
    }

    /// `target[key] = value`. Writes to read-only properties are ignored.
    pub fn set(&self, target: &Value, key: &str, value: Value) -> ScriptResult<()> {
        let holder = match target {
            Value::Object(r) => *r,
            Value::Undefined | Value::Null => {
                return Err(self.throw_type_error(&format!(
                    "Cannot set properties of {} (setting '{}')",
                    self.to_string(target),
                    key
                )))
            }
            _ => return Ok(()),
        };
        if let Some(interceptor) = self.interceptor_of(holder) {
            if interceptor.set(self, holder, key, &value)? {
                return Ok(());
            }
        }
        match self.find_set_target(holder, key) {
            SetTarget::Own | SetTarget::Absent => self.write_own(holder, key, value),
            SetTarget::Setter(Some(setter)) => {
                self.call(&Value::Object(setter), target, &[value])?;
                Ok(())
            }
            SetTarget::Setter(None) | SetTarget::ReadOnly => Ok(()),
        }
    }

    fn find_set_target(&self, holder: ObjectRef, key: &str) -> SetTarget {
        let heap = self.vm().heap.borrow();
        let mut current = Some(holder);
        let mut own = true;
        let mut hops = 0;
        while let Some(r) = current {
            let Some(object) = heap.get(r) else {
                break;
            };
            if own && matches!(object.kind, ObjectKind::Array(_)) {
                if key == "length" || array_index(key).is_some() {
                    return SetTarget::Own;
                }
            }
            if let Some(property) = object.properties.get(key) {
                return match property.slot {
                    PropertySlot::Data { writable: false, .. } => SetTarget::ReadOnly,
                    PropertySlot::Data { .. } if own => SetTarget::Own,
                    PropertySlot::Data { .. } => SetTarget::Absent,
                    PropertySlot::Accessor { setter, .. } => SetTarget::Setter(setter),
                };
            }
            own = false;
            current = object.prototype;
            hops += 1;
            if hops > MAX_PROTOTYPE_CHAIN {
                break;
            }
        }
        SetTarget::Absent
    }

    fn write_own(&self, holder: ObjectRef, key: &str, value: Value) -> ScriptResult<()> {
        let is_array = self.kind_matches(&Value::Object(holder), |k| matches!(k, ObjectKind::Array(_)));
        if is_array {
            if key == "length" {
                let n = self.to_double(&value);
                let len = n as usize;
                if n < 0.0 || n.fract() != 0.0 || len > MAX_ARRAY_LENGTH {
                    return Err(self.throw_range_error("Invalid array length"));
                }
                self.write(holder, |o| {
                    if let ObjectKind::Array(items) = &mut o.kind {
                        items.resize(len, Value::Undefined);
                    }
                });
                return Ok(());
            }
            if let Some(i) = array_index(key) {
                let i = i as usize;
                if i >= MAX_ARRAY_LENGTH {
                    return Err(self.throw_range_error("Invalid array length"));
                }
                self.write(holder, |o| {
                    if let ObjectKind::Array(items) = &mut o.kind {
                        if i >= items.len() {
                            items.resize(i + 1, Value::Undefined);
                        }
                        items[i] = value;
                    }
                });
                return Ok(());
            }
        }
        self.write(holder, |o| match o.properties.get_mut(key) {
            Some(Property {
                slot: PropertySlot::Data { value: slot, .. },
                ..
            }) => *slot = value,
            _ => o.properties.insert(key, Property::data(value)),
        });
        Ok(())
    }

    /// `key in target`
    pub fn has(&self, target: &Value, key: &str) -> ScriptResult<bool> {
        let Value::Object(holder) = target else {
            return Err(self.throw_type_error(&format!(
                "Cannot use 'in' operator to search for '{}' in {}",
                key,
                self.to_string(target)
            )));
        };
        if let Some(interceptor) = self.interceptor_of(*holder) {
            if let Some(found) = interceptor.query(self, *holder, key) {
                return Ok(found);
            }
        }
        let heap = self.vm().heap.borrow();
        let mut current = Some(*holder);
        let mut hops = 0;
        while let Some(r) = current {
            let Some(object) = heap.get(r) else {
                break;
            };
            if let ObjectKind::Array(items) = &object.kind {
                if key == "length" || array_index(key).is_some_and(|i| (i as usize) < items.len()) {
                    return Ok(true);
                }
            }
            if object.properties.contains(key) {
                return Ok(true);
            }
            current = object.prototype;
            hops += 1;
            if hops > MAX_PROTOTYPE_CHAIN {
                break;
            }
        }
        Ok(false)
    }

    /// `delete target[key]`
    pub fn delete(&self, target: &Value, key: &str) -> ScriptResult<bool> {
        let Value::Object(holder) = target else {
            if target.is_nullish() {
                return Err(self.throw_type_error(&format!(
                    "Cannot convert {} to object",
                    self.to_string(target)
                )));
            }
            return Ok(true);
        };
        if let Some(interceptor) = self.interceptor_of(*holder) {
            if let Some(deleted) = interceptor.delete(self, *holder, key) {
                return Ok(deleted);
            }
        }
        let deleted = self.write(*holder, |o| {
            if let ObjectKind::Array(items) = &mut o.kind {
                if key == "length" {
                    return false;
                }
                if let Some(i) = array_index(key) {
                    if let Some(slot) = items.get_mut(i as usize) {
                        *slot = Value::Undefined;
                    }
                    return true;
                }
            }
            match o.properties.get(key) {
                Some(property) if !property.configurable => false,
                Some(_) => {
                    o.properties.remove(key);
                    true
                }
                None => true,
            }
        });
        Ok(deleted.unwrap_or(true))
    }

    /// `target[index]`
    pub fn get_index(&self, target: &Value, index: u32) -> ScriptResult<Value> {
        if let Value::Object(holder) = target {
            if let Some(interceptor) = self.interceptor_of(*holder) {
                if let Some(value) = interceptor.get_index(self, *holder, index)? {
                    self.track(&value);
                    return Ok(value);
                }
            }
            let fast = self
                .read(*holder, |o| match &o.kind {
                    ObjectKind::Array(items) => items.get(index as usize).cloned(),
                    _ => None,
                })
                .flatten();
            if let Some(value) = fast {
                self.track(&value);
                return Ok(value);
            }
        }
        self.get(target, &index.to_string())
    }

    /// `target[index] = value`
    pub fn set_index(&self, target: &Value, index: u32, value: Value) -> ScriptResult<()> {
        if let Value::Object(holder) = target {
            if let Some(interceptor) = self.interceptor_of(*holder) {
                if interceptor.set_index(self, *holder, index, &value)? {
                    return Ok(());
                }
            }
        }
        self.set(target, &index.to_string(), value)
    }

    /// Whether `index in target`
    pub fn has_index(&self, target: &Value, index: u32) -> ScriptResult<bool> {
        if let Value::Object(holder) = target {
            if let Some(interceptor) = self.interceptor_of(*holder) {
                if let Some(found) = interceptor.query_index(self, *holder, index) {
                    return Ok(found);
                }
            }
        }
        self.has(target, &index.to_string())
    }

    /// `Object.defineProperty(target, key, descriptor)`
    pub fn define_property(
        &self,
        target: &Value,
        key: &str,
        descriptor: PropertyDescriptor,
    ) -> ScriptResult<()> {
        let Value::Object(holder) = target else {
            return Err(self.throw_type_error("Object.defineProperty called on non-object"));
        };
        let property = match descriptor {
            PropertyDescriptor::Data {
                value,
                writable,
                enumerable,
                configurable,
            } => {
                let is_element = self.is_array(target) && (key == "length" || array_index(key).is_some());
                if is_element {
                    return self.write_own(*holder, key, value);
                }
                Property {
                    slot: PropertySlot::Data { value, writable },
                    enumerable,
                    configurable,
                }
            }
            PropertyDescriptor::Accessor {
                getter,
                setter,
                enumerable,
                configurable,
            } => {
                let getter = self.accessor_function(getter, "Getter")?;
                let setter = self.accessor_function(setter, "Setter")?;
                Property {
                    slot: PropertySlot::Accessor { getter, setter },
                    enumerable,
                    configurable,
                }
            }
        };
        let redefinable = self
            .read(*holder, |o| o.properties.get(key).map_or(true, |p| p.configurable))
            .unwrap_or(true);
        if !redefinable {
            return Err(self.throw_type_error(&format!("Cannot redefine property: {}", key)));
        }
        self.write(*holder, |o| o.properties.insert(key, property));
        Ok(())
    }

    fn accessor_function(&self, value: Option<Value>, what: &str) -> ScriptResult<Option<ObjectRef>> {
        match value {
            None | Some(Value::Undefined) => Ok(None),
            Some(f) if self.is_function(&f) => Ok(f.as_object()),
            Some(other) => Err(self.throw_type_error(&format!(
                "{} must be a function: {}",
                what,
                self.to_string(&other)
            ))),
        }
    }

    /// Enumerable own keys: array indices first, then properties in
    /// insertion order
    pub fn own_keys(&self, target: &Value) -> Vec<String> {
        let Value::Object(r) = target else {
            return Vec::new();
        };
        self.read(*r, |o| {
            let mut keys = Vec::new();
            if let ObjectKind::Array(items) = &o.kind {
                keys.extend((0..items.len()).map(|i| i.to_string()));
            }
            keys.extend(
                o.properties
                    .iter()
                    .filter(|(_, p)| p.enumerable)
                    .map(|(k, _)| k.to_string()),
            );
            keys
        })
        .unwrap_or_default()
    }

    /// Prototype of an object, `null` for primitives and the root
    pub fn prototype_of(&self, value: &Value) -> Value {
        match value {
            Value::Object(r) => match self.read(*r, |o| o.prototype).flatten() {
                Some(proto) => {
                    let proto = Value::Object(proto);
                    self.track(&proto);
                    proto
                }
                None => Value::Null,
            },
            _ => Value::Null,
        }
    }

    /// Replace the prototype of an object
    pub fn set_prototype_of(&self, value: &Value, prototype: &Value) -> ScriptResult<()> {
        let Value::Object(r) = value else {
            return Err(self.throw_type_error("Object.setPrototypeOf called on non-object"));
        };
        let proto = match prototype {
            Value::Object(p) => Some(*p),
            Value::Null => None,
            _ => return Err(self.throw_type_error("Object prototype may only be an Object or null")),
        };
        let mut cursor = proto;
        for _ in 0..MAX_PROTOTYPE_CHAIN {
            match cursor {
                Some(p) if p == *r => return Err(self.throw_type_error("Cyclic __proto__ value")),
                Some(p) => cursor = self.read(p, |o| o.prototype).flatten(),
                None => break,
            }
        }
        self.write(*r, |o| o.prototype = proto);
        Ok(())
    }

    // ========================================================================
    // Calls
    // ========================================================================

    fn function_data(&self, f: &Value) -> ScriptResult<(ObjectRef, FunctionData)> {
        let data = f.as_object().and_then(|r| {
            self.read(r, |o| match &o.kind {
                ObjectKind::Function(data) => Some((r, data.clone())),
                _ => None,
            })
            .flatten()
        });
        match data {
            Some(data) => Ok(data),
            None => Err(self.throw_type_error(&format!("{} is not a function", self.to_string(f)))),
        }
    }

    /// `f.call(this, ...args)`
    pub fn call(&self, f: &Value, this: &Value, args: &[Value]) -> ScriptResult<Value> {
        let (callee, data) = self.function_data(f)?;
        self.invoke(callee, data, this.clone(), args, false)
    }

    /// `new f(...args)`
    pub fn construct(&self, f: &Value, args: &[Value]) -> ScriptResult<Value> {
        let (callee, data) = self.function_data(f)?;
        if !data.callable.is_constructor() {
            return Err(self.throw_type_error(&format!("{} is not a constructor", data.name)));
        }
        let proto = match self.get(f, "prototype")? {
            Value::Object(p) => p,
            _ => self.intrinsics().object_prototype,
        };
        let this = self.alloc(HeapObject::new(ObjectKind::Ordinary, Some(proto)));
        let result = self.invoke(callee, data, this.clone(), args, true)?;
        Ok(if result.is_object() { result } else { this })
    }

    fn invoke(
        &self,
        callee: ObjectRef,
        data: FunctionData,
        this: Value,
        args: &[Value],
        is_construct: bool,
    ) -> ScriptResult<Value> {
        let vm = self.vm();
        let max_depth = vm.options.borrow().max_call_depth;
        if vm.calls.borrow().len() >= max_depth {
            return Err(self.throw_range_error("Maximum call stack size exceeded"));
        }
        let context = match data.context.upgrade() {
            Some(state) => Context { state },
            None => self.context.clone(),
        };

        vm.calls.borrow_mut().push(CallRecord {
            this: this.clone(),
            callee,
            args: args.to_vec(),
        });
        vm.frames
            .borrow_mut()
            .push(StackFrame::function(&data.name, is_construct));
        let _call = CallGuard { vm };

        let result = {
            let _region = Region::enter(&context.state);
            let scope = Scope::new(context.clone());
            let invocation = Invocation {
                this,
                callee,
                args: args.to_vec(),
                is_construct,
            };
            data.callable.call(&scope, &invocation)
        };
        match &result {
            Ok(value) | Err(Thrown(value)) => self.track(value),
        }
        result
    }

    /// `this` of the innermost active call
    pub fn current_this(&self) -> Value {
        let this = self
            .vm()
            .calls
            .borrow()
            .last()
            .map(|c| c.this.clone())
            .unwrap_or_default();
        self.track(&this);
        this
    }

    /// Function of the innermost active call
    pub fn current_callee(&self) -> Option<Value> {
        let callee = self.vm().calls.borrow().last().map(|c| Value::Object(c.callee));
        if let Some(callee) = &callee {
            self.track(callee);
        }
        callee
    }

    /// Arguments of the innermost active call
    pub fn current_arguments(&self) -> Vec<Value> {
        let args = self
            .vm()
            .calls
            .borrow()
            .last()
            .map(|c| c.args.clone())
            .unwrap_or_default();
        for arg in &args {
            self.track(arg);
        }
        args
    }

    // ========================================================================
    // Stack and evaluation
    // ========================================================================

    /// Update the position of the innermost frame
    pub fn set_source_position(&self, line: u32, column: u32) {
        if let Some(frame) = self.vm().frames.borrow_mut().last_mut() {
            frame.line = line;
            frame.column = column;
        }
    }

    /// Active frames, innermost first
    pub fn capture_frames(&self) -> Vec<StackFrame> {
        self.vm().frames.borrow().iter().rev().cloned().collect()
    }

    /// The current stack trace
    pub fn stack_trace(&self) -> StackTrace {
        StackTrace::current(self)
    }

    /// Source registered under `resource_name` by an earlier evaluation
    pub fn source(&self, resource_name: &str) -> Option<Rc<str>> {
        self.vm().sources.borrow().get(resource_name).cloned()
    }

    /// Evaluate source text with the installed evaluator
    pub fn evaluate(&self, source: &str, resource_name: &str) -> ScriptResult<Value> {
        let vm = self.vm();
        let evaluator = vm.evaluator.borrow().clone();
        let Some(evaluator) = evaluator else {
            return Err(self.throw_error(ErrorKind::Error, "No script evaluator installed"));
        };
        if vm.frames.borrow().len() >= vm.options.borrow().max_call_depth {
            return Err(self.throw_range_error("Maximum call stack size exceeded"));
        }
        vm.sources
            .borrow_mut()
            .insert(resource_name.to_string(), Rc::from(source));
        vm.frames.borrow_mut().push(StackFrame::eval(resource_name));
        let _frame = FrameGuard { vm };

        let result = evaluator.evaluate(self, source, resource_name);
        match &result {
            Ok(value) | Err(Thrown(value)) => self.track(value),
        }
        result
    }

    /// Run a full collection now
    pub fn collect_garbage(&self) -> GcCycle {
        self.vm().collect_garbage()
    }
}

fn string_char_at(s: &str, index: u32) -> Value {
    let unit = s.encode_utf16().nth(index as usize);
    match unit {
        Some(unit) => Value::String(Rc::from(String::from_utf16_lossy(&[unit]).as_str())),
        None => Value::Undefined,
    }
}

fn format_date(millis: f64) -> String {
    if !millis.is_finite() {
        return "Invalid Date".to_string();
    }
    match DateTime::from_timestamp_millis(millis as i64) {
        Some(dt) => dt
            .format("%a %b %d %Y %H:%M:%S GMT+0000 (Coordinated Universal Time)")
            .to_string(),
        None => "Invalid Date".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_scope(f: impl FnOnce(&Scope)) {
        let vm = VirtualMachine::new().unwrap();
        let context = vm.new_context();
        context.execute(f);
    }

    #[test]
    fn test_object_properties() {
        with_scope(|scope| {
            let obj = scope.new_object();
            scope.set(&obj, "a", Value::from(1)).unwrap();
            scope.set(&obj, "b", Value::from("x")).unwrap();
            assert_eq!(scope.get(&obj, "a").unwrap(), Value::from(1));
            assert!(scope.has(&obj, "b").unwrap());
            assert!(scope.delete(&obj, "b").unwrap());
            assert!(!scope.has(&obj, "b").unwrap());
            assert_eq!(scope.own_keys(&obj), vec!["a"]);
            assert!(scope.get(&obj, "missing").unwrap().is_undefined());
        });
    }

    #[test]
    fn test_nullish_property_access_throws() {
        with_scope(|scope| {
            let err = scope.get(&Value::Undefined, "x").unwrap_err();
            assert!(scope.is_error(err.value()));
            assert_eq!(
                scope.to_string(err.value()),
                "TypeError: Cannot read properties of undefined (reading 'x')"
            );
        });
    }

    #[test]
    fn test_array_length_and_indices() {
        with_scope(|scope| {
            let arr = scope.new_array(vec![Value::from(1), Value::from(2)]);
            assert_eq!(scope.get(&arr, "length").unwrap(), Value::from(2));
            scope.set_index(&arr, 4, Value::from(5)).unwrap();
            assert_eq!(scope.get(&arr, "length").unwrap(), Value::from(5));
            assert!(scope.get_index(&arr, 3).unwrap().is_undefined());
            scope.set(&arr, "length", Value::from(1)).unwrap();
            assert_eq!(scope.to_string(&arr), "1");
        });
    }

    #[test]
    fn test_accessor_and_readonly() {
        with_scope(|scope| {
            let obj = scope.new_object();
            let getter = scope.new_host_function("get", |_, _| Ok(Value::from(42)));
            scope
                .define_property(
                    &obj,
                    "answer",
                    PropertyDescriptor::Accessor {
                        getter: Some(getter),
                        setter: None,
                        enumerable: true,
                        configurable: false,
                    },
                )
                .unwrap();
            assert_eq!(scope.get(&obj, "answer").unwrap(), Value::from(42));
            scope.set(&obj, "answer", Value::from(1)).unwrap();
            assert_eq!(scope.get(&obj, "answer").unwrap(), Value::from(42));

            let redefine = scope.define_property(
                &obj,
                "answer",
                PropertyDescriptor::Data {
                    value: Value::Null,
                    writable: true,
                    enumerable: true,
                    configurable: true,
                },
            );
            assert!(redefine.is_err());
        });
    }

    #[test]
    fn test_call_and_construct() {
        with_scope(|scope| {
            let add = scope.new_host_function("add", |scope, inv| {
                Ok(Value::from(scope.to_double(&inv.arg(0)) + scope.to_double(&inv.arg(1))))
            });
            let sum = scope
                .call(&add, &Value::Undefined, &[Value::from(2), Value::from(3)])
                .unwrap();
            assert_eq!(sum, Value::from(5));
            assert!(scope.construct(&add, &[]).is_err());

            let point = scope.new_function(
                "Point",
                Rc::new(HostFunction::constructor(|scope, inv| {
                    scope.set(&inv.this, "x", inv.arg(0))?;
                    Ok(Value::Undefined)
                })),
            );
            let p = scope.construct(&point, &[Value::from(7)]).unwrap();
            assert_eq!(scope.get(&p, "x").unwrap(), Value::from(7));
            assert!(scope.instance_of(&p, &point).unwrap());
        });
    }

    #[test]
    fn test_call_depth_limit() {
        let options = crate::options::BridgeOptions {
            max_call_depth: 16,
            ..Default::default()
        };
        let vm = VirtualMachine::with_options(options).unwrap();
        vm.new_context().execute(|scope| {
            let recurse = scope.new_host_function("recurse", |scope, inv| {
                let callee = Value::Object(inv.callee);
                scope.call(&callee, &Value::Undefined, &[])
            });
            let err = scope.call(&recurse, &Value::Undefined, &[]).unwrap_err();
            assert_eq!(
                scope.to_string(err.value()),
                "RangeError: Maximum call stack size exceeded"
            );
            assert!(scope.capture_frames().is_empty());
        });
    }

    #[test]
    fn test_builtin_constructors() {
        with_scope(|scope| {
            let global = scope.global();
            let error_ctor = scope.get(&global, "TypeError").unwrap();
            let err = scope.construct(&error_ctor, &[Value::from("bad")]).unwrap();
            assert_eq!(scope.to_string(&err), "TypeError: bad");

            let error_base = scope.get(&global, "Error").unwrap();
            assert!(scope.instance_of(&err, &error_base).unwrap());

            let date_ctor = scope.get(&global, "Date").unwrap();
            let date = scope.construct(&date_ctor, &[Value::from(0)]).unwrap();
            assert!(scope.is_date(&date));
            assert_eq!(scope.to_double(&date), 0.0);
        });
    }

    #[test]
    fn test_loose_equality() {
        with_scope(|scope| {
            assert!(scope.loose_equals(&Value::from(1), &Value::from("1")));
            assert!(scope.loose_equals(&Value::Null, &Value::Undefined));
            assert!(scope.loose_equals(&Value::from(true), &Value::from(1)));
            assert!(!scope.loose_equals(&Value::Null, &Value::from(0)));
            let arr = scope.new_array(vec![Value::from(3)]);
            assert!(scope.loose_equals(&arr, &Value::from(3)));
            assert!(!scope.strict_equals(&arr, &Value::from(3)));
        });
    }

    #[test]
    fn test_evaluate_without_evaluator() {
        with_scope(|scope| {
            let err = scope.evaluate("1 + 1", "main.js").unwrap_err();
            assert_eq!(scope.to_string(err.value()), "Error: No script evaluator installed");
        });
    }

    #[test]
    fn test_evaluate_records_source_and_position() {
        let vm = VirtualMachine::new().unwrap();
        vm.set_evaluator(|scope: &Scope, _source: &str, _name: &str| -> ScriptResult<Value> {
            scope.set_source_position(3, 9);
            Err(scope.throw_error(ErrorKind::Error, "boom"))
        });
        vm.new_context().execute(|scope| {
            let err = scope.evaluate("throw 1", "demo.js").unwrap_err();
            assert_eq!(scope.source("demo.js").as_deref(), Some("throw 1"));
            let frames = scope
                .read(err.value().as_object().unwrap(), |o| match &o.kind {
                    ObjectKind::Error(data) => data.stack.clone(),
                    _ => Vec::new(),
                })
                .unwrap();
            assert_eq!(frames[0].line, 3);
            assert_eq!(frames[0].column, 9);
            assert_eq!(frames[0].script_name.as_deref(), Some("demo.js"));
        });
    }
}
