//! Heap object layout
//!
//! Every heap object has an insertion-ordered property map, an optional
//! prototype and a kind-specific payload.

use std::mem;
use std::rc::{Rc, Weak};

use tandem_sdk::{NativeException, WeakNativeHandle};

use super::context::ContextState;
use super::function::HostCallable;
use super::interceptor::PropertyInterceptor;
use super::stack_trace::StackFrame;
use super::value::{ObjectRef, Value};

// ============================================================================
// Properties
// ============================================================================

/// Storage of a single property
#[derive(Debug, Clone)]
pub enum PropertySlot {
    /// Plain value
    Data {
        /// Stored value
        value: Value,
        /// Whether assignment replaces the value
        writable: bool,
    },
    /// Getter/setter pair
    Accessor {
        /// Getter function
        getter: Option<ObjectRef>,
        /// Setter function
        setter: Option<ObjectRef>,
    },
}

/// A property with its attributes
#[derive(Debug, Clone)]
pub struct Property {
    /// Value or accessor pair
    pub slot: PropertySlot,
    /// Listed by key enumeration
    pub enumerable: bool,
    /// May be deleted or redefined
    pub configurable: bool,
}

impl Property {
    /// Writable, enumerable, configurable data property
    pub fn data(value: Value) -> Self {
        Self {
            slot: PropertySlot::Data {
                value,
                writable: true,
            },
            enumerable: true,
            configurable: true,
        }
    }

    /// Writable, non-enumerable data property (methods, `constructor`)
    pub fn hidden(value: Value) -> Self {
        Self {
            enumerable: false,
            ..Self::data(value)
        }
    }
}

/// Insertion-ordered property storage
#[derive(Debug, Clone, Default)]
pub struct PropertyMap {
    entries: Vec<(Rc<str>, Property)>,
}

impl PropertyMap {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a property
    pub fn get(&self, key: &str) -> Option<&Property> {
        self.entries
            .iter()
            .find(|(k, _)| &**k == key)
            .map(|(_, p)| p)
    }

    /// Look up a property for mutation
    pub fn get_mut(&mut self, key: &str) -> Option<&mut Property> {
        self.entries
            .iter_mut()
            .find(|(k, _)| &**k == key)
            .map(|(_, p)| p)
    }

    /// Insert or replace a property, keeping its original position
    pub fn insert(&mut self, key: &str, property: Property) {
        match self.get_mut(key) {
            Some(existing) => *existing = property,
            None => self.entries.push((Rc::from(key), property)),
        }
    }

    /// Remove a property
    pub fn remove(&mut self, key: &str) -> Option<Property> {
        let pos = self.entries.iter().position(|(k, _)| &**k == key)?;
        Some(self.entries.remove(pos).1)
    }

    /// Whether the key is present
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Iterate entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&Rc<str>, &Property)> {
        self.entries.iter().map(|(k, p)| (k, p))
    }

    /// Number of properties
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn trace(&self, out: &mut Vec<ObjectRef>) {
        for (_, property) in &self.entries {
            match &property.slot {
                PropertySlot::Data { value, .. } => {
                    if let Value::Object(r) = value {
                        out.push(*r);
                    }
                }
                PropertySlot::Accessor { getter, setter } => {
                    out.extend(getter.iter().copied());
                    out.extend(setter.iter().copied());
                }
            }
        }
    }
}

/// Property definition passed to `define_property`
#[derive(Debug, Clone)]
pub enum PropertyDescriptor {
    /// Data property
    Data {
        /// Initial value
        value: Value,
        /// Writable attribute
        writable: bool,
        /// Enumerable attribute
        enumerable: bool,
        /// Configurable attribute
        configurable: bool,
    },
    /// Accessor property
    Accessor {
        /// Getter function
        getter: Option<Value>,
        /// Setter function
        setter: Option<Value>,
        /// Enumerable attribute
        enumerable: bool,
        /// Configurable attribute
        configurable: bool,
    },
}

// ============================================================================
// Objects
// ============================================================================

/// Built-in error constructors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// `Error`
    Error,
    /// `TypeError`
    TypeError,
    /// `RangeError`
    RangeError,
}

impl ErrorKind {
    /// Constructor name
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::Error => "Error",
            ErrorKind::TypeError => "TypeError",
            ErrorKind::RangeError => "RangeError",
        }
    }
}

/// Function payload
#[derive(Clone)]
pub struct FunctionData {
    /// Function name
    pub name: Rc<str>,
    /// Host implementation
    pub callable: Rc<dyn HostCallable>,
    /// Context the function was created in
    pub context: Weak<ContextState>,
}

/// Error payload
#[derive(Debug, Clone, Default)]
pub struct ErrorData {
    /// Stack captured at creation, innermost frame first
    pub stack: Vec<StackFrame>,
    /// Native exception this error was raised from
    pub native: Option<NativeException>,
}

/// Wrapper payload: the script-side half of a bridged native object
#[derive(Clone)]
pub struct WrapperData {
    /// The native object; the wrapper registry holds the strong reference
    pub native: WeakNativeHandle,
    /// Name of the native class, kept for diagnostics after release
    pub class_name: Rc<str>,
    /// Routes property access to the native object
    pub interceptor: Rc<dyn PropertyInterceptor>,
}

/// Kind-specific payload
pub enum ObjectKind {
    /// Plain object
    Ordinary,
    /// Dense array
    Array(Vec<Value>),
    /// Callable function
    Function(FunctionData),
    /// Error object
    Error(ErrorData),
    /// Date
    Date {
        /// Milliseconds since the epoch (NaN when invalid)
        millis: f64,
        /// Sub-millisecond remainder carried for native dates, not visible to scripts
        nanos: u32,
    },
    /// Regular expression source and flags
    RegExp {
        /// Pattern source
        pattern: Rc<str>,
        /// Flags
        flags: Rc<str>,
    },
    /// Byte buffer
    ArrayBuffer(Vec<u8>),
    /// Bridged native object
    Wrapper(WrapperData),
}

/// A heap-allocated object
pub struct HeapObject {
    /// Payload
    pub kind: ObjectKind,
    /// Own properties
    pub properties: PropertyMap,
    /// Prototype
    pub prototype: Option<ObjectRef>,
}

impl HeapObject {
    /// Create an object with no own properties
    pub fn new(kind: ObjectKind, prototype: Option<ObjectRef>) -> Self {
        Self {
            kind,
            properties: PropertyMap::new(),
            prototype,
        }
    }

    /// Push every object this one references
    pub(crate) fn trace(&self, out: &mut Vec<ObjectRef>) {
        out.extend(self.prototype);
        self.properties.trace(out);
        if let ObjectKind::Array(items) = &self.kind {
            out.extend(items.iter().filter_map(Value::as_object));
        }
    }

    /// Approximate retained size in bytes
    pub(crate) fn size_hint(&self) -> usize {
        let payload = match &self.kind {
            ObjectKind::Array(items) => items.capacity() * mem::size_of::<Value>(),
            ObjectKind::ArrayBuffer(bytes) => bytes.capacity(),
            ObjectKind::Error(data) => data.stack.len() * mem::size_of::<StackFrame>(),
            _ => 0,
        };
        mem::size_of::<HeapObject>()
            + self.properties.len() * mem::size_of::<(Rc<str>, Property)>()
            + payload
    }

    /// Kind name used in diagnostics
    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            ObjectKind::Ordinary => "object",
            ObjectKind::Array(_) => "array",
            ObjectKind::Function(_) => "function",
            ObjectKind::Error(_) => "error",
            ObjectKind::Date { .. } => "date",
            ObjectKind::RegExp { .. } => "regexp",
            ObjectKind::ArrayBuffer(_) => "arraybuffer",
            ObjectKind::Wrapper(_) => "wrapper",
        }
    }
}

/// Parse a canonical array index (`"0"`, `"17"`, not `"01"`)
pub(crate) fn array_index(key: &str) -> Option<u32> {
    if key.is_empty() || (key.len() > 1 && key.starts_with('0')) {
        return None;
    }
    if !key.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    key.parse::<u32>().ok().filter(|&i| i != u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_map_order() {
        let mut map = PropertyMap::new();
        map.insert("b", Property::data(Value::from(1)));
        map.insert("a", Property::data(Value::from(2)));
        map.insert("b", Property::data(Value::from(3)));

        let keys: Vec<_> = map.iter().map(|(k, _)| k.to_string()).collect();
        assert_eq!(keys, vec!["b", "a"]);
        assert!(matches!(
            map.get("b").map(|p| &p.slot),
            Some(PropertySlot::Data { value: Value::Number(n), .. }) if *n == 3.0
        ));

        assert!(map.remove("b").is_some());
        assert!(!map.contains("b"));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_trace_collects_references() {
        let proto = ObjectRef::new(0, 0);
        let child = ObjectRef::new(1, 0);
        let getter = ObjectRef::new(2, 0);
        let element = ObjectRef::new(3, 0);

        let mut obj = HeapObject::new(
            ObjectKind::Array(vec![Value::Object(element), Value::from(1)]),
            Some(proto),
        );
        obj.properties.insert("child", Property::data(Value::Object(child)));
        obj.properties.insert(
            "computed",
            Property {
                slot: PropertySlot::Accessor {
                    getter: Some(getter),
                    setter: None,
                },
                enumerable: false,
                configurable: true,
            },
        );

        let mut out = Vec::new();
        obj.trace(&mut out);
        out.sort();
        assert_eq!(out, vec![proto, child, getter, element]);
    }

    #[test]
    fn test_array_index() {
        assert_eq!(array_index("0"), Some(0));
        assert_eq!(array_index("42"), Some(42));
        assert_eq!(array_index("01"), None);
        assert_eq!(array_index("-1"), None);
        assert_eq!(array_index("length"), None);
        assert_eq!(array_index("4294967295"), None);
    }
}
