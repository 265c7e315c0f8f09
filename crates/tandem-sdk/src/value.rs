//! Native values
//!
//! [`NativeValue`] is what native methods and closures receive and return.
//! Data kinds compare structurally; objects, classes, closures and script
//! tokens compare by identity.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use chrono::{DateTime, Utc};

use crate::class::ClassDescriptor;
use crate::closure::NativeClosure;
use crate::object::{native_id, NativeHandle};
use crate::selector::Selector;

/// Opaque script value passed through a `V` slot without conversion.
///
/// The bridge stores its own value type inside; native code hands it back
/// unchanged.
#[derive(Clone)]
pub struct ScriptToken(Rc<dyn Any>);

impl ScriptToken {
    /// Wrap a value
    pub fn new<T: 'static>(value: T) -> Self {
        ScriptToken(Rc::new(value))
    }

    /// Borrow the wrapped value
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    /// Whether both tokens share the same allocation
    pub fn ptr_eq(&self, other: &ScriptToken) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

/// A value of the native object system
#[derive(Clone, Default)]
pub enum NativeValue {
    /// Absence of a value
    #[default]
    Nil,
    /// Explicit null marker
    Null,
    /// Boolean
    Bool(bool),
    /// Any numeric value
    Number(f64),
    /// Text
    String(String),
    /// Ordered collection
    Array(Vec<NativeValue>),
    /// Keyed mapping, in insertion order
    Dictionary(Vec<(NativeValue, NativeValue)>),
    /// Calendar timestamp
    Date(DateTime<Utc>),
    /// Byte buffer
    Data(Vec<u8>),
    /// Native closure
    Closure(NativeClosure),
    /// Native object
    Object(NativeHandle),
    /// Native class
    Class(Rc<ClassDescriptor>),
    /// Method selector
    Selector(Selector),
    /// Unconverted script value
    Script(ScriptToken),
}

impl NativeValue {
    /// Build a dictionary from string keys
    pub fn dictionary<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, NativeValue)>,
    {
        NativeValue::Dictionary(
            entries
                .into_iter()
                .map(|(k, v)| (NativeValue::String(k.into()), v))
                .collect(),
        )
    }

    /// Whether the value is `Nil`
    pub fn is_nil(&self) -> bool {
        matches!(self, NativeValue::Nil)
    }

    /// Whether the value is `Nil` or `Null`
    pub fn is_nil_or_null(&self) -> bool {
        matches!(self, NativeValue::Nil | NativeValue::Null)
    }

    /// Number payload
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            NativeValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Boolean payload
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            NativeValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// String payload
    pub fn as_str(&self) -> Option<&str> {
        match self {
            NativeValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Array payload
    pub fn as_array(&self) -> Option<&[NativeValue]> {
        match self {
            NativeValue::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Object payload
    pub fn as_object(&self) -> Option<&NativeHandle> {
        match self {
            NativeValue::Object(handle) => Some(handle),
            _ => None,
        }
    }

    /// Closure payload
    pub fn as_closure(&self) -> Option<&NativeClosure> {
        match self {
            NativeValue::Closure(closure) => Some(closure),
            _ => None,
        }
    }

    /// Look up a string key in a dictionary
    pub fn get(&self, key: &str) -> Option<&NativeValue> {
        match self {
            NativeValue::Dictionary(entries) => entries
                .iter()
                .find(|(k, _)| k.as_str() == Some(key))
                .map(|(_, v)| v),
            _ => None,
        }
    }

    /// Kind name used in diagnostics
    pub fn kind_name(&self) -> &'static str {
        match self {
            NativeValue::Nil => "nil",
            NativeValue::Null => "null",
            NativeValue::Bool(_) => "boolean",
            NativeValue::Number(_) => "number",
            NativeValue::String(_) => "string",
            NativeValue::Array(_) => "array",
            NativeValue::Dictionary(_) => "dictionary",
            NativeValue::Date(_) => "date",
            NativeValue::Data(_) => "data",
            NativeValue::Closure(_) => "closure",
            NativeValue::Object(_) => "object",
            NativeValue::Class(_) => "class",
            NativeValue::Selector(_) => "selector",
            NativeValue::Script(_) => "script value",
        }
    }
}

impl PartialEq for NativeValue {
    fn eq(&self, other: &Self) -> bool {
        use NativeValue::*;
        match (self, other) {
            (Nil, Nil) | (Null, Null) => true,
            (Bool(a), Bool(b)) => a == b,
            (Number(a), Number(b)) => a == b,
            (String(a), String(b)) => a == b,
            (Array(a), Array(b)) => a == b,
            (Dictionary(a), Dictionary(b)) => a == b,
            (Date(a), Date(b)) => a == b,
            (Data(a), Data(b)) => a == b,
            (Closure(a), Closure(b)) => a.ptr_eq(b),
            (Object(a), Object(b)) => native_id(a) == native_id(b),
            (Class(a), Class(b)) => a.id() == b.id(),
            (Selector(a), Selector(b)) => a == b,
            (Script(a), Script(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Debug for NativeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeValue::Nil => f.write_str("nil"),
            NativeValue::Null => f.write_str("null"),
            NativeValue::Bool(b) => write!(f, "{}", b),
            NativeValue::Number(n) => write!(f, "{}", n),
            NativeValue::String(s) => write!(f, "{:?}", s),
            NativeValue::Array(items) => f.debug_list().entries(items).finish(),
            NativeValue::Dictionary(entries) => f
                .debug_map()
                .entries(entries.iter().map(|(k, v)| (k, v)))
                .finish(),
            NativeValue::Date(date) => write!(f, "{}", date.to_rfc3339()),
            NativeValue::Data(bytes) => write!(f, "<{} bytes>", bytes.len()),
            NativeValue::Closure(closure) => write!(f, "{:?}", closure),
            NativeValue::Object(handle) => {
                write!(f, "<{} {:#x}>", handle.class().name(), native_id(handle))
            }
            NativeValue::Class(class) => write!(f, "{}", class.name()),
            NativeValue::Selector(sel) => write!(f, "{:?}", sel),
            NativeValue::Script(_) => f.write_str("<script value>"),
        }
    }
}

impl From<bool> for NativeValue {
    fn from(b: bool) -> Self {
        NativeValue::Bool(b)
    }
}

impl From<f64> for NativeValue {
    fn from(n: f64) -> Self {
        NativeValue::Number(n)
    }
}

impl From<i32> for NativeValue {
    fn from(n: i32) -> Self {
        NativeValue::Number(n as f64)
    }
}

impl From<&str> for NativeValue {
    fn from(s: &str) -> Self {
        NativeValue::String(s.to_string())
    }
}

impl From<String> for NativeValue {
    fn from(s: String) -> Self {
        NativeValue::String(s)
    }
}

impl From<NativeHandle> for NativeValue {
    fn from(handle: NativeHandle) -> Self {
        NativeValue::Object(handle)
    }
}

impl From<NativeClosure> for NativeValue {
    fn from(closure: NativeClosure) -> Self {
        NativeValue::Closure(closure)
    }
}

impl From<DateTime<Utc>> for NativeValue {
    fn from(date: DateTime<Utc>) -> Self {
        NativeValue::Date(date)
    }
}

impl From<Vec<NativeValue>> for NativeValue {
    fn from(items: Vec<NativeValue>) -> Self {
        NativeValue::Array(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::ClassBuilder;
    use crate::object::Instance;
    use chrono::TimeZone;

    #[test]
    fn test_structural_equality() {
        let a = NativeValue::Array(vec![1.into(), "two".into(), true.into()]);
        let b = NativeValue::Array(vec![1.into(), "two".into(), true.into()]);
        assert_eq!(a, b);
        assert_ne!(NativeValue::Nil, NativeValue::Null);
        assert_ne!(NativeValue::Number(f64::NAN), NativeValue::Number(f64::NAN));

        let date = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        assert_eq!(NativeValue::Date(date), NativeValue::from(date));
    }

    #[test]
    fn test_identity_equality() {
        let class = ClassBuilder::new("Thing").build();
        let a = Instance::create(&class, ());
        let b = Instance::create(&class, ());
        assert_eq!(NativeValue::Object(a.clone()), NativeValue::Object(a));
        assert_ne!(
            NativeValue::Object(b),
            NativeValue::Object(Instance::create(&class, ()))
        );

        let token = ScriptToken::new(5u32);
        assert_eq!(NativeValue::Script(token.clone()), NativeValue::Script(token));
        assert_ne!(
            NativeValue::Script(ScriptToken::new(5u32)),
            NativeValue::Script(ScriptToken::new(5u32))
        );
    }

    #[test]
    fn test_dictionary_lookup() {
        let dict = NativeValue::dictionary([("a", 1.into()), ("b", "x".into())]);
        assert_eq!(dict.get("b"), Some(&NativeValue::from("x")));
        assert_eq!(dict.get("c"), None);
        assert_eq!(dict.kind_name(), "dictionary");
    }
}
