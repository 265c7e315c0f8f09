//! Script values
//!
//! Primitives are stored inline; objects are referenced through an
//! [`ObjectRef`], a generational index into the heap. A reference whose
//! slot was freed (or freed and reused) no longer resolves, so stale
//! references read as absent instead of touching another object.

use std::fmt;
use std::rc::Rc;

/// Generational reference to a heap object
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef {
    index: u32,
    generation: u32,
}

impl ObjectRef {
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Slot index
    pub fn index(self) -> u32 {
        self.index
    }

    /// Slot generation at allocation time
    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

/// A script value
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
    /// `undefined`
    #[default]
    Undefined,
    /// `null`
    Null,
    /// Boolean
    Bool(bool),
    /// Number (IEEE 754 double)
    Number(f64),
    /// Immutable string
    String(Rc<str>),
    /// Heap object
    Object(ObjectRef),
}

impl Value {
    /// Create a string value
    pub fn string(s: &str) -> Value {
        Value::String(Rc::from(s))
    }

    /// Check if undefined
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Check if null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Check if null or undefined
    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    /// Check if boolean
    pub fn is_boolean(&self) -> bool {
        matches!(self, Value::Bool(_))
    }

    /// Check if number
    pub fn is_number(&self) -> bool {
        matches!(self, Value::Number(_))
    }

    /// Check if string
    pub fn is_string(&self) -> bool {
        matches!(self, Value::String(_))
    }

    /// Check if object
    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    /// Object reference, if this is an object
    pub fn as_object(&self) -> Option<ObjectRef> {
        match self {
            Value::Object(r) => Some(*r),
            _ => None,
        }
    }

    /// Number payload
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Boolean payload
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// String payload
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Strict equality (`===`)
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<ObjectRef> for Value {
    fn from(r: ObjectRef) -> Self {
        Value::Object(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_equals() {
        assert!(Value::Undefined.strict_equals(&Value::Undefined));
        assert!(!Value::Undefined.strict_equals(&Value::Null));
        assert!(Value::from(1.5).strict_equals(&Value::Number(1.5)));
        assert!(!Value::Number(f64::NAN).strict_equals(&Value::Number(f64::NAN)));
        assert!(Value::from("a").strict_equals(&Value::string("a")));
        assert!(!Value::from("1").strict_equals(&Value::from(1)));

        let a = ObjectRef::new(3, 1);
        let b = ObjectRef::new(3, 2);
        assert!(Value::Object(a).strict_equals(&Value::Object(a)));
        assert!(!Value::Object(a).strict_equals(&Value::Object(b)));
    }

    #[test]
    fn test_accessors() {
        assert!(Value::Null.is_nullish());
        assert!(Value::Undefined.is_nullish());
        assert!(!Value::Bool(false).is_nullish());
        assert_eq!(Value::from(true).as_bool(), Some(true));
        assert_eq!(Value::from("x").as_str(), Some("x"));
        assert_eq!(Value::from(ObjectRef::new(1, 0)).as_object(), Some(ObjectRef::new(1, 0)));
    }
}
