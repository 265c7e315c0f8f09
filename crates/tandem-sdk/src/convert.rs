//! Typed access to native values
//!
//! Method bodies receive `&[NativeValue]`; [`arg`] extracts a typed argument
//! and reports a `NativeException` when the argument has the wrong kind.

use chrono::{DateTime, Utc};

use crate::closure::NativeClosure;
use crate::error::NativeException;
use crate::object::NativeHandle;
use crate::value::NativeValue;

/// Extract a Rust value from a native value
pub trait FromNative: Sized {
    /// Convert, failing when the value has the wrong kind
    fn from_native(value: &NativeValue) -> Result<Self, NativeException>;
}

/// Turn a Rust value into a native value
pub trait IntoNative {
    /// Convert
    fn into_native(self) -> NativeValue;
}

/// Extract argument `index` as `T`
pub fn arg<T: FromNative>(args: &[NativeValue], index: usize) -> Result<T, NativeException> {
    let value = args.get(index).ok_or_else(|| {
        NativeException::invalid_argument(format!("missing argument {}", index))
    })?;
    T::from_native(value).map_err(|e| {
        NativeException::invalid_argument(format!("argument {}: {}", index, e.reason))
    })
}

fn mismatch(expected: &str, value: &NativeValue) -> NativeException {
    NativeException::invalid_argument(format!(
        "expected {}, found {}",
        expected,
        value.kind_name()
    ))
}

impl FromNative for NativeValue {
    fn from_native(value: &NativeValue) -> Result<Self, NativeException> {
        Ok(value.clone())
    }
}

impl FromNative for f64 {
    fn from_native(value: &NativeValue) -> Result<Self, NativeException> {
        value.as_f64().ok_or_else(|| mismatch("number", value))
    }
}

impl FromNative for i32 {
    fn from_native(value: &NativeValue) -> Result<Self, NativeException> {
        f64::from_native(value).map(|n| n as i32)
    }
}

impl FromNative for i64 {
    fn from_native(value: &NativeValue) -> Result<Self, NativeException> {
        f64::from_native(value).map(|n| n as i64)
    }
}

impl FromNative for u32 {
    fn from_native(value: &NativeValue) -> Result<Self, NativeException> {
        f64::from_native(value).map(|n| n as u32)
    }
}

impl FromNative for usize {
    fn from_native(value: &NativeValue) -> Result<Self, NativeException> {
        f64::from_native(value).map(|n| n as usize)
    }
}

impl FromNative for bool {
    fn from_native(value: &NativeValue) -> Result<Self, NativeException> {
        value.as_bool().ok_or_else(|| mismatch("boolean", value))
    }
}

impl FromNative for String {
    fn from_native(value: &NativeValue) -> Result<Self, NativeException> {
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| mismatch("string", value))
    }
}

impl FromNative for NativeHandle {
    fn from_native(value: &NativeValue) -> Result<Self, NativeException> {
        value.as_object().cloned().ok_or_else(|| mismatch("object", value))
    }
}

impl FromNative for NativeClosure {
    fn from_native(value: &NativeValue) -> Result<Self, NativeException> {
        value
            .as_closure()
            .cloned()
            .ok_or_else(|| mismatch("closure", value))
    }
}

impl FromNative for DateTime<Utc> {
    fn from_native(value: &NativeValue) -> Result<Self, NativeException> {
        match value {
            NativeValue::Date(date) => Ok(*date),
            other => Err(mismatch("date", other)),
        }
    }
}

impl<T: FromNative> FromNative for Option<T> {
    fn from_native(value: &NativeValue) -> Result<Self, NativeException> {
        if value.is_nil_or_null() {
            Ok(None)
        } else {
            T::from_native(value).map(Some)
        }
    }
}

impl<T: FromNative> FromNative for Vec<T> {
    fn from_native(value: &NativeValue) -> Result<Self, NativeException> {
        match value {
            NativeValue::Array(items) => items.iter().map(T::from_native).collect(),
            other => Err(mismatch("array", other)),
        }
    }
}

impl<T: Into<NativeValue>> IntoNative for T {
    fn into_native(self) -> NativeValue {
        self.into()
    }
}

impl From<()> for NativeValue {
    fn from(_: ()) -> Self {
        NativeValue::Nil
    }
}

impl From<u32> for NativeValue {
    fn from(n: u32) -> Self {
        NativeValue::Number(n as f64)
    }
}

impl From<i64> for NativeValue {
    fn from(n: i64) -> Self {
        NativeValue::Number(n as f64)
    }
}

impl From<usize> for NativeValue {
    fn from(n: usize) -> Self {
        NativeValue::Number(n as f64)
    }
}

impl<T: Into<NativeValue>> From<Option<T>> for NativeValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(NativeValue::Nil, Into::into)
    }
}
