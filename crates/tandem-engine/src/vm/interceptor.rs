//! Property interception hooks
//!
//! Wrapper objects consult their interceptor before ordinary property
//! storage. Every hook reports whether it handled the access; an unhandled
//! access falls through to the object's own properties and prototype chain.

use super::function::ScriptResult;
use super::scope::Scope;
use super::value::{ObjectRef, Value};

/// Named and indexed property hooks of a wrapper object
pub trait PropertyInterceptor {
    /// Read `holder[key]`; `None` falls through
    fn get(&self, scope: &Scope, holder: ObjectRef, key: &str) -> ScriptResult<Option<Value>> {
        let _ = (scope, holder, key);
        Ok(None)
    }

    /// Write `holder[key]`; `false` falls through
    fn set(&self, scope: &Scope, holder: ObjectRef, key: &str, value: &Value) -> ScriptResult<bool> {
        let _ = (scope, holder, key, value);
        Ok(false)
    }

    /// Whether `key in holder`; `None` falls through
    fn query(&self, scope: &Scope, holder: ObjectRef, key: &str) -> Option<bool> {
        let _ = (scope, holder, key);
        None
    }

    /// Delete `holder[key]`; `None` falls through, `Some(result)` is the
    /// delete result
    fn delete(&self, scope: &Scope, holder: ObjectRef, key: &str) -> Option<bool> {
        let _ = (scope, holder, key);
        None
    }

    /// Read `holder[index]`; `None` falls through
    fn get_index(&self, scope: &Scope, holder: ObjectRef, index: u32) -> ScriptResult<Option<Value>> {
        let _ = (scope, holder, index);
        Ok(None)
    }

    /// Write `holder[index]`; `false` falls through
    fn set_index(
        &self,
        scope: &Scope,
        holder: ObjectRef,
        index: u32,
        value: &Value,
    ) -> ScriptResult<bool> {
        let _ = (scope, holder, index, value);
        Ok(false)
    }

    /// Whether `index in holder`; `None` falls through
    fn query_index(&self, scope: &Scope, holder: ObjectRef, index: u32) -> Option<bool> {
        let _ = (scope, holder, index);
        None
    }
}
