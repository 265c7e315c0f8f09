//! Wrapper registry
//!
//! Gives every native object (and native closure) one script-side identity
//! per context. The registry holds the native object strongly and the
//! wrapper weakly: when the collector frees the wrapper, a weak callback
//! removes the entry and releases the native object.

use std::rc::Rc;

use rustc_hash::FxHashMap;
use tandem_sdk::{native_id, NativeClosure, NativeHandle};
use tracing::trace;

use super::callback::BlockCallback;
use super::template::template_for;
use super::Fault;
use crate::error::DispatchError;
use crate::vm::gc::{Heap, RootSet};
use crate::vm::{HeapObject, ObjectKind, ObjectRef, Scope, Value, WrapperData};

/// Identity of a bridged native value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum NativeKey {
    /// Native object, by allocation address
    Object(usize),
    /// Native closure, by allocation address
    Closure(usize),
}

/// Strong holds on each native object across the registries of all live
/// contexts, keyed by `native_id`
pub(crate) type RegistryHolds = FxHashMap<usize, usize>;

/// One registry entry
pub(crate) struct WrapperEntry {
    wrapper: ObjectRef,
    /// Strong hold on the native object; closures are held by their
    /// function's callback instead
    native: Option<NativeHandle>,
}

/// Per-context map from native identity to script wrapper
pub(crate) struct WrapperMap {
    entries: FxHashMap<NativeKey, WrapperEntry>,
}

impl WrapperMap {
    pub fn new() -> Self {
        Self {
            entries: FxHashMap::default(),
        }
    }

    /// Wrapper registered for `key`
    pub fn get(&self, key: NativeKey) -> Option<ObjectRef> {
        self.entries.get(&key).map(|e| e.wrapper)
    }

    /// Register a wrapper. The replaced entry, if any, is returned so the
    /// caller can drop it outside the borrow.
    pub fn insert(
        &mut self,
        key: NativeKey,
        wrapper: ObjectRef,
        native: Option<NativeHandle>,
    ) -> Option<WrapperEntry> {
        self.entries.insert(key, WrapperEntry { wrapper, native })
    }

    /// Remove the entry for `key` if it still belongs to `wrapper`
    pub fn remove_if(&mut self, key: NativeKey, wrapper: ObjectRef) -> Option<WrapperEntry> {
        match self.entries.get(&key) {
            Some(entry) if entry.wrapper == wrapper => self.entries.remove(&key),
            _ => None,
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Add this registry's strong holds to `holds`
    pub fn count_holds(&self, holds: &mut RegistryHolds) {
        for entry in self.entries.values() {
            if let Some(native) = &entry.native {
                *holds.entry(native_id(native)).or_insert(0) += 1;
            }
        }
    }

    /// Root wrappers with own properties whose native object is also held
    /// outside every context's registry, so script-side state survives
    /// rewrapping
    pub fn trace(&self, heap: &Heap, holds: &RegistryHolds, roots: &mut RootSet) {
        for entry in self.entries.values() {
            let Some(native) = &entry.native else {
                continue;
            };
            let registry_holds = holds.get(&native_id(native)).copied().unwrap_or(1);
            if Rc::strong_count(native) <= registry_holds {
                continue;
            }
            let has_expando = heap
                .get(entry.wrapper)
                .is_some_and(|o| !o.properties.is_empty());
            if has_expando {
                roots.add(entry.wrapper);
            }
        }
    }
}

/// What a script value refers to on the native side
pub(crate) enum WrapperState {
    /// Not a wrapper
    NotAWrapper,
    /// A wrapper whose native object is gone
    Released(Rc<str>),
    /// A wrapper with its native object
    Live(NativeHandle),
}

/// Classify `value` as a wrapper
pub(crate) fn wrapper_state(scope: &Scope, value: &Value) -> WrapperState {
    let Value::Object(r) = value else {
        return WrapperState::NotAWrapper;
    };
    scope
        .read(*r, |o| match &o.kind {
            ObjectKind::Wrapper(w) => match w.native.upgrade() {
                Some(native) => WrapperState::Live(native),
                None => WrapperState::Released(Rc::clone(&w.class_name)),
            },
            _ => WrapperState::NotAWrapper,
        })
        .unwrap_or(WrapperState::NotAWrapper)
}

/// The native object behind a wrapper, if it is still alive
pub(crate) fn native_for_wrapper(scope: &Scope, value: &Value) -> Option<NativeHandle> {
    match wrapper_state(scope, value) {
        WrapperState::Live(native) => Some(native),
        _ => None,
    }
}

fn lookup(scope: &Scope, key: NativeKey) -> Option<Value> {
    let existing = scope.state().bridge.borrow().wrappers.get(key);
    // A wrapper freed by the last collection is a miss
    let wrapper = existing.filter(|r| scope.vm().is_live(*r))?;
    let value = Value::Object(wrapper);
    scope.track(&value);
    Some(value)
}

fn register(scope: &Scope, key: NativeKey, wrapper: ObjectRef, native: Option<NativeHandle>) {
    let replaced = scope
        .state()
        .bridge
        .borrow_mut()
        .wrappers
        .insert(key, wrapper, native);
    drop(replaced);

    let context = Rc::downgrade(scope.state());
    scope.vm().register_weak(
        wrapper,
        Box::new(move || {
            let Some(context) = context.upgrade() else {
                return;
            };
            let Ok(mut bridge) = context.bridge.try_borrow_mut() else {
                return;
            };
            let removed = bridge.wrappers.remove_if(key, wrapper);
            drop(bridge);
            if removed.is_some() {
                trace!(?key, "wrapper finalized");
            }
            drop(removed);
        }),
    );
}

/// The wrapper of `native` in the scope's context, created on first use
pub(crate) fn wrapper_for_native(scope: &Scope, native: &NativeHandle) -> Result<Value, Fault> {
    let key = NativeKey::Object(native_id(native));
    if let Some(existing) = lookup(scope, key) {
        return Ok(existing);
    }

    let class = native.class();
    let template = template_for(scope, &class)?;
    let wrapper = scope.alloc(HeapObject::new(
        ObjectKind::Wrapper(WrapperData {
            native: Rc::downgrade(native),
            class_name: Rc::from(class.name()),
            interceptor: template.interceptor(),
        }),
        Some(template.prototype),
    ));
    if let Value::Object(r) = wrapper {
        register(scope, key, r, Some(Rc::clone(native)));
    }
    trace!(class = class.name(), "wrapper created");
    Ok(wrapper)
}

/// The script function of `closure` in the scope's context, created on
/// first use
pub(crate) fn function_for_closure(scope: &Scope, closure: &NativeClosure) -> Result<Value, Fault> {
    let key = NativeKey::Closure(closure.id());
    if let Some(existing) = lookup(scope, key) {
        return Ok(existing);
    }
    if !closure.signature().is_marshalable() {
        return Err(DispatchError::UnsupportedSignature {
            name: "closure".to_string(),
            signature: closure.signature().to_string(),
        }
        .into());
    }

    let function = scope.new_function("", Rc::new(BlockCallback::new(closure.clone())));
    if let Value::Object(r) = function {
        register(scope, key, r, None);
    }
    trace!(signature = %closure.signature(), "closure function created");
    Ok(function)
}
