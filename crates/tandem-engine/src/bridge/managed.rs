//! Managed values
//!
//! A [`ManagedValue`] lets native code keep a script value beyond a scoped
//! region. It does not keep the value alive by itself; each native owner
//! added through [`VirtualMachine::add_managed_reference`] does, until the
//! owner is removed or released.

use std::rc::{Rc, Weak};

use tandem_sdk::NativeHandle;
use tracing::trace;

use crate::vm::{Scope, Value, VirtualMachine, VmState};

/// A native-side hold on a script value
pub struct ManagedValue {
    id: u64,
    vm: Weak<VmState>,
    value: Value,
}

impl ManagedValue {
    /// Hold `value` without owners; it is collectible until one is added
    pub fn new(scope: &Scope, value: &Value) -> Self {
        let vm = &scope.state().vm;
        Self {
            id: vm.next_id(),
            vm: Rc::downgrade(vm),
            value: value.clone(),
        }
    }

    /// Hold `value` on behalf of `owner`
    pub fn with_owner(scope: &Scope, value: &Value, owner: &NativeHandle) -> Self {
        let managed = Self::new(scope, value);
        scope
            .virtual_machine()
            .add_managed_reference(&managed, owner);
        managed
    }

    /// Identifier, unique within the VM
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The value, or `None` once it was collected or when `scope` belongs
    /// to another VM
    pub fn value(&self, scope: &Scope) -> Option<Value> {
        let same_vm = self
            .vm
            .upgrade()
            .is_some_and(|vm| Rc::ptr_eq(&vm, &scope.state().vm));
        if !same_vm || !scope.is_live(&self.value) {
            return None;
        }
        scope.track(&self.value);
        Some(self.value.clone())
    }

    /// Whether the value can still be read
    pub fn is_alive(&self) -> bool {
        match (&self.value, self.vm.upgrade()) {
            (_, None) => false,
            (Value::Object(r), Some(vm)) => vm.is_live(*r),
            (_, Some(_)) => true,
        }
    }

    /// Number of live owners
    pub fn owner_count(&self) -> usize {
        self.vm
            .upgrade()
            .map_or(0, |vm| vm.persistent.borrow().owner_count(self.id))
    }
}

impl Drop for ManagedValue {
    fn drop(&mut self) {
        let Some(vm) = self.vm.upgrade() else {
            return;
        };
        if let Ok(mut persistent) = vm.persistent.try_borrow_mut() {
            persistent.remove(self.id);
        };
    }
}

impl std::fmt::Debug for ManagedValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedValue")
            .field("id", &self.id)
            .field("value", &self.value)
            .finish()
    }
}

impl VirtualMachine {
    /// Keep `managed` alive while `owner` is alive. Returns false when
    /// `owner` already owns it, or the value is a primitive, collected, or
    /// from another VM.
    pub fn add_managed_reference(&self, managed: &ManagedValue, owner: &NativeHandle) -> bool {
        let Value::Object(target) = managed.value else {
            return false;
        };
        let same_vm = managed
            .vm
            .upgrade()
            .is_some_and(|vm| Rc::ptr_eq(&vm, &self.state));
        if !same_vm || !self.state.is_live(target) {
            return false;
        }
        let added = self
            .state
            .persistent
            .borrow_mut()
            .add_owner(managed.id, target, owner);
        trace!(id = managed.id, added, "managed reference added");
        added
    }

    /// Drop `owner`'s hold on `managed`. After the last owner is gone the
    /// value may be collected.
    pub fn remove_managed_reference(&self, managed: &ManagedValue, owner: &NativeHandle) -> bool {
        let removed = self
            .state
            .persistent
            .borrow_mut()
            .remove_owner(managed.id, owner);
        trace!(id = managed.id, removed, "managed reference removed");
        removed
    }
}
