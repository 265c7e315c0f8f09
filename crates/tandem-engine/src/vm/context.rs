//! Execution contexts
//!
//! A context is one global-object environment inside the VM. It also owns
//! the bridge tables (wrapper registry and template cache) for the objects
//! bridged into it.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use tracing::debug;

use super::gc::{Heap, RootSet};
use super::intrinsics::Intrinsics;
use super::machine::{VirtualMachine, VmState};
use super::scope::Scope;
use super::value::ObjectRef;
use crate::bridge::{BridgeTables, RegistryHolds};

thread_local! {
    static CURRENT: RefCell<Vec<Weak<ContextState>>> = const { RefCell::new(Vec::new()) };
}

/// Shared state of a context
pub(crate) struct ContextState {
    pub id: u64,
    pub vm: Rc<VmState>,
    pub global: ObjectRef,
    pub intrinsics: Intrinsics,
    pub bridge: RefCell<BridgeTables>,
}

impl ContextState {
    /// Add the context's roots: global object, intrinsics, bridge tables
    pub fn trace_roots(&self, heap: &Heap, holds: &RegistryHolds, roots: &mut RootSet) {
        roots.add(self.global);
        roots.extend(self.intrinsics.all());
        self.bridge.borrow().trace(heap, holds, roots);
    }
}

/// Handle to an execution context
#[derive(Clone)]
pub struct Context {
    pub(crate) state: Rc<ContextState>,
}

impl Context {
    /// Create a context in `vm`
    pub fn new(vm: &VirtualMachine) -> Context {
        let vm_state = Rc::clone(&vm.state);
        let id = vm_state.next_id();
        let state = Rc::new_cyclic(|weak: &Weak<ContextState>| {
            let (intrinsics, global) = Intrinsics::create(&vm_state, weak);
            ContextState {
                id,
                vm: Rc::clone(&vm_state),
                global,
                intrinsics,
                bridge: RefCell::new(BridgeTables::new()),
            }
        });
        vm_state.contexts.borrow_mut().push(Rc::downgrade(&state));
        debug!(context = id, "context created");
        Context { state }
    }

    /// The owning virtual machine
    pub fn virtual_machine(&self) -> VirtualMachine {
        VirtualMachine::from_state(Rc::clone(&self.state.vm))
    }

    /// Context identifier, unique within the VM
    pub fn id(&self) -> u64 {
        self.state.id
    }

    /// Run `f` inside a scoped execution region.
    ///
    /// Script values may only be created or touched through the scope, and
    /// must not be kept after `f` returns; use a managed value for that.
    /// Regions nest, including across contexts.
    pub fn execute<R>(&self, f: impl FnOnce(&Scope) -> R) -> R {
        let _region = Region::enter(&self.state);
        let scope = Scope::new(self.clone());
        f(&scope)
    }

    /// The context of the innermost active region on this thread
    pub fn current() -> Option<Context> {
        CURRENT.with(|stack| {
            stack
                .borrow()
                .last()
                .and_then(Weak::upgrade)
                .map(|state| Context { state })
        })
    }

    /// Whether both handles refer to the same context
    pub fn ptr_eq(&self, other: &Context) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }
}

/// An entered region: a handle frame plus the thread's current context.
/// Leaving happens on drop, also during unwinding.
pub(crate) struct Region<'a> {
    state: &'a Rc<ContextState>,
}

impl<'a> Region<'a> {
    pub fn enter(state: &'a Rc<ContextState>) -> Self {
        state.vm.enter_region();
        CURRENT.with(|stack| stack.borrow_mut().push(Rc::downgrade(state)));
        Region { state }
    }
}

impl Drop for Region<'_> {
    fn drop(&mut self) {
        let _ = CURRENT.try_with(|stack| stack.borrow_mut().pop());
        self.state.vm.exit_region();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_context_tracks_regions() {
        let vm = VirtualMachine::new().unwrap();
        let outer = vm.new_context();
        let inner = vm.new_context();
        assert!(Context::current().is_none());

        outer.execute(|_| {
            assert!(Context::current().unwrap().ptr_eq(&outer));
            inner.execute(|_| {
                assert!(Context::current().unwrap().ptr_eq(&inner));
            });
            assert!(Context::current().unwrap().ptr_eq(&outer));
        });
        assert!(Context::current().is_none());
    }

    #[test]
    fn test_context_ids_are_distinct() {
        let vm = VirtualMachine::new().unwrap();
        let a = vm.new_context();
        let b = vm.new_context();
        assert_ne!(a.id(), b.id());
        assert!(a.virtual_machine().ptr_eq(&vm));
    }
}
