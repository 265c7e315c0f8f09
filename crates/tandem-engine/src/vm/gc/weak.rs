//! Weak callbacks
//!
//! A weak callback is attached to an object without keeping it alive. When
//! a collection frees the object, the callback is handed back to the
//! collector, which runs it after the sweep once no VM state is borrowed.

use super::heap::Heap;
use crate::vm::value::ObjectRef;

/// Finalizer run after its target was collected
pub(crate) type WeakCallback = Box<dyn FnOnce()>;

/// Registered weak callbacks
pub(crate) struct WeakRegistry {
    entries: Vec<(ObjectRef, WeakCallback)>,
}

impl WeakRegistry {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Attach a callback to `target`
    pub fn register(&mut self, target: ObjectRef, callback: WeakCallback) {
        self.entries.push((target, callback));
    }

    /// Remove and return the callbacks whose targets no longer resolve
    pub fn take_dead(&mut self, heap: &Heap) -> Vec<WeakCallback> {
        let (dead, live): (Vec<_>, Vec<_>) = self
            .entries
            .drain(..)
            .partition(|(target, _)| !heap.is_live(*target));
        self.entries = live;
        dead.into_iter().map(|(_, callback)| callback).collect()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::object::{HeapObject, ObjectKind};
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn test_callbacks_fire_for_dead_targets_only() {
        let mut heap = Heap::new();
        let kept = heap.allocate(HeapObject::new(ObjectKind::Ordinary, None));
        let dropped = heap.allocate(HeapObject::new(ObjectKind::Ordinary, None));

        let fired = Rc::new(Cell::new(0));
        let mut registry = WeakRegistry::new();
        for target in [kept, dropped] {
            let fired = Rc::clone(&fired);
            registry.register(target, Box::new(move || fired.set(fired.get() + 1)));
        }

        heap.mark([kept]);
        heap.sweep();

        let dead = registry.take_dead(&heap);
        assert_eq!(dead.len(), 1);
        assert_eq!(registry.len(), 1);
        for callback in dead {
            callback();
        }
        assert_eq!(fired.get(), 1);
    }
}
