//! Object heap
//!
//! Objects live in generation-tagged slots. Freeing a slot bumps its
//! generation, so references to the old occupant stop resolving.

use crate::vm::object::HeapObject;
use crate::vm::value::ObjectRef;

struct Slot {
    generation: u32,
    marked: bool,
    object: Option<HeapObject>,
}

/// Heap statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// Live objects
    pub live_objects: usize,
    /// Approximate bytes held by live objects
    pub live_bytes: usize,
    /// Total slots (live and free)
    pub capacity: usize,
    /// Slots waiting for reuse
    pub free_slots: usize,
}

/// Slot-based object heap
pub(crate) struct Heap {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl Heap {
    /// Create an empty heap
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }

    /// Store an object and return its reference
    pub fn allocate(&mut self, object: HeapObject) -> ObjectRef {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.object = Some(object);
            slot.marked = false;
            return ObjectRef::new(index, slot.generation);
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            marked: false,
            object: Some(object),
        });
        ObjectRef::new(index, 0)
    }

    fn slot(&self, r: ObjectRef) -> Option<&Slot> {
        self.slots
            .get(r.index() as usize)
            .filter(|s| s.generation == r.generation() && s.object.is_some())
    }

    /// Resolve a reference
    pub fn get(&self, r: ObjectRef) -> Option<&HeapObject> {
        self.slot(r).and_then(|s| s.object.as_ref())
    }

    /// Resolve a reference for mutation
    pub fn get_mut(&mut self, r: ObjectRef) -> Option<&mut HeapObject> {
        self.slots
            .get_mut(r.index() as usize)
            .filter(|s| s.generation == r.generation())
            .and_then(|s| s.object.as_mut())
    }

    /// Whether the reference still resolves
    pub fn is_live(&self, r: ObjectRef) -> bool {
        self.slot(r).is_some()
    }

    /// Number of live objects
    pub fn len(&self) -> usize {
        self.live
    }

    /// Mark everything reachable from `roots`; returns the number marked
    pub fn mark(&mut self, roots: impl IntoIterator<Item = ObjectRef>) -> usize {
        let mut worklist: Vec<ObjectRef> = roots.into_iter().collect();
        let mut marked = 0;
        while let Some(r) = worklist.pop() {
            let Some(slot) = self.slots.get_mut(r.index() as usize) else {
                continue;
            };
            if slot.generation != r.generation() || slot.marked {
                continue;
            }
            let Some(object) = slot.object.as_ref() else {
                continue;
            };
            slot.marked = true;
            marked += 1;
            object.trace(&mut worklist);
        }
        marked
    }

    /// Free every unmarked object and clear marks.
    ///
    /// The freed objects are returned so the caller can drop them once no
    /// borrow of the heap is held.
    pub fn sweep(&mut self) -> Vec<HeapObject> {
        let mut garbage = Vec::new();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.object.is_none() {
                continue;
            }
            if slot.marked {
                slot.marked = false;
                continue;
            }
            if let Some(object) = slot.object.take() {
                garbage.push(object);
            }
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(index as u32);
        }
        self.live -= garbage.len();
        garbage
    }

    /// Current statistics
    pub fn stats(&self) -> HeapStats {
        HeapStats {
            live_objects: self.live,
            live_bytes: self
                .slots
                .iter()
                .filter_map(|s| s.object.as_ref())
                .map(HeapObject::size_hint)
                .sum(),
            capacity: self.slots.len(),
            free_slots: self.free.len(),
        }
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::object::{ObjectKind, Property};
    use crate::vm::value::Value;

    fn ordinary() -> HeapObject {
        HeapObject::new(ObjectKind::Ordinary, None)
    }

    #[test]
    fn test_allocate_and_get() {
        let mut heap = Heap::new();
        let a = heap.allocate(ordinary());
        let b = heap.allocate(ordinary());
        assert_ne!(a, b);
        assert!(heap.get(a).is_some());
        assert_eq!(heap.len(), 2);
    }

    #[test]
    fn test_mark_and_sweep() {
        let mut heap = Heap::new();
        let root = heap.allocate(ordinary());
        let child = heap.allocate(ordinary());
        let garbage = heap.allocate(ordinary());
        heap.get_mut(root)
            .unwrap()
            .properties
            .insert("child", Property::data(Value::Object(child)));

        assert_eq!(heap.mark([root]), 2);
        let freed = heap.sweep();
        assert_eq!(freed.len(), 1);
        assert!(heap.is_live(root));
        assert!(heap.is_live(child));
        assert!(!heap.is_live(garbage));
        assert_eq!(heap.len(), 2);
    }

    #[test]
    fn test_stale_reference_after_reuse() {
        let mut heap = Heap::new();
        let old = heap.allocate(ordinary());
        heap.mark(std::iter::empty());
        heap.sweep();

        let new = heap.allocate(ordinary());
        assert_eq!(old.index(), new.index());
        assert_ne!(old.generation(), new.generation());
        assert!(heap.get(old).is_none());
        assert!(heap.get_mut(old).is_none());
        assert!(heap.get(new).is_some());
    }

    #[test]
    fn test_cycles_are_collected() {
        let mut heap = Heap::new();
        let a = heap.allocate(ordinary());
        let b = heap.allocate(ordinary());
        heap.get_mut(a).unwrap().prototype = Some(b);
        heap.get_mut(b).unwrap().prototype = Some(a);

        assert_eq!(heap.mark(std::iter::empty()), 0);
        assert_eq!(heap.sweep().len(), 2);
        assert_eq!(heap.stats().free_slots, 2);
    }
}
