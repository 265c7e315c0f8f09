//! GC root tracking
//!
//! Roots are the starting points of the mark phase:
//! - Handle frames of open scoped regions and calls
//! - Global objects and bridge tables of live contexts
//! - Active call records
//! - Persistent (owned) values

use std::rc::Rc;

use rustc_hash::FxHashMap;
use tandem_sdk::{native_id, NativeHandle, WeakNativeHandle};

use crate::vm::value::{ObjectRef, Value};

/// Root set for one collection
pub(crate) struct RootSet {
    roots: Vec<ObjectRef>,
}

impl RootSet {
    /// Create a new root set
    pub fn new() -> Self {
        Self { roots: Vec::new() }
    }

    /// Add a value; primitives are ignored
    pub fn add_value(&mut self, value: &Value) {
        if let Value::Object(r) = value {
            self.roots.push(*r);
        }
    }

    /// Add an object reference
    pub fn add(&mut self, r: ObjectRef) {
        self.roots.push(r);
    }

    /// Add several references
    pub fn extend(&mut self, refs: impl IntoIterator<Item = ObjectRef>) {
        self.roots.extend(refs);
    }

    /// Get total number of roots
    pub fn len(&self) -> usize {
        self.roots.len()
    }

    /// Consume into the root list
    pub fn into_vec(self) -> Vec<ObjectRef> {
        self.roots
    }
}

impl Default for RootSet {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Handle frames
// ============================================================================

/// Stack of handle frames.
///
/// Each scoped region and each call pushes a frame; every object handed
/// out through the scope API is recorded in the innermost frame and stays
/// reachable until that frame is popped.
pub(crate) struct HandleStack {
    frames: Vec<Vec<ObjectRef>>,
}

impl HandleStack {
    pub fn new() -> Self {
        Self { frames: Vec::new() }
    }

    pub fn push_frame(&mut self) {
        self.frames.push(Vec::new());
    }

    pub fn pop_frame(&mut self) {
        self.frames.pop();
    }

    /// Record a reference in the innermost frame
    pub fn record(&mut self, r: ObjectRef) {
        if let Some(frame) = self.frames.last_mut() {
            frame.push(r);
        }
    }

    #[cfg(test)]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn trace(&self, roots: &mut RootSet) {
        for frame in &self.frames {
            roots.extend(frame.iter().copied());
        }
    }
}

// ============================================================================
// Persistent roots
// ============================================================================

struct PersistentEntry {
    target: ObjectRef,
    owners: Vec<(usize, WeakNativeHandle)>,
}

/// Values kept alive on behalf of native owners.
///
/// An entry is a root while at least one owner is alive. Owners are held
/// weakly; dead owners are pruned on every collection.
pub(crate) struct PersistentRoots {
    entries: FxHashMap<u64, PersistentEntry>,
}

impl PersistentRoots {
    pub fn new() -> Self {
        Self {
            entries: FxHashMap::default(),
        }
    }

    /// Add an owner for `id`; returns false if it was already an owner
    pub fn add_owner(&mut self, id: u64, target: ObjectRef, owner: &NativeHandle) -> bool {
        let entry = self.entries.entry(id).or_insert_with(|| PersistentEntry {
            target,
            owners: Vec::new(),
        });
        let owner_id = native_id(owner);
        // A dead owner's address may have been reused
        entry.owners.retain(|(_, w)| w.strong_count() > 0);
        if entry.owners.iter().any(|(oid, _)| *oid == owner_id) {
            return false;
        }
        entry.owners.push((owner_id, Rc::downgrade(owner)));
        true
    }

    /// Remove an owner; the entry goes away with its last owner
    pub fn remove_owner(&mut self, id: u64, owner: &NativeHandle) -> bool {
        let owner_id = native_id(owner);
        let Some(entry) = self.entries.get_mut(&id) else {
            return false;
        };
        let before = entry.owners.len();
        entry.owners.retain(|(oid, _)| *oid != owner_id);
        let removed = entry.owners.len() != before;
        if entry.owners.is_empty() {
            self.entries.remove(&id);
        }
        removed
    }

    /// Forget `id` entirely
    pub fn remove(&mut self, id: u64) {
        self.entries.remove(&id);
    }

    /// Number of live owners of `id`
    pub fn owner_count(&self, id: u64) -> usize {
        self.entries
            .get(&id)
            .map_or(0, |e| e.owners.iter().filter(|(_, w)| w.strong_count() > 0).count())
    }

    /// Prune dead owners and add the remaining targets to `roots`
    pub fn trace(&mut self, roots: &mut RootSet) {
        self.entries.retain(|_, entry| {
            entry.owners.retain(|(_, owner)| owner.strong_count() > 0);
            !entry.owners.is_empty()
        });
        roots.extend(self.entries.values().map(|e| e.target));
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
