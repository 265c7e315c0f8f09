//! Mark-sweep garbage collector
//!
//! A cycle gathers roots, marks from them, sweeps the heap and then runs the
//! weak callbacks of collected objects. Freed objects are dropped and
//! callbacks run only after every heap borrow has been released, so
//! finalizers may touch VM state.

use std::rc::{Rc, Weak};
use std::time::{Duration, Instant};

use tracing::debug;

use super::roots::RootSet;
use crate::bridge::RegistryHolds;
use crate::defaults::DEFAULT_GC_THRESHOLD;
use crate::vm::context::ContextState;
use crate::vm::machine::VmState;
use crate::vm::object::HeapObject;

/// Garbage collector statistics
#[derive(Debug, Clone, Default)]
pub struct GcStats {
    /// Total number of collections
    pub collections: usize,

    /// Total objects freed
    pub objects_freed: usize,

    /// Total bytes freed
    pub bytes_freed: usize,

    /// Total weak callbacks run
    pub finalizers_run: usize,

    /// Total pause time across all collections
    pub total_pause_time: Duration,

    /// Last collection duration
    pub last_pause_time: Duration,

    /// Maximum pause time
    pub max_pause_time: Duration,

    /// Objects marked in last collection
    pub last_marked_count: usize,

    /// Objects freed in last collection
    pub last_freed_count: usize,

    /// Live objects after last collection
    pub live_objects: usize,
}

impl GcStats {
    fn update(&mut self, pause_time: Duration, cycle: &GcCycle, live_objects: usize) {
        self.collections += 1;
        self.objects_freed += cycle.freed;
        self.bytes_freed += cycle.freed_bytes;
        self.finalizers_run += cycle.finalized;
        self.total_pause_time += pause_time;
        self.last_pause_time = pause_time;
        if pause_time > self.max_pause_time {
            self.max_pause_time = pause_time;
        }
        self.last_marked_count = cycle.marked;
        self.last_freed_count = cycle.freed;
        self.live_objects = live_objects;
    }

    /// Average pause time
    pub fn avg_pause_time(&self) -> Duration {
        if self.collections == 0 {
            return Duration::ZERO;
        }
        self.total_pause_time / self.collections as u32
    }
}

/// Outcome of one collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcCycle {
    /// Roots the mark phase started from
    pub roots: usize,
    /// Objects found reachable
    pub marked: usize,
    /// Objects freed
    pub freed: usize,
    /// Approximate bytes freed
    pub freed_bytes: usize,
    /// Weak callbacks run
    pub finalized: usize,
}

/// Collection policy and bookkeeping
pub(crate) struct GarbageCollector {
    /// Allocations since the last cycle that trigger a collection
    threshold: usize,
    allocations: usize,
    stats: GcStats,
}

impl GarbageCollector {
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold,
            allocations: 0,
            stats: GcStats::default(),
        }
    }

    pub fn set_threshold(&mut self, threshold: usize) {
        self.threshold = threshold;
    }

    pub fn note_allocation(&mut self) {
        self.allocations += 1;
    }

    pub fn should_collect(&self) -> bool {
        self.allocations >= self.threshold
    }

    pub fn stats(&self) -> &GcStats {
        &self.stats
    }

    fn finish(&mut self, pause_time: Duration, cycle: &GcCycle, live_objects: usize) {
        self.allocations = 0;
        self.stats.update(pause_time, cycle, live_objects);
    }
}

impl Default for GarbageCollector {
    fn default() -> Self {
        Self::new(DEFAULT_GC_THRESHOLD)
    }
}

impl VmState {
    /// Run a full collection
    pub(crate) fn collect_garbage(&self) -> GcCycle {
        let start = Instant::now();
        let roots = self.gather_roots();

        let mut cycle = GcCycle {
            roots: roots.len(),
            ..GcCycle::default()
        };
        let (garbage, callbacks) = {
            let mut heap = self.heap.borrow_mut();
            cycle.marked = heap.mark(roots.into_vec());
            let garbage = heap.sweep();
            let callbacks = self.weak.borrow_mut().take_dead(&heap);
            (garbage, callbacks)
        };

        cycle.freed = garbage.len();
        cycle.freed_bytes = garbage.iter().map(HeapObject::size_hint).sum();
        drop(garbage);

        cycle.finalized = callbacks.len();
        for callback in callbacks {
            callback();
        }

        let live_objects = self.heap.borrow().len();
        self.collector
            .borrow_mut()
            .finish(start.elapsed(), &cycle, live_objects);

        debug!(
            roots = cycle.roots,
            marked = cycle.marked,
            freed = cycle.freed,
            finalized = cycle.finalized,
            live = live_objects,
            "gc cycle"
        );
        cycle
    }

    fn gather_roots(&self) -> RootSet {
        let mut roots = RootSet::new();
        self.handles.borrow().trace(&mut roots);
        for call in self.calls.borrow().iter() {
            roots.add_value(&call.this);
            roots.add(call.callee);
            for arg in &call.args {
                roots.add_value(arg);
            }
        }
        self.persistent.borrow_mut().trace(&mut roots);

        let contexts: Vec<Rc<ContextState>> = {
            let mut contexts = self.contexts.borrow_mut();
            contexts.retain(|c| c.strong_count() > 0);
            contexts.iter().filter_map(Weak::upgrade).collect()
        };
        let mut holds = RegistryHolds::default();
        for context in &contexts {
            context.bridge.borrow().wrappers.count_holds(&mut holds);
        }
        let heap = self.heap.borrow();
        for context in &contexts {
            context.trace_roots(&heap, &holds, &mut roots);
        }
        roots
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_policy() {
        let mut gc = GarbageCollector::new(3);
        gc.note_allocation();
        gc.note_allocation();
        assert!(!gc.should_collect());
        gc.note_allocation();
        assert!(gc.should_collect());

        let cycle = GcCycle {
            freed: 2,
            ..GcCycle::default()
        };
        gc.finish(Duration::from_millis(2), &cycle, 5);
        assert!(!gc.should_collect());
        assert_eq!(gc.stats().collections, 1);
        assert_eq!(gc.stats().objects_freed, 2);
        assert_eq!(gc.stats().avg_pause_time(), Duration::from_millis(2));
    }
}
