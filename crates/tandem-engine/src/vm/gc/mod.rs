//! Garbage collection
//!
//! Single-threaded mark-sweep over a slot heap, with handle frames,
//! persistent owner-based roots and weak callbacks.

mod collector;
mod heap;
mod roots;
mod weak;

pub use collector::{GcCycle, GcStats};
pub use heap::HeapStats;

pub(crate) use collector::GarbageCollector;
pub(crate) use heap::Heap;
pub(crate) use roots::{HandleStack, PersistentRoots, RootSet};
pub(crate) use weak::{WeakCallback, WeakRegistry};
