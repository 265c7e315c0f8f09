//! The virtual machine
//!
//! [`VirtualMachine`] owns the heap, the collector and every per-VM table.
//! Contexts keep the VM alive; the VM only tracks its contexts weakly.
//! One VM may exist per thread at a time.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use rustc_hash::FxHashMap;
use tracing::debug;

use super::context::{Context, ContextState};
use super::evaluator::ScriptEvaluator;
use super::gc::{
    GarbageCollector, GcCycle, GcStats, HandleStack, Heap, HeapStats, PersistentRoots,
    WeakCallback, WeakRegistry,
};
use super::object::HeapObject;
use super::stack_trace::StackFrame;
use super::value::{ObjectRef, Value};
use crate::error::{BridgeError, BridgeResult};
use crate::options::{BridgeOptions, ExceptionStrategy};

thread_local! {
    static VM_ACTIVE: Cell<bool> = const { Cell::new(false) };
}

/// An active call, rooted for the duration of the call
pub(crate) struct CallRecord {
    pub this: Value,
    pub callee: ObjectRef,
    pub args: Vec<Value>,
}

/// Shared state of a virtual machine.
///
/// Every table sits in its own `RefCell`; borrows are kept short and never
/// held across calls into host code.
pub(crate) struct VmState {
    pub heap: RefCell<Heap>,
    pub handles: RefCell<HandleStack>,
    pub persistent: RefCell<PersistentRoots>,
    pub weak: RefCell<WeakRegistry>,
    pub contexts: RefCell<Vec<Weak<ContextState>>>,
    pub frames: RefCell<Vec<StackFrame>>,
    pub calls: RefCell<Vec<CallRecord>>,
    pub sources: RefCell<FxHashMap<String, Rc<str>>>,
    pub evaluator: RefCell<Option<Rc<dyn ScriptEvaluator>>>,
    pub options: RefCell<BridgeOptions>,
    pub collector: RefCell<GarbageCollector>,
    region_depth: Cell<usize>,
    next_id: Cell<u64>,
}

impl VmState {
    fn new(options: BridgeOptions) -> Self {
        Self {
            heap: RefCell::new(Heap::new()),
            handles: RefCell::new(HandleStack::new()),
            persistent: RefCell::new(PersistentRoots::new()),
            weak: RefCell::new(WeakRegistry::new()),
            contexts: RefCell::new(Vec::new()),
            frames: RefCell::new(Vec::new()),
            calls: RefCell::new(Vec::new()),
            sources: RefCell::new(FxHashMap::default()),
            evaluator: RefCell::new(None),
            collector: RefCell::new(GarbageCollector::new(options.gc_threshold)),
            options: RefCell::new(options),
            region_depth: Cell::new(0),
            next_id: Cell::new(1),
        }
    }

    /// Store an object and record it in the innermost handle frame
    pub fn allocate(&self, object: HeapObject) -> ObjectRef {
        let r = self.heap.borrow_mut().allocate(object);
        self.collector.borrow_mut().note_allocation();
        self.handles.borrow_mut().record(r);
        r
    }

    /// Record an object value in the innermost handle frame
    pub fn track(&self, value: &Value) {
        if let Value::Object(r) = value {
            self.handles.borrow_mut().record(*r);
        }
    }

    pub fn is_live(&self, r: ObjectRef) -> bool {
        self.heap.borrow().is_live(r)
    }

    pub fn options(&self) -> BridgeOptions {
        self.options.borrow().clone()
    }

    pub fn exception_strategy(&self) -> ExceptionStrategy {
        self.options.borrow().exception_strategy
    }

    pub fn register_weak(&self, target: ObjectRef, callback: WeakCallback) {
        self.weak.borrow_mut().register(target, callback);
    }

    pub fn next_id(&self) -> u64 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }

    /// Enter a scoped region or call
    pub fn enter_region(&self) {
        self.handles.borrow_mut().push_frame();
        self.region_depth.set(self.region_depth.get() + 1);
    }

    /// Leave a scoped region; the outermost exit may collect
    pub fn exit_region(&self) {
        self.handles.borrow_mut().pop_frame();
        let depth = self.region_depth.get().saturating_sub(1);
        self.region_depth.set(depth);
        if depth == 0
            && !std::thread::panicking()
            && self.collector.borrow().should_collect()
        {
            self.collect_garbage();
        }
    }
}

impl Drop for VmState {
    fn drop(&mut self) {
        let _ = VM_ACTIVE.try_with(|active| active.set(false));
    }
}

/// Handle to the virtual machine
#[derive(Clone)]
pub struct VirtualMachine {
    pub(crate) state: Rc<VmState>,
}

impl VirtualMachine {
    /// Create a virtual machine with default options
    pub fn new() -> BridgeResult<Self> {
        Self::with_options(BridgeOptions::default())
    }

    /// Create a virtual machine.
    ///
    /// Fails with [`BridgeError::VmAlreadyRunning`] while another VM is
    /// alive on this thread.
    pub fn with_options(options: BridgeOptions) -> BridgeResult<Self> {
        options.validate()?;
        if VM_ACTIVE.with(|active| active.replace(true)) {
            return Err(BridgeError::VmAlreadyRunning);
        }
        debug!(
            gc_threshold = options.gc_threshold,
            strategy = ?options.exception_strategy,
            "virtual machine created"
        );
        Ok(Self {
            state: Rc::new(VmState::new(options)),
        })
    }

    pub(crate) fn from_state(state: Rc<VmState>) -> Self {
        Self { state }
    }

    /// Current options
    pub fn options(&self) -> BridgeOptions {
        self.state.options()
    }

    /// Switch between rethrowing and reporting script exceptions
    pub fn set_exception_strategy(&self, strategy: ExceptionStrategy) {
        self.state.options.borrow_mut().exception_strategy = strategy;
    }

    /// Change the automatic collection threshold
    pub fn set_gc_threshold(&self, threshold: usize) {
        self.state.options.borrow_mut().gc_threshold = threshold;
        self.state.collector.borrow_mut().set_threshold(threshold);
    }

    /// Install the script evaluator
    pub fn set_evaluator<E: ScriptEvaluator + 'static>(&self, evaluator: E) {
        *self.state.evaluator.borrow_mut() = Some(Rc::new(evaluator));
    }

    /// Whether an evaluator is installed
    pub fn has_evaluator(&self) -> bool {
        self.state.evaluator.borrow().is_some()
    }

    /// Create a new execution context
    pub fn new_context(&self) -> Context {
        Context::new(self)
    }

    /// Run a full collection now
    pub fn run_garbage_collector(&self) -> GcCycle {
        self.state.collect_garbage()
    }

    /// Collector statistics
    pub fn gc_stats(&self) -> GcStats {
        self.state.collector.borrow().stats().clone()
    }

    /// Heap statistics
    pub fn heap_stats(&self) -> HeapStats {
        self.state.heap.borrow().stats()
    }

    /// Whether both handles refer to the same VM
    pub fn ptr_eq(&self, other: &VirtualMachine) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }
}
