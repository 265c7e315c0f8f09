//! Runtime-reflective class descriptors

use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use rustc_hash::FxHashMap;

use crate::error::NativeException;
use crate::object::{NativeHandle, Receiver};
use crate::protocol::Protocol;
use crate::selector::Selector;
use crate::value::NativeValue;

/// Implementation of a native method
pub type MethodImpl = Rc<dyn Fn(&Receiver, &[NativeValue]) -> Result<NativeValue, NativeException>>;

/// Default zero-argument factory for a class
pub type Factory = Rc<dyn Fn(&Rc<ClassDescriptor>) -> NativeHandle>;

/// Unique class identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(u64);

impl ClassId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        ClassId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw identifier value
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// A native class: name, superclass, adopted protocols and method tables
pub struct ClassDescriptor {
    id: ClassId,
    name: String,
    superclass: Option<Rc<ClassDescriptor>>,
    protocols: Vec<Rc<Protocol>>,
    instance_methods: FxHashMap<Selector, MethodImpl>,
    class_methods: FxHashMap<Selector, MethodImpl>,
    factory: Option<Factory>,
}

impl ClassDescriptor {
    /// Unique identifier
    pub fn id(&self) -> ClassId {
        self.id
    }

    /// Class name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Direct superclass
    pub fn superclass(&self) -> Option<&Rc<ClassDescriptor>> {
        self.superclass.as_ref()
    }

    /// Protocols adopted directly by this class
    pub fn protocols(&self) -> &[Rc<Protocol>] {
        &self.protocols
    }

    /// Iterate this class and its superclasses, nearest first
    pub fn ancestors(&self) -> Ancestors<'_> {
        Ancestors { next: Some(self) }
    }

    /// Every protocol adopted by the class, its superclasses and their
    /// parent protocols, without duplicates
    pub fn all_protocols(&self) -> Vec<Rc<Protocol>> {
        let mut out: Vec<Rc<Protocol>> = Vec::new();
        for class in self.ancestors() {
            for protocol in &class.protocols {
                collect_protocol(protocol, &mut out);
            }
        }
        out
    }

    /// Find an instance method, walking the superclass chain
    pub fn instance_method(&self, selector: &Selector) -> Option<MethodImpl> {
        self.ancestors()
            .find_map(|c| c.instance_methods.get(selector).cloned())
    }

    /// Find a class method, walking the superclass chain
    pub fn class_method(&self, selector: &Selector) -> Option<MethodImpl> {
        self.ancestors()
            .find_map(|c| c.class_methods.get(selector).cloned())
    }

    /// Whether instances respond to `selector`
    pub fn responds_to(&self, selector: &Selector) -> bool {
        self.instance_method(selector).is_some()
    }

    /// Whether `self` is `other` or inherits from it
    pub fn is_subclass_of(&self, other: &ClassDescriptor) -> bool {
        self.ancestors().any(|c| c.id == other.id)
    }

    /// Whether the class or an ancestor adopts the named protocol
    pub fn conforms_to(&self, protocol: &str) -> bool {
        self.all_protocols().iter().any(|p| p.name() == protocol)
    }

    /// Default factory of this class
    pub fn factory(&self) -> Option<&Factory> {
        self.factory.as_ref()
    }

    /// Allocate an instance with the default factory
    pub fn instantiate(self: &Rc<Self>) -> Option<NativeHandle> {
        self.factory.as_ref().map(|f| f(self))
    }
}

fn collect_protocol(protocol: &Rc<Protocol>, out: &mut Vec<Rc<Protocol>>) {
    if out.iter().any(|p| Rc::ptr_eq(p, protocol)) {
        return;
    }
    out.push(Rc::clone(protocol));
    for parent in protocol.parents() {
        collect_protocol(parent, out);
    }
}

impl fmt::Debug for ClassDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDescriptor")
            .field("name", &self.name)
            .field("superclass", &self.superclass.as_ref().map(|s| s.name()))
            .field(
                "protocols",
                &self.protocols.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Iterator over a class and its superclasses
pub struct Ancestors<'a> {
    next: Option<&'a ClassDescriptor>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a ClassDescriptor;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.superclass.as_deref();
        Some(current)
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`ClassDescriptor`]
pub struct ClassBuilder {
    name: String,
    superclass: Option<Rc<ClassDescriptor>>,
    protocols: Vec<Rc<Protocol>>,
    instance_methods: FxHashMap<Selector, MethodImpl>,
    class_methods: FxHashMap<Selector, MethodImpl>,
    factory: Option<Factory>,
}

impl ClassBuilder {
    /// Start a class named `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            superclass: None,
            protocols: Vec::new(),
            instance_methods: FxHashMap::default(),
            class_methods: FxHashMap::default(),
            factory: None,
        }
    }

    /// Set the superclass
    pub fn superclass(mut self, superclass: &Rc<ClassDescriptor>) -> Self {
        self.superclass = Some(Rc::clone(superclass));
        self
    }

    /// Adopt a protocol
    pub fn adopt(mut self, protocol: &Rc<Protocol>) -> Self {
        self.protocols.push(Rc::clone(protocol));
        self
    }

    /// Add an instance method
    pub fn instance_method<F>(mut self, selector: &str, body: F) -> Self
    where
        F: Fn(&Receiver, &[NativeValue]) -> Result<NativeValue, NativeException> + 'static,
    {
        self.instance_methods
            .insert(Selector::new(selector), Rc::new(body));
        self
    }

    /// Add a class method; initializers are class methods that return the
    /// new instance
    pub fn class_method<F>(mut self, selector: &str, body: F) -> Self
    where
        F: Fn(&Receiver, &[NativeValue]) -> Result<NativeValue, NativeException> + 'static,
    {
        self.class_methods.insert(Selector::new(selector), Rc::new(body));
        self
    }

    /// Set the default factory used by argument-less construction
    pub fn factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&Rc<ClassDescriptor>) -> NativeHandle + 'static,
    {
        self.factory = Some(Rc::new(factory));
        self
    }

    /// Finish the class
    pub fn build(self) -> Rc<ClassDescriptor> {
        Rc::new(ClassDescriptor {
            id: ClassId::next(),
            name: self.name,
            superclass: self.superclass,
            protocols: self.protocols,
            instance_methods: self.instance_methods,
            class_methods: self.class_methods,
            factory: self.factory,
        })
    }
}
