//! Native objects and receivers

use std::any::Any;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::class::ClassDescriptor;

/// A refcounted object of the native object system.
///
/// Every native object knows its class, which the bridge reflects on to
/// build script-side constructors and prototypes.
pub trait NativeObject: Any {
    /// The object's class
    fn class(&self) -> Rc<ClassDescriptor>;

    /// Upcast for downcasting to the concrete type
    fn as_any(&self) -> &dyn Any;
}

/// Strong reference to a native object
pub type NativeHandle = Rc<dyn NativeObject>;

/// Weak reference to a native object
pub type WeakNativeHandle = Weak<dyn NativeObject>;

/// Identity of a native object (its allocation address)
pub fn native_id(handle: &NativeHandle) -> usize {
    Rc::as_ptr(handle) as *const () as usize
}

/// Downcast a handle to its concrete type
pub fn downcast<T: 'static>(handle: &NativeHandle) -> Option<&T> {
    handle.as_any().downcast_ref::<T>()
}

/// Generic native object carrying arbitrary state.
///
/// Most classes only need some state plus a class descriptor; mutable
/// state goes behind a `Cell`/`RefCell` inside `T`.
pub struct Instance<T> {
    class: Rc<ClassDescriptor>,
    /// Object state
    pub state: T,
}

impl<T: 'static> Instance<T> {
    /// Allocate a new instance of `class`
    pub fn create(class: &Rc<ClassDescriptor>, state: T) -> NativeHandle {
        Rc::new(Instance {
            class: Rc::clone(class),
            state,
        })
    }
}

impl<T: 'static> NativeObject for Instance<T> {
    fn class(&self) -> Rc<ClassDescriptor> {
        Rc::clone(&self.class)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Receiver of a method invocation
#[derive(Clone)]
pub enum Receiver {
    /// An instance method call
    Instance(NativeHandle),
    /// A class method or initializer call
    Class(Rc<ClassDescriptor>),
}

impl Receiver {
    /// The instance, for instance method calls
    pub fn instance(&self) -> Option<&NativeHandle> {
        match self {
            Receiver::Instance(handle) => Some(handle),
            Receiver::Class(_) => None,
        }
    }

    /// Downcast the instance's `Instance<T>` state
    pub fn state<T: 'static>(&self) -> Option<&T> {
        self.instance()
            .and_then(|h| downcast::<Instance<T>>(h))
            .map(|i| &i.state)
    }

    /// The receiver's class
    pub fn class(&self) -> Rc<ClassDescriptor> {
        match self {
            Receiver::Instance(handle) => handle.class(),
            Receiver::Class(class) => Rc::clone(class),
        }
    }
}

impl fmt::Debug for Receiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Receiver::Instance(handle) => write!(
                f,
                "<{} {:#x}>",
                handle.class().name(),
                native_id(handle)
            ),
            Receiver::Class(class) => write!(f, "{}", class.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::ClassBuilder;
    use std::cell::Cell;

    #[test]
    fn test_instance_identity_and_state() {
        let class = ClassBuilder::new("Counter").build();
        let a = Instance::create(&class, Cell::new(3i32));
        let b = Rc::clone(&a);
        let c = Instance::create(&class, Cell::new(3i32));

        assert_eq!(native_id(&a), native_id(&b));
        assert_ne!(native_id(&a), native_id(&c));

        let receiver = Receiver::Instance(a);
        let state = receiver.state::<Cell<i32>>().unwrap();
        state.set(state.get() + 1);
        assert_eq!(receiver.state::<Cell<i32>>().unwrap().get(), 4);
        assert!(receiver.state::<String>().is_none());
        assert_eq!(receiver.class().name(), "Counter");
    }
}
