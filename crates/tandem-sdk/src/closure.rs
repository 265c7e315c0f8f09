//! Native closures with declared signatures

use std::fmt;
use std::rc::Rc;

use crate::encoding::MethodSignature;
use crate::error::{DeclarationError, NativeException};
use crate::value::NativeValue;

type ClosureBody = dyn Fn(&[NativeValue]) -> Result<NativeValue, NativeException>;

struct ClosureInner {
    signature: MethodSignature,
    body: Box<ClosureBody>,
}

/// A refcounted native closure.
///
/// Clones share the same closure; identity is the shared allocation, so a
/// closure that travels to a script and back compares equal to the
/// original.
#[derive(Clone)]
pub struct NativeClosure {
    inner: Rc<ClosureInner>,
}

impl NativeClosure {
    /// Create a closure from a closure encoding such as `d@?dd`
    pub fn new<F>(types: &str, body: F) -> Result<Self, DeclarationError>
    where
        F: Fn(&[NativeValue]) -> Result<NativeValue, NativeException> + 'static,
    {
        let signature = MethodSignature::parse_closure(types)?;
        Ok(Self::with_signature(signature, body))
    }

    /// Create a closure from an already parsed signature
    pub fn with_signature<F>(signature: MethodSignature, body: F) -> Self
    where
        F: Fn(&[NativeValue]) -> Result<NativeValue, NativeException> + 'static,
    {
        Self {
            inner: Rc::new(ClosureInner {
                signature,
                body: Box::new(body),
            }),
        }
    }

    /// Declared signature
    pub fn signature(&self) -> &MethodSignature {
        &self.inner.signature
    }

    /// Call the closure
    pub fn invoke(&self, args: &[NativeValue]) -> Result<NativeValue, NativeException> {
        (self.inner.body)(args)
    }

    /// Whether both handles refer to the same closure
    pub fn ptr_eq(&self, other: &NativeClosure) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Identity of the closure (its allocation address)
    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.inner) as usize
    }

    /// Number of live handles to this closure
    pub fn strong_count(&self) -> usize {
        Rc::strong_count(&self.inner)
    }
}

impl PartialEq for NativeClosure {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for NativeClosure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<closure {} {:#x}>", self.inner.signature, self.id())
    }
}
