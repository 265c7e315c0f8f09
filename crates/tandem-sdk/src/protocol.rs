//! Capability declarations
//!
//! A [`Protocol`] lists the methods, properties and initializers a class
//! offers. Classes adopt protocols; only protocols marked exported (directly
//! or through a parent) are visible to scripts.

use std::rc::Rc;

use crate::encoding::{MethodSignature, TypeEncoding};
use crate::error::DeclarationError;
use crate::selector::Selector;

/// How a declared method is dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    /// Called on instances
    Instance,
    /// Called on the class
    Class,
    /// Called by `new` to produce an instance
    Initializer,
}

/// A declared method
#[derive(Debug, Clone)]
pub struct MethodDeclaration {
    /// Selector
    pub selector: Selector,
    /// Argument and return types
    pub signature: MethodSignature,
    /// Dispatch kind
    pub kind: MethodKind,
}

/// A declared accessor property
#[derive(Debug, Clone)]
pub struct PropertyDeclaration {
    /// Script-visible name
    pub name: String,
    /// Value type
    pub encoding: TypeEncoding,
    /// Whether the property has no setter
    pub readonly: bool,
    /// Getter selector
    pub getter: Selector,
    /// Setter selector, absent for readonly properties
    pub setter: Option<Selector>,
}

/// Script-visible name overriding a selector's default name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rename {
    /// Name used by scripts
    pub name: String,
    /// Selector that gets invoked
    pub selector: Selector,
}

/// A capability declaration
#[derive(Debug)]
pub struct Protocol {
    name: String,
    parents: Vec<Rc<Protocol>>,
    exported: bool,
    methods: Vec<MethodDeclaration>,
    properties: Vec<PropertyDeclaration>,
    renames: Vec<Rename>,
}

impl Protocol {
    /// Protocol name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parent protocols
    pub fn parents(&self) -> &[Rc<Protocol>] {
        &self.parents
    }

    /// Whether scripts may see this protocol's declarations
    pub fn is_exported(&self) -> bool {
        self.exported || self.parents.iter().any(|p| p.is_exported())
    }

    /// Methods declared directly on this protocol
    pub fn methods(&self) -> &[MethodDeclaration] {
        &self.methods
    }

    /// Properties declared directly on this protocol
    pub fn properties(&self) -> &[PropertyDeclaration] {
        &self.properties
    }

    /// Renames declared directly on this protocol
    pub fn renames(&self) -> &[Rename] {
        &self.renames
    }

    /// Find a method declaration here or in a parent
    pub fn method(&self, selector: &Selector) -> Option<&MethodDeclaration> {
        self.methods
            .iter()
            .find(|m| &m.selector == selector)
            .or_else(|| self.parents.iter().find_map(|p| p.method(selector)))
    }

    /// Whether this protocol is `name` or inherits from it
    pub fn conforms_to(&self, name: &str) -> bool {
        self.name == name || self.parents.iter().any(|p| p.conforms_to(name))
    }
}

// ============================================================================
// Builder
// ============================================================================

struct PendingRename {
    name: String,
    selector: Selector,
    nullary: bool,
}

/// Builder for [`Protocol`].
///
/// Declaration errors are collected as the builder is chained and the first
/// one is returned from [`ProtocolBuilder::build`].
pub struct ProtocolBuilder {
    name: String,
    parents: Vec<Rc<Protocol>>,
    exported: bool,
    methods: Vec<MethodDeclaration>,
    properties: Vec<PropertyDeclaration>,
    renames: Vec<PendingRename>,
    error: Option<DeclarationError>,
}

impl ProtocolBuilder {
    /// Start a protocol named `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parents: Vec::new(),
            exported: false,
            methods: Vec::new(),
            properties: Vec::new(),
            renames: Vec::new(),
            error: None,
        }
    }

    /// Inherit from a parent protocol
    pub fn inherits(mut self, parent: &Rc<Protocol>) -> Self {
        self.parents.push(Rc::clone(parent));
        self
    }

    /// Make the protocol visible to scripts
    pub fn exported(mut self) -> Self {
        self.exported = true;
        self
    }

    /// Declare an instance method with its full encoding (`d@:dd`)
    pub fn method(self, selector: &str, types: &str) -> Self {
        self.declare(selector, types, MethodKind::Instance)
    }

    /// Declare a class method
    pub fn class_method(self, selector: &str, types: &str) -> Self {
        self.declare(selector, types, MethodKind::Class)
    }

    /// Declare an initializer; its implementation is a class method
    pub fn initializer(self, selector: &str, types: &str) -> Self {
        self.declare(selector, types, MethodKind::Initializer)
    }

    /// Declare a read-write property with conventional accessors
    pub fn property(self, name: &str, encoding: &str) -> Self {
        let setter = Selector::setter_for(name);
        self.add_property(name, encoding, Selector::new(name), Some(setter))
    }

    /// Declare a readonly property
    pub fn readonly_property(self, name: &str, encoding: &str) -> Self {
        self.add_property(name, encoding, Selector::new(name), None)
    }

    /// Declare a property with custom accessor selectors
    pub fn property_with_accessors(
        self,
        name: &str,
        encoding: &str,
        getter: &str,
        setter: Option<&str>,
    ) -> Self {
        self.add_property(
            name,
            encoding,
            Selector::new(getter),
            setter.map(Selector::new),
        )
    }

    /// Expose a selector taking arguments under another name
    pub fn export_as(mut self, name: &str, selector: &str) -> Self {
        self.renames.push(PendingRename {
            name: name.to_string(),
            selector: Selector::new(selector),
            nullary: false,
        });
        self
    }

    /// Expose a zero-argument selector under another name
    pub fn export_nullary_as(mut self, name: &str, selector: &str) -> Self {
        self.renames.push(PendingRename {
            name: name.to_string(),
            selector: Selector::new(selector),
            nullary: true,
        });
        self
    }

    /// Validate and finish the protocol
    pub fn build(self) -> Result<Rc<Protocol>, DeclarationError> {
        if let Some(err) = self.error {
            return Err(err);
        }

        let mut protocol = Protocol {
            name: self.name,
            parents: self.parents,
            exported: self.exported,
            methods: self.methods,
            properties: self.properties,
            renames: Vec::with_capacity(self.renames.len()),
        };

        for pending in self.renames {
            let arity = pending.selector.arity();
            let reason = if pending.nullary && arity != 0 {
                Some("nullary renames need a selector without arguments")
            } else if !pending.nullary && arity == 0 {
                Some("selector takes no arguments, use a nullary rename")
            } else if protocol.method(&pending.selector).is_none() {
                Some("selector is not declared by the protocol")
            } else {
                None
            };
            if let Some(reason) = reason {
                return Err(DeclarationError::InvalidRename {
                    property: pending.name,
                    selector: pending.selector.name().to_string(),
                    reason: reason.to_string(),
                });
            }
            protocol.renames.push(Rename {
                name: pending.name,
                selector: pending.selector,
            });
        }

        Ok(Rc::new(protocol))
    }

    fn declare(mut self, selector: &str, types: &str, kind: MethodKind) -> Self {
        if self.error.is_some() {
            return self;
        }
        let selector = Selector::new(selector);
        match MethodSignature::parse_method(types) {
            Ok(signature) if signature.arity() != selector.arity() => {
                self.error = Some(DeclarationError::ArityMismatch {
                    selector: selector.name().to_string(),
                    declared: selector.arity(),
                    encoded: signature.arity(),
                });
            }
            Ok(signature) => self.methods.push(MethodDeclaration {
                selector,
                signature,
                kind,
            }),
            Err(err) => self.error = Some(err),
        }
        self
    }

    fn add_property(
        mut self,
        name: &str,
        encoding: &str,
        getter: Selector,
        setter: Option<Selector>,
    ) -> Self {
        if self.error.is_some() {
            return self;
        }
        match TypeEncoding::parse(encoding) {
            Ok(encoding) => self.properties.push(PropertyDeclaration {
                name: name.to_string(),
                encoding,
                readonly: setter.is_none(),
                getter,
                setter,
            }),
            Err(err) => self.error = Some(err),
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_protocol() {
        let p = ProtocolBuilder::new("CounterExports")
            .exported()
            .method("increment", "v@:")
            .method("add:", "v@:d")
            .initializer("initWithValue:", "@@:d")
            .property("value", "d")
            .readonly_property("label", "@")
            .build()
            .unwrap();

        assert!(p.is_exported());
        assert_eq!(p.methods().len(), 3);
        assert_eq!(p.methods()[2].kind, MethodKind::Initializer);
        assert_eq!(p.properties()[0].setter, Some(Selector::new("setValue:")));
        assert!(p.properties()[1].readonly);
    }

    #[test]
    fn test_exported_inherited_from_parent() {
        let root = ProtocolBuilder::new("Exports").exported().build().unwrap();
        let child = ProtocolBuilder::new("Child").inherits(&root).build().unwrap();
        let plain = ProtocolBuilder::new("Plain").build().unwrap();
        assert!(child.is_exported());
        assert!(child.conforms_to("Exports"));
        assert!(!plain.is_exported());
    }

    #[test]
    fn test_arity_mismatch() {
        let err = ProtocolBuilder::new("Bad")
            .method("doFoo:withBar:", "v@:d")
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            DeclarationError::ArityMismatch { declared: 2, encoded: 1, .. }
        ));
    }

    #[test]
    fn test_renames() {
        let p = ProtocolBuilder::new("Renamed")
            .exported()
            .method("doFoo:withBar:", "d@:dd")
            .method("reset", "v@:")
            .export_as("foo", "doFoo:withBar:")
            .export_nullary_as("clear", "reset")
            .build()
            .unwrap();
        assert_eq!(p.renames().len(), 2);
        assert_eq!(p.renames()[0].selector, Selector::new("doFoo:withBar:"));
    }

    #[test]
    fn test_invalid_renames() {
        let err = ProtocolBuilder::new("P")
            .method("reset", "v@:")
            .export_as("clear", "reset")
            .build()
            .unwrap_err();
        assert!(matches!(err, DeclarationError::InvalidRename { .. }));

        let err = ProtocolBuilder::new("P")
            .method("add:", "v@:d")
            .export_nullary_as("plus", "add:")
            .build()
            .unwrap_err();
        assert!(matches!(err, DeclarationError::InvalidRename { .. }));

        let err = ProtocolBuilder::new("P")
            .export_as("missing", "missing:")
            .build()
            .unwrap_err();
        assert!(matches!(err, DeclarationError::InvalidRename { .. }));
    }

    #[test]
    fn test_rename_of_parent_method() {
        let parent = ProtocolBuilder::new("Parent")
            .method("doFoo:withBar:", "v@:dd")
            .build()
            .unwrap();
        let child = ProtocolBuilder::new("Child")
            .inherits(&parent)
            .export_as("foo", "doFoo:withBar:")
            .build();
        assert!(child.is_ok());
    }
}
