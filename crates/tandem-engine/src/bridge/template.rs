//! Class templates
//!
//! The first time a class is bridged into a context its exported protocols
//! are walked once to build an [`ExportTable`]. The table, a constructor
//! function and a prototype holding the exported methods are cached per
//! class for the lifetime of the context.

use std::rc::Rc;

use rustc_hash::FxHashMap;
use tandem_sdk::{
    ClassDescriptor, ClassId, MethodKind, MethodSignature, Protocol, Selector, TypeEncoding,
};
use tracing::debug;

use super::callback::{ConstructorCallback, MethodCallback};
use super::interceptor::WrapperInterceptor;
use super::Fault;
use crate::error::DispatchError;
use crate::vm::gc::RootSet;
use crate::vm::{HeapObject, ObjectKind, ObjectRef, Property, PropertyInterceptor, Scope, Value};

/// Selector of the indexed getter
pub(crate) const INDEX_GETTER: &str = "objectAtIndexedSubscript:";

/// Selector of the indexed setter
pub(crate) const INDEX_SETTER: &str = "setObject:atIndexedSubscript:";

/// An exported method
#[derive(Debug)]
pub(crate) struct ExportedMethod {
    /// Script-visible name
    pub name: String,
    pub selector: Selector,
    pub signature: MethodSignature,
}

impl ExportedMethod {
    /// Methods whose types cannot cross the boundary stay visible but throw
    /// when called
    pub fn check_signature(&self) -> Result<(), DispatchError> {
        if self.signature.is_marshalable() {
            return Ok(());
        }
        Err(DispatchError::UnsupportedSignature {
            name: self.name.clone(),
            signature: self.signature.to_string(),
        })
    }
}

/// An exported accessor property
#[derive(Debug)]
pub(crate) struct ExportedProperty {
    pub name: String,
    pub encoding: TypeEncoding,
    pub getter: Selector,
    pub setter: Option<Selector>,
}

impl ExportedProperty {
    pub fn check_encoding(&self) -> Result<(), DispatchError> {
        if self.encoding.is_marshalable() {
            return Ok(());
        }
        Err(DispatchError::UnsupportedSignature {
            name: self.name.clone(),
            signature: self.encoding.to_string(),
        })
    }
}

/// Everything a class exports to scripts, keyed by script-visible name
#[derive(Debug, Default)]
pub(crate) struct ExportTable {
    pub class_name: String,
    pub instance_methods: FxHashMap<String, Rc<ExportedMethod>>,
    pub class_methods: FxHashMap<String, Rc<ExportedMethod>>,
    pub properties: FxHashMap<String, Rc<ExportedProperty>>,
    pub initializers: Vec<Rc<ExportedMethod>>,
    pub index_getter: Option<Rc<ExportedMethod>>,
    pub index_setter: Option<Rc<ExportedMethod>>,
}

impl ExportTable {
    /// Walk the exported protocols of `class` and its superclasses
    pub fn build(class: &ClassDescriptor) -> Result<Self, DispatchError> {
        let protocols = exported_protocols(class);

        let mut renames: FxHashMap<Selector, String> = FxHashMap::default();
        for protocol in &protocols {
            for rename in protocol.renames() {
                renames.insert(rename.selector.clone(), rename.name.clone());
            }
        }

        let mut table = ExportTable {
            class_name: class.name().to_string(),
            ..ExportTable::default()
        };

        for protocol in &protocols {
            for decl in protocol.methods() {
                if !decl.signature.is_marshalable() {
                    debug!(
                        class = class.name(),
                        selector = %decl.selector,
                        "exported method has an unsupported signature"
                    );
                }
                let name = renames
                    .get(&decl.selector)
                    .cloned()
                    .unwrap_or_else(|| decl.selector.script_name());
                let method = Rc::new(ExportedMethod {
                    name: name.clone(),
                    selector: decl.selector.clone(),
                    signature: decl.signature.clone(),
                });

                match decl.kind {
                    MethodKind::Initializer => {
                        if !table.initializers.iter().any(|m| m.selector == decl.selector) {
                            table.initializers.push(method);
                        }
                    }
                    MethodKind::Instance => {
                        match decl.selector.name() {
                            INDEX_GETTER => table.index_getter = Some(Rc::clone(&method)),
                            INDEX_SETTER => table.index_setter = Some(Rc::clone(&method)),
                            _ => {}
                        }
                        insert_unique(&mut table.instance_methods, &table.class_name, name, method)?;
                    }
                    MethodKind::Class => {
                        insert_unique(&mut table.class_methods, &table.class_name, name, method)?;
                    }
                }
            }

            for decl in protocol.properties() {
                table
                    .properties
                    .entry(decl.name.clone())
                    .or_insert_with(|| {
                        Rc::new(ExportedProperty {
                            name: decl.name.clone(),
                            encoding: decl.encoding.clone(),
                            getter: decl.getter.clone(),
                            setter: decl.setter.clone(),
                        })
                    });
            }
        }

        Ok(table)
    }

    /// Initializer taking `arity` arguments
    pub fn initializer(&self, arity: usize) -> Option<&Rc<ExportedMethod>> {
        self.initializers
            .iter()
            .find(|m| m.signature.arity() == arity)
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.instance_methods.is_empty()
            && self.class_methods.is_empty()
            && self.properties.is_empty()
            && self.initializers.is_empty()
    }
}

/// Adopted and inherited protocols of `class` that carry the export marker.
/// A parent without the marker contributes nothing.
fn exported_protocols(class: &ClassDescriptor) -> Vec<Rc<Protocol>> {
    class
        .all_protocols()
        .into_iter()
        .filter(|protocol| protocol.is_exported())
        .collect()
}

fn insert_unique(
    methods: &mut FxHashMap<String, Rc<ExportedMethod>>,
    class_name: &str,
    name: String,
    method: Rc<ExportedMethod>,
) -> Result<(), DispatchError> {
    if let Some(existing) = methods.get(&name) {
        if existing.selector == method.selector {
            return Ok(());
        }
        return Err(DispatchError::AmbiguousRename {
            class: class_name.to_string(),
            name,
            first: existing.selector.name().to_string(),
            second: method.selector.name().to_string(),
        });
    }
    methods.insert(name, method);
    Ok(())
}

/// A class bridged into one context
pub(crate) struct ClassTemplate {
    pub class: Rc<ClassDescriptor>,
    pub table: Rc<ExportTable>,
    pub constructor: ObjectRef,
    pub prototype: ObjectRef,
    interceptor: Rc<WrapperInterceptor>,
}

impl ClassTemplate {
    /// Interceptor shared by every wrapper of the class
    pub fn interceptor(&self) -> Rc<dyn PropertyInterceptor> {
        self.interceptor.clone()
    }
}

/// Per-context template cache, keyed by class identity
pub(crate) struct TemplateCache {
    templates: FxHashMap<ClassId, Rc<ClassTemplate>>,
}

impl TemplateCache {
    pub fn new() -> Self {
        Self {
            templates: FxHashMap::default(),
        }
    }

    pub fn get(&self, id: ClassId) -> Option<Rc<ClassTemplate>> {
        self.templates.get(&id).cloned()
    }

    pub fn insert(&mut self, template: Rc<ClassTemplate>) {
        self.templates.insert(template.class.id(), template);
    }

    /// The class whose constructor is `constructor`
    pub fn class_for_constructor(&self, constructor: ObjectRef) -> Option<Rc<ClassDescriptor>> {
        self.templates
            .values()
            .find(|t| t.constructor == constructor)
            .map(|t| Rc::clone(&t.class))
    }

    pub fn trace(&self, roots: &mut RootSet) {
        for template in self.templates.values() {
            roots.add(template.constructor);
            roots.add(template.prototype);
        }
    }
}

/// The template of `class` in the scope's context, built on first use.
/// Superclass templates are built first so prototypes chain.
pub(crate) fn template_for(
    scope: &Scope,
    class: &Rc<ClassDescriptor>,
) -> Result<Rc<ClassTemplate>, Fault> {
    if let Some(template) = scope.state().bridge.borrow().templates.get(class.id()) {
        return Ok(template);
    }

    let parent = match class.superclass() {
        Some(superclass) => Some(template_for(scope, superclass)?),
        None => None,
    };
    let table = Rc::new(ExportTable::build(class)?);

    let parent_prototype = parent
        .as_ref()
        .map_or(scope.intrinsics().object_prototype, |p| p.prototype);
    let prototype_ref = scope
        .vm()
        .allocate(HeapObject::new(ObjectKind::Ordinary, Some(parent_prototype)));

    for method in table.instance_methods.values() {
        let callback = MethodCallback::new(Rc::clone(method), MethodKind::Instance, Rc::clone(class));
        let function = scope.new_function(&method.name, Rc::new(callback));
        scope.write(prototype_ref, |o| {
            o.properties.insert(&method.name, Property::hidden(function))
        });
    }

    let constructor_ref = scope.new_function_with_prototype(
        class.name(),
        Rc::new(ConstructorCallback::new(Rc::clone(class), Rc::clone(&table))),
        Some(prototype_ref),
    );
    if let Some(parent) = &parent {
        let parent_constructor = parent.constructor;
        scope.write(constructor_ref, |o| o.prototype = Some(parent_constructor));
    }
    for method in table.class_methods.values() {
        let callback = MethodCallback::new(Rc::clone(method), MethodKind::Class, Rc::clone(class));
        let function = scope.new_function(&method.name, Rc::new(callback));
        scope.write(constructor_ref, |o| {
            o.properties.insert(&method.name, Property::hidden(function))
        });
    }

    let template = Rc::new(ClassTemplate {
        class: Rc::clone(class),
        interceptor: Rc::new(WrapperInterceptor::new(Rc::clone(&table))),
        table,
        constructor: constructor_ref,
        prototype: prototype_ref,
    });
    scope
        .state()
        .bridge
        .borrow_mut()
        .templates
        .insert(Rc::clone(&template));

    debug!(
        class = class.name(),
        methods = template.table.instance_methods.len(),
        class_methods = template.table.class_methods.len(),
        properties = template.table.properties.len(),
        "class template built"
    );
    Ok(template)
}

/// The bridged class behind a constructor value
pub(crate) fn class_for_constructor(scope: &Scope, value: &Value) -> Option<Rc<ClassDescriptor>> {
    let constructor = value.as_object()?;
    scope
        .state()
        .bridge
        .borrow()
        .templates
        .class_for_constructor(constructor)
}
