//! Shared fixtures for the bridge integration tests
//!
//! - `Counter`: exports initializers, methods, renames, properties and
//!   subscripts
//! - `StepCounter`: a `Counter` subclass with one more exported method
//! - `Opaque`: exports nothing, built through its factory

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tandem_engine::{Context, ManagedValue, Scope, Value, VirtualMachine};
use tandem_sdk::{
    arg, ClassBuilder, ClassDescriptor, Instance, NativeException, NativeValue, Protocol,
    ProtocolBuilder, Receiver,
};

/// State of a counter instance
pub struct Counter {
    pub count: Cell<f64>,
    pub step: Cell<f64>,
    pub slots: RefCell<Vec<NativeValue>>,
    pub memo: RefCell<NativeValue>,
}

impl Counter {
    pub fn new(start: f64) -> Self {
        Self {
            count: Cell::new(start),
            step: Cell::new(1.0),
            slots: RefCell::new(Vec::new()),
            memo: RefCell::new(NativeValue::Nil),
        }
    }
}

fn counter(receiver: &Receiver) -> Result<&Counter, NativeException> {
    receiver
        .state::<Counter>()
        .ok_or_else(|| NativeException::invalid_argument("receiver is not a counter"))
}

pub fn counter_exports() -> Rc<Protocol> {
    ProtocolBuilder::new("CounterExports")
        .exported()
        .initializer("init", "@@:")
        .initializer("initWithValue:", "@@:d")
        .class_method("counterWithValue:", "@#:d")
        .method("increment", "d@:")
        .method("add:", "d@:d")
        .method("doFoo:withBar:", "d@:dd")
        .method("reset", "v@:")
        .method("itself", "@@:")
        .method("merge:", "d@:@\"Counter\"")
        .method("remember:", "v@:V")
        .method("recall", "V@:")
        .method("fail", "v@:")
        .method("explode", "v@:")
        .method("objectAtIndexedSubscript:", "@@:I")
        .method("setObject:atIndexedSubscript:", "v@:@I")
        .readonly_property("count", "d")
        .property("step", "d")
        .export_as("foo", "doFoo:withBar:")
        .export_nullary_as("clear", "reset")
        .build()
        .unwrap()
}

fn create(receiver: &Receiver, start: f64) -> NativeValue {
    NativeValue::Object(Instance::create(&receiver.class(), Counter::new(start)))
}

pub fn counter_class() -> Rc<ClassDescriptor> {
    ClassBuilder::new("Counter")
        .adopt(&counter_exports())
        .class_method("init", |recv, _| Ok(create(recv, 0.0)))
        .class_method("initWithValue:", |recv, args| Ok(create(recv, arg(args, 0)?)))
        .class_method("counterWithValue:", |recv, args| Ok(create(recv, arg(args, 0)?)))
        .instance_method("increment", |recv, _| {
            let c = counter(recv)?;
            c.count.set(c.count.get() + c.step.get());
            Ok(NativeValue::Number(c.count.get()))
        })
        .instance_method("add:", |recv, args| {
            let c = counter(recv)?;
            c.count.set(c.count.get() + arg::<f64>(args, 0)?);
            Ok(NativeValue::Number(c.count.get()))
        })
        .instance_method("doFoo:withBar:", |_, args| {
            Ok(NativeValue::Number(arg::<f64>(args, 0)? * arg::<f64>(args, 1)?))
        })
        .instance_method("reset", |recv, _| {
            counter(recv)?.count.set(0.0);
            Ok(NativeValue::Nil)
        })
        .instance_method("itself", |recv, _| {
            Ok(recv.instance().cloned().map_or(NativeValue::Nil, NativeValue::Object))
        })
        .instance_method("merge:", |recv, args| {
            let other = match args.first() {
                Some(NativeValue::Object(other)) => other.clone(),
                _ => return Err(NativeException::invalid_argument("expected a counter")),
            };
            let other = Receiver::Instance(other);
            let c = counter(recv)?;
            c.count.set(c.count.get() + counter(&other)?.count.get());
            Ok(NativeValue::Number(c.count.get()))
        })
        .instance_method("remember:", |recv, args| {
            let value = args.first().cloned().unwrap_or(NativeValue::Nil);
            if let (NativeValue::Script(token), Some(owner), Some(context)) =
                (&value, recv.instance(), Context::current())
            {
                if let Some(managed) = token.downcast_ref::<ManagedValue>() {
                    context.virtual_machine().add_managed_reference(managed, owner);
                }
            }
            *counter(recv)?.memo.borrow_mut() = value;
            Ok(NativeValue::Nil)
        })
        .instance_method("recall", |recv, _| Ok(counter(recv)?.memo.borrow().clone()))
        .instance_method("fail", |_, _| {
            Err(NativeException::new("CounterException", "counter failed"))
        })
        .instance_method("explode", |_, _| panic!("counter exploded"))
        .instance_method("objectAtIndexedSubscript:", |recv, args| {
            let index: usize = arg(args, 0)?;
            Ok(counter(recv)?
                .slots
                .borrow()
                .get(index)
                .cloned()
                .unwrap_or(NativeValue::Nil))
        })
        .instance_method("setObject:atIndexedSubscript:", |recv, args| {
            let value = args.first().cloned().unwrap_or(NativeValue::Nil);
            let index: usize = arg(args, 1)?;
            let mut slots = counter(recv)?.slots.borrow_mut();
            if slots.len() <= index {
                slots.resize(index + 1, NativeValue::Nil);
            }
            slots[index] = value;
            Ok(NativeValue::Nil)
        })
        .instance_method("count", |recv, _| {
            Ok(NativeValue::Number(counter(recv)?.count.get()))
        })
        .instance_method("step", |recv, _| Ok(NativeValue::Number(counter(recv)?.step.get())))
        .instance_method("setStep:", |recv, args| {
            counter(recv)?.step.set(arg(args, 0)?);
            Ok(NativeValue::Nil)
        })
        .build()
}

pub fn step_counter_class(parent: &Rc<ClassDescriptor>) -> Rc<ClassDescriptor> {
    let exports = ProtocolBuilder::new("StepCounterExports")
        .exported()
        .method("double", "d@:")
        .build()
        .unwrap();
    ClassBuilder::new("StepCounter")
        .superclass(parent)
        .adopt(&exports)
        .instance_method("double", |recv, _| {
            let c = counter(recv)?;
            c.count.set(c.count.get() * 2.0);
            Ok(NativeValue::Number(c.count.get()))
        })
        .build()
}

pub fn opaque_class() -> Rc<ClassDescriptor> {
    ClassBuilder::new("Opaque")
        .factory(|class| Instance::create(class, ()))
        .build()
}

/// A VM with one context that exposes `Counter`
pub fn setup() -> (VirtualMachine, Context, Rc<ClassDescriptor>) {
    let vm = VirtualMachine::new().unwrap();
    let context = vm.new_context();
    let class = counter_class();
    context.set_class("Counter", &class).unwrap();
    (vm, context, class)
}

/// `globalThis[name]`
pub fn global(scope: &Scope, name: &str) -> Value {
    scope.property(&scope.global(), name).unwrap()
}

/// `new Counter(start)`
pub fn new_counter(scope: &Scope, start: f64) -> Value {
    let constructor = global(scope, "Counter");
    scope
        .construct_with_arguments(&constructor, &[NativeValue::Number(start)])
        .unwrap()
}
