//! Integration tests for wrapper objects
//!
//! Tests cover:
//! - One wrapper per native object and context
//! - Exported properties, readonly writes and subscripts
//! - Script-side state on wrappers
//! - Wrappers whose native object was released

mod common;

use std::rc::Rc;

use common::{counter_class, new_counter, setup, Counter};
use tandem_engine::{Value, VirtualMachine};
use tandem_sdk::{downcast, native_id, Instance, NativeValue};

#[test]
fn test_wrapper_identity() {
    let (_vm, context, class) = setup();
    let native = Instance::create(&class, Counter::new(1.0));

    context.execute(|scope| {
        let a = scope.wrap(&NativeValue::Object(native.clone())).unwrap();
        let b = scope.wrap(&NativeValue::Object(native.clone())).unwrap();
        assert!(scope.is_equal(&a, &b));

        let itself = scope.invoke_method(&a, "itself", &[]).unwrap();
        assert!(scope.is_equal(&a, &itself));

        match scope.unwrap(&a, None).unwrap() {
            NativeValue::Object(back) => assert_eq!(native_id(&back), native_id(&native)),
            other => panic!("expected the native object, got {:?}", other),
        }
    });
}

#[test]
fn test_wrappers_are_per_context() {
    let vm = VirtualMachine::new().unwrap();
    let first = vm.new_context();
    let second = vm.new_context();
    let class = counter_class();
    let native = Instance::create(&class, Counter::new(1.0));

    first.execute(|a| {
        let in_first = a.wrap(&NativeValue::Object(native.clone())).unwrap();
        second.execute(|b| {
            let in_second = b.wrap(&NativeValue::Object(native.clone())).unwrap();
            assert!(!b.is_equal(&in_first, &in_second));
            assert_eq!(b.property(&in_second, "count").unwrap(), Value::Number(1.0));
        });
    });
}

#[test]
fn test_exported_properties() {
    let (_vm, context, _class) = setup();
    context.execute(|scope| {
        let counter = new_counter(scope, 10.0);
        assert!(scope.has_property(&counter, "count").unwrap());
        assert!(scope.has_property(&counter, "step").unwrap());

        // Readonly: the write is ignored
        scope
            .set_property(&counter, "count", &NativeValue::Number(99.0))
            .unwrap();
        assert_eq!(scope.property(&counter, "count").unwrap(), Value::Number(10.0));

        scope
            .set_property(&counter, "step", &NativeValue::Number(5.0))
            .unwrap();
        assert_eq!(scope.property(&counter, "step").unwrap(), Value::Number(5.0));
        assert_eq!(
            scope.invoke_method(&counter, "increment", &[]).unwrap(),
            Value::Number(15.0)
        );

        // Exported properties cannot be deleted
        assert!(!scope.delete_property(&counter, "step").unwrap());
        assert_eq!(scope.property(&counter, "step").unwrap(), Value::Number(5.0));
    });
}

#[test]
fn test_subscripts() {
    let (_vm, context, class) = setup();
    let native = Instance::create(&class, Counter::new(0.0));

    context.execute(|scope| {
        let counter = scope.wrap(&NativeValue::Object(native.clone())).unwrap();
        scope
            .set_value_at_index(&counter, 2, &NativeValue::String("third".into()))
            .unwrap();
        assert_eq!(scope.value_at_index(&counter, 2).unwrap(), Value::string("third"));
        assert!(scope.value_at_index(&counter, 0).unwrap().is_undefined());
    });

    let state = downcast::<Instance<Counter>>(&native).unwrap();
    assert_eq!(state.state.slots.borrow().len(), 3);
    assert_eq!(state.state.slots.borrow()[2], NativeValue::String("third".into()));
}

#[test]
fn test_expando_properties() {
    let (_vm, context, _class) = setup();
    context.execute(|scope| {
        let counter = new_counter(scope, 0.0);
        scope
            .set_property(&counter, "label", &NativeValue::String("primary".into()))
            .unwrap();
        assert_eq!(scope.property(&counter, "label").unwrap(), Value::string("primary"));
        assert_eq!(scope.own_keys(&counter), vec!["label".to_string()]);
    });
}

#[test]
fn test_define_property_on_object() {
    let vm = VirtualMachine::new().unwrap();
    let context = vm.new_context();
    context.execute(|scope| {
        let object = scope.new_object();
        let descriptor = NativeValue::dictionary([
            ("value", NativeValue::Number(42.0)),
            ("enumerable", NativeValue::Bool(true)),
        ]);
        scope.define_property_with(&object, "answer", &descriptor).unwrap();
        assert_eq!(scope.property(&object, "answer").unwrap(), Value::Number(42.0));

        // Not writable: the write is ignored
        scope
            .set_property(&object, "answer", &NativeValue::Number(1.0))
            .unwrap();
        assert_eq!(scope.property(&object, "answer").unwrap(), Value::Number(42.0));
        assert_eq!(scope.own_keys(&object), vec!["answer".to_string()]);
    });
}

#[test]
fn test_released_native_reads_as_undefined() {
    let vm = VirtualMachine::new().unwrap();
    let owner = vm.new_context();
    let observer = vm.new_context();
    let class = counter_class();
    owner.set_class("Counter", &class).unwrap();

    let native = Instance::create(&class, Counter::new(1.0));
    let weak = Rc::downgrade(&native);
    owner.execute(|a| {
        let wrapper = a.wrap(&NativeValue::Object(native.clone())).unwrap();
        observer.execute(|b| b.set(&b.global(), "kept", wrapper).unwrap());
    });

    // The owning context's registry held the last strong reference
    drop(native);
    drop(owner);
    assert!(weak.upgrade().is_none());

    observer.execute(|scope| {
        let kept = scope.property(&scope.global(), "kept").unwrap();
        assert!(scope.is_wrapper(&kept));
        assert_eq!(scope.unwrap(&kept, None).unwrap(), NativeValue::Nil);
        assert!(scope.property(&kept, "count").unwrap().is_undefined());
        assert!(scope.invoke_method(&kept, "increment", &[]).unwrap().is_undefined());
    });
}
