//! Integration tests for value conversion
//!
//! Tests cover:
//! - Nested collections in both directions
//! - Dates, byte buffers, classes, selectors and closures
//! - Requested kinds and their coercions
//! - Conversion failures

mod common;

use chrono::{TimeZone, Utc};
use common::{global, setup};
use tandem_engine::{
    BridgeError, BridgeOptions, ConversionError, ExpectedKind, Value, VirtualMachine,
};
use tandem_sdk::{NativeClosure, NativeValue, ScriptToken, Selector};

#[test]
fn test_nested_collections_round_trip() {
    let vm = VirtualMachine::new().unwrap();
    let context = vm.new_context();
    let native = NativeValue::Array(vec![
        NativeValue::Number(1.0),
        NativeValue::String("two".into()),
        NativeValue::Null,
        NativeValue::dictionary([
            ("flags", NativeValue::Array(vec![NativeValue::Bool(true)])),
            ("name", NativeValue::String("nested".into())),
        ]),
    ]);

    context.execute(|scope| {
        let value = scope.wrap(&native).unwrap();
        assert!(scope.is_array(&value));
        assert_eq!(scope.property(&value, "length").unwrap(), Value::Number(4.0));
        assert_eq!(scope.unwrap(&value, None).unwrap(), native);
    });
}

#[test]
fn test_context_globals() {
    let vm = VirtualMachine::new().unwrap();
    let context = vm.new_context();
    context
        .set("config", &NativeValue::dictionary([("retries", NativeValue::Number(3.0))]))
        .unwrap();
    let config = context.get("config").unwrap();
    assert_eq!(config.get("retries"), Some(&NativeValue::Number(3.0)));
    assert_eq!(context.get("missing").unwrap(), NativeValue::Nil);
}

#[test]
fn test_dates() {
    let vm = VirtualMachine::new().unwrap();
    let context = vm.new_context();
    let when = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();

    context.execute(|scope| {
        let value = scope.wrap(&NativeValue::Date(when)).unwrap();
        assert!(scope.is_date(&value));
        assert_eq!(scope.unwrap(&value, None).unwrap(), NativeValue::Date(when));
        assert_eq!(scope.to_date(&value), Some(when));
        assert_eq!(scope.to_date(&Value::Number(0.0)), Utc.timestamp_millis_opt(0).single());
        assert_eq!(scope.to_date(&Value::string("today")), None);

        let invalid = scope.new_date(f64::NAN);
        assert_eq!(scope.unwrap(&invalid, None).unwrap(), NativeValue::Nil);
    });
}

#[test]
fn test_sub_millisecond_dates() {
    let vm = VirtualMachine::new().unwrap();
    let context = vm.new_context();
    let when = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
    let before_epoch = Utc.timestamp_opt(-1, 999_500_000).unwrap();

    context.execute(|scope| {
        for date in [when, before_epoch] {
            let value = scope.wrap(&NativeValue::Date(date)).unwrap();
            assert_eq!(scope.unwrap(&value, None).unwrap(), NativeValue::Date(date));
            assert_eq!(scope.to_date(&value), Some(date));
        }

        // Scripts see whole milliseconds
        let value = scope.wrap(&NativeValue::Date(when)).unwrap();
        assert_eq!(scope.to_double(&value), 1_700_000_000_123.0);
    });
}

#[test]
fn test_byte_buffers() {
    let vm = VirtualMachine::new().unwrap();
    let context = vm.new_context();
    context.execute(|scope| {
        let value = scope.wrap(&NativeValue::Data(vec![1, 2, 3])).unwrap();
        assert!(scope.is_array_buffer(&value));
        assert_eq!(scope.to_array_buffer(&value), Some(vec![1, 2, 3]));

        let zeroed = scope.new_array_buffer_with_length(4);
        assert_eq!(scope.unwrap(&zeroed, None).unwrap(), NativeValue::Data(vec![0; 4]));
        assert_eq!(scope.to_array_buffer(&Value::Number(1.0)), None);
    });
}

#[test]
fn test_byte_buffers_disabled() {
    let options = BridgeOptions {
        typed_arrays: false,
        ..Default::default()
    };
    let vm = VirtualMachine::with_options(options).unwrap();
    let context = vm.new_context();
    context.execute(|scope| {
        let err = scope.wrap(&NativeValue::Data(vec![1])).unwrap_err();
        assert!(matches!(
            err,
            BridgeError::Conversion(ConversionError::TypedArraysDisabled)
        ));
    });
}

#[test]
fn test_expected_kinds() {
    let vm = VirtualMachine::new().unwrap();
    let context = vm.new_context();
    context.execute(|scope| {
        let unwrap = |value: &Value, kind| scope.unwrap(value, Some(kind)).unwrap();

        assert_eq!(unwrap(&Value::Number(3.7), ExpectedKind::Int32), NativeValue::Number(3.0));
        assert_eq!(unwrap(&Value::string("12"), ExpectedKind::Number), NativeValue::Number(12.0));
        assert_eq!(unwrap(&Value::Number(0.0), ExpectedKind::Bool), NativeValue::Bool(false));
        assert_eq!(
            unwrap(&Value::Number(1.5), ExpectedKind::String),
            NativeValue::String("1.5".into())
        );
        assert_eq!(unwrap(&Value::Null, ExpectedKind::String), NativeValue::Nil);
        assert_eq!(unwrap(&Value::Undefined, ExpectedKind::Array), NativeValue::Nil);

        assert_eq!(scope.to_number(&Value::Bool(true)), NativeValue::Bool(true));
        assert_eq!(scope.to_number(&Value::string("4")), NativeValue::Number(4.0));

        let err = scope.to_array(&Value::Number(3.0)).unwrap_err();
        assert!(matches!(
            err,
            BridgeError::Conversion(ConversionError::NotAnObject { target: "array", .. })
        ));
    });
}

#[test]
fn test_array_like_objects() {
    let vm = VirtualMachine::new().unwrap();
    let context = vm.new_context();
    context.execute(|scope| {
        let object = scope.new_object();
        scope.set(&object, "length", Value::Number(2.0)).unwrap();
        scope.set(&object, "0", Value::string("a")).unwrap();
        scope.set(&object, "1", Value::string("b")).unwrap();

        assert_eq!(
            scope.to_array(&object).unwrap(),
            NativeValue::Array(vec![
                NativeValue::String("a".into()),
                NativeValue::String("b".into()),
            ])
        );
    });
}

#[test]
fn test_functions_become_dictionaries() {
    let vm = VirtualMachine::new().unwrap();
    let context = vm.new_context();
    context.execute(|scope| {
        let function = scope.new_host_function("helper", |_, _| Ok(Value::Undefined));
        scope.set(&function, "version", Value::Number(2.0)).unwrap();
        assert_eq!(
            scope.unwrap(&function, None).unwrap(),
            NativeValue::dictionary([("version", NativeValue::Number(2.0))])
        );
    });
}

#[test]
fn test_classes_and_selectors() {
    let (_vm, context, class) = setup();
    context.execute(|scope| {
        let constructor = global(scope, "Counter");
        match scope.unwrap(&constructor, None).unwrap() {
            NativeValue::Class(found) => assert_eq!(found.id(), class.id()),
            other => panic!("expected a class, got {:?}", other),
        }

        let selector = scope
            .wrap(&NativeValue::Selector(Selector::new("add:")))
            .unwrap();
        assert_eq!(selector, Value::string("add:"));
    });
}

#[test]
fn test_closures() {
    let vm = VirtualMachine::new().unwrap();
    let context = vm.new_context();
    let closure = NativeClosure::new("d@?dd", |args| {
        let sum: f64 = args.iter().filter_map(NativeValue::as_f64).sum();
        Ok(NativeValue::Number(sum))
    })
    .unwrap();

    context.execute(|scope| {
        let function = scope.wrap(&NativeValue::Closure(closure.clone())).unwrap();
        assert!(scope.is_function(&function));
        assert!(scope.is_equal(
            &function,
            &scope.wrap(&NativeValue::Closure(closure.clone())).unwrap()
        ));

        let sum = scope
            .call_with_arguments(&function, &[NativeValue::Number(2.0), NativeValue::Number(3.0)])
            .unwrap();
        assert_eq!(sum, Value::Number(5.0));

        let back = scope.to_closure(&function).unwrap();
        assert!(back.ptr_eq(&closure));
        assert_eq!(scope.unwrap(&function, None).unwrap(), NativeValue::Closure(closure.clone()));

        let err = scope
            .call_with_arguments(&function, &[NativeValue::Number(2.0)])
            .unwrap_err();
        assert_eq!(err.exception().unwrap().message, "closure expects 2 arguments but got 1");
    });
}

#[test]
fn test_foreign_script_token() {
    let vm = VirtualMachine::new().unwrap();
    let context = vm.new_context();
    context.execute(|scope| {
        let err = scope
            .wrap(&NativeValue::Script(ScriptToken::new(5u32)))
            .unwrap_err();
        assert!(matches!(err, BridgeError::Conversion(ConversionError::ForeignToken)));
    });
}

#[test]
fn test_depth_limit() {
    let options = BridgeOptions {
        max_conversion_depth: 3,
        ..Default::default()
    };
    let vm = VirtualMachine::with_options(options).unwrap();
    let context = vm.new_context();
    context.execute(|scope| {
        let mut value = scope.new_object();
        for _ in 0..5 {
            let outer = scope.new_object();
            scope.set(&outer, "inner", value).unwrap();
            value = outer;
        }
        let err = scope.to_dictionary(&value).unwrap_err();
        assert!(matches!(
            err,
            BridgeError::Conversion(ConversionError::DepthExceeded(3))
        ));
    });
}
