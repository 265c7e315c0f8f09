//! Built-in prototypes and constructors of a context

use std::any::Any;
use std::rc::{Rc, Weak};

use chrono::{DateTime, Months, NaiveDate, Utc};

use super::context::ContextState;
use super::function::{HostCallable, Invocation, ScriptResult};
use super::machine::VmState;
use super::object::{ErrorKind, FunctionData, HeapObject, ObjectKind, Property, PropertySlot};
use super::scope::Scope;
use super::value::{ObjectRef, Value};

/// Prototype objects shared by every object created in a context
pub(crate) struct Intrinsics {
    pub object_prototype: ObjectRef,
    pub function_prototype: ObjectRef,
    pub array_prototype: ObjectRef,
    pub error_prototype: ObjectRef,
    pub type_error_prototype: ObjectRef,
    pub range_error_prototype: ObjectRef,
    pub date_prototype: ObjectRef,
    pub regexp_prototype: ObjectRef,
    pub array_buffer_prototype: ObjectRef,
}

impl Intrinsics {
    /// Allocate the prototypes, the global object and the built-in
    /// constructors installed on it
    pub fn create(vm: &VmState, context: &Weak<ContextState>) -> (Intrinsics, ObjectRef) {
        let ordinary = |proto: Option<ObjectRef>| vm.allocate(HeapObject::new(ObjectKind::Ordinary, proto));

        let object_prototype = ordinary(None);
        let function_prototype = ordinary(Some(object_prototype));
        let array_prototype = ordinary(Some(object_prototype));
        let error_prototype = ordinary(Some(object_prototype));
        let type_error_prototype = ordinary(Some(error_prototype));
        let range_error_prototype = ordinary(Some(error_prototype));
        let date_prototype = ordinary(Some(object_prototype));
        let regexp_prototype = ordinary(Some(object_prototype));
        let array_buffer_prototype = ordinary(Some(object_prototype));
        let global = ordinary(Some(object_prototype));

        let intrinsics = Intrinsics {
            object_prototype,
            function_prototype,
            array_prototype,
            error_prototype,
            type_error_prototype,
            range_error_prototype,
            date_prototype,
            regexp_prototype,
            array_buffer_prototype,
        };

        for kind in [ErrorKind::Error, ErrorKind::TypeError, ErrorKind::RangeError] {
            let proto = intrinsics.error_prototype(kind);
            if let Some(object) = vm.heap.borrow_mut().get_mut(proto) {
                object
                    .properties
                    .insert("name", Property::hidden(Value::string(kind.name())));
                object
                    .properties
                    .insert("message", Property::hidden(Value::string("")));
            }
        }

        let constructors = [
            (Builtin::Object, object_prototype),
            (Builtin::Array, array_prototype),
            (Builtin::Error(ErrorKind::Error), error_prototype),
            (Builtin::Error(ErrorKind::TypeError), type_error_prototype),
            (Builtin::Error(ErrorKind::RangeError), range_error_prototype),
            (Builtin::Date, date_prototype),
            (Builtin::RegExp, regexp_prototype),
            (Builtin::ArrayBuffer, array_buffer_prototype),
        ];
        for (builtin, prototype) in constructors {
            let name = builtin.name();
            let mut function = HeapObject::new(
                ObjectKind::Function(FunctionData {
                    name: Rc::from(name),
                    callable: Rc::new(BuiltinConstructor(builtin)),
                    context: context.clone(),
                }),
                Some(function_prototype),
            );
            function.properties.insert("prototype", readonly(Value::Object(prototype)));
            let ctor = vm.allocate(function);

            let mut heap = vm.heap.borrow_mut();
            if let Some(proto) = heap.get_mut(prototype) {
                proto
                    .properties
                    .insert("constructor", Property::hidden(Value::Object(ctor)));
            }
            if let Some(global) = heap.get_mut(global) {
                global.properties.insert(name, Property::hidden(Value::Object(ctor)));
            }
        }

        if let Some(object) = vm.heap.borrow_mut().get_mut(global) {
            object
                .properties
                .insert("globalThis", Property::hidden(Value::Object(global)));
        }

        (intrinsics, global)
    }

    /// Prototype of errors of `kind`
    pub fn error_prototype(&self, kind: ErrorKind) -> ObjectRef {
        match kind {
            ErrorKind::Error => self.error_prototype,
            ErrorKind::TypeError => self.type_error_prototype,
            ErrorKind::RangeError => self.range_error_prototype,
        }
    }

    pub fn all(&self) -> [ObjectRef; 9] {
        [
            self.object_prototype,
            self.function_prototype,
            self.array_prototype,
            self.error_prototype,
            self.type_error_prototype,
            self.range_error_prototype,
            self.date_prototype,
            self.regexp_prototype,
            self.array_buffer_prototype,
        ]
    }
}

fn readonly(value: Value) -> Property {
    Property {
        slot: PropertySlot::Data {
            value,
            writable: false,
        },
        enumerable: false,
        configurable: false,
    }
}

#[derive(Debug, Clone, Copy)]
enum Builtin {
    Object,
    Array,
    Error(ErrorKind),
    Date,
    RegExp,
    ArrayBuffer,
}

impl Builtin {
    fn name(self) -> &'static str {
        match self {
            Builtin::Object => "Object",
            Builtin::Array => "Array",
            Builtin::Error(kind) => kind.name(),
            Builtin::Date => "Date",
            Builtin::RegExp => "RegExp",
            Builtin::ArrayBuffer => "ArrayBuffer",
        }
    }
}

struct BuiltinConstructor(Builtin);

impl HostCallable for BuiltinConstructor {
    fn call(&self, scope: &Scope, inv: &Invocation) -> ScriptResult<Value> {
        match self.0 {
            Builtin::Object => match inv.arg(0) {
                value @ Value::Object(_) => Ok(value),
                _ => Ok(scope.new_object()),
            },
            Builtin::Array => match inv.args.as_slice() {
                [Value::Number(n)] => {
                    let len = *n as usize;
                    if n.fract() != 0.0 || *n < 0.0 || len > crate::defaults::MAX_ARRAY_LENGTH {
                        return Err(scope.throw_range_error("Invalid array length"));
                    }
                    Ok(scope.new_array(vec![Value::Undefined; len]))
                }
                items => Ok(scope.new_array(items.to_vec())),
            },
            Builtin::Error(kind) => {
                let message = match inv.arg(0) {
                    Value::Undefined => String::new(),
                    value => scope.to_string(&value),
                };
                Ok(scope.new_error(kind, &message))
            }
            Builtin::Date => Ok(scope.new_date(date_from_arguments(scope, &inv.args))),
            Builtin::RegExp => {
                let pattern = match inv.arg(0) {
                    Value::Undefined => "(?:)".to_string(),
                    value => scope.to_string(&value),
                };
                let flags = match inv.arg(1) {
                    Value::Undefined => String::new(),
                    value => scope.to_string(&value),
                };
                Ok(scope.new_regexp(&pattern, &flags))
            }
            Builtin::ArrayBuffer => {
                let n = scope.to_double(&inv.arg(0));
                let len = if n.is_nan() { 0 } else { n as usize };
                if n < 0.0 || len > crate::defaults::MAX_ARRAY_LENGTH {
                    return Err(scope.throw_range_error("Array buffer allocation failed"));
                }
                Ok(scope.new_array_buffer(vec![0; len]))
            }
        }
    }

    fn is_constructor(&self) -> bool {
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn date_from_arguments(scope: &Scope, args: &[Value]) -> f64 {
    match args {
        [] => Utc::now().timestamp_millis() as f64,
        [Value::String(s)] => parse_date(s),
        [single] => scope.to_double(single),
        fields => {
            let field = |i: usize, default: f64| {
                fields.get(i).map(|v| scope.to_double(v)).unwrap_or(default)
            };
            let parts = [
                field(0, f64::NAN),
                field(1, 0.0),
                field(2, 1.0),
                field(3, 0.0),
                field(4, 0.0),
                field(5, 0.0),
                field(6, 0.0),
            ];
            if parts.iter().any(|p| !p.is_finite()) {
                return f64::NAN;
            }
            let [year, month, day, hour, minute, second, millis] = parts.map(|p| p.trunc() as i64);
            let start = NaiveDate::from_ymd_opt(year as i32, 1, 1)
                .and_then(|d| d.checked_add_months(Months::new(month.clamp(0, 1200) as u32)))
                .and_then(|d| d.and_hms_opt(0, 0, 0));
            let Some(start) = start else {
                return f64::NAN;
            };
            let offset = (day - 1) * 86_400_000
                + hour * 3_600_000
                + minute * 60_000
                + second * 1_000
                + millis;
            (start.and_utc().timestamp_millis() + offset) as f64
        }
    }
}

fn parse_date(s: &str) -> f64 {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.timestamp_millis() as f64;
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return dt.timestamp_millis() as f64;
    }
    match NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        Ok(date) => date
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp_millis() as f64)
            .unwrap_or(f64::NAN),
        Err(_) => f64::NAN,
    }
}
