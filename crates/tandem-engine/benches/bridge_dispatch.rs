use std::cell::Cell;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tandem_engine::VirtualMachine;
use tandem_sdk::{arg, ClassBuilder, Instance, NativeValue, ProtocolBuilder};

fn bench_dispatch(c: &mut Criterion) {
    let exports = ProtocolBuilder::new("TallyExports")
        .exported()
        .method("add:", "d@:d")
        .readonly_property("total", "d")
        .build()
        .unwrap();
    let class = ClassBuilder::new("Tally")
        .adopt(&exports)
        .instance_method("add:", |recv, args| {
            let total = recv.state::<Cell<f64>>().unwrap();
            total.set(total.get() + arg::<f64>(args, 0)?);
            Ok(NativeValue::Number(total.get()))
        })
        .instance_method("total", |recv, _| {
            Ok(NativeValue::Number(recv.state::<Cell<f64>>().unwrap().get()))
        })
        .build();
    let native = Instance::create(&class, Cell::new(0.0));

    let vm = VirtualMachine::new().unwrap();
    let context = vm.new_context();

    c.bench_function("wrapper_lookup", |b| {
        let value = NativeValue::Object(native.clone());
        b.iter(|| {
            context.execute(|scope| {
                scope.wrap(black_box(&value)).unwrap();
            })
        });
    });

    c.bench_function("method_call", |b| {
        context.execute(|scope| {
            let tally = scope.wrap(&NativeValue::Object(native.clone())).unwrap();
            b.iter(|| {
                scope
                    .invoke_method(&tally, "add", &[NativeValue::Number(black_box(1.0))])
                    .unwrap()
            });
        });
    });

    c.bench_function("property_get", |b| {
        context.execute(|scope| {
            let tally = scope.wrap(&NativeValue::Object(native.clone())).unwrap();
            b.iter(|| scope.property(&tally, black_box("total")).unwrap());
        });
    });
}

fn bench_conversion(c: &mut Criterion) {
    let vm = VirtualMachine::new().unwrap();
    let context = vm.new_context();
    let mut group = c.benchmark_group("conversion");

    for size in [16usize, 256] {
        let native = NativeValue::Array(
            (0..size)
                .map(|i| NativeValue::dictionary([("index", NativeValue::Number(i as f64))]))
                .collect(),
        );
        group.bench_with_input(BenchmarkId::new("round_trip", size), &native, |b, native| {
            b.iter(|| {
                context.execute(|scope| {
                    let value = scope.wrap(black_box(native)).unwrap();
                    scope.unwrap(&value, None).unwrap()
                })
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_dispatch, bench_conversion);
criterion_main!(benches);
