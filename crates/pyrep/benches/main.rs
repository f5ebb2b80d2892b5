use criterion::{Bencher, Criterion, black_box, criterion_group, criterion_main};
use pyrep::{AttrMap, BinaryOp, CallSite, GetAttr, Runtime, Slot, TypeRef, TypeSpec, Value};

/// `int + int` through the generic path: resolve the operands, then dispatch.
fn generic_int_add(bench: &mut Bencher) {
    let rt = Runtime::default();
    let (a, b) = (Value::Int(20), Value::Int(22));
    bench.iter(|| black_box(rt.binary(Slot::Add, black_box(&a), black_box(&b)).unwrap()));
}

/// `int + int` through a warmed call site.
fn cached_int_add(bench: &mut Bencher) {
    let rt = Runtime::default();
    let site = CallSite::new(BinaryOp(Slot::Add));
    let args = [Value::Int(20), Value::Int(22)];
    site.invoke(&rt, &args).unwrap();
    bench.iter(|| black_box(site.invoke(&rt, black_box(&args)).unwrap()));
}

/// `a + b` on a guest class, through a warmed call site.
fn cached_guest_add(bench: &mut Bencher) {
    let rt = Runtime::default();
    let ty = rt
        .create_type(TypeSpec::new("Money").method("__add__", |_rt, args| Ok(args[0].clone())))
        .unwrap();
    let obj = rt.new_instance(&ty).unwrap();
    let site = CallSite::new(BinaryOp(Slot::Add));
    let args = [obj.clone(), obj];
    site.invoke(&rt, &args).unwrap();
    bench.iter(|| black_box(site.invoke(&rt, black_box(&args)).unwrap()));
}

fn point(rt: &Runtime) -> (TypeRef, Value) {
    let ty = rt.create_type(TypeSpec::new("Point")).unwrap();
    let mut attrs = AttrMap::default();
    attrs.insert("x".into(), Value::Int(1));
    let obj = rt.new_instance_with(&ty, attrs).unwrap();
    (ty, obj)
}

fn generic_get_attr(bench: &mut Bencher) {
    let rt = Runtime::default();
    let (_ty, obj) = point(&rt);
    bench.iter(|| black_box(rt.get_attr(black_box(&obj), "x").unwrap()));
}

fn cached_get_attr(bench: &mut Bencher) {
    let rt = Runtime::default();
    let (_ty, obj) = point(&rt);
    let site = CallSite::new(GetAttr::new("x"));
    let args = [obj];
    site.invoke(&rt, &args).unwrap();
    bench.iter(|| black_box(site.invoke(&rt, black_box(&args)).unwrap()));
}

fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("add__generic", generic_int_add);
    c.bench_function("add__cached", cached_int_add);
    c.bench_function("add__cached_guest", cached_guest_add);
    c.bench_function("getattr__generic", generic_get_attr);
    c.bench_function("getattr__cached", cached_get_attr);
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
