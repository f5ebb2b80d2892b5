//! Tests for inline-cached call sites.
//!
//! A cached invocation must behave exactly like the generic path; these tests
//! compare the two and check guard bookkeeping.
use std::{sync::Arc, thread};

use pretty_assertions::assert_eq;
use pyrep::{
    BinaryOp, CallSite, Comparison, Function, GetAttr, InPlaceOp, Invoke, RecordingTracer, RichCompare, Runtime,
    RuntimeConfig, Slot, TraceEvent, TypeSpec, UnaryOp, Value, native_fn,
};

fn int(v: &Value) -> i64 {
    match v {
        Value::Int(i) => *i,
        other => panic!("expected int, got {other:?}"),
    }
}

fn text(v: &Value) -> String {
    v.as_str().expect("expected str").to_owned()
}

/// Shapes A, B, A: the third call hits the guard installed by the first.
#[test]
fn repeated_shape_hits_the_guard() {
    let rt = Runtime::default();
    let site = CallSite::new(BinaryOp(Slot::Add));
    let a = [Value::Int(2), Value::Int(3)];
    let b = [Value::Float(0.5), Value::Float(0.25)];

    assert_eq!(int(&site.invoke(&rt, &a).unwrap()), 5);
    assert!(matches!(site.invoke(&rt, &b).unwrap(), Value::Float(f) if f == 0.75));
    assert_eq!(site.fallback_calls(), 2);

    let cached = site.invoke(&rt, &a).unwrap();
    assert_eq!(site.fallback_calls(), 2);
    assert_eq!(site.guard_count(), 2);
    let generic = rt.binary(Slot::Add, &a[0], &a[1]).unwrap();
    assert!(cached.is(&generic));
}

/// Values of one host class but different guest types get separate guards.
#[test]
fn guest_types_are_part_of_the_shape() {
    let rt = Runtime::default();
    let left = rt
        .create_type(TypeSpec::new("Left").method("__neg__", |_rt, _args| Ok(Value::from("left"))))
        .unwrap();
    let right = rt
        .create_type(TypeSpec::new("Right").method("__neg__", |_rt, _args| Ok(Value::from("right"))))
        .unwrap();
    let site = CallSite::new(UnaryOp(Slot::Neg));
    let l = rt.new_instance(&left).unwrap();
    let r = rt.new_instance(&right).unwrap();

    assert_eq!(text(&site.invoke(&rt, &[l.clone()]).unwrap()), "left");
    assert_eq!(text(&site.invoke(&rt, &[r]).unwrap()), "right");
    assert_eq!(text(&site.invoke(&rt, &[l]).unwrap()), "left");
    assert_eq!(site.fallback_calls(), 2);
}

#[test]
fn guard_chain_is_bounded() {
    let tracer = Arc::new(RecordingTracer::new());
    let rt = Runtime::with_tracer(RuntimeConfig::new().max_guard_chain(2), tracer.clone());
    let site = CallSite::new(RichCompare(Comparison::Lt));
    let shapes = [
        [Value::Int(1), Value::Int(2)],
        [Value::Float(1.0), Value::Float(2.0)],
        [Value::from("a"), Value::from("b")],
    ];
    tracer.clear();
    for args in &shapes {
        assert!(matches!(site.invoke(&rt, args).unwrap(), Value::Bool(true)));
    }
    assert_eq!(site.guard_count(), 2);
    // the third shape was never cached
    site.invoke(&rt, &shapes[2]).unwrap();
    assert_eq!(site.fallback_calls(), 4);

    let installed: Vec<usize> = tracer
        .events()
        .into_iter()
        .filter_map(|event| match event {
            TraceEvent::GuardInstalled { site: "compare", chain_len } => Some(chain_len),
            _ => None,
        })
        .collect();
    assert_eq!(installed, vec![1, 2]);
}

#[test]
fn zero_limit_disables_caching() {
    let rt = Runtime::new(RuntimeConfig::new().max_guard_chain(0));
    let site = CallSite::new(BinaryOp(Slot::Mul));
    for _ in 0..3 {
        assert_eq!(int(&site.invoke(&rt, &[Value::Int(6), Value::Int(7)]).unwrap()), 42);
    }
    assert_eq!(site.guard_count(), 0);
    assert_eq!(site.fallback_calls(), 3);
}

/// A failed first call installs nothing, and the error matches the generic path.
#[test]
fn errors_do_not_install_guards() {
    let rt = Runtime::default();
    let site = CallSite::new(BinaryOp(Slot::Add));
    let args = [Value::from("a"), Value::Int(1)];
    let cached = site.invoke(&rt, &args).unwrap_err();
    let generic = rt.binary(Slot::Add, &args[0], &args[1]).unwrap_err();
    assert_eq!(cached.to_string(), generic.to_string());
    assert_eq!(site.guard_count(), 0);

    let err = site.invoke(&rt, &[Value::Int(1)]).unwrap_err();
    assert_eq!(err.to_string(), "binary() takes 2 positional arguments but 1 were given");
}

/// Reassigning a special method is seen by a site that already cached the type.
#[test]
fn type_mutation_reaches_cached_sites() {
    let rt = Runtime::default();
    let counter = rt
        .create_type(TypeSpec::new("Counter").method("__add__", |_rt, _args| Ok(Value::Int(1))))
        .unwrap();
    let obj = rt.new_instance(&counter).unwrap();
    let site = CallSite::new(BinaryOp(Slot::Add));
    let args = [obj.clone(), obj];
    assert_eq!(int(&site.invoke(&rt, &args).unwrap()), 1);

    let replacement = Function::new("__add__", native_fn(|_rt, _args| Ok(Value::Int(2))));
    rt.set_attr(
        &Value::Type(Arc::clone(&counter)),
        "__add__",
        Value::Function(Arc::new(replacement)),
    )
    .unwrap();
    assert_eq!(int(&site.invoke(&rt, &args).unwrap()), 2);
    assert_eq!(site.fallback_calls(), 1);

    rt.del_attr(&Value::Type(counter), "__add__").unwrap();
    let err = site.invoke(&rt, &args).unwrap_err();
    assert_eq!(err.to_string(), "unsupported operand type(s) for +: 'Counter' and 'Counter'");
}

#[test]
fn inplace_site() {
    let rt = Runtime::default();
    let site = CallSite::new(InPlaceOp(Slot::ISub));
    assert_eq!(int(&site.invoke(&rt, &[Value::Int(10), Value::Int(4)]).unwrap()), 6);
    assert_eq!(int(&site.invoke(&rt, &[Value::Int(1), Value::Int(4)]).unwrap()), -3);
    assert_eq!(site.fallback_calls(), 1);
}

#[test]
fn getattr_site() {
    let rt = Runtime::default();
    let point = rt.create_type(TypeSpec::new("Point").attr("x", 0_i64)).unwrap();
    let site = CallSite::new(GetAttr::new("x"));
    let p = rt.new_instance(&point).unwrap();
    let q = rt.new_instance(&point).unwrap();
    rt.set_attr(&q, "x", Value::Int(7)).unwrap();

    assert_eq!(int(&site.invoke(&rt, &[p.clone()]).unwrap()), 0);
    assert_eq!(int(&site.invoke(&rt, &[q]).unwrap()), 7);
    assert_eq!(site.fallback_calls(), 1);

    // class attributes are read live, not cached
    rt.set_attr(&Value::Type(point), "x", Value::Int(3)).unwrap();
    assert_eq!(int(&site.invoke(&rt, &[p.clone()]).unwrap()), 3);

    let err = CallSite::new(GetAttr::new("missing")).invoke(&rt, &[p]).unwrap_err();
    assert_eq!(err.to_string(), "'Point' object has no attribute 'missing'");
}

#[test]
fn invoke_site() {
    let rt = Runtime::default();
    let greeter = rt
        .create_type(
            TypeSpec::new("Greeter")
                .method("__init__", |rt, args| {
                    rt.set_attr(&args[0], "name", args[1].clone())?;
                    Ok(Value::None)
                })
                .method("__call__", |rt, args| {
                    let name = rt.get_attr(&args[0], "name")?;
                    Ok(Value::from(format!("hello {}", name.as_str().unwrap_or_default())))
                }),
        )
        .unwrap();
    let site = CallSite::new(Invoke);

    let g = site.invoke(&rt, &[Value::Type(greeter), Value::from("ada")]).unwrap();
    assert_eq!(text(&site.invoke(&rt, &[g.clone()]).unwrap()), "hello ada");
    assert_eq!(text(&site.invoke(&rt, &[g]).unwrap()), "hello ada");
    assert_eq!(site.fallback_calls(), 2);

    let double = Value::Function(Arc::new(Function::new(
        "double",
        native_fn(|rt, args| rt.binary(Slot::Add, &args[0], &args[0])),
    )));
    assert_eq!(int(&site.invoke(&rt, &[double, Value::Int(21)]).unwrap()), 42);

    let err = site.invoke(&rt, &[Value::Int(1)]).unwrap_err();
    assert_eq!(err.to_string(), "'int' object is not callable");
    let err = site.invoke(&rt, &[]).unwrap_err();
    assert_eq!(err.to_string(), "call site invoked without a callable");
}

/// Threads sharing one site agree on the result and never grow the chain past one guard.
#[test]
fn concurrent_invocations_share_the_chain() {
    const THREADS: usize = 8;
    let rt = Runtime::default();
    let site = CallSite::new(BinaryOp(Slot::Add));
    thread::scope(|scope| {
        for i in 0..THREADS {
            let (rt, site) = (&rt, &site);
            scope.spawn(move || {
                for j in 0..100 {
                    let (a, b) = (i as i64, j);
                    assert_eq!(int(&site.invoke(rt, &[Value::Int(a), Value::Int(b)]).unwrap()), a + b);
                }
            });
        }
    });
    assert_eq!(site.guard_count(), 1);
    assert!(site.fallback_calls() <= THREADS);
}
