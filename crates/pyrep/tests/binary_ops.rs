//! Tests for operator dispatch: unary, binary with reflected precedence,
//! in-place and rich comparison.
use std::sync::Arc;

use num_bigint::BigInt;
use pretty_assertions::assert_eq;
use pyrep::{
    AttrMap, Comparison, DispatchPath, ExcType, RecordingTracer, RunError, Runtime, RuntimeConfig, Slot, TraceEvent,
    TypeRef, TypeSpec, Value,
};

fn text(v: &Value) -> String {
    v.as_str().expect("expected str").to_owned()
}

fn int(v: &Value) -> i64 {
    match v {
        Value::Int(i) => *i,
        other => panic!("expected int, got {other:?}"),
    }
}

fn truth(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        other => panic!("expected bool, got {other:?}"),
    }
}

fn paths(tracer: &RecordingTracer) -> Vec<DispatchPath> {
    tracer
        .events()
        .into_iter()
        .filter_map(|event| match event {
            TraceEvent::BinaryDispatch { path, .. } => Some(path),
            _ => None,
        })
        .collect()
}

fn traced() -> (Arc<RecordingTracer>, Runtime) {
    let tracer = Arc::new(RecordingTracer::new());
    let rt = Runtime::with_tracer(RuntimeConfig::default(), tracer.clone());
    (tracer, rt)
}

/// A two-component vector whose `__add__` only accepts other vectors.
fn vec2_type(rt: &Runtime) -> TypeRef {
    rt.create_type(TypeSpec::new("Vec2").method("__add__", |rt, args| {
        let (v, w) = (&args[0], &args[1]);
        if !rt.has_attr(w, "y")? {
            return Ok(Value::NotImplemented);
        }
        let ty = rt.type_of(v)?;
        let mut attrs = AttrMap::default();
        for axis in ["x", "y"] {
            let sum = rt.binary(Slot::Add, &rt.get_attr(v, axis)?, &rt.get_attr(w, axis)?)?;
            attrs.insert(axis.into(), sum);
        }
        rt.new_instance_with(&ty, attrs)
    }))
    .unwrap()
}

fn vec2(rt: &Runtime, ty: &TypeRef, x: i64, y: i64) -> Value {
    let mut attrs = AttrMap::default();
    attrs.insert("x".into(), Value::Int(x));
    attrs.insert("y".into(), Value::Int(y));
    rt.new_instance_with(ty, attrs).unwrap()
}

// ============================================================================
// Binary
// ============================================================================

#[test]
fn guest_forward_method() {
    let rt = Runtime::default();
    let ty = vec2_type(&rt);
    let sum = rt
        .binary(Slot::Add, &vec2(&rt, &ty, 1, 2), &vec2(&rt, &ty, 10, 20))
        .unwrap();
    assert_eq!(int(&rt.get_attr(&sum, "x").unwrap()), 11);
    assert_eq!(int(&rt.get_attr(&sum, "y").unwrap()), 22);
}

#[test]
fn unsupported_operands() {
    let rt = Runtime::default();
    let ty = vec2_type(&rt);
    let err = rt
        .binary(Slot::Add, &vec2(&rt, &ty, 1, 2), &Value::Int(5))
        .unwrap_err();
    assert!(matches!(err, RunError::OperandType { .. }));
    assert_eq!(err.exc_type(), ExcType::TypeError);
    assert_eq!(err.to_string(), "unsupported operand type(s) for +: 'Vec2' and 'int'");

    let err = rt.binary(Slot::Sub, &Value::from("a"), &Value::Int(1)).unwrap_err();
    assert_eq!(err.to_string(), "unsupported operand type(s) for -: 'str' and 'int'");
}

fn base_and_derived(rt: &Runtime, derived_declines: bool) -> (TypeRef, TypeRef) {
    let base = rt
        .create_type(TypeSpec::new("Base").method("__add__", |_rt, _args| Ok(Value::from("Base.__add__"))))
        .unwrap();
    let derived = rt
        .create_type(TypeSpec::new("Derived").base(&base).method("__radd__", move |_rt, _args| {
            Ok(if derived_declines {
                Value::NotImplemented
            } else {
                Value::from("Derived.__radd__")
            })
        }))
        .unwrap();
    (base, derived)
}

/// A right operand of a proper subtype gets the first chance through its reflected method.
#[test]
fn subtype_reflected_runs_first() {
    let (tracer, rt) = traced();
    let (base, derived) = base_and_derived(&rt, false);
    let b = rt.new_instance(&base).unwrap();
    let d = rt.new_instance(&derived).unwrap();
    tracer.clear();

    assert_eq!(text(&rt.binary(Slot::Add, &b, &d).unwrap()), "Derived.__radd__");
    assert_eq!(paths(&tracer), vec![DispatchPath::Reflected]);

    // no reordering the other way round
    tracer.clear();
    assert_eq!(text(&rt.binary(Slot::Add, &d, &b).unwrap()), "Base.__add__");
    assert_eq!(paths(&tracer), vec![DispatchPath::Forward]);
}

#[test]
fn declined_reflected_falls_back_to_forward() {
    let (tracer, rt) = traced();
    let (base, derived) = base_and_derived(&rt, true);
    let b = rt.new_instance(&base).unwrap();
    let d = rt.new_instance(&derived).unwrap();
    tracer.clear();
    assert_eq!(text(&rt.binary(Slot::Add, &b, &d).unwrap()), "Base.__add__");
    assert_eq!(paths(&tracer), vec![DispatchPath::Forward]);
}

/// Operands of the same type never consult the reflected method.
#[test]
fn same_type_skips_reflected() {
    let rt = Runtime::default();
    let ty = rt
        .create_type(
            TypeSpec::new("Picky")
                .method("__add__", |_rt, _args| Ok(Value::NotImplemented))
                .method("__radd__", |_rt, _args| Ok(Value::from("reflected"))),
        )
        .unwrap();
    let a = rt.new_instance(&ty).unwrap();
    let b = rt.new_instance(&ty).unwrap();
    let err = rt.binary(Slot::Add, &a, &b).unwrap_err();
    assert_eq!(err.to_string(), "unsupported operand type(s) for +: 'Picky' and 'Picky'");
}

/// An error other than "declined" stops the search.
#[test]
fn forward_errors_propagate() {
    let rt = Runtime::default();
    let failing = rt
        .create_type(TypeSpec::new("Failing").method("__mul__", |_rt, _args| Err(ExcType::value_error("bad operand"))))
        .unwrap();
    let obj = rt.new_instance(&failing).unwrap();
    let err = rt.binary(Slot::Mul, &obj, &Value::from("s")).unwrap_err();
    assert_eq!(err.exc_type(), ExcType::ValueError);
}

// ============================================================================
// Built-in numbers
// ============================================================================

#[test]
fn int_arithmetic_uses_the_grid() {
    let (tracer, rt) = traced();
    tracer.clear();
    assert_eq!(int(&rt.binary(Slot::Add, &Value::Int(2), &Value::Int(3)).unwrap()), 5);
    assert_eq!(int(&rt.binary(Slot::FloorDiv, &Value::Int(-7), &Value::Int(2)).unwrap()), -4);
    assert_eq!(int(&rt.binary(Slot::Mod, &Value::Int(-7), &Value::Int(2)).unwrap()), 1);
    assert_eq!(paths(&tracer), vec![DispatchPath::Grid; 3]);

    // not on the grid: the forward slot
    tracer.clear();
    assert_eq!(int(&rt.binary(Slot::LShift, &Value::Int(1), &Value::Int(4)).unwrap()), 16);
    assert_eq!(paths(&tracer), vec![DispatchPath::Forward]);
}

#[test]
fn int_overflow_promotes_and_demotes() {
    let rt = Runtime::default();
    let big = rt.binary(Slot::Add, &Value::Int(i64::MAX), &Value::Int(1)).unwrap();
    let Value::Long(li) = &big else {
        panic!("expected a long int, got {big:?}");
    };
    assert_eq!(li.inner(), &(BigInt::from(i64::MAX) + 1));
    assert_eq!(rt.repr(&big).unwrap(), "9223372036854775808");

    // long and small int share the grid, and results that fit come back small
    let back = rt.binary(Slot::Sub, &big, &Value::Int(1)).unwrap();
    assert_eq!(int(&back), i64::MAX);
    let neg = rt.unary(Slot::Neg, &Value::Int(i64::MIN)).unwrap();
    assert!(matches!(neg, Value::Long(_)));
    assert!(truth(&rt.compare(Comparison::Gt, &big, &Value::Int(0)).unwrap()));
}

#[test]
fn int_division_by_zero() {
    let rt = Runtime::default();
    let err = rt.binary(Slot::FloorDiv, &Value::Int(1), &Value::Int(0)).unwrap_err();
    assert_eq!(err.exc_type(), ExcType::ZeroDivisionError);
    assert_eq!(err.to_string(), "integer division or modulo by zero");
    let err = rt.binary(Slot::TrueDiv, &Value::Int(1), &Value::Int(0)).unwrap_err();
    assert_eq!(err.to_string(), "division by zero");
}

/// Shifts and powers whose result would exceed the configured size raise OverflowError.
#[test]
fn int_results_are_bounded() {
    let rt = Runtime::default();
    let err = rt.binary(Slot::LShift, &Value::Int(1), &Value::Int(1 << 62)).unwrap_err();
    assert_eq!(err.exc_type(), ExcType::OverflowError);
    assert_eq!(err.to_string(), "integer result too large");
    let err = rt.binary(Slot::Pow, &Value::Int(10), &Value::Int(i64::MAX)).unwrap_err();
    assert_eq!(err.exc_type(), ExcType::OverflowError);
    assert_eq!(int(&rt.binary(Slot::Pow, &Value::Int(-1), &Value::Int(i64::MAX)).unwrap()), -1);

    let big = rt.binary(Slot::LShift, &Value::Int(1), &Value::Int(100)).unwrap();
    assert!(matches!(big, Value::Long(_)));
    assert!(rt.binary(Slot::LShift, &big, &Value::Int(1 << 40)).is_err());

    let tight = Runtime::new(RuntimeConfig::new().max_result_bytes(32));
    assert!(tight.binary(Slot::Pow, &Value::Int(2), &Value::Int(127)).is_ok());
    assert!(tight.binary(Slot::Pow, &Value::Int(2), &Value::Int(200)).is_err());
}

/// `int / int` rounds once, even when the operands are not exact floats.
#[test]
fn int_true_division_is_correctly_rounded() {
    let rt = Runtime::default();
    let n = Value::Int(3 * ((1 << 53) + 1));
    let q = rt.binary(Slot::TrueDiv, &n, &Value::Int(3)).unwrap();
    assert!(matches!(q, Value::Float(f) if f == 9_007_199_254_740_992.0));
    let q = rt.binary(Slot::TrueDiv, &Value::Int(i64::MAX), &Value::Int(i64::MAX - 1)).unwrap();
    assert!(matches!(q, Value::Float(f) if f == 1.0));

    let big = rt.binary(Slot::LShift, &Value::Int(1), &Value::Int(1100)).unwrap();
    let err = rt.binary(Slot::TrueDiv, &big, &Value::Int(1)).unwrap_err();
    assert_eq!(err.exc_type(), ExcType::OverflowError);
    let q = rt.binary(Slot::TrueDiv, &big, &big).unwrap();
    assert!(matches!(q, Value::Float(f) if f == 1.0));
}

/// `int` declines a float operand and `float.__radd__` answers.
#[test]
fn mixed_int_and_float() {
    let (tracer, rt) = traced();
    tracer.clear();
    let sum = rt.binary(Slot::Add, &Value::Int(1), &Value::Float(2.5)).unwrap();
    assert!(matches!(sum, Value::Float(f) if f == 3.5));
    assert_eq!(paths(&tracer), vec![DispatchPath::Reflected]);

    let quotient = rt.binary(Slot::TrueDiv, &Value::Int(7), &Value::Int(2)).unwrap();
    assert!(matches!(quotient, Value::Float(f) if f == 3.5));
    let diff = rt.binary(Slot::Sub, &Value::Float(0.5), &Value::Int(2)).unwrap();
    assert!(matches!(diff, Value::Float(f) if f == -1.5));
    assert!(truth(&rt.compare(Comparison::Lt, &Value::Int(1), &Value::Float(2.5)).unwrap()));
}

/// `bool` is an `int` subtype with its own logical operators.
#[test]
fn bool_arithmetic() {
    let rt = Runtime::default();
    assert_eq!(int(&rt.binary(Slot::Add, &Value::Bool(true), &Value::Bool(true)).unwrap()), 2);
    assert_eq!(int(&rt.binary(Slot::Add, &Value::Int(1), &Value::Bool(true)).unwrap()), 2);
    assert!(!truth(&rt.binary(Slot::And, &Value::Bool(true), &Value::Bool(false)).unwrap()));
    assert!(truth(&rt.binary(Slot::Xor, &Value::Bool(true), &Value::Bool(false)).unwrap()));
    assert_eq!(int(&rt.binary(Slot::And, &Value::Bool(true), &Value::Int(3)).unwrap()), 1);
    assert_eq!(rt.repr(&Value::Bool(true)).unwrap(), "True");
}

#[test]
fn str_operations() {
    let rt = Runtime::default();
    let s = Value::from("ab");
    assert_eq!(text(&rt.binary(Slot::Add, &s, &Value::from("cd")).unwrap()), "abcd");
    assert_eq!(text(&rt.binary(Slot::Mul, &s, &Value::Int(3)).unwrap()), "ababab");
    assert_eq!(text(&rt.binary(Slot::Mul, &Value::Int(2), &s).unwrap()), "abab");
    assert_eq!(text(&rt.binary(Slot::Mul, &s, &Value::Int(-1)).unwrap()), "");
    assert_eq!(rt.len(&Value::from("héllo")).unwrap(), 5);
    assert_eq!(rt.repr(&Value::from("it's")).unwrap(), "\"it's\"");
    assert!(truth(&rt.compare(Comparison::Lt, &s, &Value::from("b")).unwrap()));
}

/// Repetition that would overflow or exceed the result limit raises instead of allocating.
#[test]
fn str_repetition_is_bounded() {
    let rt = Runtime::default();
    let err = rt.binary(Slot::Mul, &Value::from("abc"), &Value::Int(i64::MAX)).unwrap_err();
    assert_eq!(err.exc_type(), ExcType::OverflowError);
    assert_eq!(err.to_string(), "repeated string is too long");
    let err = rt.binary(Slot::Mul, &Value::Int(1 << 40), &Value::from("abc")).unwrap_err();
    assert_eq!(err.exc_type(), ExcType::OverflowError);

    let small = Runtime::new(RuntimeConfig::new().max_result_bytes(8));
    assert_eq!(text(&small.binary(Slot::Mul, &Value::from("ab"), &Value::Int(4)).unwrap()), "abababab");
    assert!(small.binary(Slot::Mul, &Value::from("ab"), &Value::Int(5)).is_err());
}

// ============================================================================
// In-place
// ============================================================================

#[test]
fn inplace_method_runs_first() {
    let (tracer, rt) = traced();
    let acc = rt
        .create_type(TypeSpec::new("Acc").method("__iadd__", |rt, args| {
            let total = rt.binary(Slot::Add, &rt.get_attr(&args[0], "total")?, &args[1])?;
            rt.set_attr(&args[0], "total", total)?;
            Ok(args[0].clone())
        }))
        .unwrap();
    let mut attrs = AttrMap::default();
    attrs.insert("total".into(), Value::Int(0));
    let obj = rt.new_instance_with(&acc, attrs).unwrap();
    tracer.clear();

    let result = rt.inplace(Slot::IAdd, &obj, &Value::Int(4)).unwrap();
    assert!(result.is(&obj));
    assert_eq!(int(&rt.get_attr(&obj, "total").unwrap()), 4);
    // the body's own int addition is traced first
    assert_eq!(paths(&tracer), vec![DispatchPath::Grid, DispatchPath::InPlace]);
}

#[test]
fn inplace_falls_back_to_binary() {
    let rt = Runtime::default();
    let ty = vec2_type(&rt);
    let a = vec2(&rt, &ty, 1, 1);
    let sum = rt.inplace(Slot::IAdd, &a, &vec2(&rt, &ty, 2, 3)).unwrap();
    assert!(!sum.is(&a));
    assert_eq!(int(&rt.get_attr(&sum, "y").unwrap()), 4);

    assert_eq!(int(&rt.inplace(Slot::IMul, &Value::Int(6), &Value::Int(7)).unwrap()), 42);

    let err = rt.inplace(Slot::IAdd, &a, &Value::Int(1)).unwrap_err();
    assert_eq!(err.to_string(), "unsupported operand type(s) for +=: 'Vec2' and 'int'");
}

// ============================================================================
// Unary
// ============================================================================

#[test]
fn unary_operators() {
    let rt = Runtime::default();
    assert_eq!(int(&rt.unary(Slot::Neg, &Value::Int(3)).unwrap()), -3);
    assert_eq!(int(&rt.unary(Slot::Invert, &Value::Int(0)).unwrap()), -1);
    assert!(matches!(rt.unary(Slot::Abs, &Value::Float(-2.0)).unwrap(), Value::Float(f) if f == 2.0));

    let plain = rt.create_type(TypeSpec::new("Plain")).unwrap();
    let obj = rt.new_instance(&plain).unwrap();
    let err = rt.unary(Slot::Neg, &obj).unwrap_err();
    assert_eq!(err.to_string(), "bad operand type for unary -: 'Plain'");
    let err = rt.unary(Slot::Abs, &obj).unwrap_err();
    assert_eq!(err.to_string(), "bad operand type for abs(): 'Plain'");
    let err = rt.unary(Slot::Invert, &Value::from("s")).unwrap_err();
    assert_eq!(err.to_string(), "bad operand type for unary ~: 'str'");
}

// ============================================================================
// Rich comparison
// ============================================================================

/// With no `__gt__`, `a > b` is answered by `b.__lt__(a)`.
#[test]
fn comparison_uses_swapped_operator() {
    let rt = Runtime::default();
    let ranked = rt
        .create_type(TypeSpec::new("Ranked").method("__lt__", |rt, args| {
            let (a, b) = (rt.get_attr(&args[0], "rank")?, rt.get_attr(&args[1], "rank")?);
            rt.compare(Comparison::Lt, &a, &b)
        }))
        .unwrap();
    let make = |rank: i64| {
        let mut attrs = AttrMap::default();
        attrs.insert("rank".into(), Value::Int(rank));
        rt.new_instance_with(&ranked, attrs).unwrap()
    };
    let (low, high) = (make(1), make(2));
    assert!(truth(&rt.compare(Comparison::Lt, &low, &high).unwrap()));
    assert!(truth(&rt.compare(Comparison::Gt, &high, &low).unwrap()));
    assert!(!truth(&rt.compare(Comparison::Gt, &low, &high).unwrap()));

    let err = rt.compare(Comparison::Le, &low, &high).unwrap_err();
    assert!(matches!(err, RunError::Unorderable { .. }));
    assert_eq!(err.to_string(), "'<=' not supported between instances of 'Ranked' and 'Ranked'");
}

/// Equality falls back to identity when both sides decline.
#[test]
fn equality_falls_back_to_identity() {
    let rt = Runtime::default();
    let c = rt.create_type(TypeSpec::new("C")).unwrap();
    let a = rt.new_instance(&c).unwrap();
    let b = rt.new_instance(&c).unwrap();
    assert!(truth(&rt.compare(Comparison::Eq, &a, &a).unwrap()));
    assert!(!truth(&rt.compare(Comparison::Eq, &a, &b).unwrap()));
    assert!(truth(&rt.compare(Comparison::Ne, &a, &b).unwrap()));
    assert!(!truth(&rt.compare(Comparison::Eq, &a, &Value::Int(1)).unwrap()));
    let err = rt.compare(Comparison::Lt, &a, &Value::Int(1)).unwrap_err();
    assert_eq!(err.to_string(), "'<' not supported between instances of 'C' and 'int'");
}

/// A subtype on the right answers a comparison first.
#[test]
fn comparison_prefers_subtype() {
    let rt = Runtime::default();
    let base = rt
        .create_type(TypeSpec::new("Base").method("__eq__", |_rt, _args| Ok(Value::from("base"))))
        .unwrap();
    let derived = rt
        .create_type(
            TypeSpec::new("Derived")
                .base(&base)
                .method("__eq__", |_rt, _args| Ok(Value::from("derived"))),
        )
        .unwrap();
    let b = rt.new_instance(&base).unwrap();
    let d = rt.new_instance(&derived).unwrap();
    assert_eq!(text(&rt.compare(Comparison::Eq, &b, &d).unwrap()), "derived");
    assert_eq!(text(&rt.compare(Comparison::Eq, &d, &b).unwrap()), "derived");
    assert_eq!(text(&rt.compare(Comparison::Eq, &b, &b).unwrap()), "base");
}

#[test]
fn float_nan_comparisons() {
    let rt = Runtime::default();
    let nan = Value::Float(f64::NAN);
    assert!(!truth(&rt.compare(Comparison::Eq, &nan, &nan).unwrap()));
    assert!(truth(&rt.compare(Comparison::Ne, &nan, &nan).unwrap()));
    assert!(!truth(&rt.compare(Comparison::Lt, &nan, &Value::Int(1)).unwrap()));
}

/// Numbers that compare equal hash equally, across `int`, `bool` and `float`.
#[test]
fn equal_numbers_hash_equally() {
    let rt = Runtime::default();
    let pairs = [
        (rt.binary(Slot::LShift, &Value::Int(1), &Value::Int(70)).unwrap(), Value::Float(2f64.powi(70))),
        (rt.binary(Slot::LShift, &Value::Int(-3), &Value::Int(200)).unwrap(), Value::Float(-3.0 * 2f64.powi(200))),
        (Value::Int(1 << 62), Value::Float(2f64.powi(62))),
        (Value::Bool(true), Value::Float(1.0)),
        (Value::Int(-1), Value::Float(-1.0)),
    ];
    for (i, f) in &pairs {
        assert!(truth(&rt.compare(Comparison::Eq, i, f).unwrap()), "{i:?} should equal {f:?}");
        assert_eq!(rt.hash(i).unwrap(), rt.hash(f).unwrap(), "hash of {i:?} and {f:?}");
    }
    assert_eq!(rt.hash(&pairs[0].0).unwrap(), 512);
}
