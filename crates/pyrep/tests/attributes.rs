//! Tests for attribute resolution and the descriptor protocol.
//!
//! Each test builds a small class hierarchy with `TypeSpec` and checks one
//! rule of `object.__getattribute__`, `type.__getattribute__` or the
//! set/delete paths, including the `__getattr__` fallback.
use std::sync::Arc;

use pretty_assertions::assert_eq;
use pyrep::{
    AttrMap, DescriptorKind, DictMode, ExcType, GetSetDescriptor, Property, RecordingTracer, RunError, Runtime,
    RuntimeConfig, TraceEvent, TypeRef, TypeSpec, Value,
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

fn instance(rt: &Runtime, ty: &TypeRef) -> Value {
    rt.new_instance(ty).expect("instance should be created")
}

// ============================================================================
// Lookup order
// ============================================================================

/// Instance storage shadows a plain class attribute.
#[test]
fn instance_dict_shadows_class_attribute() {
    let rt = Runtime::default();
    let c = rt.create_type(TypeSpec::new("C").attr("x", 1_i64)).unwrap();
    let obj = instance(&rt, &c);
    assert_eq!(int(&rt.get_attr(&obj, "x").unwrap()), 1);
    rt.set_attr(&obj, "x", Value::Int(2)).unwrap();
    assert_eq!(int(&rt.get_attr(&obj, "x").unwrap()), 2);
    assert_eq!(int(&rt.get_attr(&Value::Type(c), "x").unwrap()), 1);
}

/// A data descriptor whose type has no `__get__` makes the attribute unreadable,
/// even though instance storage holds a value of the same name.
#[test]
fn data_descriptor_without_get_is_unreadable() {
    let rt = Runtime::default();
    let set_only = rt
        .create_type(TypeSpec::new("SetOnly").method("__set__", |rt, args| {
            rt.set_attr(&args[1], "_x", args[2].clone())?;
            Ok(Value::None)
        }))
        .unwrap();
    let descr = instance(&rt, &set_only);
    let table = rt.ops_of(&descr).unwrap().table();
    assert_eq!(DescriptorKind::classify(&table), DescriptorKind::Data);

    let host = rt.create_type(TypeSpec::new("Host").attr("x", descr)).unwrap();
    let mut attrs = AttrMap::default();
    attrs.insert("x".into(), Value::Int(99));
    let obj = rt.new_instance_with(&host, attrs).unwrap();

    let err = rt.get_attr(&obj, "x").unwrap_err();
    assert!(matches!(err, RunError::UnreadableAttribute { .. }));
    assert_eq!(err.to_string(), "attribute 'x' of 'Host' objects is not readable");

    // writes go through `__set__`, not into the instance dict
    rt.set_attr(&obj, "x", Value::Int(5)).unwrap();
    assert_eq!(int(&rt.get_attr(&obj, "_x").unwrap()), 5);
    assert_eq!(int(&obj.as_instance().unwrap().dict_get("x").unwrap()), 99);
}

/// A guest-defined non-data descriptor loses to instance storage.
#[test]
fn non_data_descriptor_loses_to_instance_storage() {
    let rt = Runtime::default();
    let getter = rt
        .create_type(TypeSpec::new("Getter").method("__get__", |_rt, _args| Ok(Value::from("computed"))))
        .unwrap();
    let host = rt
        .create_type(TypeSpec::new("Host").attr("x", instance(&rt, &getter)))
        .unwrap();
    let obj = instance(&rt, &host);
    assert_eq!(text(&rt.get_attr(&obj, "x").unwrap()), "computed");
    rt.set_attr(&obj, "x", Value::from("stored")).unwrap();
    assert_eq!(text(&rt.get_attr(&obj, "x").unwrap()), "stored");
}

/// `__get__` receives `None` as the instance when read through the class.
#[test]
fn descriptor_get_through_type_receives_none() {
    let rt = Runtime::default();
    let getter = rt
        .create_type(TypeSpec::new("Getter").method("__get__", |_rt, args| {
            Ok(Value::Bool(args[1].is_none() && matches!(args[2], Value::Type(_))))
        }))
        .unwrap();
    let host = rt
        .create_type(TypeSpec::new("Host").attr("x", instance(&rt, &getter)))
        .unwrap();
    assert!(matches!(rt.get_attr(&Value::Type(host), "x").unwrap(), Value::Bool(true)));
}

#[test]
fn missing_attribute_messages() {
    let rt = Runtime::default();
    let c = rt.create_type(TypeSpec::new("C")).unwrap();
    let err = rt.get_attr(&instance(&rt, &c), "nope").unwrap_err();
    assert_eq!(err.exc_type(), ExcType::AttributeError);
    assert_eq!(err.to_string(), "'C' object has no attribute 'nope'");
    let err = rt.get_attr(&Value::Type(c), "nope").unwrap_err();
    assert_eq!(err.to_string(), "type object 'C' has no attribute 'nope'");
}

/// Attribute names given as guest values must be `str`.
#[test]
fn wrong_name_type() {
    let rt = Runtime::default();
    let c = rt.create_type(TypeSpec::new("C")).unwrap();
    let obj = instance(&rt, &c);
    let err = pyrep::resolver::get_attr_value(&rt, &obj, &Value::Int(3)).unwrap_err();
    assert!(matches!(err, RunError::WrongNameType { .. }));
    assert_eq!(err.to_string(), "attribute name must be string, not 'int'");
    assert!(pyrep::resolver::set_attr_value(&rt, &obj, &Value::None, Value::Int(1)).is_err());
    assert!(pyrep::resolver::del_attr_value(&rt, &obj, &Value::Float(1.0)).is_err());
    assert_eq!(
        text(&pyrep::resolver::get_attr_value(&rt, &Value::Type(c), &Value::from("__name__")).unwrap()),
        "C"
    );
}

#[test]
fn has_attr_only_swallows_missing_attributes() {
    let rt = Runtime::default();
    let c = rt
        .create_type(TypeSpec::new("C").getset(
            GetSetDescriptor::new("boom").getter(|_rt, _obj| Err(ExcType::value_error("boom"))),
        ))
        .unwrap();
    let obj = instance(&rt, &c);
    assert!(!rt.has_attr(&obj, "missing").unwrap());
    assert!(rt.has_attr(&obj, "__class__").unwrap());
    assert_eq!(rt.has_attr(&obj, "boom").unwrap_err().exc_type(), ExcType::ValueError);
}

// ============================================================================
// __getattr__ fallback
// ============================================================================

fn fallback_type(rt: &Runtime) -> TypeRef {
    rt.create_type(
        TypeSpec::new("Lazy")
            .attr("present", 1_i64)
            .method("__getattr__", |_rt, args| {
                let name = args[1].as_str().unwrap_or_default();
                if name.starts_with('_') {
                    Err(ExcType::attribute_error(format!("no private attribute '{name}'")))
                } else {
                    Ok(Value::from(format!("lazy {name}")))
                }
            }),
    )
    .unwrap()
}

/// `__getattr__` runs only when `__getattribute__` reports a missing attribute.
#[test]
fn getattr_runs_only_for_missing_attributes() {
    let tracer = Arc::new(RecordingTracer::new());
    let rt = Runtime::with_tracer(RuntimeConfig::default(), tracer.clone());
    let lazy = fallback_type(&rt);
    let obj = instance(&rt, &lazy);
    tracer.clear();

    assert_eq!(int(&rt.get_attr(&obj, "present").unwrap()), 1);
    assert!(tracer.events().is_empty());

    assert_eq!(text(&rt.get_attr(&obj, "absent").unwrap()), "lazy absent");
    assert_eq!(
        tracer.events(),
        vec![TraceEvent::AttributeFallback {
            type_name: "Lazy".to_owned(),
            name: "absent".to_owned(),
        }]
    );

    // an error from the fallback itself propagates unchanged
    let err = rt.get_attr(&obj, "_secret").unwrap_err();
    assert_eq!(err.to_string(), "no private attribute '_secret'");
}

/// A guest `__getattribute__` raising AttributeError also triggers the fallback.
#[test]
fn getattr_after_guest_getattribute() {
    let rt = Runtime::default();
    let strict = rt
        .create_type(
            TypeSpec::new("Strict")
                .method("__getattribute__", |_rt, args| {
                    Err(ExcType::attribute_error(format!("denied {}", args[1].as_str().unwrap_or_default())))
                })
                .method("__getattr__", |_rt, _args| Ok(Value::from("fallback"))),
        )
        .unwrap();
    let obj = instance(&rt, &strict);
    assert_eq!(text(&rt.get_attr(&obj, "anything").unwrap()), "fallback");
}

/// Errors other than a missing attribute skip the fallback.
#[test]
fn other_errors_skip_getattr() {
    let rt = Runtime::default();
    let ty = rt
        .create_type(
            TypeSpec::new("Broken")
                .method("__getattribute__", |_rt, _args| Err(ExcType::type_error("broken")))
                .method("__getattr__", |_rt, _args| Ok(Value::None)),
        )
        .unwrap();
    let err = rt.get_attr(&instance(&rt, &ty), "x").unwrap_err();
    assert_eq!(err.exc_type(), ExcType::TypeError);
    assert_eq!(err.to_string(), "broken");
}

// ============================================================================
// Set and delete
// ============================================================================

#[test]
fn frozen_storage_rejects_writes() {
    let rt = Runtime::default();
    let point = rt
        .create_type(TypeSpec::new("Point").instance_dict(DictMode::Frozen))
        .unwrap();
    let mut attrs = AttrMap::default();
    attrs.insert("x".into(), Value::Int(1));
    let p = rt.new_instance_with(&point, attrs).unwrap();

    assert_eq!(int(&rt.get_attr(&p, "x").unwrap()), 1);
    let err = rt.set_attr(&p, "x", Value::Int(2)).unwrap_err();
    assert_eq!(err.to_string(), "attribute 'x' of 'Point' objects is not writable");
    let err = rt.del_attr(&p, "x").unwrap_err();
    assert!(matches!(err, RunError::ReadOnlyAttribute { .. }));
    let err = rt.set_attr(&p, "y", Value::Int(2)).unwrap_err();
    assert!(matches!(err, RunError::ReadOnlyAttribute { .. }));
}

#[test]
fn no_storage_rejects_new_attributes() {
    let rt = Runtime::default();
    let slotted = rt
        .create_type(TypeSpec::new("Slotted").instance_dict(DictMode::None).attr("k", 1_i64))
        .unwrap();
    let obj = instance(&rt, &slotted);
    let err = rt.set_attr(&obj, "z", Value::Int(1)).unwrap_err();
    assert_eq!(err.to_string(), "'Slotted' object has no attribute 'z'");
    // an existing class attribute cannot be shadowed either
    let err = rt.set_attr(&obj, "k", Value::Int(2)).unwrap_err();
    assert!(matches!(err, RunError::ReadOnlyAttribute { .. }));
}

#[test]
fn delete_instance_attribute() {
    let rt = Runtime::default();
    let c = rt.create_type(TypeSpec::new("C")).unwrap();
    let obj = instance(&rt, &c);
    rt.set_attr(&obj, "x", Value::Int(1)).unwrap();
    rt.del_attr(&obj, "x").unwrap();
    assert!(!rt.has_attr(&obj, "x").unwrap());
    let err = rt.del_attr(&obj, "x").unwrap_err();
    assert_eq!(err.to_string(), "'C' object has no attribute 'x'");
}

/// Getset descriptors without a setter or deleter are read-only and undeletable.
#[test]
fn getset_read_only() {
    let rt = Runtime::default();
    let c = rt
        .create_type(
            TypeSpec::new("C").getset(GetSetDescriptor::new("answer").getter(|_rt, _obj| Ok(Value::Int(42)))),
        )
        .unwrap();
    let obj = instance(&rt, &c);
    assert_eq!(int(&rt.get_attr(&obj, "answer").unwrap()), 42);
    let err = rt.set_attr(&obj, "answer", Value::Int(1)).unwrap_err();
    assert_eq!(err.to_string(), "attribute 'answer' of 'C' objects is not writable");
    let err = rt.del_attr(&obj, "answer").unwrap_err();
    assert_eq!(err.to_string(), "attribute 'answer' of 'C' objects cannot be deleted");
}

/// A getset declared on one type rejects receivers of unrelated types.
#[test]
fn getset_checks_receiver_type() {
    let rt = Runtime::default();
    let c = rt
        .create_type(TypeSpec::new("C").getset(GetSetDescriptor::new("g").getter(|_rt, _obj| Ok(Value::None))))
        .unwrap();
    let other = rt.create_type(TypeSpec::new("Other")).unwrap();
    let descr = c.dict_get("g").unwrap();
    let Value::GetSet(gs) = descr else {
        panic!("expected a getset descriptor");
    };
    let err = gs.get(&rt, &instance(&rt, &other)).unwrap_err();
    assert_eq!(err.to_string(), "descriptor 'g' for 'C' objects doesn't apply to a 'Other' object");
}

// ============================================================================
// Built-in descriptor types
// ============================================================================

#[test]
fn property_accessors() {
    let rt = Runtime::default();
    let fget = Value::Function(Arc::new(pyrep::Function::new(
        "get_celsius",
        pyrep::native_fn(|rt, args| rt.get_attr(&args[0], "_c")),
    )));
    let fset = Value::Function(Arc::new(pyrep::Function::new(
        "set_celsius",
        pyrep::native_fn(|rt, args| {
            rt.set_attr(&args[0], "_c", args[1].clone())?;
            Ok(Value::None)
        }),
    )));
    let temp = rt
        .create_type(
            TypeSpec::new("Temp")
                .property(Property::new("celsius").fget(fget.clone()).fset(fset))
                .property(Property::new("frozen").fget(fget)),
        )
        .unwrap();
    let t = instance(&rt, &temp);
    rt.set_attr(&t, "celsius", Value::Int(21)).unwrap();
    assert_eq!(int(&rt.get_attr(&t, "celsius").unwrap()), 21);
    assert_eq!(int(&rt.get_attr(&t, "frozen").unwrap()), 21);

    let err = rt.set_attr(&t, "frozen", Value::Int(0)).unwrap_err();
    assert_eq!(err.to_string(), "property 'frozen' of 'Temp' object has no setter");
    let err = rt.del_attr(&t, "celsius").unwrap_err();
    assert_eq!(err.to_string(), "property 'celsius' of 'Temp' object has no deleter");

    // through the class the property returns itself
    assert!(matches!(rt.get_attr(&Value::Type(temp), "celsius").unwrap(), Value::Property(_)));
}

#[test]
fn methods_bind_to_instances() {
    let rt = Runtime::default();
    let c = rt
        .create_type(TypeSpec::new("C").method("whoami", |rt, args| {
            Ok(Value::from(rt.type_of(&args[0])?.name()))
        }))
        .unwrap();
    let obj = instance(&rt, &c);
    let bound = rt.get_attr(&obj, "whoami").unwrap();
    assert!(matches!(&bound, Value::Method(m) if m.receiver().is(&obj)));
    assert_eq!(text(&rt.call(&bound, &[]).unwrap()), "C");

    // through the class the function is returned unbound
    let unbound = rt.get_attr(&Value::Type(c), "whoami").unwrap();
    assert!(matches!(unbound, Value::Function(_)));
    assert_eq!(text(&rt.call(&unbound, &[obj]).unwrap()), "C");
}

/// Positional arguments arrive after the receiver for bound methods,
/// callable instances and `type.__call__`.
#[test]
fn call_arguments_follow_the_receiver() {
    fn describe(_rt: &Runtime, args: &[Value]) -> Result<Value, RunError> {
        let parts: Vec<String> = args[1..].iter().map(|a| format!("{a:?}")).collect();
        Ok(Value::from(parts.join(",")))
    }
    let rt = Runtime::default();
    let c = rt
        .create_type(
            TypeSpec::new("C")
                .method("describe", describe)
                .method("__call__", describe)
                .method("__init__", |rt, args| {
                    rt.set_attr(&args[0], "args", Value::Int(args.len() as i64 - 1))?;
                    Ok(Value::None)
                }),
        )
        .unwrap();
    let obj = rt
        .call(&Value::Type(Arc::clone(&c)), &[Value::Int(1), Value::from("a"), Value::None])
        .unwrap();
    assert_eq!(int(&rt.get_attr(&obj, "args").unwrap()), 3);

    let bound = rt.get_attr(&obj, "describe").unwrap();
    assert_eq!(text(&rt.call(&bound, &[Value::Int(7), Value::from("x")]).unwrap()), "7,\"x\"");
    assert_eq!(
        text(&rt.call(&obj, &[Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(4), Value::Int(5)]).unwrap()),
        "1,2,3,4,5"
    );
}

#[test]
fn static_and_class_methods() {
    let rt = Runtime::default();
    let base = rt
        .create_type(
            TypeSpec::new("Base")
                .staticmethod("version", |_rt, args| Ok(Value::Int(args.len() as i64)))
                .classmethod("make", |_rt, args| match &args[0] {
                    Value::Type(cls) => Ok(Value::from(cls.name())),
                    _ => Ok(Value::None),
                }),
        )
        .unwrap();
    let derived = rt.create_type(TypeSpec::new("Derived").base(&base)).unwrap();
    let obj = instance(&rt, &derived);

    let version = rt.get_attr(&obj, "version").unwrap();
    assert!(matches!(version, Value::Function(_)));
    assert_eq!(int(&rt.call(&version, &[]).unwrap()), 0);

    let make = rt.get_attr(&obj, "make").unwrap();
    assert_eq!(text(&rt.call(&make, &[]).unwrap()), "Derived");
    let make = rt.get_attr(&Value::Type(base), "make").unwrap();
    assert_eq!(text(&rt.call(&make, &[]).unwrap()), "Base");
}

/// `__class__` and `__name__` are getset descriptors on `object` and `type`.
#[test]
fn class_and_name() {
    let rt = Runtime::default();
    let c = rt.create_type(TypeSpec::new("C")).unwrap();
    let obj = instance(&rt, &c);
    let cls = rt.get_attr(&obj, "__class__").unwrap();
    assert!(matches!(&cls, Value::Type(t) if Arc::ptr_eq(t, &c)));
    assert_eq!(text(&rt.get_attr(&cls, "__name__").unwrap()), "C");
    let meta = rt.get_attr(&cls, "__class__").unwrap();
    assert!(matches!(&meta, Value::Type(t) if Arc::ptr_eq(t, rt.type_type())));
}

/// Guest functions stored in a class dict bind like built-in methods.
#[test]
fn explicit_get_on_function() {
    let rt = Runtime::default();
    let c = rt
        .create_type(TypeSpec::new("C").method("m", |_rt, _args| Ok(Value::None)))
        .unwrap();
    let func = c.dict_get("m").unwrap();
    let get = rt.get_attr(&func, "__get__").unwrap();
    let obj = instance(&rt, &c);
    let bound = rt.call(&get, &[obj, Value::Type(Arc::clone(&c))]).unwrap();
    assert!(matches!(bound, Value::Method(_)));
    let same = rt.call(&get, &[Value::None, Value::Type(c)]).unwrap();
    assert!(same.is(&func));
}
