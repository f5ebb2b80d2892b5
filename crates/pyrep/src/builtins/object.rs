//! `object`, `NoneType` and `NotImplementedType`.

use std::sync::Arc;

use super::{getset, method, one_arg, three_args, two_args};
use crate::{
    descriptor::GetSetDescriptor,
    exception::{ExcType, RunError, RunResult},
    hash::{hash_float, hash_int, hash_pointer, hash_str},
    resolver::{name_arg, object_getattribute, object_store},
    runtime::Runtime,
    slot::Slot,
    value::{AttrMap, Value},
};

pub(super) fn dict() -> AttrMap {
    [
        method("__getattribute__", |rt, args| {
            let (obj, name) = two_args("__getattribute__", args)?;
            object_getattribute(rt, obj, name_arg(rt, name)?)
        }),
        method("__setattr__", |rt, args| {
            let (obj, name, value) = three_args("__setattr__", args)?;
            object_store(rt, obj, name_arg(rt, name)?, Some(value.clone()))?;
            Ok(Value::None)
        }),
        method("__delattr__", |rt, args| {
            let (obj, name) = two_args("__delattr__", args)?;
            object_store(rt, obj, name_arg(rt, name)?, None)?;
            Ok(Value::None)
        }),
        method("__eq__", |_rt, args| {
            let (v, w) = two_args("__eq__", args)?;
            Ok(if v.is(w) { Value::Bool(true) } else { Value::NotImplemented })
        }),
        method("__ne__", object_ne),
        method("__repr__", |rt, args| {
            let obj = one_arg("__repr__", args)?;
            Ok(Value::from(format!("<{} object>", rt.type_of(obj)?.name())))
        }),
        method("__str__", |rt, args| {
            let obj = one_arg("__str__", args)?;
            rt.repr(obj).map(Value::from)
        }),
        method("__hash__", |_rt, args| Ok(Value::Int(identity_hash(one_arg("__hash__", args)?)))),
        method("__init__", |rt, args| {
            let Some((obj, rest)) = args.split_first() else {
                return Err(ExcType::arg_count("__init__", 1, 0));
            };
            if rest.is_empty() {
                Ok(Value::None)
            } else {
                Err(ExcType::type_error(format!("{}() takes no arguments", rt.type_of(obj)?.name())))
            }
        }),
        getset(GetSetDescriptor::new("__class__").getter(|rt, obj| rt.type_of(obj).map(Value::Type))),
    ]
    .into_iter()
    .collect()
}

/// `object.__ne__`: the inverse of `__eq__`, declining when `__eq__` declines.
fn object_ne(rt: &Runtime, args: &[Value]) -> RunResult<Value> {
    let (v, w) = two_args("__ne__", args)?;
    match rt.ops_of(v)?.handle(Slot::Eq).invoke(rt, &[v.clone(), w.clone()]) {
        Ok(Value::NotImplemented) | Err(RunError::EmptySlot) => Ok(Value::NotImplemented),
        Ok(Value::Bool(b)) => Ok(Value::Bool(!b)),
        Ok(other) => Ok(Value::Bool(!rt.is_true(&other)?)),
        Err(err) => Err(err),
    }
}

/// Hash by identity for reference values, by value for inline scalars.
pub(super) fn identity_hash(v: &Value) -> i64 {
    match v {
        Value::None => hash_str("None"),
        Value::NotImplemented => hash_str("NotImplemented"),
        Value::Bool(b) => hash_int(i64::from(*b)),
        Value::Int(i) => hash_int(*i),
        Value::Float(f) => hash_float(*f),
        Value::Long(li) => hash_pointer(Arc::as_ptr(li)),
        Value::Str(s) => hash_pointer(Arc::as_ptr(s)),
        Value::Type(ty) => hash_pointer(Arc::as_ptr(ty)),
        Value::Object(inst) => hash_pointer(Arc::as_ptr(inst)),
        Value::Function(f) => hash_pointer(Arc::as_ptr(f)),
        Value::Method(m) => hash_pointer(Arc::as_ptr(m)),
        Value::Property(p) => hash_pointer(Arc::as_ptr(p)),
        Value::GetSet(g) => hash_pointer(Arc::as_ptr(g)),
        Value::StaticMethod(inner) | Value::ClassMethod(inner) => hash_pointer(Arc::as_ptr(inner)),
        Value::Native(obj) => hash_pointer(Arc::as_ptr(obj)),
    }
}

pub(super) fn none_dict() -> AttrMap {
    [
        method("__repr__", |_rt, args| {
            one_arg("__repr__", args)?;
            Ok(Value::from("None"))
        }),
        method("__bool__", |_rt, args| {
            one_arg("__bool__", args)?;
            Ok(Value::Bool(false))
        }),
    ]
    .into_iter()
    .collect()
}

pub(super) fn not_implemented_dict() -> AttrMap {
    [method("__repr__", |_rt, args| {
        one_arg("__repr__", args)?;
        Ok(Value::from("NotImplemented"))
    })]
    .into_iter()
    .collect()
}
