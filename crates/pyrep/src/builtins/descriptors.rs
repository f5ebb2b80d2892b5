//! The descriptor types: `function`, `method`, `property`,
//! `getset_descriptor`, `staticmethod` and `classmethod`.
//!
//! Attribute lookup short-cuts these in `descriptor::descr_get` and friends;
//! the dictionaries here are what classify them as descriptors and what guest
//! code reaches when it calls `__get__` and `__set__` explicitly.

use std::sync::Arc;

use super::{getset, method, one_arg, three_args, two_args};
use crate::{
    descriptor::GetSetDescriptor,
    exception::{ExcType, RunResult},
    function::BoundMethod,
    runtime::Runtime,
    value::{AttrMap, Value},
};

/// Splits `[descr, obj, owner]` for `__get__`; `obj` is `None` for access through the type.
fn get_args<'a>(args: &'a [Value]) -> RunResult<(&'a Value, Option<&'a Value>, &'a Value)> {
    let (descr, obj, owner) = three_args("__get__", args)?;
    Ok((descr, (!obj.is_none()).then_some(obj), owner))
}

fn receiver_mismatch(name: &str, expected: &str, rt: &Runtime, got: &Value) -> RunResult<Value> {
    Err(ExcType::descriptor_mismatch(name, expected, rt.type_of(got)?.name()))
}

fn split_callable<'a>(name: &str, args: &'a [Value]) -> RunResult<(&'a Value, &'a [Value])> {
    args.split_first().ok_or_else(|| ExcType::arg_count(name, 1, 0))
}

pub(super) fn function_dict() -> AttrMap {
    [
        method("__get__", |rt, args| {
            let (descr, obj, _owner) = get_args(args)?;
            let Value::Function(f) = descr else {
                return receiver_mismatch("__get__", "function", rt, descr);
            };
            match obj {
                None => Ok(descr.clone()),
                Some(receiver) => {
                    f.check_receiver(rt, receiver)?;
                    Ok(Value::Method(Arc::new(BoundMethod::new(descr.clone(), receiver.clone()))))
                }
            }
        }),
        method("__call__", |rt, args| {
            let (callable, rest) = split_callable("__call__", args)?;
            match callable {
                Value::Function(f) => f.call(rt, rest),
                other => receiver_mismatch("__call__", "function", rt, other),
            }
        }),
        method("__repr__", |_rt, args| match one_arg("__repr__", args)? {
            Value::Function(f) => Ok(Value::from(format!("<function {}>", f.name()))),
            _ => Err(ExcType::descriptor_mismatch("__repr__", "function", "object")),
        }),
        getset(GetSetDescriptor::new("__name__").getter(|rt, obj| match obj {
            Value::Function(f) => Ok(Value::from(f.name())),
            other => receiver_mismatch("__name__", "function", rt, other),
        })),
    ]
    .into_iter()
    .collect()
}

pub(super) fn method_dict() -> AttrMap {
    fn bound<'a>(rt: &Runtime, name: &str, obj: &'a Value) -> RunResult<&'a BoundMethod> {
        match obj {
            Value::Method(m) => Ok(&**m),
            other => Err(ExcType::descriptor_mismatch(name, "method", rt.type_of(other)?.name())),
        }
    }
    [
        method("__call__", |rt, args| {
            let (callable, rest) = split_callable("__call__", args)?;
            bound(rt, "__call__", callable)?.call(rt, rest)
        }),
        getset(GetSetDescriptor::new("__func__").getter(|rt, obj| Ok(bound(rt, "__func__", obj)?.func().clone()))),
        getset(GetSetDescriptor::new("__self__").getter(|rt, obj| Ok(bound(rt, "__self__", obj)?.receiver().clone()))),
    ]
    .into_iter()
    .collect()
}

pub(super) fn property_dict() -> AttrMap {
    [
        method("__get__", |rt, args| {
            let (descr, obj, _owner) = get_args(args)?;
            let Value::Property(prop) = descr else {
                return receiver_mismatch("__get__", "property", rt, descr);
            };
            match obj {
                None => Ok(descr.clone()),
                Some(receiver) => prop.get(rt, receiver),
            }
        }),
        method("__set__", |rt, args| {
            let (descr, obj, value) = three_args("__set__", args)?;
            let Value::Property(prop) = descr else {
                return receiver_mismatch("__set__", "property", rt, descr);
            };
            prop.set(rt, obj, value.clone())?;
            Ok(Value::None)
        }),
        method("__delete__", |rt, args| {
            let (descr, obj) = two_args("__delete__", args)?;
            let Value::Property(prop) = descr else {
                return receiver_mismatch("__delete__", "property", rt, descr);
            };
            prop.delete(rt, obj)?;
            Ok(Value::None)
        }),
    ]
    .into_iter()
    .collect()
}

pub(super) fn getset_dict() -> AttrMap {
    [
        method("__get__", |rt, args| {
            let (descr, obj, _owner) = get_args(args)?;
            let Value::GetSet(gs) = descr else {
                return receiver_mismatch("__get__", "getset_descriptor", rt, descr);
            };
            match obj {
                None => Ok(descr.clone()),
                Some(receiver) => gs.get(rt, receiver),
            }
        }),
        method("__set__", |rt, args| {
            let (descr, obj, value) = three_args("__set__", args)?;
            let Value::GetSet(gs) = descr else {
                return receiver_mismatch("__set__", "getset_descriptor", rt, descr);
            };
            gs.set(rt, obj, value.clone())?;
            Ok(Value::None)
        }),
        method("__delete__", |rt, args| {
            let (descr, obj) = two_args("__delete__", args)?;
            let Value::GetSet(gs) = descr else {
                return receiver_mismatch("__delete__", "getset_descriptor", rt, descr);
            };
            gs.delete(rt, obj)?;
            Ok(Value::None)
        }),
    ]
    .into_iter()
    .collect()
}

pub(super) fn staticmethod_dict() -> AttrMap {
    [
        method("__get__", |rt, args| {
            let (descr, _obj, _owner) = get_args(args)?;
            match descr {
                Value::StaticMethod(inner) => Ok((**inner).clone()),
                other => receiver_mismatch("__get__", "staticmethod", rt, other),
            }
        }),
        getset(GetSetDescriptor::new("__func__").getter(|rt, obj| match obj {
            Value::StaticMethod(inner) => Ok((**inner).clone()),
            other => receiver_mismatch("__func__", "staticmethod", rt, other),
        })),
    ]
    .into_iter()
    .collect()
}

pub(super) fn classmethod_dict() -> AttrMap {
    [
        method("__get__", |rt, args| {
            let (descr, obj, owner) = get_args(args)?;
            let Value::ClassMethod(inner) = descr else {
                return receiver_mismatch("__get__", "classmethod", rt, descr);
            };
            let owner = match (owner, obj) {
                (Value::Type(_), _) => owner.clone(),
                (_, Some(obj)) => Value::Type(rt.type_of(obj)?),
                _ => return Err(ExcType::type_error("__get__(None, None) is invalid")),
            };
            Ok(Value::Method(Arc::new(BoundMethod::new((**inner).clone(), owner))))
        }),
        getset(GetSetDescriptor::new("__func__").getter(|rt, obj| match obj {
            Value::ClassMethod(inner) => Ok((**inner).clone()),
            other => receiver_mismatch("__func__", "classmethod", rt, other),
        })),
    ]
    .into_iter()
    .collect()
}
