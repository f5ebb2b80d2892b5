//! `type`: the metatype of every built-in and of guest classes by default.

use smallvec::SmallVec;

use super::{getset, method, one_arg, three_args, two_args};
use crate::{
    descriptor::{GetSetDescriptor, descr_get},
    exception::{ExcType, RunError, RunResult},
    resolver::{name_arg, type_getattribute, type_store},
    runtime::Runtime,
    slot::Slot,
    types::TypeRef,
    value::{AttrMap, Value},
};

pub(super) fn dict() -> AttrMap {
    [
        method("__getattribute__", |rt, args| {
            let (obj, name) = two_args("__getattribute__", args)?;
            type_getattribute(rt, receiver(obj)?, name_arg(rt, name)?)
        }),
        method("__setattr__", |rt, args| {
            let (obj, name, value) = three_args("__setattr__", args)?;
            type_store(rt, receiver(obj)?, name_arg(rt, name)?, Some(value.clone()))?;
            Ok(Value::None)
        }),
        method("__delattr__", |rt, args| {
            let (obj, name) = two_args("__delattr__", args)?;
            type_store(rt, receiver(obj)?, name_arg(rt, name)?, None)?;
            Ok(Value::None)
        }),
        method("__call__", type_call),
        method("__repr__", |_rt, args| {
            let ty = receiver(one_arg("__repr__", args)?)?;
            Ok(Value::from(format!("<class '{}'>", ty.name())))
        }),
        getset(GetSetDescriptor::new("__name__").getter(|_rt, obj| Ok(Value::Str(receiver(obj)?.name_arc())))),
    ]
    .into_iter()
    .collect()
}

fn receiver(obj: &Value) -> RunResult<&TypeRef> {
    obj.as_type()
        .ok_or_else(|| ExcType::type_error("descriptor requires a 'type' object"))
}

/// `cls(*args)`: `__new__` (or a fresh instance), then `__init__`.
fn type_call(rt: &Runtime, args: &[Value]) -> RunResult<Value> {
    let Some((cls, rest)) = args.split_first() else {
        return Err(ExcType::arg_count("__call__", 1, 0));
    };
    let ty = receiver(cls)?;
    let instance = match ty.lookup("__new__") {
        Some(new) => {
            let table = rt.ops_of(&new)?.table();
            let new = match descr_get(rt, &new, &table, None, ty) {
                Err(RunError::EmptySlot) => new,
                result => result?,
            };
            let mut full: SmallVec<[Value; 4]> = SmallVec::with_capacity(args.len());
            full.push(cls.clone());
            full.extend(rest.iter().cloned());
            rt.call(&new, &full)?
        }
        None => rt.new_instance(ty)?,
    };
    // `__new__` may return something else entirely; only our own instances are initialised
    if !rt.type_of(&instance)?.is_subtype(ty) {
        return Ok(instance);
    }
    let mut full: SmallVec<[Value; 4]> = SmallVec::with_capacity(args.len());
    full.push(instance.clone());
    full.extend(rest.iter().cloned());
    match rt.ops_of(&instance)?.handle(Slot::Init).invoke(rt, &full) {
        Ok(Value::None) | Err(RunError::EmptySlot) => Ok(instance),
        Ok(other) => Err(ExcType::type_error(format!(
            "__init__() should return None, not '{}'",
            rt.type_of(&other)?.name()
        ))),
        Err(err) => Err(err),
    }
}
