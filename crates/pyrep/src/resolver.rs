//! Attribute resolution.
//!
//! The public entry points go through the receiver's `__getattribute__`,
//! `__setattr__` and `__delattr__` slots, so guest overrides are honoured.
//! The generic algorithms those slots normally hold (`object.__getattribute__`
//! and `type.__getattribute__` with their set/delete partners) live here too
//! and are installed by the built-in `object` and `type` types.

use std::sync::Arc;

use crate::{
    descriptor::{DescriptorKind, descr_delete, descr_get, descr_set},
    exception::{RunError, RunResult},
    operation_set::OperationSet,
    runtime::Runtime,
    slot::{Slot, SlotTable},
    types::TypeRef,
    value::Value,
};

/// `getattr(obj, name)`.
///
/// Runs `__getattribute__`; when that reports a missing attribute and the
/// type defines `__getattr__`, retries once through `__getattr__`.
pub fn get_attr(rt: &Runtime, obj: &Value, name: &str) -> RunResult<Value> {
    let ops = rt.ops_of(obj)?;
    get_attr_in(rt, &ops, obj, &Value::Str(name.into()))
}

/// `getattr(obj, name)` with the name given as a guest value.
pub fn get_attr_value(rt: &Runtime, obj: &Value, name: &Value) -> RunResult<Value> {
    check_name(rt, name)?;
    let ops = rt.ops_of(obj)?;
    get_attr_in(rt, &ops, obj, name)
}

/// Attribute read through an already resolved operation set.
///
/// `name` must be a `str` value.
pub(crate) fn get_attr_in(rt: &Runtime, ops: &OperationSet, obj: &Value, name: &Value) -> RunResult<Value> {
    let args = [obj.clone(), name.clone()];
    match ops.handle(Slot::GetAttribute).invoke(rt, &args) {
        Err(err) if err.is_attribute_missing() => {
            let fallback = ops.handle(Slot::GetAttr);
            if !fallback.is_defined() {
                return Err(err);
            }
            let type_name = rt.type_of(obj)?.name_arc();
            rt.tracer()
                .on_attribute_fallback(&type_name, name.as_str().unwrap_or_default());
            fallback.invoke(rt, &args)
        }
        // `__getattribute__ = None` on a guest class
        Err(RunError::EmptySlot) => generic_getattribute(rt, obj, name_str(name)?),
        result => result,
    }
}

/// `setattr(obj, name, value)`.
pub fn set_attr(rt: &Runtime, obj: &Value, name: &str, value: Value) -> RunResult<()> {
    set_attr_value(rt, obj, &Value::Str(name.into()), value)
}

/// `setattr(obj, name, value)` with the name given as a guest value.
pub fn set_attr_value(rt: &Runtime, obj: &Value, name: &Value, value: Value) -> RunResult<()> {
    check_name(rt, name)?;
    let ops = rt.ops_of(obj)?;
    match ops
        .handle(Slot::SetAttr)
        .invoke(rt, &[obj.clone(), name.clone(), value.clone()])
    {
        Err(RunError::EmptySlot) => generic_store(rt, obj, name_str(name)?, Some(value)),
        result => result.map(|_| ()),
    }
}

/// `delattr(obj, name)`.
pub fn del_attr(rt: &Runtime, obj: &Value, name: &str) -> RunResult<()> {
    del_attr_value(rt, obj, &Value::Str(name.into()))
}

/// `delattr(obj, name)` with the name given as a guest value.
pub fn del_attr_value(rt: &Runtime, obj: &Value, name: &Value) -> RunResult<()> {
    check_name(rt, name)?;
    let ops = rt.ops_of(obj)?;
    match ops.handle(Slot::DelAttr).invoke(rt, &[obj.clone(), name.clone()]) {
        Err(RunError::EmptySlot) => generic_store(rt, obj, name_str(name)?, None),
        result => result.map(|_| ()),
    }
}

/// `hasattr(obj, name)`: only missing-attribute errors count as "no".
pub fn has_attr(rt: &Runtime, obj: &Value, name: &str) -> RunResult<bool> {
    match get_attr(rt, obj, name) {
        Ok(_) => Ok(true),
        Err(err) if err.is_attribute_missing() => Ok(false),
        Err(err) => Err(err),
    }
}

fn check_name(rt: &Runtime, name: &Value) -> RunResult<()> {
    if matches!(name, Value::Str(_)) {
        Ok(())
    } else {
        Err(RunError::WrongNameType {
            type_name: rt.type_of(name)?.name_arc(),
        })
    }
}

fn name_str(name: &Value) -> RunResult<&str> {
    name.as_str()
        .ok_or_else(|| RunError::internal("attribute name is not a str"))
}

/// Extracts the attribute name argument of a `__getattribute__`-style slot body.
pub(crate) fn name_arg<'a>(rt: &Runtime, name: &'a Value) -> RunResult<&'a str> {
    match name {
        Value::Str(s) => Ok(s),
        other => Err(RunError::WrongNameType {
            type_name: rt.type_of(other)?.name_arc(),
        }),
    }
}

fn generic_getattribute(rt: &Runtime, obj: &Value, name: &str) -> RunResult<Value> {
    match obj {
        Value::Type(ty) => type_getattribute(rt, ty, name),
        _ => object_getattribute(rt, obj, name),
    }
}

fn generic_store(rt: &Runtime, obj: &Value, name: &str, value: Option<Value>) -> RunResult<()> {
    match obj {
        Value::Type(ty) => type_store(rt, ty, name, value),
        _ => object_store(rt, obj, name, value),
    }
}

/// Looks `name` up along `ty`'s MRO and classifies what it finds.
fn find_descriptor(rt: &Runtime, ty: &TypeRef, name: &str) -> RunResult<Option<(Value, Arc<SlotTable>, DescriptorKind)>> {
    let Some(attr) = ty.lookup(name) else {
        return Ok(None);
    };
    let table = rt.ops_of(&attr)?.table();
    let kind = DescriptorKind::classify(&table);
    Ok(Some((attr, table, kind)))
}

// ============================================================================
// object.__getattribute__ / __setattr__ / __delattr__
// ============================================================================

/// The generic instance lookup.
///
/// A data descriptor on the type wins outright, even one whose type has no
/// `__get__`; then instance storage; then a non-data descriptor or plain
/// class attribute.
pub(crate) fn object_getattribute(rt: &Runtime, obj: &Value, name: &str) -> RunResult<Value> {
    let ty = rt.type_of(obj)?;
    let found = find_descriptor(rt, &ty, name)?;
    if let Some((attr, table, DescriptorKind::Data)) = &found {
        return match descr_get(rt, attr, table, Some(obj), &ty) {
            Err(RunError::EmptySlot) => Err(RunError::UnreadableAttribute {
                type_name: ty.name_arc(),
                name: name.into(),
            }),
            result => result,
        };
    }
    if let Value::Object(inst) = obj
        && let Some(value) = inst.dict_get(name)
    {
        return Ok(value);
    }
    match found {
        Some((attr, table, DescriptorKind::NonData)) => descr_get(rt, &attr, &table, Some(obj), &ty),
        Some((attr, ..)) => Ok(attr),
        None => Err(RunError::NoSuchAttribute {
            type_name: ty.name_arc(),
            name: name.into(),
            on_type: false,
        }),
    }
}

/// The generic instance store: `Some` assigns, `None` deletes.
pub(crate) fn object_store(rt: &Runtime, obj: &Value, name: &str, value: Option<Value>) -> RunResult<()> {
    let ty = rt.type_of(obj)?;
    let found = find_descriptor(rt, &ty, name)?;
    if let Some((attr, table, DescriptorKind::Data)) = &found {
        return match value {
            Some(value) => descr_set(rt, attr, table, obj, value).map_err(|err| match err {
                RunError::EmptySlot => RunError::ReadOnlyAttribute {
                    type_name: ty.name_arc(),
                    name: name.into(),
                },
                err => err,
            }),
            None => descr_delete(rt, attr, table, obj).map_err(|err| match err {
                RunError::EmptySlot => RunError::UndeletableAttribute {
                    type_name: ty.name_arc(),
                    name: name.into(),
                },
                err => err,
            }),
        };
    }
    match (obj, value) {
        (Value::Object(inst), Some(value)) if inst.has_dict() => inst.dict_set(name, value),
        (Value::Object(inst), None) if inst.has_dict() => inst.dict_delete(name),
        _ if found.is_some() => Err(RunError::ReadOnlyAttribute {
            type_name: ty.name_arc(),
            name: name.into(),
        }),
        _ => Err(RunError::NoSuchAttribute {
            type_name: ty.name_arc(),
            name: name.into(),
            on_type: false,
        }),
    }
}

// ============================================================================
// type.__getattribute__ / __setattr__ / __delattr__
// ============================================================================

/// The generic lookup on a type object.
///
/// Data descriptors of the metatype come first. The type's own MRO is
/// searched next, binding with no instance. The metatype's remaining
/// attributes are the last resort.
pub(crate) fn type_getattribute(rt: &Runtime, ty: &TypeRef, name: &str) -> RunResult<Value> {
    let meta = ty.metatype();
    let receiver = Value::Type(Arc::clone(ty));
    let meta_found = find_descriptor(rt, &meta, name)?;
    if let Some((attr, table, DescriptorKind::Data)) = &meta_found {
        return match descr_get(rt, attr, table, Some(&receiver), &meta) {
            Err(RunError::EmptySlot) => Err(RunError::UnreadableAttribute {
                type_name: meta.name_arc(),
                name: name.into(),
            }),
            result => result,
        };
    }
    if let Some(attr) = ty.lookup(name) {
        let table = rt.ops_of(&attr)?.table();
        return match descr_get(rt, &attr, &table, None, ty) {
            Err(RunError::EmptySlot) => Ok(attr),
            result => result,
        };
    }
    match meta_found {
        Some((attr, table, DescriptorKind::NonData)) => descr_get(rt, &attr, &table, Some(&receiver), &meta),
        Some((attr, ..)) => Ok(attr),
        None => Err(RunError::NoSuchAttribute {
            type_name: ty.name_arc(),
            name: name.into(),
            on_type: true,
        }),
    }
}

/// The generic store on a type object: `Some` assigns, `None` deletes.
///
/// Assignments to special-method names recompute the matching slot on the
/// type and every live subclass before returning.
pub(crate) fn type_store(rt: &Runtime, ty: &TypeRef, name: &str, value: Option<Value>) -> RunResult<()> {
    if !ty.is_mutable() {
        return Err(RunError::ImmutableType {
            type_name: ty.name_arc(),
            name: name.into(),
        });
    }
    let meta = ty.metatype();
    if let Some((attr, table, DescriptorKind::Data)) = find_descriptor(rt, &meta, name)? {
        let receiver = Value::Type(Arc::clone(ty));
        let result = match value {
            Some(value) => descr_set(rt, &attr, &table, &receiver, value),
            None => descr_delete(rt, &attr, &table, &receiver),
        };
        return result.map_err(|err| match err {
            RunError::EmptySlot => RunError::ReadOnlyAttribute {
                type_name: meta.name_arc(),
                name: name.into(),
            },
            err => err,
        });
    }
    ty.assign(rt, name, value)
}
