//! The descriptor protocol.
//!
//! Whether an attribute value is a descriptor is decided by the slots of the
//! value's own type: `__set__` or `__delete__` makes it a data descriptor,
//! `__get__` alone a non-data descriptor, neither a plain value. The built-in
//! descriptor types (`function`, `property`, `getset_descriptor`,
//! `staticmethod`, `classmethod`) define their slots like any other type; the
//! helpers here only short-cut the invocation for them.

use std::{
    fmt,
    sync::{Arc, OnceLock, Weak},
};

use crate::{
    exception::{ExcType, RunError, RunResult},
    function::BoundMethod,
    runtime::Runtime,
    slot::{Slot, SlotTable},
    types::{TypeObject, TypeRef},
    value::Value,
};

/// Descriptor classification of an attribute value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorKind {
    /// The value's type defines `__set__` or `__delete__`.
    Data,
    /// The value's type defines `__get__` only.
    NonData,
    /// The value's type defines none of the descriptor slots.
    Plain,
}

impl DescriptorKind {
    #[must_use]
    pub fn classify(table: &SlotTable) -> Self {
        if table.is_data_descriptor() {
            Self::Data
        } else if table.get(Slot::Get).is_defined() {
            Self::NonData
        } else {
            Self::Plain
        }
    }
}

/// Calls `descr.__get__(obj, owner)`.
///
/// `obj` is `None` for access through the type itself. Fails with
/// [`RunError::EmptySlot`] when the descriptor's type defines no `__get__`.
pub(crate) fn descr_get(
    rt: &Runtime,
    descr: &Value,
    table: &SlotTable,
    obj: Option<&Value>,
    owner: &TypeRef,
) -> RunResult<Value> {
    match descr {
        Value::Function(f) => match obj {
            None => Ok(descr.clone()),
            Some(receiver) => {
                f.check_receiver(rt, receiver)?;
                Ok(Value::Method(Arc::new(BoundMethod::new(descr.clone(), receiver.clone()))))
            }
        },
        Value::GetSet(getset) => match obj {
            None => Ok(descr.clone()),
            Some(receiver) => getset.get(rt, receiver),
        },
        Value::Property(prop) => match obj {
            None => Ok(descr.clone()),
            Some(receiver) => prop.get(rt, receiver),
        },
        Value::StaticMethod(inner) => Ok((**inner).clone()),
        Value::ClassMethod(inner) => Ok(Value::Method(Arc::new(BoundMethod::new(
            (**inner).clone(),
            Value::Type(Arc::clone(owner)),
        )))),
        _ => table.get(Slot::Get).invoke(
            rt,
            &[
                descr.clone(),
                obj.cloned().unwrap_or(Value::None),
                Value::Type(Arc::clone(owner)),
            ],
        ),
    }
}

/// Calls `descr.__set__(obj, value)`; `EmptySlot` when the type has no `__set__`.
pub(crate) fn descr_set(rt: &Runtime, descr: &Value, table: &SlotTable, obj: &Value, value: Value) -> RunResult<()> {
    match descr {
        Value::GetSet(getset) => getset.set(rt, obj, value),
        Value::Property(prop) => prop.set(rt, obj, value),
        _ => table
            .get(Slot::Set)
            .invoke(rt, &[descr.clone(), obj.clone(), value])
            .map(|_| ()),
    }
}

/// Calls `descr.__delete__(obj)`; `EmptySlot` when the type has no `__delete__`.
pub(crate) fn descr_delete(rt: &Runtime, descr: &Value, table: &SlotTable, obj: &Value) -> RunResult<()> {
    match descr {
        Value::GetSet(getset) => getset.delete(rt, obj),
        Value::Property(prop) => prop.delete(rt, obj),
        _ => table
            .get(Slot::Delete)
            .invoke(rt, &[descr.clone(), obj.clone()])
            .map(|_| ()),
    }
}

/// Native getter of a [`GetSetDescriptor`].
pub type Getter = Arc<dyn Fn(&Runtime, &Value) -> RunResult<Value> + Send + Sync>;
/// Native setter of a [`GetSetDescriptor`].
pub type Setter = Arc<dyn Fn(&Runtime, &Value, Value) -> RunResult<()> + Send + Sync>;
/// Native deleter of a [`GetSetDescriptor`].
pub type Deleter = Arc<dyn Fn(&Runtime, &Value) -> RunResult<()> + Send + Sync>;

/// An attribute implemented by native accessors.
///
/// Always a data descriptor: a missing setter or deleter makes assignment or
/// deletion fail definitively rather than fall through to instance storage.
pub struct GetSetDescriptor {
    name: Arc<str>,
    objclass: OnceLock<Weak<TypeObject>>,
    get: Option<Getter>,
    set: Option<Setter>,
    delete: Option<Deleter>,
}

impl GetSetDescriptor {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            objclass: OnceLock::new(),
            get: None,
            set: None,
            delete: None,
        }
    }

    #[must_use]
    pub fn getter<F>(mut self, f: F) -> Self
    where
        F: Fn(&Runtime, &Value) -> RunResult<Value> + Send + Sync + 'static,
    {
        self.get = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn setter<F>(mut self, f: F) -> Self
    where
        F: Fn(&Runtime, &Value, Value) -> RunResult<()> + Send + Sync + 'static,
    {
        self.set = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn deleter<F>(mut self, f: F) -> Self
    where
        F: Fn(&Runtime, &Value) -> RunResult<()> + Send + Sync + 'static,
    {
        self.delete = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn objclass(&self) -> Option<TypeRef> {
        self.objclass.get().and_then(Weak::upgrade)
    }

    pub(crate) fn bind_objclass(&self, ty: &TypeRef) {
        let _ = self.objclass.set(Arc::downgrade(ty));
    }

    fn owner_name(&self) -> Arc<str> {
        self.objclass().map_or_else(|| "object".into(), |t| t.name_arc())
    }

    fn check_receiver(&self, rt: &Runtime, receiver: &Value) -> RunResult<()> {
        let Some(owner) = self.objclass() else {
            return Ok(());
        };
        let ty = rt.type_of(receiver)?;
        if ty.is_subtype(&owner) {
            Ok(())
        } else {
            Err(ExcType::descriptor_mismatch(&self.name, owner.name(), ty.name()))
        }
    }

    pub fn get(&self, rt: &Runtime, receiver: &Value) -> RunResult<Value> {
        self.check_receiver(rt, receiver)?;
        match &self.get {
            Some(get) => get(rt, receiver),
            None => Err(RunError::UnreadableAttribute {
                type_name: self.owner_name(),
                name: Arc::clone(&self.name),
            }),
        }
    }

    pub fn set(&self, rt: &Runtime, receiver: &Value, value: Value) -> RunResult<()> {
        self.check_receiver(rt, receiver)?;
        match &self.set {
            Some(set) => set(rt, receiver, value),
            None => Err(RunError::ReadOnlyAttribute {
                type_name: self.owner_name(),
                name: Arc::clone(&self.name),
            }),
        }
    }

    pub fn delete(&self, rt: &Runtime, receiver: &Value) -> RunResult<()> {
        self.check_receiver(rt, receiver)?;
        match &self.delete {
            Some(delete) => delete(rt, receiver),
            None => Err(RunError::UndeletableAttribute {
                type_name: self.owner_name(),
                name: Arc::clone(&self.name),
            }),
        }
    }
}

impl fmt::Debug for GetSetDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<attribute '{}'>", self.name)
    }
}

/// Python's `property`: accessors are guest callables.
#[derive(Debug, Default)]
pub struct Property {
    name: Arc<str>,
    fget: Option<Value>,
    fset: Option<Value>,
    fdel: Option<Value>,
}

impl Property {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn fget(mut self, f: Value) -> Self {
        self.fget = Some(f);
        self
    }

    #[must_use]
    pub fn fset(mut self, f: Value) -> Self {
        self.fset = Some(f);
        self
    }

    #[must_use]
    pub fn fdel(mut self, f: Value) -> Self {
        self.fdel = Some(f);
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn missing(&self, rt: &Runtime, receiver: &Value, what: &str) -> RunError {
        let type_name = rt.type_of(receiver).map_or_else(|_| "object".into(), |t| t.name_arc());
        ExcType::attribute_error(format!(
            "property '{}' of '{type_name}' object has no {what}",
            self.name
        ))
    }

    pub fn get(&self, rt: &Runtime, receiver: &Value) -> RunResult<Value> {
        match &self.fget {
            Some(fget) => rt.call(fget, std::slice::from_ref(receiver)),
            None => Err(self.missing(rt, receiver, "getter")),
        }
    }

    pub fn set(&self, rt: &Runtime, receiver: &Value, value: Value) -> RunResult<()> {
        match &self.fset {
            Some(fset) => rt.call(fset, &[receiver.clone(), value]).map(|_| ()),
            None => Err(self.missing(rt, receiver, "setter")),
        }
    }

    pub fn delete(&self, rt: &Runtime, receiver: &Value) -> RunResult<()> {
        match &self.fdel {
            Some(fdel) => rt.call(fdel, std::slice::from_ref(receiver)).map(|_| ()),
            None => Err(self.missing(rt, receiver, "deleter")),
        }
    }
}
