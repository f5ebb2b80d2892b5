use std::{
    any::{Any, TypeId},
    fmt,
    sync::Arc,
};

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::{
    descriptor::{GetSetDescriptor, Property},
    exception::{RunError, RunResult},
    function::{BoundMethod, Function},
    host::{BuiltinHost, HostKey, Shape, short_type_name},
    types::{LongInt, TypeRef},
};

/// Insertion-ordered attribute dictionary used by types and instances.
pub type AttrMap = IndexMap<Arc<str>, Value, ahash::RandomState>;

/// A guest value.
///
/// Scalars are held inline; everything else is reference counted so that
/// cloning a `Value` is always cheap. Every variant maps to exactly one host
/// class (see [`Value::host_key`]).
#[derive(Clone)]
pub enum Value {
    None,
    NotImplemented,
    Bool(bool),
    Int(i64),
    Long(Arc<LongInt>),
    Float(f64),
    Str(Arc<str>),
    Type(TypeRef),
    Object(Arc<Instance>),
    Function(Arc<Function>),
    Method(Arc<BoundMethod>),
    Property(Arc<Property>),
    GetSet(Arc<GetSetDescriptor>),
    StaticMethod(Arc<Self>),
    ClassMethod(Arc<Self>),
    Native(Arc<NativeObject>),
}

impl Value {
    /// The host class identity of this value.
    #[must_use]
    pub fn host_key(&self) -> HostKey {
        let builtin = match self {
            Self::None => BuiltinHost::NoneType,
            Self::NotImplemented => BuiltinHost::NotImplemented,
            Self::Bool(_) => BuiltinHost::Bool,
            Self::Int(_) => BuiltinHost::Int,
            Self::Long(_) => BuiltinHost::Long,
            Self::Float(_) => BuiltinHost::Float,
            Self::Str(_) => BuiltinHost::Str,
            Self::Type(_) => BuiltinHost::Type,
            Self::Object(_) => BuiltinHost::Instance,
            Self::Function(_) => BuiltinHost::Function,
            Self::Method(_) => BuiltinHost::Method,
            Self::Property(_) => BuiltinHost::Property,
            Self::GetSet(_) => BuiltinHost::GetSet,
            Self::StaticMethod(_) => BuiltinHost::StaticMethod,
            Self::ClassMethod(_) => BuiltinHost::ClassMethod,
            Self::Native(obj) => return HostKey::Rust(obj.type_id),
        };
        HostKey::Builtin(builtin)
    }

    /// The guest type carried by values of a shared representation.
    ///
    /// Instances carry their class; type objects carry their metatype.
    #[must_use]
    pub fn carried_type(&self) -> Option<TypeRef> {
        match self {
            Self::Object(inst) => Some(Arc::clone(&inst.ty)),
            Self::Type(ty) => Some(ty.metatype()),
            _ => None,
        }
    }

    /// The call-site guard key of this value.
    #[must_use]
    pub fn shape(&self) -> Shape {
        let ty = match self {
            Self::Object(inst) => Some(inst.ty.serial()),
            Self::Type(ty) => Some(ty.metatype().serial()),
            _ => None,
        };
        Shape {
            host: self.host_key(),
            ty,
        }
    }

    /// Python's `is`: identity for reference values, equality for inline scalars.
    #[must_use]
    pub fn is(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::None, Self::None) | (Self::NotImplemented, Self::NotImplemented) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Long(a), Self::Long(b)) => Arc::ptr_eq(a, b),
            (Self::Str(a), Self::Str(b)) => Arc::ptr_eq(a, b),
            (Self::Type(a), Self::Type(b)) => Arc::ptr_eq(a, b),
            (Self::Object(a), Self::Object(b)) => Arc::ptr_eq(a, b),
            (Self::Function(a), Self::Function(b)) => Arc::ptr_eq(a, b),
            (Self::Method(a), Self::Method(b)) => Arc::ptr_eq(a, b),
            (Self::Property(a), Self::Property(b)) => Arc::ptr_eq(a, b),
            (Self::GetSet(a), Self::GetSet(b)) => Arc::ptr_eq(a, b),
            (Self::StaticMethod(a), Self::StaticMethod(b)) | (Self::ClassMethod(a), Self::ClassMethod(b)) => {
                Arc::ptr_eq(a, b)
            }
            (Self::Native(a), Self::Native(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    #[must_use]
    pub fn is_not_implemented(&self) -> bool {
        matches!(self, Self::NotImplemented)
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_type(&self) -> Option<&TypeRef> {
        match self {
            Self::Type(ty) => Some(ty),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_instance(&self) -> Option<&Arc<Instance>> {
        match self {
            Self::Object(inst) => Some(inst),
            _ => None,
        }
    }

    /// Wraps an arbitrary Rust value.
    ///
    /// Its guest type is whatever the registry binds to `T`: a registered type,
    /// or a found type synthesized on first dispatch.
    #[must_use]
    pub fn native<T: Any + Send + Sync>(value: T) -> Self {
        Self::Native(Arc::new(NativeObject {
            type_id: TypeId::of::<T>(),
            type_name: short_type_name(std::any::type_name::<T>()).into(),
            value: Box::new(value),
        }))
    }

    /// Borrows the Rust value inside a `Value::Native`, if it is a `T`.
    #[must_use]
    pub fn downcast_native<T: Any>(&self) -> Option<&T> {
        match self {
            Self::Native(obj) => obj.value.downcast_ref(),
            _ => None,
        }
    }

    /// Like [`Value::downcast_native`], but a mismatch is an internal error naming `what`.
    ///
    /// Slot bodies use this for receivers the dispatcher has already matched.
    pub fn expect_native<T: Any>(&self, what: &str) -> RunResult<&T> {
        self.downcast_native()
            .ok_or_else(|| RunError::internal(format!("{what}: receiver is not the expected native value")))
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::NotImplemented => f.write_str("NotImplemented"),
            Self::Bool(b) => f.write_str(if *b { "True" } else { "False" }),
            Self::Int(i) => write!(f, "{i}"),
            Self::Long(li) => write!(f, "{li}"),
            Self::Float(v) => write!(f, "{v:?}"),
            Self::Str(s) => write!(f, "{s:?}"),
            Self::Type(ty) => write!(f, "<class '{}'>", ty.name()),
            Self::Object(inst) => write!(f, "<{} object>", inst.ty.name()),
            Self::Function(func) => write!(f, "<function {}>", func.name()),
            Self::Method(m) => write!(f, "<bound method {:?} of {:?}>", m.func(), m.receiver()),
            Self::Property(p) => write!(f, "<property {}>", p.name()),
            Self::GetSet(g) => write!(f, "<attribute '{}'>", g.name()),
            Self::StaticMethod(inner) => write!(f, "<staticmethod({inner:?})>"),
            Self::ClassMethod(inner) => write!(f, "<classmethod({inner:?})>"),
            Self::Native(obj) => write!(f, "<{} native>", obj.type_name),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s.into())
    }
}

impl From<TypeRef> for Value {
    fn from(ty: TypeRef) -> Self {
        Self::Type(ty)
    }
}

/// A Rust value carried through the guest world.
pub struct NativeObject {
    type_id: TypeId,
    type_name: Arc<str>,
    value: Box<dyn Any + Send + Sync>,
}

impl NativeObject {
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }
}

/// Per-instance attribute storage mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum DictMode {
    /// Instances have no attribute storage.
    None,
    /// Instances have a writable dictionary.
    #[default]
    Mutable,
    /// Instances have a dictionary fixed at construction; every write is rejected.
    Frozen,
}

/// Attribute storage of one instance.
#[derive(Debug)]
pub enum InstanceDict {
    None,
    Mutable(RwLock<AttrMap>),
    Frozen(AttrMap),
}

/// An instance of a guest-defined class.
#[derive(Debug)]
pub struct Instance {
    ty: TypeRef,
    dict: InstanceDict,
}

impl Instance {
    pub(crate) fn new(ty: TypeRef, dict: InstanceDict) -> Self {
        Self { ty, dict }
    }

    #[must_use]
    pub fn ty(&self) -> &TypeRef {
        &self.ty
    }

    #[must_use]
    pub fn has_dict(&self) -> bool {
        !matches!(self.dict, InstanceDict::None)
    }

    /// Reads one entry of the instance dictionary.
    #[must_use]
    pub fn dict_get(&self, name: &str) -> Option<Value> {
        match &self.dict {
            InstanceDict::None => None,
            InstanceDict::Mutable(map) => map.read().get(name).cloned(),
            InstanceDict::Frozen(map) => map.get(name).cloned(),
        }
    }

    /// Snapshot of the instance dictionary keys, in insertion order.
    #[must_use]
    pub fn dict_keys(&self) -> Vec<Arc<str>> {
        match &self.dict {
            InstanceDict::None => Vec::new(),
            InstanceDict::Mutable(map) => map.read().keys().cloned().collect(),
            InstanceDict::Frozen(map) => map.keys().cloned().collect(),
        }
    }

    /// Writes `name` into the instance dictionary.
    ///
    /// Fails with `ReadOnlyAttribute` on frozen storage and with
    /// `NoSuchAttribute` when the instance has no storage at all.
    pub(crate) fn dict_set(&self, name: &str, value: Value) -> RunResult<()> {
        match &self.dict {
            InstanceDict::Mutable(map) => {
                map.write().insert(name.into(), value);
                Ok(())
            }
            InstanceDict::Frozen(_) => Err(RunError::ReadOnlyAttribute {
                type_name: self.ty.name_arc(),
                name: name.into(),
            }),
            InstanceDict::None => Err(RunError::NoSuchAttribute {
                type_name: self.ty.name_arc(),
                name: name.into(),
                on_type: false,
            }),
        }
    }

    /// Removes `name` from the instance dictionary.
    pub(crate) fn dict_delete(&self, name: &str) -> RunResult<()> {
        let missing = || RunError::NoSuchAttribute {
            type_name: self.ty.name_arc(),
            name: name.into(),
            on_type: false,
        };
        match &self.dict {
            InstanceDict::Mutable(map) => map.write().shift_remove(name).map(|_| ()).ok_or_else(missing),
            InstanceDict::Frozen(map) if map.contains_key(name) => Err(RunError::ReadOnlyAttribute {
                type_name: self.ty.name_arc(),
                name: name.into(),
            }),
            InstanceDict::Frozen(_) | InstanceDict::None => Err(missing()),
        }
    }
}
