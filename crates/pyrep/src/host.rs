//! Host class identity.
//!
//! A host class names one concrete Rust representation of guest values. The
//! runtime's own [`Value`](crate::Value) variants each have a fixed
//! [`BuiltinHost`]; arbitrary Rust values carried in `Value::Native` are
//! identified by their `TypeId`. Host classes form a single-inheritance chain
//! used for "is assignable to" tests when a method body is chosen per
//! representation.

use std::{
    any::TypeId,
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

use strum::{Display, EnumCount, EnumIter, IntoEnumIterator, IntoStaticStr};

/// Host classes backing the runtime's own value variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr, EnumIter, EnumCount)]
#[strum(serialize_all = "snake_case")]
pub enum BuiltinHost {
    /// Root of the host class chain. No value has this host directly.
    Object,
    #[strum(serialize = "NoneType")]
    NoneType,
    #[strum(serialize = "NotImplementedType")]
    NotImplemented,
    Bool,
    /// Small integers held inline as `i64`.
    Int,
    /// Arbitrary precision integers.
    Long,
    Float,
    Str,
    /// Type objects; the guest type is the value's metatype.
    Type,
    /// Instances of guest-defined classes; the guest type is read from the instance.
    Instance,
    Function,
    Method,
    Property,
    GetSet,
    StaticMethod,
    ClassMethod,
}

impl BuiltinHost {
    /// The host superclass, or `None` for [`BuiltinHost::Object`].
    #[must_use]
    pub fn superclass(self) -> Option<Self> {
        match self {
            Self::Object => None,
            Self::Bool => Some(Self::Int),
            _ => Some(Self::Object),
        }
    }

    /// Whether values of this host class carry their guest type with them.
    #[must_use]
    pub fn is_shared(self) -> bool {
        matches!(self, Self::Type | Self::Instance)
    }
}

/// Hashable identity of a host class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostKey {
    Builtin(BuiltinHost),
    Rust(TypeId),
}

/// An opaque, cheaply clonable host class.
///
/// Equality and hashing use the [`HostKey`] only.
#[derive(Clone)]
pub struct HostClass(Arc<HostClassInner>);

struct HostClassInner {
    key: HostKey,
    name: Arc<str>,
    superclass: Option<HostClass>,
}

impl HostClass {
    /// Creates the host class for one of the runtime's own value variants.
    ///
    /// Builtin host classes are created once by the [`Runtime`](crate::Runtime);
    /// use [`Runtime::builtin_host`](crate::Runtime::builtin_host) to obtain them.
    pub(crate) fn builtin(host: BuiltinHost, superclass: Option<Self>) -> Self {
        let name: &'static str = host.into();
        Self(Arc::new(HostClassInner {
            key: HostKey::Builtin(host),
            name: name.into(),
            superclass,
        }))
    }

    /// Creates a host class for an arbitrary Rust type.
    ///
    /// `superclass` is normally the runtime's `object` host class.
    #[must_use]
    pub fn rust<T: 'static>(superclass: Self) -> Self {
        Self::rust_named(TypeId::of::<T>(), short_type_name(std::any::type_name::<T>()), superclass)
    }

    pub(crate) fn rust_named(type_id: TypeId, name: &str, superclass: Self) -> Self {
        Self(Arc::new(HostClassInner {
            key: HostKey::Rust(type_id),
            name: name.into(),
            superclass: Some(superclass),
        }))
    }

    #[must_use]
    pub fn key(&self) -> HostKey {
        self.0.key
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    #[must_use]
    pub fn superclass(&self) -> Option<&Self> {
        self.0.superclass.as_ref()
    }

    /// Returns true if values of `self` may be used where `other` is expected.
    ///
    /// Walks the superclass chain starting at `self`.
    #[must_use]
    pub fn is_assignable_to(&self, other: &Self) -> bool {
        let mut current = Some(self);
        while let Some(class) = current {
            if class.key() == other.key() {
                return true;
            }
            current = class.superclass();
        }
        false
    }
}

impl PartialEq for HostClass {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for HostClass {}

impl Hash for HostClass {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl fmt::Debug for HostClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostClass({})", self.name())
    }
}

impl fmt::Display for HostClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The runtime's builtin host classes, one per [`BuiltinHost`].
pub(crate) struct HostTable(Box<[HostClass]>);

impl HostTable {
    pub(crate) fn new() -> Self {
        let object = HostClass::builtin(BuiltinHost::Object, None);
        let int = HostClass::builtin(BuiltinHost::Int, Some(object.clone()));
        Self(
            BuiltinHost::iter()
                .map(|host| match host {
                    BuiltinHost::Object => object.clone(),
                    BuiltinHost::Int => int.clone(),
                    BuiltinHost::Bool => HostClass::builtin(host, Some(int.clone())),
                    _ => HostClass::builtin(host, Some(object.clone())),
                })
                .collect(),
        )
    }

    pub(crate) fn get(&self, host: BuiltinHost) -> &HostClass {
        &self.0[host as usize]
    }
}

/// The guard key of one call-site argument.
///
/// For shared representations the host class alone does not determine the
/// guest type, so the shape also records the type's serial number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Shape {
    pub host: HostKey,
    pub ty: Option<u64>,
}

/// Strips the module path from `std::any::type_name` output, keeping generics intact.
pub(crate) fn short_type_name(full: &str) -> &str {
    let head = full.split('<').next().unwrap_or(full);
    match head.rfind("::") {
        Some(idx) => &full[idx + 2..],
        None => full,
    }
}
