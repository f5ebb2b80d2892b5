use std::{any::TypeId, sync::Arc};

use crate::{
    descriptor::{GetSetDescriptor, Property},
    exception::RunResult,
    function::Function,
    host::{HostClass, short_type_name},
    runtime::Runtime,
    slot::{NativeFn, native_fn},
    types::{TypeFlags, TypeRef},
    value::{DictMode, Value},
};

/// Where the values of a new type live.
#[derive(Debug, Clone)]
pub enum TypeSpecHost {
    /// Instances of guest classes, or type objects for metaclasses; chosen from the bases.
    Shared,
    /// An explicit host class.
    Class(HostClass),
    /// A Rust type, materialized as a host class when the type is created.
    Rust { type_id: TypeId, name: &'static str },
}

pub(crate) enum SpecAttr {
    Value(Value),
    PerRepresentation(Vec<NativeFn>),
}

/// Declarative description of a guest type, consumed by
/// [`Runtime::create_type`](crate::Runtime::create_type).
///
/// Defaults describe a guest-defined class: mutable, subclassable, instances
/// with a writable dictionary, values carried by the shared instance host.
///
/// ```
/// use pyrep::{Runtime, TypeSpec, Value};
///
/// let rt = Runtime::default();
/// let point = rt
///     .create_type(TypeSpec::new("Point").method("norm", |_rt, _args| Ok(Value::Int(0))))
///     .unwrap();
/// assert_eq!(point.name(), "Point");
/// ```
pub struct TypeSpec {
    pub(crate) name: String,
    pub(crate) bases: Vec<TypeRef>,
    pub(crate) metatype: Option<TypeRef>,
    pub(crate) canonical: TypeSpecHost,
    pub(crate) adopted: Vec<TypeSpecHost>,
    pub(crate) flags: TypeFlags,
    pub(crate) attrs: Vec<(Arc<str>, SpecAttr)>,
}

impl TypeSpec {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            bases: Vec::new(),
            metatype: None,
            canonical: TypeSpecHost::Shared,
            adopted: Vec::new(),
            flags: TypeFlags::default(),
            attrs: Vec::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn base(mut self, base: &TypeRef) -> Self {
        self.bases.push(Arc::clone(base));
        self
    }

    #[must_use]
    pub fn bases<'a>(mut self, bases: impl IntoIterator<Item = &'a TypeRef>) -> Self {
        self.bases.extend(bases.into_iter().cloned());
        self
    }

    #[must_use]
    pub fn metatype(mut self, metatype: &TypeRef) -> Self {
        self.metatype = Some(Arc::clone(metatype));
        self
    }

    /// Declares `T` as the canonical host representation.
    #[must_use]
    pub fn canonical<T: 'static>(mut self) -> Self {
        self.canonical = rust_host::<T>();
        self
    }

    #[must_use]
    pub fn canonical_host(mut self, class: HostClass) -> Self {
        self.canonical = TypeSpecHost::Class(class);
        self
    }

    /// Accepts `T` as an additional (adopted) representation.
    #[must_use]
    pub fn adopt<T: 'static>(mut self) -> Self {
        self.adopted.push(rust_host::<T>());
        self
    }

    #[must_use]
    pub fn adopt_host(mut self, class: HostClass) -> Self {
        self.adopted.push(TypeSpecHost::Class(class));
        self
    }

    /// Forbids attribute assignment on the type object.
    #[must_use]
    pub fn immutable(mut self) -> Self {
        self.flags.mutable = false;
        self
    }

    /// Controls whether the type accepts subclasses.
    #[must_use]
    pub fn subclassable(mut self, basetype: bool) -> Self {
        self.flags.basetype = basetype;
        self
    }

    #[must_use]
    pub fn instance_dict(mut self, mode: DictMode) -> Self {
        self.flags.instance_dict = mode;
        self
    }

    /// Adds a plain attribute.
    #[must_use]
    pub fn attr(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.attrs.push((name.into(), SpecAttr::Value(value.into())));
        self
    }

    /// Adds a method with one native body.
    #[must_use]
    pub fn method<F>(self, name: &str, f: F) -> Self
    where
        F: Fn(&Runtime, &[Value]) -> RunResult<Value> + Send + Sync + 'static,
    {
        let func = Function::new(name, native_fn(f));
        self.attr(name, Value::Function(Arc::new(func)))
    }

    /// Adds a method with one body per representation, in representation order.
    #[must_use]
    pub fn method_per_representation(mut self, name: &str, bodies: Vec<NativeFn>) -> Self {
        self.attrs.push((name.into(), SpecAttr::PerRepresentation(bodies)));
        self
    }

    /// Adds a `staticmethod`.
    #[must_use]
    pub fn staticmethod<F>(self, name: &str, f: F) -> Self
    where
        F: Fn(&Runtime, &[Value]) -> RunResult<Value> + Send + Sync + 'static,
    {
        let func = Value::Function(Arc::new(Function::new(name, native_fn(f))));
        self.attr(name, Value::StaticMethod(Arc::new(func)))
    }

    /// Adds a `classmethod`; the body receives the class first.
    #[must_use]
    pub fn classmethod<F>(self, name: &str, f: F) -> Self
    where
        F: Fn(&Runtime, &[Value]) -> RunResult<Value> + Send + Sync + 'static,
    {
        let func = Value::Function(Arc::new(Function::new(name, native_fn(f))));
        self.attr(name, Value::ClassMethod(Arc::new(func)))
    }

    #[must_use]
    pub fn getset(self, descriptor: GetSetDescriptor) -> Self {
        let name = descriptor.name().to_owned();
        self.attr(&name, Value::GetSet(Arc::new(descriptor)))
    }

    #[must_use]
    pub fn property(self, property: Property) -> Self {
        let name = property.name().to_owned();
        self.attr(&name, Value::Property(Arc::new(property)))
    }
}

fn rust_host<T: 'static>() -> TypeSpecHost {
    TypeSpecHost::Rust {
        type_id: TypeId::of::<T>(),
        name: short_type_name(std::any::type_name::<T>()),
    }
}
