//! Built-in types.
//!
//! The runtime creates these at construction: `object` and `type` first (each
//! needs the other), then the descriptor types every attribute lookup relies
//! on, then a small numeric and string tower used to exercise
//! multi-representation dispatch. All of them are immutable; only `object` and
//! `type` accept guest subclasses.

mod descriptors;
mod float;
mod int;
mod object;
mod str_;
mod type_;

use std::sync::Arc;

use crate::{
    descriptor::GetSetDescriptor,
    exception::{ExcType, RunResult},
    function::Function,
    host::{BuiltinHost, HostClass, HostKey, HostTable},
    registry::{ClassRegistry, Registration, Representation},
    runtime::{Runtime, TypeTable},
    slot::{NativeFn, native_fn},
    tracer::DispatchTracer,
    types::{TypeFlags, TypeParts, TypeRef},
    value::{AttrMap, DictMode, Value},
};

/// Handles to the built-in types of one runtime.
pub(crate) struct Builtins {
    pub object: TypeRef,
    pub type_: TypeRef,
    pub none: TypeRef,
    pub bool_: TypeRef,
    pub int: TypeRef,
    pub float: TypeRef,
    pub str_: TypeRef,
    pub function: TypeRef,
    pub property: TypeRef,
}

struct Boot<'a> {
    types: &'a TypeTable,
    registry: &'a ClassRegistry,
    hosts: &'a HostTable,
    tracer: &'a dyn DispatchTracer,
}

impl Boot<'_> {
    /// Defines one single-inheritance built-in and publishes its host classes.
    fn define(
        &self,
        name: &str,
        base: Option<&TypeRef>,
        metatype: Option<&TypeRef>,
        basetype: bool,
        hosts: &[BuiltinHost],
        dict: AttrMap,
    ) -> TypeRef {
        let serial = self.types.next_serial();
        let ty = self.types.define(TypeParts {
            serial,
            name: name.into(),
            bases: base.into_iter().cloned().collect(),
            mro_tail: base.map(|b| b.mro().cloned().collect()).unwrap_or_default(),
            metatype: metatype.cloned(),
            flags: TypeFlags {
                mutable: false,
                basetype,
                instance_dict: DictMode::None,
            },
            dict,
            hosts: hosts.iter().map(|host| self.hosts.get(*host).clone()).collect(),
        });
        for ops in ty.representations() {
            if matches!(ops.host_class().key(), HostKey::Builtin(host) if host.is_shared()) {
                continue;
            }
            let representation = if ops.is_canonical() {
                Representation::Known {
                    ty: Arc::clone(&ty),
                    ops: Arc::clone(ops),
                }
            } else {
                Representation::Adopted {
                    ty: Arc::clone(&ty),
                    ops: Arc::clone(ops),
                }
            };
            self.publish(ops.host_class().clone(), representation);
        }
        self.tracer.on_type_created(name, serial);
        ty
    }

    fn publish(&self, class: HostClass, representation: Representation) {
        let kind = representation.kind();
        let name = class.name().to_owned();
        let (_, won) = self.registry.publish(Registration::new(class, representation));
        self.tracer.on_representation_published(&name, kind, won);
    }
}

/// Creates the built-in types and binds their host classes.
pub(crate) fn bootstrap(
    types: &TypeTable,
    registry: &ClassRegistry,
    hosts: &HostTable,
    tracer: &dyn DispatchTracer,
) -> Builtins {
    let boot = Boot {
        types,
        registry,
        hosts,
        tracer,
    };

    // `object` is briefly its own metatype until `type` exists
    let object = boot.define("object", None, None, true, &[BuiltinHost::Object], object::dict());
    let type_ = boot.define("type", Some(&object), None, true, &[BuiltinHost::Type], type_::dict());
    object.set_metatype(&type_);
    for (host, canonical) in [(BuiltinHost::Instance, &object), (BuiltinHost::Type, &type_)] {
        boot.publish(
            hosts.get(host).clone(),
            Representation::Shared {
                canonical: Arc::clone(canonical),
            },
        );
    }

    let leaf = |name: &str, base: &TypeRef, host: &[BuiltinHost], dict: AttrMap| {
        boot.define(name, Some(base), Some(&type_), false, host, dict)
    };
    let none = leaf("NoneType", &object, &[BuiltinHost::NoneType], object::none_dict());
    leaf(
        "NotImplementedType",
        &object,
        &[BuiltinHost::NotImplemented],
        object::not_implemented_dict(),
    );
    let function = leaf("function", &object, &[BuiltinHost::Function], descriptors::function_dict());
    leaf("method", &object, &[BuiltinHost::Method], descriptors::method_dict());
    let property = leaf("property", &object, &[BuiltinHost::Property], descriptors::property_dict());
    leaf(
        "getset_descriptor",
        &object,
        &[BuiltinHost::GetSet],
        descriptors::getset_dict(),
    );
    leaf(
        "staticmethod",
        &object,
        &[BuiltinHost::StaticMethod],
        descriptors::staticmethod_dict(),
    );
    leaf(
        "classmethod",
        &object,
        &[BuiltinHost::ClassMethod],
        descriptors::classmethod_dict(),
    );

    let int = leaf("int", &object, &[BuiltinHost::Int, BuiltinHost::Long], int::dict(hosts));
    // the grid is complete by construction; `build` only fails on an incomplete grid
    if let Ok(grid) = int::grid(hosts).build(&int) {
        int.install_grid(grid);
    }
    let bool_ = leaf("bool", &int, &[BuiltinHost::Bool], int::bool_dict());
    let float = leaf("float", &object, &[BuiltinHost::Float], float::dict());
    let str_ = leaf("str", &object, &[BuiltinHost::Str], str_::dict());

    Builtins {
        object,
        type_,
        none,
        bool_,
        int,
        float,
        str_,
        function,
        property,
    }
}

// ============================================================================
// Helpers shared by the built-in type modules
// ============================================================================

/// A dictionary entry holding a method with one native body.
fn method<F>(name: &str, f: F) -> (Arc<str>, Value)
where
    F: Fn(&Runtime, &[Value]) -> RunResult<Value> + Send + Sync + 'static,
{
    (name.into(), Value::Function(Arc::new(Function::new(name, native_fn(f)))))
}

/// A dictionary entry holding a method with one body per host class.
fn per_representation(name: &str, bodies: impl IntoIterator<Item = (HostClass, NativeFn)>) -> (Arc<str>, Value) {
    (name.into(), Value::Function(Arc::new(Function::per_representation(name, bodies))))
}

/// A dictionary entry holding a getset descriptor.
fn getset(descriptor: GetSetDescriptor) -> (Arc<str>, Value) {
    (descriptor.name().into(), Value::GetSet(Arc::new(descriptor)))
}

fn one_arg<'a>(name: &str, args: &'a [Value]) -> RunResult<&'a Value> {
    match args {
        [a] => Ok(a),
        _ => Err(ExcType::arg_count(name, 1, args.len())),
    }
}

fn two_args<'a>(name: &str, args: &'a [Value]) -> RunResult<(&'a Value, &'a Value)> {
    match args {
        [a, b] => Ok((a, b)),
        _ => Err(ExcType::arg_count(name, 2, args.len())),
    }
}

fn three_args<'a>(name: &str, args: &'a [Value]) -> RunResult<(&'a Value, &'a Value, &'a Value)> {
    match args {
        [a, b, c] => Ok((a, b, c)),
        _ => Err(ExcType::arg_count(name, 3, args.len())),
    }
}
