//! The runtime context.
//!
//! A [`Runtime`] owns everything the dispatch core shares between calls: the
//! configuration, the [`ClassRegistry`], the built-in types and the tracer.
//! Nothing is global; two runtimes never see each other's types. Share one
//! runtime between threads by wrapping it in an `Arc`.

use std::{
    any::Any,
    fmt,
    sync::{
        Arc, Weak,
        atomic::{AtomicU64, Ordering},
    },
};

use parking_lot::{Mutex, RwLock};
use smallvec::SmallVec;

use crate::{
    builtins::{self, Builtins},
    config::RuntimeConfig,
    descriptor::descr_get,
    dispatch::{self, Comparison, grid::GridBuilder},
    exception::{ExcType, RunError, RunResult},
    function::Function,
    host::{BuiltinHost, HostClass, HostKey, HostTable, Shape},
    operation_set::OperationSet,
    registry::{ClassRegistry, Registration, Representation},
    resolver,
    slot::Slot,
    tracer::{DispatchTracer, NoopTracer},
    types::{SpecAttr, TypeFlags, TypeObject, TypeParts, TypeRef, TypeSpec, TypeSpecHost, mro::compute_c3_mro},
    value::{AttrMap, DictMode, Instance, InstanceDict, Value},
};

/// Allocates types and remembers them for teardown.
pub(crate) struct TypeTable {
    serials: AtomicU64,
    created: Mutex<Vec<Weak<TypeObject>>>,
}

impl TypeTable {
    fn new() -> Self {
        Self {
            serials: AtomicU64::new(1),
            created: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn next_serial(&self) -> u64 {
        self.serials.fetch_add(1, Ordering::Relaxed)
    }

    /// Allocates a type, binds its declared descriptors to it and fills its slot tables.
    pub(crate) fn define(&self, parts: TypeParts) -> TypeRef {
        let ty = TypeObject::allocate(parts);
        for key in ty.dict_keys() {
            match ty.dict_get(&key) {
                Some(Value::Function(f)) => f.bind_objclass(&ty),
                Some(Value::GetSet(g)) => g.bind_objclass(&ty),
                _ => {}
            }
        }
        ty.recompute_all();
        let mut created = self.created.lock();
        created.retain(|weak| weak.strong_count() > 0);
        created.push(Arc::downgrade(&ty));
        ty
    }

    /// Clears every live type; returns how many there were.
    fn clear_all(&self) -> usize {
        let types: Vec<TypeRef> = self.created.lock().drain(..).filter_map(|weak| weak.upgrade()).collect();
        for ty in &types {
            ty.clear();
        }
        types.len()
    }
}

/// The dispatch runtime.
///
/// ```
/// use pyrep::{Runtime, Slot, Value};
///
/// let rt = Runtime::default();
/// let sum = rt.binary(Slot::Add, &Value::Int(2), &Value::Int(3)).unwrap();
/// assert!(matches!(sum, Value::Int(5)));
/// ```
pub struct Runtime {
    config: RuntimeConfig,
    tracer: Arc<dyn DispatchTracer>,
    hosts: HostTable,
    registry: ClassRegistry,
    types: TypeTable,
    builtins: Builtins,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.config)
            .field("registered", &self.registry.len())
            .field("tracer", &self.tracer)
            .finish_non_exhaustive()
    }
}

impl Runtime {
    #[must_use]
    pub fn new(config: RuntimeConfig) -> Self {
        Self::with_tracer(config, Arc::new(NoopTracer))
    }

    /// Creates a runtime that reports dispatch events to `tracer`.
    #[must_use]
    pub fn with_tracer(config: RuntimeConfig, tracer: Arc<dyn DispatchTracer>) -> Self {
        let hosts = HostTable::new();
        let registry = ClassRegistry::new();
        let types = TypeTable::new();
        let builtins = builtins::bootstrap(&types, &registry, &hosts, tracer.as_ref());
        Self {
            config,
            tracer,
            hosts,
            registry,
            types,
            builtins,
        }
    }

    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    #[must_use]
    pub fn tracer(&self) -> &dyn DispatchTracer {
        self.tracer.as_ref()
    }

    #[must_use]
    pub fn registry(&self) -> &ClassRegistry {
        &self.registry
    }

    /// The host class of one of the runtime's own value variants.
    #[must_use]
    pub fn builtin_host(&self, host: BuiltinHost) -> HostClass {
        self.hosts.get(host).clone()
    }

    // ========================================================================
    // Built-in types
    // ========================================================================

    #[must_use]
    pub fn object_type(&self) -> &TypeRef {
        &self.builtins.object
    }

    #[must_use]
    pub fn type_type(&self) -> &TypeRef {
        &self.builtins.type_
    }

    #[must_use]
    pub fn none_type(&self) -> &TypeRef {
        &self.builtins.none
    }

    #[must_use]
    pub fn bool_type(&self) -> &TypeRef {
        &self.builtins.bool_
    }

    #[must_use]
    pub fn int_type(&self) -> &TypeRef {
        &self.builtins.int
    }

    #[must_use]
    pub fn float_type(&self) -> &TypeRef {
        &self.builtins.float
    }

    #[must_use]
    pub fn str_type(&self) -> &TypeRef {
        &self.builtins.str_
    }

    #[must_use]
    pub fn function_type(&self) -> &TypeRef {
        &self.builtins.function
    }

    #[must_use]
    pub fn property_type(&self) -> &TypeRef {
        &self.builtins.property
    }

    // ========================================================================
    // Value -> type resolution
    // ========================================================================

    /// The guest type of `v` and the operation set that handles it.
    pub fn resolve_value(&self, v: &Value) -> RunResult<(TypeRef, Arc<OperationSet>)> {
        if let Some(ty) = v.carried_type() {
            let host = match v {
                Value::Type(_) => self.hosts.get(BuiltinHost::Type),
                _ => self.hosts.get(BuiltinHost::Instance),
            };
            let ops = ty.ops_for(host).cloned().ok_or_else(|| {
                RunError::internal(format!("type '{}' has no representation for host '{host}'", ty.name()))
            })?;
            return Ok((ty, ops));
        }
        let entry = match self.registry.lookup(v.host_key()) {
            Some(entry) => entry,
            None => {
                let Value::Native(obj) = v else {
                    return Err(RunError::internal(format!("builtin host of {v:?} is not registered")));
                };
                let class =
                    HostClass::rust_named(obj.type_id(), obj.type_name(), self.builtin_host(BuiltinHost::Object));
                self.registry.resolve(self, &class)?
            }
        };
        match entry.representation() {
            Representation::Shared { canonical } => {
                let ops = canonical
                    .ops_for(entry.class())
                    .cloned()
                    .ok_or_else(|| RunError::internal("shared representation has no operation set"))?;
                Ok((Arc::clone(canonical), ops))
            }
            representation => {
                let ops = representation
                    .ops()
                    .cloned()
                    .ok_or_else(|| RunError::internal("registry entry has no operation set"))?;
                Ok((Arc::clone(representation.ty()), ops))
            }
        }
    }

    /// Python's `type(v)`.
    pub fn type_of(&self, v: &Value) -> RunResult<TypeRef> {
        match v.carried_type() {
            Some(ty) => Ok(ty),
            None => self.resolve_value(v).map(|(ty, _)| ty),
        }
    }

    /// The operation set handling `v`.
    pub fn ops_of(&self, v: &Value) -> RunResult<Arc<OperationSet>> {
        self.resolve_value(v).map(|(_, ops)| ops)
    }

    /// The host class of `v`.
    pub fn host_class_of(&self, v: &Value) -> RunResult<HostClass> {
        match v.host_key() {
            HostKey::Builtin(host) => Ok(self.builtin_host(host)),
            HostKey::Rust(_) => self.ops_of(v).map(|ops| ops.host_class().clone()),
        }
    }

    /// The call-site guard key of `v`.
    #[must_use]
    pub fn shape_of(&self, v: &Value) -> Shape {
        v.shape()
    }

    /// Resolves the Rust type `T` to its operation set, synthesizing a found type if allowed.
    pub fn resolve_class<T: Any>(&self) -> RunResult<Arc<OperationSet>> {
        let class = HostClass::rust::<T>(self.builtin_host(BuiltinHost::Object));
        self.registry.resolve_ops(self, &class)
    }

    /// Builds the registry entry for a Rust type seen for the first time.
    ///
    /// The found type is an immutable leaf subclass of `object` named after the
    /// Rust type, with no instance storage.
    pub(crate) fn build_found_type(&self, class: &HostClass) -> RunResult<Registration> {
        let object = &self.builtins.object;
        let ty = self.types.define(TypeParts {
            serial: self.types.next_serial(),
            name: class.name().into(),
            bases: vec![Arc::clone(object)],
            mro_tail: vec![Arc::clone(object)],
            metatype: Some(Arc::clone(&self.builtins.type_)),
            flags: TypeFlags {
                mutable: false,
                basetype: false,
                instance_dict: DictMode::None,
            },
            dict: AttrMap::default(),
            hosts: vec![class.clone()],
        });
        let ops = ty
            .representations()
            .first()
            .cloned()
            .ok_or_else(|| RunError::internal("found type has no representation"))?;
        Ok(Registration::new(class.clone(), Representation::Found { ty, ops }))
    }

    // ========================================================================
    // Type creation
    // ========================================================================

    /// Creates a guest type from `spec` and registers its host classes.
    ///
    /// Bases default to `object` and the metatype to the most derived
    /// metatype among the bases.
    pub fn create_type(&self, spec: TypeSpec) -> RunResult<TypeRef> {
        let TypeSpec {
            name,
            mut bases,
            metatype,
            canonical,
            adopted,
            flags,
            attrs,
        } = spec;
        if bases.is_empty() {
            bases.push(Arc::clone(&self.builtins.object));
        }
        if let Some(base) = bases.iter().find(|base| !base.is_basetype()) {
            return Err(ExcType::type_error(format!(
                "type '{}' is not an acceptable base type",
                base.name()
            )));
        }
        let metatype = self.winning_metatype(metatype, &bases)?;
        let mro_tail = compute_c3_mro(&bases, &self.config)?;

        let mut hosts = Vec::with_capacity(1 + adopted.len());
        for host in std::iter::once(canonical).chain(adopted) {
            let class = self.materialize_host(host, &bases);
            if hosts.iter().any(|h: &HostClass| h.key() == class.key()) {
                return Err(ExcType::type_error(format!(
                    "type '{name}' lists host class '{class}' twice"
                )));
            }
            if !is_shared(&class) {
                self.registry.ensure_unbound(&class)?;
            }
            hosts.push(class);
        }

        let mut dict = AttrMap::default();
        for (attr_name, attr) in attrs {
            let value = match attr {
                SpecAttr::Value(value) => value,
                SpecAttr::PerRepresentation(bodies) => {
                    if bodies.len() != hosts.len() {
                        return Err(ExcType::type_error(format!(
                            "method '{attr_name}' has {} bodies but type '{name}' has {} representations",
                            bodies.len(),
                            hosts.len()
                        )));
                    }
                    let func = Function::per_representation(&attr_name, hosts.iter().cloned().zip(bodies));
                    Value::Function(Arc::new(func))
                }
            };
            dict.insert(attr_name, value);
        }

        let serial = self.types.next_serial();
        let ty = self.types.define(TypeParts {
            serial,
            name: name.as_str().into(),
            bases,
            mro_tail,
            metatype: Some(metatype),
            flags,
            dict,
            hosts,
        });
        let registrations: Vec<Registration> = ty
            .representations()
            .iter()
            .filter(|ops| !is_shared(ops.host_class()))
            .map(|ops| {
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
                Registration::new(ops.host_class().clone(), representation)
            })
            .collect();
        // another thread may have bound one of our classes since the check above
        let published = match self.registry.register_all(registrations) {
            Ok(published) => published,
            Err(err) => {
                ty.discard();
                return Err(err);
            }
        };
        for entry in &published {
            self.tracer
                .on_representation_published(entry.class().name(), entry.representation().kind(), true);
        }
        self.tracer.on_type_created(&name, serial);
        Ok(ty)
    }

    fn winning_metatype(&self, explicit: Option<TypeRef>, bases: &[TypeRef]) -> RunResult<TypeRef> {
        let mut winner = match explicit {
            Some(meta) if !meta.is_subtype(&self.builtins.type_) => {
                return Err(ExcType::type_error(format!(
                    "metaclass '{}' is not a subclass of 'type'",
                    meta.name()
                )));
            }
            Some(meta) => meta,
            None => Arc::clone(&self.builtins.type_),
        };
        for base in bases {
            let candidate = base.metatype();
            if winner.is_subtype(&candidate) {
                continue;
            }
            if candidate.is_subtype(&winner) {
                winner = candidate;
            } else {
                return Err(ExcType::type_error(
                    "metaclass conflict: the metaclass of a derived class must be a (non-strict) subclass of the metaclasses of all its bases",
                ));
            }
        }
        Ok(winner)
    }

    fn materialize_host(&self, host: TypeSpecHost, bases: &[TypeRef]) -> HostClass {
        match host {
            TypeSpecHost::Shared => {
                let type_ = &self.builtins.type_;
                if bases.iter().any(|base| base.is_subtype(type_)) {
                    self.builtin_host(BuiltinHost::Type)
                } else {
                    self.builtin_host(BuiltinHost::Instance)
                }
            }
            TypeSpecHost::Class(class) => class,
            TypeSpecHost::Rust { type_id, name } => {
                HostClass::rust_named(type_id, name, self.builtin_host(BuiltinHost::Object))
            }
        }
    }

    /// Installs a dense binary grid on an immutable type.
    pub fn install_grid(&self, ty: &TypeRef, builder: GridBuilder) -> RunResult<()> {
        if ty.is_mutable() {
            return Err(ExcType::type_error(format!(
                "binary grid requires an immutable type, '{}' is mutable",
                ty.name()
            )));
        }
        let grid = builder.build(ty)?;
        if ty.install_grid(grid) {
            Ok(())
        } else {
            Err(ExcType::type_error(format!("type '{}' already has a binary grid", ty.name())))
        }
    }

    /// Creates an instance of an instance-hosted type without running `__init__`.
    pub fn new_instance(&self, ty: &TypeRef) -> RunResult<Value> {
        self.new_instance_with(ty, AttrMap::default())
    }

    /// Creates an instance whose storage starts with `attrs`.
    ///
    /// This is the only way to populate frozen storage.
    pub fn new_instance_with(&self, ty: &TypeRef, attrs: AttrMap) -> RunResult<Value> {
        if !ty.is_instance_hosted() {
            return Err(ExcType::type_error(format!("cannot create '{}' instances", ty.name())));
        }
        let dict = match ty.flags().instance_dict {
            DictMode::None if attrs.is_empty() => InstanceDict::None,
            DictMode::None => {
                return Err(ExcType::type_error(format!(
                    "'{}' instances have no attribute storage",
                    ty.name()
                )));
            }
            DictMode::Mutable => InstanceDict::Mutable(RwLock::new(attrs)),
            DictMode::Frozen => InstanceDict::Frozen(attrs),
        };
        Ok(Value::Object(Arc::new(Instance::new(Arc::clone(ty), dict))))
    }

    // ========================================================================
    // Calls
    // ========================================================================

    /// Python's `callable(*args)`.
    pub fn call(&self, callable: &Value, args: &[Value]) -> RunResult<Value> {
        match callable {
            Value::Function(f) => f.call(self, args),
            Value::Method(m) => m.call(self, args),
            _ => {
                let ops = self.ops_of(callable)?;
                let mut full: SmallVec<[Value; 4]> = SmallVec::with_capacity(args.len() + 1);
                full.push(callable.clone());
                full.extend(args.iter().cloned());
                match ops.handle(Slot::Call).invoke(self, &full) {
                    Err(RunError::EmptySlot) => Err(RunError::NotCallable {
                        type_name: self.type_of(callable)?.name_arc(),
                    }),
                    result => result,
                }
            }
        }
    }

    /// Calls the special method `slot` of `receiver`'s type through the descriptor protocol.
    ///
    /// `EmptySlot` when the type has no such attribute, so callers can treat
    /// it like an undefined slot.
    pub(crate) fn call_special(&self, receiver: &Value, slot: Slot, rest: &[Value]) -> RunResult<Value> {
        let ty = self.type_of(receiver)?;
        let attr = match ty.lookup(slot.method_name()) {
            None | Some(Value::None) => return Err(RunError::EmptySlot),
            Some(attr) => attr,
        };
        let table = self.ops_of(&attr)?.table();
        match descr_get(self, &attr, &table, Some(receiver), &ty) {
            Ok(bound) => self.call(&bound, rest),
            // not a descriptor: called as found, without the receiver
            Err(RunError::EmptySlot) => self.call(&attr, rest),
            Err(err) => Err(err),
        }
    }

    // ========================================================================
    // Convenience entry points
    // ========================================================================

    pub fn get_attr(&self, obj: &Value, name: &str) -> RunResult<Value> {
        resolver::get_attr(self, obj, name)
    }

    pub fn set_attr(&self, obj: &Value, name: &str, value: Value) -> RunResult<()> {
        resolver::set_attr(self, obj, name, value)
    }

    pub fn del_attr(&self, obj: &Value, name: &str) -> RunResult<()> {
        resolver::del_attr(self, obj, name)
    }

    pub fn has_attr(&self, obj: &Value, name: &str) -> RunResult<bool> {
        resolver::has_attr(self, obj, name)
    }

    pub fn unary(&self, slot: Slot, v: &Value) -> RunResult<Value> {
        dispatch::invoke_unary(self, slot, v)
    }

    pub fn binary(&self, slot: Slot, v: &Value, w: &Value) -> RunResult<Value> {
        dispatch::invoke_binary(self, slot, v, w)
    }

    pub fn inplace(&self, slot: Slot, v: &Value, w: &Value) -> RunResult<Value> {
        dispatch::invoke_inplace(self, slot, v, w)
    }

    pub fn compare(&self, op: Comparison, v: &Value, w: &Value) -> RunResult<Value> {
        dispatch::compare(self, op, v, w)
    }

    /// Python truthiness: `__bool__`, then `__len__`, then true.
    pub fn is_true(&self, v: &Value) -> RunResult<bool> {
        match v {
            Value::Bool(b) => return Ok(*b),
            Value::None => return Ok(false),
            _ => {}
        }
        let ops = self.ops_of(v)?;
        let arg = std::slice::from_ref(v);
        match ops.handle(Slot::Bool).invoke(self, arg) {
            Ok(Value::Bool(b)) => Ok(b),
            Ok(other) => Err(ExcType::type_error(format!(
                "__bool__ should return bool, returned {}",
                self.type_of(&other)?.name()
            ))),
            Err(RunError::EmptySlot) => match ops.handle(Slot::Len).invoke(self, arg) {
                Err(RunError::EmptySlot) => Ok(true),
                result => Ok(self.len_result(v, result?)? != 0),
            },
            Err(err) => Err(err),
        }
    }

    /// Python's `len(v)`.
    pub fn len(&self, v: &Value) -> RunResult<usize> {
        match self.ops_of(v)?.handle(Slot::Len).invoke(self, std::slice::from_ref(v)) {
            Err(RunError::EmptySlot) => Err(ExcType::type_error(format!(
                "object of type '{}' has no len()",
                self.type_of(v)?.name()
            ))),
            result => self.len_result(v, result?),
        }
    }

    fn len_result(&self, v: &Value, result: Value) -> RunResult<usize> {
        match result {
            Value::Int(n) => usize::try_from(n).map_err(|_| ExcType::value_error("__len__() should return >= 0")),
            Value::Bool(b) => Ok(usize::from(b)),
            other => Err(ExcType::type_error(format!(
                "'{}' object cannot be interpreted as an integer (from {}.__len__)",
                self.type_of(&other)?.name(),
                self.type_of(v)?.name()
            ))),
        }
    }

    /// Python's `repr(v)`.
    pub fn repr(&self, v: &Value) -> RunResult<String> {
        match self.ops_of(v)?.handle(Slot::Repr).invoke(self, std::slice::from_ref(v)) {
            Ok(Value::Str(s)) => Ok(s.to_string()),
            Ok(other) => Err(ExcType::type_error(format!(
                "__repr__ returned non-string (type {})",
                self.type_of(&other)?.name()
            ))),
            Err(RunError::EmptySlot) => Ok(format!("<{} object>", self.type_of(v)?.name())),
            Err(err) => Err(err),
        }
    }

    /// Python's `hash(v)`.
    pub fn hash(&self, v: &Value) -> RunResult<i64> {
        match self.ops_of(v)?.handle(Slot::Hash).invoke(self, std::slice::from_ref(v)) {
            Ok(Value::Int(h)) => Ok(if h == -1 { -2 } else { h }),
            Ok(Value::Bool(b)) => Ok(i64::from(b)),
            Ok(Value::Long(li)) => Ok(li.hash()),
            Ok(_) => Err(ExcType::type_error("__hash__ method should return an integer")),
            Err(RunError::EmptySlot) => Err(ExcType::type_error(format!(
                "unhashable type: '{}'",
                self.type_of(v)?.name()
            ))),
            Err(err) => Err(err),
        }
    }
}

fn is_shared(class: &HostClass) -> bool {
    matches!(class.key(), HostKey::Builtin(host) if host.is_shared())
}

impl Drop for Runtime {
    fn drop(&mut self) {
        let types = self.types.clear_all();
        self.registry.clear();
        self.tracer.on_shutdown(types);
    }
}
