//! Guest type objects.

mod long_int;
pub(crate) mod mro;
mod spec;

use std::{
    collections::VecDeque,
    fmt,
    str::FromStr,
    sync::{
        Arc, OnceLock, Weak,
        atomic::{AtomicU64, Ordering},
    },
};

use arc_swap::ArcSwapOption;
use parking_lot::{Mutex, RwLock};

pub(crate) use self::spec::SpecAttr;
pub use self::{
    long_int::LongInt,
    spec::{TypeSpec, TypeSpecHost},
};
use crate::{
    dispatch::grid::BinaryGrid,
    exception::{RunError, RunResult},
    host::{BuiltinHost, HostClass, HostKey},
    operation_set::OperationSet,
    runtime::Runtime,
    slot::Slot,
    value::{AttrMap, DictMode, Value},
};

/// Shared handle to a guest type.
pub type TypeRef = Arc<TypeObject>;

/// Type-level flags fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TypeFlags {
    /// Attributes of the type may be assigned and deleted.
    pub mutable: bool,
    /// The type accepts new subclasses.
    pub basetype: bool,
    /// Storage given to instances created by `type.__call__`.
    pub instance_dict: DictMode,
}

impl Default for TypeFlags {
    fn default() -> Self {
        Self {
            mutable: true,
            basetype: true,
            instance_dict: DictMode::Mutable,
        }
    }
}

/// A guest type.
///
/// Holds its name, bases, C3 MRO, attribute dictionary and one
/// [`OperationSet`] per accepted host class (canonical first). Reassigning an
/// attribute whose name is a special method recomputes that slot on this type
/// and every live subclass before the assignment returns.
pub struct TypeObject {
    serial: u64,
    name: Arc<str>,
    bases: Vec<TypeRef>,
    /// MRO without the type itself.
    mro_tail: Vec<TypeRef>,
    /// Empty means the type is its own metatype (only `type` itself).
    metatype: ArcSwapOption<Self>,
    flags: TypeFlags,
    dict: RwLock<AttrMap>,
    representations: Vec<Arc<OperationSet>>,
    subclasses: Mutex<Vec<Weak<Self>>>,
    /// Serializes dictionary writes and the slot propagation that follows them.
    mutation: Mutex<()>,
    grid: OnceLock<Arc<BinaryGrid>>,
    version: AtomicU64,
}

/// Everything needed to allocate a [`TypeObject`].
pub(crate) struct TypeParts {
    pub serial: u64,
    pub name: Arc<str>,
    pub bases: Vec<TypeRef>,
    pub mro_tail: Vec<TypeRef>,
    pub metatype: Option<TypeRef>,
    pub flags: TypeFlags,
    pub dict: AttrMap,
    pub hosts: Vec<HostClass>,
}

impl TypeObject {
    /// Allocates a type and links it into its bases' subclass lists.
    ///
    /// Slot tables start empty; callers run [`TypeObject::recompute_all`] once
    /// descriptors in the dictionary know their owner.
    pub(crate) fn allocate(parts: TypeParts) -> TypeRef {
        let TypeParts {
            serial,
            name,
            bases,
            mro_tail,
            metatype,
            flags,
            dict,
            hosts,
        } = parts;
        let ty = Arc::new_cyclic(|weak: &Weak<Self>| Self {
            serial,
            name,
            bases,
            mro_tail,
            metatype: ArcSwapOption::new(metatype),
            flags,
            dict: RwLock::new(dict),
            representations: hosts
                .into_iter()
                .enumerate()
                .map(|(index, host)| Arc::new(OperationSet::new(weak.clone(), host, index)))
                .collect(),
            subclasses: Mutex::new(Vec::new()),
            mutation: Mutex::new(()),
            grid: OnceLock::new(),
            version: AtomicU64::new(0),
        });
        for base in &ty.bases {
            base.subclasses.lock().push(Arc::downgrade(&ty));
        }
        ty
    }

    /// Fills every slot of every representation from the current dictionary.
    pub(crate) fn recompute_all(self: &Arc<Self>) {
        for ops in &self.representations {
            ops.recompute_all(self);
        }
    }

    /// Unique serial number within a runtime, used in call-site shapes.
    #[must_use]
    pub fn serial(&self) -> u64 {
        self.serial
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn name_arc(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }

    #[must_use]
    pub fn bases(&self) -> &[TypeRef] {
        &self.bases
    }

    /// The method resolution order, starting with the type itself.
    pub fn mro(self: &Arc<Self>) -> impl Iterator<Item = &TypeRef> {
        std::iter::once(self).chain(self.mro_tail.iter())
    }

    /// MRO type names, mostly for diagnostics and tests.
    #[must_use]
    pub fn mro_names(self: &Arc<Self>) -> Vec<String> {
        self.mro().map(|t| t.name().to_owned()).collect()
    }

    #[must_use]
    pub fn metatype(self: &Arc<Self>) -> TypeRef {
        self.metatype.load_full().unwrap_or_else(|| Arc::clone(self))
    }

    pub(crate) fn set_metatype(&self, metatype: &TypeRef) {
        self.metatype.store(Some(Arc::clone(metatype)));
    }

    #[must_use]
    pub fn flags(&self) -> TypeFlags {
        self.flags
    }

    #[must_use]
    pub fn is_mutable(&self) -> bool {
        self.flags.mutable
    }

    #[must_use]
    pub fn is_basetype(&self) -> bool {
        self.flags.basetype
    }

    /// Number of attribute mutations applied to this type.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Returns true if `self` is `other` or has `other` in its MRO.
    #[must_use]
    pub fn is_subtype(&self, other: &Self) -> bool {
        std::ptr::eq(self, other) || self.mro_tail.iter().any(|t| std::ptr::eq(&**t, other))
    }

    /// All operation sets, canonical first.
    #[must_use]
    pub fn representations(&self) -> &[Arc<OperationSet>] {
        &self.representations
    }

    /// The host class the type was declared with.
    #[must_use]
    pub fn canonical_host(&self) -> Option<&HostClass> {
        self.representations.first().map(|ops| ops.host_class())
    }

    /// Whether `type.__call__` may create plain instances of this type.
    #[must_use]
    pub fn is_instance_hosted(&self) -> bool {
        matches!(
            self.canonical_host().map(HostClass::key),
            Some(HostKey::Builtin(BuiltinHost::Instance | BuiltinHost::Object))
        )
    }

    /// The operation set handling values of host class `host`.
    ///
    /// An exact match wins; otherwise the first representation `host` is assignable to.
    #[must_use]
    pub fn ops_for(&self, host: &HostClass) -> Option<&Arc<OperationSet>> {
        self.representations
            .iter()
            .find(|ops| ops.host_class().key() == host.key())
            .or_else(|| {
                self.representations
                    .iter()
                    .find(|ops| host.is_assignable_to(ops.host_class()))
            })
    }

    /// Reads an entry of this type's own dictionary.
    #[must_use]
    pub fn dict_get(&self, name: &str) -> Option<Value> {
        self.dict.read().get(name).cloned()
    }

    /// Keys of this type's own dictionary, in definition order.
    #[must_use]
    pub fn dict_keys(&self) -> Vec<Arc<str>> {
        self.dict.read().keys().cloned().collect()
    }

    /// Finds `name` along the MRO.
    #[must_use]
    pub fn lookup(self: &Arc<Self>, name: &str) -> Option<Value> {
        self.mro().find_map(|t| t.dict_get(name))
    }

    /// Live direct subclasses; dead entries are pruned as a side effect.
    #[must_use]
    pub fn subclasses(&self) -> Vec<TypeRef> {
        let mut subclasses = self.subclasses.lock();
        subclasses.retain(|weak| weak.strong_count() > 0);
        subclasses.iter().filter_map(Weak::upgrade).collect()
    }

    #[must_use]
    pub fn grid(&self) -> Option<&Arc<BinaryGrid>> {
        self.grid.get()
    }

    pub(crate) fn install_grid(&self, grid: Arc<BinaryGrid>) -> bool {
        self.grid.set(grid).is_ok()
    }

    /// Assigns (`Some`) or deletes (`None`) an entry of the type dictionary.
    ///
    /// Mutability is checked by the caller. When `name` is a special method
    /// the matching slot is recomputed on this type and every live subclass
    /// before returning, so the change is visible to the next dispatch.
    pub(crate) fn assign(self: &Arc<Self>, rt: &Runtime, name: &str, value: Option<Value>) -> RunResult<()> {
        let _guard = self.mutation.lock();
        {
            let mut dict = self.dict.write();
            match value {
                Some(value) => {
                    dict.insert(name.into(), value);
                }
                None => {
                    if dict.shift_remove(name).is_none() {
                        return Err(RunError::NoSuchAttribute {
                            type_name: self.name_arc(),
                            name: name.into(),
                            on_type: true,
                        });
                    }
                }
            }
        }
        self.version.fetch_add(1, Ordering::AcqRel);
        if let Ok(slot) = Slot::from_str(name) {
            self.propagate(rt, slot);
        }
        Ok(())
    }

    /// Recomputes `slot` on this type and all live descendants.
    fn propagate(self: &Arc<Self>, rt: &Runtime, slot: Slot) {
        let mut seen = ahash::AHashSet::new();
        let mut queue = VecDeque::from([Arc::clone(self)]);
        while let Some(ty) = queue.pop_front() {
            // diamonds reach a subclass through several bases
            if !seen.insert(ty.serial) {
                continue;
            }
            for ops in &ty.representations {
                ops.recompute(rt, &ty, slot);
            }
            queue.extend(ty.subclasses());
        }
    }

    /// Unlinks a type that failed to register from its bases and clears it.
    pub(crate) fn discard(self: &Arc<Self>) {
        let this = Arc::downgrade(self);
        for base in &self.bases {
            base.subclasses.lock().retain(|weak| !weak.ptr_eq(&this));
        }
        self.clear();
    }

    /// Drops dictionary contents and slot tables, breaking reference cycles.
    pub(crate) fn clear(&self) {
        self.dict.write().clear();
        self.metatype.store(None);
        self.subclasses.lock().clear();
        for ops in &self.representations {
            ops.clear();
        }
    }
}

impl fmt::Debug for TypeObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<class '{}'>", self.name)
    }
}

impl fmt::Display for TypeObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
