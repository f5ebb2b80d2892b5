//! Host class to guest type registry.
//!
//! Maps each [`HostKey`] to the [`Representation`] that tells the dispatcher
//! which guest type and [`OperationSet`] handle its values. Entries are
//! published once and never change. First resolution of an unknown Rust type
//! builds a found type outside the lock and publishes it insert-if-absent:
//! concurrent resolvers of the same class all end up with the winner's entry.

use std::{fmt, sync::Arc};

use ahash::AHashMap;
use parking_lot::RwLock;
use strum::{Display, IntoStaticStr};

use crate::{
    exception::{ExcType, RunError, RunResult},
    host::{HostClass, HostKey},
    operation_set::OperationSet,
    runtime::Runtime,
    types::TypeRef,
};

/// How a host class relates to guest types.
#[derive(Clone)]
pub enum Representation {
    /// Canonical host class of a type declared through a `TypeSpec`.
    Known { ty: TypeRef, ops: Arc<OperationSet> },
    /// Additional host class accepted by an existing type.
    Adopted { ty: TypeRef, ops: Arc<OperationSet> },
    /// Type synthesized on first sight of an unregistered Rust type.
    Found { ty: TypeRef, ops: Arc<OperationSet> },
    /// One host class shared by many guest types; the type is read from the value.
    Shared { canonical: TypeRef },
}

/// Discriminant of [`Representation`], used in traces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr, serde::Serialize, serde::Deserialize)]
pub enum RepresentationKind {
    Known,
    Adopted,
    Found,
    Shared,
}

impl Representation {
    #[must_use]
    pub fn kind(&self) -> RepresentationKind {
        match self {
            Self::Known { .. } => RepresentationKind::Known,
            Self::Adopted { .. } => RepresentationKind::Adopted,
            Self::Found { .. } => RepresentationKind::Found,
            Self::Shared { .. } => RepresentationKind::Shared,
        }
    }

    /// The guest type, or the canonical one for shared representations.
    #[must_use]
    pub fn ty(&self) -> &TypeRef {
        match self {
            Self::Known { ty, .. } | Self::Adopted { ty, .. } | Self::Found { ty, .. } => ty,
            Self::Shared { canonical } => canonical,
        }
    }

    /// The fixed operation set; `None` for shared representations.
    #[must_use]
    pub fn ops(&self) -> Option<&Arc<OperationSet>> {
        match self {
            Self::Known { ops, .. } | Self::Adopted { ops, .. } | Self::Found { ops, .. } => Some(ops),
            Self::Shared { .. } => None,
        }
    }
}

impl fmt::Debug for Representation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind(), self.ty().name())
    }
}

/// A published registry entry.
#[derive(Debug)]
pub struct Registration {
    class: HostClass,
    representation: Representation,
}

impl Registration {
    #[must_use]
    pub fn new(class: HostClass, representation: Representation) -> Self {
        Self { class, representation }
    }

    #[must_use]
    pub fn class(&self) -> &HostClass {
        &self.class
    }

    #[must_use]
    pub fn representation(&self) -> &Representation {
        &self.representation
    }
}

/// Registry of host classes known to one [`Runtime`].
#[derive(Debug, Default)]
pub struct ClassRegistry {
    entries: RwLock<AHashMap<HostKey, Arc<Registration>>>,
}

impl ClassRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The entry for `key`, if one has been published.
    #[must_use]
    pub fn lookup(&self, key: HostKey) -> Option<Arc<Registration>> {
        self.entries.read().get(&key).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fails if `class` is already bound.
    pub fn ensure_unbound(&self, class: &HostClass) -> RunResult<()> {
        match self.lookup(class.key()) {
            Some(existing) => Err(already_bound(&existing)),
            None => Ok(()),
        }
    }

    /// Binds every host class of one type, or none of them.
    ///
    /// All keys are checked and inserted under a single write lock.
    pub fn register_all(&self, registrations: Vec<Registration>) -> RunResult<Vec<Arc<Registration>>> {
        let mut entries = self.entries.write();
        for registration in &registrations {
            if let Some(existing) = entries.get(&registration.class.key()) {
                return Err(already_bound(existing));
            }
        }
        Ok(registrations
            .into_iter()
            .map(|registration| {
                let registration = Arc::new(registration);
                entries.insert(registration.class.key(), Arc::clone(&registration));
                registration
            })
            .collect())
    }

    /// Publishes `candidate` unless another entry won first.
    ///
    /// Returns the entry now in the registry and whether it is `candidate`.
    pub fn publish(&self, candidate: Registration) -> (Arc<Registration>, bool) {
        let mut entries = self.entries.write();
        let mut won = false;
        let entry = entries.entry(candidate.class.key()).or_insert_with(|| {
            won = true;
            Arc::new(candidate)
        });
        (Arc::clone(entry), won)
    }

    /// Resolves a host class to its registry entry, synthesizing a found type if needed.
    ///
    /// Idempotent: every call for the same class returns the same entry, and
    /// therefore the same operation set.
    pub fn resolve(&self, rt: &Runtime, class: &HostClass) -> RunResult<Arc<Registration>> {
        if let Some(existing) = self.lookup(class.key()) {
            return Ok(existing);
        }
        if !rt.config().found_classes {
            return Err(RunError::UnregisteredHostClass {
                class_name: class.name().into(),
            });
        }
        // built without holding the lock; a loser's type is simply dropped
        let candidate = rt.build_found_type(class)?;
        let (entry, won) = self.publish(candidate);
        rt.tracer()
            .on_representation_published(class.name(), RepresentationKind::Found, won);
        Ok(entry)
    }

    /// Resolves a host class to an operation set.
    ///
    /// Shared representations answer with the canonical type's set.
    pub fn resolve_ops(&self, rt: &Runtime, class: &HostClass) -> RunResult<Arc<OperationSet>> {
        let entry = self.resolve(rt, class)?;
        match entry.representation.ops() {
            Some(ops) => Ok(Arc::clone(ops)),
            None => entry
                .representation
                .ty()
                .ops_for(class)
                .cloned()
                .ok_or_else(|| RunError::internal("shared representation has no operation set")),
        }
    }

    /// Every guest type reachable from the registry.
    pub(crate) fn types(&self) -> Vec<TypeRef> {
        self.entries
            .read()
            .values()
            .map(|entry| Arc::clone(entry.representation.ty()))
            .collect()
    }

    pub(crate) fn clear(&self) {
        self.entries.write().clear();
    }
}

fn already_bound(existing: &Registration) -> RunError {
    ExcType::type_error(format!(
        "host class '{}' is already bound to type '{}'",
        existing.class.name(),
        existing.representation.ty().name()
    ))
}
