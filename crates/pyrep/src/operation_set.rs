//! Per-representation operation tables.
//!
//! An [`OperationSet`] belongs to one (guest type, host class) pair and holds
//! one [`SlotHandle`] per [`Slot`]. Tables are immutable snapshots published
//! through an `ArcSwap`: readers see either the whole old table or the whole
//! new one, and never take a lock.

use std::sync::{Arc, Weak};

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use crate::{
    exception::RunError,
    host::HostClass,
    runtime::Runtime,
    slot::{Slot, SlotHandle, SlotTable, native_fn},
    types::{TypeObject, TypeRef},
    value::Value,
};

/// Slot table for one host representation of a guest type.
pub struct OperationSet {
    owner: Weak<TypeObject>,
    host_class: HostClass,
    index: usize,
    table: ArcSwap<SlotTable>,
    /// Held across lookup and store so concurrent recomputations of one slot
    /// cannot publish a stale handle after a fresher one.
    update: Mutex<()>,
}

impl OperationSet {
    pub(crate) fn new(owner: Weak<TypeObject>, host_class: HostClass, index: usize) -> Self {
        Self {
            owner,
            host_class,
            index,
            table: ArcSwap::from_pointee(SlotTable::default()),
            update: Mutex::new(()),
        }
    }

    /// The guest type this set belongs to, unless the runtime has been torn down.
    #[must_use]
    pub fn owner(&self) -> Option<TypeRef> {
        self.owner.upgrade()
    }

    #[must_use]
    pub fn host_class(&self) -> &HostClass {
        &self.host_class
    }

    /// Position among the owner's representations; 0 is canonical.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub fn is_canonical(&self) -> bool {
        self.index == 0
    }

    /// The current table snapshot.
    #[must_use]
    pub fn table(&self) -> Arc<SlotTable> {
        self.table.load_full()
    }

    /// The current handle of one slot.
    #[must_use]
    pub fn handle(&self, slot: Slot) -> SlotHandle {
        self.table.load().get(slot).clone()
    }

    #[must_use]
    pub fn is_defined(&self, slot: Slot) -> bool {
        self.table.load().get(slot).is_defined()
    }

    /// Recomputes one slot from the owner's MRO and publishes a new table.
    pub(crate) fn recompute(&self, rt: &Runtime, owner: &TypeRef, slot: Slot) {
        let _guard = self.update.lock();
        let handle = compute_handle(owner, slot, &self.host_class);
        let defined = handle.is_defined();
        let next = self.table.load().with(slot, handle);
        self.table.store(Arc::new(next));
        rt.tracer().on_slot_updated(owner.name(), self.host_class.name(), slot, defined);
    }

    /// Rebuilds the whole table from the owner's MRO.
    pub(crate) fn recompute_all(&self, owner: &TypeRef) {
        let _guard = self.update.lock();
        let mut table = SlotTable::default();
        for slot in Slot::all() {
            table.set(slot, compute_handle(owner, slot, &self.host_class));
        }
        self.table.store(Arc::new(table));
    }

    pub(crate) fn clear(&self) {
        let _guard = self.update.lock();
        self.table.store(Arc::new(SlotTable::default()));
    }
}

impl std::fmt::Debug for OperationSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let owner = self.owner().map_or_else(|| "<dead>".into(), |t| t.name_arc());
        write!(f, "OperationSet({owner}, {})", self.host_class)
    }
}

/// Derives the handle for `slot` from the attribute found along `owner`'s MRO.
///
/// * absent, or set to `None` (as in `__hash__ = None`): the empty handle;
/// * a function with a body for this host class: that body, called directly;
/// * anything else: a generic handle that binds through the descriptor
///   protocol at call time.
fn compute_handle(owner: &TypeRef, slot: Slot, host: &HostClass) -> SlotHandle {
    match owner.lookup(slot.method_name()) {
        None | Some(Value::None) => SlotHandle::empty(),
        Some(Value::Function(f)) if f.objclass().is_none_or(|declared| owner.is_subtype(&declared)) => {
            f.body_for(host).map_or_else(|| generic_handle(slot), SlotHandle::new)
        }
        Some(_) => generic_handle(slot),
    }
}

fn generic_handle(slot: Slot) -> SlotHandle {
    SlotHandle::new(native_fn(move |rt, args| {
        let Some((receiver, rest)) = args.split_first() else {
            return Err(RunError::internal("slot invoked without a receiver"));
        };
        rt.call_special(receiver, slot, rest)
    }))
}
